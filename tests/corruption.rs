//! Shape properties of corrupted frames and the empirical verdict rates

use proptest::prelude::*;

use wirefault::{
    ByteView, ChaChaSource, CorruptionEngine, Direction, Entropy, FaultInjector, FaultParams,
    Frame, Policy, Verdict,
};

fn typed_frame() -> impl Strategy<Value = Frame> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 1..256).prop_map(Frame::Buffer),
        prop::collection::vec(any::<i8>(), 1..256).prop_map(Frame::Int8),
        prop::collection::vec(any::<u8>(), 1..256).prop_map(Frame::Uint8),
        prop::collection::vec(any::<i16>(), 1..128).prop_map(Frame::Int16),
        prop::collection::vec(any::<u16>(), 1..128).prop_map(Frame::Uint16),
        prop::collection::vec(any::<i32>(), 1..64).prop_map(Frame::Int32),
        prop::collection::vec(any::<u32>(), 1..64).prop_map(Frame::Uint32),
        prop::collection::vec(-1e6f32..1e6f32, 1..64).prop_map(Frame::Float32),
        prop::collection::vec(-1e12f64..1e12f64, 1..32).prop_map(Frame::Float64),
    ]
}

fn view_frame() -> impl Strategy<Value = (Vec<u8>, usize, usize)> {
    prop::collection::vec(any::<u8>(), 2..128).prop_flat_map(|buffer| {
        let size = buffer.len();
        (Just(buffer), 0..size).prop_flat_map(move |(buffer, offset)| {
            (Just(buffer), Just(offset), 1..=size - offset)
        })
    })
}

fn floats_finite(frame: &Frame) -> bool {
    match frame {
        Frame::Float32(v) => v.iter().all(|x| x.is_finite()),
        Frame::Float64(v) => v.iter().all(|x| x.is_finite()),
        _ => true,
    }
}

proptest! {
    #[test]
    fn corruption_keeps_kind_and_length(frame in typed_frame(), seed in any::<u64>()) {
        let engine = CorruptionEngine::new(&FaultParams::default());
        let mut rng = ChaChaSource::seeded(seed);

        let corrupted = engine.corrupt_now(frame.clone(), &mut rng);
        prop_assert_eq!(corrupted.kind(), frame.kind());
        prop_assert_eq!(corrupted.len(), frame.len());
        prop_assert_eq!(corrupted.byte_len(), frame.byte_len());
        prop_assert!(floats_finite(&corrupted));
    }

    #[test]
    fn view_corruption_stays_in_window((buffer, offset, len) in view_frame(), seed in any::<u64>()) {
        let engine = CorruptionEngine::new(&FaultParams::default());
        let mut rng = ChaChaSource::seeded(seed);

        let frame = Frame::View(ByteView::new(buffer.clone(), offset, len));
        let Frame::View(view) = engine.corrupt_now(frame, &mut rng) else {
            panic!("view changed representation");
        };

        prop_assert_eq!(view.offset, offset);
        prop_assert_eq!(view.len, len);
        prop_assert_eq!(view.buffer.len(), buffer.len());
        prop_assert_eq!(&view.buffer[..offset], &buffer[..offset]);
        prop_assert_eq!(&view.buffer[offset + len..], &buffer[offset + len..]);
    }
}

#[test]
fn verdicts_follow_configured_rates() {
    let params = FaultParams::default();
    let injector = FaultInjector::new(
        params,
        CorruptionEngine::new(&params),
        Policy::new(true),
        Entropy::seeded(42),
    );

    let trials = 100_000;
    let (mut dropped, mut corrupted) = (0usize, 0usize);
    for _ in 0..trials {
        match injector.decide(Direction::Inbound) {
            Verdict::Drop => dropped += 1,
            Verdict::Corrupt => corrupted += 1,
            Verdict::Pass => {}
        }
    }

    let drop_share = dropped as f64 / trials as f64;
    let corrupt_share = corrupted as f64 / trials as f64;
    assert!((drop_share - 0.20).abs() < 0.01, "drop share {}", drop_share);
    assert!((corrupt_share - 0.30).abs() < 0.01, "corrupt share {}", corrupt_share);
}
