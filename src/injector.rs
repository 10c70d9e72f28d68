//! This file contains the frame fault injector. For every frame it decides
//! whether to pass it through, drop it, or corrupt it before delivery, and it
//! keeps per-direction tallies of those decisions.
//!
//! SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, trace};

use crate::config::FaultParams;
use crate::corruption::{Corrupted, CorruptionEngine};
use crate::frame::Frame;
use crate::policy::Policy;
use crate::rng::Entropy;
use crate::transport::MessageEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Drop,
    Corrupt,
}

/// What happens to one frame (or inbound event) after the verdict is applied
pub enum Outcome<T> {
    Deliver(T),
    Dropped,
    Deferred(BoxFuture<'static, T>),
}

#[derive(Clone)]
pub struct FaultInjector {
    params: FaultParams,
    engine: CorruptionEngine,
    policy: Policy,
    entropy: Entropy,
}

impl FaultInjector {
    pub fn new(
        params: FaultParams,
        engine: CorruptionEngine,
        policy: Policy,
        entropy: Entropy,
    ) -> Self {
        FaultInjector {
            params,
            engine,
            policy,
            entropy,
        }
    }

    /// Roll for one frame. A disabled policy short-circuits before any
    /// randomness is drawn.
    pub fn decide(&self, direction: Direction) -> Verdict {
        if !self.policy.is_enabled() {
            return Verdict::Pass;
        }

        let roll = self.entropy.with(|rng| rng.next_f64());
        let verdict = if roll < self.params.drop_rate {
            Verdict::Drop
        } else if roll < self.params.drop_rate + self.params.corrupt_rate {
            Verdict::Corrupt
        } else {
            Verdict::Pass
        };

        trace!("{:?} roll {:.4} -> {:?}", direction, roll, verdict);
        verdict
    }

    pub fn apply_outbound(&self, verdict: Verdict, frame: Frame) -> Outcome<Frame> {
        match verdict {
            Verdict::Pass => Outcome::Deliver(frame),
            Verdict::Drop => {
                debug!("Dropping outbound {:?} frame", frame.kind());
                Outcome::Dropped
            }
            Verdict::Corrupt => {
                debug!("Corrupting outbound {:?} frame", frame.kind());
                match self.engine.corrupt(frame, &self.entropy) {
                    Corrupted::Ready(frame) => Outcome::Deliver(frame),
                    Corrupted::Deferred(work) => Outcome::Deferred(work),
                }
            }
        }
    }

    /// Inbound corruption resynthesizes the event around the corrupted
    /// payload, copying every other field over unchanged
    pub fn apply_inbound(&self, verdict: Verdict, event: MessageEvent) -> Outcome<MessageEvent> {
        match verdict {
            Verdict::Pass => Outcome::Deliver(event),
            Verdict::Drop => {
                debug!("Dropping inbound {:?} frame", event.data.kind());
                Outcome::Dropped
            }
            Verdict::Corrupt => {
                debug!("Corrupting inbound {:?} frame", event.data.kind());
                let MessageEvent {
                    data,
                    origin,
                    last_event_id,
                    source,
                } = event;
                let resynthesize = move |data: Frame| MessageEvent {
                    data,
                    origin,
                    last_event_id,
                    source,
                };

                match self.engine.corrupt(data, &self.entropy) {
                    Corrupted::Ready(data) => Outcome::Deliver(resynthesize(data)),
                    Corrupted::Deferred(work) => Outcome::Deferred(work.map(resynthesize).boxed()),
                }
            }
        }
    }

    pub fn outbound(&self, frame: Frame) -> Outcome<Frame> {
        let verdict = self.decide(Direction::Outbound);
        self.apply_outbound(verdict, frame)
    }

    pub fn inbound(&self, event: MessageEvent) -> Outcome<MessageEvent> {
        let verdict = self.decide(Direction::Inbound);
        self.apply_inbound(verdict, event)
    }
}

/// Decision counts for one direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub passed: u64,
    pub dropped: u64,
    pub corrupted: u64,
}

impl Counts {
    pub fn total(&self) -> u64 {
        self.passed + self.dropped + self.corrupted
    }

    pub fn merge(&self, other: &Counts) -> Counts {
        Counts {
            passed: self.passed + other.passed,
            dropped: self.dropped + other.dropped,
            corrupted: self.corrupted + other.corrupted,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TallySnapshot {
    pub outbound: Counts,
    pub inbound: Counts,
}

/// Live decision counters, updated from whichever thread made the decision
#[derive(Debug, Default)]
pub struct FaultTally {
    // Indexed [outbound, inbound] x [pass, drop, corrupt]
    counters: [[AtomicU64; 3]; 2],
}

impl FaultTally {
    pub fn record(&self, direction: Direction, verdict: Verdict) {
        let row = match direction {
            Direction::Outbound => 0,
            Direction::Inbound => 1,
        };
        let col = match verdict {
            Verdict::Pass => 0,
            Verdict::Drop => 1,
            Verdict::Corrupt => 2,
        };
        self.counters[row][col].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TallySnapshot {
        let counts = |row: &[AtomicU64; 3]| Counts {
            passed: row[0].load(Ordering::Relaxed),
            dropped: row[1].load(Ordering::Relaxed),
            corrupted: row[2].load(Ordering::Relaxed),
        };

        TallySnapshot {
            outbound: counts(&self.counters[0]),
            inbound: counts(&self.counters[1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injector(enabled: bool, seed: u64) -> FaultInjector {
        let params = FaultParams::default();
        FaultInjector::new(
            params,
            CorruptionEngine::new(&params),
            Policy::new(enabled),
            Entropy::seeded(seed),
        )
    }

    fn event(data: Frame) -> MessageEvent {
        MessageEvent {
            data,
            origin: "ws://game.example".to_string(),
            last_event_id: "17".to_string(),
            source: Some("server".to_string()),
        }
    }

    #[test]
    fn disabled_policy_never_draws() {
        let injector = injector(false, 1);
        for _ in 0..1_000 {
            assert_eq!(injector.decide(Direction::Outbound), Verdict::Pass);
            assert_eq!(injector.decide(Direction::Inbound), Verdict::Pass);
        }
        assert_eq!(injector.entropy.draws(), 0);
    }

    #[test]
    fn policy_changes_apply_to_the_next_frame() {
        let injector = injector(false, 2);
        assert_eq!(injector.decide(Direction::Outbound), Verdict::Pass);
        injector.policy.set_enabled(true);
        injector.decide(Direction::Outbound);
        assert_eq!(injector.entropy.draws(), 1);
    }

    #[test]
    fn rates_follow_thresholds() {
        let injector = injector(true, 0xdead_beef);
        let tally = FaultTally::default();
        let trials = 100_000;
        for i in 0..trials {
            let direction = if i % 2 == 0 {
                Direction::Outbound
            } else {
                Direction::Inbound
            };
            tally.record(direction, injector.decide(direction));
        }

        let snap = tally.snapshot();
        let all = snap.outbound.merge(&snap.inbound);
        assert_eq!(all.total(), trials);
        let drop_rate = all.dropped as f64 / trials as f64;
        let corrupt_rate = all.corrupted as f64 / trials as f64;
        assert!((drop_rate - 0.20).abs() <= 0.01, "drop rate {}", drop_rate);
        assert!((corrupt_rate - 0.30).abs() <= 0.01, "corrupt rate {}", corrupt_rate);
    }

    #[test]
    fn drop_swallows_the_frame() {
        let injector = injector(true, 3);
        let outcome = injector.apply_outbound(Verdict::Drop, Frame::Buffer(vec![1, 2]));
        assert!(matches!(outcome, Outcome::Dropped));
    }

    #[test]
    fn inbound_corruption_keeps_metadata() {
        let injector = injector(true, 4);
        let original = event(Frame::Int16(vec![7; 8]));
        let Outcome::Deliver(out) = injector.apply_inbound(Verdict::Corrupt, original.clone())
        else {
            panic!("typed arrays corrupt synchronously");
        };
        assert_eq!(out.origin, original.origin);
        assert_eq!(out.last_event_id, original.last_event_id);
        assert_eq!(out.source, original.source);
        assert_eq!(out.data.kind(), original.data.kind());
        assert_eq!(out.data.len(), original.data.len());
    }

    #[tokio::test]
    async fn inbound_blob_corruption_defers_and_keeps_metadata() {
        let injector = injector(true, 5);
        let original = event(Frame::Blob(crate::frame::Blob::new(vec![0; 4], "x/y")));
        let Outcome::Deferred(work) = injector.apply_inbound(Verdict::Corrupt, original.clone())
        else {
            panic!("blobs corrupt asynchronously");
        };
        let out = work.await;
        assert_eq!(out.origin, original.origin);
        assert_eq!(out.source, original.source);
        assert_eq!(out.data.len(), 4);
    }
}
