/// This file contains the `main` program logic which right now opens a
/// loopback socket through the interceptor, pushes a rotating mix of frame
/// types through it, and reports what the fault injector did to them
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wirefault::config::{parse_args, Config};
use wirefault::frame::{Blob, ByteView, Frame};
use wirefault::memory::MemoryConnector;
use wirefault::misc::lock;
use wirefault::stats::Stats;
use wirefault::{
    fatal, prompt, prompt_warn, Connector, Entropy, Event, EventKind, FaultErr, HookRegistry,
    Installation, InterceptContext, LivenessSink, LivenessSource, Policy, Transport,
    TransportSlot,
};

/// Liveness source the demo drives by hand
#[derive(Default)]
struct DemoLiveness {
    sink: Mutex<Option<LivenessSink>>,
}

impl DemoLiveness {
    fn push(&self, value: String) {
        let sink = lock(&self.sink).clone();
        if let Some(sink) = sink {
            sink(Some(value));
        }
    }
}

impl LivenessSource for DemoLiveness {
    fn start(&self, sink: LivenessSink) -> Result<(), FaultErr> {
        *lock(&self.sink) = Some(sink);
        Ok(())
    }

    fn stop(&self) -> Result<(), FaultErr> {
        *lock(&self.sink) = None;
        Ok(())
    }
}

// Rotate through every frame representation
fn demo_frame(i: usize) -> Frame {
    let seq = (i as u32).to_le_bytes();
    match i % 12 {
        0 => Frame::Text(format!("frame {}", i)),
        1 => Frame::Buffer(seq.repeat(4)),
        2 => Frame::Int8(vec![i as i8; 16]),
        3 => Frame::Uint8(vec![i as u8; 16]),
        4 => Frame::Int16(vec![i as i16; 8]),
        5 => Frame::Uint16(vec![i as u16; 8]),
        6 => Frame::Int32(vec![i as i32; 4]),
        7 => Frame::Uint32(vec![i as u32; 4]),
        8 => Frame::Float32(vec![i as f32; 4]),
        9 => Frame::Float64(vec![i as f64; 2]),
        10 => Frame::View(ByteView::new(seq.repeat(8), 8, 16)),
        _ => Frame::Blob(Blob::new(seq.repeat(4), "application/octet-stream")),
    }
}

fn console_hooks(liveness: Arc<DemoLiveness>) -> HookRegistry {
    let hooks = HookRegistry::default();
    hooks.set_liveness_source(liveness);

    hooks.on_session_discovered("console", |session_id| {
        prompt!("Session '{}' discovered", session_id);
        Ok(())
    });

    hooks.on_liveness_update("console", |value| {
        log::info!("Liveness now {}", value.unwrap_or("-"));
        Ok(())
    });

    hooks.on_session_ended("console", |snapshot| {
        prompt!(
            "Session '{}' ended, last liveness {}",
            snapshot.session_id,
            snapshot.last_liveness.as_deref().unwrap_or("-")
        );
        Ok(())
    });

    hooks
}

async fn run(config: Config) -> Result<(), FaultErr> {
    let entropy = match config.seed {
        Some(seed) => {
            prompt!("Fault pRNG seeded with 0x{:X}", seed);
            Entropy::seeded(seed)
        }
        None => Entropy::from_entropy(),
    };

    let policy = Policy::new(config.enabled);
    if !config.enabled {
        prompt_warn!("Fault injection disabled, frames pass through untouched");
    }

    let liveness = Arc::new(DemoLiveness::default());
    let ctx = InterceptContext::new(
        policy,
        config.params,
        entropy,
        console_hooks(liveness.clone()),
    )?;

    let connector = if config.echo {
        MemoryConnector::with_echo()
    } else {
        MemoryConnector::new()
    };

    // Install the interceptor as the socket constructor
    let slot = TransportSlot::new(connector);
    slot.install(ctx.clone());
    if slot.install(ctx) == Installation::AlreadyInstalled {
        prompt!("Interceptor installed, repeat installation ignored");
    }

    let Some(interceptor) = slot.interceptor() else {
        return Err(FaultErr::runtime("Interceptor missing after install"));
    };

    prompt!("Connecting to '{}'", config.target);
    let mut socket = interceptor.connect(&config.target, config.protocols.as_deref())?;
    if socket.session_id().is_none() {
        prompt_warn!("Target carries no session, lifecycle hooks stay idle");
    }

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    socket.add_listener(
        EventKind::Message,
        Box::new(move |_: &Event| {
            counter.fetch_add(1, Ordering::Relaxed);
        }),
    );
    socket.add_listener(
        EventKind::Close,
        Box::new(|event: &Event| log::debug!("Close event: {:?}", event)),
    );

    let mut stats = Stats::new(&config);
    stats.start_session();

    prompt!("Sending {} frames...", config.frames);
    for i in 0..config.frames {
        socket.send(demo_frame(i))?;
        stats.update(socket.tally());

        if stats.report_ready() {
            let remaining = (config.frames - i - 1).to_string();
            liveness.push(remaining.clone());
            stats.liveness = Some(remaining);

            socket.settle().await;
            stats.delivered = delivered.load(Ordering::Relaxed);
            stats.set_tally(socket.tally());
            stats.print_stats();
        }
    }

    socket.settle().await;
    socket.close(None, Some("demo complete"))?;

    stats.delivered = delivered.load(Ordering::Relaxed);
    stats.set_tally(socket.tally());
    stats.print_stats();

    Ok(())
}

fn main() {
    env_logger::init();

    let config = parse_args().unwrap_or_else(|error| {
        fatal!(error);
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|error| {
            fatal!(FaultErr::runtime(&format!(
                "Unable to start runtime: {}",
                error
            )));
        });

    runtime.block_on(run(config)).unwrap_or_else(|error| {
        fatal!(error);
    });

    // Loopback session torn down
    prompt!("Session finished");
}
