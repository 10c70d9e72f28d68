//! A transparent fault-injecting layer for message-framed sockets. Wrap any
//! `Connector` in an `Interceptor` and every transport it opens keeps its
//! contract while frames are randomly dropped or corrupted in a
//! type-preserving way, and session lifecycle hooks fire for targets that name
//! a session.
//!
//! SPDX-License-Identifier: MIT

pub mod config;
pub mod corruption;
pub mod err;
pub mod frame;
pub mod injector;
pub mod interceptor;
pub mod memory;
pub mod misc;
pub mod policy;
pub mod rng;
pub mod session;
pub mod stats;
pub mod transport;

pub use config::FaultParams;
pub use corruption::{Corrupted, CorruptionEngine};
pub use err::{FaultErr, FaultKind};
pub use frame::{Blob, ByteView, Frame, FrameKind};
pub use injector::{Direction, FaultInjector, Outcome, TallySnapshot, Verdict};
pub use interceptor::{InterceptedTransport, Installation, Interceptor, TransportSlot};
pub use policy::{InterceptContext, Policy};
pub use rng::{ChaChaSource, Entropy, RandomSource};
pub use session::{HookRegistry, LivenessSink, LivenessSource, SessionSnapshot};
pub use transport::{Connector, Event, EventKind, Listener, MessageEvent, ReadyState, Transport};
