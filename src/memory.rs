//! In-process loopback transport. It stands in for a real socket in the demo
//! binary and the tests: sent frames are recorded, and the peer handle can
//! push inbound events into the registered listeners.
//!
//! SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};

use log::debug;

use crate::err::FaultErr;
use crate::frame::Frame;
use crate::misc::lock;
use crate::transport::{
    CloseEvent, Connector, Event, EventKind, Listener, MessageEvent, ReadyState, Transport,
};

/// Normal closure code
const CLOSE_NORMAL: u16 = 1000;

struct Shared {
    url: String,
    protocol: String,
    state: ReadyState,
    sent: Vec<Frame>,
    listeners: Vec<(EventKind, Listener)>,
    close_calls: usize,
}

// Run matching listeners without holding the lock, so a listener may register
// more listeners
fn dispatch(shared: &Mutex<Shared>, event: &Event) {
    let mut listeners = std::mem::take(&mut lock(shared).listeners);
    for (kind, listener) in listeners.iter_mut() {
        if *kind == event.kind() {
            listener(event);
        }
    }

    let mut guard = lock(shared);
    listeners.append(&mut guard.listeners);
    guard.listeners = listeners;
}

/// Test/demo side of a loopback connection
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryPeer {
    pub fn url(&self) -> String {
        lock(&self.shared).url.clone()
    }

    pub fn state(&self) -> ReadyState {
        lock(&self.shared).state
    }

    /// Frames that reached the transport, in order
    pub fn sent(&self) -> Vec<Frame> {
        lock(&self.shared).sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.shared).sent.len()
    }

    /// How many times the transport's own `close` was called
    pub fn close_calls(&self) -> usize {
        lock(&self.shared).close_calls
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        lock(&self.shared)
            .listeners
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Deliver an inbound event to the listeners registered for its kind.
    /// Messages are ignored once the connection is closed.
    pub fn deliver(&self, event: Event) {
        if matches!(event, Event::Message(_)) && self.state() != ReadyState::Open {
            return;
        }

        dispatch(&self.shared, &event);
    }

    pub fn deliver_frame(&self, frame: Frame) {
        let origin = self.url();
        self.deliver(Event::Message(MessageEvent::new(frame, &origin)));
    }
}

pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
    echo: bool,
}

impl Transport for MemoryTransport {
    fn url(&self) -> String {
        lock(&self.shared).url.clone()
    }

    fn protocol(&self) -> String {
        lock(&self.shared).protocol.clone()
    }

    fn ready_state(&self) -> ReadyState {
        lock(&self.shared).state
    }

    fn send(&mut self, frame: Frame) -> Result<(), FaultErr> {
        let origin = {
            let mut shared = lock(&self.shared);
            if shared.state != ReadyState::Open {
                return Err(FaultErr::invalid_state(&format!(
                    "send on {:?} transport",
                    shared.state
                )));
            }

            shared.sent.push(frame.clone());
            shared.url.clone()
        };

        if self.echo {
            dispatch(
                &self.shared,
                &Event::Message(MessageEvent::new(frame, &origin)),
            );
        }

        Ok(())
    }

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) -> Result<(), FaultErr> {
        let code = code.unwrap_or(CLOSE_NORMAL);
        if code != CLOSE_NORMAL && !(3000..=4999).contains(&code) {
            return Err(FaultErr::invalid_state(&format!(
                "invalid close code {}",
                code
            )));
        }

        {
            let mut shared = lock(&self.shared);
            shared.close_calls += 1;
            if matches!(shared.state, ReadyState::Closing | ReadyState::Closed) {
                return Ok(());
            }
            shared.state = ReadyState::Closing;
        }

        debug!("Loopback closing with code {}", code);
        lock(&self.shared).state = ReadyState::Closed;
        dispatch(
            &self.shared,
            &Event::Close(CloseEvent {
                code,
                reason: reason.unwrap_or_default().to_string(),
                was_clean: true,
            }),
        );

        Ok(())
    }

    fn add_listener(&mut self, kind: EventKind, listener: Listener) {
        lock(&self.shared).listeners.push((kind, listener));
    }
}

/// Opens loopback transports for `ws://` and `wss://` targets and keeps a
/// peer handle for each
#[derive(Clone, Default)]
pub struct MemoryConnector {
    peers: Arc<Mutex<Vec<MemoryPeer>>>,
    echo: bool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        MemoryConnector::default()
    }

    /// Sent frames are delivered straight back as inbound messages
    pub fn with_echo() -> Self {
        MemoryConnector {
            echo: true,
            ..MemoryConnector::default()
        }
    }

    pub fn last_peer(&self) -> Option<MemoryPeer> {
        lock(&self.peers).last().cloned()
    }
}

impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    fn connect(
        &self,
        target: &str,
        protocols: Option<&[String]>,
    ) -> Result<MemoryTransport, FaultErr> {
        if !(target.starts_with("ws://") || target.starts_with("wss://")) {
            return Err(FaultErr::construction(&format!(
                "Unsupported target '{}'",
                target
            )));
        }

        let protocol = protocols
            .and_then(|p| p.first())
            .cloned()
            .unwrap_or_default();

        let shared = Arc::new(Mutex::new(Shared {
            url: target.to_string(),
            protocol,
            state: ReadyState::Open,
            sent: Vec::new(),
            listeners: Vec::new(),
            close_calls: 0,
        }));

        lock(&self.peers).push(MemoryPeer {
            shared: shared.clone(),
        });

        Ok(MemoryTransport {
            shared,
            echo: self.echo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn rejects_non_socket_targets() {
        let connector = MemoryConnector::new();
        let err = connector.connect("http://host", None).err().unwrap();
        assert_eq!(err.kind(), crate::err::FaultKind::Construction);
        assert!(connector.last_peer().is_none());
    }

    #[test]
    fn negotiates_first_protocol() {
        let connector = MemoryConnector::new();
        let protocols = vec!["v2".to_string(), "v1".to_string()];
        let socket = connector.connect("ws://host", Some(&protocols)).unwrap();
        assert_eq!(socket.protocol(), "v2");
        assert_eq!(socket.ready_state(), ReadyState::Open);
    }

    #[test]
    fn echo_reaches_message_listeners() {
        let connector = MemoryConnector::with_echo();
        let mut socket = connector.connect("ws://host", None).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        socket.add_listener(
            EventKind::Message,
            Box::new(move |_: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        socket.send(Frame::Text("ping".into())).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_is_idempotent_and_blocks_sends() {
        let connector = MemoryConnector::new();
        let mut socket = connector.connect("ws://host", None).unwrap();
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = closes.clone();
        socket.add_listener(
            EventKind::Close,
            Box::new(move |_: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        socket.close(None, None).unwrap();
        socket.close(None, None).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(socket.ready_state(), ReadyState::Closed);
        assert!(socket.send(Frame::Buffer(vec![1])).is_err());
    }

    #[test]
    fn rejects_reserved_close_codes() {
        let connector = MemoryConnector::new();
        let mut socket = connector.connect("ws://host", None).unwrap();
        assert!(socket.close(Some(1006), None).is_err());
        assert_eq!(socket.ready_state(), ReadyState::Open);
    }
}
