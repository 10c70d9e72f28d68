//! Capability set of a message-framed, full-duplex socket. Real transports and
//! the interceptor both implement `Transport`, so call sites never know which
//! one they hold.
//!
//! SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::err::FaultErr;
use crate::frame::Frame;

/// Connection state, with the numeric codes socket APIs expose
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub const CONNECTING: u16 = ReadyState::Connecting as u16;
    pub const OPEN: u16 = ReadyState::Open as u16;
    pub const CLOSING: u16 = ReadyState::Closing as u16;
    pub const CLOSED: u16 = ReadyState::Closed as u16;

    pub fn code(self) -> u16 {
        self as u16
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Close,
    Error,
}

/// Inbound message plus the metadata that rides along with it
#[derive(Clone, Debug, PartialEq)]
pub struct MessageEvent {
    pub data: Frame,
    pub origin: String,
    pub last_event_id: String,
    pub source: Option<String>,
}

impl MessageEvent {
    pub fn new(data: Frame, origin: &str) -> Self {
        MessageEvent {
            data,
            origin: origin.to_string(),
            last_event_id: String::new(),
            source: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Open,
    Message(MessageEvent),
    Close(CloseEvent),
    Error(String),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Open => EventKind::Open,
            Event::Message(_) => EventKind::Message,
            Event::Close(_) => EventKind::Close,
            Event::Error(_) => EventKind::Error,
        }
    }
}

pub type Listener = Box<dyn FnMut(&Event) + Send>;

pub trait Transport: Send {
    /// Target the transport was opened with
    fn url(&self) -> String;

    /// Negotiated sub-protocol, empty when none
    fn protocol(&self) -> String;

    fn ready_state(&self) -> ReadyState;

    fn send(&mut self, frame: Frame) -> Result<(), FaultErr>;

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) -> Result<(), FaultErr>;

    fn add_listener(&mut self, kind: EventKind, listener: Listener);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn url(&self) -> String {
        (**self).url()
    }

    fn protocol(&self) -> String {
        (**self).protocol()
    }

    fn ready_state(&self) -> ReadyState {
        (**self).ready_state()
    }

    fn send(&mut self, frame: Frame) -> Result<(), FaultErr> {
        (**self).send(frame)
    }

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) -> Result<(), FaultErr> {
        (**self).close(code, reason)
    }

    fn add_listener(&mut self, kind: EventKind, listener: Listener) {
        (**self).add_listener(kind, listener)
    }
}

/// Constructor for transports: the "new Socket(target, protocols)" shape
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    fn connect(&self, target: &str, protocols: Option<&[String]>)
        -> Result<Self::Transport, FaultErr>;
}

impl<C: Connector + ?Sized> Connector for Arc<C> {
    type Transport = C::Transport;

    fn connect(
        &self,
        target: &str,
        protocols: Option<&[String]>,
    ) -> Result<Self::Transport, FaultErr> {
        (**self).connect(target, protocols)
    }
}
