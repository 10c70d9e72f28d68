//! A small error type shared by every layer of the interceptor. Errors carry a
//! kind so callers can tell a failed connect from a bad parameter without
//! string matching.
//!
//! SPDX-License-Identifier: MIT

use thiserror::Error;

/// Broad classes of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The real transport could not be opened
    Construction,
    /// Operation not valid in the transport's current ready state
    InvalidState,
    /// An external lifecycle hook failed
    Hook,
    /// Bad fault parameters or CLI values
    Config,
    /// Deferred work could not be scheduled or completed
    Runtime,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FaultErr {
    kind: FaultKind,
    message: String,
}

impl FaultErr {
    pub fn new(kind: FaultKind, message: &str) -> Self {
        FaultErr {
            kind,
            message: message.to_string(),
        }
    }

    pub fn construction(message: &str) -> Self {
        FaultErr::new(FaultKind::Construction, message)
    }

    pub fn invalid_state(message: &str) -> Self {
        FaultErr::new(FaultKind::InvalidState, message)
    }

    pub fn hook(message: &str) -> Self {
        FaultErr::new(FaultKind::Hook, message)
    }

    pub fn config(message: &str) -> Self {
        FaultErr::new(FaultKind::Config, message)
    }

    pub fn runtime(message: &str) -> Self {
        FaultErr::new(FaultKind::Runtime, message)
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn display(&self) {
        println!("{}", self.message);
    }
}
