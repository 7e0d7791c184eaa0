//! Error types for channel lifecycle and transmission
//!
//! Open, write, and close failures are surfaced to the immediate caller and
//! carry the OS error description, since permission and device-availability
//! problems dominate real failures of raw-socket code. Receive-side failures
//! never appear here: the receive loop collapses them to "no reply".

use std::fmt;

use thiserror::Error;

use crate::network::socket_kind::SocketKind;

/// Errors raised by channel lifecycle and send operations.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("failed to open {kind} channel: {reason}")]
    Open { kind: SocketKind, reason: String },

    #[error("write on {kind} channel failed: {reason}")]
    Write { kind: SocketKind, reason: String },

    #[error("failed to close {kind} channel: {reason}")]
    Close { kind: SocketKind, reason: String },

    #[error("no open {0} channel")]
    InvalidChannel(SocketKind),

    #[error("{0} has no protocol number mapping")]
    UnknownSocketKind(SocketKind),

    #[error("no interface named '{0}'")]
    UnknownInterface(String),
}

impl ChannelError {
    pub(crate) fn open(kind: SocketKind, reason: impl fmt::Display) -> Self {
        ChannelError::Open {
            kind,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(kind: SocketKind, reason: impl fmt::Display) -> Self {
        ChannelError::Write {
            kind,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn close(kind: SocketKind, reason: impl fmt::Display) -> Self {
        ChannelError::Close {
            kind,
            reason: reason.to_string(),
        }
    }
}
