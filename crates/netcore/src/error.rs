use std::io;

use crate::net::ConnectionState;

pub use crate::net::DecodeError;

/// Errors returned to the caller. Malformed network input never ends up
/// here; it is logged and counted instead.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
    #[error("not connected")]
    NotConnected,
    #[error("outbound queue is full")]
    OutboundFull,
    #[error("unknown entity {id}")]
    UnknownEntity { id: u32 },
    #[error("could not resolve {endpoint}")]
    Resolve { endpoint: String },
    #[error("connect to {endpoint} timed out")]
    ConnectTimeout { endpoint: String },
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl NetError {
    pub(crate) fn invalid_state(operation: &'static str, state: ConnectionState) -> Self {
        Self::InvalidState { operation, state }
    }
}
