//! Error taxonomy for the gateway driver.
//!
//! Hot-path parsing and dispatch never return an error: malformed frames and
//! under-length events are logged and skipped (see [`crate::cobs`] and
//! [`crate::event`]). Only connection setup and explicit sends surface an
//! error to their caller.

use std::time::Duration;
use thiserror::Error;

/// Failure of the abstract BLE [`crate::transport::Transport`] collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("characteristic read failed: {0}")]
    ReadFailed(String),
    #[error("characteristic write failed: {0}")]
    WriteFailed(String),
    #[error("notification subscription failed: {0}")]
    NotifyFailed(String),
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("characteristic enumeration failed: {0}")]
    EnumerationFailed(String),
}

/// Failure during the two-step authentication handshake (C7).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthFailure {
    #[error("gateway reported not ready to unlock")]
    NotReady,
    #[error("step 1 unlock verification failed")]
    VerifyFailed,
    #[error("characteristic had unexpected length: expected {expected}, got {actual}")]
    UnexpectedLength { expected: usize, actual: usize },
    #[error("timed out waiting for SEED notification after {0:?}")]
    SeedTimeout(Duration),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Top-level error returned from [`crate::session::GatewaySession`] operations.
///
/// `FramingError`, `ParseError` and `ProtocolError` from the spec's error
/// taxonomy never reach this type — they are handled internally by the
/// decoder, event parser and metadata tracker respectively, per the
/// propagation policy (malformed data is logged and dropped, never thrown).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthFailure),
    #[error("command send attempted while disconnected")]
    Disconnected,
}
