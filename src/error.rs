//! Error taxonomy for the bridge.
//!
//! Terminal errors propagate to the caller unchanged; the only condition
//! intercepted internally is the transient summary-loss recovery in
//! [`crate::invoke`]. Reference-count violations are programming errors and
//! abort via assertions rather than surfacing here.

use thiserror::Error;

use crate::command::TransportError;
use crate::session::EngineError;

/// Error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Remote transport failure. Terminal unless it carries the
    /// summary-loss error class, which the invocation layer recovers from
    /// exactly once.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Local execution engine failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// I/O or filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A command response was missing or carried an undecodable payload.
    #[error("malformed command response: {0}")]
    Response(String),
    /// Loaded metadata names a different class than expected.
    #[error("expected class name {expected} but found class name {found}")]
    ClassMismatch {
        /// Class name the caller expected.
        expected: String,
        /// Class name stored in the metadata record.
        found: String,
    },
    /// A composite contains distinct nested stages sharing a uid.
    #[error("compound stage set has duplicate uids: {0:?}")]
    DuplicateUids(Vec<String>),
    /// Validators with nested candidate stages cannot be traversed.
    #[error("nested validators are not supported: {0}")]
    NestedValidator(String),
    /// Metadata produced at version 2.4 or later must carry a default
    /// parameter section.
    #[error("expected `defaultParamMap` section not found")]
    MissingDefaultSection,
    /// Version string could not be parsed as `major.minor[.patch]`.
    #[error("invalid version string: {0}")]
    InvalidVersion(String),
    /// Storage path is not a valid UTF-8 string. Raised before any I/O.
    #[error("path should be a valid string, got {0:?}")]
    PathType(String),
    /// No client-side type is registered for the stored class name.
    #[error("class {0} cannot be loaded into a client-side type")]
    UnknownClass(String),
    /// Metadata record is missing a required field or is malformed.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    /// The model has no training summary attached.
    #[error("no training summary available for this {0}")]
    NoSummary(String),
    /// Operation requires a remote session but none is attached.
    #[error("session has no remote transport")]
    NoTransport,
    /// Operation requires a local execution engine but none is attached.
    #[error("session has no local execution engine")]
    NoEngine,
    /// An operation needed a session and none was supplied or registered.
    #[error("no active session")]
    NoActiveSession,
    /// The operation is not available for this object in its current state.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
