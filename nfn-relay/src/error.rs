use nfn_core::{CodecError, NameParseError};

use crate::computation::ConfigId;
use crate::face::FaceId;

/// Errors surfaced by forwarding operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("parse error: {0}")]
    Parse(#[from] CodecError),
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameParseError),
    #[error("content store is full and holds only static entries")]
    ResourceExhausted,
    #[error("duplicate nonce {0:#010x}")]
    DuplicateNonce(u32),
    #[error("no route for {0}")]
    NoRoute(String),
    #[error("computation failed: {0}")]
    Computation(#[from] ComputationError),
    #[error("unknown face {0}")]
    UnknownFace(FaceId),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while parsing or reducing an expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputationError {
    #[error("malformed expression: {0}")]
    Parse(String),
    #[error("unexpected token {token:?} at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },
    #[error("cannot apply {0} to an argument")]
    StuckTerm(String),
    #[error("no suspended computation with id {0}")]
    UnknownConfiguration(ConfigId),
    #[error("reduction exceeded {0} steps")]
    StepLimit(u64),
    #[error("machine is not waiting for external data")]
    NotSuspended,
    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}
