// Error types for path compilation and execution.

use thiserror::Error;

/// Errors surfaced at the crate boundary.
///
/// Contract violations and shape mismatches fail fast and name the offending
/// navigator together with the shape it met; `UserFn` carries a failure
/// raised from a user-supplied transform and propagates unchanged. Transform
/// never partially updates a structure: it either returns the fully updated
/// value or an error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cardinality violation: {0}")]
    Cardinality(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("unbound parameter: {0}")]
    UnboundParam(String),

    #[error("arity mismatch: {0}")]
    ArityMismatch(String),

    #[error("invalid path literal: {0}")]
    InvalidLiteral(String),

    #[error("user function error: {0}")]
    UserFn(String),
}

pub type Result<T> = std::result::Result<T, Error>;
