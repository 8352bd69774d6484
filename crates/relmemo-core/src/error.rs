//! # Error Taxonomy
//!
//! The memo core distinguishes exactly three situations:
//!
//! - **Contract violation**: a caller bug inside the optimizer itself, e.g. inserting
//!   an already-memoized expression a second time, querying a property outside a map's
//!   declared domain, or reusing an edge identity between different endpoints. These
//!   are not recovered here; they propagate to the top of the current optimization
//!   pass via `?` and abort it. The surrounding planner decides whether to fall back
//!   to an unoptimized plan or fail the query.
//! - **Unsupported**: a capability that a specialized view deliberately does not
//!   provide (e.g. plan-partition queries on a general properties map). Calling such
//!   a method signals "unsupported" rather than silently returning an empty answer.
//! - **Absence**: a property or demand that is not (yet) present is represented as
//!   `Option::None`, never as an error. Callers distinguish "not computed yet" from
//!   "computed as empty" by choosing the forcing or non-forcing read variant.

use thiserror::Error;

/// Errors raised by the memoization core.
#[derive(Debug, Error)]
pub enum MemoError {
    /// A caller bug in the optimizer: the operation's preconditions were violated.
    /// Aborts the current optimization pass.
    #[error("contract violation: {0}")]
    ContractViolation(String),
    /// The operation is deliberately not provided by this view.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl MemoError {
    pub(crate) fn contract(message: impl Into<String>) -> Self {
        MemoError::ContractViolation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, MemoError>;
