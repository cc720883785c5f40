//! Error taxonomy (spec §7).
//!
//! `RulesError` is the synchronous, caller-facing error kind returned by
//! repository-backed service calls (`AddRule`, `ViewRule`, ...). Execution
//! failures that happen inside the async pipeline (script errors, output
//! dispatch errors) are never returned to a caller — they become a
//! [`crate::message::RunInfo`] instead, so they are modeled separately
//! in [`ExecutionError`] and never implement `std::error::Error` as a
//! variant of `RulesError`.

use thiserror::Error;

/// Errors surfaced synchronously from public service operations.
#[derive(Error, Debug)]
pub enum RulesError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("repository failure: {0}")]
    RepositoryFailure(String),

    #[error("payload too large: {0} bytes (max {1})")]
    Oversize(usize, usize),

    #[error("{0}")]
    Other(String),
}

impl RulesError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn repository(msg: impl Into<String>) -> Self {
        Self::RepositoryFailure(msg.into())
    }
}

/// Errors that occur while executing a single rule against a single
/// message or scheduled tick. Never propagated to a synchronous caller —
/// always folded into a [`crate::message::RunInfo`] at `Error` level and
/// reflected in the rule's [`crate::rule::ExecutionStatus`].
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("script error: {0}")]
    Script(String),

    #[error("output dispatch failed ({failed}/{total} outputs): {detail}")]
    Dispatch {
        failed: usize,
        total: usize,
        detail: String,
    },

    #[error("transport error: {0}")]
    Transport(String),
}
