//! # Error Types
//!
//! The engine distinguishes four failure classes, each with its own blast
//! radius:
//!
//! - [`ConfigError`] is fatal at startup. No cycle ever runs.
//! - [`RetrievalError`] aborts the current cycle only.
//! - [`TerminationError`] is isolated to one instance and recorded in the
//!   cycle report.
//! - [`NotificationError`] is logged and swallowed.
//!
//! None of them is retried inside a cycle; the schedule's recurrence is the
//! only retry mechanism.

use thiserror::Error;

/// Invalid policy configuration. Detected once, at load time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The runtime threshold is NaN or infinite.
    #[error("policy #{index}: maxRuntimeHours must be a finite number, got {value}")]
    InvalidThreshold {
        /// 1-based position of the policy in the configured list.
        index: usize,
        /// The rejected value.
        value: f64,
    },

    /// The name pattern uses syntax other than the `*` wildcard, or could
    /// not be compiled.
    #[error("policy #{index}: malformed name pattern {pattern:?}: {reason}")]
    MalformedPattern {
        /// 1-based position of the policy in the configured list.
        index: usize,
        /// The rejected pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A tag requirement has an empty key.
    #[error("policy #{index}: tag requirement keys must not be empty")]
    EmptyTagKey {
        /// 1-based position of the policy in the configured list.
        index: usize,
    },

    /// The policy list is empty.
    #[error("at least one policy must be configured")]
    NoPolicies,
}

/// Listing instances from the inventory provider failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("instance retrieval failed on page {page}: {reason}")]
pub struct RetrievalError {
    /// 1-based page number on which the failure occurred.
    pub page: usize,
    /// Provider-supplied description of the failure.
    pub reason: String,
}

impl RetrievalError {
    /// Create a retrieval error for the given page.
    pub fn new(page: usize, reason: impl Into<String>) -> Self {
        Self {
            page,
            reason: reason.into(),
        }
    }
}

/// Terminating a single instance failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to terminate instance {instance_id}: {reason}")]
pub struct TerminationError {
    /// The instance the call was issued for.
    pub instance_id: String,
    /// Provider-supplied description of the failure.
    pub reason: String,
}

impl TerminationError {
    /// Create a termination error for the given instance.
    pub fn new(instance_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            reason: reason.into(),
        }
    }
}

/// Delivering an alert to the notification destination failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The transport could not reach the destination.
    #[error("notification transport error: {0}")]
    Transport(String),

    /// The destination answered but refused the message.
    #[error("notification rejected by {destination}: {reason}")]
    Rejected {
        /// Destination identifier (topic ARN, URL host, ...).
        destination: String,
        /// Response status or body excerpt.
        reason: String,
    },
}
