//! Election error types.

/// Failures talking to the lease store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElectionError {
    /// The store could not be reached.
    #[error("lease store transport error: {0}")]
    Transport(String),

    /// Optimistic-concurrency conflict: another replica wrote first.
    #[error("lease was modified concurrently")]
    Conflict,

    /// The API server answered with an unexpected status.
    #[error("lease API returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },

    /// In-cluster service-account configuration is missing or unreadable.
    #[error("in-cluster configuration unavailable: {0}")]
    InClusterConfig(String),

    /// A response body could not be decoded.
    #[error("failed to decode lease: {0}")]
    Decode(String),
}
