//! Adapter construction errors.

/// An adapter could not be built from its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Webhook URL failed to parse or uses an unsupported scheme. The URL
    /// itself is not carried; it usually embeds a credential.
    #[error("invalid webhook URL: {reason}")]
    InvalidWebhookUrl {
        /// Why it was rejected.
        reason: String,
    },

    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
