//! # Webhook Sink
//!
//! Posts each alert as JSON to an HTTP endpoint:
//!
//! ```json
//! { "subject": "Long-Running EC2 Instances Alert", "text": "Found 2 ..." }
//! ```
//!
//! The `text` field makes the payload directly acceptable to Slack- and
//! Mattermost-style incoming webhooks. Any non-2xx response is a rejection.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use reaper_core::{NotificationError, NotificationSink};

use crate::error::ProviderError;

/// Longest response body excerpt carried into an error.
const BODY_EXCERPT: usize = 200;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    text: &'a str,
}

/// Delivers alerts to an HTTP webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: Url,
}

impl WebhookSink {
    /// Create a sink for `url` with a 30s request timeout.
    pub fn new(url: &str) -> Result<Self, ProviderError> {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    /// Create a sink with an explicit request timeout.
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let parsed = Url::parse(url).map_err(|e| ProviderError::InvalidWebhookUrl {
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProviderError::InvalidWebhookUrl {
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: parsed,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let resp = self
            .client
            .post(self.url.clone())
            .json(&WebhookPayload {
                subject,
                text: body,
            })
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(BODY_EXCERPT).collect();
            return Err(NotificationError::Rejected {
                destination: self.destination(),
                reason: format!("HTTP {status}: {excerpt}"),
            });
        }
        Ok(())
    }

    /// Scheme, host and path. The query string is omitted.
    fn destination(&self) -> String {
        format!(
            "{}://{}{}",
            self.url.scheme(),
            self.url.host_str().unwrap_or_default(),
            self.url.path()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            WebhookSink::new("not a url"),
            Err(ProviderError::InvalidWebhookUrl { .. })
        ));
        assert!(matches!(
            WebhookSink::new("ftp://example.com/hook"),
            Err(ProviderError::InvalidWebhookUrl { .. })
        ));
    }

    #[test]
    fn url_errors_do_not_leak_the_url() {
        let err = WebhookSink::new("ftp://hooks.example.com/services/T1/B2/s3cr3t").unwrap_err();
        assert!(!err.to_string().contains("s3cr3t"));
        assert!(!format!("{err:?}").contains("s3cr3t"));
        assert!(err.to_string().contains("\"ftp\""));

        let err = WebhookSink::new("https://[::1/s3cr3t").unwrap_err();
        assert!(!format!("{err:#}").contains("s3cr3t"));
    }

    #[test]
    fn destination_hides_query_string() {
        let sink = WebhookSink::new("https://hooks.example.com/services/T1?token=secret").unwrap();
        assert_eq!(sink.destination(), "https://hooks.example.com/services/T1");
    }
}
