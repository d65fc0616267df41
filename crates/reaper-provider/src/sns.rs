//! SNS notification sink.

use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;

use reaper_core::{NotificationError, NotificationSink};

/// Publishes alerts to one SNS topic.
#[derive(Debug, Clone)]
pub struct SnsSink {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsSink {
    /// Publish to `topic_arn` with `client`.
    pub fn new(client: aws_sdk_sns::Client, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }

    /// Build a client from shared SDK configuration.
    pub fn from_conf(config: &aws_config::SdkConfig, topic_arn: impl Into<String>) -> Self {
        Self::new(aws_sdk_sns::Client::new(config), topic_arn)
    }

    /// The destination topic.
    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }
}

#[async_trait]
impl NotificationSink for SnsSink {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(body)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(DisplayErrorContext(&e).to_string()))?;

        tracing::debug!(
            topic_arn = %self.topic_arn,
            message_id = output.message_id().unwrap_or_default(),
            "published to SNS"
        );
        Ok(())
    }

    fn destination(&self) -> String {
        self.topic_arn.clone()
    }
}
