//! # Notifier
//!
//! Sends the rendered report to the operator channel as one message with a
//! fixed subject. Without a configured sink it only logs. Delivery failures
//! are logged and swallowed; they never fail the cycle and never cause
//! remediation to be retried.

use std::sync::Arc;

use reaper_core::NotificationSink;

use crate::report::Report;

/// Subject line of every alert.
pub const ALERT_SUBJECT: &str = "Long-Running EC2 Instances Alert";

/// What the notifier did with a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No destination configured; logged only.
    Skipped,
    /// Delivered to the sink.
    Delivered,
    /// Delivery failed; the error was logged.
    Failed(String),
}

/// Adapter between cycle reports and a [`NotificationSink`].
#[derive(Clone, Default)]
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("destination", &self.sink.as_ref().map(|s| s.destination()))
            .finish()
    }
}

impl Notifier {
    /// Notifier delivering to `sink`.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Log-only notifier.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Notifier from an optional sink.
    pub fn from_option(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self { sink }
    }

    /// Whether a destination is configured.
    pub fn is_configured(&self) -> bool {
        self.sink.is_some()
    }

    /// Send `report`. Never fails.
    pub async fn notify(&self, report: &Report) -> NotifyOutcome {
        let Some(sink) = &self.sink else {
            tracing::info!("no notification destination configured, skipping notification");
            return NotifyOutcome::Skipped;
        };

        let destination = sink.destination();
        tracing::info!(destination = %destination, "sending notification");
        match sink.send(ALERT_SUBJECT, &report.to_string()).await {
            Ok(()) => {
                tracing::info!(destination = %destination, "notification delivered");
                NotifyOutcome::Delivered
            }
            Err(e) => {
                tracing::error!(destination = %destination, error = %e, "failed to send notification");
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }
}
