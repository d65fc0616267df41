//! # Remediation Executor
//!
//! Acts on the violations of one cycle and records every outcome.
//!
//! - Dry run: nothing is called; each violation is recorded as
//!   "would terminate".
//! - Live: one termination call per instance. A failure is recorded and the
//!   remaining violations are still processed.
//!
//! Calls are issued with bounded concurrency (default 1, i.e. sequential).
//! Completion order may differ from issue order, so entries are sorted back
//! into discovery order before the report is returned.

use std::num::NonZeroUsize;

use futures::stream::{self, StreamExt};

use reaper_core::InventoryProvider;

use crate::evaluation::Violation;
use crate::report::{Outcome, Report, ReportEntry};

/// Executor settings, resolved once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemediationSettings {
    /// Simulate instead of terminating. Defaults to `true`.
    pub dry_run: bool,
    /// Maximum in-flight termination calls. Defaults to 1.
    pub concurrency: NonZeroUsize,
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            dry_run: true,
            concurrency: NonZeroUsize::MIN,
        }
    }
}

/// Terminates violators and builds the cycle report.
#[derive(Debug, Clone, Default)]
pub struct RemediationExecutor {
    settings: RemediationSettings,
}

impl RemediationExecutor {
    /// Create an executor.
    pub fn new(settings: RemediationSettings) -> Self {
        Self { settings }
    }

    /// Whether terminations are simulated.
    pub fn is_dry_run(&self) -> bool {
        self.settings.dry_run
    }

    /// Act on `violations` and return the report, in violation order.
    pub async fn remediate(
        &self,
        provider: &dyn InventoryProvider,
        violations: &[Violation],
    ) -> Report {
        let mut report = Report::new(self.settings.dry_run);

        if self.settings.dry_run {
            for violation in violations {
                tracing::info!(
                    instance_id = %violation.instance.id,
                    "DRY RUN: would terminate instance"
                );
                report.push(ReportEntry::new(violation, Outcome::WouldTerminate));
            }
            return report;
        }

        let mut completed: Vec<(usize, ReportEntry)> =
            stream::iter(violations.iter().enumerate())
                .map(|(seq, violation)| async move {
                    (seq, terminate_one(provider, violation).await)
                })
                .buffer_unordered(self.settings.concurrency.get())
                .collect()
                .await;

        completed.sort_by_key(|(seq, _)| *seq);
        report.entries = completed.into_iter().map(|(_, entry)| entry).collect();
        report
    }
}

async fn terminate_one(provider: &dyn InventoryProvider, violation: &Violation) -> ReportEntry {
    let id = &violation.instance.id;
    tracing::info!(instance_id = %id, "terminating instance");

    let outcome = match provider.terminate(id).await {
        Ok(()) => {
            tracing::info!(instance_id = %id, "successfully terminated instance");
            Outcome::Terminated
        }
        Err(e) => {
            tracing::error!(instance_id = %id, error = %e, "failed to terminate instance");
            Outcome::TerminationFailed { reason: e.reason }
        }
    };

    ReportEntry::new(violation, outcome)
}
