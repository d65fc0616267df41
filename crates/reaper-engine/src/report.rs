//! # Cycle Report
//!
//! The record of one cycle: every violation found, in discovery order, with
//! the outcome of acting on it. Built fresh per cycle, handed to the
//! notifier, then dropped.
//!
//! `Display` renders the alert body sent to the operator channel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reaper_core::instance::duration_hours;
use reaper_core::InstanceId;

use crate::evaluation::Violation;

/// What happened to one violating instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Dry run: termination was simulated, not issued.
    WouldTerminate,
    /// Termination call succeeded.
    Terminated,
    /// Termination call failed.
    TerminationFailed {
        /// Provider-supplied reason.
        reason: String,
    },
}

impl Outcome {
    /// Whether the entry records a failed termination.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::TerminationFailed { .. })
    }
}

/// One violating instance and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Instance type.
    pub instance_type: String,
    /// `Name` tag, if any.
    pub name: Option<String>,
    /// Launch timestamp.
    pub launch_time: Option<DateTime<Utc>>,
    /// Runtime at evaluation time, in hours.
    pub runtime_hours: f64,
    /// Label of the policy that matched.
    pub policy: String,
    /// Outcome of remediation.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ReportEntry {
    /// Build an entry for `violation`.
    pub fn new(violation: &Violation, outcome: Outcome) -> Self {
        Self {
            instance_id: violation.instance.id.clone(),
            instance_type: violation.instance.instance_type.clone(),
            name: violation.instance.display_name().map(String::from),
            launch_time: violation.instance.launch_time,
            runtime_hours: duration_hours(violation.runtime),
            policy: violation.policy.to_string(),
            outcome,
        }
    }
}

/// Aggregate counts for a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Violations found.
    pub found: usize,
    /// Terminations that succeeded.
    pub terminated: usize,
    /// Terminations that failed.
    pub failed: usize,
    /// Terminations simulated in dry-run mode.
    pub simulated: usize,
}

/// Ordered record of one cycle's findings and outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Whether the cycle ran in dry-run mode.
    pub dry_run: bool,
    /// Entries in violation discovery order.
    pub entries: Vec<ReportEntry>,
}

impl Report {
    /// An empty report.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            entries: Vec::new(),
        }
    }

    /// Append an entry.
    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate counts.
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            found: self.entries.len(),
            ..ReportSummary::default()
        };
        for entry in &self.entries {
            match entry.outcome {
                Outcome::WouldTerminate => summary.simulated += 1,
                Outcome::Terminated => summary.terminated += 1,
                Outcome::TerminationFailed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "No long-running instances found.");
        }

        writeln!(f, "Found {} long-running instances:", self.entries.len())?;
        for entry in &self.entries {
            write!(
                f,
                "- ID: {}, Type: {}, ",
                entry.instance_id, entry.instance_type
            )?;
            if let Some(name) = &entry.name {
                write!(f, "Name: {name}, ")?;
            }
            writeln!(
                f,
                "Runtime: {:.2} hours, Policy: {}",
                entry.runtime_hours, entry.policy
            )?;
            match &entry.outcome {
                Outcome::WouldTerminate => {
                    writeln!(f, "  DRY RUN: would terminate instance {}", entry.instance_id)?
                }
                Outcome::Terminated => {
                    writeln!(f, "  Successfully terminated instance {}", entry.instance_id)?
                }
                Outcome::TerminationFailed { reason } => writeln!(
                    f,
                    "  Failed to terminate instance {}: {reason}",
                    entry.instance_id
                )?,
            }
        }

        let s = self.summary();
        writeln!(
            f,
            "Summary: {} found, {} terminated, {} failed, {} simulated",
            s.found, s.terminated, s.failed, s.simulated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: Option<&str>, outcome: Outcome) -> ReportEntry {
        ReportEntry {
            instance_id: InstanceId::new(id),
            instance_type: "t3.large".into(),
            name: name.map(String::from),
            launch_time: None,
            runtime_hours: 30.25,
            policy: "#1 type=t3.large max=24h".into(),
            outcome,
        }
    }

    #[test]
    fn empty_report_says_nothing_found() {
        let report = Report::new(true);
        assert!(report.is_empty());
        assert_eq!(report.summary().found, 0);
        assert_eq!(report.to_string(), "No long-running instances found.\n");
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut report = Report::new(false);
        report.push(entry("i-1", None, Outcome::Terminated));
        report.push(entry(
            "i-2",
            None,
            Outcome::TerminationFailed {
                reason: "denied".into(),
            },
        ));
        report.push(entry("i-3", None, Outcome::Terminated));
        assert_eq!(
            report.summary(),
            ReportSummary {
                found: 3,
                terminated: 2,
                failed: 1,
                simulated: 0,
            }
        );
    }

    #[test]
    fn renders_alert_body() {
        let mut report = Report::new(false);
        report.push(entry("i-1", Some("dev-1"), Outcome::Terminated));
        report.push(entry(
            "i-2",
            None,
            Outcome::TerminationFailed {
                reason: "denied".into(),
            },
        ));
        let expected = "\
Found 2 long-running instances:
- ID: i-1, Type: t3.large, Name: dev-1, Runtime: 30.25 hours, Policy: #1 type=t3.large max=24h
  Successfully terminated instance i-1
- ID: i-2, Type: t3.large, Runtime: 30.25 hours, Policy: #1 type=t3.large max=24h
  Failed to terminate instance i-2: denied
Summary: 2 found, 1 terminated, 1 failed, 0 simulated
";
        assert_eq!(report.to_string(), expected);
    }

    #[test]
    fn dry_run_entries_render_as_would_terminate() {
        let mut report = Report::new(true);
        report.push(entry("i-9", None, Outcome::WouldTerminate));
        assert!(report
            .to_string()
            .contains("  DRY RUN: would terminate instance i-9\n"));
    }

    #[test]
    fn serializes_outcome_inline() {
        let e = entry(
            "i-2",
            None,
            Outcome::TerminationFailed {
                reason: "denied".into(),
            },
        );
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["outcome"], "termination_failed");
        assert_eq!(json["reason"], "denied");
        assert_eq!(json["instance_id"], "i-2");
    }
}
