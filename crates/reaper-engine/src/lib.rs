//! # reaper-engine: Compliance Evaluation and Termination
//!
//! Flags instances whose runtime exceeds a configured policy threshold,
//! terminates them (or simulates termination in dry-run mode), and reports
//! the outcome to an operator channel.
//!
//! ## Pipeline
//!
//! ```text
//! CycleController
//!   └─ ComplianceEvaluator ── build_query ──▶ InventoryProvider (paged)
//!        └─ matcher::matches (first match wins)
//!   └─ RemediationExecutor ──▶ InventoryProvider::terminate
//!   └─ Notifier ──▶ NotificationSink
//! ```
//!
//! ## Guarantees
//!
//! - **Determinism.** Given the same inventory snapshot, policy set and
//!   clock reading, a cycle produces the same violations in the same order.
//! - **First match wins.** Each instance is judged by the first policy (in
//!   configured order) whose selectors it satisfies; later policies are
//!   never consulted for it.
//! - **Single flight.** At most one cycle runs per controller; ticks that
//!   arrive while a cycle is in flight are dropped.
//! - **Owner gating.** Recurring ticks run only while the injected
//!   `ActiveOwner` says so. The engine knows nothing about how ownership is
//!   decided.

pub mod controller;
pub mod evaluation;
pub mod matcher;
pub mod notify;
pub mod query;
pub mod remediation;
pub mod report;
pub mod schedule;

// Re-export primary types.
pub use controller::{
    shutdown_channel, CycleController, CycleOutcome, CycleState, LoopStats, Shutdown,
    ShutdownTrigger, TickOutcome,
};
pub use evaluation::{ComplianceEvaluator, Evaluation, Violation};
pub use matcher::matches;
pub use notify::{Notifier, NotifyOutcome, ALERT_SUBJECT};
pub use query::build_query;
pub use remediation::{RemediationExecutor, RemediationSettings};
pub use report::{Outcome, Report, ReportEntry, ReportSummary};
pub use schedule::{CronSchedule, ScheduleError};
