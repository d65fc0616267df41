//! # Cycle Controller
//!
//! Orchestrates one evaluation cycle and, in recurring mode, repeats it on a
//! schedule.
//!
//! ## State machine
//!
//! ```text
//! Idle -> Evaluating -> Remediating -> Notifying -> Idle
//!             |
//!             +-> Idle   (no violations, or retrieval failed)
//! ```
//!
//! ## Gating
//!
//! - Each recurring tick samples [`ActiveOwner`] exactly once. A replica that
//!   is not the owner skips the tick entirely; nothing is queued.
//! - At most one cycle runs per controller. A cycle requested while another
//!   is in flight is dropped and reported as [`CycleOutcome::Busy`].
//! - Shutdown is observed only while waiting for the next tick. A cycle that
//!   has started always runs to completion.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use reaper_core::{ActiveOwner, Clock, InventoryProvider, RetrievalError, SystemClock};

use crate::evaluation::ComplianceEvaluator;
use crate::notify::{Notifier, NotifyOutcome};
use crate::remediation::RemediationExecutor;
use crate::report::Report;
use crate::schedule::CronSchedule;

/// Where the controller is within a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Between cycles.
    #[default]
    Idle,
    /// Retrieving and matching inventory.
    Evaluating,
    /// Terminating (or simulating termination of) violators.
    Remediating,
    /// Handing the report to the notifier.
    Notifying,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Evaluating => "evaluating",
            Self::Remediating => "remediating",
            Self::Notifying => "notifying",
        };
        f.write_str(s)
    }
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No violations. Remediation and notification were skipped.
    Clean {
        /// Instances retrieved.
        scanned: usize,
    },
    /// Violations were found and acted on.
    Remediated {
        /// Outcome of every violation, in discovery order.
        report: Report,
        /// What the notifier did with the report.
        notification: NotifyOutcome,
    },
    /// Inventory retrieval failed; the cycle was aborted.
    RetrievalFailed(RetrievalError),
    /// Another cycle was already running; this one was dropped.
    Busy,
}

impl CycleOutcome {
    /// The report, if the cycle got as far as remediation.
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::Remediated { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// This replica was not the active owner; no cycle ran.
    NotActiveOwner,
    /// A cycle was attempted.
    Ran(CycleOutcome),
}

/// Counters accumulated by [`CycleController::run_recurring`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    /// Ticks fired.
    pub ticks: usize,
    /// Cycles that ran to completion (including clean ones).
    pub cycles: usize,
    /// Ticks skipped because this replica was not the owner.
    pub not_owner: usize,
    /// Ticks dropped because a cycle was in flight.
    pub busy: usize,
    /// Cycles aborted by a retrieval failure.
    pub retrieval_failures: usize,
}

impl LoopStats {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::NotActiveOwner => self.not_owner += 1,
            TickOutcome::Ran(CycleOutcome::Busy) => self.busy += 1,
            TickOutcome::Ran(CycleOutcome::RetrievalFailed(_)) => self.retrieval_failures += 1,
            TickOutcome::Ran(_) => self.cycles += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Sending half of a shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half of a shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once shutdown is requested. If the trigger is dropped without
    /// firing, never resolves.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a linked shutdown trigger and receiver.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), Shutdown(rx))
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Runs evaluation cycles against one provider.
pub struct CycleController {
    provider: Arc<dyn InventoryProvider>,
    evaluator: ComplianceEvaluator,
    executor: RemediationExecutor,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    state: Mutex<CycleState>,
    in_flight: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for CycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleController")
            .field("provider", &self.provider.provider_name())
            .field("dry_run", &self.executor.is_dry_run())
            .field("notifier", &self.notifier)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl CycleController {
    /// Create a controller using the system clock.
    pub fn new(
        provider: Arc<dyn InventoryProvider>,
        evaluator: ComplianceEvaluator,
        executor: RemediationExecutor,
        notifier: Notifier,
    ) -> Self {
        Self {
            provider,
            evaluator,
            executor,
            notifier,
            clock: Arc::new(SystemClock),
            state: Mutex::new(CycleState::Idle),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the clock used for runtime verdicts and tick scheduling.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current state.
    pub fn state(&self) -> CycleState {
        *self.state.lock()
    }

    /// The evaluator in use.
    pub fn evaluator(&self) -> &ComplianceEvaluator {
        &self.evaluator
    }

    /// Whether terminations are simulated.
    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    fn enter(&self, next: CycleState) {
        let mut state = self.state.lock();
        tracing::debug!(from = %*state, to = %next, "cycle state transition");
        *state = next;
    }

    /// Run one cycle now, unless one is already running.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::warn!("cycle already in progress, dropping request");
            return CycleOutcome::Busy;
        };

        let cycle_id = Uuid::new_v4();
        self.execute()
            .instrument(tracing::info_span!("cycle", cycle_id = %cycle_id))
            .await
    }

    async fn execute(&self) -> CycleOutcome {
        let now = self.clock.now();
        tracing::info!(dry_run = self.executor.is_dry_run(), "starting cycle");

        self.enter(CycleState::Evaluating);
        let evaluation = match self.evaluator.evaluate(self.provider.as_ref(), now).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::error!(error = %e, "inventory retrieval failed, aborting cycle");
                self.enter(CycleState::Idle);
                return CycleOutcome::RetrievalFailed(e);
            }
        };

        if evaluation.violations.is_empty() {
            tracing::info!(
                scanned = evaluation.scanned,
                pages = evaluation.pages,
                "no long-running instances found"
            );
            self.enter(CycleState::Idle);
            return CycleOutcome::Clean {
                scanned: evaluation.scanned,
            };
        }

        tracing::info!(
            scanned = evaluation.scanned,
            violations = evaluation.violations.len(),
            "found long-running instances"
        );

        self.enter(CycleState::Remediating);
        let report = self
            .executor
            .remediate(self.provider.as_ref(), &evaluation.violations)
            .await;

        self.enter(CycleState::Notifying);
        let notification = self.notifier.notify(&report).await;

        let summary = report.summary();
        tracing::info!(
            found = summary.found,
            terminated = summary.terminated,
            failed = summary.failed,
            simulated = summary.simulated,
            "cycle complete"
        );
        self.enter(CycleState::Idle);

        CycleOutcome::Remediated {
            report,
            notification,
        }
    }

    /// One scheduler tick: sample ownership once, then maybe run a cycle.
    pub async fn tick(&self, owner: &dyn ActiveOwner) -> TickOutcome {
        if !owner.is_active_owner() {
            tracing::info!("not the active owner, skipping tick");
            return TickOutcome::NotActiveOwner;
        }
        TickOutcome::Ran(self.run_cycle().await)
    }

    /// Tick on `schedule` until `shutdown` fires.
    ///
    /// With `run_on_start` one tick fires immediately. The next fire time is
    /// computed from the clock after each tick finishes, so ticks missed
    /// during a slow cycle are skipped rather than queued.
    pub async fn run_recurring(
        &self,
        schedule: &CronSchedule,
        owner: &dyn ActiveOwner,
        mut shutdown: Shutdown,
        run_on_start: bool,
    ) -> LoopStats {
        let mut stats = LoopStats::default();
        tracing::info!(schedule = %schedule, "starting recurring mode");

        if run_on_start && !shutdown.is_triggered() {
            let outcome = self.tick(owner).await;
            stats.record(&outcome);
        }

        loop {
            let now = self.clock.now();
            let Some(next) = schedule.next_after(now) else {
                tracing::warn!(schedule = %schedule, "schedule has no further fire times");
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next = %next, "waiting for next tick");

            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    tracing::info!("shutdown requested, leaving recurring mode");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let outcome = self.tick(owner).await;
            stats.record(&outcome);
        }

        tracing::info!(
            ticks = stats.ticks,
            cycles = stats.cycles,
            not_owner = stats.not_owner,
            busy = stats.busy,
            retrieval_failures = stats.retrieval_failures,
            "recurring mode stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration as StdDuration;

    use super::*;
    use crate::remediation::RemediationSettings;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use reaper_core::{
        AlwaysActive, FleetScope, Instance, InstanceId, InstancePage, InstanceQuery, PolicyRecord, PolicySet,
        TerminationError,
    };
    use reaper_provider::mock::{FixedClock, MockInventory, RecordingSink};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn evaluator(hours: f64) -> ComplianceEvaluator {
        ComplianceEvaluator::new(
            PolicySet::from_records(vec![PolicyRecord {
                instance_type: None,
                name: None,
                tags: Default::default(),
                max_runtime_hours: hours,
            }])
            .unwrap(),
            FleetScope::default(),
        )
    }

    fn aged(id: &str, hours: i64) -> Instance {
        Instance::running(id, "t3.large", now() - Duration::hours(hours))
    }

    fn controller(
        provider: Arc<dyn InventoryProvider>,
        sink: Arc<RecordingSink>,
        dry_run: bool,
    ) -> CycleController {
        CycleController::new(
            provider,
            evaluator(24.0),
            RemediationExecutor::new(RemediationSettings {
                dry_run,
                ..RemediationSettings::default()
            }),
            Notifier::new(sink),
        )
        .with_clock(Arc::new(FixedClock::new(now())))
    }

    /// Answers from a script; fires shutdown once the script runs out.
    struct ScriptedOwner {
        answers: parking_lot::Mutex<VecDeque<bool>>,
        trigger: ShutdownTrigger,
    }

    impl ScriptedOwner {
        fn new(answers: &[bool], trigger: ShutdownTrigger) -> Self {
            Self {
                answers: parking_lot::Mutex::new(answers.iter().copied().collect()),
                trigger,
            }
        }
    }

    impl ActiveOwner for ScriptedOwner {
        fn is_active_owner(&self) -> bool {
            let mut answers = self.answers.lock();
            let answer = answers.pop_front().unwrap_or(false);
            if answers.is_empty() {
                self.trigger.trigger();
            }
            answer
        }
    }

    struct NeverOwner;

    impl ActiveOwner for NeverOwner {
        fn is_active_owner(&self) -> bool {
            false
        }
    }

    /// Delays every listing call.
    struct SlowInventory {
        inner: MockInventory,
        delay: StdDuration,
    }

    #[async_trait]
    impl InventoryProvider for SlowInventory {
        async fn list_running_instances(
            &self,
            query: &InstanceQuery,
            page_token: Option<&str>,
        ) -> Result<InstancePage, RetrievalError> {
            tokio::time::sleep(self.delay).await;
            self.inner.list_running_instances(query, page_token).await
        }

        async fn terminate(&self, instance_id: &InstanceId) -> Result<(), TerminationError> {
            self.inner.terminate(instance_id).await
        }

        fn provider_name(&self) -> &str {
            "SlowInventory"
        }
    }

    #[tokio::test]
    async fn clean_cycle_skips_remediation_and_notification() {
        let provider = Arc::new(MockInventory::paged(vec![vec![aged("i-1", 2)]]));
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink.clone(), false);

        let outcome = c.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::Clean { scanned: 1 });
        assert_eq!(sink.attempts(), 0);
        assert_eq!(provider.terminate_calls(), 0);
        assert_eq!(c.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn violations_are_remediated_and_reported() {
        let provider = Arc::new(MockInventory::paged(vec![vec![
            aged("i-old", 30),
            aged("i-new", 1),
        ]]));
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink.clone(), false);

        let outcome = c.run_cycle().await;
        let report = outcome.report().expect("remediated");
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].instance_id.as_str(), "i-old");
        assert_eq!(provider.terminated(), vec![InstanceId::new("i-old")]);

        let sent = sink.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("Successfully terminated instance i-old"));
        assert_eq!(c.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn dry_run_cycle_reports_without_terminating() {
        let provider = Arc::new(MockInventory::paged(vec![vec![aged("i-old", 30)]]));
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink.clone(), true);

        let outcome = c.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Remediated {
                notification: NotifyOutcome::Delivered,
                ..
            }
        ));
        assert_eq!(provider.terminate_calls(), 0);
        assert!(sink.messages()[0]
            .body
            .contains("DRY RUN: would terminate instance i-old"));
    }

    #[tokio::test]
    async fn retrieval_failure_aborts_cycle() {
        let provider = Arc::new(
            MockInventory::paged(vec![vec![aged("i-old", 30)], vec![aged("i-older", 40)]])
                .failing_on_page(2, "throttled"),
        );
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink.clone(), false);

        let outcome = c.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::RetrievalFailed(ref e) if e.page == 2));
        assert_eq!(provider.terminate_calls(), 0);
        assert_eq!(sink.attempts(), 0);
        assert_eq!(c.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_cycle() {
        let provider = Arc::new(MockInventory::paged(vec![vec![aged("i-old", 30)]]));
        let sink = Arc::new(RecordingSink::failing("unreachable"));
        let c = controller(provider.clone(), sink.clone(), false);

        let outcome = c.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Remediated {
                notification: NotifyOutcome::Failed(_),
                ..
            }
        ));
        assert_eq!(provider.terminate_calls(), 1);
    }

    #[tokio::test]
    async fn non_owner_tick_makes_no_provider_calls() {
        let provider = Arc::new(MockInventory::paged(vec![vec![aged("i-old", 30)]]));
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink.clone(), false);

        assert_eq!(c.tick(&NeverOwner).await, TickOutcome::NotActiveOwner);
        assert_eq!(provider.list_calls(), 0);
        assert_eq!(provider.terminate_calls(), 0);
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_cycle_is_dropped() {
        let provider = Arc::new(SlowInventory {
            inner: MockInventory::paged(vec![vec![aged("i-old", 30)]]),
            delay: StdDuration::from_secs(5),
        });
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink, true);

        let (first, second) = tokio::join!(c.run_cycle(), c.run_cycle());
        assert!(matches!(first, CycleOutcome::Remediated { .. }));
        assert_eq!(second, CycleOutcome::Busy);
        assert_eq!(provider.inner.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_loop_honours_ownership_each_tick() {
        let provider = Arc::new(MockInventory::paged(vec![vec![aged("i-old", 30)]]));
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink.clone(), true);
        let schedule = CronSchedule::parse("@every 10m").unwrap();

        let (trigger, shutdown) = shutdown_channel();
        let owner = ScriptedOwner::new(&[true, false, true], trigger);
        let stats = c.run_recurring(&schedule, &owner, shutdown, true).await;

        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.not_owner, 1);
        assert_eq!(provider.list_calls(), 2);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_idle_starts_no_cycle() {
        let provider = Arc::new(MockInventory::paged(vec![vec![aged("i-old", 30)]]));
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink, true);
        let schedule = CronSchedule::parse("@every 1h").unwrap();

        let (trigger, shutdown) = shutdown_channel();
        trigger.trigger();
        let stats = c.run_recurring(&schedule, &AlwaysActive, shutdown, true).await;

        assert_eq!(stats, LoopStats::default());
        assert_eq!(provider.list_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_cycle_lets_the_cycle_finish() {
        let provider = Arc::new(MockInventory::paged(vec![vec![
            aged("i-1", 30),
            aged("i-2", 30),
        ]]));
        let sink = Arc::new(RecordingSink::new());
        let c = controller(provider.clone(), sink.clone(), false);
        let schedule = CronSchedule::parse("@every 10m").unwrap();

        // Shutdown fires as the only tick samples ownership, i.e. before the
        // cycle starts work.
        let (trigger, shutdown) = shutdown_channel();
        let owner = ScriptedOwner::new(&[true], trigger);
        let stats = c.run_recurring(&schedule, &owner, shutdown, true).await;

        assert_eq!(stats.cycles, 1);
        assert_eq!(provider.terminate_calls(), 2);
        assert_eq!(sink.attempts(), 1);
        assert_eq!(c.state(), CycleState::Idle);
    }

    #[test]
    fn shutdown_is_observable_by_clones() {
        let (trigger, shutdown) = shutdown_channel();
        let other = shutdown.clone();
        assert!(!shutdown.is_triggered());
        trigger.trigger();
        assert!(shutdown.is_triggered());
        assert!(other.is_triggered());
    }
}
