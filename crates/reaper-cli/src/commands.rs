//! # Command Handlers
//!
//! Each handler returns the process exit code:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success (including cycles that found nothing) |
//! | 1 | configuration or startup failure |
//! | 2 | one-shot cycle aborted by an inventory retrieval failure |
//!
//! Termination and notification failures never change the exit code; they
//! are reported in the alert and the logs.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;

use reaper_core::{AlwaysActive, Clock, InventoryProvider, NotificationSink, PolicySet, SystemClock};
use reaper_election::{ElectionConfig, KubeLeaseStore, LeaseElector, LeaseStore};
use reaper_engine::{
    shutdown_channel, ComplianceEvaluator, CronSchedule, CycleController, CycleOutcome, LoopStats,
    Notifier, RemediationExecutor, Shutdown,
};
use reaper_provider::{load_sdk_config, Ec2Inventory, SnsSink, WebhookSink};

use crate::settings::{NotificationTarget, Settings};
use crate::signal::wait_for_shutdown_signal;

/// Exit code: success.
pub const EXIT_OK: u8 = 0;
/// Exit code: configuration or startup failure.
pub const EXIT_CONFIG: u8 = 1;
/// Exit code: one-shot cycle aborted by a retrieval failure.
pub const EXIT_RETRIEVAL: u8 = 2;

/// Assemble a controller from already-built collaborators.
pub fn assemble(
    settings: &Settings,
    policies: PolicySet,
    provider: Arc<dyn InventoryProvider>,
    sink: Option<Arc<dyn NotificationSink>>,
    force_dry_run: bool,
) -> CycleController {
    CycleController::new(
        provider,
        ComplianceEvaluator::new(policies, settings.fleet_scope()),
        RemediationExecutor::new(settings.remediation(force_dry_run)),
        Notifier::from_option(sink),
    )
}

/// Exit code for a one-shot cycle outcome.
pub fn exit_code(outcome: &CycleOutcome) -> u8 {
    match outcome {
        CycleOutcome::RetrievalFailed(_) => EXIT_RETRIEVAL,
        _ => EXIT_OK,
    }
}

async fn build_controller(
    settings: &Settings,
    force_dry_run: bool,
) -> anyhow::Result<CycleController> {
    let policies = settings.load_policies()?;
    tracing::info!(
        policies = policies.len(),
        path = %settings.config_path.display(),
        "loaded policies"
    );

    let sdk = load_sdk_config(&settings.region).await;
    let provider: Arc<dyn InventoryProvider> = Arc::new(Ec2Inventory::from_conf(&sdk));
    let sink: Option<Arc<dyn NotificationSink>> = match &settings.notification {
        NotificationTarget::None => None,
        NotificationTarget::Sns(arn) => Some(Arc::new(SnsSink::from_conf(&sdk, arn.clone()))),
        NotificationTarget::Webhook(url) => {
            Some(Arc::new(WebhookSink::new(url).context("configuring webhook notifications")?))
        }
    };

    let controller = assemble(settings, policies, provider, sink, force_dry_run);
    tracing::info!(
        region = %settings.region,
        dry_run = controller.is_dry_run(),
        notification = %settings.notification,
        query = %controller.evaluator().query(),
        "checker initialised"
    );
    Ok(controller)
}

/// `reaper run`: one cycle, then exit.
pub async fn run_once(settings: &Settings, force_dry_run: bool) -> anyhow::Result<u8> {
    let controller = build_controller(settings, force_dry_run).await?;
    tracing::info!("starting single run");
    let outcome = controller.run_cycle().await;
    Ok(exit_code(&outcome))
}

/// `reaper cron`: tick on `SCHEDULE` until SIGINT/SIGTERM.
pub async fn run_cron(settings: &Settings) -> anyhow::Result<u8> {
    let schedule = settings.cron_schedule()?;
    let controller = build_controller(settings, false).await?;

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        trigger.trigger();
    });

    let stats = match &settings.election {
        None => {
            controller
                .run_recurring(&schedule, &AlwaysActive, shutdown, true)
                .await
        }
        Some(election) => {
            let store = KubeLeaseStore::in_cluster(&election.namespace, &election.lease_name)
                .context("configuring leader election")?;
            let elector = LeaseElector::new(store, ElectionConfig::new(&election.pod_name));
            run_with_election(&controller, &schedule, elector, shutdown).await
        }
    };

    tracing::info!(cycles = stats.cycles, "shutdown complete");
    Ok(EXIT_OK)
}

/// Recurring mode gated on a lease held by `elector`.
///
/// The elector stops, releasing the lease, when `shutdown` fires or when the
/// loop ends on its own because the schedule has no further fire times.
pub async fn run_with_election<S>(
    controller: &CycleController,
    schedule: &CronSchedule,
    elector: LeaseElector<S>,
    shutdown: Shutdown,
) -> LoopStats
where
    S: LeaseStore + 'static,
{
    let flag = elector.flag();
    let (loop_done, loop_ended) = tokio::sync::oneshot::channel::<()>();

    let election_task = tokio::spawn({
        let mut shutdown = shutdown.clone();
        async move {
            elector
                .run(async move {
                    tokio::select! {
                        _ = shutdown.wait() => {}
                        _ = loop_ended => {}
                    }
                })
                .await
        }
    });

    let stats = controller
        .run_recurring(schedule, &flag, shutdown, true)
        .await;
    drop(loop_done);
    if let Err(e) = election_task.await {
        tracing::warn!(error = %e, "leader election task ended abnormally");
    }
    stats
}

/// `reaper validate`: load everything, print the plan, touch nothing.
pub fn run_validate(settings: &Settings, out: &mut dyn Write) -> anyhow::Result<u8> {
    let policies = settings.load_policies()?;
    let evaluator = ComplianceEvaluator::new(policies, settings.fleet_scope());

    writeln!(out, "Policies ({}), first match wins:", evaluator.policies().len())?;
    for policy in evaluator.policies().iter() {
        writeln!(out, "  {policy}")?;
    }
    writeln!(out, "Provider query: {}", evaluator.query())?;
    writeln!(out, "Dry run: {}", settings.dry_run)?;
    writeln!(out, "Termination concurrency: {}", settings.termination_concurrency)?;
    writeln!(out, "Notification: {}", settings.notification)?;

    if settings.schedule.is_some() {
        let schedule = settings.cron_schedule()?;
        match schedule.next_after(SystemClock.now()) {
            Some(next) => writeln!(out, "Schedule: {schedule} (next: {})", next.to_rfc3339())?,
            None => writeln!(out, "Schedule: {schedule} (never fires)")?,
        }
    }
    if let Some(election) = &settings.election {
        writeln!(
            out,
            "Leader election: {}/{} as {}",
            election.namespace, election.lease_name, election.pod_name
        )?;
    }
    Ok(EXIT_OK)
}
