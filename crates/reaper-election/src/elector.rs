//! # Lease Elector
//!
//! Runs the acquire/renew loop for one replica and publishes the result
//! into an [`OwnershipFlag`]. The cycle controller only ever reads that flag
//! through [`ActiveOwner`].
//!
//! ## Timing (defaults)
//!
//! - `lease_duration` 15s: how long a renewal keeps the lease.
//! - `renew_deadline` 10s: a leader whose renewals keep failing gives up
//!   ownership this long after its last successful renewal.
//! - `retry_period` 2s: interval between rounds, for leaders and followers.
//!
//! On shutdown a leader releases the lease so a peer can take over
//! immediately instead of waiting out the lease duration.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use reaper_core::{ActiveOwner, Clock, SystemClock};

use crate::error::ElectionError;
use crate::lease::{decide, Decision, Lease, LeaseSpec};
use crate::store::LeaseStore;

/// Shared, lock-free ownership flag.
#[derive(Debug, Clone, Default)]
pub struct OwnershipFlag(Arc<AtomicBool>);

impl OwnershipFlag {
    fn set(&self, owner: bool) -> bool {
        self.0.swap(owner, Ordering::SeqCst)
    }
}

impl ActiveOwner for OwnershipFlag {
    fn is_active_owner(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Elector configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    /// This replica's identity (the pod name).
    pub identity: String,
    /// How long a renewal keeps the lease.
    pub lease_duration: Duration,
    /// How long a leader tolerates failed renewals.
    pub renew_deadline: Duration,
    /// Interval between rounds.
    pub retry_period: Duration,
}

impl ElectionConfig {
    /// Default timings for `identity`.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
        }
    }
}

/// Drives one replica's participation in the election.
pub struct LeaseElector<S> {
    store: S,
    config: ElectionConfig,
    flag: OwnershipFlag,
    clock: Arc<dyn Clock>,
}

impl<S: LeaseStore> LeaseElector<S> {
    /// Create an elector. The flag starts false.
    pub fn new(store: S, config: ElectionConfig) -> Self {
        Self {
            store,
            config,
            flag: OwnershipFlag::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for lease timestamps and expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// A handle to the ownership flag.
    pub fn flag(&self) -> OwnershipFlag {
        self.flag.clone()
    }

    /// This replica's identity.
    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    fn lease_seconds(&self) -> i32 {
        i32::try_from(self.config.lease_duration.as_secs()).unwrap_or(i32::MAX)
    }

    /// One round: read the lease and acquire, renew or follow. Returns
    /// whether this replica holds the lease afterwards. Losing a write race
    /// is not an error.
    pub async fn try_acquire_or_renew(&self) -> Result<bool, ElectionError> {
        let now = self.clock.now();
        let identity = self.config.identity.as_str();
        let current = self.store.get().await?;

        let written = match current {
            None => {
                let lease = Lease::new(
                    self.store.namespace(),
                    self.store.lease_name(),
                    LeaseSpec {
                        holder_identity: Some(identity.to_string()),
                        lease_duration_seconds: Some(self.lease_seconds()),
                        acquire_time: Some(now),
                        renew_time: Some(now),
                        lease_transitions: Some(0),
                    },
                );
                self.store.create(&lease).await
            }
            Some(mut lease) => match decide(Some(&lease.spec), identity, now) {
                Decision::Renew => {
                    lease.spec.renew_time = Some(now);
                    lease.spec.lease_duration_seconds = Some(self.lease_seconds());
                    self.store.update(&lease).await
                }
                Decision::Acquire => {
                    let previous = lease.spec.holder().map(String::from);
                    let transitions = lease.spec.lease_transitions.unwrap_or(0);
                    lease.spec = LeaseSpec {
                        holder_identity: Some(identity.to_string()),
                        lease_duration_seconds: Some(self.lease_seconds()),
                        acquire_time: Some(now),
                        renew_time: Some(now),
                        lease_transitions: Some(if previous.is_some() {
                            transitions + 1
                        } else {
                            transitions
                        }),
                    };
                    if let Some(previous) = previous {
                        tracing::info!(previous_holder = %previous, "taking over expired lease");
                    }
                    self.store.update(&lease).await
                }
                Decision::Follow { holder } => {
                    tracing::debug!(holder = %holder, "lease held by another replica");
                    return Ok(false);
                }
            },
        };

        match written {
            Ok(_) => Ok(true),
            Err(ElectionError::Conflict) => {
                tracing::debug!("lost lease write race");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Give up the lease if this replica holds it.
    pub async fn release(&self) -> Result<(), ElectionError> {
        self.flag.set(false);
        let Some(mut lease) = self.store.get().await? else {
            return Ok(());
        };
        if lease.spec.holder() != Some(self.config.identity.as_str()) {
            return Ok(());
        }
        lease.spec.holder_identity = None;
        lease.spec.lease_duration_seconds = Some(1);
        lease.spec.renew_time = Some(self.clock.now());
        self.store.update(&lease).await?;
        tracing::info!(identity = %self.config.identity, "released lease");
        Ok(())
    }

    /// Participate until `shutdown` resolves, then release.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut last_renewal: Option<Instant> = None;

        tracing::info!(
            identity = %self.config.identity,
            namespace = %self.store.namespace(),
            lease = %self.store.lease_name(),
            "starting leader election"
        );

        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    last_renewal = Some(Instant::now());
                    if !self.flag.set(true) {
                        tracing::info!(identity = %self.config.identity, "became leader");
                    }
                }
                Ok(false) => {
                    last_renewal = None;
                    if self.flag.set(false) {
                        tracing::warn!(identity = %self.config.identity, "lost leadership");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "lease round failed");
                    let deadline_passed = last_renewal
                        .map_or(true, |t| t.elapsed() > self.config.renew_deadline);
                    if deadline_passed && self.flag.set(false) {
                        tracing::warn!(
                            identity = %self.config.identity,
                            "renew deadline exceeded, lost leadership"
                        );
                    }
                }
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.retry_period) => {}
            }
        }

        if self.flag.is_active_owner() {
            if let Err(e) = self.release().await {
                tracing::warn!(error = %e, "failed to release lease");
            }
        }
        self.flag.set(false);
        tracing::info!(identity = %self.config.identity, "leader election stopped");
    }
}
