//! # Collaborator Traits
//!
//! The engine is written against these capabilities and nothing else. The
//! process shell wires concrete implementations (AWS, SNS, a lease-based
//! elector); tests wire the deterministic mocks from `reaper-provider`.
//!
//! All traits are object-safe and `Send + Sync` so implementations can be
//! shared behind an `Arc` across async tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{NotificationError, RetrievalError, TerminationError};
use crate::instance::{Instance, InstanceId};
use crate::query::InstanceQuery;

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstancePage {
    /// Instances on this page, in provider order.
    pub instances: Vec<Instance>,
    /// Token for the next page. `None` on the last page.
    pub next_token: Option<String>,
}

impl InstancePage {
    /// A final page.
    pub fn last(instances: Vec<Instance>) -> Self {
        Self {
            instances,
            next_token: None,
        }
    }
}

/// Source of instance snapshots and the termination capability.
///
/// Listing is modelled as a restartable, finite sequence of pages: calling
/// `list_running_instances` with `page_token = None` always starts over,
/// and each page names its successor.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Fetch one page of instances admitted by `query`.
    async fn list_running_instances(
        &self,
        query: &InstanceQuery,
        page_token: Option<&str>,
    ) -> Result<InstancePage, RetrievalError>;

    /// Terminate exactly one instance.
    async fn terminate(&self, instance_id: &InstanceId) -> Result<(), TerminationError>;

    /// Human-readable name of this implementation (e.g. "Ec2Inventory").
    fn provider_name(&self) -> &str;
}

/// Outbound alert transport.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one message.
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError>;

    /// Human-readable destination for logs (topic ARN, URL host, ...).
    fn destination(&self) -> String;
}

/// "Am I currently the sole active runner?"
///
/// Sampled once per scheduler tick. The value may change between any two
/// samples; the engine never assumes it is stable.
pub trait ActiveOwner: Send + Sync {
    /// Whether this replica may run cycles right now.
    fn is_active_owner(&self) -> bool;
}

/// Ownership signal for single-replica deployments: always the owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysActive;

impl ActiveOwner for AlwaysActive {
    fn is_active_owner(&self) -> bool {
        true
    }
}

/// Wall-clock source. Injected so runtime verdicts are reproducible in tests.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
