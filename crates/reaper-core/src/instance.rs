//! # Instance Snapshots
//!
//! An [`Instance`] is a read-only view of one compute instance as returned by
//! the inventory provider for a single cycle. Runtime is derived from the
//! launch timestamp at evaluation time and never cached.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tag key holding an instance's display name.
pub const NAME_TAG: &str = "Name";

/// Opaque provider identifier of an instance (e.g. `i-0123456789abcdef0`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wrap a provider identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Snapshot of one instance for the duration of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider identifier.
    pub id: InstanceId,
    /// Instance type (e.g. `t3.large`).
    pub instance_type: String,
    /// Launch timestamp. `None` when the provider omitted it, which the
    /// evaluator treats as a data-integrity error.
    pub launch_time: Option<DateTime<Utc>>,
    /// Current tags. Keys are unique.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Lifecycle state as reported by the provider (e.g. `running`).
    pub state: String,
    /// Network the instance lives in, if any.
    #[serde(default)]
    pub vpc_id: Option<String>,
}

impl Instance {
    /// Create a running instance with no tags.
    pub fn running(
        id: impl Into<InstanceId>,
        instance_type: impl Into<String>,
        launch_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            instance_type: instance_type.into(),
            launch_time: Some(launch_time),
            tags: BTreeMap::new(),
            state: crate::query::RUNNING_STATE.to_string(),
            vpc_id: None,
        }
    }

    /// Builder: add a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Builder: set the VPC.
    pub fn with_vpc(mut self, vpc_id: impl Into<String>) -> Self {
        self.vpc_id = Some(vpc_id.into());
        self
    }

    /// The `Name` tag value, if present.
    pub fn display_name(&self) -> Option<&str> {
        self.tags.get(NAME_TAG).map(String::as_str)
    }

    /// Time elapsed between launch and `now`. `None` without a launch time.
    ///
    /// Negative when the launch timestamp lies in the future (clock skew).
    pub fn runtime_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.launch_time.map(|launched| now - launched)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Express a duration as fractional hours.
pub fn duration_hours(d: Duration) -> f64 {
    match d.num_nanoseconds() {
        Some(ns) => ns as f64 / 3_600_000_000_000.0,
        None => d.num_milliseconds() as f64 / 3_600_000.0,
    }
}
