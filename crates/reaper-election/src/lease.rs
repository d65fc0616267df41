//! # Lease Model
//!
//! Wire shape of a `coordination.k8s.io/v1` `Lease` and the pure decision
//! rule every replica applies to it.
//!
//! ## Decision rule
//!
//! | Lease state | Decision |
//! |-------------|----------|
//! | absent, or no holder | acquire |
//! | held by us | renew |
//! | held by another, `renewTime + leaseDurationSeconds < now` | acquire (take over) |
//! | held by another, not expired | follow |
//!
//! A lease with a holder but no renew or acquire time counts as expired.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// API group/version of the Lease resource.
pub const LEASE_API_VERSION: &str = "coordination.k8s.io/v1";

/// `MicroTime` serialization: RFC 3339 with exactly six fractional digits.
mod micro_time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

/// Lease `metadata` fields the elector uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseMeta {
    /// Object name.
    pub name: String,
    /// Namespace.
    #[serde(default)]
    pub namespace: String,
    /// Optimistic-concurrency token; must round-trip on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

/// Lease `spec`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseSpec {
    /// Current holder; `None` or empty when released.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_identity: Option<String>,
    /// How long a renewal keeps the lease.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,
    /// When the current holder acquired it.
    #[serde(default, with = "micro_time", skip_serializing_if = "Option::is_none")]
    pub acquire_time: Option<DateTime<Utc>>,
    /// Last renewal by the current holder.
    #[serde(default, with = "micro_time", skip_serializing_if = "Option::is_none")]
    pub renew_time: Option<DateTime<Utc>>,
    /// Number of holder changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_transitions: Option<i32>,
}

impl LeaseSpec {
    /// The holder, treating an empty identity as none.
    pub fn holder(&self) -> Option<&str> {
        self.holder_identity.as_deref().filter(|h| !h.is_empty())
    }

    /// Whether the lease has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.renew_time.or(self.acquire_time) else {
            return true;
        };
        let ttl = Duration::seconds(i64::from(self.lease_duration_seconds.unwrap_or(0)));
        last + ttl < now
    }
}

/// A `coordination.k8s.io/v1` Lease object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    /// Always [`LEASE_API_VERSION`].
    pub api_version: String,
    /// Always `Lease`.
    pub kind: String,
    /// Object metadata.
    pub metadata: LeaseMeta,
    /// Lease state.
    #[serde(default)]
    pub spec: LeaseSpec,
}

impl Lease {
    /// A new lease object with no resource version.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: LeaseSpec) -> Self {
        Self {
            api_version: LEASE_API_VERSION.to_string(),
            kind: "Lease".to_string(),
            metadata: LeaseMeta {
                name: name.into(),
                namespace: namespace.into(),
                resource_version: None,
            },
            spec,
        }
    }
}

/// What a replica should do with the lease it just read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Take the lease (it is free or expired).
    Acquire,
    /// Extend our own hold.
    Renew,
    /// Someone else holds a live lease.
    Follow {
        /// The current holder.
        holder: String,
    },
}

/// Apply the decision rule for `identity` at `now`.
pub fn decide(spec: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>) -> Decision {
    let Some(spec) = spec else {
        return Decision::Acquire;
    };
    match spec.holder() {
        None => Decision::Acquire,
        Some(holder) if holder == identity => Decision::Renew,
        Some(_) if spec.is_expired(now) => Decision::Acquire,
        Some(holder) => Decision::Follow {
            holder: holder.to_string(),
        },
    }
}
