//! # Runtime Policies
//!
//! A policy selects instances by type, `Name` tag pattern and tag set, and
//! caps how long a selected instance may run.
//!
//! Policies arrive as [`PolicyRecord`]s (the on-disk shape: an ordered list
//! of `{instanceType, name, tags, maxRuntimeHours}` objects) and are
//! validated once into a [`PolicySet`]. The set is immutable for the rest of
//! the process lifetime; its order is the evaluation order.
//!
//! ## Empty selectors
//!
//! An empty `instanceType`, empty `name` or empty `tags` means "no
//! constraint". A policy with every selector empty matches all instances and
//! only its runtime threshold governs.
//!
//! ## Thresholds
//!
//! `maxRuntimeHours` must be finite. Zero and negative values are accepted:
//! such a policy flags instances the moment they are running.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const NANOS_PER_HOUR: f64 = 3_600_000_000_000.0;

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// On-disk policy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    /// Exact instance type to select. Empty or absent selects any type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    /// `Name` tag pattern; `*` matches any run of characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tags that must all be present with exactly these values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Maximum runtime in hours before an instance is flagged.
    pub max_runtime_hours: f64,
}

/// Compiled `Name` tag pattern.
///
/// Only the `*` wildcard is supported. Consecutive stars are collapsed.
/// `?`, `[` and `]` are rejected rather than treated as literals, so a
/// pattern written for a richer glob dialect fails loudly at startup.
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    compiled: glob::Pattern,
}

impl NamePattern {
    /// Compile a pattern. `index` is the 1-based policy position used in
    /// error messages.
    pub fn new(raw: &str, index: usize) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedPattern {
            index,
            pattern: raw.to_string(),
            reason,
        };

        if let Some(c) = raw.chars().find(|c| matches!(*c, '?' | '[' | ']')) {
            return Err(malformed(format!(
                "unsupported wildcard {c:?}; only '*' is allowed"
            )));
        }

        let mut collapsed = String::with_capacity(raw.len());
        for c in raw.chars() {
            if c == '*' && collapsed.ends_with('*') {
                continue;
            }
            collapsed.push(c);
        }

        let compiled = glob::Pattern::new(&collapsed).map_err(|e| malformed(e.to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            compiled,
        })
    }

    /// Whether `name` matches the whole pattern. Case-sensitive.
    pub fn matches(&self, name: &str) -> bool {
        self.compiled.matches_with(name, MATCH_OPTIONS)
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// A validated policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    index: usize,
    instance_type: Option<String>,
    name_pattern: Option<NamePattern>,
    tags: BTreeMap<String, String>,
    max_runtime_hours: f64,
    max_runtime: Duration,
}

impl Policy {
    /// Validate a record. `index` is its 1-based position in the list.
    pub fn from_record(record: PolicyRecord, index: usize) -> Result<Self, ConfigError> {
        let hours = record.max_runtime_hours;
        if !hours.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                index,
                value: hours,
            });
        }
        if hours <= 0.0 {
            tracing::warn!(
                policy = index,
                max_runtime_hours = hours,
                "policy threshold is not positive; matching instances are flagged immediately"
            );
        }
        if record.tags.keys().any(|k| k.is_empty()) {
            return Err(ConfigError::EmptyTagKey { index });
        }

        let instance_type = record.instance_type.filter(|t| !t.is_empty());
        let name_pattern = match record.name.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(NamePattern::new(raw, index)?),
        };

        // `as` saturates, so absurdly large thresholds clamp instead of wrapping.
        let max_runtime = Duration::nanoseconds((hours * NANOS_PER_HOUR).round() as i64);

        Ok(Self {
            index,
            instance_type,
            name_pattern,
            tags: record.tags,
            max_runtime_hours: hours,
            max_runtime,
        })
    }

    /// 1-based position in the configured list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Required instance type, if constrained.
    pub fn instance_type(&self) -> Option<&str> {
        self.instance_type.as_deref()
    }

    /// Required `Name` pattern, if constrained.
    pub fn name_pattern(&self) -> Option<&NamePattern> {
        self.name_pattern.as_ref()
    }

    /// Required tags. Empty means unconstrained.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Threshold as configured, in hours.
    pub fn max_runtime_hours(&self) -> f64 {
        self.max_runtime_hours
    }

    /// Threshold as an exact duration (nanosecond resolution).
    pub fn max_runtime(&self) -> Duration {
        self.max_runtime
    }

    /// Whether `runtime` strictly exceeds the threshold.
    pub fn is_exceeded_by(&self, runtime: Duration) -> bool {
        runtime > self.max_runtime
    }

    /// Whether every selector is empty.
    pub fn selects_everything(&self) -> bool {
        self.instance_type.is_none() && self.name_pattern.is_none() && self.tags.is_empty()
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)?;
        if let Some(t) = &self.instance_type {
            write!(f, " type={t}")?;
        }
        if let Some(p) = &self.name_pattern {
            write!(f, " name={}", p.as_str())?;
        }
        if !self.tags.is_empty() {
            let pairs: Vec<String> = self.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, " tags={{{}}}", pairs.join(","))?;
        }
        if self.selects_everything() {
            f.write_str(" (all instances)")?;
        }
        write!(f, " max={}h", self.max_runtime_hours)
    }
}

/// The ordered, validated policy list.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySet {
    policies: Vec<Arc<Policy>>,
}

impl PolicySet {
    /// Validate records in configured order. Fails on the first invalid one.
    pub fn from_records(records: Vec<PolicyRecord>) -> Result<Self, ConfigError> {
        if records.is_empty() {
            return Err(ConfigError::NoPolicies);
        }
        let policies = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| Policy::from_record(r, i + 1).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { policies })
    }

    /// Iterate in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Policy>> {
        self.policies.iter()
    }

    /// Number of policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Always false for a validated set; provided for API completeness.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
