//! # Provider Queries
//!
//! An [`InstanceQuery`] is the provider-side filter sent with every listing
//! request. It is a conjunction of clauses; each clause admits an instance
//! when the instance's attribute equals any of the clause's values.
//!
//! Clause names follow the EC2 `DescribeInstances` filter vocabulary
//! (`instance-state-name`, `instance-type`, `vpc-id`, `tag:<key>`) so the
//! AWS adapter can forward them verbatim. [`InstanceQuery::admits`] evaluates
//! the same semantics locally for in-memory providers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::instance::Instance;

/// Lifecycle state required of every listed instance.
pub const RUNNING_STATE: &str = "running";

/// Fleet-wide scope applied to every query, independent of policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetScope {
    /// Restrict listing to this VPC.
    pub vpc_id: Option<String>,
}

/// Attribute a clause constrains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Lifecycle state.
    State,
    /// Instance type.
    InstanceType,
    /// VPC identifier.
    Vpc,
    /// Value of the named tag.
    Tag(String),
}

impl FilterKind {
    /// EC2 filter name for this attribute.
    pub fn filter_name(&self) -> String {
        match self {
            Self::State => "instance-state-name".to_string(),
            Self::InstanceType => "instance-type".to_string(),
            Self::Vpc => "vpc-id".to_string(),
            Self::Tag(key) => format!("tag:{key}"),
        }
    }
}

/// One filter clause: the attribute must equal one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    /// Constrained attribute.
    pub kind: FilterKind,
    /// Accepted values (non-empty, deduplicated, order of first appearance).
    pub values: Vec<String>,
}

impl FilterClause {
    /// Build a clause.
    pub fn new(kind: FilterKind, values: Vec<String>) -> Self {
        Self { kind, values }
    }

    /// Whether the instance satisfies this clause.
    pub fn admits(&self, instance: &Instance) -> bool {
        let actual = match &self.kind {
            FilterKind::State => Some(instance.state.as_str()),
            FilterKind::InstanceType => Some(instance.instance_type.as_str()),
            FilterKind::Vpc => instance.vpc_id.as_deref(),
            FilterKind::Tag(key) => instance.tags.get(key).map(String::as_str),
        };
        actual.is_some_and(|a| self.values.iter().any(|v| v == a))
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in [{}]", self.kind.filter_name(), self.values.join(", "))
    }
}

/// Conjunction of filter clauses sent to the inventory provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceQuery {
    clauses: Vec<FilterClause>,
}

impl InstanceQuery {
    /// Build a query from clauses.
    pub fn new(clauses: Vec<FilterClause>) -> Self {
        Self { clauses }
    }

    /// The clauses in emission order.
    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// The clause for `kind`, if present.
    pub fn clause(&self, kind: &FilterKind) -> Option<&FilterClause> {
        self.clauses.iter().find(|c| &c.kind == kind)
    }

    /// Whether the instance satisfies every clause.
    pub fn admits(&self, instance: &Instance) -> bool {
        self.clauses.iter().all(|c| c.admits(instance))
    }
}

impl fmt::Display for InstanceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(" AND "))
    }
}
