//! # Query Builder
//!
//! Derives the provider-side filter from the policy set so that as little
//! inventory as possible crosses the wire.
//!
//! The query must over-approximate the match set: every instance that some
//! policy would select must be admitted. False positives are fine, because
//! the matcher re-checks every selector client-side.
//!
//! ## Rules
//!
//! - Always constrain lifecycle state to `running`.
//! - Type clause: the union of all policy types, emitted only when every
//!   policy constrains type. One unconstrained policy means all types must
//!   be listed.
//! - Fleet scope (VPC) is applied unconditionally; it narrows the fleet
//!   orthogonally to policy matching.
//! - Tag clauses: for each tag key, the union of required values across
//!   policies, emitted only when every policy requires that key. A key
//!   required by some policies but not others cannot be pushed down without
//!   hiding instances the other policies would select. Per-key unions do not
//!   enforce that all tags come from the same policy; the matcher enforces
//!   the conjunction.
//! - The `Name` pattern is never pushed down.

use std::collections::BTreeMap;

use reaper_core::{FilterClause, FilterKind, FleetScope, InstanceQuery, PolicySet, RUNNING_STATE};

/// Build the provider query for `policies` within `scope`.
pub fn build_query(policies: &PolicySet, scope: &FleetScope) -> InstanceQuery {
    let mut clauses = vec![FilterClause::new(
        FilterKind::State,
        vec![RUNNING_STATE.to_string()],
    )];

    if policies.iter().all(|p| p.instance_type().is_some()) {
        let mut types: Vec<String> = Vec::new();
        for t in policies.iter().filter_map(|p| p.instance_type()) {
            push_distinct(&mut types, t);
        }
        if !types.is_empty() {
            clauses.push(FilterClause::new(FilterKind::InstanceType, types));
        }
    }

    if let Some(vpc_id) = scope.vpc_id.as_deref().filter(|v| !v.is_empty()) {
        clauses.push(FilterClause::new(FilterKind::Vpc, vec![vpc_id.to_string()]));
    }

    // BTreeMap keeps tag clause order stable across runs.
    let mut tag_values: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for policy in policies.iter() {
        for (key, value) in policy.tags() {
            push_distinct(tag_values.entry(key.as_str()).or_default(), value);
        }
    }
    for (key, values) in tag_values {
        if policies.iter().all(|p| p.tags().contains_key(key)) {
            clauses.push(FilterClause::new(FilterKind::Tag(key.to_string()), values));
        }
    }

    InstanceQuery::new(clauses)
}

fn push_distinct(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}
