//! # Compliance Evaluator
//!
//! Turns the provider's inventory into the list of violations for one cycle.
//!
//! ## Algorithm
//!
//! 1. Build the provider query from the policy set and fleet scope.
//! 2. Retrieve every page sequentially. A failure on any page aborts the
//!    whole evaluation; partial inventories are never judged.
//! 3. For each instance, walk policies in configured order. The first policy
//!    whose selectors match decides: if runtime strictly exceeds its
//!    threshold, one violation is emitted. Either way no further policy is
//!    consulted for that instance.
//! 4. Instances no policy selects are silently excluded.
//!
//! Instances without a launch timestamp are excluded and logged as
//! data-integrity errors.
//!
//! ## Determinism
//!
//! Given identical pages, policies and `now`, the output is identical,
//! including order (provider order).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use reaper_core::instance::duration_hours;
use reaper_core::{
    FleetScope, Instance, InstanceQuery, InventoryProvider, Policy, PolicySet, RetrievalError,
};

use crate::matcher::matches;
use crate::query::build_query;

/// An instance paired with the policy it violates.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// The offending instance.
    pub instance: Instance,
    /// The first policy that selected it.
    pub policy: Arc<Policy>,
    /// Runtime at evaluation time.
    pub runtime: Duration,
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Violations in discovery order.
    pub violations: Vec<Violation>,
    /// Instances retrieved across all pages.
    pub scanned: usize,
    /// Pages retrieved.
    pub pages: usize,
    /// Instances excluded for a missing launch timestamp.
    pub missing_launch_time: usize,
}

/// Matches retrieved inventory against the configured policies.
#[derive(Debug, Clone)]
pub struct ComplianceEvaluator {
    policies: PolicySet,
    query: InstanceQuery,
}

impl ComplianceEvaluator {
    /// Create an evaluator. The provider query is derived once here since
    /// neither input changes for the life of the process.
    pub fn new(policies: PolicySet, scope: FleetScope) -> Self {
        let query = build_query(&policies, &scope);
        Self { policies, query }
    }

    /// The configured policies.
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// The provider query sent with every listing request.
    pub fn query(&self) -> &InstanceQuery {
        &self.query
    }

    /// Retrieve all pages from `provider` and evaluate them at `now`.
    pub async fn evaluate(
        &self,
        provider: &dyn InventoryProvider,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, RetrievalError> {
        let (instances, pages) = self.retrieve(provider).await?;
        let mut evaluation = self.evaluate_instances(&instances, now);
        evaluation.pages = pages;
        Ok(evaluation)
    }

    /// Evaluate an already-retrieved inventory at `now`.
    pub fn evaluate_instances(&self, instances: &[Instance], now: DateTime<Utc>) -> Evaluation {
        let mut evaluation = Evaluation {
            scanned: instances.len(),
            ..Evaluation::default()
        };

        for instance in instances {
            let Some(policy) = self.policies.iter().find(|p| matches(instance, p)) else {
                continue;
            };

            let Some(runtime) = instance.runtime_at(now) else {
                tracing::error!(
                    instance_id = %instance.id,
                    instance_type = %instance.instance_type,
                    "instance has no launch timestamp; excluded from evaluation"
                );
                evaluation.missing_launch_time += 1;
                continue;
            };

            if policy.is_exceeded_by(runtime) {
                tracing::info!(
                    instance_id = %instance.id,
                    instance_type = %instance.instance_type,
                    runtime_hours = duration_hours(runtime),
                    policy = %policy,
                    "found long-running instance"
                );
                evaluation.violations.push(Violation {
                    instance: instance.clone(),
                    policy: Arc::clone(policy),
                    runtime,
                });
            } else {
                tracing::debug!(
                    instance_id = %instance.id,
                    runtime_hours = duration_hours(runtime),
                    policy = %policy,
                    "instance within runtime limit"
                );
            }
        }

        evaluation
    }

    /// Walk every page. Returns the instances and the page count.
    async fn retrieve(
        &self,
        provider: &dyn InventoryProvider,
    ) -> Result<(Vec<Instance>, usize), RetrievalError> {
        let mut instances = Vec::new();
        let mut token: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();
        let mut page_number = 0;

        loop {
            page_number += 1;
            let page = provider
                .list_running_instances(&self.query, token.as_deref())
                .await
                .map_err(|mut e| {
                    e.page = page_number;
                    e
                })?;

            tracing::debug!(
                page = page_number,
                instances = page.instances.len(),
                "retrieved inventory page"
            );
            instances.extend(page.instances);

            match page.next_token {
                None => break,
                Some(next) => {
                    // A repeated token means the provider is cycling.
                    if !seen.insert(next.clone()) {
                        return Err(RetrievalError::new(
                            page_number,
                            format!("pagination token {next:?} was already served"),
                        ));
                    }
                    token = Some(next);
                }
            }
        }

        Ok((instances, page_number))
    }
}
