//! # EC2 Inventory
//!
//! [`InventoryProvider`] over the EC2 API.
//!
//! - Listing maps each [`InstanceQuery`] clause to one `DescribeInstances`
//!   filter and follows `NextToken` one page per call.
//! - Termination issues `TerminateInstances` for exactly one instance id.
//!
//! SDK errors are rendered with `DisplayErrorContext` so the service error
//! code (e.g. `RequestLimitExceeded`, `UnauthorizedOperation`) reaches the
//! logs and the report.

use async_trait::async_trait;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{Filter, Instance as Ec2Instance};
use chrono::{DateTime, Utc};

use reaper_core::{
    Instance, InstanceId, InstancePage, InstanceQuery, InventoryProvider, RetrievalError,
    TerminationError,
};

/// EC2-backed inventory provider.
#[derive(Debug, Clone)]
pub struct Ec2Inventory {
    client: aws_sdk_ec2::Client,
    page_size: Option<i32>,
}

impl Ec2Inventory {
    /// Wrap an existing client.
    pub fn new(client: aws_sdk_ec2::Client) -> Self {
        Self {
            client,
            page_size: None,
        }
    }

    /// Build a client from shared SDK configuration.
    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_ec2::Client::new(config))
    }

    /// Request at most `size` instances per page (EC2 accepts 5 to 1000).
    pub fn with_page_size(mut self, size: i32) -> Self {
        self.page_size = Some(size.clamp(5, 1000));
        self
    }
}

/// Translate a query into EC2 filters, one per clause.
pub fn to_filters(query: &InstanceQuery) -> Vec<Filter> {
    query
        .clauses()
        .iter()
        .map(|clause| {
            Filter::builder()
                .name(clause.kind.filter_name())
                .set_values(Some(clause.values.clone()))
                .build()
        })
        .collect()
}

/// Convert one SDK instance. Returns `None` when the instance id is missing.
pub fn to_instance(raw: &Ec2Instance) -> Option<Instance> {
    let id = raw.instance_id()?;

    let launch_time = raw
        .launch_time()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));

    let tags = raw
        .tags()
        .iter()
        .filter_map(|tag| {
            let key = tag.key()?;
            Some((key.to_string(), tag.value().unwrap_or_default().to_string()))
        })
        .collect();

    Some(Instance {
        id: InstanceId::new(id),
        instance_type: raw
            .instance_type()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        launch_time,
        tags,
        state: raw
            .state()
            .and_then(|s| s.name())
            .map(|n| n.as_str().to_string())
            .unwrap_or_default(),
        vpc_id: raw.vpc_id().map(String::from),
    })
}

#[async_trait]
impl InventoryProvider for Ec2Inventory {
    async fn list_running_instances(
        &self,
        query: &InstanceQuery,
        page_token: Option<&str>,
    ) -> Result<InstancePage, RetrievalError> {
        let output = self
            .client
            .describe_instances()
            .set_filters(Some(to_filters(query)))
            .set_next_token(page_token.map(String::from))
            .set_max_results(self.page_size)
            .send()
            .await
            .map_err(|e| RetrievalError::new(0, DisplayErrorContext(&e).to_string()))?;

        let mut instances = Vec::new();
        for raw in output.reservations().iter().flat_map(|r| r.instances()) {
            match to_instance(raw) {
                Some(instance) => instances.push(instance),
                None => tracing::warn!("skipping instance without an id in DescribeInstances output"),
            }
        }

        Ok(InstancePage {
            instances,
            next_token: output
                .next_token()
                .filter(|t| !t.is_empty())
                .map(String::from),
        })
    }

    async fn terminate(&self, instance_id: &InstanceId) -> Result<(), TerminationError> {
        let output = self
            .client
            .terminate_instances()
            .instance_ids(instance_id.as_str())
            .send()
            .await
            .map_err(|e| {
                TerminationError::new(instance_id.as_str(), DisplayErrorContext(&e).to_string())
            })?;

        for change in output.terminating_instances() {
            tracing::debug!(
                instance_id = change.instance_id().unwrap_or_default(),
                previous = change
                    .previous_state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str())
                    .unwrap_or_default(),
                current = change
                    .current_state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str())
                    .unwrap_or_default(),
                "instance state change"
            );
        }
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "Ec2Inventory"
    }
}
