//! # Mock Adapters
//!
//! Deterministic, in-memory implementations of every collaborator trait,
//! used by unit and integration tests.
//!
//! - [`MockInventory`]: serves scripted pages, applies the query like the
//!   provider would, records every call, and can fail a chosen page or
//!   chosen terminations. Terminated instances drop out of later listings.
//! - [`RecordingSink`]: records every message; optionally fails.
//! - [`FixedClock`]: a settable clock.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use reaper_core::{
    Clock, Instance, InstanceId, InstancePage, InstanceQuery, InventoryProvider,
    NotificationError, NotificationSink, RetrievalError, TerminationError,
};

#[derive(Debug, Default)]
struct InventoryLog {
    list_calls: usize,
    terminate_calls: usize,
    terminated: Vec<InstanceId>,
    last_query: Option<InstanceQuery>,
}

/// Scripted inventory provider.
///
/// Page tokens are the decimal index of the next page.
#[derive(Debug, Default)]
pub struct MockInventory {
    pages: Vec<Vec<Instance>>,
    failing_page: Option<(usize, String)>,
    failing_terminations: BTreeMap<String, String>,
    log: Mutex<InventoryLog>,
}

impl MockInventory {
    /// Serve `pages` in order. An empty list behaves as one empty page.
    pub fn paged(pages: Vec<Vec<Instance>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    /// Serve all `instances` on a single page.
    pub fn single_page(instances: Vec<Instance>) -> Self {
        Self::paged(vec![instances])
    }

    /// Fail the listing call for 1-based `page` with `reason`.
    pub fn failing_on_page(mut self, page: usize, reason: impl Into<String>) -> Self {
        self.failing_page = Some((page, reason.into()));
        self
    }

    /// Fail every termination of `instance_id` with `reason`.
    pub fn failing_termination_of(
        mut self,
        instance_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.failing_terminations
            .insert(instance_id.into(), reason.into());
        self
    }

    /// Listing calls received.
    pub fn list_calls(&self) -> usize {
        self.log.lock().list_calls
    }

    /// Termination calls received, successful or not.
    pub fn terminate_calls(&self) -> usize {
        self.log.lock().terminate_calls
    }

    /// Successfully terminated instances, in call order.
    pub fn terminated(&self) -> Vec<InstanceId> {
        self.log.lock().terminated.clone()
    }

    /// The query carried by the most recent listing call.
    pub fn last_query(&self) -> Option<InstanceQuery> {
        self.log.lock().last_query.clone()
    }
}

#[async_trait]
impl InventoryProvider for MockInventory {
    async fn list_running_instances(
        &self,
        query: &InstanceQuery,
        page_token: Option<&str>,
    ) -> Result<InstancePage, RetrievalError> {
        let index = match page_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RetrievalError::new(0, format!("invalid page token {token:?}")))?,
        };
        let page_number = index + 1;

        let mut log = self.log.lock();
        log.list_calls += 1;
        log.last_query = Some(query.clone());

        if let Some((page, reason)) = &self.failing_page {
            if *page == page_number {
                return Err(RetrievalError::new(page_number, reason.clone()));
            }
        }

        let gone: BTreeSet<&InstanceId> = log.terminated.iter().collect();
        let instances = self
            .pages
            .get(index)
            .map(|page| {
                page.iter()
                    .filter(|i| query.admits(i) && !gone.contains(&i.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let next_token = (page_number < self.pages.len()).then(|| page_number.to_string());
        Ok(InstancePage {
            instances,
            next_token,
        })
    }

    async fn terminate(&self, instance_id: &InstanceId) -> Result<(), TerminationError> {
        let mut log = self.log.lock();
        log.terminate_calls += 1;
        if let Some(reason) = self.failing_terminations.get(instance_id.as_str()) {
            return Err(TerminationError::new(instance_id.as_str(), reason.clone()));
        }
        log.terminated.push(instance_id.clone());
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "MockInventory"
    }
}

/// A message captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
}

/// Notification sink that records deliveries.
#[derive(Debug, Default)]
pub struct RecordingSink {
    failure: Option<String>,
    messages: Mutex<Vec<SentMessage>>,
    attempts: Mutex<usize>,
}

impl RecordingSink {
    /// A sink that accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every message with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Delivered messages, in order.
    pub fn messages(&self) -> Vec<SentMessage> {
        self.messages.lock().clone()
    }

    /// Delivery attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        *self.attempts.lock() += 1;
        if let Some(reason) = &self.failure {
            return Err(NotificationError::Transport(reason.clone()));
        }
        self.messages.lock().push(SentMessage {
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn destination(&self) -> String {
        "recording-sink".to_string()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// A clock reading `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Set the reading.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move the reading forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
