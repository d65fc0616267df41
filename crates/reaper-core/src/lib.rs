//! # reaper-core: Foundational Types
//!
//! Leaf crate of the reaper workspace. It defines the data model the
//! compliance engine operates on and the narrow collaborator traits it is
//! written against; it depends on no other `reaper-*` crate.
//!
//! ## Contents
//!
//! - [`policy`]: validated runtime policies (`PolicySet`), loaded once per
//!   process and read-only afterwards.
//! - [`instance`]: per-cycle instance snapshots and runtime computation.
//! - [`query`]: provider-side filter expressions (`InstanceQuery`).
//! - [`ports`]: the inventory, notification, active-owner and clock
//!   capabilities supplied by the process shell.
//! - [`error`]: the error taxonomy (configuration, retrieval, termination,
//!   notification).
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod instance;
pub mod policy;
pub mod ports;
pub mod query;

// Re-export primary types for ergonomic imports.
pub use error::{ConfigError, NotificationError, RetrievalError, TerminationError};
pub use instance::{Instance, InstanceId, NAME_TAG};
pub use policy::{NamePattern, Policy, PolicyRecord, PolicySet};
pub use ports::{
    ActiveOwner, AlwaysActive, Clock, InstancePage, InventoryProvider, NotificationSink,
    SystemClock,
};
pub use query::{FilterClause, FilterKind, FleetScope, InstanceQuery, RUNNING_STATE};
