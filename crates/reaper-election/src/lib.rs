//! # reaper-election: Active-Owner Election
//!
//! Ensures at most one reaper replica runs cycles at a time by contending
//! for a `coordination.k8s.io/v1` Lease.
//!
//! ## Layers
//!
//! - [`lease`]: the Lease wire model and the pure acquire/renew/follow rule.
//! - [`store`]: the [`LeaseStore`] trait and an in-memory implementation.
//! - [`kube`]: the Kubernetes API server implementation.
//! - [`elector`]: the loop that turns lease rounds into an
//!   [`OwnershipFlag`], which implements `reaper_core::ActiveOwner`.
//!
//! Nothing outside this crate sees leases; the cycle controller samples the
//! flag once per tick.

pub mod elector;
pub mod error;
pub mod kube;
pub mod lease;
pub mod store;

pub use elector::{ElectionConfig, LeaseElector, OwnershipFlag};
pub use error::ElectionError;
pub use kube::KubeLeaseStore;
pub use lease::{decide, Decision, Lease, LeaseMeta, LeaseSpec};
pub use store::{LeaseStore, MemoryLeaseStore};
