//! # reaper-provider: Collaborator Implementations
//!
//! Concrete implementations of the capabilities defined in
//! `reaper_core::ports`.
//!
//! | Module | Implements | Backed by |
//! |--------|------------|-----------|
//! | [`ec2`] | `InventoryProvider` | `DescribeInstances` / `TerminateInstances` |
//! | [`sns`] | `NotificationSink` | SNS `Publish` |
//! | [`webhook`] | `NotificationSink` | JSON `POST` over HTTPS |
//! | [`mock`] | all ports | in-memory, deterministic |
//!
//! The AWS adapters share one [`aws_config::SdkConfig`] loaded via
//! [`load_sdk_config`].

pub mod ec2;
pub mod error;
pub mod mock;
pub mod sns;
pub mod webhook;

pub use ec2::Ec2Inventory;
pub use error::ProviderError;
pub use sns::SnsSink;
pub use webhook::WebhookSink;

/// Load shared AWS configuration (credentials chain, retry settings) for
/// `region`.
pub async fn load_sdk_config(region: &str) -> aws_config::SdkConfig {
    aws_config::from_env()
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}
