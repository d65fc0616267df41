//! # reaper-cli: Long-Running Instance Checker Binary
//!
//! Wires the engine to AWS, the notification sinks and (optionally) the
//! Kubernetes lease, and exposes three commands:
//!
//! - `reaper run [--dry-run]`: one evaluate/remediate/notify cycle.
//! - `reaper cron`: recurring cycles on `SCHEDULE` until SIGINT/SIGTERM.
//! - `reaper validate`: load configuration and print the plan.
//!
//! With no subcommand, `run` is assumed.
//!
//! ## Crate Policy
//!
//! - Configuration comes from the environment and the policy file only.
//! - Handler functions delegate to the engine; no evaluation logic here.

pub mod commands;
pub mod logging;
pub mod settings;
pub mod signal;
