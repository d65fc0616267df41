//! # Process Settings
//!
//! Everything the binary needs, resolved once at startup from environment
//! variables and the policy file into an immutable [`Settings`] value.
//!
//! ## Variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `CONFIG_PATH` | required | Policy file (JSON, or YAML for `.yaml`/`.yml`) |
//! | `AWS_REGION` | required | Region for EC2 and SNS |
//! | `SNS_TOPIC_ARN` | unset | SNS alert destination |
//! | `WEBHOOK_URL` | unset | Webhook alert destination (when SNS is unset) |
//! | `SCHEDULE` | unset | Cron expression, required by `cron` |
//! | `DRY_RUN` | `true` | Simulate terminations |
//! | `VPC_ID` | unset | Restrict the fleet to one VPC |
//! | `TERMINATION_CONCURRENCY` | `1` | In-flight termination calls |
//! | `LEADER_ELECTION_ENABLED` | `false` | Gate ticks on a Kubernetes Lease |
//! | `POD_NAME`, `POD_NAMESPACE` | required with election | Lease identity |
//! | `LEASE_NAME` | `ec2-checker-leader` | Lease object name |
//!
//! Empty values count as unset.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use reaper_core::{Clock, ConfigError, FleetScope, PolicyRecord, PolicySet, SystemClock};
use reaper_engine::{CronSchedule, RemediationSettings, ScheduleError};

/// Default Lease object name.
pub const DEFAULT_LEASE_NAME: &str = "ec2-checker-leader";

/// Settings could not be resolved.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A required variable is unset or empty.
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// A boolean variable holds something other than true/false/1/0/yes/no.
    #[error("{var} must be a boolean (true/false/1/0/yes/no), got {value:?}")]
    InvalidBool {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// A numeric variable is not a positive integer.
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// The policy file could not be read.
    #[error("failed to read policy file {path}: {source}")]
    ReadPolicies {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The policy file is not a valid list of policy records.
    #[error("failed to parse policy file {path}: {reason}")]
    ParsePolicies {
        /// File path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A policy record failed validation.
    #[error("invalid policy configuration: {0}")]
    InvalidPolicy(#[from] ConfigError),

    /// `SCHEDULE` is not a valid expression.
    #[error("invalid SCHEDULE: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    /// `SCHEDULE` parses but has no future fire time.
    #[error("SCHEDULE {0:?} never fires")]
    ScheduleNeverFires(String),
}

/// Lease election settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionSettings {
    /// This replica's identity.
    pub pod_name: String,
    /// Namespace holding the Lease.
    pub namespace: String,
    /// Lease object name.
    pub lease_name: String,
}

/// Where alerts go.
#[derive(Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    /// No destination; log only.
    None,
    /// An SNS topic.
    Sns(String),
    /// An HTTP webhook.
    Webhook(String),
}

impl std::fmt::Debug for NotificationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Sns(arn) => f.debug_tuple("Sns").field(arn).finish(),
            Self::Webhook(_) => f.debug_tuple("Webhook").field(&"[REDACTED]").finish(),
        }
    }
}

impl std::fmt::Display for NotificationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none (log only)"),
            Self::Sns(arn) => write!(f, "sns {arn}"),
            Self::Webhook(_) => f.write_str("webhook"),
        }
    }
}

/// Resolved process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Policy file path.
    pub config_path: PathBuf,
    /// AWS region.
    pub region: String,
    /// Alert destination.
    pub notification: NotificationTarget,
    /// Raw `SCHEDULE`, if set.
    pub schedule: Option<String>,
    /// Simulate terminations.
    pub dry_run: bool,
    /// Fleet-wide VPC restriction.
    pub vpc_id: Option<String>,
    /// Bounded termination concurrency.
    pub termination_concurrency: NonZeroUsize,
    /// Lease election, when enabled.
    pub election: Option<ElectionSettings>,
}

impl Settings {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for variable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(SettingsError::Missing(key));

        let config_path = PathBuf::from(require("CONFIG_PATH")?);
        let region = require("AWS_REGION")?;

        let notification = match (get("SNS_TOPIC_ARN"), get("WEBHOOK_URL")) {
            (Some(arn), _) => NotificationTarget::Sns(arn),
            (None, Some(url)) => NotificationTarget::Webhook(url),
            (None, None) => NotificationTarget::None,
        };

        let dry_run = parse_bool("DRY_RUN", get("DRY_RUN"), true)?;

        let termination_concurrency = match get("TERMINATION_CONCURRENCY") {
            None => NonZeroUsize::MIN,
            Some(raw) => raw
                .trim()
                .parse::<NonZeroUsize>()
                .map_err(|_| SettingsError::InvalidNumber {
                    var: "TERMINATION_CONCURRENCY",
                    value: raw,
                })?,
        };

        let election = if parse_bool(
            "LEADER_ELECTION_ENABLED",
            get("LEADER_ELECTION_ENABLED"),
            false,
        )? {
            Some(ElectionSettings {
                pod_name: require("POD_NAME")?,
                namespace: require("POD_NAMESPACE")?,
                lease_name: get("LEASE_NAME").unwrap_or_else(|| DEFAULT_LEASE_NAME.to_string()),
            })
        } else {
            None
        };

        Ok(Self {
            config_path,
            region,
            notification,
            schedule: get("SCHEDULE"),
            dry_run,
            vpc_id: get("VPC_ID"),
            termination_concurrency,
            election,
        })
    }

    /// Parse `SCHEDULE`. Required in recurring mode; must fire at least once
    /// more.
    pub fn cron_schedule(&self) -> Result<CronSchedule, SettingsError> {
        let raw = self
            .schedule
            .as_deref()
            .ok_or(SettingsError::Missing("SCHEDULE"))?;
        let schedule = CronSchedule::parse(raw)?;
        if schedule.next_after(SystemClock.now()).is_none() {
            return Err(SettingsError::ScheduleNeverFires(raw.to_string()));
        }
        Ok(schedule)
    }

    /// Fleet-wide scope constraint.
    pub fn fleet_scope(&self) -> FleetScope {
        FleetScope {
            vpc_id: self.vpc_id.clone(),
        }
    }

    /// Remediation settings, with `force_dry_run` overriding `DRY_RUN`.
    pub fn remediation(&self, force_dry_run: bool) -> RemediationSettings {
        RemediationSettings {
            dry_run: self.dry_run || force_dry_run,
            concurrency: self.termination_concurrency,
        }
    }

    /// Load and validate the policy file.
    pub fn load_policies(&self) -> Result<PolicySet, SettingsError> {
        load_policies(&self.config_path)
    }
}

fn parse_bool(var: &'static str, raw: Option<String>, default: bool) -> Result<bool, SettingsError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SettingsError::InvalidBool { var, value: raw }),
    }
}

/// Read `path` as an ordered list of policy records and validate it.
pub fn load_policies(path: &Path) -> Result<PolicySet, SettingsError> {
    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::ReadPolicies {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let parse_error = |reason: String| SettingsError::ParsePolicies {
        path: path.to_path_buf(),
        reason,
    };
    let records: Vec<PolicyRecord> = if is_yaml {
        serde_yaml::from_str(&text).map_err(|e| parse_error(e.to_string()))?
    } else {
        serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))?
    };

    Ok(PolicySet::from_records(records)?)
}
