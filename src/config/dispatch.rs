//! Dispatcher and worker configuration structures.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::registry::{InvocationSource, TimedFrequency};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "FLEET_DISPATCH_CONFIG";
/// Environment variable overriding `Commit`.
pub const COMMIT_ENV: &str = "FLEET_DISPATCH_COMMIT";

/// Built-in region catalog used when `SupportedRegions` is not configured.
pub const DEFAULT_SUPPORTED_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ca-central-1",
    "ca-west-1",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "il-central-1",
    "me-central-1",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

fn default_inventory_key() -> String {
    "accountIndex.json".into()
}

fn default_supported_regions() -> BTreeSet<String> {
    DEFAULT_SUPPORTED_REGIONS.iter().map(|r| (*r).to_string()).collect()
}

fn default_log_level() -> String {
    "info".into()
}

const fn default_true() -> bool {
    true
}

/// Timing and throughput limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Limits {
    /// Wall-clock budget for phase 1, in seconds.
    pub enumeration_budget_secs: u64,
    /// Wall-clock budget for one phase-2 job, in seconds.
    pub render_budget_secs: u64,
    /// Queue visibility timeout, in seconds.
    pub visibility_timeout_secs: u64,
    /// Receives before a message is dead-lettered.
    pub max_receive_count: u32,
    /// Attempts per task enqueue before the job fails.
    pub enqueue_attempts: u32,
    /// Concurrent task enqueues within one job.
    pub enqueue_concurrency: usize,
    /// Concurrent consumers per queue.
    pub consumer_count: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            enumeration_budget_secs: 60,
            render_budget_secs: 600,
            visibility_timeout_secs: 900,
            max_receive_count: 4,
            enqueue_attempts: 3,
            enqueue_concurrency: 16,
            consumer_count: num_cpus::get(),
        }
    }
}

impl Limits {
    /// Phase-1 budget.
    #[must_use]
    pub const fn enumeration_budget(&self) -> Duration {
        Duration::from_secs(self.enumeration_budget_secs)
    }

    /// Phase-2 budget.
    #[must_use]
    pub const fn render_budget(&self) -> Duration {
        Duration::from_secs(self.render_budget_secs)
    }

    /// Visibility timeout.
    #[must_use]
    pub const fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    /// Validate limit values.
    ///
    /// # Errors
    ///
    /// Names the first zero-valued limit.
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            (self.enumeration_budget_secs == 0, "EnumerationBudgetSecs"),
            (self.render_budget_secs == 0, "RenderBudgetSecs"),
            (self.visibility_timeout_secs == 0, "VisibilityTimeoutSecs"),
            (self.max_receive_count == 0, "MaxReceiveCount"),
            (self.enqueue_attempts == 0, "EnqueueAttempts"),
            (self.enqueue_concurrency == 0, "EnqueueConcurrency"),
            (self.consumer_count == 0, "ConsumerCount"),
        ];
        for (is_zero, name) in checks {
            if is_zero {
                return Err(format!("{name} must be greater than 0"));
            }
        }
        Ok(())
    }
}

/// Per-worker deployment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerConfig {
    /// Whether the worker is registered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Template path prefix in the store.
    pub template_prefix: String,
    /// Queue the worker's tasks go to.
    pub invocation_queue: String,
    /// Signals that invoke the worker.
    #[serde(default)]
    pub invocation_sources: BTreeSet<InvocationSource>,
    /// Frequency for timed invocation.
    #[serde(default)]
    pub timed_frequency: Option<TimedFrequency>,
}

impl WorkerConfig {
    /// Validate worker settings.
    ///
    /// # Errors
    ///
    /// Describes the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.template_prefix.trim().is_empty() {
            return Err("TemplatePrefix must not be empty".into());
        }
        if self.invocation_queue.trim().is_empty() {
            return Err("InvocationQueue must not be empty".into());
        }
        if self.invocation_sources.is_empty() {
            return Err("at least one InvocationSource is required".into());
        }
        let timed = self.invocation_sources.contains(&InvocationSource::Timed);
        match (timed, self.timed_frequency) {
            (true, None) => Err("TimedFrequency is required for TIMED workers".into()),
            (false, Some(_)) => Err("TimedFrequency is only valid for TIMED workers".into()),
            _ => Ok(()),
        }
    }
}

/// Root dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DispatchConfig {
    /// Render-job queue identifier.
    pub fan_out_queue: String,
    /// Object key of the inventory document.
    #[serde(default = "default_inventory_key")]
    pub inventory_key: String,
    /// Process-wide region allow-list; empty means no restriction.
    #[serde(default)]
    pub scope_to_regions: BTreeSet<String>,
    /// Regions templates may name.
    #[serde(default = "default_supported_regions")]
    pub supported_regions: BTreeSet<String>,
    /// Fallback log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Propagated to executors; false means dry run.
    #[serde(default)]
    pub commit: bool,
    /// Timing and throughput limits.
    #[serde(default)]
    pub limits: Limits,
    /// Worker settings by worker name.
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerConfig>,
}

impl DispatchConfig {
    /// Minimal configuration with defaults and no workers.
    pub fn new(fan_out_queue: impl Into<String>) -> Self {
        Self {
            fan_out_queue: fan_out_queue.into(),
            inventory_key: default_inventory_key(),
            scope_to_regions: BTreeSet::new(),
            supported_regions: default_supported_regions(),
            log_level: default_log_level(),
            commit: false,
            limits: Limits::default(),
            workers: BTreeMap::new(),
        }
    }

    /// Add or replace a worker's settings.
    #[must_use]
    pub fn with_worker(mut self, name: impl Into<String>, worker: WorkerConfig) -> Self {
        self.workers.insert(name.into(), worker);
        self
    }

    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// Describes the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.fan_out_queue.trim().is_empty() {
            return Err("FanOutQueue must not be empty".into());
        }
        if self.inventory_key.trim().is_empty() {
            return Err("InventoryKey must not be empty".into());
        }
        if self.supported_regions.is_empty() {
            return Err("SupportedRegions must not be empty".into());
        }
        if let Some(region) = self
            .scope_to_regions
            .iter()
            .find(|r| !self.supported_regions.contains(*r))
        {
            return Err(format!("ScopeToRegions names unsupported region `{region}`"));
        }
        self.limits.validate()?;
        for (name, worker) in &self.workers {
            worker
                .validate()
                .map_err(|e| format!("worker `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse configuration from a YAML string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_yaml_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_yaml::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a `.json`, `.yaml` or `.yml` file.
    ///
    /// # Errors
    ///
    /// I/O, parse or validation failure.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Load from the file named by `FLEET_DISPATCH_CONFIG`, after reading `.env`.
    ///
    /// `FLEET_DISPATCH_COMMIT` overrides `Commit` when set.
    ///
    /// # Errors
    ///
    /// Missing variable, I/O, parse or validation failure.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        let path = std::env::var(CONFIG_PATH_ENV)
            .map_err(|_| format!("{CONFIG_PATH_ENV} is not set"))?;
        let mut cfg = Self::from_path(Path::new(&path))?;
        if let Ok(commit) = std::env::var(COMMIT_ENV) {
            cfg.commit = parse_flag(&commit)
                .ok_or_else(|| format!("{COMMIT_ENV} must be true or false, got `{commit}`"))?;
        }
        Ok(cfg)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
