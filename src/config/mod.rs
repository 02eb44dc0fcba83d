//! Pipeline configuration
//!
//! Loaded from JSON; every field has a default so a config file only needs the parts it
//! changes.
//!
//! ```json
//! {
//!   "poll_interval_ms": 250,
//!   "sinks": [
//!     { "name": "stdout", "kind": "stdout" },
//!     { "name": "errors", "kind": "file", "path": "errors.log" }
//!   ],
//!   "routes": [
//!     { "pattern": "python", "sink": "stdout" },
//!     { "pattern": "ERROR", "sink": "errors" }
//!   ],
//!   "records": {
//!     "tag": "bus",
//!     "filters": [{ "field": "route", "value": "22" }]
//!   }
//! }
//! ```

pub mod builder;

pub use builder::PipelineConfigBuilder;

use crate::error::{CopipeError, CopipeResult};
use crate::pipeline::stages::DeliveryPolicy;
use crate::source::FollowMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the sink every default route prints to
pub const DEFAULT_SINK: &str = "stdout";

/// Template used for records when none is configured
pub const DEFAULT_RECORD_FORMAT: &str = "{route},{id},\"{direction}\",{latitude},{longitude}";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wait between polls of an origin with nothing new, in milliseconds
    pub poll_interval_ms: u64,

    /// Whether line sources keep waiting at end of file
    pub follow_mode: FollowMode,

    /// Start following at the current end of the file
    pub from_end: bool,

    /// What a fan-out does when a branch fails
    pub fanout_policy: DeliveryPolicy,

    /// Output destinations, referenced by name from routes and records
    pub sinks: Vec<SinkConfig>,

    /// Line routes: each pattern gets its own filter branch
    pub routes: Vec<RouteConfig>,

    /// Record assembly from markup sources
    pub records: RecordConfig,

    /// Minimum log level (debug, info, warn, error)
    pub log_level: String,
}

/// Named output destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: SinkKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkKind {
    Stdout,
    Stderr,
    File {
        path: PathBuf,
        #[serde(default)]
        append: bool,
    },
    Discard,
}

/// Lines containing `pattern` go to the sink named `sink`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub pattern: String,
    #[serde(default = "default_sink")]
    pub sink: String,
}

/// Keep records whose `field` equals `value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

impl FieldFilter {
    /// Parse `field=value`
    pub fn parse(spec: &str) -> CopipeResult<Self> {
        match spec.split_once('=') {
            Some((field, value)) if !field.trim().is_empty() => Ok(Self {
                field: field.trim().to_string(),
                value: value.to_string(),
            }),
            _ => Err(CopipeError::ConfigError(format!(
                "filter '{}' must look like field=value",
                spec
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Element that delimits one record
    pub tag: String,
    /// Applied in order; a record must pass all of them
    pub filters: Vec<FieldFilter>,
    /// `{field}` template for printed records
    pub format: String,
    /// Fail on markup that breaks the record grammar instead of skipping it
    pub strict: bool,
    pub sink: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            tag: "bus".to_string(),
            filters: Vec::new(),
            format: DEFAULT_RECORD_FORMAT.to_string(),
            strict: false,
            sink: default_sink(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            follow_mode: FollowMode::Follow,
            from_end: false,
            fanout_policy: DeliveryPolicy::FailFast,
            sinks: vec![SinkConfig {
                name: DEFAULT_SINK.to_string(),
                kind: SinkKind::Stdout,
            }],
            routes: Vec::new(),
            records: RecordConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

fn default_sink() -> String {
    DEFAULT_SINK.to_string()
}

impl PipelineConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> CopipeResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CopipeError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check value ranges and that every referenced sink exists
    pub fn validate(&self) -> CopipeResult<()> {
        if !(1..=60_000).contains(&self.poll_interval_ms) {
            return Err(CopipeError::ConfigError(format!(
                "poll_interval_ms must be between 1 and 60000, got {}",
                self.poll_interval_ms
            )));
        }

        let mut names = std::collections::HashSet::new();
        for sink in &self.sinks {
            if !names.insert(sink.name.as_str()) {
                return Err(CopipeError::ConfigError(format!(
                    "sink '{}' is defined twice",
                    sink.name
                )));
            }
        }

        for route in &self.routes {
            if route.pattern.is_empty() {
                return Err(CopipeError::ConfigError(
                    "route pattern must not be empty".to_string(),
                ));
            }
            if !names.contains(route.sink.as_str()) {
                return Err(CopipeError::ConfigError(format!(
                    "route '{}' refers to unknown sink '{}'",
                    route.pattern, route.sink
                )));
            }
        }

        if self.records.tag.trim().is_empty() {
            return Err(CopipeError::ConfigError(
                "record tag must not be empty".to_string(),
            ));
        }
        if !names.contains(self.records.sink.as_str()) {
            return Err(CopipeError::ConfigError(format!(
                "records refer to unknown sink '{}'",
                self.records.sink
            )));
        }

        if crate::logger::LogLevel::parse(&self.log_level).is_none() {
            return Err(CopipeError::ConfigError(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }

        Ok(())
    }
}
