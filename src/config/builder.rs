use super::{FieldFilter, PipelineConfig, RouteConfig, SinkConfig, SinkKind};
use crate::error::{CopipeError, CopipeResult};
use crate::pipeline::stages::DeliveryPolicy;
use crate::source::FollowMode;

/// Builder for constructing PipelineConfig instances with a fluent API
///
/// Starts from an existing config (or the defaults) so command line flags can be layered
/// over a config file.
///
/// # Example
/// ```
/// use copipe_lib::config::PipelineConfigBuilder;
///
/// let config = PipelineConfigBuilder::new()
///     .poll_interval_ms(50)
///     .route("python", "stdout")
///     .route("go", "stdout")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.routes.len(), 2);
/// ```
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
    filter_specs: Vec<String>,
}

impl PipelineConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::from_config(PipelineConfig::default())
    }

    /// Start from an already loaded config
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            filter_specs: Vec::new(),
        }
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn follow_mode(mut self, mode: FollowMode) -> Self {
        self.config.follow_mode = mode;
        self
    }

    pub fn from_end(mut self, from_end: bool) -> Self {
        self.config.from_end = from_end;
        self
    }

    pub fn fanout_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.config.fanout_policy = policy;
        self
    }

    /// Add a named sink, replacing one with the same name
    pub fn sink(mut self, name: impl Into<String>, kind: SinkKind) -> Self {
        let name = name.into();
        self.config.sinks.retain(|s| s.name != name);
        self.config.sinks.push(SinkConfig { name, kind });
        self
    }

    pub fn route(mut self, pattern: impl Into<String>, sink: impl Into<String>) -> Self {
        self.config.routes.push(RouteConfig {
            pattern: pattern.into(),
            sink: sink.into(),
        });
        self
    }

    pub fn record_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.records.tag = tag.into();
        self
    }

    pub fn record_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.records.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Add a record filter written as `field=value`; parsed by `build`
    pub fn record_filter_spec(mut self, spec: impl Into<String>) -> Self {
        self.filter_specs.push(spec.into());
        self
    }

    pub fn record_format(mut self, format: impl Into<String>) -> Self {
        self.config.records.format = format.into();
        self
    }

    pub fn strict_records(mut self, strict: bool) -> Self {
        self.config.records.strict = strict;
        self
    }

    pub fn record_sink(mut self, sink: impl Into<String>) -> Self {
        self.config.records.sink = sink.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Build the PipelineConfig instance
    ///
    /// # Errors
    /// Returns `CopipeError::BuilderError` if a filter spec is malformed or the result
    /// fails validation
    pub fn build(self) -> CopipeResult<PipelineConfig> {
        let mut config = self.config;

        for spec in &self.filter_specs {
            let filter = FieldFilter::parse(spec)
                .map_err(|e| CopipeError::BuilderError(e.to_string()))?;
            config.records.filters.push(filter);
        }

        config
            .validate()
            .map_err(|e| CopipeError::BuilderError(e.to_string()))?;

        Ok(config)
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = PipelineConfigBuilder::new().build().unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_builder_records() {
        let config = PipelineConfigBuilder::new()
            .record_tag("vehicle")
            .record_filter("route", "22")
            .record_filter_spec("direction=North Bound")
            .record_format("{route}")
            .strict_records(true)
            .build()
            .unwrap();

        assert_eq!(config.records.tag, "vehicle");
        assert_eq!(config.records.filters.len(), 2);
        assert_eq!(config.records.filters[1].value, "North Bound");
        assert!(config.records.strict);
    }

    #[test]
    fn test_builder_rejects_bad_filter_spec() {
        let result = PipelineConfigBuilder::new()
            .record_filter_spec("route")
            .build();

        assert!(matches!(result, Err(CopipeError::BuilderError(_))));
    }

    #[test]
    fn test_builder_rejects_route_to_missing_sink() {
        let result = PipelineConfigBuilder::new().route("python", "errors").build();
        assert!(matches!(result, Err(CopipeError::BuilderError(_))));
    }

    #[test]
    fn test_sink_replaces_same_name() {
        let config = PipelineConfigBuilder::new()
            .sink("stdout", SinkKind::Stderr)
            .build()
            .unwrap();

        assert_eq!(config.sinks.len(), 1);
        assert_eq!(config.sinks[0].kind, SinkKind::Stderr);
    }

    #[test]
    fn test_layer_over_loaded_config() {
        let base = PipelineConfig {
            poll_interval_ms: 500,
            ..PipelineConfig::default()
        };
        let config = PipelineConfigBuilder::from_config(base)
            .from_end(true)
            .follow_mode(FollowMode::UntilEof)
            .fanout_policy(DeliveryPolicy::Isolated)
            .log_level("warn")
            .build()
            .unwrap();

        assert_eq!(config.poll_interval_ms, 500);
        assert!(config.from_end);
        assert_eq!(config.follow_mode, FollowMode::UntilEof);
        assert_eq!(config.fanout_policy, DeliveryPolicy::Isolated);
    }
}
