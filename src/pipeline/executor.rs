use super::core::{Stage, StageStats};
use crate::error::{CopipeError, CopipeResult};
use crate::logger::LogLevel;
use crate::pipe_log;
use crate::source::{Origin, SourceAdapter, SourceReport};
use std::time::{Duration, Instant};

/// Type-erased view of a stage, used for reporting and teardown
pub trait StageControl {
    fn name(&self) -> &str;
    fn stats(&self) -> StageStats;
    fn is_closed(&self) -> bool;
    fn close(&self) -> CopipeResult<()>;
}

impl<T> StageControl for Stage<T> {
    fn name(&self) -> &str {
        Stage::name(self)
    }

    fn stats(&self) -> StageStats {
        Stage::stats(self)
    }

    fn is_closed(&self) -> bool {
        Stage::is_closed(self)
    }

    fn close(&self) -> CopipeResult<()> {
        Stage::close(self)
    }
}

/// Snapshot of one stage after a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub stage_name: String,
    pub received: u64,
    pub failed: u64,
    pub closed: bool,
}

/// Result of driving a pipeline from a source
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub pipeline_name: String,

    /// Whether the run ended without an error
    pub success: bool,

    /// What the source adapter did; `None` when the run failed
    pub source: Option<SourceReport>,

    /// Per-stage counters in registration order
    pub stage_results: Vec<StageResult>,

    pub total_duration: Duration,

    /// Error message if failed
    pub error: Option<String>,
}

impl PipelineResult {
    /// Stages that saw at least one failing item
    pub fn failed_stages(&self) -> impl Iterator<Item = &StageResult> {
        self.stage_results.iter().filter(|r| r.failed > 0)
    }

    pub fn items_read(&self) -> u64 {
        self.source.as_ref().map(|s| s.items).unwrap_or(0)
    }
}

/// A wired pipeline: a head stage plus every stage it owns
///
/// The topology is fixed once built. Closing a pipeline closes its stages in the order
/// they were added to the builder.
///
/// # Example
/// ```
/// use copipe_lib::pipeline::stages::{grep, Collector};
/// use copipe_lib::pipeline::Pipeline;
/// use copipe_lib::source::{IterOrigin, SourceAdapter};
///
/// let (sink, seen) = Collector::start("sink").unwrap();
/// let head = grep("python", sink.clone()).unwrap();
///
/// let pipeline = Pipeline::builder("python-lines")
///     .head(head)
///     .add_stage(sink)
///     .build()
///     .unwrap();
///
/// let lines = vec!["python rocks".to_string(), "go rocks".to_string()];
/// let result = pipeline
///     .run(&mut IterOrigin::new(lines.into_iter()), &SourceAdapter::new())
///     .unwrap();
///
/// assert!(result.success);
/// assert_eq!(seen.len(), 1);
/// pipeline.close().unwrap();
/// ```
pub struct Pipeline<T> {
    name: String,
    head: Stage<T>,
    stages: Vec<Box<dyn StageControl>>,
}

impl<T: 'static> Pipeline<T> {
    /// Create a new pipeline builder
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<T> {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn head(&self) -> &Stage<T> {
        &self.head
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Push one item into the head stage
    pub fn send(&self, item: T) -> CopipeResult<()> {
        self.head.send(item)
    }

    /// Drive `origin` into the head stage until it is exhausted or stopped
    ///
    /// A failure inside any stage ends the run; it is logged and reported in the result
    /// rather than returned as `Err`.
    pub fn run<O>(&self, origin: &mut O, adapter: &SourceAdapter) -> CopipeResult<PipelineResult>
    where
        O: Origin<T> + ?Sized,
    {
        pipe_log!(
            LogLevel::Info,
            "pipeline",
            "Starting pipeline '{}' with {} stages",
            self.name,
            self.stages.len()
        );

        let start = Instant::now();
        let outcome = adapter.run(origin, &self.head);
        let total_duration = start.elapsed();

        let result = match outcome {
            Ok(report) => {
                pipe_log!(
                    LogLevel::Info,
                    "pipeline",
                    "Pipeline '{}' finished in {:.2}s after {} item(s)",
                    self.name,
                    total_duration.as_secs_f64(),
                    report.items
                );
                PipelineResult {
                    pipeline_name: self.name.clone(),
                    success: true,
                    source: Some(report),
                    stage_results: self.stage_results(),
                    total_duration,
                    error: None,
                }
            }
            Err(e) => {
                pipe_log!(
                    LogLevel::Error,
                    "pipeline",
                    "Pipeline '{}' failed: {}",
                    self.name,
                    e
                );
                PipelineResult {
                    pipeline_name: self.name.clone(),
                    success: false,
                    source: None,
                    stage_results: self.stage_results(),
                    total_duration,
                    error: Some(e.to_string()),
                }
            }
        };

        Ok(result)
    }

    /// Counters for every stage in registration order
    pub fn stage_results(&self) -> Vec<StageResult> {
        self.stages
            .iter()
            .map(|stage| {
                let stats = stage.stats();
                StageResult {
                    stage_name: stage.name().to_string(),
                    received: stats.received,
                    failed: stats.failed,
                    closed: stage.is_closed(),
                }
            })
            .collect()
    }

    /// Close every stage in registration order
    ///
    /// All stages are closed even if one fails; the first error is returned.
    pub fn close(&self) -> CopipeResult<()> {
        let mut first_error = None;

        for stage in &self.stages {
            if let Err(e) = stage.close() {
                pipe_log!(
                    LogLevel::Error,
                    "pipeline",
                    "Closing stage '{}' of pipeline '{}' failed: {}",
                    stage.name(),
                    self.name,
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Builder for constructing pipelines
pub struct PipelineBuilder<T> {
    name: String,
    head: Option<Stage<T>>,
    stages: Vec<Box<dyn StageControl>>,
}

impl<T: 'static> PipelineBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            head: None,
            stages: Vec::new(),
        }
    }

    /// Set the stage that receives items from the source; it is also added as a stage
    pub fn head(mut self, stage: Stage<T>) -> Self {
        self.stages.push(Box::new(stage.clone()));
        self.head = Some(stage);
        self
    }

    /// Add a stage owned by the pipeline, of any item type
    pub fn add_stage<U: 'static>(mut self, stage: Stage<U>) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Add several stages of one item type
    pub fn add_stages<U: 'static>(mut self, stages: impl IntoIterator<Item = Stage<U>>) -> Self {
        for stage in stages {
            self.stages.push(Box::new(stage));
        }
        self
    }

    /// Build the pipeline
    ///
    /// # Errors
    /// Returns `CopipeError::BuilderError` if no head stage was set
    pub fn build(self) -> CopipeResult<Pipeline<T>> {
        let head = self.head.ok_or_else(|| {
            CopipeError::BuilderError(format!("pipeline '{}' has no head stage", self.name))
        })?;

        Ok(Pipeline {
            name: self.name,
            head,
            stages: self.stages,
        })
    }
}
