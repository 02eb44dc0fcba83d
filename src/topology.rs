//! Wiring of configured pipelines
//!
//! Turns a [`PipelineConfig`] into a ready [`Pipeline`]: sinks are opened first, then the
//! stages that feed them, ending with the head. Stages are registered head first so that
//! closing the pipeline tears it down from the source side.

use crate::config::{PipelineConfig, SinkConfig, SinkKind, DEFAULT_SINK};
use crate::error::{CopipeError, CopipeResult};
use crate::logger::LogLevel;
use crate::pipe_log;
use crate::pipeline::stages::{
    field_equals, grep, relay, Broadcast, Discard, Printer, RecordAssembler,
};
use crate::pipeline::{MarkupEvent, Pipeline, Record, Stage, StageRegistry};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};

/// Open the writer behind a sink; `None` for a discarding sink
fn open_writer(sink: &SinkConfig) -> CopipeResult<Option<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match &sink.kind {
        SinkKind::Stdout => Box::new(std::io::stdout()),
        SinkKind::Stderr => Box::new(std::io::stderr()),
        SinkKind::File { path, append } => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(*append)
                .truncate(!*append)
                .open(path)
                .map_err(|e| {
                    CopipeError::ConfigError(format!(
                        "sink '{}': cannot open {}: {}",
                        sink.name,
                        path.display(),
                        e
                    ))
                })?;
            Box::new(BufWriter::new(file))
        }
        SinkKind::Discard => return Ok(None),
    };
    Ok(Some(writer))
}

fn find_sink<'a>(config: &'a PipelineConfig, name: &str) -> CopipeResult<&'a SinkConfig> {
    config
        .sinks
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| CopipeError::BuilderError(format!("Unknown sink '{}'", name)))
}

/// Start a line printing stage for a configured sink
pub fn open_line_sink(sink: &SinkConfig) -> CopipeResult<Stage<String>> {
    match open_writer(sink)? {
        Some(writer) => Stage::start(Printer::lines(sink.name.clone(), writer)),
        None => Discard::start(sink.name.clone()),
    }
}

/// Start a record printing stage for a configured sink
pub fn open_record_sink(sink: &SinkConfig, template: &str) -> CopipeResult<Stage<Record>> {
    match open_writer(sink)? {
        Some(writer) => Stage::start(Printer::records(sink.name.clone(), writer, template)),
        None => Discard::start(sink.name.clone()),
    }
}

/// Build the line pipeline: one fan-out feeding a substring filter per route
///
/// Without routes every line goes unfiltered to the default sink.
pub fn build_tail(config: &PipelineConfig) -> CopipeResult<Pipeline<String>> {
    let mut wanted: Vec<&str> = config.routes.iter().map(|r| r.sink.as_str()).collect();
    if config.routes.is_empty() {
        wanted.push(DEFAULT_SINK);
    }

    // Only sinks some route uses are opened, so unused files are never created
    let mut sinks = StageRegistry::new();
    let mut seen = HashSet::new();
    for name in wanted {
        if seen.insert(name) {
            sinks.register(name, open_line_sink(find_sink(config, name)?)?)?;
        }
    }

    wire_tail(config, sinks)
}

/// Wire the line pipeline onto sinks that are already running
///
/// Routes refer to sinks by their registered name.
pub fn wire_tail(
    config: &PipelineConfig,
    sinks: StageRegistry<String>,
) -> CopipeResult<Pipeline<String>> {
    let branches = if config.routes.is_empty() {
        vec![relay("all lines", sinks.require(DEFAULT_SINK)?)?]
    } else {
        config
            .routes
            .iter()
            .map(|route| grep(route.pattern.clone(), sinks.require(&route.sink)?))
            .collect::<CopipeResult<Vec<_>>>()?
    };

    let head = Stage::start(
        Broadcast::new("routes", branches.clone()).with_policy(config.fanout_policy),
    )?;

    pipe_log!(
        LogLevel::Debug,
        "topology",
        "Line pipeline: {} branch(es) into {} sink(s), {:?} delivery",
        branches.len(),
        sinks.len(),
        config.fanout_policy
    );

    Pipeline::builder("tail")
        .head(head)
        .add_stages(branches)
        .add_stages(sinks.stages().to_vec())
        .build()
}

/// Build the record pipeline: assembler, then each field filter in order, then the sink
pub fn build_records(config: &PipelineConfig) -> CopipeResult<Pipeline<MarkupEvent>> {
    let records = &config.records;
    let sink = open_record_sink(find_sink(config, &records.sink)?, &records.format)?;

    // Built from the sink outwards; each filter needs its target first
    let mut filters = Vec::with_capacity(records.filters.len());
    let mut target = sink.clone();
    for f in records.filters.iter().rev() {
        target = field_equals(f.field.clone(), f.value.clone(), target)?;
        filters.push(target.clone());
    }
    filters.reverse();

    let assembler =
        Stage::start(RecordAssembler::new(records.tag.clone(), target).strict(records.strict))?;

    pipe_log!(
        LogLevel::Debug,
        "topology",
        "Record pipeline: <{}> records through {} filter(s) into '{}'",
        records.tag,
        filters.len(),
        records.sink
    );

    Pipeline::builder("records")
        .head(assembler)
        .add_stages(filters)
        .add_stage(sink)
        .build()
}
