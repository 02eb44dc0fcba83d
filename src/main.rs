//! copipe - route lines and markup records through stage pipelines
//!
//! # Usage
//!
//! ```bash
//! # Follow a log, printing lines that mention python or go
//! copipe tail app.log --pattern python --pattern go
//!
//! # Read what is there and stop
//! copipe tail app.log --once
//!
//! # Print route 22 buses from an XML feed
//! copipe records buses.xml --filter route=22
//! ```

use clap::{Args, Parser, Subcommand};
use copipe_lib::config::{PipelineConfig, PipelineConfigBuilder, SinkKind, DEFAULT_SINK};
use copipe_lib::logger::{LogLevel, LOGGER};
use copipe_lib::pipe_log;
use copipe_lib::pipeline::{Pipeline, PipelineResult};
use copipe_lib::source::{FollowMode, LineOrigin, MarkupOrigin, Origin, SourceAdapter};
use copipe_lib::{topology, CopipeError, CopipeResult};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "copipe")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a text file and route its lines by substring
    Tail(TailArgs),

    /// Assemble records from an XML file and print the ones that match
    Records(RecordsArgs),
}

#[derive(Args, Debug)]
struct TailArgs {
    /// File to read
    file: PathBuf,

    /// Route lines containing this substring to stdout (repeatable)
    #[arg(short, long = "pattern")]
    patterns: Vec<String>,

    /// Start at the current end of the file
    #[arg(long)]
    from_end: bool,

    /// Stop at end of file instead of waiting for more
    #[arg(long)]
    once: bool,

    /// Milliseconds to wait between polls of an idle file
    #[arg(long)]
    poll_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct RecordsArgs {
    /// XML file to read
    file: PathBuf,

    /// Element that delimits one record
    #[arg(short, long)]
    tag: Option<String>,

    /// Keep records where field=value (repeatable, all must match)
    #[arg(short, long = "filter")]
    filters: Vec<String>,

    /// Output template, e.g. "{route},{id}"
    #[arg(long)]
    format: Option<String>,

    /// Fail on markup that breaks the record structure
    #[arg(long)]
    strict: bool,
}

fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging(level: &str) {
    let filter = log_filter(level);

    // Sinks own stdout
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> CopipeResult<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn tail_config(
    base: PipelineConfig,
    args: &TailArgs,
    log_level: Option<&str>,
) -> CopipeResult<PipelineConfig> {
    let needs_default_sink =
        !args.patterns.is_empty() && !base.sinks.iter().any(|s| s.name == DEFAULT_SINK);

    let mut builder = PipelineConfigBuilder::from_config(base);
    // An absent flag leaves the config file's choice alone
    if args.from_end {
        builder = builder.from_end(true);
    }
    if args.once {
        builder = builder.follow_mode(FollowMode::UntilEof);
    }
    if let Some(ms) = args.poll_ms {
        builder = builder.poll_interval_ms(ms);
    }
    if needs_default_sink {
        builder = builder.sink(DEFAULT_SINK, SinkKind::Stdout);
    }
    for pattern in &args.patterns {
        builder = builder.route(pattern.clone(), DEFAULT_SINK);
    }
    if let Some(level) = log_level {
        builder = builder.log_level(level);
    }
    builder.build()
}

fn records_config(
    base: PipelineConfig,
    args: &RecordsArgs,
    log_level: Option<&str>,
) -> CopipeResult<PipelineConfig> {
    let mut builder = PipelineConfigBuilder::from_config(base);
    if let Some(tag) = &args.tag {
        builder = builder.record_tag(tag.clone());
    }
    for spec in &args.filters {
        builder = builder.record_filter_spec(spec.clone());
    }
    if let Some(format) = &args.format {
        builder = builder.record_format(format.clone());
    }
    if args.strict {
        builder = builder.strict_records(true);
    }
    if let Some(level) = log_level {
        builder = builder.log_level(level);
    }
    builder.build()
}

fn drive<T: 'static>(
    pipeline: Pipeline<T>,
    origin: &mut dyn Origin<T>,
    adapter: &SourceAdapter,
) -> CopipeResult<PipelineResult> {
    let result = pipeline.run(origin, adapter)?;
    pipeline.close()?;
    Ok(result)
}

fn report(result: &PipelineResult) -> CopipeResult<()> {
    for stage in &result.stage_results {
        pipe_log!(
            LogLevel::Debug,
            "main",
            "stage '{}': received {}, failed {}",
            stage.stage_name,
            stage.received,
            stage.failed
        );
    }

    match &result.error {
        None => {
            pipe_log!(
                LogLevel::Info,
                "main",
                "'{}' done: {} item(s) in {:.2}s",
                result.pipeline_name,
                result.items_read(),
                result.total_duration.as_secs_f64()
            );
            Ok(())
        }
        Some(message) => Err(CopipeError::stage(result.pipeline_name.clone(), message.clone())),
    }
}

fn run(cli: Cli) -> CopipeResult<()> {
    let base = load_config(cli.config.as_ref())?;
    let log_level = cli.log_level.as_deref();

    let config = match &cli.command {
        Command::Tail(args) => tail_config(base, args, log_level)?,
        Command::Records(args) => records_config(base, args, log_level)?,
    };

    init_logging(&config.log_level);
    if let Some(level) = LogLevel::parse(&config.log_level) {
        LOGGER.set_min_level(level);
    }

    // Ctrl-C stops the source so the pipeline still closes and flushes its sinks
    let adapter = SourceAdapter::with_poll_interval(config.poll_interval());
    let stop = adapter.stop_handle();
    ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
        .map_err(|e| CopipeError::ConfigError(format!("cannot handle Ctrl-C: {}", e)))?;

    let result = match &cli.command {
        Command::Tail(args) => {
            let mut origin = LineOrigin::open(&args.file, config.follow_mode, config.from_end)?;
            drive(topology::build_tail(&config)?, &mut origin, &adapter)?
        }
        Command::Records(args) => {
            let mut origin = MarkupOrigin::open(&args.file)?;
            drive(topology::build_records(&config)?, &mut origin, &adapter)?
        }
    };

    report(&result)
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("copipe: {}", e);
        std::process::exit(1);
    }
}
