use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Entries kept by the global logger
const RECENT_ENTRIES: usize = 1000;

/// Severity of a log entry, lowest first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Accepts the names `tracing` uses too; `trace` maps to `Debug`
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            2 => Self::Warn,
            3 => Self::Error,
            _ => Self::Info,
        }
    }
}

/// One logged event
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Module that produced the entry, e.g. "pipeline::broadcast"
    pub source: &'static str,
    /// Stage the entry is about, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub message: String,
}

enum Request {
    Append(LogEntry),
    Snapshot(Sender<Vec<LogEntry>>),
    Clear,
}

/// Keeps the most recent entries in memory on a background thread.
///
/// Stages log from inside `send`, so appending never blocks: when the channel is full
/// the entry is dropped.
pub struct Logger {
    requests: Sender<Request>,
    min_level: Arc<AtomicU8>,
}

impl Logger {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (requests, incoming) = bounded(capacity);

        std::thread::spawn(move || serve(incoming, capacity));

        Self {
            requests,
            min_level: Arc::new(AtomicU8::new(LogLevel::Debug as u8)),
        }
    }

    fn append(&self, level: LogLevel, source: &'static str, stage: Option<&str>, message: &str) {
        if level < self.min_level() {
            return;
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            source,
            stage: stage.map(str::to_string),
            message: message.to_string(),
        };
        let _ = self.requests.try_send(Request::Append(entry));
    }

    pub fn log(&self, level: LogLevel, message: &str, source: &'static str) {
        self.append(level, source, None, message);
    }

    /// Log an entry tagged with the stage it concerns
    pub fn log_stage(&self, level: LogLevel, stage: &str, message: &str, source: &'static str) {
        self.append(level, source, Some(stage), message);
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    /// Entries currently held, oldest first
    ///
    /// Waits for every entry logged before the call to be stored.
    pub fn recent(&self) -> Vec<LogEntry> {
        let (reply, response) = bounded(1);
        match self.requests.send(Request::Snapshot(reply)) {
            Ok(()) => response.recv().unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Entries about one stage, oldest first
    pub fn recent_for_stage(&self, stage: &str) -> Vec<LogEntry> {
        self.recent()
            .into_iter()
            .filter(|e| e.stage.as_deref() == Some(stage))
            .collect()
    }

    pub fn clear(&self) {
        let _ = self.requests.send(Request::Clear);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

fn serve(incoming: Receiver<Request>, capacity: usize) {
    let mut entries = VecDeque::with_capacity(capacity);

    for request in incoming {
        match request {
            Request::Append(entry) => {
                if entries.len() == capacity {
                    entries.pop_front();
                }
                entries.push_back(entry);
            }
            Request::Snapshot(reply) => {
                let _ = reply.send(entries.iter().cloned().collect());
            }
            Request::Clear => entries.clear(),
        }
    }
}

lazy_static::lazy_static! {
    pub static ref LOGGER: Logger = Logger::new();
}

/// Record a message in [`LOGGER`] and mirror it to `tracing`.
///
/// ```ignore
/// pipe_log!(LogLevel::Info, "source", "reading {}", path);
/// pipe_log!(LogLevel::Debug, "pipeline::stage", stage = name; "started");
/// ```
#[macro_export]
macro_rules! pipe_log {
    (@trace $level:ident, $source:expr, $($fields:tt)*) => {
        match $level {
            $crate::logger::LogLevel::Error => tracing::error!(source = $source, $($fields)*),
            $crate::logger::LogLevel::Warn => tracing::warn!(source = $source, $($fields)*),
            $crate::logger::LogLevel::Info => tracing::info!(source = $source, $($fields)*),
            $crate::logger::LogLevel::Debug => tracing::debug!(source = $source, $($fields)*),
        }
    };
    ($level:expr, $source:expr, stage = $stage:expr; $($arg:tt)*) => {
        {
            let level: $crate::logger::LogLevel = $level;
            let stage: &str = &$stage;
            let message = format!($($arg)*);
            $crate::logger::LOGGER.log_stage(level, stage, &message, $source);
            $crate::pipe_log!(@trace level, $source, stage = stage, "{}", message);
        }
    };
    ($level:expr, $source:expr, $($arg:tt)*) => {
        {
            let level: $crate::logger::LogLevel = $level;
            let message = format!($($arg)*);
            $crate::logger::LOGGER.log(level, &message, $source);
            $crate::pipe_log!(@trace level, $source, "{}", message);
        }
    };
}
