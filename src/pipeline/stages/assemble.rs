use crate::error::{CopipeError, CopipeResult};
use crate::logger::LogLevel;
use crate::pipe_log;
use crate::pipeline::{Coroutine, MarkupEvent, Record, Stage};

/// Where the assembler is within the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerState {
    /// No record in progress
    Idle,
    /// Inside a record element
    Accumulating {
        record: Record,
        /// Text seen since the last start marker
        fragments: Vec<String>,
    },
}

/// Stage that turns start/text/end events into one [`Record`] per `tag` element
///
/// Text inside each child element becomes a field named after that element. The record
/// is sent downstream when the `tag` element ends.
///
/// Events that do not fit the grammar are ignored unless strict mode is on, in which case
/// an end marker without a start, or a nested `tag` element, fails with `MalformedRecord`.
///
/// # Example
/// ```
/// use copipe_lib::pipeline::stages::{Collector, RecordAssembler};
/// use copipe_lib::pipeline::{MarkupEvent, Stage};
///
/// let (sink, records) = Collector::start("records").unwrap();
/// let assembler = Stage::start(RecordAssembler::new("bus", sink)).unwrap();
///
/// for event in [
///     MarkupEvent::start("bus"),
///     MarkupEvent::start("route"),
///     MarkupEvent::text("22"),
///     MarkupEvent::end("route"),
///     MarkupEvent::end("bus"),
/// ] {
///     assembler.send(event).unwrap();
/// }
///
/// assert_eq!(records.items()[0].get("route"), Some("22"));
/// ```
pub struct RecordAssembler {
    name: String,
    tag: String,
    strict: bool,
    state: AssemblerState,
    target: Stage<Record>,
    emitted: u64,
}

impl RecordAssembler {
    pub fn new(tag: impl Into<String>, target: Stage<Record>) -> Self {
        let tag = tag.into();
        Self {
            name: format!("assemble {}", tag),
            tag,
            strict: false,
            state: AssemblerState::Idle,
            target,
            emitted: 0,
        }
    }

    /// Reject events that break the record grammar instead of ignoring them
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn state(&self) -> &AssemblerState {
        &self.state
    }

    fn malformed(&self, message: String) -> CopipeResult<()> {
        if self.strict {
            Err(CopipeError::MalformedRecord(message))
        } else {
            Ok(())
        }
    }

    fn on_idle(&mut self, event: MarkupEvent) -> CopipeResult<()> {
        match event {
            MarkupEvent::Start { name, .. } if name == self.tag => {
                self.state = AssemblerState::Accumulating {
                    record: Record::new(),
                    fragments: Vec::new(),
                };
                Ok(())
            }
            MarkupEvent::End { name } if name == self.tag => {
                self.malformed(format!("</{}> without a matching start", name))
            }
            _ => Ok(()),
        }
    }

    fn on_accumulating(&mut self, event: MarkupEvent) -> CopipeResult<()> {
        if let MarkupEvent::Start { name, .. } = &event {
            if *name == self.tag && self.strict {
                return Err(CopipeError::MalformedRecord(format!(
                    "<{}> opened inside another <{}>",
                    name, self.tag
                )));
            }
        }

        let AssemblerState::Accumulating { record, fragments } = &mut self.state else {
            return Ok(());
        };

        match event {
            MarkupEvent::Start { .. } => fragments.clear(),
            MarkupEvent::Text(text) => fragments.push(text),
            MarkupEvent::End { name } if name == self.tag => {
                let record = std::mem::take(record);
                self.state = AssemblerState::Idle;
                self.emitted += 1;
                return self.target.send(record);
            }
            MarkupEvent::End { name } => record.set(name, fragments.concat()),
        }

        Ok(())
    }
}

impl Coroutine<MarkupEvent> for RecordAssembler {
    fn resume(&mut self, event: MarkupEvent) -> CopipeResult<()> {
        match self.state {
            AssemblerState::Idle => self.on_idle(event),
            AssemblerState::Accumulating { .. } => self.on_accumulating(event),
        }
    }

    fn close(&mut self) -> CopipeResult<()> {
        if let AssemblerState::Accumulating { record, .. } = &self.state {
            pipe_log!(
                LogLevel::Warn,
                "pipeline::assemble",
                "Assembler '{}' closed mid-record; dropping {} partial field(s)",
                self.name,
                record.len()
            );
        }
        self.state = AssemblerState::Idle;

        pipe_log!(
            LogLevel::Debug,
            "pipeline::assemble",
            "Assembler '{}' emitted {} record(s)",
            self.name,
            self.emitted
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
