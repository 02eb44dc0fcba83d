//! Source adapters: pull items from an origin and push them into a pipeline
//!
//! An [`Origin`] is anything that can hand out the next item, say it has nothing yet, or
//! say it is finished. The [`SourceAdapter`] drives an origin into the first stage of a
//! pipeline, sleeping for a bounded poll interval whenever the origin has nothing ready.
//!
//! # Example
//! ```no_run
//! use copipe_lib::pipeline::stages::{grep, Printer};
//! use copipe_lib::pipeline::Stage;
//! use copipe_lib::source::{FollowMode, LineOrigin, SourceAdapter};
//!
//! let printer = Stage::start(Printer::lines("printer", std::io::stdout())).unwrap();
//! let head = grep("python", printer).unwrap();
//!
//! let mut origin = LineOrigin::open("access-log.txt", FollowMode::Follow, false).unwrap();
//! SourceAdapter::new().run(&mut origin, &head).unwrap();
//! ```

pub mod follow;
pub mod markup;

pub use follow::{FollowMode, LineOrigin};
pub use markup::MarkupOrigin;

use crate::error::CopipeResult;
use crate::logger::LogLevel;
use crate::pipe_log;
use crate::pipeline::Stage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default wait between polls of an origin that has nothing ready
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of asking an origin for its next item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull<T> {
    /// The next item
    Item(T),
    /// Nothing available yet; ask again later
    Pending,
    /// The origin will never produce another item
    Exhausted,
}

/// A sequential producer of items
pub trait Origin<T> {
    /// Read the next available item without blocking
    fn pull(&mut self) -> CopipeResult<Pull<T>>;

    /// Origin description for logging
    fn describe(&self) -> String {
        "origin".to_string()
    }
}

/// Why [`SourceAdapter::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The origin reported it has no more items
    Exhausted,
    /// The stop flag was raised
    Stopped,
}

/// Summary of one [`SourceAdapter::run`] call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    /// Items sent into the first stage
    pub items: u64,
    /// Times the origin had nothing ready and the adapter waited
    pub polls: u64,
    pub stopped_by: StopReason,
}

/// Drives an [`Origin`] into the first stage of a pipeline
#[derive(Debug, Clone)]
pub struct SourceAdapter {
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl SourceAdapter {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Flag that ends `run` at its next loop iteration once set to `true`
    ///
    /// The flag can be raised from another thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Pull items from `origin` and send each into `first`
    ///
    /// Returns when the origin is exhausted or the stop flag is raised. An origin that
    /// only ever reports `Pending` (a followed file) keeps this running indefinitely.
    /// Errors from the origin or from any stage are returned immediately.
    pub fn run<T, O>(&self, origin: &mut O, first: &Stage<T>) -> CopipeResult<SourceReport>
    where
        O: Origin<T> + ?Sized,
    {
        let mut items = 0;
        let mut polls = 0;

        pipe_log!(
            LogLevel::Info,
            "source",
            "Reading {} into stage '{}'",
            origin.describe(),
            first.name()
        );

        let stopped_by = loop {
            if self.stop.load(Ordering::Relaxed) {
                break StopReason::Stopped;
            }

            match origin.pull()? {
                Pull::Item(item) => {
                    first.send(item)?;
                    items += 1;
                }
                Pull::Pending => {
                    polls += 1;
                    std::thread::sleep(self.poll_interval);
                }
                Pull::Exhausted => break StopReason::Exhausted,
            }
        };

        pipe_log!(
            LogLevel::Info,
            "source",
            "Finished reading {} ({:?}): {} item(s), {} poll(s)",
            origin.describe(),
            stopped_by,
            items,
            polls
        );

        Ok(SourceReport {
            items,
            polls,
            stopped_by,
        })
    }
}

impl Default for SourceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Origin over an in-memory sequence; exhausted once the sequence ends
pub struct IterOrigin<I> {
    iter: I,
}

impl<I> IterOrigin<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<T, I> Origin<T> for IterOrigin<I>
where
    I: Iterator<Item = T>,
{
    fn pull(&mut self) -> CopipeResult<Pull<T>> {
        Ok(match self.iter.next() {
            Some(item) => Pull::Item(item),
            None => Pull::Exhausted,
        })
    }

    fn describe(&self) -> String {
        "in-memory items".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopipeError;
    use crate::pipeline::from_fn;
    use crate::pipeline::stages::Collector;
    use std::collections::VecDeque;

    /// Origin replaying a fixed script of pulls
    struct Scripted(VecDeque<Pull<i32>>);

    impl Origin<i32> for Scripted {
        fn pull(&mut self) -> CopipeResult<Pull<i32>> {
            Ok(self.0.pop_front().unwrap_or(Pull::Exhausted))
        }
    }

    fn fast_adapter() -> SourceAdapter {
        SourceAdapter::with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_runs_until_exhausted() {
        let (sink, seen) = Collector::start("sink").unwrap();
        let mut origin = IterOrigin::new(vec![1, 2, 3].into_iter());

        let report = fast_adapter().run(&mut origin, &sink).unwrap();

        assert_eq!(seen.items(), vec![1, 2, 3]);
        assert_eq!(report.items, 3);
        assert_eq!(report.stopped_by, StopReason::Exhausted);
    }

    #[test]
    fn test_pending_waits_and_retries() {
        let (sink, seen) = Collector::start("sink").unwrap();
        let mut origin = Scripted(VecDeque::from(vec![
            Pull::Item(1),
            Pull::Pending,
            Pull::Pending,
            Pull::Item(2),
        ]));

        let report = fast_adapter().run(&mut origin, &sink).unwrap();

        assert_eq!(seen.items(), vec![1, 2]);
        assert_eq!(report.polls, 2);
    }

    #[test]
    fn test_stop_flag_ends_run() {
        let (sink, _seen) = Collector::<i32>::start("sink").unwrap();
        let adapter = fast_adapter();
        adapter.stop_handle().store(true, Ordering::Relaxed);

        let mut origin = Scripted(VecDeque::from(vec![Pull::Item(1)]));
        let report = adapter.run(&mut origin, &sink).unwrap();

        assert_eq!(report.items, 0);
        assert_eq!(report.stopped_by, StopReason::Stopped);
    }

    #[test]
    fn test_stage_error_aborts_run() {
        let stage = from_fn("picky", |n: i32| {
            if n == 2 {
                Err(CopipeError::stage("picky", "two"))
            } else {
                Ok(())
            }
        })
        .unwrap();
        let mut origin = IterOrigin::new(1..=3);

        let err = fast_adapter().run(&mut origin, &stage).unwrap_err();

        assert!(matches!(err, CopipeError::Stage { .. }));
        assert_eq!(stage.stats().received, 2);
    }
}
