use crate::error::{CopipeError, CopipeResult};
use crate::logger::LogLevel;
use crate::pipe_log;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Processing logic that runs inside a [`Stage`]
///
/// A coroutine is suspended between items: `resume` runs from one receive point to the
/// next and returns. Downstream targets are owned by the coroutine itself and are fed by
/// calling [`Stage::send`] from inside `resume`.
///
/// # Example
/// ```
/// use copipe_lib::error::CopipeResult;
/// use copipe_lib::pipeline::{Coroutine, Stage};
///
/// struct Upper {
///     target: Stage<String>,
/// }
///
/// impl Coroutine<String> for Upper {
///     fn resume(&mut self, line: String) -> CopipeResult<()> {
///         self.target.send(line.to_uppercase())
///     }
///
///     fn name(&self) -> &str {
///         "upper"
///     }
/// }
/// ```
pub trait Coroutine<T> {
    /// Runs once when the stage is created, before the first item arrives
    fn start(&mut self) -> CopipeResult<()> {
        Ok(())
    }

    /// Process one item
    fn resume(&mut self, item: T) -> CopipeResult<()>;

    /// Called once when the stage is closed; flush or discard partial state here
    fn close(&mut self) -> CopipeResult<()> {
        Ok(())
    }

    /// Stage name for logging and error reports
    fn name(&self) -> &str;
}

/// Lifecycle of a stage handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Primed and waiting for the next item
    Running,
    /// Closed; every further `send` fails
    Closed,
}

/// Counters kept by every stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Items accepted by `send`
    pub received: u64,
    /// Items whose processing returned an error
    pub failed: u64,
}

struct StageCell<T> {
    name: String,
    status: StageStatus,
    stats: StageStats,
    logic: Box<dyn Coroutine<T>>,
}

/// A running stage
///
/// Handles are cheap to clone and all clones refer to the same stage, so a stage can be
/// the target of more than one upstream stage. A stage belongs to the thread that
/// created it.
pub struct Stage<T> {
    inner: Rc<RefCell<StageCell<T>>>,
    name: Rc<str>,
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            name: Rc::clone(&self.name),
        }
    }
}

impl<T> fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

impl<T: 'static> Stage<T> {
    /// Create a stage and prime it
    ///
    /// The coroutine's `start` hook runs before this returns, so the stage is already
    /// waiting for its first item.
    pub fn start<C>(logic: C) -> CopipeResult<Self>
    where
        C: Coroutine<T> + 'static,
    {
        Self::start_boxed(Box::new(logic))
    }

    /// Create a stage from already boxed logic
    pub fn start_boxed(mut logic: Box<dyn Coroutine<T>>) -> CopipeResult<Self> {
        let name: Rc<str> = Rc::from(logic.name());
        logic.start()?;

        pipe_log!(LogLevel::Debug, "pipeline::stage", stage = name; "Stage '{}' started", name);

        Ok(Self {
            inner: Rc::new(RefCell::new(StageCell {
                name: name.to_string(),
                status: StageStatus::Running,
                stats: StageStats::default(),
                logic,
            })),
            name,
        })
    }
}

impl<T> Stage<T> {
    /// Stage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status
    ///
    /// A stage that is busy processing an item is always running.
    pub fn status(&self) -> StageStatus {
        self.inner
            .try_borrow()
            .map(|cell| cell.status)
            .unwrap_or(StageStatus::Running)
    }

    /// Whether `close` has completed on this stage
    pub fn is_closed(&self) -> bool {
        self.status() == StageStatus::Closed
    }

    /// Counters for this stage
    pub fn stats(&self) -> StageStats {
        self.inner
            .try_borrow()
            .map(|cell| cell.stats)
            .unwrap_or_default()
    }

    /// Resume the stage with `item` and run it until it waits again
    ///
    /// Errors raised by this stage or anything downstream of it are returned as is.
    pub fn send(&self, item: T) -> CopipeResult<()> {
        let mut cell = self
            .inner
            .try_borrow_mut()
            .map_err(|_| CopipeError::ReentrantSend {
                stage: self.name.to_string(),
            })?;

        if cell.status == StageStatus::Closed {
            return Err(CopipeError::ClosedStage {
                stage: cell.name.clone(),
            });
        }

        cell.stats.received += 1;
        let result = cell.logic.resume(item);
        if result.is_err() {
            cell.stats.failed += 1;
        }
        result
    }

    /// Close the stage
    ///
    /// Runs the coroutine's `close` hook once. Closing a closed stage does nothing.
    /// Downstream stages are left open.
    pub fn close(&self) -> CopipeResult<()> {
        let mut cell = self
            .inner
            .try_borrow_mut()
            .map_err(|_| CopipeError::ReentrantSend {
                stage: self.name.to_string(),
            })?;

        if cell.status == StageStatus::Closed {
            return Ok(());
        }

        // Mark closed first so a failing hook cannot leave the stage half open
        cell.status = StageStatus::Closed;
        let result = cell.logic.close();

        pipe_log!(
            LogLevel::Debug,
            "pipeline::stage",
            stage = cell.name;
            "Stage '{}' closed after {} item(s)",
            cell.name,
            cell.stats.received
        );

        result
    }
}

/// Coroutine built from a closure, see [`from_fn`]
pub struct FnCoroutine<F> {
    name: String,
    f: F,
}

impl<T, F> Coroutine<T> for FnCoroutine<F>
where
    F: FnMut(T) -> CopipeResult<()>,
{
    fn resume(&mut self, item: T) -> CopipeResult<()> {
        (self.f)(item)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Start a stage whose logic is a closure called once per item
pub fn from_fn<T, F>(name: impl Into<String>, f: F) -> CopipeResult<Stage<T>>
where
    T: 'static,
    F: FnMut(T) -> CopipeResult<()> + 'static,
{
    Stage::start(FnCoroutine {
        name: name.into(),
        f,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Coroutine<i32> for Recorder {
        fn start(&mut self) -> CopipeResult<()> {
            self.log.borrow_mut().push("start".to_string());
            Ok(())
        }

        fn resume(&mut self, item: i32) -> CopipeResult<()> {
            self.log.borrow_mut().push(format!("item {}", item));
            Ok(())
        }

        fn close(&mut self) -> CopipeResult<()> {
            self.log.borrow_mut().push("close".to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    fn recorder() -> (Stage<i32>, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let stage = Stage::start(Recorder { log: log.clone() }).unwrap();
        (stage, log)
    }

    #[test]
    fn test_start_primes_stage() {
        let (stage, log) = recorder();
        assert_eq!(*log.borrow(), vec!["start"]);
        assert_eq!(stage.status(), StageStatus::Running);
        assert_eq!(stage.name(), "recorder");
    }

    #[test]
    fn test_send_resumes_in_order() {
        let (stage, log) = recorder();
        stage.send(1).unwrap();
        stage.send(2).unwrap();

        assert_eq!(*log.borrow(), vec!["start", "item 1", "item 2"]);
        assert_eq!(stage.stats().received, 2);
    }

    #[test]
    fn test_send_after_close_fails() {
        let (stage, log) = recorder();
        stage.close().unwrap();

        let err = stage.send(7).unwrap_err();
        assert!(matches!(err, CopipeError::ClosedStage { ref stage } if stage == "recorder"));
        assert_eq!(*log.borrow(), vec!["start", "close"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (stage, log) = recorder();
        stage.close().unwrap();
        stage.close().unwrap();

        assert!(stage.is_closed());
        assert_eq!(log.borrow().iter().filter(|e| *e == "close").count(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let (stage, _log) = recorder();
        let other = stage.clone();
        other.send(3).unwrap();
        stage.close().unwrap();

        assert!(other.is_closed());
        assert_eq!(stage.stats().received, 1);
    }

    #[test]
    fn test_failed_start_is_returned() {
        struct Broken;

        impl Coroutine<i32> for Broken {
            fn start(&mut self) -> CopipeResult<()> {
                Err(CopipeError::stage("broken", "no output"))
            }

            fn resume(&mut self, _item: i32) -> CopipeResult<()> {
                Ok(())
            }

            fn name(&self) -> &str {
                "broken"
            }
        }

        assert!(Stage::start(Broken).is_err());
    }

    #[test]
    fn test_errors_are_counted_and_propagated() {
        let stage = from_fn("odd-only", |n: i32| {
            if n % 2 == 0 {
                Err(CopipeError::stage("odd-only", format!("{} is even", n)))
            } else {
                Ok(())
            }
        })
        .unwrap();

        stage.send(1).unwrap();
        assert!(stage.send(2).is_err());
        // An error does not close the stage
        stage.send(3).unwrap();

        assert_eq!(
            stage.stats(),
            StageStats {
                received: 3,
                failed: 1
            }
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let slot: Rc<RefCell<Option<Stage<i32>>>> = Rc::new(RefCell::new(None));
        let inner = slot.clone();
        let stage = from_fn("loop", move |n: i32| match inner.borrow().as_ref() {
            Some(me) => me.send(n + 1),
            None => Ok(()),
        })
        .unwrap();
        *slot.borrow_mut() = Some(stage.clone());

        let err = stage.send(0).unwrap_err();
        assert!(matches!(err, CopipeError::ReentrantSend { .. }));

        // Break the Rc cycle
        slot.borrow_mut().take();
    }
}
