//! Synchronous pull-driven pipelines of stages
//!
//! A [`Stage`] wraps a [`Coroutine`]: logic that is primed once, resumed with one item at
//! a time, and closed. Stages hold handles to their downstream stages and forward items
//! by calling [`Stage::send`] while they process, so one `send` on the head stage runs
//! the whole pipeline for that item before returning.
//!
//! # Example
//! ```
//! use copipe_lib::pipeline::stages::{broadcast, grep, Collector};
//!
//! let (python, python_lines) = Collector::start("python").unwrap();
//! let (go, go_lines) = Collector::start("go").unwrap();
//!
//! let head = broadcast(
//!     "languages",
//!     vec![grep("python", python).unwrap(), grep("go", go).unwrap()],
//! )
//! .unwrap();
//!
//! head.send("alpha python line".to_string()).unwrap();
//! head.send("beta go line".to_string()).unwrap();
//!
//! assert_eq!(python_lines.items(), vec!["alpha python line".to_string()]);
//! assert_eq!(go_lines.items(), vec!["beta go line".to_string()]);
//! ```

pub mod core;
pub mod event;
pub mod executor;
pub mod record;
pub mod registry;
pub mod stages;

// Re-export main types
pub use self::core::{from_fn, Coroutine, FnCoroutine, Stage, StageStats, StageStatus};
pub use event::MarkupEvent;
pub use executor::{Pipeline, PipelineBuilder, PipelineResult, StageControl, StageResult};
pub use record::Record;
pub use registry::StageRegistry;
