//! Synchronous, push-through stage pipelines
//!
//! Items are pulled from a source (a file being followed, a markup document, any
//! iterator) and pushed one at a time through a chain of stages. Each stage is primed
//! once, handles one item per `send`, and may forward items to any number of downstream
//! stages. A whole item travels the topology before the next one is read.
//!
//! - [`pipeline`]: the stage primitive, the built-in stages, and [`pipeline::Pipeline`]
//! - [`source`]: origins and the polling adapter that drives a pipeline
//! - [`config`]: JSON configuration for the `copipe` command
//! - [`topology`]: builds pipelines from configuration

pub mod config;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod source;
pub mod topology;

pub use error::{CopipeError, CopipeResult};
