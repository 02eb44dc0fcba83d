use crate::error::{CopipeError, CopipeResult};
use crate::pipeline::Stage;
use std::collections::HashMap;

/// Named stages available while wiring a topology
///
/// Lets several upstream stages share one target by referring to it by name. Stages are
/// returned in registration order by [`StageRegistry::stages`].
pub struct StageRegistry<T> {
    index: HashMap<String, usize>,
    stages: Vec<Stage<T>>,
}

impl<T> StageRegistry<T> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            stages: Vec::new(),
        }
    }

    /// Register `stage` under `name`; names must be unique
    pub fn register(&mut self, name: impl Into<String>, stage: Stage<T>) -> CopipeResult<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(CopipeError::BuilderError(format!(
                "Stage '{}' is already registered",
                name
            )));
        }
        self.index.insert(name, self.stages.len());
        self.stages.push(stage);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Stage<T>> {
        self.index.get(name).map(|&i| self.stages[i].clone())
    }

    /// Look up a stage or fail with a builder error naming what is missing
    pub fn require(&self, name: &str) -> CopipeResult<Stage<T>> {
        self.get(name).ok_or_else(|| {
            CopipeError::BuilderError(format!("Unknown stage '{}'", name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// All stages in registration order
    pub fn stages(&self) -> &[Stage<T>] {
        &self.stages
    }
}

impl<T> Default for StageRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
