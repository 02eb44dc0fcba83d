use crate::error::CopipeResult;
use crate::pipeline::{Coroutine, Stage};

/// Stage that converts each item and forwards the result
pub struct Map<U, F> {
    name: String,
    f: F,
    target: Stage<U>,
}

impl<T, U, F> Coroutine<T> for Map<U, F>
where
    F: FnMut(T) -> U,
{
    fn resume(&mut self, item: T) -> CopipeResult<()> {
        let mapped = (self.f)(item);
        self.target.send(mapped)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Start a stage that applies `f` to every item before forwarding it
pub fn map<T, U, F>(name: impl Into<String>, f: F, target: Stage<U>) -> CopipeResult<Stage<T>>
where
    T: 'static,
    U: 'static,
    F: FnMut(T) -> U + 'static,
{
    Stage::start(Map {
        name: name.into(),
        f,
        target,
    })
}

/// Start a stage that passes items through to `target` unchanged
///
/// Useful as a stable entry point in front of a stage that may be swapped at build time.
pub fn relay<T: 'static>(name: impl Into<String>, target: Stage<T>) -> CopipeResult<Stage<T>> {
    map(name, |item: T| item, target)
}
