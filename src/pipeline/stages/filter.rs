use crate::error::CopipeResult;
use crate::logger::LogLevel;
use crate::pipe_log;
use crate::pipeline::{Coroutine, Record, Stage};

/// Stage that forwards the items matching a predicate and drops the rest
///
/// Each item is decided and forwarded before `send` returns, so order is preserved.
///
/// # Example
/// ```
/// use copipe_lib::pipeline::stages::{grep, Collector};
///
/// let (sink, lines) = Collector::start("matches").unwrap();
/// let filter = grep("python", sink).unwrap();
///
/// filter.send("go rocks".to_string()).unwrap();
/// filter.send("python rocks".to_string()).unwrap();
///
/// assert_eq!(lines.items(), vec!["python rocks".to_string()]);
/// ```
pub struct Filter<T, P> {
    name: String,
    predicate: P,
    target: Stage<T>,
    dropped: u64,
}

impl<T, P> Filter<T, P>
where
    P: FnMut(&T) -> bool,
{
    pub fn new(name: impl Into<String>, predicate: P, target: Stage<T>) -> Self {
        Self {
            name: name.into(),
            predicate,
            target,
            dropped: 0,
        }
    }
}

impl<T, P> Coroutine<T> for Filter<T, P>
where
    P: FnMut(&T) -> bool,
{
    fn resume(&mut self, item: T) -> CopipeResult<()> {
        if (self.predicate)(&item) {
            self.target.send(item)
        } else {
            self.dropped += 1;
            Ok(())
        }
    }

    fn close(&mut self) -> CopipeResult<()> {
        pipe_log!(
            LogLevel::Debug,
            "pipeline::filter",
            "Filter '{}' dropped {} item(s)",
            self.name,
            self.dropped
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Start a filter stage
pub fn filter<T, P>(name: impl Into<String>, predicate: P, target: Stage<T>) -> CopipeResult<Stage<T>>
where
    T: 'static,
    P: FnMut(&T) -> bool + 'static,
{
    Stage::start(Filter::new(name, predicate, target))
}

/// Forward lines containing `pattern`
pub fn grep(pattern: impl Into<String>, target: Stage<String>) -> CopipeResult<Stage<String>> {
    let pattern = pattern.into();
    let name = format!("grep {}", pattern);
    filter(name, move |line: &String| line.contains(&pattern), target)
}

/// Forward records whose `field` equals `value`
///
/// Records without the field are dropped.
pub fn field_equals(
    field: impl Into<String>,
    value: impl Into<String>,
    target: Stage<Record>,
) -> CopipeResult<Stage<Record>> {
    let field = field.into();
    let value = value.into();
    let name = format!("{} == {}", field, value);
    filter(
        name,
        move |record: &Record| record.get(&field) == Some(value.as_str()),
        target,
    )
}
