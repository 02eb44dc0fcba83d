use crate::error::{CopipeError, CopipeResult};
use crate::logger::LogLevel;
use crate::pipe_log;
use crate::pipeline::{Coroutine, Stage};
use serde::{Deserialize, Serialize};

/// What a broadcast does when one of its targets fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Stop at the first failing target and return its error; later targets miss the item
    #[default]
    FailFast,
    /// Deliver to every target, then report all failures as one `FanOut` error
    Isolated,
}

/// Stage that forwards every item to each target in registration order
///
/// All targets see item N before any target sees item N+1.
///
/// # Example
/// ```
/// use copipe_lib::pipeline::stages::{Broadcast, Collector};
/// use copipe_lib::pipeline::Stage;
///
/// let (a, seen_a) = Collector::start("a").unwrap();
/// let (b, seen_b) = Collector::start("b").unwrap();
/// let fan_out = Stage::start(Broadcast::new("fan-out", vec![a, b])).unwrap();
///
/// fan_out.send(1).unwrap();
/// assert_eq!(seen_a.items(), vec![1]);
/// assert_eq!(seen_b.items(), vec![1]);
/// ```
pub struct Broadcast<T> {
    name: String,
    targets: Vec<Stage<T>>,
    policy: DeliveryPolicy,
}

impl<T: Clone> Broadcast<T> {
    pub fn new(name: impl Into<String>, targets: Vec<Stage<T>>) -> Self {
        Self {
            name: name.into(),
            targets,
            policy: DeliveryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    fn deliver_isolated(&self, item: T) -> CopipeResult<()> {
        let mut failures = Vec::new();

        for target in &self.targets {
            if let Err(e) = target.send(item.clone()) {
                pipe_log!(
                    LogLevel::Warn,
                    "pipeline::broadcast",
                    stage = target.name();
                    "Broadcast '{}' target '{}' failed: {}",
                    self.name,
                    target.name(),
                    e
                );
                failures.push((target.name().to_string(), e.to_string()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CopipeError::FanOut { failures })
        }
    }
}

impl<T: Clone> Coroutine<T> for Broadcast<T> {
    fn start(&mut self) -> CopipeResult<()> {
        if self.targets.is_empty() {
            pipe_log!(
                LogLevel::Warn,
                "pipeline::broadcast",
                "Broadcast '{}' has no targets; items will be dropped",
                self.name
            );
        }
        Ok(())
    }

    fn resume(&mut self, item: T) -> CopipeResult<()> {
        match self.policy {
            DeliveryPolicy::FailFast => {
                if let Some((last, rest)) = self.targets.split_last() {
                    for target in rest {
                        target.send(item.clone())?;
                    }
                    last.send(item)?;
                }
                Ok(())
            }
            DeliveryPolicy::Isolated => self.deliver_isolated(item),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Start a fail-fast broadcast stage
pub fn broadcast<T>(name: impl Into<String>, targets: Vec<Stage<T>>) -> CopipeResult<Stage<T>>
where
    T: Clone + 'static,
{
    Stage::start(Broadcast::new(name, targets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::from_fn;
    use crate::pipeline::stages::Collector;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_every_target_sees_every_item_in_order() {
        let (a, seen_a) = Collector::start("a").unwrap();
        let (b, seen_b) = Collector::start("b").unwrap();
        let (c, seen_c) = Collector::start("c").unwrap();
        let stage = broadcast("fan-out", vec![a, b, c]).unwrap();

        for n in 0..5 {
            stage.send(n).unwrap();
        }

        for seen in [seen_a, seen_b, seen_c] {
            assert_eq!(seen.items(), vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_targets_interleave_per_item() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let targets = ["a", "b"]
            .into_iter()
            .map(|label| {
                let trace = trace.clone();
                from_fn(label, move |n: i32| {
                    trace.borrow_mut().push(format!("{}{}", label, n));
                    Ok(())
                })
                .unwrap()
            })
            .collect();
        let stage = broadcast("fan-out", targets).unwrap();

        stage.send(1).unwrap();
        stage.send(2).unwrap();

        assert_eq!(*trace.borrow(), vec!["a1", "b1", "a2", "b2"]);
    }

    fn failing(name: &'static str) -> Stage<i32> {
        from_fn(name, move |_n: i32| Err(CopipeError::stage(name, "boom"))).unwrap()
    }

    #[test]
    fn test_fail_fast_skips_later_targets() {
        let (a, seen_a) = Collector::start("a").unwrap();
        let (c, seen_c) = Collector::start("c").unwrap();
        let stage = broadcast("fan-out", vec![a, failing("b"), c]).unwrap();

        let err = stage.send(1).unwrap_err();

        assert!(matches!(err, CopipeError::Stage { ref stage, .. } if stage == "b"));
        assert_eq!(seen_a.items(), vec![1]);
        assert!(seen_c.is_empty());
    }

    #[test]
    fn test_isolated_reaches_all_targets() {
        let (a, seen_a) = Collector::start("a").unwrap();
        let (c, seen_c) = Collector::start("c").unwrap();
        let stage = Stage::start(
            Broadcast::new("fan-out", vec![a, failing("b"), c, failing("d")])
                .with_policy(DeliveryPolicy::Isolated),
        )
        .unwrap();

        let err = stage.send(1).unwrap_err();

        match err {
            CopipeError::FanOut { failures } => {
                let names: Vec<_> = failures.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["b", "d"]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(seen_a.items(), vec![1]);
        assert_eq!(seen_c.items(), vec![1]);
    }

    #[test]
    fn test_no_targets_is_not_an_error() {
        let stage = broadcast::<i32>("empty", Vec::new()).unwrap();
        stage.send(1).unwrap();
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: DeliveryPolicy = serde_json::from_str("\"isolated\"").unwrap();
        assert_eq!(policy, DeliveryPolicy::Isolated);
    }
}
