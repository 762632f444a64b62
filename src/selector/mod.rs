//! Node Selection
//!
//! A selector narrows a candidate set with an ordered list of filters and
//! then lets exactly one strategy pick:
//!
//! ```text
//! candidates → [Filter]* → Strategy → Option<candidate>
//! ```
//!
//! Selectors hold no per-call state. The only shared mutable state is the
//! round-robin counter and the candidates' fail markers, all atomics.

mod filter;
mod marker;
mod strategy;

pub use filter::{FailFilter, Filter, DEFAULT_FAIL_TIMEOUT};
pub use marker::FailMarker;
pub use strategy::{FifoStrategy, RandomStrategy, RoundRobinStrategy, Strategy};

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Anything that carries a fail marker and can be selected.
///
/// A candidate without a marker is always considered healthy.
pub trait Selectable {
    fn marker(&self) -> Option<&FailMarker>;
}

impl<T: Selectable + ?Sized> Selectable for Arc<T> {
    fn marker(&self) -> Option<&FailMarker> {
        (**self).marker()
    }
}

/// Chooses one candidate, or none when nothing survives filtering.
pub trait Selector<T>: Send + Sync {
    fn select(&self, candidates: &[T]) -> Option<T>;
}

/// Filters followed by a strategy.
pub struct StrategySelector<T> {
    strategy: Box<dyn Strategy<T>>,
    filters: Vec<Box<dyn Filter<T>>>,
}

impl<T> StrategySelector<T> {
    pub fn new(strategy: impl Strategy<T> + 'static) -> Self {
        Self {
            strategy: Box::new(strategy),
            filters: Vec::new(),
        }
    }

    /// Builder: append a filter (filters run in insertion order)
    pub fn with_filter(mut self, filter: impl Filter<T> + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl<T: Clone + Send + Sync> Selector<T> for StrategySelector<T> {
    fn select(&self, candidates: &[T]) -> Option<T> {
        if self.filters.is_empty() {
            return self.strategy.apply(candidates).cloned();
        }

        let mut remaining = candidates.to_vec();
        for filter in &self.filters {
            remaining = filter.filter(remaining);
        }
        self.strategy.apply(&remaining).cloned()
    }
}

/// Strategy names accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    #[serde(alias = "rr", alias = "roundrobin")]
    Round,
    #[serde(alias = "rand")]
    Random,
    #[serde(alias = "ha")]
    Fifo,
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "round" | "rr" | "roundrobin" => Ok(StrategyKind::Round),
            "random" | "rand" => Ok(StrategyKind::Random),
            "fifo" | "ha" => Ok(StrategyKind::Fifo),
            other => Err(Error::Config(format!("unknown selector strategy: {}", other))),
        }
    }
}

/// Selector configuration
///
/// Fail-aware filtering is opt-in: it is only installed when `max_fails`
/// is greater than zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Failures before a candidate is skipped; 0 disables the fail filter.
    #[serde(default)]
    pub max_fails: u64,
    /// Seconds a failed candidate stays skipped; 0 means 30s.
    #[serde(default)]
    pub fail_timeout_secs: u64,
}

impl SelectorConfig {
    pub fn build<T>(&self) -> Arc<dyn Selector<T>>
    where
        T: Selectable + Clone + Send + Sync + 'static,
    {
        let mut selector = match self.strategy {
            StrategyKind::Round => StrategySelector::new(RoundRobinStrategy::new()),
            StrategyKind::Random => StrategySelector::new(RandomStrategy::new()),
            StrategyKind::Fifo => StrategySelector::new(FifoStrategy),
        };
        if self.max_fails > 0 {
            selector = selector.with_filter(FailFilter::new(
                self.max_fails,
                Duration::from_secs(self.fail_timeout_secs),
            ));
        }
        Arc::new(selector)
    }
}

/// Round robin without health filtering.
pub fn default_selector<T>() -> Arc<dyn Selector<T>>
where
    T: Selectable + Clone + Send + Sync + 'static,
{
    SelectorConfig::default().build()
}
