//! Ordered, short-circuiting fallback chain for the voice assistant.
//!
//! Launching "the" assistant works differently on every host, so the action
//! is expressed as a list of interchangeable strategies tried in priority
//! order. The first one that reports success ends the chain.

use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;

use crate::notify::Notifier;
use crate::{Error, Result};

/// Why a strategy attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// The target (app, command, input device) is not present
    Unavailable(String),
    /// The target exists but refused or failed the request
    Rejected(String),
    /// The attempt did not finish within its time budget
    TimedOut(Duration),
}

impl std::fmt::Display for StrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyError::Unavailable(msg) => write!(f, "unavailable: {}", msg),
            StrategyError::Rejected(msg) => write!(f, "rejected: {}", msg),
            StrategyError::TimedOut(limit) => write!(f, "timed out after {:?}", limit),
        }
    }
}

impl std::error::Error for StrategyError {}

/// One way of bringing up the voice assistant.
///
/// Implementations must return within a bounded time; a strategy that has to
/// wait (e.g. holding a simulated button) owns that wait and its limit.
pub trait AssistStrategy: Send {
    /// Short stable name used in logs
    fn name(&self) -> &str;

    fn attempt(&mut self) -> std::result::Result<(), StrategyError>;
}

/// Outcome of one attempt, kept for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub strategy: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn success(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(strategy: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            strategy: strategy.into(),
            succeeded: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.error, self.succeeded) {
            (_, true) => write!(f, "{}: ok", self.strategy),
            (Some(e), false) => write!(f, "{}: failed ({})", self.strategy, e),
            (None, false) => write!(f, "{}: failed", self.strategy),
        }
    }
}

pub struct FallbackChain {
    strategies: Vec<Box<dyn AssistStrategy>>,
}

impl FallbackChain {
    pub fn new(strategies: Vec<Box<dyn AssistStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy in order until one succeeds.
    ///
    /// Every attempt is reported to `notifier` as soon as it finishes. On
    /// success the returned log ends with the successful attempt; when all
    /// strategies fail, [`Error::ChainExhausted`] carries one record per
    /// strategy in declared order.
    pub fn run(&mut self, notifier: &dyn Notifier) -> Result<Vec<AttemptRecord>> {
        match self.try_in_order(notifier) {
            (true, log) => Ok(log),
            (false, log) => Err(Error::ChainExhausted(log)),
        }
    }

    /// Same walk as [`run`](Self::run), returning whether a strategy
    /// succeeded alongside the attempt log.
    pub fn try_in_order(&mut self, notifier: &dyn Notifier) -> (bool, Vec<AttemptRecord>) {
        let mut log = Vec::with_capacity(self.strategies.len());

        for strategy in self.strategies.iter_mut() {
            let name = strategy.name().to_string();
            info!("voice assist: trying {}", name);

            let record = match strategy.attempt() {
                Ok(()) => AttemptRecord::success(&name),
                Err(e) => {
                    warn!("voice assist: {} failed: {}", name, e);
                    AttemptRecord::failure(&name, e)
                }
            };
            notifier.attempt(&record);

            let done = record.succeeded;
            log.push(record);
            if done {
                info!("voice assist: {} succeeded", name);
                return (true, log);
            }
        }

        error!("voice assist: all {} strategies failed", log.len());
        notifier.exhausted(&log);
        (false, log)
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("strategies", &self.names())
            .finish()
    }
}
