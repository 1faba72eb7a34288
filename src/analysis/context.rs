//! Per-invocation context handed to analysis methods.

use crate::error::AnalysisError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Named options for one method invocation.
pub type Options = BTreeMap<String, Value>;

/// Shared cancellation flag for a batch run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options, deadline and cancellation for one method call.
///
/// The core cannot interrupt a running method. Long methods should call
/// [`MethodContext::checkpoint`] between units of work.
#[derive(Debug, Clone, Default)]
pub struct MethodContext {
    options: Options,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl MethodContext {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Numeric option, or `default` when absent or not a number.
    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.option(name).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err` once the batch was cancelled or the deadline passed.
    pub fn checkpoint(&self) -> Result<(), AnalysisError> {
        if self.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AnalysisError::DeadlineExceeded);
        }
        Ok(())
    }
}
