//! Per-operation completion contract (spec.md §4.2, §9
//! "Function-pointer completion callbacks").
//!
//! A completion is charged once per op that shares it; when the count
//! reaches zero the callback fires exactly once. This maps the C vtable's
//! function-pointer-plus-context pair to a typed `on_complete`.

use std::sync::{Arc, Mutex};

/// Outcome of a single DMA op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DmaStatus {
    Success,
    Error(String),
}

impl DmaStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DmaStatus::Success)
    }
}

struct CompletionInner {
    remaining: usize,
    on_complete: Option<Box<dyn FnMut(DmaStatus) + Send>>,
    last_status: DmaStatus,
}

/// Shared handle to a completion. Cloning shares the same counter and
/// callback; every clone must be charged exactly once via [`Completion::charge`].
#[derive(Clone)]
pub struct Completion(Arc<Mutex<CompletionInner>>);

impl Completion {
    /// `count` is the number of DMA ops that must all finish before
    /// `on_complete` fires. `on_complete` receives the status of whichever
    /// charge made the count reach zero; a prior `Error` status is sticky
    /// and overrides a later `Success` (any failure in the chain fails the
    /// whole command).
    pub fn new(count: usize, on_complete: impl FnMut(DmaStatus) + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(CompletionInner {
            remaining: count.max(1),
            on_complete: Some(Box::new(on_complete)),
            last_status: DmaStatus::Success,
        })))
    }

    /// Charge one op against this completion. Fires the callback if this
    /// was the last outstanding charge.
    pub fn charge(&self, status: DmaStatus) {
        let mut inner = self.0.lock().unwrap();
        if !status.is_success() {
            inner.last_status = status;
        }
        inner.remaining = inner.remaining.saturating_sub(1);
        if inner.remaining == 0 {
            if let Some(mut cb) = inner.on_complete.take() {
                let status = inner.last_status.clone();
                drop(inner);
                cb(status);
            }
        }
    }
}

#[cfg(test)]
mod completion_tests;
