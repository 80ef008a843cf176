//! Cooperative cancellation for searches.
//!
//! Search loops call [`SearchControl::check`] at every layer and every
//! candidate expansion; nothing is interrupted preemptively.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Result, VectraError};

/// Shared flag a caller flips to abort in-flight searches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Deadline and/or cancellation token attached to one search.
#[derive(Debug, Clone, Default)]
pub struct SearchControl {
    deadline: Option<Instant>,
    token: Option<CancellationToken>,
}

impl SearchControl {
    /// A control that never cancels.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail with `Cancelled` once the token fires or the deadline passes.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if let Some(token) = &self.token
            && token.is_cancelled()
        {
            return Err(VectraError::cancelled("search cancelled by caller"));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(VectraError::cancelled("search deadline exceeded"));
        }
        Ok(())
    }
}
