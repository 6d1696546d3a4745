use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// A request-wide deadline with a cancellation token that every backend call observes.
///
/// Sub-calls run through [`Deadline::run`], which bounds them by the smaller of their own
/// budget and what is left of the request. Cancelling the deadline (or dropping the
/// pipeline future) stops outstanding work instead of leaving it running in the background.
#[derive(Debug, Clone)]
pub struct Deadline {
    expires_at: Instant,
    token: CancellationToken,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
            token: CancellationToken::new(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Runs `fut` under `min(budget, remaining)`, converting expiry or cancellation into
    /// [`AppError::BackendTimeout`].
    pub async fn run<T, F>(&self, backend: &'static str, budget: Duration, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let limit = budget.min(self.remaining());
        let timeout_ms = limit.as_millis() as u64;

        if limit.is_zero() || self.token.is_cancelled() {
            return Err(AppError::BackendTimeout {
                backend,
                timeout_ms,
            });
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(AppError::BackendTimeout { backend, timeout_ms }),
            res = tokio::time::timeout(limit, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(AppError::BackendTimeout { backend, timeout_ms }),
            },
        }
    }
}
