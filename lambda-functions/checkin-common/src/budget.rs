use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use lambda_runtime::Context;
use tracing::{debug, warn};

use crate::error::{CheckinError, CheckinResult};

/// Kept back from best-effort work so the response can still be returned.
pub const RESPONSE_RESERVE: Duration = Duration::from_millis(200);

/// Time left before the platform terminates the current invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionBudget {
    deadline: DateTime<Utc>,
}

impl ExecutionBudget {
    pub fn with_deadline(deadline: DateTime<Utc>) -> Self {
        Self { deadline }
    }

    pub fn starting_now(timeout: Duration) -> Self {
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::with_deadline(deadline)
    }

    /// Uses the invocation deadline (epoch milliseconds) when the runtime
    /// provides one, otherwise `fallback` from now.
    pub fn from_context(context: &Context, fallback: Duration) -> Self {
        if context.deadline == 0 {
            return Self::starting_now(fallback);
        }

        i64::try_from(context.deadline)
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(Self::with_deadline)
            .unwrap_or_else(|| Self::starting_now(fallback))
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Fails with a retryable error when less than `margin` remains.
    pub fn ensure(&self, margin: Duration) -> CheckinResult<()> {
        let remaining = self.remaining();
        if remaining < margin {
            warn!(
                remaining_ms = remaining.as_millis() as u64,
                margin_ms = margin.as_millis() as u64,
                "Not enough execution time left for the next external call"
            );
            return Err(CheckinError::BudgetExhausted {
                remaining_ms: remaining.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Runs best-effort `work` (cleanup, metrics) only inside the time left
    /// after [`RESPONSE_RESERVE`]. `None` when it was skipped or cut off.
    pub async fn run_within<F: Future>(&self, what: &str, work: F) -> Option<F::Output> {
        let available = self.remaining().saturating_sub(RESPONSE_RESERVE);
        if available.is_zero() {
            debug!(what, "Skipping, no execution time left");
            return None;
        }

        match tokio::time::timeout(available, work).await {
            Ok(output) => Some(output),
            Err(_) => {
                warn!(
                    what,
                    timeout_ms = available.as_millis() as u64,
                    "Cut off at the invocation deadline"
                );
                None
            }
        }
    }
}
