//! Per-request scope: cancellation and deadline.

use anyhow::Result;
use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RegistryError;

/// Cancellation signal and optional deadline shared by every backend call a
/// request makes.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestScope {
    /// A scope that never times out.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Scope for one request under an optional server-wide timeout.
    pub fn for_request(timeout: Option<Duration>) -> Self {
        timeout.map(Self::with_timeout).unwrap_or_default()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` unless the scope is cancelled or its deadline passes
    /// first. In that case `fut` is dropped and the result is
    /// `RegistryError::Cancelled`.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!("{} cancelled", operation);
                Err(RegistryError::Cancelled(format!("{} was cancelled", operation)).into())
            }
            _ = deadline => {
                debug!("{} exceeded its deadline", operation);
                Err(RegistryError::Cancelled(format!("{} exceeded its deadline", operation)).into())
            }
            result = fut => result,
        }
    }
}
