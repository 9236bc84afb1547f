//! Bounded retry around single cluster calls.
//!
//! Each attempt is capped by a timeout. Only transient errors and timeouts are retried, with
//! exponential backoff and jitter in between. Everything else fails on the first attempt.

use std::future::Future;
use std::time::Duration;

use autoscan_common::config::{BackoffConfig, ControllerConfig};
use autoscan_common::error::{ClientError, MutationError, MutationKind};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MutationExecutor {
    attempts: u32,
    timeout: Duration,
    backoff: BackoffConfig,
}

impl MutationExecutor {
    pub fn new(attempts: u32, timeout: Duration, backoff: BackoffConfig) -> Self {
        Self {
            attempts: attempts.max(1),
            timeout,
            backoff,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.mutation_attempts,
            config.mutation_timeout,
            config.backoff.clone(),
        )
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of attempts.
    pub async fn run<T, F, Fut>(
        &self,
        kind: MutationKind,
        job: &str,
        mut op: F,
    ) -> Result<T, MutationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let exhausted: bool = attempt >= self.attempts;

            match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(source)) if exhausted || !source.is_retryable() => {
                    return Err(MutationError::Failed {
                        kind,
                        job: job.to_string(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(_) if exhausted => {
                    return Err(MutationError::TimedOut {
                        kind,
                        job: job.to_string(),
                        attempts: attempt,
                        timeout: self.timeout,
                    });
                }
                Ok(Err(e)) => debug!(%kind, job, attempt, error = %e, "Transient failure, retrying"),
                Err(_) => debug!(%kind, job, attempt, "Attempt timed out, retrying"),
            }

            tokio::time::sleep(self.delay(attempt)).await;
        }
    }

    /// Backoff for `attempt` with up to 50% jitter taken off.
    fn delay(&self, attempt: u32) -> Duration {
        let base: Duration = self.backoff.delay_for_attempt(attempt);
        let factor: f64 = rand::random_range(0.5..=1.0);
        base.mul_f64(factor)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(attempts: u32) -> MutationExecutor {
        MutationExecutor::new(
            attempts,
            Duration::from_secs(1),
            BackoffConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                multiplier: 2.0,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = executor(3)
            .run(MutationKind::Create, "default/web", || async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(ClientError::Transient("busy".into())),
                    _ => Ok(42),
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_configured_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = executor(3)
            .run(MutationKind::Update, "default/web", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Transient("busy".into()))
            })
            .await;

        assert!(matches!(
            result,
            Err(MutationError::Failed { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = executor(5)
            .run(MutationKind::Create, "default/web", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Rejected("schema".into()))
            })
            .await;

        assert!(matches!(
            result,
            Err(MutationError::Failed { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_calls_time_out() {
        let result: Result<(), _> = executor(2)
            .run(MutationKind::Delete, "default/web", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(MutationError::TimedOut { attempts: 2, .. })
        ));
    }
}
