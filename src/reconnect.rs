//! Periodic reconnect loop.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A running reconnect loop. Cancelled by `stop` or when dropped.
#[derive(Debug)]
pub struct Reconnector {
    token: CancellationToken,
}

impl Reconnector {
    /// Spawn a task that calls `tick` every `period`, starting one period from
    /// now. The loop ends when cancelled or when `tick` resolves to `false`.
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if !tick().await {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("reconnect loop stopped");
        });
        Self { token }
    }

    pub fn stop(self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
