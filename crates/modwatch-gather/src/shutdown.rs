use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Process-wide cooperative cancellation flag.
///
/// Starts unset, is set at most once by [`ShutdownSignal::trigger`], and is
/// never reset. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("shutdown signal set");
        }
        self.token.cancel();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the flag is set.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Sleeps for `duration` unless the flag is set first. Returns `true` when
    /// the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.token.cancelled() => false,
        }
    }
}
