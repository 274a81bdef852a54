//! Cancellable sleeps shared by the fetch client and the orchestrator

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless the token is cancelled first
///
/// Returns `true` if the full duration elapsed, `false` if shutdown cut it short.
pub async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !shutdown.is_cancelled();
    }

    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
