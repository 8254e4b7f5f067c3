//! Waits on the service's long-running tasks
//!
//! The analysis loop and the metrics server run until shutdown. Either of
//! them finishing first is an error, so the process exits instead of
//! serving stale metrics.

use anyhow::{Context, Result};
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::error;

/// Wait for `signal`, or fail when a background task ends first.
///
/// `analysis` is borrowed so the caller can still join it after sending
/// the shutdown broadcast.
pub async fn wait_for_shutdown<S>(
    signal: S,
    api: JoinHandle<Result<()>>,
    analysis: &mut JoinHandle<()>,
) -> Result<()>
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        received = signal => {
            received.context("Failed to listen for shutdown signal")?;
            Ok(())
        }
        served = api => {
            served.context("Metrics server task failed")??;
            anyhow::bail!("Metrics server exited unexpectedly");
        }
        finished = analysis => {
            match finished {
                Ok(()) => {
                    error!(event = "analysis_loop_exited", "Analysis loop stopped without shutdown");
                    anyhow::bail!("Analysis loop exited unexpectedly");
                }
                Err(e) => {
                    error!(event = "analysis_loop_exited", error = %e, "Analysis loop task failed");
                    Err(e).context("Analysis loop task failed")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    fn idle_api() -> JoinHandle<Result<()>> {
        tokio::spawn(pending())
    }

    #[tokio::test]
    async fn test_signal_returns_ok() {
        let mut analysis = tokio::spawn(pending::<()>());

        let signal = async { Ok::<(), std::io::Error>(()) };
        let result = wait_for_shutdown(signal, idle_api(), &mut analysis).await;

        assert!(result.is_ok());
        analysis.abort();
    }

    #[tokio::test]
    async fn test_panicked_analysis_loop_is_error() {
        let mut analysis = tokio::spawn(async { panic!("analysis loop crashed") });

        let result = wait_for_shutdown(pending(), idle_api(), &mut analysis).await;

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Analysis loop task failed"));
    }

    #[tokio::test]
    async fn test_returned_analysis_loop_is_error() {
        let mut analysis = tokio::spawn(async {});

        let result = wait_for_shutdown(pending(), idle_api(), &mut analysis).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Analysis loop exited unexpectedly"
        );
    }

    #[tokio::test]
    async fn test_stopped_metrics_server_is_error() {
        let mut analysis = tokio::spawn(pending::<()>());
        let api = tokio::spawn(async { Ok::<(), anyhow::Error>(()) });

        let result = wait_for_shutdown(pending(), api, &mut analysis).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Metrics server exited unexpectedly"
        );
        analysis.abort();
    }
}
