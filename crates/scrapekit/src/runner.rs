//! Signal handling, execution timeout, and graceful/forced shutdown.

use crate::scraper::Scraper;
use scrapekit_core::ScrapeError;
use scrapekit_pipeline::Item;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs the scraper with SIGINT/SIGTERM handling. The first signal starts
/// a cooperative shutdown; a repeat signal forces an immediate exit.
pub async fn run<I: Item>(scraper: Scraper<I>) -> Result<(), ScrapeError> {
    let shutdown = CancellationToken::new();
    let force_exit = CancellationToken::new();
    spawn_signal_listener(shutdown.clone(), force_exit.clone());
    run_with_shutdown(scraper, shutdown, force_exit).await
}

/// Runs the scraper against caller-owned shutdown tokens.
///
/// `shutdown` triggers the cooperative path: the engine abandons
/// producers and drain waits, then closes within
/// `execution.shutdown_timeout`. `force_exit` aborts immediately,
/// skipping the drain wait.
pub async fn run_with_shutdown<I: Item>(
    mut scraper: Scraper<I>,
    shutdown: CancellationToken,
    force_exit: CancellationToken,
) -> Result<(), ScrapeError> {
    scraper.ensure_config()?;
    let execution = scraper.execution_config();

    let mut engine: JoinHandle<Result<(), ScrapeError>> =
        tokio::spawn(scraper.start(shutdown.child_token()));

    let timeout = async {
        match execution.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timeout);

    let graceful = tokio::select! {
        result = &mut engine => return flatten(result),
        _ = shutdown.cancelled() => {
            tracing::warn!("shutdown requested, cancelling tasks");
            true
        }
        _ = &mut timeout => {
            log_timeout(execution.log_level, execution.timeout);
            shutdown.cancel();
            true
        }
        _ = force_exit.cancelled() => {
            tracing::error!("force exit requested, cancelling immediately");
            false
        }
    };

    if graceful {
        tokio::select! {
            result = &mut engine => return flatten(result),
            _ = tokio::time::sleep(execution.shutdown_timeout) => {
                tracing::error!("shutdown timeout expired");
                engine.abort();
            }
            _ = force_exit.cancelled() => {
                tracing::error!("force exit requested, skipping drain wait");
                engine.abort();
            }
        }
    } else {
        engine.abort();
    }

    let _ = engine.await;
    Ok(())
}

fn flatten(result: Result<Result<(), ScrapeError>, tokio::task::JoinError>) -> Result<(), ScrapeError> {
    match result {
        Ok(result) => result,
        Err(join_error) => Err(ScrapeError::Handler(format!(
            "engine task failed: {join_error}"
        ))),
    }
}

fn log_timeout(level: tracing::Level, timeout: Option<std::time::Duration>) {
    let seconds = timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
    match level {
        tracing::Level::ERROR => tracing::error!(timeout_s = seconds, "execution timeout reached, cancelling tasks"),
        tracing::Level::WARN => tracing::warn!(timeout_s = seconds, "execution timeout reached, cancelling tasks"),
        tracing::Level::INFO => tracing::info!(timeout_s = seconds, "execution timeout reached, cancelling tasks"),
        tracing::Level::DEBUG => tracing::debug!(timeout_s = seconds, "execution timeout reached, cancelling tasks"),
        tracing::Level::TRACE => tracing::trace!(timeout_s = seconds, "execution timeout reached, cancelling tasks"),
    }
}

fn spawn_signal_listener(shutdown: CancellationToken, force_exit: CancellationToken) {
    tokio::spawn(async move {
        loop {
            wait_for_signal().await;
            if !shutdown.is_cancelled() {
                tracing::info!("received shutdown signal");
                shutdown.cancel();
            } else if !force_exit.is_cancelled() {
                tracing::error!("received second signal, ignoring shutdown timeout");
                force_exit.cancel();
                return;
            } else {
                return;
            }
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
