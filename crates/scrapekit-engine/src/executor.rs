//! Runs producers against the request manager and drains the system.

use crate::manager::RequestManager;
use crate::session::Session;
use crate::{ExecutionConfig, SchedulerConfig};
use http::Extensions;
use scrapekit_core::{EngineContext, MiddlewareRegistry, Producer, ScrapeError};
use scrapekit_ratelimit::RateLimitConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns the worker pool (through the manager), wires producers, and waits
/// for the system to drain.
pub struct Executor {
    manager: Arc<RequestManager>,
    producers: Vec<Arc<dyn Producer>>,
    check_interval: Duration,
    close_timeout: Duration,
    shutdown: CancellationToken,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Executor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduler: &SchedulerConfig,
        execution: &ExecutionConfig,
        rate_limit: RateLimitConfig,
        session: Arc<dyn Session>,
        registry: Arc<MiddlewareRegistry>,
        deps: Arc<Extensions>,
        producers: Vec<Arc<dyn Producer>>,
        shutdown: CancellationToken,
    ) -> Self {
        let manager = RequestManager::new(
            scheduler,
            rate_limit,
            session,
            registry,
            deps,
            execution.shutdown_check_interval,
        );
        Self {
            manager,
            producers,
            check_interval: execution.shutdown_check_interval,
            close_timeout: scheduler.close_timeout,
            shutdown,
            dispatch_handle: Mutex::new(None),
        }
    }

    /// The context producers and handlers receive.
    pub fn context(&self) -> EngineContext {
        self.manager.context()
    }

    /// The request manager driving this executor.
    pub fn manager(&self) -> &Arc<RequestManager> {
        &self.manager
    }

    /// Starts the dispatch loop, runs all producers concurrently, then
    /// waits until no work remains. A cancelled shutdown token abandons
    /// the drain wait; [`Executor::close`] still runs the orderly
    /// shutdown.
    pub async fn run(&self) -> Result<(), ScrapeError> {
        {
            let mut handle = self.dispatch_handle.lock().unwrap();
            if handle.is_none() {
                *handle = Some(tokio::spawn(Arc::clone(&self.manager).run()));
            }
        }

        let result = tokio::select! {
            result = self.run_producers() => result,
            _ = self.shutdown.cancelled() => {
                tracing::debug!("shutdown requested, abandoning producers");
                return Ok(());
            }
        };

        self.wait_drain().await;
        result
    }

    async fn run_producers(&self) -> Result<(), ScrapeError> {
        let context = self.manager.context();
        let futures = self
            .producers
            .iter()
            .map(|producer| producer.produce(context.clone()));
        let results = futures::future::join_all(futures).await;
        results
            .into_iter()
            .find(|result| result.is_err())
            .unwrap_or(Ok(()))
    }

    async fn wait_drain(&self) {
        loop {
            if !self.manager.active() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::debug!("shutdown requested, abandoning drain wait");
                    return;
                }
            }
        }
    }

    /// Orderly shutdown: stop the dispatch loop, close the rate-limit
    /// groups so nothing new reaches the pool, drain the pool bounded by
    /// `close_timeout`, then close the transport.
    pub async fn close(&self) {
        self.manager.request_stop();
        let handle = self.dispatch_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.manager.limiter().close().await;
        self.manager.shutdown_pool(self.close_timeout).await;
        self.manager.close_resources().await;
    }
}
