//! The shared context handed to every handler.

use crate::handler::SendRequest;
use crate::{Request, ScrapeError};
use http::Extensions;
use std::sync::Arc;

/// Everything a producer, middleware, or callback may need from the
/// engine: the request sender and the shared dependency map.
///
/// Handlers read only what they need. User dependencies are registered by
/// type; the pipeline dispatcher handle is injected the same way by the
/// facade.
#[derive(Clone)]
pub struct EngineContext {
    sender: Arc<dyn SendRequest>,
    deps: Arc<Extensions>,
}

impl EngineContext {
    pub fn new(sender: Arc<dyn SendRequest>, deps: Arc<Extensions>) -> Self {
        Self { sender, deps }
    }

    /// The engine's request sender.
    pub fn sender(&self) -> &Arc<dyn SendRequest> {
        &self.sender
    }

    /// Enqueues a request. Shorthand for `sender().send(request)`.
    pub async fn send(&self, request: Request) -> Result<(), ScrapeError> {
        self.sender.send(request).await
    }

    /// Looks up a shared dependency by type.
    pub fn dep<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.deps.get::<T>()
    }
}
