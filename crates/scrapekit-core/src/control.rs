//! Middleware control-flow values.
//!
//! Stopping a chain is a routine decision, not a failure, so middlewares
//! signal it through their return value. Real failures use
//! [`crate::ScrapeError`].

/// What a request/response/exception middleware wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the next middleware in this stage.
    Continue,
    /// Skip the remaining middlewares in this stage and move on.
    StopChain,
    /// Abort all further processing of this request: no transport call,
    /// no callback, no errback.
    StopRequest,
}

/// What an item middleware wants to happen next.
///
/// The item is threaded through so middlewares can transform it.
#[derive(Debug)]
pub enum ItemFlow<I> {
    /// Pass the (possibly transformed) item to the next middleware.
    Continue(I),
    /// Skip the remaining middlewares in this chain, keep processing.
    StopChain(I),
    /// Return the item immediately, skipping pipelines and later stages.
    StopItem(I),
}

impl<I> ItemFlow<I> {
    /// Extracts the item regardless of the decision.
    pub fn into_item(self) -> I {
        match self {
            ItemFlow::Continue(item) | ItemFlow::StopChain(item) | ItemFlow::StopItem(item) => item,
        }
    }
}
