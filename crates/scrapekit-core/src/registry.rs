//! Priority-ordered middleware buckets.

use crate::handler::{ExceptionMiddleware, RequestMiddleware, ResponseMiddleware};
use std::fmt;
use std::sync::Arc;

/// The default registration priority for middlewares that do not care
/// about ordering.
pub const DEFAULT_MIDDLEWARE_PRIORITY: i32 = 100;

/// The four stages a middleware can be registered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Around the dispatch loop, before rate limiting. Best-effort:
    /// failures are logged and control-flow values are ignored.
    Outer,
    /// Inside the worker, before the transport call.
    Inner,
    /// After the transport call, before the callback.
    Response,
    /// On the error path, before the errback.
    Exception,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Outer => f.write_str("outer"),
            Stage::Inner => f.write_str("inner"),
            Stage::Response => f.write_str("response"),
            Stage::Exception => f.write_str("exception"),
        }
    }
}

struct Registered<T: ?Sized> {
    priority: i32,
    handler: Arc<T>,
}

fn insert<T: ?Sized>(bucket: &mut Vec<Registered<T>>, priority: i32, handler: Arc<T>) {
    bucket.push(Registered { priority, handler });
    // Stable sort: equal priorities keep registration order.
    bucket.sort_by_key(|r| r.priority);
}

/// Holds the middlewares the engine walks around each request.
///
/// Each bucket iterates in ascending priority; equal priorities preserve
/// registration order.
#[derive(Default)]
pub struct MiddlewareRegistry {
    outer: Vec<Registered<dyn RequestMiddleware>>,
    inner: Vec<Registered<dyn RequestMiddleware>>,
    response: Vec<Registered<dyn ResponseMiddleware>>,
    exception: Vec<Registered<dyn ExceptionMiddleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_outer(&mut self, priority: i32, middleware: Arc<dyn RequestMiddleware>) {
        insert(&mut self.outer, priority, middleware);
    }

    pub fn add_inner(&mut self, priority: i32, middleware: Arc<dyn RequestMiddleware>) {
        insert(&mut self.inner, priority, middleware);
    }

    pub fn add_response(&mut self, priority: i32, middleware: Arc<dyn ResponseMiddleware>) {
        insert(&mut self.response, priority, middleware);
    }

    pub fn add_exception(&mut self, priority: i32, middleware: Arc<dyn ExceptionMiddleware>) {
        insert(&mut self.exception, priority, middleware);
    }

    pub fn outer(&self) -> impl Iterator<Item = &Arc<dyn RequestMiddleware>> {
        self.outer.iter().map(|r| &r.handler)
    }

    pub fn inner(&self) -> impl Iterator<Item = &Arc<dyn RequestMiddleware>> {
        self.inner.iter().map(|r| &r.handler)
    }

    pub fn response(&self) -> impl Iterator<Item = &Arc<dyn ResponseMiddleware>> {
        self.response.iter().map(|r| &r.handler)
    }

    pub fn exception(&self) -> impl Iterator<Item = &Arc<dyn ExceptionMiddleware>> {
        self.exception.iter().map(|r| &r.handler)
    }
}
