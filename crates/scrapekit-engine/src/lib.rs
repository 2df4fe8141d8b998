//! The scrapekit request orchestration engine.
//!
//! [`RequestManager`] owns the two-queue scheduler: a ready priority queue
//! and a delayed heap, drained by a single cooperative dispatch loop that
//! walks outer middlewares and hands envelopes to the rate limiter. Worker
//! futures run the per-request stages (inner middlewares, transport,
//! response middlewares, callback or error path) under a bounded
//! [`WorkerPool`].
//!
//! [`Executor`] wires producers to the manager, waits for the system to
//! drain, and closes everything down in order.
//!
//! The transport is abstracted behind [`Session`]; [`ReqwestSession`] is
//! the bundled implementation.

mod config;
mod executor;
mod manager;
mod pool;
mod queue;
mod session;

pub use config::{
    ExecutionConfig, ExecutionConfigBuilder, SchedulerConfig, SchedulerConfigBuilder,
};
pub use executor::Executor;
pub use manager::RequestManager;
pub use pool::WorkerPool;
pub use session::{
    build_session, HttpBackend, ProxyConfig, ReqwestSession, Session, SessionConfig,
    SessionConfigBuilder, SslMode,
};
