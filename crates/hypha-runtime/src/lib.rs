//! The local execution engine of the Hypha actor runtime.
//!
//! A [`Host`] owns a pool of [`Executor`]s, one per locally hosted process,
//! and mediates between them and the cluster transport:
//!
//! | Piece | Role |
//! |---|---|
//! | [`Executor`] | drives one process: ingest, dispatch, supervise, raise, terminate |
//! | [`ExecutorPool`] | canonical index of local processes + pending supervision waiters |
//! | [`Host`] | turns inbound packets into executor events and executor effects into outbound packets |
//! | [`Fsm`] / [`Deferred`] / [`Fifo`] | the primitives the above are built from |
//!
//! Scheduling is cooperative: each executor is a self-serialized tokio task
//! that handles one event at a time, and a host never runs user code on its
//! own call paths. The only cross-host suspension point is the supervision
//! round-trip, which parks the raising executor on a [`Deferred`] until its
//! parent's verdict returns.

pub mod config;
pub mod context;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod fifo;
pub mod fsm;
pub mod host;
pub mod pool;

pub use config::HostConfig;
pub use context::{ExecutorContext, Tick, TransportContext};
pub use deferred::{Deferred, DeferredDropped, DeferredState, Join};
pub use error::{ConfigError, ContextError, HostError, InvariantError, TransportError};
pub use executor::{allowed_executor_transitions, Executor, ExecutorState};
pub use fifo::Fifo;
pub use fsm::Fsm;
pub use host::Host;
pub use pool::ExecutorPool;
