//! Level-synchronized, concurrency-bounded execution of a validated
//! [`kite_graph::Graph`].
//!
//! The scheduler owns no state across runs: given a graph, a [`Ride`], and a
//! [`ContextAssembly`] of collaborators (artifact store, secret registry,
//! process runner), [`Scheduler::run`] walks the graph level by level,
//! bounding concurrency with a semaphore and cascading skips from failed
//! predecessors, and returns a [`RunResult`].
//!
//! [`Ride`]: kite_model::Ride
//! [`RunResult`]: kite_model::RunResult

mod config;
mod context_assembly;
mod hooks;
mod obs;
mod process;
mod scheduler;
mod sink;

pub use config::SchedulerConfig;
pub use context_assembly::ContextAssembly;
pub use process::TokioProcessRunner;
pub use scheduler::Scheduler;
pub use sink::FileLogSink;
