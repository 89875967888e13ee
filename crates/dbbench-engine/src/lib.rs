//! Benchmark execution engine.
//!
//! Turns a [`Workload`] into concurrent traffic against a
//! [`Driver`](dbbench_core::Driver), classifies outcomes, decides when to
//! stop and aggregates the results into a [`RunResult`](dbbench_core::RunResult).

pub mod aggregator;
pub mod latency;
pub mod outcome;
pub mod pool;
pub mod runner;
pub mod stop;
pub mod workload;

pub use aggregator::{ResultAggregator, WorkerTally};
pub use latency::LatencyRecorder;
pub use outcome::{classify, AttemptStatus, RetryPolicy, WorkerOutcome};
pub use pool::{PoolConfig, PoolReport, WorkerContext, WorkerPool};
pub use runner::{RunConfig, Runner};
pub use stop::StopSignal;
pub use workload::Workload;
