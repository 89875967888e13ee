//! Core types and traits for the dbbench database load benchmark.

pub mod config;
pub mod driver;
pub mod error;
pub mod result;
pub mod row;
pub mod statement;
pub mod telemetry;

pub use config::{
    BenchConfig, BenchmarkSettings, DatabasesConfig, EngineConfig, LatencyConfig, RetryConfig,
};
pub use driver::{tx_fn, BackendKind, Driver, ExecResult, Transaction, TxFn};
pub use error::{CoreError, CoreResult};
pub use result::{RunResult, StopCause};
pub use row::{FromValue, Row, Value};
pub use statement::{DocumentCommand, Filter, Predicate, SqlStatement, Statement, Update, UpdateOp};
