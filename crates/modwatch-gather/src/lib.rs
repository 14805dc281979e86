//! Concurrent gathering engine.
//!
//! A [`GatherSupervisor`] runs one [`GatherWorker`] per community. Workers
//! share a [`ProgressAggregator`], a [`RunLog`], a [`BatchSink`] and a
//! [`ShutdownSignal`]; nothing else crosses worker boundaries.

mod adapters;
pub mod cooldown;
pub mod error;
pub mod pacing;
pub mod progress;
pub mod query;
pub mod run_log;
pub mod settings;
pub mod shutdown;
pub mod sink;
pub mod supervisor;
pub mod traits;
pub mod worker;

pub use error::GatherError;
pub use pacing::{ActiveGuard, ActiveWorkers, Pacer};
pub use progress::{ProgressAggregator, ProgressSnapshot};
pub use query::QueryBuilder;
pub use run_log::{Level, LogRecord, RunLog};
pub use settings::GatherSettings;
pub use shutdown::ShutdownSignal;
pub use sink::{MemorySink, Push, TableSink};
pub use supervisor::{GatherRun, GatherSummary, GatherSupervisor};
pub use traits::{BatchSink, Scorer, SearchSource};
pub use worker::{WorkerOutcome, WorkerReport};
