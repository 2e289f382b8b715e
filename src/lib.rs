//! # shim-perf
//!
//! Performance-optimization subsystem for a browser-compatibility layer:
//! bounded object pools, size/time-triggered batching with a reflow-minimizing DOM
//! batcher, and a threshold-based bottleneck analyzer.
//!
//! Everything hangs off an explicitly owned [`OptimizationContext`]; timers go through an
//! injectable [`scheduler::Scheduler`] and DOM access through a [`dom::DomHost`].

pub mod analyzer;
pub mod batch;
pub mod config;
pub mod context;
pub mod dom;
pub mod error;
pub mod logging;
pub mod pool;
pub mod scheduler;

pub use analyzer::{BottleneckAnalyzer, PerformanceReport, PerformanceSample};
pub use batch::{BatchItem, BatchProcessor, DataBatcher, DomBatcher, Priority};
pub use config::OptimizerConfig;
pub use context::{ContextState, OptimizationContext};
pub use error::{Error, Result};
pub use pool::{ObjectPool, PoolFactory, PoolManager};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
