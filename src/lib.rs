//! # wdl-conformance
//!
//! Conformance test harness for Workflow Description Language (WDL) engines.
//!
//! This crate discovers versioned test fixtures, runs an external WDL engine
//! against each one in a bounded worker pool, classifies the outcomes against
//! an xfail/skip exclusion configuration, and produces a stable, diffable
//! report.

pub mod classify;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod expectations;
pub mod harness;
pub mod report;

pub use classify::{classify, Outcome};
pub use config::HarnessConfig;
pub use discovery::{ExpectedResult, TestCase, TestCaseDiscovery};
pub use engine::{EngineAdapter, ExecutionResult, ExecutionStatus, SubprocessEngine};
pub use error::HarnessError;
pub use expectations::{Disposition, ExpectationSet, ExpectationStore};
pub use harness::ConformanceHarness;
pub use report::{CategoryCounts, OutcomeRecord, ReportAggregator, RunReport};
