//! patho_engine_supervisor
//!
//! Outside-world facing orchestration layer for `patho_engine_core`.
//!
//! Responsibilities:
//! - hold one validated engine and analyzer set per domain
//! - invoke analyzers concurrently under a per-case time budget
//! - convert timeouts and panics into failed analyzer results
//! - hold back an analyzer whose previous thread outlived its budget
//! - invoke the core evaluation and package a report
//!
//! Non-goals:
//! - no IO
//! - no async
//! - no retries (an analyzer that wants them retries internally)
//! - no scoring policy (lives in core)

pub mod adapter;
pub mod supervisor;

pub use adapter::{
    into_result,
    Analyzer,
    AnalyzerFailure,
    AnalyzerOutcome,
    CaseInput,
    FixedAnalyzer,
    FnAnalyzer,
    Measurement,
};

pub use supervisor::{
    invoke_analyzers,
    AnalysisSupervisor,
    AnalyzerStatus,
    CaseReport,
    SupervisedAnalyzer,
    SupervisorError,
    DEFAULT_BUDGET,
};
