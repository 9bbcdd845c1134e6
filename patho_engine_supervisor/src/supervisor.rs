//! Per-domain analysis supervisor.
//!
//! This crate is the outside-world facing orchestration layer around `patho_engine_core`:
//! - owns one validated `DiagnosticEngine` plus its analyzers per domain
//! - invokes a domain's analyzers concurrently under a time budget
//! - turns timeouts and panics into failed results instead of blocking
//! - runs the core evaluation and packages a disclosable report
//!
//! No IO. No async. Analyzers run on plain OS threads.

use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use patho_engine_core::{
    AnalyzerResult, ConfigError, DiagnosticEngine, EngineConfig, EngineError, Evaluation,
};

use crate::adapter::{into_result, Analyzer, AnalyzerOutcome, CaseInput};

/// Default wall-clock budget for one case's analyzers.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("unknown domain `{0}`")]
    UnknownDomain(String),

    #[error("domain `{0}` is already registered")]
    DuplicateDomain(String),

    #[error("domain `{domain}`: analyzers do not match the registry (missing: [{}], unexpected: [{}])",
        .missing.join(", "), .unexpected.join(", "))]
    AnalyzerMismatch {
        domain: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Disclosure line for one analyzer in a report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerStatus {
    pub analyzer: String,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Output of one supervised case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case_id: String,
    pub domain: String,
    pub evaluation: Evaluation,
    /// Registry order.
    pub analyzers: Vec<AnalyzerStatus>,
}

impl CaseReport {
    pub fn degraded(&self) -> bool {
        self.evaluation.composite.degraded
    }
}

struct DomainPipeline {
    engine: Arc<DiagnosticEngine>,
    analyzers: Vec<SupervisedAnalyzer>,
}

/// Runs cases for any number of independently configured domains.
pub struct AnalysisSupervisor {
    domains: HashMap<String, DomainPipeline>,
    budget: Duration,
}

impl Default for AnalysisSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl AnalysisSupervisor {
    /// `budget` bounds how long a case waits for its slowest analyzer.
    pub fn new(budget: Duration) -> Self {
        Self {
            domains: HashMap::new(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn set_budget(&mut self, budget: Duration) {
        self.budget = budget;
    }

    /// Register a domain. The analyzer names must be exactly the registry's.
    pub fn register_domain(
        &mut self,
        domain: impl Into<String>,
        engine: DiagnosticEngine,
        analyzers: Vec<Arc<dyn Analyzer>>,
    ) -> Result<(), SupervisorError> {
        let domain = domain.into();
        if self.domains.contains_key(&domain) {
            return Err(SupervisorError::DuplicateDomain(domain));
        }

        let mut seen = BTreeSet::new();
        let mut unexpected = Vec::new();
        for a in &analyzers {
            if !engine.registry().contains(a.name()) || !seen.insert(a.name().to_string()) {
                unexpected.push(a.name().to_string());
            }
        }
        let missing: Vec<String> = engine
            .registry()
            .names()
            .filter(|n| !seen.contains(*n))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(SupervisorError::AnalyzerMismatch {
                domain,
                missing,
                unexpected,
            });
        }

        // keep analyzers in registry order so reports line up with the trace
        let mut analyzers = analyzers;
        analyzers.sort_by_key(|a| engine.registry().position(a.name()));

        tracing::info!(domain = %domain, analyzers = analyzers.len(), "domain registered");
        self.domains.insert(
            domain,
            DomainPipeline {
                engine: Arc::new(engine),
                analyzers: analyzers.into_iter().map(SupervisedAnalyzer::new).collect(),
            },
        );
        Ok(())
    }

    /// Build the engine from configuration, then register it.
    pub fn register_domain_config(
        &mut self,
        domain: impl Into<String>,
        cfg: EngineConfig,
        analyzers: Vec<Arc<dyn Analyzer>>,
    ) -> Result<(), SupervisorError> {
        let engine = DiagnosticEngine::from_config(cfg)?;
        self.register_domain(domain, engine, analyzers)
    }

    pub fn remove_domain(&mut self, domain: &str) -> bool {
        self.domains.remove(domain).is_some()
    }

    /// Registered domain names, sorted.
    pub fn domains(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.domains.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    pub fn engine(&self, domain: &str) -> Option<&DiagnosticEngine> {
        self.domains.get(domain).map(|p| p.engine.as_ref())
    }

    /// Analyzers of `domain` with a thread still running past an earlier budget.
    pub fn stalled_analyzers(&self, domain: &str) -> Vec<&str> {
        self.domains
            .get(domain)
            .map(|p| {
                p.analyzers
                    .iter()
                    .filter(|a| a.detached_threads() > 0)
                    .map(SupervisedAnalyzer::name)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Run every analyzer of `domain` on `input` and evaluate.
    pub fn run_case(&self, domain: &str, input: CaseInput) -> Result<CaseReport, SupervisorError> {
        let pipeline = self
            .domains
            .get(domain)
            .ok_or_else(|| SupervisorError::UnknownDomain(domain.to_string()))?;

        let input = Arc::new(input);
        let results = invoke_analyzers(&pipeline.analyzers, &input, self.budget);
        let evaluation = pipeline.engine.evaluate(&results, &input.metadata)?;

        let analyzers = evaluation
            .composite
            .per_analyzer
            .iter()
            .map(|r| AnalyzerStatus {
                analyzer: r.analyzer_name.clone(),
                failed: r.failed,
                reason: r.failure_reason.clone(),
            })
            .collect();

        tracing::info!(
            case_id = %input.case_id,
            domain,
            composite = evaluation.composite.value,
            degraded = evaluation.composite.degraded,
            "case evaluated"
        );

        Ok(CaseReport {
            case_id: input.case_id.clone(),
            domain: domain.to_string(),
            evaluation,
            analyzers,
        })
    }

    /// Run many cases of one domain.
    ///
    /// Deterministic: outcomes are returned sorted by case id.
    pub fn run_batch(
        &self,
        domain: &str,
        inputs: Vec<CaseInput>,
    ) -> Vec<(String, Result<CaseReport, SupervisorError>)> {
        let mut out: Vec<(String, Result<CaseReport, SupervisorError>)> = inputs
            .into_iter()
            .map(|input| {
                let case_id = input.case_id.clone();
                (case_id, self.run_case(domain, input))
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Lifecycle of one analyzer thread, shared with the waiting side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ticket {
    Running,
    Finished,
    Abandoned,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An analyzer plus the count of its threads still alive past a budget.
///
/// While that count is non-zero the analyzer is not invoked again; it is
/// reported as failed instead, so a hung extractor holds at most one thread.
#[derive(Clone)]
pub struct SupervisedAnalyzer {
    analyzer: Arc<dyn Analyzer>,
    detached: Arc<AtomicUsize>,
}

impl SupervisedAnalyzer {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            analyzer,
            detached: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        self.analyzer.name()
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    /// Threads of this analyzer that missed their budget and are still running.
    pub fn detached_threads(&self) -> usize {
        self.detached.load(Ordering::Acquire)
    }
}

fn budget_ms(budget: Duration) -> u64 {
    u64::try_from(budget.as_millis()).unwrap_or(u64::MAX)
}

/// Invoke analyzers concurrently and wait at most `budget`.
///
/// Always returns one result per analyzer, in the order given. Analyzers
/// still running at the deadline are reported as failed and left detached;
/// they are skipped on later calls until that thread returns. A budget too
/// large to form a deadline waits for every analyzer.
pub fn invoke_analyzers(
    analyzers: &[SupervisedAnalyzer],
    input: &Arc<CaseInput>,
    budget: Duration,
) -> Vec<AnalyzerResult> {
    let mut slots: Vec<Option<AnalyzerResult>> = vec![None; analyzers.len()];
    let mut tickets: Vec<Option<Arc<Mutex<Ticket>>>> = vec![None; analyzers.len()];
    let (tx, rx) = mpsc::channel::<(usize, thread::Result<AnalyzerOutcome>)>();

    let mut pending = 0usize;
    for (idx, supervised) in analyzers.iter().enumerate() {
        let name = supervised.name();
        let stuck = supervised.detached_threads();
        if stuck > 0 {
            tracing::warn!(analyzer = name, detached = stuck, "previous invocation still running, skipped");
            slots[idx] = Some(AnalyzerResult::failed(
                name,
                "previous invocation is still running past its budget",
            ));
            continue;
        }

        let ticket = Arc::new(Mutex::new(Ticket::Running));
        let tx = tx.clone();
        let analyzer = Arc::clone(&supervised.analyzer);
        let detached = Arc::clone(&supervised.detached);
        let thread_ticket = Arc::clone(&ticket);
        let input = Arc::clone(input);
        let spawned = thread::Builder::new()
            .name(format!("analyzer-{name}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&input)));
                {
                    let mut t = lock(&*thread_ticket);
                    if *t == Ticket::Abandoned {
                        detached.fetch_sub(1, Ordering::AcqRel);
                    }
                    *t = Ticket::Finished;
                }
                // receiver gone means the budget already expired
                let _ = tx.send((idx, outcome));
            });
        match spawned {
            Ok(_) => {
                pending += 1;
                tickets[idx] = Some(ticket);
            }
            Err(e) => {
                tracing::warn!(analyzer = name, error = %e, "failed to spawn analyzer");
                slots[idx] = Some(AnalyzerResult::failed(name, format!("could not start analyzer: {e}")));
            }
        }
    }
    drop(tx);

    let deadline = Instant::now().checked_add(budget);
    while pending > 0 {
        let received = match deadline {
            Some(deadline) => rx
                .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .ok(),
            None => rx.recv().ok(),
        };
        let Some((idx, outcome)) = received else { break };
        pending -= 1;
        let name = analyzers[idx].name();
        slots[idx] = Some(match outcome {
            Ok(outcome) => into_result(name, outcome),
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                tracing::warn!(analyzer = name, panic = %msg, "analyzer panicked");
                AnalyzerResult::failed(name, format!("analyzer panicked: {msg}"))
            }
        });
    }

    let ms = budget_ms(budget);
    slots
        .into_iter()
        .zip(tickets)
        .zip(analyzers)
        .map(|((slot, ticket), supervised)| {
            if let Some(result) = slot {
                return result;
            }
            if let Some(ticket) = ticket {
                let mut t = lock(&*ticket);
                if *t == Ticket::Running {
                    *t = Ticket::Abandoned;
                    supervised.detached.fetch_add(1, Ordering::AcqRel);
                }
            }
            tracing::warn!(analyzer = supervised.name(), budget_ms = ms, "analyzer timed out");
            AnalyzerResult::failed(supervised.name(), format!("no result within {ms} ms budget"))
        })
        .collect()
}
