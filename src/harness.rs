//! Run orchestration: scheduling, worker pool, cancellation.
//!
//! One spawned worker per dispatched test case, bounded by a semaphore.
//! Skipped cases never reach the engine. A run-level watch channel stops
//! dispatch and interrupts in-flight engine invocations; every discovered
//! case still ends up in the report, cancelled cases included.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

use crate::classify::{classify, failure_detail, Outcome};
use crate::config::HarnessConfig;
use crate::discovery::{TestCase, TestCaseDiscovery};
use crate::engine::{cancel_signalled, EngineAdapter};
use crate::error::HarnessError;
use crate::expectations::{Disposition, ExpectationStore};
use crate::report::{OutcomeRecord, ReportAggregator, RunReport, StaleWarning};

/// Drives a full conformance run. The store and discovery are constructed
/// once per run and injected here; nothing is held in global state.
pub struct ConformanceHarness {
    config: HarnessConfig,
    store: ExpectationStore,
    discovery: TestCaseDiscovery,
    engine: Arc<dyn EngineAdapter>,
}

impl ConformanceHarness {
    pub fn new(
        config: HarnessConfig,
        store: ExpectationStore,
        discovery: TestCaseDiscovery,
        engine: Arc<dyn EngineAdapter>,
    ) -> Self {
        Self {
            config,
            store,
            discovery,
            engine,
        }
    }

    /// Expand the requested spec versions. An empty request or the literal
    /// `all` selects every version present under the fixtures root.
    pub fn resolve_versions(&self, requested: &[String]) -> Result<Vec<String>, HarnessError> {
        if requested.is_empty() || requested.iter().any(|v| v == "all") {
            self.discovery.spec_versions()
        } else {
            Ok(requested.to_vec())
        }
    }

    /// Execute all test cases for the given spec versions and return the
    /// frozen report. Per-case failures never abort the run; discovery
    /// failures are fatal only for their own version.
    pub async fn run(&self, spec_versions: &[String], cancel: watch::Receiver<bool>) -> RunReport {
        let started_at = Utc::now();
        let aggregator = Arc::new(ReportAggregator::new());
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::new();
        let mut dispatch_cancel = cancel.clone();

        for spec_version in spec_versions {
            let cases = match self.discovery.discover(spec_version) {
                Ok(cases) => cases,
                Err(err) => {
                    eprintln!("warning: {}", err);
                    aggregator.add_discovery_error(spec_version.clone(), err.to_string());
                    continue;
                }
            };

            self.warn_stale_entries(spec_version, &cases, &aggregator);

            let cases: Vec<TestCase> = match &self.config.pattern {
                Some(pattern) => cases
                    .into_iter()
                    .filter(|c| pattern.is_match(&c.name))
                    .collect(),
                None => cases,
            };

            if self.config.debug {
                eprintln!(
                    "[harness] {}: dispatching {} test case(s)",
                    spec_version,
                    cases.len()
                );
            }

            for case in cases {
                let disposition = self.store.lookup(spec_version, &case.name);

                // Skip short-circuit: the engine is never invoked.
                if let Disposition::Skip(reason) = &disposition {
                    aggregator.record(OutcomeRecord {
                        spec_version: case.spec_version,
                        test_name: case.name,
                        outcome: Outcome::Skipped,
                        reason: reason.clone(),
                        message: None,
                        elapsed_ms: 0,
                    });
                    continue;
                }

                if *dispatch_cancel.borrow() {
                    Self::record_cancelled(&aggregator, &case, &disposition);
                    continue;
                }

                // Waiting for a permit is itself interruptible so dispatch
                // stops promptly once cancellation is signalled.
                let permit = tokio::select! {
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            Self::record_cancelled(&aggregator, &case, &disposition);
                            continue;
                        }
                    },
                    _ = cancel_signalled(&mut dispatch_cancel) => {
                        Self::record_cancelled(&aggregator, &case, &disposition);
                        continue;
                    }
                };

                let engine = Arc::clone(&self.engine);
                let aggregator = Arc::clone(&aggregator);
                let cancel = cancel.clone();
                let timeout = self.config.timeout;
                let debug = self.config.debug;

                handles.push(tokio::spawn(async move {
                    let result = engine.execute(&case, timeout, cancel).await;
                    let outcome = classify(&case, &result, &disposition);
                    let message = match outcome {
                        Outcome::Pass | Outcome::Skipped => None,
                        Outcome::Cancelled => result.message.clone(),
                        _ => failure_detail(&case, &result),
                    };

                    if debug {
                        eprintln!(
                            "[harness] {} {} -> {} ({}ms)",
                            case.spec_version,
                            case.name,
                            outcome,
                            result.elapsed.as_millis()
                        );
                    }

                    aggregator.record(OutcomeRecord {
                        spec_version: case.spec_version,
                        test_name: case.name,
                        outcome,
                        reason: disposition.reason().map(str::to_string),
                        message,
                        elapsed_ms: result.elapsed.as_millis() as u64,
                    });
                    drop(permit);
                }));
            }
        }

        for joined in join_all(handles).await {
            if let Err(err) = joined {
                eprintln!("warning: worker task failed: {}", err);
            }
        }

        aggregator.finalize(started_at)
    }

    fn warn_stale_entries(
        &self,
        spec_version: &str,
        cases: &[TestCase],
        aggregator: &ReportAggregator,
    ) {
        let Some(set) = self.store.version(spec_version) else {
            return;
        };
        let discovered: HashSet<&str> = cases.iter().map(|c| c.name.as_str()).collect();
        for stale in set.stale_entries(&discovered) {
            eprintln!(
                "warning: [{}] stale {} entry '{}' has no matching fixture",
                spec_version, stale.list, stale.name
            );
            aggregator.add_stale_warning(StaleWarning {
                spec_version: spec_version.to_string(),
                name: stale.name,
                list: stale.list,
            });
        }
    }

    fn record_cancelled(
        aggregator: &ReportAggregator,
        case: &TestCase,
        disposition: &Disposition,
    ) {
        aggregator.record(OutcomeRecord {
            spec_version: case.spec_version.clone(),
            test_name: case.name.clone(),
            outcome: Outcome::Cancelled,
            reason: disposition.reason().map(str::to_string),
            message: Some("run cancelled before dispatch".to_string()),
            elapsed_ms: 0,
        });
    }
}
