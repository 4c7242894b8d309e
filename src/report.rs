//! Run report accumulation and summary output.
//!
//! The aggregator is the only shared mutable state in a run: workers append
//! one record per test case behind a mutex, and `finalize` produces the
//! frozen `RunReport` snapshot with per-version category counts.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::classify::Outcome;
use crate::expectations::ExclusionList;

/// One recorded outcome.
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    pub spec_version: String,
    pub test_name: String,
    pub outcome: Outcome,
    /// Annotation carried over from the exclusion configuration, if any.
    pub reason: Option<String>,
    /// Failure detail: mismatch description, timeout, spawn error.
    pub message: Option<String>,
    pub elapsed_ms: u64,
}

/// Per-category tallies for one spec version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub pass: usize,
    pub expected_fail: usize,
    pub unexpected_fail: usize,
    pub unexpected_pass: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl CategoryCounts {
    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Pass => self.pass += 1,
            Outcome::ExpectedFail => self.expected_fail += 1,
            Outcome::UnexpectedFail => self.unexpected_fail += 1,
            Outcome::UnexpectedPass => self.unexpected_pass += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pass
            + self.expected_fail
            + self.unexpected_fail
            + self.unexpected_pass
            + self.skipped
            + self.cancelled
    }
}

/// A configured exclusion with no matching fixture, attributed to a version.
#[derive(Debug, Clone)]
pub struct StaleWarning {
    pub spec_version: String,
    pub name: String,
    pub list: ExclusionList,
}

/// Thread-safe, append-only accumulator fed by concurrent workers.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    records: Mutex<Vec<OutcomeRecord>>,
    warnings: Mutex<Vec<StaleWarning>>,
    discovery_errors: Mutex<Vec<(String, String)>>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome. One atomic append per test case.
    pub fn record(&self, record: OutcomeRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    pub fn add_stale_warning(&self, warning: StaleWarning) {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(warning);
    }

    /// Record a spec version whose discovery failed. The rest of the run
    /// continues; the failure is surfaced in the report.
    pub fn add_discovery_error(&self, spec_version: String, message: String) {
        self.discovery_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((spec_version, message));
    }

    /// Freeze the accumulated state into an immutable report. Records are
    /// sorted by (spec version, test name) so repeated runs diff cleanly.
    pub fn finalize(&self, started_at: DateTime<Utc>) -> RunReport {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        records.sort_by(|a, b| {
            (a.spec_version.as_str(), a.test_name.as_str())
                .cmp(&(b.spec_version.as_str(), b.test_name.as_str()))
        });

        let mut counts: BTreeMap<String, CategoryCounts> = BTreeMap::new();
        for record in &records {
            counts
                .entry(record.spec_version.clone())
                .or_default()
                .add(record.outcome);
        }

        RunReport {
            started_at,
            finished_at: Utc::now(),
            records,
            counts,
            warnings: self
                .warnings
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            discovery_errors: self
                .discovery_errors
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

/// Frozen snapshot of a completed (or cancelled) run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// All records, sorted by (spec version, test name).
    pub records: Vec<OutcomeRecord>,
    pub counts: BTreeMap<String, CategoryCounts>,
    pub warnings: Vec<StaleWarning>,
    pub discovery_errors: Vec<(String, String)>,
}

impl RunReport {
    /// Tallies across all spec versions.
    pub fn totals(&self) -> CategoryCounts {
        let mut totals = CategoryCounts::default();
        for record in &self.records {
            totals.add(record.outcome);
        }
        totals
    }

    /// The run is successful iff there are zero UNEXPECTED_FAIL and zero
    /// UNEXPECTED_PASS outcomes across all spec versions.
    pub fn success(&self) -> bool {
        !self
            .records
            .iter()
            .any(|r| r.outcome.counts_against_success())
    }

    /// Whether every dispatched case ran to a real outcome and every
    /// requested version was discoverable.
    pub fn complete(&self) -> bool {
        self.totals().cancelled == 0 && self.discovery_errors.is_empty()
    }

    fn records_with(&self, outcome: Outcome) -> impl Iterator<Item = &OutcomeRecord> {
        self.records.iter().filter(move |r| r.outcome == outcome)
    }

    /// Print the human-readable summary. Always emitted, including after
    /// partial cancellation.
    pub fn print_summary(&self) {
        println!("\n=== Conformance Summary ===");
        for (spec_version, counts) in &self.counts {
            println!("\n[{}]", spec_version);
            println!("  Total:           {}", counts.total());
            println!("  Passed:          {}", counts.pass);
            println!("  Expected fail:   {}", counts.expected_fail);
            println!("  Unexpected fail: {}", counts.unexpected_fail);
            println!("  Unexpected pass: {}", counts.unexpected_pass);
            println!("  Skipped:         {}", counts.skipped);
            if counts.cancelled > 0 {
                println!("  Cancelled:       {}", counts.cancelled);
            }
        }

        let unexpected_fails: Vec<&OutcomeRecord> =
            self.records_with(Outcome::UnexpectedFail).collect();
        if !unexpected_fails.is_empty() {
            println!("\nUnexpected failures:");
            for record in unexpected_fails {
                println!(
                    "  - [{}] {}: {}",
                    record.spec_version,
                    record.test_name,
                    record.message.as_deref().unwrap_or("no details")
                );
            }
        }

        let unexpected_passes: Vec<&OutcomeRecord> =
            self.records_with(Outcome::UnexpectedPass).collect();
        if !unexpected_passes.is_empty() {
            println!("\nUnexpected passes (stale xfail entries?):");
            for record in unexpected_passes {
                match &record.reason {
                    Some(reason) => println!(
                        "  - [{}] {} (xfail reason: {})",
                        record.spec_version, record.test_name, reason
                    ),
                    None => println!("  - [{}] {}", record.spec_version, record.test_name),
                }
            }
        }

        if !self.warnings.is_empty() {
            println!("\nStale exclusions (no matching fixture):");
            for warning in &self.warnings {
                println!(
                    "  - [{}] {} (listed under {})",
                    warning.spec_version, warning.name, warning.list
                );
            }
        }

        if !self.discovery_errors.is_empty() {
            println!("\nDiscovery errors:");
            for (spec_version, message) in &self.discovery_errors {
                println!("  - [{}] {}", spec_version, message);
            }
        }

        println!(
            "\nOverall: {}",
            if self.success() { "SUCCESS" } else { "FAILURE" }
        );
    }
}
