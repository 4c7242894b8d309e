//! wdl-conformance CLI
//!
//! Command-line driver: runs a WDL engine against the conformance fixtures
//! and reports per-version pass/xfail/skip outcomes.
//!
//! Exit codes: 0 = overall success, 1 = test failures present or the run
//! was incomplete, 2 = harness/configuration error.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use wdl_conformance::config::{self, HarnessConfig};
use wdl_conformance::{
    ConformanceHarness, Disposition, ExpectationStore, HarnessError, RunReport, SubprocessEngine,
    TestCaseDiscovery,
};

/// CLI arguments structure
struct Args {
    /// xfail/skip exclusion configuration (YAML)
    config_path: PathBuf,
    /// Root directory of versioned test fixtures
    fixtures_dir: PathBuf,
    /// WDL engine executable under test
    engine_path: Option<PathBuf>,
    /// Extra arguments appended to every engine invocation
    engine_args: Vec<String>,
    /// Spec versions to run ("all" or empty = every version present)
    spec_versions: Vec<String>,
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
    pattern: Option<String>,
    /// List discovered tests instead of running them
    list: bool,
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    let code = match run(args).await {
        Ok(Some(report)) => {
            if !report.discovery_errors.is_empty() {
                2
            } else if report.success() && report.complete() {
                0
            } else {
                1
            }
        }
        Ok(None) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    };
    process::exit(code);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = None;
    let mut fixtures_dir = None;
    let mut engine_path = None;
    let mut engine_args = Vec::new();
    let mut spec_versions = Vec::new();
    let mut concurrency = None;
    let mut timeout_secs = None;
    let mut pattern = None;
    let mut list = false;
    let mut debug = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help(&args[0]);
                process::exit(0);
            }
            "--config" => {
                i += 1;
                if i < args.len() {
                    config_path = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: --config requires a file path");
                    process::exit(2);
                }
            }
            "--fixtures" => {
                i += 1;
                if i < args.len() {
                    fixtures_dir = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: --fixtures requires a directory path");
                    process::exit(2);
                }
            }
            "--engine" => {
                i += 1;
                if i < args.len() {
                    engine_path = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: --engine requires an executable path");
                    process::exit(2);
                }
            }
            "--engine-arg" => {
                i += 1;
                if i < args.len() {
                    engine_args.push(args[i].clone());
                } else {
                    eprintln!("Error: --engine-arg requires a value");
                    process::exit(2);
                }
            }
            "--spec-version" => {
                i += 1;
                if i < args.len() {
                    spec_versions.push(args[i].clone());
                } else {
                    eprintln!("Error: --spec-version requires a value");
                    process::exit(2);
                }
            }
            "--concurrency" => {
                i += 1;
                if i < args.len() {
                    match args[i].parse::<usize>() {
                        Ok(n) => concurrency = Some(n),
                        Err(e) => {
                            eprintln!("Error: invalid concurrency '{}': {}", args[i], e);
                            process::exit(2);
                        }
                    }
                } else {
                    eprintln!("Error: --concurrency requires a number");
                    process::exit(2);
                }
            }
            "--timeout" => {
                i += 1;
                if i < args.len() {
                    match args[i].parse::<u64>() {
                        Ok(secs) => timeout_secs = Some(secs),
                        Err(e) => {
                            eprintln!("Error: invalid timeout '{}': {}", args[i], e);
                            process::exit(2);
                        }
                    }
                } else {
                    eprintln!("Error: --timeout requires seconds");
                    process::exit(2);
                }
            }
            "--pattern" => {
                i += 1;
                if i < args.len() {
                    pattern = Some(args[i].clone());
                } else {
                    eprintln!("Error: --pattern requires a regular expression");
                    process::exit(2);
                }
            }
            "--list" => list = true,
            "--debug" => debug = true,
            other => {
                eprintln!("Error: Unknown option: {}", other);
                process::exit(2);
            }
        }
        i += 1;
    }

    let config_path = config_path.unwrap_or_else(|| {
        eprintln!("Error: --config is required");
        process::exit(2);
    });
    let fixtures_dir = fixtures_dir.unwrap_or_else(|| {
        eprintln!("Error: --fixtures is required");
        process::exit(2);
    });

    Args {
        config_path,
        fixtures_dir,
        engine_path,
        engine_args,
        spec_versions,
        concurrency,
        timeout_secs,
        pattern,
        list,
        debug,
    }
}

fn print_help(program: &str) {
    eprintln!("wdl-conformance - WDL engine conformance test harness");
    eprintln!();
    eprintln!("Usage: {} --config <path> --fixtures <dir> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>        xfail/skip exclusion configuration (YAML)");
    eprintln!("  --fixtures <dir>       Root directory of versioned test fixtures");
    eprintln!("  --engine <path>        WDL engine executable under test");
    eprintln!("  --engine-arg <arg>     Extra argument passed to every engine invocation (repeatable)");
    eprintln!("  --spec-version <v>     Spec version to run (repeatable; 'all' = every version)");
    eprintln!("  --concurrency <n>      Maximum engine invocations in flight (default: 1)");
    eprintln!("  --timeout <secs>       Per-test-case timeout in seconds (default: 60)");
    eprintln!("  --pattern <regex>      Only run tests whose name matches");
    eprintln!("  --list                 List discovered tests without running them");
    eprintln!("  --debug                Enable per-case progress output");
    eprintln!("  -h, --help             Show this help message");
}

async fn run(args: Args) -> Result<Option<RunReport>, HarnessError> {
    // Layer defaults: built-ins, then ~/.wdl-conformance, then flags.
    let defaults = config::defaults_file_path()
        .and_then(|path| config::load_defaults(&path))
        .unwrap_or_default();

    let mut harness_config = HarnessConfig::default()
        .with_concurrency(args.concurrency.or(defaults.concurrency).unwrap_or(1))
        .with_timeout(Duration::from_secs(
            args.timeout_secs.or(defaults.timeout_secs).unwrap_or(60),
        ))
        .with_debug(args.debug || defaults.debug.unwrap_or(false));

    if let Some(pattern) = &args.pattern {
        let pattern = regex::Regex::new(pattern)
            .map_err(|e| HarnessError::config(format!("invalid --pattern: {}", e)))?;
        harness_config = harness_config.with_pattern(pattern);
    }
    harness_config.validate()?;

    let store = ExpectationStore::load(&args.config_path)?;
    let discovery = TestCaseDiscovery::new(&args.fixtures_dir);

    if args.list {
        list_tests(&discovery, &store, &args.spec_versions)?;
        return Ok(None);
    }

    let engine_path = args
        .engine_path
        .or_else(|| defaults.engine.map(PathBuf::from))
        .ok_or_else(|| {
            HarnessError::config("engine executable required (--engine or ENGINE in ~/.wdl-conformance)")
        })?;
    let engine = SubprocessEngine::new(&engine_path)?.with_extra_args(args.engine_args);

    let harness = ConformanceHarness::new(harness_config, store, discovery, Arc::new(engine));
    let spec_versions = harness.resolve_versions(&args.spec_versions)?;
    if spec_versions.is_empty() {
        return Err(HarnessError::config(format!(
            "no spec versions found under {}",
            args.fixtures_dir.display()
        )));
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancellation requested; terminating in-flight tests...");
            let _ = cancel_tx.send(true);
        }
    });

    println!(
        "Running conformance tests for {} spec version(s)...",
        spec_versions.len()
    );
    let report = harness.run(&spec_versions, cancel_rx).await;
    report.print_summary();

    Ok(Some(report))
}

fn list_tests(
    discovery: &TestCaseDiscovery,
    store: &ExpectationStore,
    requested: &[String],
) -> Result<(), HarnessError> {
    let spec_versions = if requested.is_empty() || requested.iter().any(|v| v == "all") {
        discovery.spec_versions()?
    } else {
        requested.to_vec()
    };

    for spec_version in &spec_versions {
        let cases = discovery.discover(spec_version)?;
        println!("{} ({} tests):", spec_version, cases.len());
        for case in cases {
            match store.lookup(spec_version, &case.name) {
                Disposition::Normal => println!("  {}", case.name),
                Disposition::Xfail(Some(reason)) => {
                    println!("  {} [xfail: {}]", case.name, reason)
                }
                Disposition::Xfail(None) => println!("  {} [xfail]", case.name),
                Disposition::Skip(Some(reason)) => {
                    println!("  {} [skip: {}]", case.name, reason)
                }
                Disposition::Skip(None) => println!("  {} [skip]", case.name),
            }
        }
    }
    Ok(())
}
