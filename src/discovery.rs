//! Fixture discovery per spec version.
//!
//! Fixtures live under `<root>/<spec-version>/`: each test is a `.wdl`
//! source file with a required `<name>.expected.json` sidecar and an
//! optional `<name>.inputs.json`. Discovery re-reads the filesystem on
//! every invocation so fixture edits between runs are always picked up.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::HarnessError;

/// Expected result declared by a fixture sidecar.
///
/// All fields are optional; an empty sidecar (`{}`) means the engine is
/// only required to exit with status 0.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExpectedResult {
    /// Output values the engine must produce, compared key-wise.
    #[serde(default)]
    pub outputs: Option<serde_json::Value>,
    /// Expected process exit code (default 0).
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Absolute tolerance for floating-point comparisons.
    #[serde(default)]
    pub float_tolerance: Option<f64>,
}

/// One discovered conformance test, identified by (spec version, name).
/// Immutable once discovered.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub spec_version: String,
    /// Test identifier: the WDL source file name, e.g. `serde_pair.wdl`.
    /// This is what exclusion configuration entries must match.
    pub name: String,
    pub wdl_path: PathBuf,
    /// Inputs payload passed to the engine, if the fixture declares one.
    pub inputs_path: Option<PathBuf>,
    pub expected: ExpectedResult,
}

/// Enumerates test fixtures under a root directory.
pub struct TestCaseDiscovery {
    fixtures_root: PathBuf,
}

impl TestCaseDiscovery {
    pub fn new<P: AsRef<Path>>(fixtures_root: P) -> Self {
        Self {
            fixtures_root: fixtures_root.as_ref().to_path_buf(),
        }
    }

    /// Spec versions available under the fixtures root, sorted.
    pub fn spec_versions(&self) -> Result<Vec<String>, HarnessError> {
        let entries = fs::read_dir(&self.fixtures_root).map_err(|e| {
            HarnessError::filesystem(
                "failed to list fixtures root",
                Some(self.fixtures_root.clone()),
                e,
            )
        })?;

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                HarnessError::filesystem(
                    "failed to list fixtures root",
                    Some(self.fixtures_root.clone()),
                    e,
                )
            })?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    versions.push(name.to_string());
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Enumerate the test cases for one spec version, ordered
    /// lexicographically by test name so repeated runs are diffable.
    pub fn discover(&self, spec_version: &str) -> Result<Vec<TestCase>, HarnessError> {
        let version_dir = self.fixtures_root.join(spec_version);
        if !version_dir.is_dir() {
            return Err(HarnessError::discovery(
                spec_version,
                format!("no fixture directory at {}", version_dir.display()),
            ));
        }

        // Name -> source path, sorted by construction.
        let mut wdl_files: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut sidecars: Vec<PathBuf> = Vec::new();

        for entry in WalkDir::new(&version_dir) {
            let entry = entry.map_err(|e| {
                HarnessError::discovery(spec_version, format!("failed to walk fixtures: {}", e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if path.extension().is_some_and(|ext| ext == "wdl") {
                if let Some(previous) =
                    wdl_files.insert(file_name.to_string(), path.to_path_buf())
                {
                    return Err(HarnessError::discovery(
                        spec_version,
                        format!(
                            "duplicate test name '{}' ({} and {})",
                            file_name,
                            previous.display(),
                            path.display()
                        ),
                    ));
                }
            } else if file_name.ends_with(".expected.json") {
                sidecars.push(path.to_path_buf());
            }
        }

        // Orphan sidecar: expected-result data with no WDL source.
        for sidecar in &sidecars {
            let wdl_sibling = sidecar.with_extension("").with_extension("wdl");
            if !wdl_sibling.is_file() {
                return Err(HarnessError::discovery(
                    spec_version,
                    format!(
                        "expected-result sidecar {} has no matching .wdl source",
                        sidecar.display()
                    ),
                ));
            }
        }

        let mut cases = Vec::with_capacity(wdl_files.len());
        for (name, wdl_path) in wdl_files {
            let expected_path = wdl_path.with_extension("expected.json");
            if !expected_path.is_file() {
                return Err(HarnessError::discovery(
                    spec_version,
                    format!(
                        "test '{}' has no expected-result sidecar ({})",
                        name,
                        expected_path.display()
                    ),
                ));
            }

            let expected = Self::load_expected(spec_version, &name, &expected_path)?;

            let inputs_path = wdl_path.with_extension("inputs.json");
            let inputs_path = inputs_path.is_file().then_some(inputs_path);

            cases.push(TestCase {
                spec_version: spec_version.to_string(),
                name,
                wdl_path,
                inputs_path,
                expected,
            });
        }

        Ok(cases)
    }

    fn load_expected(
        spec_version: &str,
        name: &str,
        path: &Path,
    ) -> Result<ExpectedResult, HarnessError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            HarnessError::discovery(
                spec_version,
                format!("failed to read sidecar for '{}': {}", name, e),
            )
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            HarnessError::discovery(
                spec_version,
                format!("malformed expected-result sidecar for '{}': {}", name, e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_fixture(dir: &Path, name: &str, expected: &str) {
        fs::write(dir.join(format!("{}.wdl", name)), "version 1.1\n").unwrap();
        fs::write(dir.join(format!("{}.expected.json", name)), expected).unwrap();
    }

    fn fixture_root() -> (TempDir, PathBuf) {
        let root = TempDir::new().unwrap();
        let version_dir = root.path().join("wdl-1.1");
        fs::create_dir_all(&version_dir).unwrap();
        (root, version_dir)
    }

    #[test]
    fn test_discover_sorted_by_name() {
        let (root, version_dir) = fixture_root();
        write_fixture(&version_dir, "zeta", "{}");
        write_fixture(&version_dir, "alpha", "{}");
        write_fixture(&version_dir, "mid", "{}");

        let discovery = TestCaseDiscovery::new(root.path());
        let cases = discovery.discover("wdl-1.1").unwrap();

        let names: Vec<&str> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.wdl", "mid.wdl", "zeta.wdl"]);
        assert!(cases.iter().all(|c| c.spec_version == "wdl-1.1"));
    }

    #[test]
    fn test_discover_nested_directories() {
        let (root, version_dir) = fixture_root();
        let nested = version_dir.join("stdlib");
        fs::create_dir_all(&nested).unwrap();
        write_fixture(&nested, "floor", "{}");
        write_fixture(&version_dir, "hello", "{}");

        let discovery = TestCaseDiscovery::new(root.path());
        let cases = discovery.discover("wdl-1.1").unwrap();
        let names: Vec<&str> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["floor.wdl", "hello.wdl"]);
    }

    #[test]
    fn test_missing_sidecar_is_discovery_error() {
        let (root, version_dir) = fixture_root();
        fs::write(version_dir.join("lonely.wdl"), "version 1.1\n").unwrap();

        let discovery = TestCaseDiscovery::new(root.path());
        let err = discovery.discover("wdl-1.1").unwrap_err();
        match err {
            HarnessError::Discovery { message, .. } => {
                assert!(message.contains("lonely.wdl"));
            }
            other => panic!("Expected discovery error, got {:?}", other),
        }
    }

    #[test]
    fn test_orphan_sidecar_is_discovery_error() {
        let (root, version_dir) = fixture_root();
        fs::write(version_dir.join("ghost.expected.json"), "{}").unwrap();

        let discovery = TestCaseDiscovery::new(root.path());
        assert!(matches!(
            discovery.discover("wdl-1.1"),
            Err(HarnessError::Discovery { .. })
        ));
    }

    #[test]
    fn test_malformed_sidecar_is_discovery_error() {
        let (root, version_dir) = fixture_root();
        write_fixture(&version_dir, "broken", "not json");

        let discovery = TestCaseDiscovery::new(root.path());
        assert!(matches!(
            discovery.discover("wdl-1.1"),
            Err(HarnessError::Discovery { .. })
        ));
    }

    #[test]
    fn test_sidecar_fields_parsed() {
        let (root, version_dir) = fixture_root();
        write_fixture(
            &version_dir,
            "full",
            r#"{"outputs": {"x": 1}, "exit_code": 0, "float_tolerance": 1e-6}"#,
        );
        fs::write(version_dir.join("full.inputs.json"), r#"{"n": 1}"#).unwrap();

        let discovery = TestCaseDiscovery::new(root.path());
        let cases = discovery.discover("wdl-1.1").unwrap();
        assert_eq!(cases.len(), 1);
        let case = &cases[0];
        assert_eq!(case.expected.exit_code, Some(0));
        assert_eq!(case.expected.float_tolerance, Some(1e-6));
        assert_eq!(case.expected.outputs, Some(serde_json::json!({"x": 1})));
        assert!(case.inputs_path.is_some());
    }

    #[test]
    fn test_missing_version_dir_is_discovery_error() {
        let root = TempDir::new().unwrap();
        let discovery = TestCaseDiscovery::new(root.path());
        assert!(matches!(
            discovery.discover("wdl-2.0"),
            Err(HarnessError::Discovery { .. })
        ));
    }

    #[test]
    fn test_discovery_rereads_between_runs() {
        let (root, version_dir) = fixture_root();
        write_fixture(&version_dir, "first", "{}");

        let discovery = TestCaseDiscovery::new(root.path());
        assert_eq!(discovery.discover("wdl-1.1").unwrap().len(), 1);

        write_fixture(&version_dir, "second", "{}");
        assert_eq!(discovery.discover("wdl-1.1").unwrap().len(), 2);
    }

    #[test]
    fn test_spec_versions_sorted() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("wdl-1.2")).unwrap();
        fs::create_dir_all(root.path().join("wdl-1.0")).unwrap();
        fs::create_dir_all(root.path().join("wdl-1.1")).unwrap();

        let discovery = TestCaseDiscovery::new(root.path());
        assert_eq!(
            discovery.spec_versions().unwrap(),
            vec!["wdl-1.0", "wdl-1.1", "wdl-1.2"]
        );
    }
}
