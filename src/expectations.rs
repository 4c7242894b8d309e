//! Loading and lookup of the xfail/skip exclusion configuration.
//!
//! The configuration is a YAML mapping from spec-version string to two
//! optional entry lists, `xfail` and `skip`. An entry is either a bare test
//! name or a `{name, reason}` mapping; the reason is free-form annotation
//! text carried through to the report, never interpreted.

use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::HarnessError;

/// Expected outcome for a test as declared by configuration, independent of
/// what actually happens at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Not listed anywhere: the test must pass.
    Normal,
    /// Listed under `xfail`: the test is expected to fail.
    Xfail(Option<String>),
    /// Listed under `skip`: the engine is never invoked.
    Skip(Option<String>),
}

impl Disposition {
    /// Annotation reason attached to the entry, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Disposition::Normal => None,
            Disposition::Xfail(reason) | Disposition::Skip(reason) => reason.as_deref(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Disposition::Skip(_))
    }
}

/// Which exclusion list an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionList {
    Xfail,
    Skip,
}

impl fmt::Display for ExclusionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionList::Xfail => write!(f, "xfail"),
            ExclusionList::Skip => write!(f, "skip"),
        }
    }
}

/// A configured entry with no matching fixture on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleEntry {
    pub name: String,
    pub list: ExclusionList,
}

/// Raw entry shape: either `- name.wdl` or `- {name: ..., reason: ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Name(String),
    Annotated {
        name: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl RawEntry {
    fn into_parts(self) -> (String, Option<String>) {
        match self {
            RawEntry::Name(name) => (name, None),
            RawEntry::Annotated { name, reason } => (name, reason),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVersion {
    #[serde(default)]
    xfail: Vec<RawEntry>,
    #[serde(default)]
    skip: Vec<RawEntry>,
}

/// Exclusion entries for a single spec version.
///
/// Invariant: a test name appears in at most one of the two lists.
#[derive(Debug, Clone, Default)]
pub struct ExpectationSet {
    xfail: IndexMap<String, Option<String>>,
    skip: IndexMap<String, Option<String>>,
}

impl ExpectationSet {
    /// Look up the declared disposition for a test name.
    /// Names not present in either list are `Normal`.
    pub fn lookup(&self, test_name: &str) -> Disposition {
        if let Some(reason) = self.xfail.get(test_name) {
            return Disposition::Xfail(reason.clone());
        }
        if let Some(reason) = self.skip.get(test_name) {
            return Disposition::Skip(reason.clone());
        }
        Disposition::Normal
    }

    /// Configured entries with no matching name among `discovered`.
    /// These are non-fatal: stale exclusions are warned about, not rejected.
    pub fn stale_entries(&self, discovered: &HashSet<&str>) -> Vec<StaleEntry> {
        let mut stale = Vec::new();
        for name in self.xfail.keys() {
            if !discovered.contains(name.as_str()) {
                stale.push(StaleEntry {
                    name: name.clone(),
                    list: ExclusionList::Xfail,
                });
            }
        }
        for name in self.skip.keys() {
            if !discovered.contains(name.as_str()) {
                stale.push(StaleEntry {
                    name: name.clone(),
                    list: ExclusionList::Skip,
                });
            }
        }
        stale
    }

    pub fn xfail_count(&self) -> usize {
        self.xfail.len()
    }

    pub fn skip_count(&self) -> usize {
        self.skip.len()
    }
}

/// Loaded exclusion configuration, indexed by spec version.
///
/// Read-only after load; constructed once per run and passed into the
/// scheduler rather than held in any global state.
#[derive(Debug, Clone, Default)]
pub struct ExpectationStore {
    versions: IndexMap<String, ExpectationSet>,
}

impl ExpectationStore {
    /// Load and validate the exclusion configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            HarnessError::config_in(path, format!("failed to read configuration: {}", e))
        })?;
        Self::parse(&contents).map_err(|e| match e {
            HarnessError::Config { message, .. } => HarnessError::config_in(path, message),
            other => other,
        })
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self, HarnessError> {
        let raw: IndexMap<String, RawVersion> = serde_yaml::from_str(contents)
            .map_err(|e| HarnessError::config(format!("malformed configuration: {}", e)))?;

        let mut versions = IndexMap::new();
        for (spec_version, raw_version) in raw {
            let set = Self::build_set(&spec_version, raw_version)?;
            versions.insert(spec_version, set);
        }

        Ok(Self { versions })
    }

    fn build_set(spec_version: &str, raw: RawVersion) -> Result<ExpectationSet, HarnessError> {
        let mut set = ExpectationSet::default();

        for entry in raw.xfail {
            let (name, reason) = entry.into_parts();
            if set.xfail.insert(name.clone(), reason).is_some() {
                return Err(HarnessError::config(format!(
                    "duplicate xfail entry '{}' for {}",
                    name, spec_version
                )));
            }
        }

        for entry in raw.skip {
            let (name, reason) = entry.into_parts();
            if set.xfail.contains_key(&name) {
                return Err(HarnessError::config(format!(
                    "'{}' is listed in both xfail and skip for {}",
                    name, spec_version
                )));
            }
            if set.skip.insert(name.clone(), reason).is_some() {
                return Err(HarnessError::config(format!(
                    "duplicate skip entry '{}' for {}",
                    name, spec_version
                )));
            }
        }

        Ok(set)
    }

    /// Look up the disposition of (spec version, test name).
    /// Unknown versions and unknown names are both `Normal`.
    pub fn lookup(&self, spec_version: &str, test_name: &str) -> Disposition {
        match self.versions.get(spec_version) {
            Some(set) => set.lookup(test_name),
            None => Disposition::Normal,
        }
    }

    /// The expectation set for one spec version, if configured.
    pub fn version(&self, spec_version: &str) -> Option<&ExpectationSet> {
        self.versions.get(spec_version)
    }

    /// Spec versions named in the configuration, in file order.
    pub fn spec_versions(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(|v| v.as_str())
    }
}
