use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;

use semver::Version;

/// File metadata used to invalidate a cached probe when the binary on disk
/// changes, grounded on the teacher's `BinaryFingerprint`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BinaryFingerprint {
    pub modified: Option<SystemTime>,
    pub len: Option<u64>,
}

impl BinaryFingerprint {
    pub fn of(path: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();
        Self {
            modified: metadata.as_ref().and_then(|m| m.modified().ok()),
            len: metadata.map(|m| m.len()),
        }
    }
}

/// Parsed `--version` output for a subprocess adapter's binary.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VersionInfo {
    pub raw: String,
    pub semantic: Option<Version>,
}

/// A snapshot of what a specific binary (by canonical path) supports, so an
/// adapter can gate optional flags the way the teacher's Codex wrapper gates
/// `--output-schema`/`--add-dir` behind `probe_capabilities`.
#[derive(Debug, Clone)]
pub struct CapabilitySnapshot {
    pub binary_path: PathBuf,
    pub fingerprint: BinaryFingerprint,
    pub version: Option<VersionInfo>,
    pub flags: HashMap<String, bool>,
    pub collected_at: SystemTime,
}

impl CapabilitySnapshot {
    pub fn supports(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }

    /// True when the parsed version is at or above `minimum`. Unknown
    /// versions are treated conservatively as not meeting the bound.
    pub fn version_at_least(&self, minimum: &Version) -> bool {
        self.version
            .as_ref()
            .and_then(|v| v.semantic.as_ref())
            .is_some_and(|v| v >= minimum)
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum CapabilityCachePolicy {
    #[default]
    PreferCache,
    Refresh,
    Bypass,
}

fn capability_cache() -> &'static Mutex<HashMap<PathBuf, CapabilitySnapshot>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, CapabilitySnapshot>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn cache_key(binary: &Path) -> PathBuf {
    std::fs::canonicalize(binary).unwrap_or_else(|_| binary.to_path_buf())
}

/// Returns a cached snapshot whose fingerprint still matches the binary on
/// disk, honoring `policy`. Callers probe (`--version`/`--help`, adapter
/// specific) and call [`store`] when this returns `None`.
pub fn lookup(binary: &Path, policy: CapabilityCachePolicy) -> Option<CapabilitySnapshot> {
    if matches!(policy, CapabilityCachePolicy::Bypass | CapabilityCachePolicy::Refresh) {
        return None;
    }
    let key = cache_key(binary);
    let cache = capability_cache().lock().unwrap_or_else(|p| p.into_inner());
    let cached = cache.get(&key)?;
    let current = BinaryFingerprint::of(binary);
    (cached.fingerprint == current).then(|| cached.clone())
}

pub fn store(snapshot: CapabilitySnapshot, policy: CapabilityCachePolicy) {
    if matches!(policy, CapabilityCachePolicy::Bypass) {
        return;
    }
    let key = cache_key(&snapshot.binary_path);
    let mut cache = capability_cache().lock().unwrap_or_else(|p| p.into_inner());
    cache.insert(key, snapshot);
}

/// Parses a `major.minor.patch` triplet out of free-form `--version` output,
/// tolerating a leading `v` and trailing build metadata — matches the
/// teacher's tolerant version-string scanning rather than requiring strict
/// semver input.
pub fn parse_version(raw: &str) -> Option<VersionInfo> {
    let pattern = version_pattern();
    let captures = pattern.captures(raw)?;
    let semantic = Version::parse(&format!("{}.{}.{}", &captures[1], &captures[2], &captures[3])).ok();
    Some(VersionInfo {
        raw: raw.trim().to_string(),
        semantic,
    })
}

fn version_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"v?(\d+)\.(\d+)\.(\d+)").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_with_leading_v_and_suffix() {
        let info = parse_version("codex-cli v1.4.2-beta+build.9").unwrap();
        assert_eq!(info.semantic, Some(Version::new(1, 4, 2)));
    }

    #[test]
    fn returns_none_when_no_version_present() {
        assert!(parse_version("not a version").is_none());
    }

    #[test]
    fn version_at_least_is_conservative_when_unknown() {
        let snapshot = CapabilitySnapshot {
            binary_path: PathBuf::from("/bin/codex"),
            fingerprint: BinaryFingerprint { modified: None, len: None },
            version: None,
            flags: HashMap::new(),
            collected_at: SystemTime::now(),
        };
        assert!(!snapshot.version_at_least(&Version::new(1, 0, 0)));
    }

    #[test]
    fn store_then_lookup_round_trips_with_matching_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("fake-cli");
        std::fs::write(&binary, b"#!/bin/sh\necho hi\n").unwrap();

        let snapshot = CapabilitySnapshot {
            binary_path: binary.clone(),
            fingerprint: BinaryFingerprint::of(&binary),
            version: parse_version("1.2.3"),
            flags: [("supports_json".to_string(), true)].into_iter().collect(),
            collected_at: SystemTime::now(),
        };
        store(snapshot, CapabilityCachePolicy::PreferCache);

        let found = lookup(&binary, CapabilityCachePolicy::PreferCache).unwrap();
        assert!(found.supports("supports_json"));
    }

    #[test]
    fn bypass_never_reads_or_writes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("bypassed-cli");
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();

        let snapshot = CapabilitySnapshot {
            binary_path: binary.clone(),
            fingerprint: BinaryFingerprint::of(&binary),
            version: None,
            flags: HashMap::new(),
            collected_at: SystemTime::now(),
        };
        store(snapshot, CapabilityCachePolicy::Bypass);
        assert!(lookup(&binary, CapabilityCachePolicy::PreferCache).is_none());
    }
}
