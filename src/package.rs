//! Package identity and registry lookup
//!
//! The registry trait is the seam between the test add-on and the package
//! manager proper. The directory-backed implementation reads an installed
//! tree of `specifications/<name>-<version>.yml` metadata files alongside
//! `gems/<name>-<version>/` package contents.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the installed-package tree.
pub const HOME_ENV: &str = "GEM_HOME";

const HOME_DIR: &str = ".gem";

/// A structured package version: the release string, with prerelease status
/// derived from it.
#[derive(Debug, Clone)]
pub struct PackageVersion(String);

impl PackageVersion {
    pub fn new(release: impl Into<String>) -> Self {
        PackageVersion(release.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A version with any alphabetic segment is a prerelease.
    pub fn prerelease(&self) -> bool {
        self.0.chars().any(|c| c.is_ascii_alphabetic())
    }

    fn segments(&self) -> Vec<Segment> {
        self.0
            .split(['.', '-'])
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<u64>() {
                Ok(n) => Segment::Number(n),
                Err(_) => Segment::Text(s.to_string()),
            })
            .collect()
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Number(u64),
    Text(String),
}

const ZERO_SEGMENT: Segment = Segment::Number(0);

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let mine = self.segments();
        let theirs = other.segments();
        let len = mine.len().max(theirs.len());

        for i in 0..len {
            // Missing segments count as zero, so 1.0 == 1.0.0 and a trailing
            // prerelease tag sorts below the bare release.
            let a = mine.get(i).unwrap_or(&ZERO_SEGMENT);
            let b = theirs.get(i).unwrap_or(&ZERO_SEGMENT);

            let ordering = match (a, b) {
                (Segment::Number(a), Segment::Number(b)) => a.cmp(b),
                (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
                (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
                (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality follows segment comparison, so 1.0 == 1.0.0.
impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

/// One declared test-only dependency
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DependencySpec {
    pub name: String,
    #[serde(default = "default_requirement")]
    pub requirement: String,
}

fn default_requirement() -> String {
    ">= 0".to_string()
}

/// Declared metadata for one installed package
#[derive(Debug, Deserialize)]
struct PackageMetadata {
    name: String,
    version: String,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    development_dependencies: Vec<DependencySpec>,
}

/// An installed package as the orchestrator sees it
#[derive(Debug, Clone)]
pub struct PackageIdentity {
    pub name: String,
    pub version: PackageVersion,
    /// Filesystem path to the unpacked package contents
    pub root: PathBuf,
    /// Files the package declares it ships
    pub files: Vec<String>,
    pub development_dependencies: Vec<DependencySpec>,
}

impl PackageIdentity {
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn declares_file(&self, name: &str) -> bool {
        self.files.iter().any(|f| f == name)
    }
}

/// Lookup interface over the package manager's installed set
pub trait PackageRegistry {
    /// Find an installed package by name. With a version, only that exact
    /// version matches; without one, the newest installed version wins.
    fn find_package(&self, name: &str, version: Option<&str>) -> Result<Option<PackageIdentity>>;
}

/// Registry over an installed-package tree on disk
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryRegistry { root: root.into() }
    }

    /// Registry rooted at $GEM_HOME, falling back to ~/.gem.
    pub fn from_env() -> Self {
        let root = match std::env::var_os(HOME_ENV) {
            Some(root) => PathBuf::from(root),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(HOME_DIR),
        };
        DirectoryRegistry { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_metadata(&self, path: &Path) -> Result<PackageMetadata> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Metadata(format!("Failed to read {}: {}", path.display(), e)))?;

        serde_yaml::from_str(&contents)
            .map_err(|e| Error::Metadata(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

impl PackageRegistry for DirectoryRegistry {
    fn find_package(&self, name: &str, version: Option<&str>) -> Result<Option<PackageIdentity>> {
        let spec_dir = self.root.join("specifications");
        if !spec_dir.is_dir() {
            return Ok(None);
        }

        let mut best: Option<PackageIdentity> = None;

        for entry in fs::read_dir(&spec_dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .map(|ext| ext == "yml" || ext == "yaml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            let metadata = self.read_metadata(&path)?;
            if metadata.name != name {
                continue;
            }
            if let Some(want) = version {
                if metadata.version != want {
                    continue;
                }
            }

            // Metadata without unpacked contents means the package is not
            // actually installed.
            let root = self
                .root
                .join("gems")
                .join(format!("{}-{}", metadata.name, metadata.version));
            if !root.is_dir() {
                continue;
            }

            let candidate = PackageIdentity {
                name: metadata.name,
                version: PackageVersion::new(metadata.version),
                root,
                files: metadata.files,
                development_dependencies: metadata.development_dependencies,
            };

            let newer = best
                .as_ref()
                .map(|current| candidate.version > current.version)
                .unwrap_or(true);
            if newer {
                best = Some(candidate);
            }
        }

        Ok(best)
    }
}
