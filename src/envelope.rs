//! Result envelope construction and wire encoding
//!
//! The collector partitions statistics by exact release versus prerelease
//! runs, so the package version travels structured rather than as one
//! opaque string. The wire format is a flat YAML document; the collector
//! replies in the same encoding.

use crate::error::{Error, Result};
use crate::package::PackageIdentity;
use serde::{Deserialize, Serialize};

/// Structured version component of the envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub release: String,
    pub prerelease: bool,
}

/// The record submitted for one completed test run. Built once after the
/// run is final; immutable from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub arch: String,
    pub vendor: String,
    pub os: String,
    pub machine_arch: String,
    pub name: String,
    pub version: VersionInfo,
    pub platform: String,
    pub runtime_version: String,
    pub result: bool,
    pub test_output: String,
}

// Target triple baked in at build time.
const TARGET: &str = env!("TARGET");

/// Build the envelope for a finished run. Pure: every host fact comes from
/// compile-time constants, everything else from the arguments.
pub fn build(package: &PackageIdentity, output: &str, passed: bool) -> ResultEnvelope {
    ResultEnvelope {
        arch: TARGET.to_string(),
        vendor: target_vendor(),
        os: std::env::consts::OS.to_string(),
        machine_arch: std::env::consts::ARCH.to_string(),
        name: package.name.clone(),
        version: VersionInfo {
            release: package.version.as_str().to_string(),
            prerelease: package.version.prerelease(),
        },
        platform: env!("CARGO_PKG_NAME").to_string(),
        runtime_version: env!("CARGO_PKG_VERSION").to_string(),
        result: passed,
        test_output: output.to_string(),
    }
}

// Second component of the target triple; nonstandard triples report
// "unknown".
fn target_vendor() -> String {
    TARGET
        .splitn(3, '-')
        .nth(1)
        .unwrap_or("unknown")
        .to_string()
}

/// Encode an envelope for transmission.
pub fn serialize(envelope: &ResultEnvelope) -> Result<String> {
    serde_yaml::to_string(envelope)
        .map_err(|e| Error::Metadata(format!("Failed to encode results: {}", e)))
}

/// Decode an envelope from its wire form.
pub fn parse(document: &str) -> Result<ResultEnvelope> {
    serde_yaml::from_str(document)
        .map_err(|e| Error::Metadata(format!("Failed to decode results: {}", e)))
}
