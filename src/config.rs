//! Settings-store parsing and handling
//!
//! Options for the test add-on live under a namespaced [test_options]
//! section of an INI document, loaded from $GEMTEST_CONFIG or ~/.gemtestrc.
//! A missing file or missing section yields the defaults.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "GEMTEST_CONFIG";

const CONFIG_FILE: &str = ".gemtestrc";
const SECTION: &str = "test_options";

/// Recognized settings for the test add-on
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    /// Skip the upload confirmation prompt: true always uploads, false never
    pub upload_results: Option<bool>,

    /// Override for the results collector endpoint
    pub upload_service_url: Option<String>,

    /// Install missing test dependencies without prompting
    pub install_development_dependencies: bool,

    /// Also run test suites for dependencies installed on behalf of a test run
    pub test_development_dependencies: bool,

    /// Run tests automatically after every install
    pub auto_test_on_install: bool,

    /// Offer to run tests after every install
    pub test_on_install: bool,

    /// Uninstall without prompting when an install-time test run fails
    pub force_uninstall_on_failure: bool,
}

impl TestOptions {
    /// Load settings from the default location, falling back to defaults
    /// when no settings file exists.
    pub fn load_default() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => match dirs::home_dir() {
                Some(home) => home.join(CONFIG_FILE),
                None => return Ok(TestOptions::default()),
            },
        };

        if !path.exists() {
            return Ok(TestOptions::default());
        }

        Self::load_from_file(&path)
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        Self::parse(&contents)
    }

    /// Parse settings from a string
    pub fn parse(contents: &str) -> Result<Self> {
        let ini: HashMap<String, HashMap<String, String>> = serde_ini::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse settings: {}", e)))?;

        // Settings for other add-ons live in other sections; only ours matters.
        let Some(section) = ini.get(SECTION) else {
            return Ok(TestOptions::default());
        };

        Ok(TestOptions {
            upload_results: parse_opt_bool(section, "upload_results")?,
            upload_service_url: section.get("upload_service_url").cloned(),
            install_development_dependencies: parse_bool(
                section,
                "install_development_dependencies",
            )?,
            test_development_dependencies: parse_bool(section, "test_development_dependencies")?,
            auto_test_on_install: parse_bool(section, "auto_test_on_install")?,
            test_on_install: parse_bool(section, "test_on_install")?,
            force_uninstall_on_failure: parse_bool(section, "force_uninstall_on_failure")?,
        })
    }
}

fn parse_opt_bool(section: &HashMap<String, String>, key: &str) -> Result<Option<bool>> {
    match section.get(key) {
        None => Ok(None),
        Some(raw) => match raw.trim() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            other => Err(Error::Config(format!(
                "Invalid boolean for {}: {}",
                key, other
            ))),
        },
    }
}

fn parse_bool(section: &HashMap<String, String>, key: &str) -> Result<bool> {
    Ok(parse_opt_bool(section, key)?.unwrap_or(false))
}
