//! Test-run orchestration
//!
//! Drives one package through the full sequence: opt-in check, build-script
//! and build-tool resolution, test-dependency installation, the run itself,
//! and result reporting. Fatal conditions surface as errors; whether they
//! terminate the invocation or propagate to a programmatic caller is the
//! command layer's concern.

use crate::config::TestOptions;
use crate::deps::DependencyInstaller;
use crate::envelope;
use crate::error::{Error, Result};
use crate::package::{PackageIdentity, PackageRegistry};
use crate::reporter::ResultReporter;
use crate::runner::{ProcessRunner, RunRequest};
use crate::ui::UI;
use std::path::{Path, PathBuf};

/// Build-script filenames, checked in preference order.
pub const BUILD_SCRIPT_NAMES: [&str; 4] = ["rakefile", "Rakefile", "rakefile.rb", "Rakefile.rb"];

/// Marker filename a package ships to consent to automated testing.
pub const OPT_IN_MARKER: &str = ".gemtest";

/// The external executable that knows how to run a test suite.
pub const BUILD_TOOL: &str = "rake";

/// Per-invocation state. Replaces the process-wide flags the historical
/// implementations leaned on, so nested or repeated runs cannot interfere.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Ignore the opt-in marker and run anyway; forced runs never upload
    pub force: bool,
    /// A dependency install triggered this run
    pub installing_dependencies: bool,
}

/// Coordinates one package's test run end to end
pub struct TestOrchestrator<'a> {
    config: &'a TestOptions,
    registry: &'a dyn PackageRegistry,
    installer: &'a dyn DependencyInstaller,
    build_tool: Option<PathBuf>,
    ctx: RunContext,
}

impl<'a> TestOrchestrator<'a> {
    pub fn new(
        config: &'a TestOptions,
        registry: &'a dyn PackageRegistry,
        installer: &'a dyn DependencyInstaller,
        ctx: RunContext,
    ) -> Self {
        TestOrchestrator {
            config,
            registry,
            installer,
            build_tool: None,
            ctx,
        }
    }

    /// Use a specific build-tool executable instead of searching PATH.
    pub fn with_build_tool(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_tool = Some(path.into());
        self
    }

    /// Run one package through the whole pipeline.
    pub fn run_package(
        &mut self,
        ui: &mut dyn UI,
        name: &str,
        version: Option<&str>,
    ) -> Result<()> {
        let requirement = version.unwrap_or(">= 0").to_string();
        let package = self
            .registry
            .find_package(name, version)?
            .ok_or_else(|| Error::PackageNotFound {
                name: name.to_string(),
                requirement,
            })?;

        if !self.ctx.force && !has_opt_in(&package) {
            explain_opt_in(ui, &package)?;
            return Ok(());
        }

        // Resolve the script and the tool up front, so a package that
        // cannot be tested never triggers dependency installs.
        find_build_script(&package)?;
        let build_tool = match &self.build_tool {
            Some(path) => path.clone(),
            None => find_build_tool()?,
        };

        if self.ctx.installing_dependencies && !self.config.test_development_dependencies {
            // This package was only pulled in for another run; don't recurse.
            return Ok(());
        }

        self.install_dependencies(ui, &package)?;
        self.run_tests(ui, &package, &build_tool)
    }

    fn install_dependencies(&mut self, ui: &mut dyn UI, package: &PackageIdentity) -> Result<()> {
        self.ctx.installing_dependencies = true;
        let result = self.install_dependencies_inner(ui, package);
        self.ctx.installing_dependencies = false;
        result
    }

    fn install_dependencies_inner(
        &self,
        ui: &mut dyn UI,
        package: &PackageIdentity,
    ) -> Result<()> {
        for dep in &package.development_dependencies {
            if self.registry.find_package(&dep.name, None)?.is_some() {
                continue;
            }

            let install = self.config.install_development_dependencies
                || ui.ask_yes_no(
                    &format!(
                        "Install development dependency {} ({})?",
                        dep.name, dep.requirement
                    ),
                    true,
                )?;

            if !install {
                ui.error("Failed to install dependencies required to run tests. Aborting.")?;
                return Err(Error::DependenciesDeclined);
            }

            ui.output(&format!(
                "Installing test dependency {} ({})",
                dep.name, dep.requirement
            ))?;
            self.installer.install(dep)?;
        }

        Ok(())
    }

    fn run_tests(
        &self,
        ui: &mut dyn UI,
        package: &PackageIdentity,
        build_tool: &Path,
    ) -> Result<()> {
        let request = RunRequest {
            working_dir: package.root.clone(),
            program: build_tool.to_path_buf(),
            args: vec!["test".to_string()],
            timeout: None,
        };

        let outcome = ProcessRunner::run(&request, ui)?;

        // Interrupted runs are not meaningful data and are never reported.
        if !outcome.interrupted && self.should_upload(ui)? {
            let envelope = envelope::build(package, &outcome.output, outcome.passed());
            ResultReporter::from_config(self.config).submit(&envelope, ui);
        }

        if outcome.interrupted {
            ui.error("You interrupted the test! Test runs are not valid unless you let them complete!")?;
            return Err(Error::Interrupted);
        }

        if outcome.exit_code != 0 {
            ui.error("Tests did not pass. Examine the output and report it to the author!")?;
            return Err(Error::TestsFailed);
        }

        Ok(())
    }

    /// Forced runs never upload; otherwise the configured setting decides,
    /// with an interactive prompt when it is unset.
    fn should_upload(&self, ui: &mut dyn UI) -> Result<bool> {
        if self.ctx.force {
            return Ok(false);
        }
        match self.config.upload_results {
            Some(enabled) => Ok(enabled),
            None => ui.ask_yes_no("Upload these results?", true),
        }
    }
}

fn has_opt_in(package: &PackageIdentity) -> bool {
    package.declares_file(OPT_IN_MARKER) || package.root.join(OPT_IN_MARKER).exists()
}

fn explain_opt_in(ui: &mut dyn UI, package: &PackageIdentity) -> Result<()> {
    ui.output(&format!(
        "Package '{}' (version {}) needs to opt-in for testing.",
        package.name, package.version
    ))?;
    ui.output("")?;
    ui.output("Locally available testing helps packages maintain high quality by")?;
    ui.output("ensuring they work correctly on a wider array of platforms than the")?;
    ui.output("original developer can access.")?;
    ui.output("")?;
    ui.output("If you are the author:")?;
    ui.output(&format!(
        " * Add the file '{}' to your declared files",
        OPT_IN_MARKER
    ))?;
    ui.output(" * Ensure the 'test' task works and doesn't do system damage")?;
    ui.output(" * Ship your tests and build script with the package.")?;
    Ok(())
}

/// First recognized build script in the package root, in preference order.
pub fn find_build_script(package: &PackageIdentity) -> Result<PathBuf> {
    BUILD_SCRIPT_NAMES
        .iter()
        .map(|name| package.root.join(name))
        .find(|path| path.exists())
        .ok_or_else(|| Error::NotTestable {
            name: package.name.clone(),
            version: package.version.to_string(),
        })
}

/// Locate the build tool on PATH.
pub fn find_build_tool() -> Result<PathBuf> {
    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path) {
        for name in tool_names() {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(Error::BuildToolNotFound {
        tool: BUILD_TOOL.to_string(),
    })
}

#[cfg(not(windows))]
fn tool_names() -> Vec<String> {
    vec![BUILD_TOOL.to_string()]
}

#[cfg(windows)]
fn tool_names() -> Vec<String> {
    vec![
        format!("{}.exe", BUILD_TOOL),
        format!("{}.bat", BUILD_TOOL),
    ]
}
