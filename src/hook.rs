//! Install-time test hook
//!
//! Library surface for the package manager's post-install step: optionally
//! run the fresh package's test suite and decide whether a failing install
//! should be kept. The package manager owns the actual uninstall.

use crate::commands::TestCommand;
use crate::config::TestOptions;
use crate::deps::DependencyInstaller;
use crate::error::{Error, Result};
use crate::package::PackageRegistry;
use crate::ui::UI;

/// What the package manager should do with the freshly installed package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallDecision {
    Keep,
    Uninstall,
}

/// Run the post-install test pass for a freshly installed package.
///
/// Returns `Keep` when install-time testing is disabled, declined, or the
/// tests pass. A failing or untestable package is kept or uninstalled
/// according to `force_uninstall_on_failure`, or an interactive prompt
/// (defaulting to keep).
pub fn on_package_install(
    ui: &mut dyn UI,
    config: &TestOptions,
    registry: &dyn PackageRegistry,
    installer: &dyn DependencyInstaller,
    name: &str,
    version: &str,
) -> Result<InstallDecision> {
    if !config.auto_test_on_install && !config.test_on_install {
        return Ok(InstallDecision::Keep);
    }

    if !config.auto_test_on_install
        && !ui.ask_yes_no(&format!("Test {} ({})?", name, version), true)?
    {
        return Ok(InstallDecision::Keep);
    }

    let command = TestCommand::for_install(name.to_string(), version.to_string());
    match command.execute_with(ui, config, registry, installer, None) {
        Ok(_) => Ok(InstallDecision::Keep),
        Err(
            Error::NotTestable { .. }
            | Error::BuildToolNotFound { .. }
            | Error::TestsFailed
            | Error::Interrupted
            | Error::DependenciesDeclined,
        ) => {
            if config.force_uninstall_on_failure {
                return Ok(InstallDecision::Uninstall);
            }
            let uninstall = ui.ask_yes_no(
                &format!("Testing {} ({}) failed. Uninstall?", name, version),
                false,
            )?;
            Ok(if uninstall {
                InstallDecision::Uninstall
            } else {
                InstallDecision::Keep
            })
        }
        Err(e) => Err(e),
    }
}
