//! Test-dependency installation
//!
//! The installer is a dumb collaborator: it installs exactly what it is
//! told to. Deciding whether a dependency is already satisfied, and whether
//! the user agreed to install it, stays with the orchestrator.

use crate::error::{Error, Result};
use crate::package::DependencySpec;
use std::path::PathBuf;
use std::process::Command;

/// Installs one dependency into the local package store
pub trait DependencyInstaller {
    fn install(&self, dep: &DependencySpec) -> Result<()>;
}

/// Installer that shells out to the package manager
pub struct CommandInstaller {
    program: PathBuf,
    user_install: bool,
}

impl CommandInstaller {
    pub fn new(user_install: bool) -> Self {
        CommandInstaller {
            program: PathBuf::from("gem"),
            user_install,
        }
    }

    /// Use a specific package-manager executable.
    pub fn with_program(program: impl Into<PathBuf>, user_install: bool) -> Self {
        CommandInstaller {
            program: program.into(),
            user_install,
        }
    }
}

impl DependencyInstaller for CommandInstaller {
    fn install(&self, dep: &DependencySpec) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("install")
            .arg(&dep.name)
            .arg("--version")
            .arg(&dep.requirement);
        if self.user_install {
            cmd.arg("--user-install");
        }

        let status = cmd.status().map_err(|e| {
            Error::CommandExecution(format!(
                "Failed to run {} install: {}",
                self.program.display(),
                e
            ))
        })?;

        if !status.success() {
            return Err(Error::CommandExecution(format!(
                "Installing {} ({}) failed with status: {}",
                dep.name, dep.requirement, status
            )));
        }

        Ok(())
    }
}
