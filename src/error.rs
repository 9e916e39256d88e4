//! Error types for gemtest

use std::io;
use thiserror::Error;

/// Result type alias for gemtest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gemtest
#[derive(Error, Debug)]
pub enum Error {
    /// The requested package is not installed.
    #[error("Could not find package {name} ({requirement})")]
    PackageNotFound { name: String, requirement: String },

    /// The package carries no recognized build script, so its tests cannot run.
    #[error("Couldn't find a build script -- package {name} ({version}) cannot be tested")]
    NotTestable { name: String, version: String },

    /// The build tool itself is absent from the system.
    #[error("Couldn't find {tool}; gemtest will not work without it")]
    BuildToolNotFound { tool: String },

    /// The user declined to install a required test dependency.
    #[error("dependencies not installed")]
    DependenciesDeclined,

    /// The build tool exited with a nonzero status.
    #[error("tests failed")]
    TestsFailed,

    /// The run was interrupted before it could complete.
    #[error("test run interrupted")]
    Interrupted,

    /// Configuration file error or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Package metadata could not be read or parsed.
    #[error("Invalid package metadata: {0}")]
    Metadata(String),

    /// Spawning or driving an external command failed.
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
