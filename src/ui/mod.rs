//! User interface abstraction
//!
//! This module provides the UI trait for command input/output.

use crate::error::Result;
use std::io::{self, BufRead, Write};

#[cfg(test)]
pub mod test_ui;

/// Abstract UI trait for command interaction
pub trait UI {
    /// Output a message to the user
    fn output(&mut self, message: &str) -> Result<()>;

    /// Output an error message
    fn error(&mut self, message: &str) -> Result<()>;

    /// Output a warning message
    fn warning(&mut self, message: &str) -> Result<()>;

    /// Ask the user a yes/no question, returning `default` on empty or
    /// unrecognized input.
    fn ask_yes_no(&mut self, prompt: &str, default: bool) -> Result<bool>;

    /// Output raw bytes (e.g., live subprocess output)
    fn output_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        // Default implementation: write to stdout, flushed so interleaved
        // subprocess output shows up as it arrives
        let mut stdout = io::stdout();
        stdout.write_all(bytes)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Command-line UI implementation
pub struct CliUI {
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl CliUI {
    /// Creates a new command-line UI instance using stdout and stderr.
    pub fn new() -> Self {
        CliUI {
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }
}

impl Default for CliUI {
    fn default() -> Self {
        Self::new()
    }
}

impl UI for CliUI {
    fn output(&mut self, message: &str) -> Result<()> {
        writeln!(self.stdout, "{}", message)?;
        Ok(())
    }

    fn error(&mut self, message: &str) -> Result<()> {
        writeln!(self.stderr, "Error: {}", message)?;
        Ok(())
    }

    fn warning(&mut self, message: &str) -> Result<()> {
        writeln!(self.stderr, "Warning: {}", message)?;
        Ok(())
    }

    fn ask_yes_no(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Yn]" } else { "[yN]" };
        write!(self.stdout, "{} {} ", prompt, hint)?;
        self.stdout.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;

        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => Ok(true),
            "n" | "no" => Ok(false),
            _ => Ok(default),
        }
    }
}
