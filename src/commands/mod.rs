//! Command system for gemtest
//!
//! Commands are discovered and executed through the Command trait.

use crate::error::Result;
use crate::ui::UI;


pub use test::TestCommand;

/// Trait that all commands must implement
pub trait Command {
    /// Execute the command, returning the process exit code
    fn execute(&self, ui: &mut dyn UI) -> Result<i32>;

    /// Get the command name
    fn name(&self) -> &str;

    /// Get command help text
    fn help(&self) -> &str;
}
