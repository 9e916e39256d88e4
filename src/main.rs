//! gemtest - command-line tool for testing installed packages

use clap::{Parser, Subcommand};
use gemtest::commands::{Command, TestCommand};
use gemtest::ui::CliUI;
use std::io::Write;

#[derive(Parser)]
#[command(name = "gemtest")]
#[command(about = "Run the test suites of installed packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tests for one or more installed packages
    Test {
        /// Names of the packages to test
        names: Vec<String>,

        /// Test a specific version instead of the newest installed
        #[arg(short = 'v', long)]
        version: Option<String>,

        /// Ignore opt-in testing and just run the tests
        #[arg(long)]
        force: bool,

        /// Install test dependencies into the user path
        #[arg(long = "dep-user-install")]
        dep_user_install: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut ui = CliUI::new();

    let result = match cli.command {
        Commands::Test {
            names,
            version,
            force,
            dep_user_install,
        } => {
            let cmd = TestCommand::with_options(names, version, force, dep_user_install);
            cmd.execute(&mut ui)
        }
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            let _ = writeln!(std::io::stderr(), "Error: {}", e);
            std::process::exit(1);
        }
    }
}
