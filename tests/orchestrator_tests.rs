//! End-to-end orchestration tests
//!
//! These tests build an installed-package tree in a temporary directory,
//! point the orchestrator at a stub build tool, and exercise complete runs
//! through the test command.

#![cfg(unix)]

use std::cell::RefCell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use gemtest::commands::TestCommand;
use gemtest::config::TestOptions;
use gemtest::deps::DependencyInstaller;
use gemtest::error::{Error, Result};
use gemtest::package::{DependencySpec, DirectoryRegistry};
use gemtest::ui::UI;

/// Simple test UI that captures output for assertions
struct TestUI {
    output: Vec<String>,
    errors: Vec<String>,
    bytes_output: Vec<Vec<u8>>,
}

impl TestUI {
    fn new() -> Self {
        TestUI {
            output: Vec::new(),
            errors: Vec::new(),
            bytes_output: Vec::new(),
        }
    }

    fn captured_text(&self) -> String {
        let bytes: Vec<u8> = self.bytes_output.iter().flatten().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl UI for TestUI {
    fn output(&mut self, message: &str) -> Result<()> {
        self.output.push(message.to_string());
        Ok(())
    }

    fn error(&mut self, message: &str) -> Result<()> {
        self.errors.push(message.to_string());
        Ok(())
    }

    fn warning(&mut self, message: &str) -> Result<()> {
        self.errors.push(format!("Warning: {}", message));
        Ok(())
    }

    fn ask_yes_no(&mut self, _prompt: &str, default: bool) -> Result<bool> {
        Ok(default)
    }

    fn output_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes_output.push(bytes.to_vec());
        Ok(())
    }
}

struct RecordingInstaller {
    installed: RefCell<Vec<String>>,
}

impl RecordingInstaller {
    fn new() -> Self {
        RecordingInstaller {
            installed: RefCell::new(Vec::new()),
        }
    }
}

impl DependencyInstaller for RecordingInstaller {
    fn install(&self, dep: &DependencySpec) -> Result<()> {
        self.installed.borrow_mut().push(dep.name.clone());
        Ok(())
    }
}

/// Lay out one installed package under `home`, returning its contents dir.
fn install_stub_package(home: &Path, name: &str, version: &str, files: &[&str]) -> PathBuf {
    let spec_dir = home.join("specifications");
    let gem_dir = home.join("gems").join(format!("{}-{}", name, version));
    fs::create_dir_all(&spec_dir).unwrap();
    fs::create_dir_all(&gem_dir).unwrap();

    let file_list = files
        .iter()
        .map(|f| format!("  - {}", f))
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(
        spec_dir.join(format!("{}-{}.yml", name, version)),
        format!("name: {}\nversion: \"{}\"\nfiles:\n{}\n", name, version, file_list),
    )
    .unwrap();

    for file in files {
        fs::write(gem_dir.join(file), "").unwrap();
    }

    gem_dir
}

/// Write an executable stub build tool.
fn write_stub_tool(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("rake");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn no_upload() -> TestOptions {
    TestOptions {
        upload_results: Some(false),
        ..Default::default()
    }
}

#[test]
fn test_passing_run() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    install_stub_package(home.path(), "test-gem", "0.0.0", &["Rakefile", ".gemtest"]);
    let tool = write_stub_tool(
        tool_dir.path(),
        "#!/bin/sh\necho \"1 tests, 1 assertions, 0 failures\"\nexit 0\n",
    );

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    let cmd = TestCommand::new(vec!["test-gem".to_string()], None);
    let code = cmd
        .execute_with(&mut ui, &no_upload(), &registry, &installer, Some(&tool))
        .unwrap();

    assert_eq!(code, 0);
    assert!(ui.errors.is_empty());
    assert!(ui
        .captured_text()
        .contains("1 tests, 1 assertions, 0 failures"));
}

#[test]
fn test_failing_run() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    install_stub_package(home.path(), "test-gem", "0.0.0", &["Rakefile", ".gemtest"]);
    let tool = write_stub_tool(
        tool_dir.path(),
        "#!/bin/sh\necho \"1 tests, 1 assertions, 1 failures\" 1>&2\nexit 1\n",
    );

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    let cmd = TestCommand::new(vec!["test-gem".to_string()], None);
    let code = cmd
        .execute_with(&mut ui, &no_upload(), &registry, &installer, Some(&tool))
        .unwrap();

    assert_eq!(code, 1);
    assert!(ui
        .captured_text()
        .contains("1 tests, 1 assertions, 1 failures"));
    assert!(ui.errors.iter().any(|e| e.contains("Tests did not pass")));
    assert!(ui.errors.iter().any(|e| e.contains("test-gem")));
}

#[test]
fn test_failing_run_propagates_for_install_hook() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    install_stub_package(home.path(), "test-gem", "0.0.0", &["Rakefile", ".gemtest"]);
    let tool = write_stub_tool(tool_dir.path(), "#!/bin/sh\nexit 1\n");

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    let cmd = TestCommand::for_install("test-gem".to_string(), "0.0.0".to_string());
    let result = cmd.execute_with(&mut ui, &no_upload(), &registry, &installer, Some(&tool));

    assert!(matches!(result, Err(Error::TestsFailed)));
}

#[test]
fn test_opt_out_runs_nothing() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    let gem_dir = install_stub_package(home.path(), "test-gem", "0.0.0", &["Rakefile"]);
    // The stub proves execution by leaving a sentinel behind.
    let tool = write_stub_tool(tool_dir.path(), "#!/bin/sh\ntouch ran\nexit 0\n");

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    let cmd = TestCommand::new(vec!["test-gem".to_string()], None);
    let code = cmd
        .execute_with(&mut ui, &no_upload(), &registry, &installer, Some(&tool))
        .unwrap();

    assert_eq!(code, 0);
    assert!(ui.output.iter().any(|line| line.contains("opt-in")));
    assert!(!gem_dir.join("ran").exists());
    assert!(installer.installed.borrow().is_empty());
}

#[test]
fn test_force_bypasses_opt_in() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    let gem_dir = install_stub_package(home.path(), "test-gem", "0.0.0", &["Rakefile"]);
    let tool = write_stub_tool(tool_dir.path(), "#!/bin/sh\ntouch ran\nexit 0\n");

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    let cmd = TestCommand::with_options(vec!["test-gem".to_string()], None, true, false);
    let code = cmd
        .execute_with(&mut ui, &no_upload(), &registry, &installer, Some(&tool))
        .unwrap();

    assert_eq!(code, 0);
    assert!(gem_dir.join("ran").exists());
}

#[test]
fn test_missing_build_script() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    install_stub_package(home.path(), "test-gem", "0.0.0", &[".gemtest"]);
    let tool = write_stub_tool(tool_dir.path(), "#!/bin/sh\nexit 0\n");

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    let cmd = TestCommand::new(vec!["test-gem".to_string()], None);
    let code = cmd
        .execute_with(&mut ui, &no_upload(), &registry, &installer, Some(&tool))
        .unwrap();

    assert_eq!(code, 1);
    assert!(ui.errors.iter().any(|e| e.contains("cannot be tested")));
}

#[test]
fn test_missing_package_continues_batch() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    install_stub_package(home.path(), "other-gem", "0.1.0", &["Rakefile", ".gemtest"]);
    let tool = write_stub_tool(
        tool_dir.path(),
        "#!/bin/sh\necho \"0 failures\"\nexit 0\n",
    );

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    // The first package is absent; the second still runs.
    let cmd = TestCommand::new(
        vec!["missing-gem".to_string(), "other-gem".to_string()],
        None,
    );
    let code = cmd
        .execute_with(&mut ui, &no_upload(), &registry, &installer, Some(&tool))
        .unwrap();

    assert_eq!(code, 1);
    assert!(ui
        .errors
        .iter()
        .any(|e| e.contains("Could not find package missing-gem")));
    assert!(ui.captured_text().contains("0 failures"));
}

#[test]
fn test_exact_version_selection() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    install_stub_package(home.path(), "test-gem", "0.0.1", &["Rakefile", ".gemtest"]);
    install_stub_package(home.path(), "test-gem", "0.0.2", &["Rakefile", ".gemtest"]);
    let tool = write_stub_tool(tool_dir.path(), "#!/bin/sh\npwd\nexit 0\n");

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    let cmd = TestCommand::new(vec!["test-gem".to_string()], Some("0.0.1".to_string()));
    let code = cmd
        .execute_with(&mut ui, &no_upload(), &registry, &installer, Some(&tool))
        .unwrap();

    assert_eq!(code, 0);
    assert!(ui.captured_text().contains("test-gem-0.0.1"));
}

#[test]
fn test_reporting_404_does_not_affect_outcome() {
    let home = TempDir::new().unwrap();
    let tool_dir = TempDir::new().unwrap();
    install_stub_package(home.path(), "test-gem", "0.0.0", &["Rakefile", ".gemtest"]);
    let tool = write_stub_tool(
        tool_dir.path(),
        "#!/bin/sh\necho \"1 tests, 1 assertions, 0 failures\"\nexit 0\n",
    );

    let url = http::serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    );

    let config = TestOptions {
        upload_results: Some(true),
        upload_service_url: Some(url),
        ..Default::default()
    };

    let registry = DirectoryRegistry::new(home.path());
    let installer = RecordingInstaller::new();
    let mut ui = TestUI::new();

    let cmd = TestCommand::new(vec!["test-gem".to_string()], None);
    let code = cmd
        .execute_with(&mut ui, &config, &registry, &installer, Some(&tool))
        .unwrap();

    // The failed upload is a diagnostic, never a failed run.
    assert_eq!(code, 0);
    assert!(ui
        .output
        .iter()
        .any(|line| line.contains("Unable to find where to put the test results")));
}

mod http {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve exactly one HTTP request with a canned response, returning the
    /// URL to hit.
    pub fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = Vec::new();
                let mut tmp = [0u8; 1024];
                while !request_complete(&buf) {
                    match stream.read(&mut tmp) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&tmp[..n]),
                    }
                }
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        format!("http://{}/test_results", addr)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]);
        let content_length = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);

        buf.len() >= header_end + 4 + content_length
    }
}
