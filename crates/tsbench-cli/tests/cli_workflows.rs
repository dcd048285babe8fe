#![allow(missing_docs)]

use std::io;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_tsbench")
}

fn run_cli(args: &[&str]) -> io::Result<Output> {
    Command::new(cli_bin()).args(args).output()
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn assert_cli_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Common `-p` flags pointing every file backend at `path`.
fn file_props(path: &Path) -> Vec<String> {
    vec![
        "-p".to_string(),
        format!("parquet.path.dump={}", path.display()),
        "-p".to_string(),
        "fieldcount=2".to_string(),
        "-p".to_string(),
        "buffer.points=16".to_string(),
    ]
}

fn run_with(props: &[String], args: &[&str]) -> io::Result<Output> {
    let mut all: Vec<&str> = props.iter().map(String::as_str).collect();
    all.extend_from_slice(args);
    run_cli(&all)
}

#[test]
fn load_then_read_and_scan_on_every_file_backend() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("bench").join("dump.parquet");
    let props = file_props(&path);

    let out = run_with(&props, &["load", "--records", "40", "--value-len", "6"])?;
    assert_cli_success(&out);
    assert!(stdout_of(&out).contains("Loaded 40 records into parquet"));
    assert!(path.exists());

    for backend in ["parquet", "dataset", "sql"] {
        let out = run_with(&props, &["--backend", backend, "read", "--key", "user7"])?;
        assert_cli_success(&out);
        let stdout = stdout_of(&out);
        assert!(stdout.contains("status: OK"), "{backend}: {stdout}");
        assert!(stdout.contains("field0="), "{backend}: {stdout}");
        assert!(stdout.contains("field1="), "{backend}: {stdout}");

        let out = run_with(
            &props,
            &["--backend", backend, "scan", "--start", "user38", "--count", "5"],
        )?;
        assert_cli_success(&out);
        let stdout = stdout_of(&out);
        assert!(stdout.contains("[1] field0="), "{backend}: {stdout}");
        assert!(!stdout.contains("[2]"), "{backend}: {stdout}");
    }

    // read-only runs leave the loaded file in place
    let out = run_with(&props, &["read", "--key", "user39"])?;
    assert_cli_success(&out);
    assert!(stdout_of(&out).contains("status: OK"));
    Ok(())
}

#[test]
fn missing_key_reports_not_found() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("dump.parquet");
    let props = file_props(&path);

    assert_cli_success(&run_with(&props, &["load", "--records", "3"])?);
    let out = run_with(&props, &["read", "--key", "user3"])?;
    assert_cli_success(&out);
    assert!(stdout_of(&out).contains("status: NOT_FOUND"));
    Ok(())
}

#[test]
fn session_backend_runs_a_mixed_workload() -> TestResult {
    let out = run_cli(&[
        "--backend",
        "session",
        "run",
        "--load",
        "--records",
        "50",
        "--operations",
        "60",
        "--value-len",
        "4",
    ])?;
    assert_cli_success(&out);
    let stdout = stdout_of(&out);
    assert!(stdout.contains("operations: 60"), "{stdout}");
    assert!(!stdout.contains("ERROR"), "{stdout}");
    Ok(())
}

#[test]
fn properties_file_is_honored() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("file.parquet");
    let props_file = tmp.path().join("bench.properties");
    std::fs::write(
        &props_file,
        format!(
            "# tsbench settings\nparquet.path.dump={}\nfieldcount=1\ntable=metrics\n",
            path.display()
        ),
    )?;
    let props_arg = props_file.display().to_string();

    let out = run_cli(&["-P", &props_arg, "load", "--records", "5"])?;
    assert_cli_success(&out);
    assert!(stdout_of(&out).contains("table metrics"));

    let out = run_cli(&["-P", &props_arg, "scan", "--start", "user0", "--count", "10"])?;
    assert_cli_success(&out);
    assert!(stdout_of(&out).contains("[4] field0="));
    Ok(())
}

#[test]
fn malformed_property_fails_setup() -> TestResult {
    let out = run_cli(&["-p", "buffer.points=lots", "--backend", "session", "read", "--key", "user1"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("buffer.points"));

    let out = run_cli(&["-p", "no-equals-sign", "read", "--key", "user1"])?;
    assert!(!out.status.success());
    Ok(())
}

#[test]
fn scan_of_missing_file_fails() -> TestResult {
    let tmp = TempDir::new()?;
    let props = file_props(&tmp.path().join("absent.parquet"));
    let out = run_with(&props, &["scan", "--start", "user0"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("ERROR"));
    Ok(())
}
