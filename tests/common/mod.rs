#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct RunResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn ok(&self) -> bool {
        self.status == 0
    }
}

pub fn unique_dir(root: &Path, name: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    root.join(format!("{}_{}_{}", name, std::process::id(), ts))
}

fn compiler_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_toycc"))
}

/// Write the source under target/tests/<suite>/ and run the compiler
/// on it with the given extra flags.
pub fn run_compiler(suite: &str, source: &str, file_name: &str, args: &[&str]) -> RunResult {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let sandbox = root.join("target").join("tests").join(suite);
    fs::create_dir_all(&sandbox).expect("failed to create sandbox root");
    let proj_dir = unique_dir(&sandbox, "case");
    fs::create_dir_all(&proj_dir).expect("failed to create case dir");

    let src_path = proj_dir.join(file_name);
    fs::write(&src_path, source).expect("failed to write source");

    let output = Command::new(compiler_bin())
        .args(args)
        .arg(&src_path)
        .output()
        .expect("failed to run toycc");

    RunResult {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

/// Feed the source through stdin instead of a file argument.
pub fn run_compiler_stdin(source: &str, args: &[&str]) -> RunResult {
    let mut child = Command::new(compiler_bin())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn toycc");
    child
        .stdin
        .as_mut()
        .expect("stdin piped")
        .write_all(source.as_bytes())
        .expect("failed to write stdin");
    let output = child.wait_with_output().expect("failed to wait for toycc");

    RunResult {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}
