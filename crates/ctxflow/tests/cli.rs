use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEMP_NONCE: AtomicU64 = AtomicU64::new(0);

fn ctxflow_bin() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_ctxflow") {
        return PathBuf::from(path);
    }

    let mut exe = std::env::current_exe().expect("test executable path should be known");
    exe.pop();
    if exe.file_name().and_then(|name| name.to_str()) == Some("deps") {
        exe.pop();
    }
    exe.join("ctxflow")
}

const CONTEXT_STUB: &str = "package context

type Context interface {
	Err() error
}

func Background() Context
";

const APM_STUB: &str = "package apm

import \"context\"

func Derive(ctx context.Context) context.Context
";

/// A module on disk, removed on drop.
struct Module {
    root: PathBuf,
}

impl Module {
    fn new(prefix: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        let counter = TEMP_NONCE.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!("{prefix}-{timestamp}-{counter}"));
        let module = Module { root };
        module.write("go.mod", "module example.com/svc\n\ngo 1.22\n");
        module.write("vendor/context/context.go", CONTEXT_STUB);
        module.write("vendor/github.com/acme/apm/apm.go", APM_STUB);
        module
    }

    fn write(&self, rel: &str, contents: &str) -> &Self {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("temp dir should be creatable");
        }
        std::fs::write(&path, contents).expect("temp source write should succeed");
        self
    }

    fn check(&self, flags: &[&str]) -> Output {
        Command::new(ctxflow_bin())
            .arg("check")
            .arg(&self.root)
            .args(flags)
            .output()
            .expect("ctxflow check should execute")
    }

    fn path(&self) -> &Path {
        &self.root
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

const LEAKY: &str = "package worker

import \"context\"

func work() {}

func Start(ctx context.Context) {
	go func() {
		work()
	}()
}
";

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn clean_modules_exit_zero() {
    let module = Module::new("ctxflow-cli-clean");
    module.write(
        "worker/worker.go",
        "package worker\n\nimport \"context\"\n\nfunc Start(ctx context.Context) {\n\tgo func() {\n\t\t_ = ctx\n\t}()\n}\n",
    );

    let output = module.check(&[]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stdout: {}\nstderr: {}",
        stdout(&output),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout(&output).is_empty());
}

#[test]
fn findings_are_printed_with_positions_and_exit_one() {
    let module = Module::new("ctxflow-cli-findings");
    module.write("worker/worker.go", LEAKY);

    let output = module.check(&[]);
    assert_eq!(output.status.code(), Some(1));
    insta::assert_snapshot!(stdout(&output), @r#"worker/worker.go:8:2: goroutine does not propagate context "ctx" (goroutine)"#);
}

#[test]
fn json_reports_are_machine_readable() {
    let module = Module::new("ctxflow-cli-json");
    module.write("worker/worker.go", LEAKY);

    let output = module.check(&["--format", "json"]);
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("valid json");
    let diag = &report["diagnostics"][0];
    assert_eq!(diag["checker"], "goroutine");
    assert_eq!(diag["code"], "C0001");
    assert_eq!(diag["path"], "worker/worker.go");
    assert_eq!(diag["line"], 8);
}

#[test]
fn the_root_config_file_is_picked_up() {
    let module = Module::new("ctxflow-cli-config");
    module
        .write("ctxflow.json", r#"{ "deriver": "github.com/acme/apm.Derive" }"#)
        .write(
            "worker/worker.go",
            "package worker\n\nimport \"context\"\n\nfunc Start(ctx context.Context) {\n\tgo func() {\n\t\t_ = ctx\n\t}()\n}\n",
        );

    let output = module.check(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stdout(&output).contains("goroutine should call apm.Derive to derive context (goroutine_derive)"),
        "stdout: {}",
        stdout(&output)
    );
}

#[test]
fn bad_configs_exit_two() {
    let module = Module::new("ctxflow-cli-bad-config");
    module
        .write("ctxflow.json", r#"{ "disabled": ["gorotine"] }"#)
        .write("worker/worker.go", LEAKY);

    let output = module.check(&[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown checker `gorotine`"));

    let missing = module.path().join("missing.json");
    let output = module.check(&["--config", missing.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn generated_and_test_files_are_skipped() {
    let module = Module::new("ctxflow-cli-skip");
    module
        .write(
            "worker/worker_gen.go",
            &format!("// Code generated by stubgen. DO NOT EDIT.\n\n{LEAKY}"),
        )
        .write("worker/worker_test.go", &LEAKY.replace("func Start", "func startTest").replace("work()", "job()"));

    let output = module.check(&[]);
    assert_eq!(output.status.code(), Some(0), "stdout: {}", stdout(&output));

    let output = module.check(&["--include-tests"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).starts_with("worker/worker_test.go:8:2:"));
}

#[test]
fn syntax_errors_are_reported() {
    let module = Module::new("ctxflow-cli-syntax");
    module.write("worker/broken.go", "package worker\n\nfunc (\n");

    let output = module.check(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("(syntax)"), "stdout: {}", stdout(&output));
}

#[test]
fn usage_errors_exit_two() {
    let output = Command::new(ctxflow_bin())
        .arg("check")
        .output()
        .expect("ctxflow should execute");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("usage:"));
}
