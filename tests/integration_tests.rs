//! Integration Tests

extern crate assert_cli;
extern crate tempdir;

use std::fs;
use std::path::PathBuf;

use assert_cli::Assert;
use tempdir::TempDir;

trait AssertExt {
    fn exit_status_is(self, exit_status: i32) -> Self;
}

impl AssertExt for Assert {
    fn exit_status_is(self, exit_status: i32) -> Self {
        if exit_status == 0 {
            self.succeeds()
        } else {
            self.fails_with(exit_status)
        }
    }
}

fn quash_command(command: &str) -> Assert {
    Assert::cargo_binary("quash").with_args(&["-c", command])
}

fn generate_temp_directory() -> TempDir {
    // Because of limitation in `assert_cli`, temporary directory must be
    // subdirectory of directory containing Cargo.toml
    let temp_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests");
    TempDir::new_in(temp_root, "temp").expect("unable to generate temp dir")
}

#[test]
fn test_echo() {
    quash_command("echo hello   world")
        .stdout()
        .contains("hello world")
        .unwrap();
}

#[test]
fn test_pipeline() {
    quash_command("echo haystack needle | tr ' ' '\\n' | grep needle")
        .stdout()
        .contains("needle")
        .stdout()
        .doesnt_contain("haystack")
        .unwrap();
}

#[test]
fn test_redirects() {
    let temp_dir = generate_temp_directory();
    let out = temp_dir.path().join("out.txt");
    let command = format!(
        "echo first > {out}; echo second >> {out}; cat < {out}",
        out = out.display()
    );

    quash_command(&command)
        .stdout()
        .contains("first\nsecond")
        .unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "first\nsecond\n");
}

#[test]
fn test_cd_and_pwd() {
    let temp_dir = generate_temp_directory();
    let target = fs::canonicalize(temp_dir.path()).unwrap();
    let command = format!("cd {}; pwd", target.display());

    quash_command(&command)
        .stdout()
        .contains(target.to_str().unwrap())
        .unwrap();
}

#[test]
fn test_export_is_seen_by_children() {
    quash_command("export QUASH_TEST_VALUE=exported; sh -c 'echo $QUASH_TEST_VALUE'")
        .stdout()
        .contains("exported")
        .unwrap();
}

#[test]
fn test_background_job_is_listed() {
    quash_command("sleep 1 & jobs; kill %1")
        .stdout()
        .contains("Background job started: [1]")
        .stdout()
        .contains("sleep 1 &")
        .stdout()
        .contains("\n[1]\t")
        .unwrap();
}

#[test]
fn test_running_out_of_descriptors_keeps_the_shell_going() {
    let temp_dir = generate_temp_directory();
    let log = temp_dir.path().join("log");
    let pipeline = vec!["true"; 100].join(" | ");
    let script = format!(
        "ulimit -n 64 && exec {} --log={} -c '{}; echo survived'",
        env!("CARGO_BIN_EXE_quash"),
        log.display(),
        pipeline
    );

    Assert::command(&["sh", "-c", script.as_str()])
        .stderr()
        .contains("quash: pipe: Too many open files")
        .stdout()
        .contains("survived")
        .exit_status_is(0)
        .unwrap();
}

#[test]
fn test_kill_unknown_job() {
    quash_command("kill 42")
        .stderr()
        .contains("42: no such job")
        .exit_status_is(1)
        .unwrap();
}

#[test]
fn test_command_not_found() {
    quash_command("quash-test-no-such-program")
        .stderr()
        .contains("quash-test-no-such-program: command not found")
        .exit_status_is(127)
        .unwrap();
}

#[test]
fn test_last_status_is_exit_status() {
    quash_command("sh -c 'exit 3'").exit_status_is(3).unwrap();
    quash_command("false | true").exit_status_is(0).unwrap();
}

#[test]
fn test_exit() {
    quash_command("exit; echo unreachable")
        .stdout()
        .doesnt_contain("unreachable")
        .exit_status_is(0)
        .unwrap();
}

#[test]
fn test_syntax_error() {
    quash_command("echo a |")
        .stderr()
        .contains("syntax error")
        .exit_status_is(2)
        .unwrap();
}

#[test]
fn test_script_file() {
    let temp_dir = generate_temp_directory();
    let script = temp_dir.path().join("script.qsh");
    fs::write(&script, "echo from script\nsh -c 'exit 5'\n").unwrap();

    Assert::cargo_binary("quash")
        .with_args(&[script.to_str().unwrap()])
        .stdout()
        .contains("from script")
        .exit_status_is(5)
        .unwrap();
}

#[test]
fn test_commands_from_stdin() {
    Assert::cargo_binary("quash")
        .stdin("echo piped in\nexit\n")
        .stdout()
        .contains("piped in")
        .unwrap();
}
