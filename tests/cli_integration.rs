// CLI integration tests: drive the built binary over stdin/stdout.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_evcmd");
    Command::new(exe)
}

fn demo_plugins() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join("plugins")
}

fn session(plugin_dir: &Path, input: &str) -> Output {
    let mut child = cmd()
        .arg(plugin_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    // The interpreter may exit before reading (fatal startup), so a broken pipe is fine here.
    let _ = child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input.as_bytes());
    child.wait_with_output().expect("wait")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn click_event_then_handler() {
    let output = session(
        &demo_plugins(),
        "EVENT {\"type\":\"click\",\"x\":1}\nCMD isClick\n",
    );
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["RESP True"]);
}

#[test]
fn cmd_without_event() {
    let output = session(&demo_plugins(), "CMD anything\n");
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["ERR No event set"]);
}

#[test]
fn full_protocol_transcript() {
    let input = concat!(
        "EVENT bad-json\n",
        "EVENT {\"uid\":0,\"user\":\"root\",\"tags\":[]}\n",
        "CMD isRoot\n",
        "CMD isRoot\n",
        "cmd hasUser extra tokens\n",
        "CMD firstTag\n",
        "CMD isroot\n",
        "EVENT {\"uid\":1000} trailing\n",
        "CMD isRoot\n",
        "EVENT {\"uid\":1000}\n",
        "CMD isRoot\n",
        "PING\n",
    );
    let output = session(&demo_plugins(), input);
    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output),
        vec![
            "ERR invalid event payload",
            "RESP True",
            "RESP True",
            "RESP True",
            "RESP None",
            "ERR No such method",
            "ERR invalid command format",
            "RESP True",
            "RESP False",
            "ERR Command not understood",
        ]
    );
}

#[test]
fn handler_runtime_error_reports_no_such_method() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        temp.path().join("math.json"),
        r#"{"handlers":{"broken":".x + \"suffix\""}}"#,
    )
    .expect("write plugin");

    let output = session(temp.path(), "EVENT {\"x\":1}\nCMD broken\n");
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["ERR No such method"]);
}

#[test]
fn later_unit_wins_name_collision() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("10-base.json"), r#"{"handlers":{"check":"true"}}"#)
        .expect("write plugin");
    std::fs::write(temp.path().join("20-override.json"), r#"{"handlers":{"check":"false"}}"#)
        .expect("write plugin");

    let output = session(temp.path(), "EVENT {}\nCMD check\n");
    assert_eq!(stdout_lines(&output), vec!["RESP False"]);
}

#[test]
fn list_handlers_prints_sorted_names() {
    let output = cmd()
        .arg(demo_plugins())
        .arg("--list-handlers")
        .output()
        .expect("list");
    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output),
        vec![
            "firstTag",
            "hasUser",
            "inTopLeft",
            "isClick",
            "isDoubleClick",
            "isExec",
            "isRoot",
        ]
    );
}

#[test]
fn missing_plugin_directory_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = session(&temp.path().join("absent"), "CMD anything\n");
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr.lines().last().expect("error line");
    let value: Value = serde_json::from_str(line).expect("json error");
    assert_eq!(value["error"]["kind"], "NotFound");
    assert!(value["error"]["hint"].as_str().is_some());
}

#[test]
fn broken_plugin_unit_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("bad.json"), r#"{"handlers":{"x":".a =="}}"#)
        .expect("write plugin");

    let output = session(temp.path(), "EVENT {}\n");
    assert_eq!(output.status.code(), Some(6));
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_argument_is_usage_error() {
    let output = cmd().output().expect("run");
    assert_eq!(output.status.code(), Some(2));
}
