// Worker client against the real interpreter binary.
use std::path::{Path, PathBuf};

use evcmd::core::error::ErrorKind;
use evcmd::protocol::Outcome;
use evcmd::worker::ScriptWorker;
use serde_json::json;

fn demo_plugins() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join("plugins")
}

fn worker() -> ScriptWorker {
    ScriptWorker::spawn(env!("CARGO_BIN_EXE_evcmd"), [demo_plugins()]).expect("spawn worker")
}

#[test]
fn runs_handlers_across_events() {
    let mut worker = worker();

    let click = json!({"type": "click", "x": 10, "y": 20, "count": 2});
    assert_eq!(worker.run("isClick", &click).unwrap(), Outcome::True);
    assert_eq!(worker.run("isDoubleClick", &click).unwrap(), Outcome::True);
    assert_eq!(worker.run("inTopLeft", &click).unwrap(), Outcome::True);

    let audit = json!({"syscall": "openat", "uid": 1000, "tags": []});
    assert_eq!(worker.run("isClick", &audit).unwrap(), Outcome::False);
    assert_eq!(worker.run("isExec", &audit).unwrap(), Outcome::False);
    assert_eq!(worker.run("firstTag", &audit).unwrap(), Outcome::None);

    assert!(worker.finish().expect("finish").success());
}

#[test]
fn unknown_handler_surfaces_remote_error() {
    let mut worker = worker();
    let err = worker.run("noSuchHandler", &json!({"type": "click"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Handler);
    assert_eq!(err.message(), Some("No such method"));
    assert_eq!(err.handler(), Some("noSuchHandler"));

    // The interpreter keeps serving after an error line.
    assert_eq!(
        worker.run("isRoot", &json!({"uid": 0})).unwrap(),
        Outcome::True
    );
    assert!(worker.finish().expect("finish").success());
}

#[test]
fn whitespace_payload_never_reaches_the_interpreter() {
    let mut worker = worker();
    let err = worker
        .run("isClick", &json!({"type": "double click"}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    assert_eq!(
        worker.run("isClick", &json!({"type": "click"})).unwrap(),
        Outcome::True
    );
    assert!(worker.finish().expect("finish").success());
}

#[test]
fn interpreter_startup_failure_closes_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut worker = ScriptWorker::spawn(env!("CARGO_BIN_EXE_evcmd"), [temp.path().join("absent")])
        .expect("spawn worker");
    let err = worker.run("isClick", &json!({})).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Io));
    let status = worker.finish().expect("finish");
    assert_eq!(status.code(), Some(3));
}
