//! Integration tests for the work item state machine.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::{Local, TimeZone};
use hookwork::Error;
use hookwork::model::*;

fn new_item(name: &str) -> WorkItem {
    NewWorkItem::new(name, "/bin/true")
        .output_dir("/tmp/hookwork-test")
        .build()
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[test]
fn ids_are_unique_across_threads() {
    let handles: Vec<_> = (0..8)
        .map(|_| {
            thread::spawn(|| {
                (0..250)
                    .map(|_| new_item("concurrent").id())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), 2000);
}

#[test]
fn next_id_is_never_zero() {
    assert!(next_id() >= 1);
    assert!(WorkId::next().0 >= 1);
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn new_item_starts_idle() {
    let item = NewWorkItem::new("Deploy App", "/opt/hooks/deploy.sh")
        .payload(r#"{"ref":"main"}"#)
        .args(["--env", "prod"])
        .arg("--verbose")
        .timeout(30)
        .build();

    assert_eq!(item.status(), WorkStatus::Idle);
    assert!(!item.is_terminated());
    assert!(item.error().is_none());
    assert_eq!(item.name(), "Deploy App");
    assert_eq!(item.script(), std::path::Path::new("/opt/hooks/deploy.sh"));
    assert_eq!(item.payload(), r#"{"ref":"main"}"#);
    assert_eq!(item.args(), ["--env", "prod", "--verbose"]);
    assert_eq!(item.timeout(), 30);
    assert!(!item.sink().is_closed());
}

#[test]
fn file_names_follow_layout() {
    let at = Local.with_ymd_and_hms(2026, 10, 16, 8, 7, 0).single().unwrap();
    let item = NewWorkItem::new("deployApp", "/bin/true")
        .output_dir("/srv/hooks")
        .created_at(at)
        .build();

    let expected = format!("/srv/hooks/deploy_app_{}_20261016_0807", item.id());
    assert_eq!(item.arg_file().to_str().unwrap(), format!("{expected}.arg"));
    assert_eq!(item.log_file().to_str().unwrap(), format!("{expected}.txt"));
}

#[test]
fn same_name_same_minute_never_collides() {
    let at = Local.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).single().unwrap();
    let a = NewWorkItem::new("echo", "/bin/true").created_at(at).build();
    let b = NewWorkItem::new("echo", "/bin/true").created_at(at).build();

    assert_ne!(a.id(), b.id());
    assert_ne!(a.log_file(), b.log_file());
    assert_ne!(a.arg_file(), b.arg_file());
    assert_eq!(a.log_file().parent(), b.log_file().parent());
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[test]
fn terminate_success() {
    let item = new_item("ok");
    item.mark_running().unwrap();
    assert_eq!(item.status(), WorkStatus::Running);
    assert!(!item.is_terminated());

    item.terminate(Ok(())).unwrap();

    assert_eq!(item.status(), WorkStatus::Success);
    assert!(item.is_terminated());
    assert!(item.error().is_none());
}

#[test]
fn terminate_error_stores_and_returns_error() {
    let item = new_item("fail");
    item.mark_running().unwrap();

    let err = ExecutionError::Exit { code: 2 };
    let result = item.terminate(Err(err.clone()));

    match result {
        Err(Error::Execution(returned)) => assert_eq!(returned, err),
        other => panic!("expected Execution error, got {other:?}"),
    }
    assert_eq!(item.status(), WorkStatus::Error(err.clone()));
    assert_eq!(item.error(), Some(err));
    assert!(item.is_terminated());
}

#[test]
fn terminate_from_idle_is_allowed() {
    let item = new_item("never-started");
    item.terminate(Err(ExecutionError::Spawn("no such file".into())))
        .unwrap_err();
    assert!(item.is_terminated());
}

#[test]
fn second_terminate_is_rejected_and_first_outcome_kept() {
    let item = new_item("twice");
    item.terminate(Ok(())).unwrap();

    let result = item.terminate(Err(ExecutionError::Other("late failure".into())));
    match result {
        Err(Error::AlreadyTerminated { id, status }) => {
            assert_eq!(id, item.id());
            assert_eq!(status, WorkStatus::Success);
        }
        other => panic!("expected AlreadyTerminated, got {other:?}"),
    }
    assert_eq!(item.status(), WorkStatus::Success);
    assert!(item.error().is_none());
}

#[test]
fn mark_running_only_from_idle() {
    let item = new_item("start");
    item.mark_running().unwrap();

    let err = item.mark_running().unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition { ref from, ref to } if from == "running" && to == "running"
    ));

    item.terminate(Ok(())).unwrap();
    assert!(matches!(
        item.mark_running(),
        Err(Error::InvalidTransition { .. })
    ));
    assert_eq!(item.status(), WorkStatus::Success);
}

#[test]
fn terminate_closes_sink() {
    let item = new_item("sink");
    item.terminate(Ok(())).unwrap();
    assert!(item.sink().is_closed());
    assert_eq!(item.sink().publish(b"late".to_vec()), 0);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn readers_never_see_torn_status() {
    let items: Vec<Arc<WorkItem>> = (0..64).map(|_| Arc::new(new_item("race"))).collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let items = items.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    for item in &items {
                        let terminated = item.is_terminated();
                        let status = item.status();
                        // Terminal status never reverts.
                        if terminated {
                            assert!(status.is_terminal());
                        }
                        if let WorkStatus::Error(e) = status {
                            assert_eq!(e, ExecutionError::Timeout { seconds: 1 });
                        }
                    }
                }
            })
        })
        .collect();

    let writer = {
        let items = items.clone();
        thread::spawn(move || {
            for (i, item) in items.iter().enumerate() {
                item.mark_running().unwrap();
                if i % 2 == 0 {
                    item.terminate(Ok(())).unwrap();
                } else {
                    item.terminate(Err(ExecutionError::Timeout { seconds: 1 }))
                        .unwrap_err();
                }
            }
        })
    };

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    for (i, item) in items.iter().enumerate() {
        assert!(item.is_terminated());
        assert_eq!(item.error().is_some(), i % 2 == 1);
    }
}

#[test]
fn concurrent_terminate_has_exactly_one_winner() {
    let item = Arc::new(new_item("contended"));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let item = Arc::clone(&item);
            thread::spawn(move || {
                let outcome = if i % 2 == 0 {
                    Ok(())
                } else {
                    Err(ExecutionError::Exit { code: i })
                };
                item.terminate(outcome)
            })
        })
        .collect();

    let rejected = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| matches!(r, Err(Error::AlreadyTerminated { .. })))
        .count();

    assert_eq!(rejected, 7);
    assert!(item.is_terminated());
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[test]
fn snapshot_serializes_status_and_error() {
    let item = new_item("snap");
    item.terminate(Err(ExecutionError::Exit { code: 3 }))
        .unwrap_err();

    let json = serde_json::to_value(item.snapshot()).unwrap();
    assert_eq!(json["id"], item.id().0);
    assert_eq!(json["name"], "snap");
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"]["kind"], "exit");
    assert_eq!(json["error"]["detail"]["code"], 3);
    assert!(json["log_file"].is_string());

    let back: WorkSnapshot = serde_json::from_value(json).unwrap();
    assert_eq!(back, item.snapshot());
}

#[test]
fn snapshot_of_idle_item_has_no_error_key() {
    let item = new_item("fresh");

    let json = serde_json::to_value(item.snapshot()).unwrap();
    assert_eq!(json["status"], "idle");
    assert!(json.get("error").is_none(), "unexpected error key: {json}");
}

#[test]
fn error_outcome_is_logged_at_info() {
    let buf = Arc::new(std::sync::Mutex::new(Vec::new()));
    let writer = {
        let buf = buf.clone();
        move || CapturedLog(buf.clone())
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(writer)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let item = new_item("quiet fail");
        item.terminate(Err(ExecutionError::Exit { code: 1 }))
            .unwrap_err();
    });

    let output = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
    let line = output
        .lines()
        .find(|l| l.contains("done [ERROR]"))
        .unwrap_or_else(|| panic!("no [ERROR] line in: {output}"));
    assert!(line.contains("INFO"), "wrong level: {line}");
    assert!(!line.contains("WARN"), "wrong level: {line}");
    assert!(line.contains("script exited with status 1"), "{line}");
}

struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLog {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn status_display() {
    assert_eq!(WorkStatus::Idle.to_string(), "idle");
    assert_eq!(WorkStatus::Running.to_string(), "running");
    assert_eq!(WorkStatus::Success.to_string(), "success");
    assert_eq!(
        WorkStatus::Error(ExecutionError::Signal).to_string(),
        "error"
    );
    assert_eq!(
        ExecutionError::Timeout { seconds: 5 }.to_string(),
        "script timed out after 5s"
    );
}
