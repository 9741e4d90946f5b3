//! Script runner: executes a work item's script and retires the item.
//!
//! The runner is the only writer of a work item's files. It writes the
//! arguments to the `.arg` file, then runs the script with stdout and
//! stderr captured line by line into the `.txt` log and the message
//! sink. The item's `timeout` bounds the whole run.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{Instrument, debug, info, warn};

use crate::error::Result;
use crate::model::{ExecutionError, WorkItem};
use crate::telemetry::metrics;

type Outcome = std::result::Result<(), ExecutionError>;

/// Run the item's script to completion and terminate the item with the
/// outcome.
///
/// Fails without running anything if the item is not idle. Otherwise the
/// result is the one returned by [`WorkItem::terminate`]: `Ok(())` on
/// success, [`crate::Error::Execution`] on failure.
pub async fn run(item: &WorkItem) -> Result<()> {
    let span = item.span().clone();
    async {
        item.mark_running()?;

        let started = Instant::now();
        let outcome = execute(item).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let result = if outcome.is_ok() { "success" } else { "error" };
        metrics::script_duration_ms().record(elapsed_ms, &[KeyValue::new("result", result)]);
        debug!(duration_ms = elapsed_ms, result, "script finished");

        item.terminate(outcome)
    }
    .instrument(span)
    .await
}

async fn execute(item: &WorkItem) -> Outcome {
    if let Some(dir) = item.log_file().parent() {
        tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
    }
    tokio::fs::write(item.arg_file(), arg_file_content(item.args()))
        .await
        .map_err(io_error)?;
    let log = File::create(item.log_file()).await.map_err(io_error)?;

    info!(
        script = %item.script().display(),
        timeout_secs = item.timeout(),
        log_file = %item.log_file().display(),
        "running hook script"
    );

    let mut child = Command::new(item.script())
        .args(item.args())
        .env("HOOK_ID", item.id().to_string())
        .env("HOOK_NAME", item.name())
        .env("HOOK_PAYLOAD", item.payload())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecutionError::Spawn(format!("{}: {e}", item.script().display())))?;

    // Feed the payload from a separate task so a script that never reads
    // stdin cannot stall the output pump.
    if let Some(mut stdin) = child.stdin.take() {
        let payload = item.payload().as_bytes().to_vec();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("payload not fully written to stdin: {e}");
            }
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecutionError::Io("stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExecutionError::Io("stderr not captured".to_string()))?;

    let budget = Duration::from_secs(item.timeout());
    let waited =
        tokio::time::timeout(budget, pump_and_wait(item, &mut child, stdout, stderr, log)).await;

    match waited {
        Ok(status) => exit_outcome(status?),
        Err(_) => {
            warn!(timeout_secs = item.timeout(), "script timed out, killing it");
            if let Err(e) = child.kill().await {
                warn!("failed to kill timed out script: {e}");
            }
            Err(ExecutionError::Timeout {
                seconds: item.timeout(),
            })
        }
    }
}

/// Copy every output line to the log file and the sink until both
/// streams close, then reap the child.
async fn pump_and_wait(
    item: &WorkItem,
    child: &mut Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    mut log: File,
) -> std::result::Result<ExitStatus, ExecutionError> {
    let mut out = BufReader::new(stdout).split(b'\n');
    let mut err = BufReader::new(stderr).split(b'\n');
    let (mut out_open, mut err_open) = (true, true);
    let mut lines = 0usize;

    while out_open || err_open {
        let segment = tokio::select! {
            segment = out.next_segment(), if out_open => {
                let segment = segment.map_err(io_error)?;
                out_open = segment.is_some();
                segment
            }
            segment = err.next_segment(), if err_open => {
                let segment = segment.map_err(io_error)?;
                err_open = segment.is_some();
                segment
            }
        };

        if let Some(mut line) = segment {
            line.push(b'\n');
            log.write_all(&line).await.map_err(io_error)?;
            log.flush().await.map_err(io_error)?;
            item.sink().publish(line);
            lines += 1;
        }
    }

    log.sync_all().await.map_err(io_error)?;
    debug!(lines, "script output captured");

    child.wait().await.map_err(io_error)
}

fn exit_outcome(status: ExitStatus) -> Outcome {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ExecutionError::Exit { code }),
        None => Err(ExecutionError::Signal),
    }
}

fn arg_file_content(args: &[String]) -> String {
    let mut content = String::new();
    for arg in args {
        content.push_str(arg);
        content.push('\n');
    }
    content
}

fn io_error(e: std::io::Error) -> ExecutionError {
    ExecutionError::Io(e.to_string())
}
