//! One-shot recipe process invocation.
//!
//! The child's pipes are drained on background tasks while the caller waits
//! on exit, the deadline and cancellation. On an early return the child is
//! killed and reaped and the readers are aborted.

use super::ExecutionError;
use crate::recipe::RecipeManifest;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Stderr is only used for error messages and logs
const MAX_STDERR_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

type Reader = JoinHandle<std::io::Result<Captured>>;
type Joined = Result<std::io::Result<Captured>, JoinError>;

enum Wait {
    Exited(std::io::Result<ExitStatus>),
    Drained(Joined, Joined),
    Cancelled,
    TimedOut,
}

struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

/// Run `manifest` once with `query`, bounded by `timeout` and `cancel`.
pub(crate) async fn run(
    manifest: &RecipeManifest,
    query: &str,
    timeout: Duration,
    max_output_bytes: usize,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ExecutionError> {
    if cancel.is_cancelled() {
        return Err(ExecutionError::Superseded);
    }

    let deadline = Instant::now() + timeout;
    let invocation = &manifest.invocation;
    let stdin_payload = invocation.stdin_payload(query);

    let mut child = Command::new(&invocation.program)
        .args(invocation.arguments(query))
        .current_dir(&manifest.path)
        .stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ExecutionError::Launch(format!("{}: {}", invocation.program.display(), e))
        })?;

    debug!(
        "[{}] Spawned pid {:?} for query {:?}",
        manifest.id,
        child.id(),
        query
    );

    if let (Some(payload), Some(mut stdin)) = (stdin_payload, child.stdin.take()) {
        let payload = payload.to_vec();
        let recipe_id = manifest.id.clone();
        tokio::spawn(async move {
            // Dropping stdin afterwards signals EOF
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("[{}] Failed to write query to stdin: {}", recipe_id, e);
            }
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecutionError::Launch("Failed to get stdout handle".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExecutionError::Launch("Failed to get stderr handle".to_string()))?;

    let mut stdout_task = tokio::spawn(capture(stdout, max_output_bytes));
    let mut stderr_task = tokio::spawn(capture(stderr, MAX_STDERR_BYTES));

    let waited = tokio::select! {
        biased;
        () = cancel.cancelled() => Wait::Cancelled,
        () = tokio::time::sleep_until(deadline) => Wait::TimedOut,
        status = child.wait() => Wait::Exited(status),
    };

    let status = match waited {
        Wait::Exited(status) => status.map_err(|e| {
            abort_readers(&stdout_task, &stderr_task);
            ExecutionError::Launch(format!("wait failed: {e}"))
        })?,
        Wait::Cancelled => {
            terminate(&manifest.id, &mut child).await;
            abort_readers(&stdout_task, &stderr_task);
            return Err(ExecutionError::Superseded);
        }
        Wait::TimedOut | Wait::Drained(..) => {
            warn!("[{}] Timed out after {:?}", manifest.id, timeout);
            terminate(&manifest.id, &mut child).await;
            abort_readers(&stdout_task, &stderr_task);
            return Err(ExecutionError::Timeout);
        }
    };

    // A grandchild can keep the pipes open after the recipe exits
    let drained = tokio::select! {
        biased;
        () = cancel.cancelled() => Wait::Cancelled,
        () = tokio::time::sleep_until(deadline) => Wait::TimedOut,
        (stdout, stderr) = async { ((&mut stdout_task).await, (&mut stderr_task).await) } => {
            Wait::Drained(stdout, stderr)
        }
    };
    let (stdout, stderr) = match drained {
        Wait::Drained(stdout, stderr) => (stdout, stderr),
        Wait::Cancelled => {
            abort_readers(&stdout_task, &stderr_task);
            return Err(ExecutionError::Superseded);
        }
        Wait::TimedOut | Wait::Exited(_) => {
            warn!("[{}] Output pipes still open at deadline", manifest.id);
            abort_readers(&stdout_task, &stderr_task);
            return Err(ExecutionError::Timeout);
        }
    };

    let stdout = stdout
        .map_err(|e| ExecutionError::Launch(format!("stdout reader failed: {e}")))?
        .map_err(|e| ExecutionError::Launch(format!("failed to read stdout: {e}")))?;
    let stderr = stderr
        .ok()
        .and_then(Result::ok)
        .map(|c| c.bytes)
        .unwrap_or_default();

    for line in String::from_utf8_lossy(&stderr).lines() {
        debug!("[{}] stderr: {}", manifest.id, line);
    }

    if stdout.overflowed {
        return Err(ExecutionError::Parse {
            reason: format!("stdout exceeded {max_output_bytes} bytes"),
        });
    }

    Ok(ProcessOutput {
        status,
        stdout: stdout.bytes,
        stderr,
    })
}

/// Read up to `limit` bytes, then keep draining so the child never blocks on a full pipe.
async fn capture<R>(mut reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let limit_plus_one = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    (&mut reader).take(limit_plus_one).read_to_end(&mut bytes).await?;

    let overflowed = bytes.len() > limit;
    if overflowed {
        bytes.truncate(limit);
        tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    }
    Ok(Captured { bytes, overflowed })
}

/// Kill and reap the child.
async fn terminate(recipe_id: &str, child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.kill().await {
        warn!("[{}] Failed to kill pid {:?}: {}", recipe_id, pid, e);
    } else {
        debug!("[{}] Killed pid {:?}", recipe_id, pid);
    }
}

fn abort_readers(stdout_task: &Reader, stderr_task: &Reader) {
    stdout_task.abort();
    stderr_task.abort();
}

/// Error message for a non-zero exit: trimmed stderr, or the exit code.
pub(crate) fn describe_failure(output: &ProcessOutput) -> String {
    const MAX_MESSAGE_CHARS: usize = 500;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.chars().take(MAX_MESSAGE_CHARS).collect();
    }

    match output.status.code() {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}
