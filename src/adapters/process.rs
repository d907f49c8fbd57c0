//! Child-process supervision for tool-backed adapters.
//!
//! External converters have no cooperative cancel hook, so the only way to
//! stop one is to kill it. [`run_tool`] waits on the child and the job's
//! cancellation token together; on cancellation it kills the child and
//! reaps it before returning, so no zombie outlives the job.

use crate::error::AdapterError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bytes of stderr kept for error messages (the tail).
const STDERR_TAIL_BYTES: usize = 4 * 1024;

/// Spawn `cmd`, wait for it, and map its exit into an adapter result.
pub(crate) async fn run_tool(
    adapter: &'static str,
    tool: &Path,
    hint: &str,
    mut cmd: Command,
    cancel: &CancellationToken,
) -> Result<(), AdapterError> {
    let tool_name = tool.display().to_string();
    if cancel.is_cancelled() {
        return Err(AdapterError::Cancelled { adapter });
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(adapter, command = ?cmd.as_std(), "Spawning converter");
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AdapterError::ToolMissing {
                tool: tool_name.clone(),
                hint: hint.to_string(),
            }
        } else {
            AdapterError::Io {
                path: tool.to_path_buf(),
                source: e,
            }
        }
    })?;

    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        match stderr {
            Some(s) => read_tail(s).await,
            None => String::new(),
        }
    });

    let status = tokio::select! {
        status = child.wait() => status.map_err(|e| AdapterError::Io {
            path: tool.to_path_buf(),
            source: e,
        })?,
        _ = cancel.cancelled() => {
            warn!(adapter, pid = ?child.id(), "Cancelled, killing converter");
            let _ = child.start_kill();
            let _ = child.wait().await;
            stderr_task.abort();
            return Err(AdapterError::Cancelled { adapter });
        }
    };

    let stderr = stderr_task.await.unwrap_or_default();
    if status.success() {
        Ok(())
    } else {
        Err(AdapterError::ToolFailed {
            tool: tool_name,
            status: status.to_string(),
            stderr: if stderr.is_empty() {
                "(no output)".to_string()
            } else {
                stderr
            },
        })
    }
}

/// Read a stream to the end, keeping only the last [`STDERR_TAIL_BYTES`].
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    let excess = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}
