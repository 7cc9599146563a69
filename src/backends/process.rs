use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use super::decoder::StreamDecoder;
use crate::constants::PROCESS_READ_CHUNK_BYTES;

/// Everything needed to launch one backend command
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// Command line for diagnostics and metadata
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Output of a buffered run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run a command to completion, buffering stdout and stderr.
///
/// Output is trimmed. Fails if the process cannot be started or the
/// deadline passes; in the latter case the child is killed first.
pub async fn run_buffered(spec: &CommandSpec) -> Result<ProcessOutput> {
    let mut child = spawn(spec)?;
    let mut group = GroupKill::new(&child);
    let stdout = child
        .stdout
        .take()
        .context("Process stdout stream not available. This is likely a bug.")?;
    let stderr = child
        .stderr
        .take()
        .context("Process stderr stream not available. This is likely a bug.")?;

    let result = timeout(spec.timeout, async {
        let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));
        let status = child
            .wait()
            .await
            .context("Failed to wait for process to complete")?;
        Ok::<_, anyhow::Error>(ProcessOutput {
            stdout: stdout?.trim().to_string(),
            stderr: stderr?.trim().to_string(),
            exit_code: status.code().unwrap_or(-1),
        })
    })
    .await;

    finish(&mut child, &mut group, spec, result).await
}

/// Run a command, feeding stdout through a [`StreamDecoder`] as it arrives.
///
/// The returned `stdout` holds the decoded text, trimmed.
pub async fn run_streaming(spec: &CommandSpec) -> Result<ProcessOutput> {
    let mut child = spawn(spec)?;
    let mut group = GroupKill::new(&child);
    let stdout = child
        .stdout
        .take()
        .context("Process stdout stream not available. This is likely a bug.")?;
    let stderr = child
        .stderr
        .take()
        .context("Process stderr stream not available. This is likely a bug.")?;

    let result = timeout(spec.timeout, async {
        let (decoded, stderr) = tokio::join!(decode_stream(stdout), read_all(stderr));
        let status = child
            .wait()
            .await
            .context("Failed to wait for process to complete")?;
        Ok::<_, anyhow::Error>(ProcessOutput {
            stdout: decoded?.trim().to_string(),
            stderr: stderr?.trim().to_string(),
            exit_code: status.code().unwrap_or(-1),
        })
    })
    .await;

    finish(&mut child, &mut group, spec, result).await
}

fn spawn(spec: &CommandSpec) -> Result<Child> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Cancelling the dispatch future must not leave the child behind
        .kill_on_drop(true);

    // Own process group, so a timeout also reaches the child's descendants
    #[cfg(unix)]
    cmd.process_group(0);

    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    cmd.spawn().map_err(|e| spawn_error(&spec.program, e))
}

/// Spawn errors carry the errno-style token the classifier looks for
fn spawn_error(program: &str, error: std::io::Error) -> anyhow::Error {
    let detail = match error.kind() {
        ErrorKind::NotFound => format!("command not found: {} (ENOENT)", program),
        ErrorKind::PermissionDenied => format!("permission denied: {} (EACCES)", program),
        _ => format!("failed to spawn {}", program),
    };
    anyhow!(error).context(detail)
}

async fn finish(
    child: &mut Child,
    group: &mut GroupKill,
    spec: &CommandSpec,
    result: std::result::Result<Result<ProcessOutput>, tokio::time::error::Elapsed>,
) -> Result<ProcessOutput> {
    match result {
        Ok(output) => {
            // leader already reaped; its pgid may be reused
            group.disarm();
            output
        }
        Err(_) => {
            // signal the group before the leader is reaped
            group.kill();
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill timed out process {}: {}", spec.program, e);
            }
            anyhow::bail!(
                "{}: process timeout after {} ms",
                spec.program,
                spec.timeout.as_millis()
            )
        }
    }
}

/// Kills the child's process group when dropped, unless disarmed.
///
/// Covers the timeout path and a dispatch future dropped mid-run, where
/// `kill_on_drop` alone would only reach the direct child.
struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    fn new(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this child
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        tracing::debug!(
            "killpg({}) failed: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Result<String> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .await
        .context("Error reading process output")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn decode_stream<R: AsyncRead + Unpin>(mut reader: R) -> Result<String> {
    let mut decoder = StreamDecoder::new();
    let mut buf = vec![0u8; PROCESS_READ_CHUNK_BYTES];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .context("Error reading process output")?;
        if n == 0 {
            break;
        }
        decoder.feed(&buf[..n]);
    }
    Ok(decoder.finish())
}
