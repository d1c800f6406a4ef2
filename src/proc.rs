use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::ProcessError;

/// Per-stage subprocess deadlines.
pub const DECODER_TIMEOUT: Duration = Duration::from_secs(600);
pub const RENDERER_TIMEOUT: Duration = Duration::from_secs(1800);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run an external tool to completion, capturing stdout and stderr.
///
/// Both pipes are drained on reader threads so a chatty child can never
/// deadlock against a full pipe. Once `timeout` elapses the child is killed
/// and the stage surfaces as `TimeoutError`.
pub fn run_with_timeout(
    stage: &'static str,
    mut cmd: Command,
    timeout: Duration,
) -> Result<ToolOutput, ProcessError> {
    log::debug!("{stage}: {cmd:?}");

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    let mut stdout_pipe = child.stdout.take();
    let stdout_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stdout_pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });

    let mut stderr_pipe = child.stderr.take();
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stderr_pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    });

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::Timeout {
                stage,
                seconds: timeout.as_secs(),
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}

/// Trim a tool's stderr down to something worth putting in an error message.
pub fn summarize_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "no diagnostic output".into();
    }
    // Last few lines carry the actual failure with ffmpeg/ffprobe.
    let lines: Vec<&str> = trimmed.lines().rev().take(4).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_empty_stderr() {
        assert_eq!(summarize_stderr("  \n"), "no diagnostic output");
    }

    #[test]
    fn keeps_trailing_lines() {
        let s = "a\nb\nc\nd\ne\nf";
        assert_eq!(summarize_stderr(s), "c | d | e | f");
    }
}
