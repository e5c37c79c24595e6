//! Log streaming from the managed service's stdout/stderr to our tracing system.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

/// Log level for child output streams.
#[derive(Debug, Clone, Copy)]
enum LogLevel {
    Info,
    Warn,
}

/// Owns the reader tasks re-emitting child output line by line.
///
/// Lines are logged under the `service:stdout` and `service:stderr` targets
/// so they can be filtered with `RUST_LOG`.
pub(super) struct LogStreamHandler {
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl LogStreamHandler {
    pub(super) fn new(stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) -> Self {
        Self {
            stdout_task: stdout.map(|s| Self::spawn_reader(s, "stdout", LogLevel::Info)),
            stderr_task: stderr.map(|s| Self::spawn_reader(s, "stderr", LogLevel::Warn)),
        }
    }

    /// Strips ANSI escape codes from a string.
    ///
    /// The managed service colors its own log output; re-logging it verbatim
    /// would double-format it.
    fn strip_ansi_codes(text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            if c == '\x1b' {
                if chars.next() == Some('[') {
                    for next_char in chars.by_ref() {
                        if next_char == 'm' {
                            break;
                        }
                    }
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Spawns a task that reads from a pipe and logs each line until EOF.
    fn spawn_reader<R>(reader: R, stream: &'static str, level: LogLevel) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let clean_line = Self::strip_ansi_codes(&line);
                        match level {
                            LogLevel::Info => {
                                tracing::info!(target: "service:stdout", "{}", clean_line);
                            }
                            LogLevel::Warn => {
                                tracing::warn!(target: "service:stderr", "{}", clean_line);
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(stream, "Failed to read from child pipe: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!(stream, "Child pipe closed");
        })
    }

    /// Wait for both reader tasks to drain their pipes.
    pub(super) async fn shutdown(mut self) {
        for (stream, task) in [
            ("stdout", self.stdout_task.take()),
            ("stderr", self.stderr_task.take()),
        ] {
            if let Some(handle) = task
                && let Err(e) = handle.await
            {
                tracing::warn!(stream, "Child output reader task failed: {}", e);
            }
        }
    }
}

impl Drop for LogStreamHandler {
    fn drop(&mut self) {
        if let Some(handle) = self.stdout_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_task.take() {
            handle.abort();
        }
    }
}
