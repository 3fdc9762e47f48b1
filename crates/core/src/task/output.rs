use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 8 * 1024;

/// The retained head of one output stream and the size of the whole stream.
#[derive(Debug, Default)]
pub(crate) struct Captured {
    kept: Vec<u8>,
    total: usize,
}

/// A capture buffer filled by a reader task and taken by the waiter.
pub(crate) type SharedCapture = Arc<Mutex<Captured>>;

impl Captured {
    pub(crate) fn shared() -> SharedCapture {
        Arc::new(Mutex::new(Captured::default()))
    }

    /// Keep bytes up to `max`; count the rest and drop them.
    fn push(&mut self, chunk: &[u8], max: usize) {
        let room = max.saturating_sub(self.kept.len()).min(chunk.len());
        self.kept.extend_from_slice(&chunk[..room]);
        self.total += chunk.len();
    }

    pub(crate) fn take(shared: &SharedCapture) -> Captured {
        let mut guard = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    }

    fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Lossy UTF-8 text, with a marker when the stream outgrew the cap.
    fn text(&self) -> String {
        if self.total == self.kept.len() {
            return String::from_utf8_lossy(&self.kept).into_owned();
        }
        let end = complete_prefix(&self.kept);
        format!(
            "{}... [truncated, {} bytes total]",
            String::from_utf8_lossy(&self.kept[..end]),
            self.total
        )
    }
}

/// Length of `bytes` without a trailing char cut short by the cap.
fn complete_prefix(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let start = len - back;
        if bytes[start] & 0xC0 != 0x80 {
            return match std::str::from_utf8(&bytes[start..]) {
                Err(e) if e.error_len().is_none() => start,
                _ => len,
            };
        }
    }
    len
}

/// Read `reader` to EOF into `sink`, holding at most `max` bytes.
pub(crate) async fn capture<R>(mut reader: R, sink: SharedCapture, max: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(&buf[..n], max),
        }
    }
}

/// How a spawned command ended, as seen by its waiter task.
#[derive(Debug)]
pub(crate) enum Completion {
    Exited {
        status: ExitStatus,
        stdout: Captured,
        stderr: Captured,
    },
    TimedOut(Duration),
    WaitFailed(String),
}

/// Render a completion into the result string cached on the task.
pub(crate) fn render(completion: &Completion) -> String {
    match completion {
        Completion::Exited { status, stdout, stderr } => {
            if status.code() == Some(0) && stdout.is_empty() && stderr.is_empty() {
                return "Command executed successfully with no output.".to_owned();
            }
            let (stdout, stderr) = (stdout.text(), stderr.text());
            match status.code() {
                Some(0) => format!("STDOUT:\n{stdout}\nSTDERR:\n{stderr}"),
                Some(code) => {
                    format!("COMMAND FAILED with exit code {code}:\nSTDOUT:\n{stdout}\nSTDERR:\n{stderr}")
                }
                None => format!(
                    "COMMAND FAILED: terminated by signal\nSTDOUT:\n{stdout}\nSTDERR:\n{stderr}"
                ),
            }
        }
        Completion::TimedOut(after) => format!(
            "COMMAND FAILED: timed out after {}s and was terminated.",
            after.as_secs()
        ),
        Completion::WaitFailed(e) => format!("COMMAND FAILED: could not collect output: {e}"),
    }
}
