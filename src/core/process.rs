//! Helpers shared by the stages that drive external tools.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long a child gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Stop a child that may still be running and reap it.
///
/// On unix the child is asked to stop with SIGTERM first; anything still
/// alive after the grace period is killed.
pub async fn terminate(child: &mut Child, name: &str) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        debug!(program = name, pid, "Sending SIGTERM");
        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
            && tokio::time::timeout(TERMINATE_GRACE, child.wait())
                .await
                .is_ok()
        {
            return;
        }
    }

    warn!(program = name, "Killing child process");
    if let Err(e) = child.kill().await {
        warn!(program = name, error = %e, "Failed to kill child process");
    }
}

/// Read `reader` line by line on a background task, handing each non-empty
/// line to `on_line`. Both `\n` and `\r` end a line.
pub fn spawn_line_reader<R, F>(reader: R, mut on_line: F) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: FnMut(String) + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    for line in text.split(['\r', '\n']) {
                        let line = line.trim_end();
                        if !line.is_empty() {
                            on_line(line.to_string());
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Stopped reading child output");
                    break;
                }
            }
        }
    })
}
