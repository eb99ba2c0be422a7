use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Semaphore;

use super::protocol::{invalid_json_line_error, read_line_bounded, read_stream_lossy_truncated};
use super::{SandboxError, SandboxExecutor, SandboxInput, SandboxOutput};

pub const WORKER_BINARY_NAME: &str = "office-password-worker";

const MAX_STDERR_BYTES: usize = 16 * 1024;
const STDERR_TRUNCATED_MARKER: &str = "\n[stderr truncated]\n";

/// Effective (already clamped) limits for [`ProcessSandbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSettings {
    pub worker_path: PathBuf,
    /// `0` disables the timeout guard.
    pub timeout_ms: u64,
    pub max_concurrency: usize,
    pub max_output_bytes: usize,
}

impl SandboxSettings {
    /// `office-password-worker` next to the running executable, or on `PATH` as a fallback.
    pub fn default_worker_path() -> PathBuf {
        let file_name = format!("{WORKER_BINARY_NAME}{}", std::env::consts::EXE_SUFFIX);
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
            .filter(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(file_name))
    }
}

/// Runs each request in a fresh `office-password-worker` child process.
///
/// A crash, hang or memory blow-up while parsing a hostile package takes down only the child.
/// At most `max_concurrency` children run at once.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    settings: Arc<SandboxSettings>,
    permits: Arc<Semaphore>,
}

impl ProcessSandbox {
    pub fn new(settings: SandboxSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            settings: Arc::new(settings),
            permits,
        }
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }
}

impl SandboxExecutor for ProcessSandbox {
    async fn execute(&self, input: SandboxInput) -> Result<SandboxOutput, SandboxError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::Closed)?;
        let settings = Arc::clone(&self.settings);
        // The permit lives with the blocking task: dropping this future does not stop the child.
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_worker(&settings, &input)
        })
        .await
        .map_err(|err| SandboxError::Task(err.to_string()))?
    }
}

/// Kills the child if it is still running after `timeout_ms`.
struct TimeoutGuard {
    done_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TimeoutGuard {
    fn new(timeout_ms: u64, child: Arc<Mutex<Child>>, timed_out: Arc<AtomicBool>) -> Self {
        if timeout_ms == 0 {
            return Self {
                done_tx: None,
                handle: None,
            };
        }
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            if rx.recv_timeout(Duration::from_millis(timeout_ms)).is_ok() {
                return;
            }
            timed_out.store(true, Ordering::SeqCst);
            if let Ok(mut child) = child.lock() {
                let _ = child.kill();
            }
        });
        Self {
            done_tx: Some(tx),
            handle: Some(handle),
        }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    settings: &SandboxSettings,
    input: &SandboxInput,
) -> Result<SandboxOutput, SandboxError> {
    debug!(
        "spawning office-password worker {:?} ({} bytes of input)",
        settings.worker_path,
        input.office_content.len()
    );

    let mut child = Command::new(&settings.worker_path)
        .arg("--max-input-bytes")
        .arg(settings.max_output_bytes.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SandboxError::Spawn {
            path: settings.worker_path.clone(),
            source,
        })?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (Some(mut stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(SandboxError::Protocol(
            "failed to open worker stdio pipes".to_string(),
        ));
    };

    let stderr_thread = thread::spawn(move || {
        read_stream_lossy_truncated(stderr, MAX_STDERR_BYTES, STDERR_TRUNCATED_MARKER)
            .unwrap_or_default()
    });

    let child = Arc::new(Mutex::new(child));
    let timed_out = Arc::new(AtomicBool::new(false));
    let timeout_guard = TimeoutGuard::new(settings.timeout_ms, child.clone(), timed_out.clone());

    // The worker reads its whole request before answering, so writing first cannot deadlock.
    let write_result = serde_json::to_writer(&mut stdin, input)
        .map_err(std::io::Error::from)
        .and_then(|()| stdin.write_all(b"\n"))
        .and_then(|()| stdin.flush());
    drop(stdin);

    let mut reader = BufReader::new(stdout);
    let line = read_line_bounded(&mut reader, settings.max_output_bytes);
    if line.is_err() {
        if let Ok(mut child) = child.lock() {
            let _ = child.kill();
        }
    }
    drop(reader);

    let status = child
        .lock()
        .map_err(|_| SandboxError::Protocol("worker process mutex poisoned".to_string()))?
        .wait()?;
    drop(timeout_guard);
    let stderr_text = stderr_thread.join().unwrap_or_default();

    let line = match line {
        Ok(Some(line)) if !line.trim().is_empty() => line,
        Ok(_) if timed_out.load(Ordering::SeqCst) => {
            return Err(SandboxError::Timeout {
                timeout_ms: settings.timeout_ms,
            })
        }
        Ok(_) => {
            // A failed write usually means the worker died early; its exit status says more.
            if let Err(err) = &write_result {
                debug!("writing office-password worker request failed: {err}");
            }
            warn!("office-password worker exited without a result ({status})");
            return Err(SandboxError::Crashed {
                status: status.to_string(),
                stderr: stderr_text,
            });
        }
        Err(err) => return Err(SandboxError::Protocol(err.to_string())),
    };

    serde_json::from_str(line.trim())
        .map_err(|err| SandboxError::Protocol(invalid_json_line_error(err, line.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(worker_path: PathBuf) -> SandboxSettings {
        SandboxSettings {
            worker_path,
            timeout_ms: 5_000,
            max_concurrency: 2,
            max_output_bytes: 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn missing_worker_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = ProcessSandbox::new(settings(dir.path().join("no-such-worker")));

        let err = sandbox
            .execute(SandboxInput::new("UEs=".to_string(), "pw"))
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, SandboxError::Spawn { .. }), "{err:?}");
    }

    #[test]
    fn default_worker_path_names_the_worker_binary() {
        let path = SandboxSettings::default_worker_path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(name.starts_with(WORKER_BINARY_NAME));
    }

    /// Writes an executable `/bin/sh` worker stand-in. `exec` keeps the killable pid the one
    /// holding stdout.
    #[cfg(unix)]
    fn shell_worker(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("worker.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write worker script");
        let mut permissions = std::fs::metadata(&path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).expect("chmod worker script");
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_worker_is_killed_at_the_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = settings(shell_worker(dir.path(), "exec sleep 30"));
        cfg.timeout_ms = 300;
        let sandbox = ProcessSandbox::new(cfg);

        let started = std::time::Instant::now();
        let err = sandbox
            .execute(SandboxInput::new("UEs=".to_string(), "pw"))
            .await
            .expect_err("timeout");

        assert!(
            matches!(err, SandboxError::Timeout { timeout_ms: 300 }),
            "{err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancelled_call_keeps_its_worker_slot_until_the_child_exits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("spawned.log");
        let body = format!("echo $$ >> '{}'\nexec sleep 2", log.display());
        let mut cfg = settings(shell_worker(dir.path(), &body));
        cfg.max_concurrency = 1;
        let sandbox = ProcessSandbox::new(cfg);

        for _ in 0..2 {
            let call = sandbox.execute(SandboxInput::new("UEs=".to_string(), "pw"));
            let cancelled = tokio::time::timeout(Duration::from_millis(200), call).await;
            assert!(cancelled.is_err(), "call should still be running");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let spawned = std::fs::read_to_string(&log).unwrap_or_default();
        assert_eq!(spawned.lines().count(), 1, "second worker started early: {spawned:?}");
        assert_eq!(sandbox.permits.available_permits(), 0);
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let mut cfg = settings(PathBuf::from("worker"));
        cfg.max_concurrency = 0;
        let sandbox = ProcessSandbox::new(cfg);
        assert_eq!(sandbox.permits.available_permits(), 1);
    }
}
