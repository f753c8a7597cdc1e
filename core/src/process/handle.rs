use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
    time::Duration,
};

use nix::{
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use tokio::process::Child;

use super::error::{Error, Result};
use super::sink::LogPump;

/// One external process running in its own process group, together with the
/// pumps capturing its output streams.
///
/// Dropping a handle whose exit was never observed terminates the group.
#[derive(Debug)]
pub struct ProcessHandle {
    program: String,
    pgid: Pid,
    child: Child,
    status: Option<ExitStatus>,
    stdout: Option<LogPump>,
    stderr: Option<LogPump>,
    stdout_log: Option<PathBuf>,
    drain_grace: Duration,
}

impl ProcessHandle {
    pub(super) fn new(
        program: String,
        child: Child,
        pgid: Pid,
        stdout: Option<LogPump>,
        stderr: Option<LogPump>,
        drain_grace: Duration,
    ) -> Self {
        Self {
            program,
            pgid,
            child,
            status: None,
            stdout_log: stdout.as_ref().map(|p| p.path().to_owned()),
            stdout,
            stderr,
            drain_grace,
        }
    }

    /// `None` when stdout was redirected to a caller-provided file.
    pub fn stdout_log(&self) -> Option<&Path> {
        self.stdout_log.as_deref()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Non-blocking exit check.
    pub fn try_exited(&mut self) -> Option<ExitStatus> {
        if self.status.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.status = status,
                Err(e) => log::debug!("try_wait on '{}' failed: {}", self.program, e),
            }
        }
        self.status
    }

    /// Waits at most `limit` for the process to exit on its own.
    pub async fn wait_for(&mut self, limit: Duration) -> Option<ExitStatus> {
        if self.status.is_some() {
            return self.status;
        }
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => self.status = Some(status),
            Ok(Err(e)) => log::debug!("wait on '{}' failed: {}", self.program, e),
            Err(_) => {}
        }
        self.status
    }

    /// Blocks until exit or until `timeout` elapses.
    ///
    /// Sinks are closed on every path. On timeout the whole process group is
    /// sent SIGTERM after the sinks are closed.
    pub async fn run_to_completion(&mut self, timeout: Option<Duration>) -> Result<Option<i32>> {
        let waited = match timeout {
            Some(limit) => {
                let res = tokio::time::timeout(limit, self.child.wait()).await;
                match res {
                    Ok(waited) => waited,
                    Err(_) => {
                        self.close_sinks().await;
                        self.terminate();
                        return Err(Error::TimedOut {
                            program: self.program.clone(),
                            timeout: limit,
                        });
                    }
                }
            }
            None => self.child.wait().await,
        };

        let status = match waited {
            Ok(status) => status,
            Err(source) => {
                self.close_sinks().await;
                self.terminate();
                return Err(Error::Wait {
                    program: self.program.clone(),
                    source,
                });
            }
        };
        self.status = Some(status);
        self.close_sinks().await;
        Ok(status.code())
    }

    /// Best-effort SIGTERM to the whole process group. Never fails.
    pub fn terminate(&self) {
        if let Err(e) = killpg(self.pgid, Signal::SIGTERM) {
            log::debug!(
                "killpg({}) for '{}' ignored: {}",
                self.pgid,
                self.program,
                e
            );
        }
    }

    /// Flushes, caps and syncs both captured streams. Safe to call repeatedly.
    pub async fn close_sinks(&mut self) {
        let grace = self.drain_grace;
        let close = |pump: Option<LogPump>| async move {
            let Some(pump) = pump else {
                return;
            };
            let path = pump.path().to_owned();
            if let Err(e) = pump.close(grace).await {
                log::warn!("Cannot close log '{}': {}", path.to_string_lossy(), e);
            }
        };
        tokio::join!(close(self.stdout.take()), close(self.stderr.take()));
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.status.is_none() {
            self.terminate();
        }
    }
}

/// Terminates every handle, swallowing failures.
pub fn terminate_all<'a>(handles: impl IntoIterator<Item = &'a ProcessHandle>) {
    for h in handles {
        h.terminate();
    }
}

/// Closes the sinks of every handle; one broken sink does not stop the rest.
pub async fn close_all<'a>(handles: impl IntoIterator<Item = &'a mut ProcessHandle>) {
    for h in handles {
        h.close_sinks().await;
    }
}
