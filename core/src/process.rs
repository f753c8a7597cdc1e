pub mod error;
pub mod handle;
pub mod sink;
pub mod supervisor;

pub use error::{Error, Result};
pub use handle::*;
pub use sink::{BoundedLogSink, DEFAULT_LOG_CAP};
pub use supervisor::*;

use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};

/// Whether `pid` names a live (non-zombie) process.
pub fn is_alive(pid: Pid) -> bool {
    if kill(pid, None::<Signal>).is_err() {
        return false;
    }
    #[cfg(target_os = "linux")]
    {
        // The state is the first field after the parenthesised command name.
        let stat = match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat,
            Err(_) => return false,
        };
        let state = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next());
        return !matches!(state, Some('Z') | Some('X'));
    }
    #[allow(unreachable_code)]
    true
}

/// Flushes every filesystem buffer to stable storage.
pub fn sync_all_filesystems() {
    nix::unistd::sync();
}

/// SIGKILLs every process named after one of `programs` (`killall -9`).
///
/// Leftovers from a crashed run would otherwise hold the fixed ports.
pub async fn kill_stray(programs: &[String]) {
    for name in programs {
        let res = tokio::process::Command::new("killall")
            .args(["-9", name])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;
        if let Err(e) = res {
            log::debug!("killall {} failed: {}", name, e);
        }
    }
}
