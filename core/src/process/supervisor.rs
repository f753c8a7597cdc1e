use std::{
    ffi::{OsStr, OsString},
    fs::File,
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use nix::unistd::Pid;
use tokio::process::Command;

use super::error::{Error, Result};
use super::handle::ProcessHandle;
use super::sink::{BoundedLogSink, LogPump, DEFAULT_LOG_CAP};

/// Optional replacements for a child's stdin/stdout.
///
/// Without them stdin is `/dev/null` and stdout is captured like stderr.
#[derive(Debug, Default)]
pub struct Redirect {
    pub stdin: Option<File>,
    pub stdout: Option<File>,
}

/// Spawns programs for one test, capturing their output under a shared log
/// base path (`<log_base>.<program>.out` and `.err`).
#[derive(Debug, Clone)]
pub struct Supervisor {
    working_dir: PathBuf,
    log_base: PathBuf,
    log_cap: u64,
    drain_grace: Duration,
}

impl Supervisor {
    const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(500);

    pub fn new(working_dir: impl Into<PathBuf>, log_base: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            log_base: log_base.into(),
            log_cap: DEFAULT_LOG_CAP,
            drain_grace: Self::DEFAULT_DRAIN_GRACE,
        }
    }

    pub fn log_cap(mut self, cap: u64) -> Self {
        self.log_cap = cap;
        self
    }

    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// ```
    /// use linkgrade_core::process::Supervisor;
    /// use std::path::Path;
    ///
    /// let s = Supervisor::new("/work", "/logs/make/alice");
    /// assert_eq!(s.log_path("make", "err"), Path::new("/logs/make/alice.make.err"));
    /// ```
    pub fn log_path(&self, program: &str, stream: &str) -> PathBuf {
        let mut s: OsString = self.log_base.clone().into_os_string();
        s.push(format!(".{}.{}", program, stream));
        PathBuf::from(s)
    }

    /// Program paths such as `./sender` are taken relative to the working dir;
    /// bare names go through `PATH`.
    fn resolve_program(&self, program: &OsStr) -> PathBuf {
        let path = Path::new(program);
        if path.is_relative() && path.components().count() > 1 {
            self.working_dir.join(path)
        } else {
            path.to_owned()
        }
    }

    pub async fn spawn<I, S>(&self, argv: I, redirect: Redirect) -> Result<ProcessHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(|s| s.as_ref().to_owned()).collect();
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::Spawn {
                program: PathBuf::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty argv"),
            });
        };
        let name = Path::new(program)
            .file_name()
            .unwrap_or(program.as_os_str())
            .to_string_lossy()
            .into_owned();

        if let Some(dir) = self.log_base.parent() {
            fsutil::mkdir_all(dir).map_err(|e| Error::LogFile {
                path: dir.to_owned(),
                source: io::Error::new(io::ErrorKind::Other, e),
            })?;
        }
        let stderr_path = self.log_path(&name, "err");
        let stderr_sink = self.create_sink(&stderr_path).await?;
        let stdout_sink = match redirect.stdout {
            Some(_) => None,
            None => {
                let path = self.log_path(&name, "out");
                Some((self.create_sink(&path).await?, path))
            }
        };

        log::info!(
            "popen: {:?} from: {}",
            argv,
            self.working_dir.to_string_lossy()
        );

        let program_path = self.resolve_program(program);
        let mut cmd = Command::new(&program_path);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .process_group(0)
            .stdin(redirect.stdin.map_or_else(Stdio::null, Stdio::from))
            .stdout(redirect.stdout.map_or_else(Stdio::piped, Stdio::from))
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: program_path.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| Error::Spawn {
            program: program_path.clone(),
            source: io::Error::new(io::ErrorKind::Other, "child exited before its pid was read"),
        })?;
        // process_group(0) makes the child its own group leader.
        let pgid = Pid::from_raw(pid as i32);

        let stdout = match (child.stdout.take(), stdout_sink) {
            (Some(pipe), Some((sink, path))) => Some(LogPump::start(pipe, sink, path)),
            _ => None,
        };
        let stderr = child
            .stderr
            .take()
            .map(|pipe| LogPump::start(pipe, stderr_sink, stderr_path));

        Ok(ProcessHandle::new(
            name,
            child,
            pgid,
            stdout,
            stderr,
            self.drain_grace,
        ))
    }

    /// Spawns `argv` and waits for it, returning its exit code.
    pub async fn call<I, S>(&self, argv: I, timeout: Option<Duration>) -> Result<Option<i32>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut handle = self.spawn(argv, Redirect::default()).await?;
        handle.run_to_completion(timeout).await
    }

    async fn create_sink(&self, path: &Path) -> Result<BoundedLogSink<tokio::fs::File>> {
        BoundedLogSink::create(path, self.log_cap)
            .await
            .map_err(|source| Error::LogFile {
                path: path.to_owned(),
                source,
            })
    }
}
