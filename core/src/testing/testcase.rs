use std::{
    fmt,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use super::result::Failure;
use crate::process::{Supervisor, DEFAULT_LOG_CAP};
use crate::store::ResultRecord;

/// Where and for whom a test runs.
#[derive(Debug, Clone)]
pub struct TestEnv {
    pub submission: String,
    pub working_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_cap: u64,
    /// Killed with `killall -9` before every test.
    pub stray_programs: Vec<String>,
}

impl TestEnv {
    pub fn new(
        submission: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            submission: submission.into(),
            working_dir: working_dir.into(),
            log_dir: log_dir.into(),
            log_cap: DEFAULT_LOG_CAP,
            stray_programs: Vec::new(),
        }
    }

    pub fn log_cap(mut self, cap: u64) -> Self {
        self.log_cap = cap;
        self
    }

    pub fn stray_programs(mut self, programs: Vec<String>) -> Self {
        self.stray_programs = programs;
        self
    }

    /// Same submission, different directory (e.g. once the Makefile is found).
    pub fn with_working_dir(&self, dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: dir.into(),
            ..self.clone()
        }
    }

    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.working_dir.join(rel)
    }

    /// `<log_dir>/<test name, spaces as underscores>/<submission>`
    pub fn log_base(&self, test_name: &str) -> PathBuf {
        self.log_dir
            .join(test_name.replace(' ', "_"))
            .join(&self.submission)
    }

    pub fn supervisor(&self, test_name: &str) -> Supervisor {
        Supervisor::new(&self.working_dir, self.log_base(test_name)).log_cap(self.log_cap)
    }

    pub fn tag<'a>(&'a self, test_name: &'a str) -> LogTag<'a> {
        LogTag {
            test: test_name,
            submission: &self.submission,
        }
    }
}

/// `[test/submission]` prefix for log lines.
#[derive(Debug, Clone, Copy)]
pub struct LogTag<'a> {
    test: &'a str,
    submission: &'a str,
}

impl fmt::Display for LogTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}/{}]", self.test, self.submission)
    }
}

#[async_trait]
pub trait TestCase: Send {
    /// Also the key in the result store.
    fn name(&self) -> String;

    fn skippable(&self) -> bool {
        true
    }

    async fn exec_tests(&mut self, env: &TestEnv) -> Result<ResultRecord, Failure>;

    /// Runs after `exec_tests` whatever its outcome.
    async fn cleanup(&mut self) {}
}
