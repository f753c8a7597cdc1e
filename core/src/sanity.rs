//! Checks run before any transfer: archive layout and build.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use nix::unistd::{access, AccessFlags};

use crate::store::ResultRecord;
use crate::testing::{Failure, TestCase, TestEnv};

pub const MAKEFILE: &str = "Makefile";

/// Locates the project inside a submission and checks its required entries.
#[derive(Debug, Clone)]
pub struct ArchiveStruct {
    required: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ArchiveStruct {
    pub fn new(required: Vec<String>) -> Self {
        Self {
            required,
            working_dir: None,
        }
    }

    /// First directory holding a Makefile, once [`TestCase::exec_tests`] ran.
    ///
    /// Set even when a required entry turned out to be missing.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

#[async_trait]
impl TestCase for ArchiveStruct {
    fn name(&self) -> String {
        "Archive structure".to_owned()
    }

    fn skippable(&self) -> bool {
        false
    }

    async fn exec_tests(&mut self, env: &TestEnv) -> Result<ResultRecord, Failure> {
        let tag = env.tag("Archive structure");
        let Some(dir) = fsutil::find_dir_containing(&env.working_dir, MAKEFILE) else {
            return Err(Failure::StructuralViolation(format!("{} not found!", MAKEFILE)));
        };
        log::info!("{} Makefile found in {}", tag, dir.to_string_lossy());
        self.working_dir = Some(dir.clone());

        for entry in &self.required {
            if !dir.join(entry).exists() {
                return Err(Failure::StructuralViolation(format!(
                    "Missing archive element: {}",
                    entry
                )));
            }
            log::info!("{} {} found", tag, entry);
        }
        Ok(ResultRecord::ok())
    }
}

/// Builds the endpoints with `make` and checks both executables appeared.
#[derive(Debug, Clone)]
pub struct Make {
    executables: Vec<String>,
    timeout: Duration,
}

impl Make {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(executables: Vec<String>) -> Self {
        Self {
            executables,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stale binaries shipped in the archive must not pass for a build.
    fn clean_exec(env: &TestEnv, name: &str) -> Result<(), Failure> {
        let path = env.path(name);
        log::info!("Looking for exec {}", path.to_string_lossy());
        match fsutil::remove_file_if_exists(&path) {
            Ok(_) => Ok(()),
            Err(fsutil::Error::NotARegularFile(_)) => Err(Failure::BuildFailed(format!(
                "{} is already present in the archive and is not a file that can be removed!",
                name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn check_exec(env: &TestEnv, name: &str) -> Result<(), Failure> {
        let path = env.path(name);
        if !path.exists() {
            return Err(Failure::BuildFailed(format!(
                "Couldn't find executable {} after running make",
                name
            )));
        }
        if access(&path, AccessFlags::X_OK).is_err() {
            return Err(Failure::BuildFailed(format!(
                "{} is not executable after running make",
                name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TestCase for Make {
    fn name(&self) -> String {
        "make".to_owned()
    }

    fn skippable(&self) -> bool {
        false
    }

    async fn exec_tests(&mut self, env: &TestEnv) -> Result<ResultRecord, Failure> {
        let tag = env.tag("make");
        for name in &self.executables {
            Self::clean_exec(env, name)?;
        }
        let code = env
            .supervisor("make")
            .call(["make"], Some(self.timeout))
            .await?;
        log::info!("{} make finished (code: {:?})", tag, code);
        for name in &self.executables {
            Self::check_exec(env, name)?;
            log::info!("{} Have exec {}", tag, name);
        }
        Ok(ResultRecord::ok())
    }
}

/// `make tests`; a non-zero exit code fails the test.
#[derive(Debug, Clone)]
pub struct MakeTests {
    timeout: Duration,
}

impl Default for MakeTests {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl MakeTests {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TestCase for MakeTests {
    fn name(&self) -> String {
        "make tests".to_owned()
    }

    async fn exec_tests(&mut self, env: &TestEnv) -> Result<ResultRecord, Failure> {
        log::info!(
            "{} Running make tests with a timeout of {:?}",
            env.tag("make tests"),
            self.timeout
        );
        let code = env
            .supervisor("make tests")
            .call(["make", "tests"], Some(self.timeout))
            .await?;
        match code {
            Some(0) => Ok(ResultRecord::ok()),
            Some(code) => Err(Failure::BuildFailed(format!(
                "make tests returned an error code: {}",
                code
            ))),
            None => Err(Failure::BuildFailed(
                "make tests was terminated by a signal".to_owned(),
            )),
        }
    }
}
