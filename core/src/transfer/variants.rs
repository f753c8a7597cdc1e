use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::scenario::{Scenario, TransferPlan, TransferReport};
use crate::testing::Failure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

/// Swaps one endpoint for the reference implementation.
#[derive(Debug, Clone)]
pub struct WithReference<S> {
    inner: S,
    role: Role,
    program: PathBuf,
}

impl<S: Scenario> WithReference<S> {
    pub fn new(inner: S, role: Role, program: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            role,
            program: program.into(),
        }
    }

    pub fn reference_sender(inner: S, program: impl Into<PathBuf>) -> Self {
        Self::new(inner, Role::Sender, program)
    }

    pub fn reference_receiver(inner: S, program: impl Into<PathBuf>) -> Self {
        Self::new(inner, Role::Receiver, program)
    }
}

#[async_trait]
impl<S: Scenario> Scenario for WithReference<S> {
    fn name(&self) -> String {
        format!("ref{}_{}", self.role, self.inner.name())
    }

    fn plan(&self) -> &TransferPlan {
        self.inner.plan()
    }

    fn sender(&self) -> PathBuf {
        match self.role {
            Role::Sender => self.program.clone(),
            Role::Receiver => self.inner.sender(),
        }
    }

    fn receiver(&self) -> PathBuf {
        match self.role {
            Role::Receiver => self.program.clone(),
            Role::Sender => self.inner.receiver(),
        }
    }

    fn sender_args(&self) -> Vec<String> {
        self.inner.sender_args()
    }

    fn receiver_args(&self) -> Vec<String> {
        self.inner.receiver_args()
    }

    async fn check_end_transfer(&self, report: &TransferReport) -> Result<(), Failure> {
        self.inner.check_end_transfer(report).await
    }
}

pub const DEFAULT_WINDOW: u32 = 3;

/// Reference receiver advertising a small window; the sender must honor it.
#[derive(Debug, Clone)]
pub struct WindowLimited<S> {
    inner: S,
    window: u32,
    reference_receiver: PathBuf,
}

impl<S: Scenario> WindowLimited<S> {
    const DROP_MARKER: &str = "Dropping out of window packet";

    pub fn new(inner: S, window: u32, reference_receiver: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            window,
            reference_receiver: reference_receiver.into(),
        }
    }
}

#[async_trait]
impl<S: Scenario> Scenario for WindowLimited<S> {
    fn name(&self) -> String {
        format!("limited window {}", self.inner.name())
    }

    fn plan(&self) -> &TransferPlan {
        self.inner.plan()
    }

    fn sender(&self) -> PathBuf {
        self.inner.sender()
    }

    fn receiver(&self) -> PathBuf {
        self.reference_receiver.clone()
    }

    fn sender_args(&self) -> Vec<String> {
        self.inner.sender_args()
    }

    /// Inner arguments with `-b <window>` ahead of host and port.
    fn receiver_args(&self) -> Vec<String> {
        let mut args = self.inner.receiver_args();
        let at = args.len().saturating_sub(2);
        args.splice(at..at, ["-b".to_owned(), self.window.to_string()]);
        args
    }

    async fn check_end_transfer(&self, report: &TransferReport) -> Result<(), Failure> {
        self.inner.check_end_transfer(report).await?;
        let Some(log) = &report.receiver_stdout_log else {
            return Ok(());
        };
        let drops = count_lines_containing(log, Self::DROP_MARKER).await?;
        if drops > 1 {
            return Err(Failure::WindowViolation(drops));
        }
        Ok(())
    }
}

/// Reference sender that reports receivers which mangle its timestamps.
#[derive(Debug, Clone)]
pub struct TimestampEcho<S> {
    inner: S,
    reference_sender: PathBuf,
}

impl<S: Scenario> TimestampEcho<S> {
    const CORRUPTION_MARKER: &str = "The receiver is corrupting the timestamp!!!";

    pub fn new(inner: S, reference_sender: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            reference_sender: reference_sender.into(),
        }
    }
}

#[async_trait]
impl<S: Scenario> Scenario for TimestampEcho<S> {
    fn name(&self) -> String {
        format!("timestamp check {}", self.inner.name())
    }

    fn plan(&self) -> &TransferPlan {
        self.inner.plan()
    }

    fn sender(&self) -> PathBuf {
        self.reference_sender.clone()
    }

    fn receiver(&self) -> PathBuf {
        self.inner.receiver()
    }

    fn sender_args(&self) -> Vec<String> {
        self.inner.sender_args()
    }

    fn receiver_args(&self) -> Vec<String> {
        self.inner.receiver_args()
    }

    async fn check_end_transfer(&self, report: &TransferReport) -> Result<(), Failure> {
        self.inner.check_end_transfer(report).await?;
        let Some(log) = &report.sender_stdout_log else {
            return Ok(());
        };
        if count_lines_containing(log, Self::CORRUPTION_MARKER).await? > 0 {
            return Err(Failure::TimestampCorruption);
        }
        Ok(())
    }
}

/// A missing log counts as zero matches.
async fn count_lines_containing(path: &Path, marker: &str) -> std::io::Result<usize> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|l| l.contains(marker))
        .count())
}
