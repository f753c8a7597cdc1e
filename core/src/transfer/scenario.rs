use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;

use crate::digest;
use crate::impairment::{Impairment, ImpairmentProfile};
use crate::testing::Failure;

/// Largest packet the endpoints exchange.
pub const MAX_PKT_SIZE: u64 = 528;

/// Everything a transfer needs besides the programs' behavior.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub file: PathBuf,
    pub timeout: Duration,
    pub profile: ImpairmentProfile,
    pub sender: PathBuf,
    pub receiver: PathBuf,
    pub sender_host: String,
    pub receiver_host: String,
    /// Feed the file on the sender's stdin instead of `-f`.
    pub sender_use_stdin: bool,
    /// Take the receiver's stdout as the output instead of `-f`.
    pub receiver_use_stdout: bool,
}

impl TransferPlan {
    pub const SENDER_HOST: &str = "::1";
    pub const RECEIVER_HOST: &str = "::";

    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            timeout: Duration::from_secs(10),
            profile: ImpairmentProfile::new(),
            sender: PathBuf::from("./sender"),
            receiver: PathBuf::from("./receiver"),
            sender_host: Self::SENDER_HOST.to_owned(),
            receiver_host: Self::RECEIVER_HOST.to_owned(),
            sender_use_stdin: false,
            receiver_use_stdout: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn profile(mut self, profile: ImpairmentProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn programs(mut self, sender: impl Into<PathBuf>, receiver: impl Into<PathBuf>) -> Self {
        self.sender = sender.into();
        self.receiver = receiver.into();
        self
    }

    pub fn hosts(mut self, sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        self.sender_host = sender.into();
        self.receiver_host = receiver.into();
        self
    }

    pub fn sender_use_stdin(mut self, yes: bool) -> Self {
        self.sender_use_stdin = yes;
        self
    }

    pub fn receiver_use_stdout(mut self, yes: bool) -> Self {
        self.receiver_use_stdout = yes;
        self
    }

    /// `<file>_out`, whichever way the receiver produces it.
    pub fn output_file(&self) -> PathBuf {
        let mut s: OsString = self.file.clone().into_os_string();
        s.push("_out");
        PathBuf::from(s)
    }

    /// `clamp(bytes / packet_size, 10, 500)` seconds.
    pub fn plain_timeout(bytes: u64, packet_size: u64) -> Duration {
        let secs = (bytes as f64 / packet_size.max(1) as f64).clamp(10.0, 500.0);
        Duration::from_secs_f64(secs)
    }

    /// `bytes * 1.5 / packet_size` seconds, for links with delay.
    pub fn latency_timeout(bytes: u64, packet_size: u64) -> Duration {
        Duration::from_secs_f64(bytes as f64 * 1.5 / packet_size.max(1) as f64)
    }
}

/// What the orchestrator observed, handed to the end-of-transfer checks.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub source: PathBuf,
    pub output: PathBuf,
    /// `None` when the stream was not captured into a log.
    pub sender_stdout_log: Option<PathBuf>,
    pub receiver_stdout_log: Option<PathBuf>,
}

/// A sender/receiver pairing over the link simulator.
///
/// Variants wrap another scenario and override only what they change.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> String;

    fn plan(&self) -> &TransferPlan;

    fn sender(&self) -> PathBuf {
        self.plan().sender.clone()
    }

    fn receiver(&self) -> PathBuf {
        self.plan().receiver.clone()
    }

    fn sender_args(&self) -> Vec<String> {
        let plan = self.plan();
        let mut args = Vec::new();
        if !plan.sender_use_stdin {
            args.push("-f".to_owned());
            args.push(plan.file.to_string_lossy().into_owned());
        }
        args.push(plan.sender_host.clone());
        args.push(plan.profile.sender_port().to_string());
        args
    }

    fn receiver_args(&self) -> Vec<String> {
        let plan = self.plan();
        let mut args = Vec::new();
        if !plan.receiver_use_stdout {
            args.push("-f".to_owned());
            args.push(plan.output_file().to_string_lossy().into_owned());
        }
        args.push(plan.receiver_host.clone());
        args.push(plan.profile.receiver_port().to_string());
        args
    }

    async fn check_end_transfer(&self, report: &TransferReport) -> Result<(), Failure> {
        verify_digests(&report.source, &report.output).await
    }
}

/// Byte-for-byte equality by SHA-256; a missing output never matches.
pub async fn verify_digests(source: &Path, output: &Path) -> Result<(), Failure> {
    let sent = digest::inspect(source).await?;
    let received = digest::inspect(output).await?;
    if sent.is_missing() || sent != received {
        log::info!("Hashes differ: {} - {}", sent, received);
        return Err(Failure::TransferCorrupted { sent, received });
    }
    Ok(())
}

/// The plain scenario: the submission's own sender and receiver.
#[derive(Debug, Clone)]
pub struct FileTransfer {
    name: String,
    plan: TransferPlan,
}

impl FileTransfer {
    /// Named `<label> transfer <bytes>b`, or `transfer <bytes>b` without a label.
    pub fn new(label: &str, bytes: u64, plan: TransferPlan) -> Self {
        let name = if label.is_empty() {
            format!("transfer {}b", bytes)
        } else {
            format!("{} transfer {}b", label, bytes)
        };
        Self { name, plan }
    }

    /// Applies `impairment` on top of the plan's profile and folds its name in.
    pub fn impaired(impairment: &Impairment, bytes: u64, plan: TransferPlan) -> Self {
        let profile = plan.profile.merge(impairment.profile());
        Self::new(impairment.name(), bytes, plan.profile(profile))
    }
}

#[async_trait]
impl Scenario for FileTransfer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn plan(&self) -> &TransferPlan {
        &self.plan
    }
}
