use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;

use super::scenario::{Scenario, TransferReport};
use crate::process::{self, ProcessHandle, Redirect, Supervisor};
use crate::store::ResultRecord;
use crate::testing::{Failure, TestCase, TestEnv};

/// Fixed waits of the choreography.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// After each spawn.
    pub settle: Duration,
    pub poll: Duration,
    pub sender_grace: Duration,
    pub receiver_grace: Duration,
    /// Between closing the logs and reading the output.
    pub flush_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            poll: Duration::from_millis(100),
            sender_grace: Duration::from_secs(1),
            receiver_grace: Duration::from_secs(5),
            flush_settle: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default)]
struct Processes {
    linksim: Option<ProcessHandle>,
    receiver: Option<ProcessHandle>,
    sender: Option<ProcessHandle>,
}

impl Processes {
    fn iter(&self) -> impl Iterator<Item = &ProcessHandle> {
        [&self.linksim, &self.receiver, &self.sender]
            .into_iter()
            .flatten()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut ProcessHandle> {
        [&mut self.linksim, &mut self.receiver, &mut self.sender]
            .into_iter()
            .flatten()
    }
}

/// Runs a [`Scenario`] through the link simulator as a test.
#[derive(Debug)]
pub struct Transfer<S> {
    scenario: S,
    linksim: PathBuf,
    timings: Timings,
    procs: Processes,
}

impl<S: Scenario> Transfer<S> {
    pub fn new(scenario: S, linksim: impl Into<PathBuf>) -> Self {
        Self {
            scenario,
            linksim: linksim.into(),
            timings: Timings::default(),
            procs: Processes::default(),
        }
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    fn linksim_argv(&self) -> Vec<String> {
        let mut argv = vec![self.linksim.to_string_lossy().into_owned(), "-R".to_owned()];
        argv.extend(self.scenario.plan().profile.to_args());
        argv
    }

    fn endpoint_argv(program: PathBuf, args: Vec<String>) -> Vec<String> {
        let mut argv = vec![program.to_string_lossy().into_owned()];
        argv.extend(args);
        argv
    }

    /// Clears a stale output; the receiver writes it itself in `-f` mode.
    fn prepare_output(&self) -> Result<Option<std::fs::File>, Failure> {
        let plan = self.scenario.plan();
        let output = plan.output_file();
        fsutil::remove_file_if_exists(&output)?;
        if plan.receiver_use_stdout {
            let file = std::fs::File::create(&output)?;
            Ok(Some(file))
        } else {
            fsutil::touch(&output)?;
            Ok(None)
        }
    }

    async fn spawn_all(&mut self, sup: &Supervisor) -> Result<(), Failure> {
        let plan = self.scenario.plan();

        self.procs.linksim = Some(sup.spawn(self.linksim_argv(), Redirect::default()).await?);
        sleep(self.timings.settle).await;

        let receiver_stdout = self.prepare_output()?;
        let argv = Self::endpoint_argv(self.scenario.receiver(), self.scenario.receiver_args());
        let redirect = Redirect {
            stdin: None,
            stdout: receiver_stdout,
        };
        self.procs.receiver = Some(sup.spawn(argv, redirect).await?);
        sleep(self.timings.settle).await;

        let stdin = if plan.sender_use_stdin {
            Some(std::fs::File::open(&plan.file)?)
        } else {
            None
        };
        let argv = Self::endpoint_argv(self.scenario.sender(), self.scenario.sender_args());
        let redirect = Redirect {
            stdin,
            stdout: None,
        };
        self.procs.sender = Some(sup.spawn(argv, redirect).await?);
        sleep(self.timings.settle).await;
        Ok(())
    }

    /// True as soon as either endpoint exits, false once the budget is spent.
    async fn poll_endpoints(&mut self, tag: &str) -> bool {
        let plan = self.scenario.plan();
        let iterations = (plan.timeout.as_secs_f64() / self.timings.poll.as_secs_f64()) as u64;
        for _ in 0..iterations {
            let sender_done = self.procs.sender.as_mut().and_then(|p| p.try_exited());
            let receiver_done = self.procs.receiver.as_mut().and_then(|p| p.try_exited());
            if sender_done.is_some() || receiver_done.is_some() {
                log::info!("{} One of the processes has ended", tag);
                return true;
            }
            sleep(self.timings.poll).await;
        }
        false
    }

    async fn shutdown(&mut self, tag: &str) {
        log::info!("{} Stopping experiment", tag);
        if let Some(sender) = self.procs.sender.as_mut() {
            if sender.wait_for(self.timings.sender_grace).await.is_none() {
                sender.terminate();
            }
            log::info!("{} Sender is stopped (status: {:?})", tag, sender.exit_status());
        }
        if let Some(receiver) = self.procs.receiver.as_mut() {
            if receiver.wait_for(self.timings.receiver_grace).await.is_none() {
                receiver.terminate();
            }
            log::info!("{} Receiver is stopped (status: {:?})", tag, receiver.exit_status());
        }
        if let Some(linksim) = self.procs.linksim.as_ref() {
            linksim.terminate();
        }

        process::close_all(self.procs.iter_mut()).await;
        sleep(self.timings.flush_settle).await;
        if let Err(e) = tokio::task::spawn_blocking(process::sync_all_filesystems).await {
            log::warn!("{} sync failed: {}", tag, e);
        }
    }

    fn report(&self) -> TransferReport {
        let plan = self.scenario.plan();
        let stdout_log =
            |p: &Option<ProcessHandle>| p.as_ref().and_then(|h| h.stdout_log().map(PathBuf::from));
        TransferReport {
            source: plan.file.clone(),
            output: plan.output_file(),
            sender_stdout_log: stdout_log(&self.procs.sender),
            receiver_stdout_log: stdout_log(&self.procs.receiver),
        }
    }
}

#[async_trait]
impl<S: Scenario> TestCase for Transfer<S> {
    fn name(&self) -> String {
        self.scenario.name()
    }

    async fn exec_tests(&mut self, env: &TestEnv) -> Result<ResultRecord, Failure> {
        let name = self.name();
        let tag = env.tag(&name).to_string();
        let sup = env.supervisor(&name);
        log::info!(
            "{} Starting transfer test with a timeout of {:?}",
            tag,
            self.scenario.plan().timeout
        );

        self.spawn_all(&sup).await?;
        let ended = self.poll_endpoints(&tag).await;
        self.shutdown(&tag).await;

        if !ended {
            return Err(Failure::TimedOut);
        }
        log::info!("{} Checking transfer result", tag);
        self.scenario.check_end_transfer(&self.report()).await?;
        Ok(ResultRecord::ok())
    }

    async fn cleanup(&mut self) {
        process::terminate_all(self.procs.iter());
        process::close_all(self.procs.iter_mut()).await;
        for handle in self.procs.iter_mut() {
            handle.wait_for(self.timings.poll).await;
        }
        self.procs = Processes::default();
    }
}
