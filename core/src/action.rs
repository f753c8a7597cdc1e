pub mod error {
    #[allow(unused_imports)]
    pub(crate) use anyhow::{anyhow, bail, ensure, Context as _};
    pub use anyhow::{Error, Result};
}
use std::path::{Path, PathBuf};

use chrono::Local;
use error::*;

use crate::config::Config;
use crate::impairment::Impairment;
use crate::sanity::{ArchiveStruct, Make, MakeTests};
use crate::store::ResultStore;
use crate::style;
use crate::testing::{TestEnv, TestRunner};
use crate::transfer::{
    FileTransfer, InputFiles, InputKind, Scenario, Timings, TimestampEcho, Transfer, TransferPlan,
    WindowLimited, WithReference, DEFAULT_WINDOW,
};

/// Session-wide state shared by every submission: configuration, the
/// generated input files and the choreography timings.
#[derive(Debug)]
pub struct GradeContext<'c> {
    cfg: &'c Config,
    inputs: InputFiles,
    timings: Timings,
}

impl<'c> GradeContext<'c> {
    pub fn new(cfg: &'c Config, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            cfg,
            inputs: InputFiles::new(data_dir),
            timings: Timings::default(),
        }
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    fn packet_size(&self) -> u64 {
        self.cfg.harness.packet_size
    }

    fn plan(&mut self, kind: InputKind, bytes: u64) -> Result<TransferPlan> {
        let file = self
            .inputs
            .get(kind, bytes)
            .with_context(|| format!("Cannot generate a {} input of {}b", kind, bytes))?;
        let programs = &self.cfg.programs;
        let link = &self.cfg.link;
        Ok(TransferPlan::new(file)
            .timeout(TransferPlan::plain_timeout(bytes, self.packet_size()))
            .profile(link.base_profile())
            .programs(
                Path::new(".").join(&programs.sender),
                Path::new(".").join(&programs.receiver),
            )
            .hosts(&link.sender_host, &link.receiver_host))
    }

    fn simple(&mut self, label: &str, bytes: u64) -> Result<FileTransfer> {
        Ok(FileTransfer::new(label, bytes, self.plan(InputKind::Random, bytes)?))
    }

    fn impaired(&mut self, impairment: &Impairment, bytes: u64) -> Result<FileTransfer> {
        let mut plan = self.plan(InputKind::Random, bytes)?;
        if impairment.has_latency() {
            plan = plan.timeout(TransferPlan::latency_timeout(bytes, self.packet_size()));
        }
        Ok(FileTransfer::impaired(impairment, bytes, plan))
    }

    fn transfer<S: Scenario>(&self, scenario: S) -> Transfer<S> {
        Transfer::new(scenario, &self.cfg.programs.linksim).timings(self.timings)
    }

    fn ref_sender<S: Scenario>(&self, scenario: S) -> Transfer<WithReference<S>> {
        let program = &self.cfg.programs.ref_sender;
        self.transfer(WithReference::reference_sender(scenario, program))
    }

    fn ref_receiver<S: Scenario>(&self, scenario: S) -> Transfer<WithReference<S>> {
        let program = &self.cfg.programs.ref_receiver;
        self.transfer(WithReference::reference_receiver(scenario, program))
    }
}

fn impairments() -> [Impairment; 5] {
    [
        Impairment::corruption(Impairment::DEFAULT_RATE),
        Impairment::loss(Impairment::DEFAULT_RATE),
        Impairment::truncation(Impairment::DEFAULT_RATE),
        Impairment::latency(Impairment::DEFAULT_DELAY_MS, Impairment::DEFAULT_JITTER_MS),
        Impairment::unreliable(),
    ]
}

/// Runs the whole grading plan for one submission directory.
///
/// Stops early when the archive has no Makefile or the build fails; every
/// other failure is recorded and grading carries on.
pub async fn grade_submission(
    ctx: &mut GradeContext<'_>,
    store: &mut ResultStore,
    root: &Path,
    name: &str,
) -> Result<()> {
    let cfg = ctx.cfg;
    let pkt = ctx.packet_size();
    let env = TestEnv::new(name, root.join(name), &cfg.paths.log_dir)
        .log_cap(cfg.harness.log_cap)
        .stray_programs(cfg.stray_programs());

    // Sanity
    let mut archive = ArchiveStruct::new(cfg.archive.required.clone());
    TestRunner::new(store).run(&mut archive, &env).await;
    let Some(working_dir) = archive.working_dir() else {
        log::error!("Cannot do anything for submission {}!", name);
        return Ok(());
    };
    let env = env.with_working_dir(working_dir);
    log::info!(
        "Working dir for submission {} is {}",
        name,
        working_dir.to_string_lossy()
    );

    let executables = vec![cfg.programs.sender.clone(), cfg.programs.receiver.clone()];
    let mut make = Make::new(executables).timeout(cfg.harness.make_timeout());
    if !TestRunner::new(store).run(&mut make, &env).await {
        log::error!("The submission {} does not produce working executables!", name);
        return Ok(());
    }
    if cfg.harness.make_tests {
        let mut tests = MakeTests::default().timeout(cfg.harness.make_tests_timeout());
        TestRunner::new(store).run(&mut tests, &env).await;
        log::info!("Re-running make as some groups delete the executables after make tests");
        TestRunner::new(store).run(&mut make, &env).await;
    }

    let mut runner = TestRunner::new(store).check(true);

    // Working?
    let sizes = [0, 1, 4, 520, 536, pkt * 256];
    let mut failures = 0;
    for bytes in sizes {
        let t = ctx.simple("", bytes)?;
        if !runner.run(&mut ctx.transfer(t), &env).await {
            failures += 1;
        }
    }
    if failures > sizes.len() / 2 {
        log::error!("The submission {} cannot transfer data ...", name);
    }

    let localhost = ctx.plan(InputKind::Random, pkt)?.hosts("localhost", "localhost");
    let stdin = ctx.plan(InputKind::Random, 1000)?.sender_use_stdin(true);
    let stdout = ctx.plan(InputKind::Random, 1000)?.receiver_use_stdout(true);
    let mut conformant = true;
    for t in [
        FileTransfer::new("localhost resolution", pkt, localhost),
        FileTransfer::new("Sender STDIN", 1000, stdin),
        FileTransfer::new("Receiver STDOUT", 1000, stdout),
    ] {
        conformant &= runner.run(&mut ctx.transfer(t), &env).await;
    }
    if !conformant {
        log::error!("The submission {} does not respect the specifications", name);
    }

    // Reliable?
    let impaired_bytes = 150 * pkt;
    let mut failures = 0;
    for imp in impairments() {
        let t = ctx.impaired(&imp, impaired_bytes)?;
        if !runner.run(&mut ctx.transfer(t), &env).await {
            failures += 1;
        }
        if failures > impairments().len() / 2 {
            log::error!("The submission {} is not reliable", name);
            break;
        }
    }

    // Interop
    let sizes = [1, 520, pkt * 10];
    let mut failures = 0;
    for bytes in sizes {
        let t = ctx.simple("", bytes)?;
        if !runner.run(&mut ctx.ref_sender(t.clone()), &env).await {
            failures += 1;
        }
        if !runner.run(&mut ctx.ref_receiver(t), &env).await {
            failures += 1;
        }
    }
    if failures > 2 * sizes.len() / 3 {
        log::error!("Too many interoperability errors for {}", name);
    }
    for imp in impairments() {
        let t = ctx.impaired(&imp, impaired_bytes)?;
        runner.run(&mut ctx.ref_sender(t.clone()), &env).await;
        runner.run(&mut ctx.ref_receiver(t), &env).await;
    }

    // Corner cases
    let latency = Impairment::latency(Impairment::DEFAULT_DELAY_MS, Impairment::DEFAULT_JITTER_MS);
    let window = WindowLimited::new(
        ctx.impaired(&latency, u64::from(DEFAULT_WINDOW) * 40 * 520)?,
        DEFAULT_WINDOW,
        &cfg.programs.ref_receiver,
    );
    runner.run(&mut ctx.transfer(window), &env).await;

    let chars = ctx.plan(InputKind::Text, 8 * pkt)?.receiver_use_stdout(true);
    let blank = ctx.plan(InputKind::Zero, pkt)?.receiver_use_stdout(true);
    for t in [
        FileTransfer::new("Char file", 8 * pkt, chars),
        FileTransfer::new("Blank file", pkt, blank),
    ] {
        runner.run(&mut ctx.transfer(t), &env).await;
    }

    let timestamp = TimestampEcho::new(ctx.simple("", 536)?, &cfg.programs.ref_sender);
    runner.run(&mut ctx.transfer(timestamp), &env).await;
    Ok(())
}

/// Grades every submission directory under `root` in name order.
///
/// The store is written to one timestamped snapshot under the results dir
/// after each submission. Returns the snapshot path.
pub async fn grade_all(
    ctx: &mut GradeContext<'_>,
    store: &mut ResultStore,
    root: impl AsRef<Path>,
) -> Result<PathBuf> {
    let root = root.as_ref();
    let root = root
        .canonicalize()
        .with_context(|| format!("Cannot open submissions directory {:?}", root))?;
    let started = Local::now();
    let snapshot = ResultStore::snapshot_path(&ctx.cfg.paths.results_dir, started);
    log::info!("---- Session start: {}", started.to_rfc3339());

    for path in fsutil::sorted_entries(&root)? {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if !path.is_dir() {
            log::info!("Skipping {} as it is not a directory!", name);
            continue;
        }
        if let Err(e) = grade_submission(ctx, store, &root, &name).await {
            log::error!("Grading of {} aborted: {:#}", name, e);
        }
        store
            .save(&snapshot)
            .with_context(|| format!("Failed to save results to {:?}", snapshot))?;
    }

    style::print_session_summary(store);
    Ok(snapshot)
}
