use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use linkgrade_core::{
    digest,
    impairment::Impairment,
    process,
    store::{ResultRecord, ResultStore},
    testing::{TestEnv, TestRunner},
    transfer::{
        FileTransfer, InputFiles, InputKind, Scenario, Timings, Transfer, TransferPlan,
        WindowLimited, DEFAULT_WINDOW,
    },
};
use nix::unistd::Pid;

/// Stores the `-l` value where the sender can find it, then idles.
const LINK_SIM: &str = r#"#!/bin/sh
echo $$ > link_sim.pid
while [ $# -gt 0 ]; do
  case "$1" in
    -R) shift ;;
    -l) echo "$2" > loss; shift 2 ;;
    *) shift 2 ;;
  esac
done
exec sleep 1000
"#;

/// Drops everything when the loss rate is 100, otherwise delivers the file.
const SENDER: &str = r#"#!/bin/sh
file=""
if [ "$1" = "-f" ]; then file="$2"; shift 2; fi
head -c 5000 /dev/zero | tr '\0' 'x' >&2
loss=$(cat loss 2>/dev/null || echo 0)
if [ "$loss" -ge 100 ]; then
  : > channel.tmp
elif [ -n "$file" ]; then
  cat "$file" > channel.tmp
else
  cat > channel.tmp
fi
mv channel.tmp channel
"#;

const HANGING_SENDER: &str = r#"#!/bin/sh
echo $$ > sender.pid
sleep 1000 &
echo $! > sender.child.pid
wait
"#;

fn receiver(extra: &str) -> String {
    format!(
        r#"#!/bin/sh
echo $$ > receiver.pid
out=""
while [ $# -gt 2 ]; do
  case "$1" in
    -f) out="$2"; shift 2 ;;
    *) shift 2 ;;
  esac
done
i=0
while [ ! -f channel ]; do
  sleep 0.05
  i=$((i+1))
  [ $i -gt 400 ] && exit 1
done
{extra}
if [ -n "$out" ]; then cat channel > "$out"; else cat channel; fi
rm -f channel
"#
    )
}

struct Fixture {
    _tmp: tempfile::TempDir,
    work: PathBuf,
    inputs: InputFiles,
    env: TestEnv,
}

impl Fixture {
    fn new(sender: &str) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("alice");
        fsutil::mkdir_all(&work).unwrap();
        install(&work.join("link_sim"), LINK_SIM);
        install(&work.join("sender"), sender);
        install(&work.join("receiver"), &receiver(""));

        let inputs = InputFiles::new(tmp.path().join("data"));
        let env = TestEnv::new("alice", &work, tmp.path().join("logs")).log_cap(1000);
        Self {
            work,
            inputs,
            env,
            _tmp: tmp,
        }
    }

    fn plan(&mut self, bytes: u64) -> TransferPlan {
        let file = self.inputs.get(InputKind::Random, bytes).unwrap();
        TransferPlan::new(file).timeout(Duration::from_secs(5))
    }

    fn transfer<S: Scenario>(&self, scenario: S) -> Transfer<S> {
        Transfer::new(scenario, "./link_sim").timings(fast())
    }

    fn pid(&self, name: &str) -> Pid {
        let s = fsutil::read_to_string(self.work.join(name)).unwrap();
        Pid::from_raw(s.trim().parse().unwrap())
    }
}

fn install(path: &Path, script: &str) {
    fsutil::write(path, script).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn fast() -> Timings {
    Timings {
        settle: Duration::from_millis(50),
        poll: Duration::from_millis(50),
        sender_grace: Duration::from_millis(300),
        receiver_grace: Duration::from_secs(3),
        flush_settle: Duration::from_millis(50),
    }
}

async fn all_dead(pids: &[Pid]) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if pids.iter().all(|&p| !process::is_alive(p)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn neutral_transfer_passes_with_matching_digests() {
    let mut fx = Fixture::new(SENDER);
    let plan = fx.plan(536);
    let (src, out) = (plan.file.clone(), plan.output_file());
    let mut t = fx.transfer(FileTransfer::new("", 536, plan));

    let mut store = ResultStore::new();
    assert!(TestRunner::new(&mut store).run(&mut t, &fx.env).await);
    assert_eq!(store.get("alice", "transfer 536b"), Some(&ResultRecord::ok()));

    let sent = digest::inspect(&src).await.unwrap();
    assert_eq!(sent, digest::inspect(&out).await.unwrap());
    assert_eq!(sent.size, Some(536));

    // The sender wrote 5000 bytes to stderr.
    let err_log = fx.env.log_base("transfer 536b").with_extension("sender.err");
    assert_eq!(fsutil::file_size(err_log).unwrap(), 1000);
}

#[tokio::test]
async fn empty_file_transfers_as_empty_output() {
    let mut fx = Fixture::new(SENDER);
    let plan = fx.plan(0);
    let (src, out) = (plan.file.clone(), plan.output_file());
    let mut t = fx.transfer(FileTransfer::new("", 0, plan));

    let mut store = ResultStore::new();
    assert!(TestRunner::new(&mut store).run(&mut t, &fx.env).await);
    assert_eq!(store.get("alice", "transfer 0b"), Some(&ResultRecord::ok()));

    let received = digest::inspect(&out).await.unwrap();
    assert!(!received.is_missing());
    assert_eq!(received.size, Some(0));
    assert_eq!(digest::inspect(&src).await.unwrap(), received);
}

#[tokio::test]
async fn stdin_and_stdout_modes_transfer_too() {
    let mut fx = Fixture::new(SENDER);
    let plan = fx
        .plan(1000)
        .sender_use_stdin(true)
        .receiver_use_stdout(true);
    let mut t = fx.transfer(FileTransfer::new("Sender STDIN", 1000, plan));

    let mut store = ResultStore::new();
    assert!(TestRunner::new(&mut store).run(&mut t, &fx.env).await);
}

#[tokio::test]
async fn total_loss_never_passes() {
    let mut fx = Fixture::new(SENDER);
    let plan = fx.plan(536);
    let mut t = fx.transfer(FileTransfer::impaired(&Impairment::loss(100), 536, plan));

    let mut store = ResultStore::new();
    assert!(!TestRunner::new(&mut store).run(&mut t, &fx.env).await);
    let record = store.get("alice", "loss_rate 100 transfer 536b").unwrap();
    assert!(record
        .to_string()
        .starts_with("The file has been corrupted"));
}

#[tokio::test]
async fn hanging_sender_times_out_and_leaves_nothing_behind() {
    let mut fx = Fixture::new(HANGING_SENDER);
    let plan = fx.plan(536).timeout(Duration::from_millis(500));
    let mut t = fx.transfer(FileTransfer::new("", 536, plan));

    let mut store = ResultStore::new();
    assert!(!TestRunner::new(&mut store).run(&mut t, &fx.env).await);
    assert_eq!(
        store.get("alice", "transfer 536b"),
        Some(&ResultRecord::failed("The test timed out!"))
    );

    let pids = [
        "link_sim.pid",
        "receiver.pid",
        "sender.pid",
        "sender.child.pid",
    ]
    .map(|f| fx.pid(f));
    assert!(all_dead(&pids).await);
}

#[tokio::test]
async fn cached_pass_skips_execution() {
    let mut fx = Fixture::new(SENDER);
    let plan = fx.plan(536);
    // Would fail to spawn if it ran.
    let mut t = Transfer::new(FileTransfer::new("", 536, plan), "./missing_link_sim");

    let mut store = ResultStore::new();
    store.record("alice", "transfer 536b", ResultRecord::ok());
    assert!(TestRunner::new(&mut store).run(&mut t, &fx.env).await);
    assert!(!fx.env.log_dir.exists());
}

#[tokio::test]
async fn missing_link_simulator_is_a_spawn_failure() {
    let mut fx = Fixture::new(SENDER);
    let plan = fx.plan(4);
    let mut t = Transfer::new(FileTransfer::new("", 4, plan), "./missing_link_sim");

    let mut store = ResultStore::new();
    assert!(!TestRunner::new(&mut store).run(&mut t, &fx.env).await);
    let record = store.get("alice", "transfer 4b").unwrap().to_string();
    assert!(record.starts_with("Cannot spawn"), "{}", record);
}

#[tokio::test]
async fn window_violations_fail_an_otherwise_correct_transfer() {
    let mut fx = Fixture::new(SENDER);
    let noisy = receiver(
        "echo 'Dropping out of window packet 7'\necho 'Dropping out of window packet 8'",
    );
    install(&fx.work.join("ref_receiver"), &noisy);

    let plan = fx.plan(520);
    let scenario = WindowLimited::new(
        FileTransfer::new("", 520, plan),
        DEFAULT_WINDOW,
        "./ref_receiver",
    );
    assert_eq!(
        scenario.receiver_args()[2..4],
        ["-b".to_owned(), "3".to_owned()]
    );
    let mut t = fx.transfer(scenario);

    let mut store = ResultStore::new();
    assert!(!TestRunner::new(&mut store).run(&mut t, &fx.env).await);
    assert_eq!(
        store.get("alice", "limited window transfer 520b"),
        Some(&ResultRecord::failed(
            "The program did not respect the advertized window (2)"
        ))
    );
}
