use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub use fsutil::{Error, Result};

/// Success token recorded for a passing test.
pub const OK: &str = "OK";

/// Verdict for one (submission, test) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultRecord {
    Flag(bool),
    Text(String),
}

impl ResultRecord {
    pub fn ok() -> Self {
        Self::Text(OK.to_owned())
    }

    pub fn failed(cause: impl Into<String>) -> Self {
        Self::Text(cause.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Text(s) if s == OK)
    }

    /// `"OK"`, or `true` from boolean snapshots.
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Flag(true)) || self.is_ok()
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Flag(b) => *b,
            Self::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{}", b),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// submission -> (test name -> verdict).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultStore {
    results: BTreeMap<String, BTreeMap<String, ResultRecord>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, submission: &str, test: &str) -> Option<&ResultRecord> {
        self.results.get(submission)?.get(test)
    }

    pub fn record(&mut self, submission: &str, test: &str, record: ResultRecord) {
        self.results
            .entry(submission.to_owned())
            .or_default()
            .insert(test.to_owned(), record);
    }

    /// Decides whether a test may be skipped and with which outcome.
    ///
    /// A cached pass always short-circuits. In check mode any truthy cached
    /// verdict short-circuits too, including failure texts, which replay as
    /// failures.
    pub fn cached_verdict(&self, submission: &str, test: &str, check: bool) -> Option<bool> {
        let cached = self.get(submission, test)?;
        if cached.is_pass() || (check && cached.is_truthy()) {
            Some(cached.is_pass())
        } else {
            None
        }
    }

    pub fn submissions(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn tests(&self, submission: &str) -> impl Iterator<Item = (&str, &ResultRecord)> {
        self.results
            .get(submission)
            .into_iter()
            .flatten()
            .map(|(name, r)| (name.as_str(), r))
    }

    /// (passed, failed) for one submission.
    pub fn tally(&self, submission: &str) -> (usize, usize) {
        self.tests(submission).fold((0, 0), |(ok, ng), (_, r)| {
            if r.is_pass() {
                (ok + 1, ng)
            } else {
                (ok, ng + 1)
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        fsutil::read_json_with_deserialize(path)
    }

    /// Merges a prior snapshot in; each submission found there replaces ours.
    pub fn seed_from(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let prior = Self::load(path)?;
        self.results.extend(prior.results);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fsutil::write_json_with_mkdir(path, self)
    }

    /// ```
    /// use chrono::{Local, TimeZone};
    /// use linkgrade_core::store::ResultStore;
    /// use std::path::Path;
    ///
    /// let t = Local.with_ymd_and_hms(2024, 5, 1, 13, 4, 5).unwrap();
    /// assert_eq!(
    ///     ResultStore::snapshot_path("out", t),
    ///     Path::new("out/results_2024-05-01T13-04-05.json"),
    /// );
    /// ```
    pub fn snapshot_path(dir: impl AsRef<Path>, now: DateTime<Local>) -> PathBuf {
        dir.as_ref()
            .join(format!("results_{}.json", now.format("%Y-%m-%dT%H-%M-%S")))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    fn seeded() -> ResultStore {
        let mut s = ResultStore::new();
        s.record("alice", "transfer 536b", ResultRecord::ok());
        s.record(
            "alice",
            "loss_rate 5 transfer 79200b",
            ResultRecord::failed("The test timed out!"),
        );
        s.record("bob", "make", ResultRecord::failed(""));
        s.record("bob", "legacy", ResultRecord::Flag(true));
        s
    }

    #[test]
    fn skip_decisions() {
        let s = seeded();
        assert_eq!(s.cached_verdict("alice", "transfer 536b", false), Some(true));
        assert_eq!(s.cached_verdict("alice", "transfer 536b", true), Some(true));

        // A failure text only short-circuits in check mode.
        let t = "loss_rate 5 transfer 79200b";
        assert_eq!(s.cached_verdict("alice", t, false), None);
        assert_eq!(s.cached_verdict("alice", t, true), Some(false));

        assert_eq!(s.cached_verdict("bob", "make", true), None);
        assert_eq!(s.cached_verdict("bob", "legacy", true), Some(true));
        assert_eq!(s.cached_verdict("bob", "legacy", false), Some(true));
        assert_eq!(s.cached_verdict("carol", "make", true), None);
    }

    #[test]
    fn json_layout() {
        let s = seeded();
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["alice"]["transfer 536b"], "OK");
        assert_eq!(v["bob"]["legacy"], true);

        let back: ResultStore = serde_json::from_value(v).unwrap();
        assert_eq!(back, s);
    }

    fn decisions(s: &ResultStore) -> Vec<Option<bool>> {
        let mut v = Vec::new();
        for check in [false, true] {
            for sub in s.submissions() {
                for (test, _) in s.tests(sub) {
                    v.push(s.cached_verdict(sub, test, check));
                }
            }
        }
        v
    }

    #[test]
    fn reload_yields_identical_skip_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let mut s = seeded();
        s.save(&path).unwrap();
        let before = decisions(&s);
        let snapshot = s.clone();

        s.clear();
        assert!(s.is_empty());
        s.seed_from(&path).unwrap();

        assert_eq!(s, snapshot);
        assert_eq!(decisions(&s), before);
    }

    #[test]
    fn seeding_replaces_whole_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prior.json");
        let prior: ResultStore = serde_json::from_value(serde_json::json!({
            "alice": { "make": "OK" },
        }))
        .unwrap();
        prior.save(&path).unwrap();

        let mut s = seeded();
        s.seed_from(&path).unwrap();
        let ok = ResultRecord::ok();
        let alice: BTreeMap<_, _> = s.tests("alice").collect();
        assert_eq!(alice, btreemap! { "make" => &ok });
        assert_eq!(s.tally("bob"), (1, 1));
    }
}
