use super::testcase::*;
use crate::process;
use crate::store::{ResultRecord, ResultStore};

/// Drives tests through their lifecycle and records every verdict.
#[derive(Debug)]
pub struct TestRunner<'s> {
    store: &'s mut ResultStore,
    check: bool,
}

impl<'s> TestRunner<'s> {
    pub fn new(store: &'s mut ResultStore) -> Self {
        Self {
            store,
            check: false,
        }
    }

    /// Replays any truthy cached verdict instead of rerunning.
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Returns whether the test passed, either now or in a previous run.
    pub async fn run<T>(&mut self, test: &mut T, env: &TestEnv) -> bool
    where
        T: TestCase + ?Sized,
    {
        process::kill_stray(&env.stray_programs).await;

        let name = test.name();
        let tag = env.tag(&name);

        if test.skippable() {
            if let Some(passed) = self.store.cached_verdict(&env.submission, &name, self.check) {
                if let Some(cached) = self.store.get(&env.submission, &name) {
                    log::info!("{} Found in previous run: {}", tag, cached);
                }
                return passed;
            }
        }

        log::debug!("{} Running", tag);
        let outcome = test.exec_tests(env).await;
        test.cleanup().await;

        let (record, passed) = match outcome {
            Ok(record) => {
                let passed = record.is_truthy();
                (record, passed)
            }
            Err(failure) => {
                log::warn!("{} Test failed: {}", tag, failure);
                (ResultRecord::failed(failure.to_string()), false)
            }
        };

        log::info!("{} {}", tag, record);
        self.store.record(&env.submission, &name, record);
        passed
    }
}
