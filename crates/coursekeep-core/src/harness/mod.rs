//! In-process test harness for the live application context.
//!
//! Tests are registered with a category and options, then run sequentially
//! in registration order. Each attempt races the test body against its
//! timeout; a timeout, an `Err` and a panic all count as a failure. Failed
//! tests are retried with a fixed delay and only the final outcome is kept.

pub mod suite;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::utils::RetryPolicy;

pub use suite::builtin_suite;

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between a failed attempt and its retry
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Error recorded when a test exceeds its timeout
pub const TIMEOUT_MESSAGE: &str = "Test timeout";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCategory {
    Unit,
    Integration,
    Performance,
}

impl TestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCategory::Unit => "unit",
            TestCategory::Integration => "integration",
            TestCategory::Performance => "performance",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unit" => Ok(TestCategory::Unit),
            "integration" => Ok(TestCategory::Integration),
            "performance" => Ok(TestCategory::Performance),
            other => Err(format!("Unknown test category '{}'", other)),
        }
    }
}

/// Which registered tests a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    Category(TestCategory),
}

impl Selection {
    fn includes(&self, category: TestCategory) -> bool {
        match self {
            Selection::All => true,
            Selection::Category(c) => *c == category,
        }
    }
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Selection::All)
        } else {
            s.parse().map(Selection::Category)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOptions {
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub retries: u32,
    pub skip: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            skip: false,
        }
    }
}

impl TestOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "pass"),
            TestStatus::Fail => write!(f, "fail"),
            TestStatus::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub category: TestCategory,
    pub status: TestStatus,
    /// Wall time across every attempt; zero when skipped
    pub duration: Duration,
    pub attempts: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration: Duration,
    /// Mean over executed (non-skipped) tests
    pub average_duration: Duration,
}

impl TestSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let executed = results.len() - count(TestStatus::Skip);
        let average_duration = if executed == 0 {
            Duration::ZERO
        } else {
            total_duration / executed as u32
        };

        Self {
            total: results.len(),
            passed: count(TestStatus::Pass),
            failed: count(TestStatus::Fail),
            skipped: count(TestStatus::Skip),
            total_duration,
            average_duration,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub results: Vec<TestResult>,
    pub summary: TestSummary,
}

impl TestReport {
    pub fn all_passed(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.status == TestStatus::Fail)
    }
}

type TestFn = Arc<dyn Fn(Arc<AppContext>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct RegisteredTest {
    name: String,
    category: TestCategory,
    options: TestOptions,
    func: TestFn,
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestHarness {
    context: Arc<AppContext>,
    tests: Vec<RegisteredTest>,
    retry_delay: Duration,
}

impl TestHarness {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self {
            context,
            tests: Vec::new(),
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn register<F, Fut>(&mut self, name: &str, category: TestCategory, options: TestOptions, func: F)
    where
        F: Fn(Arc<AppContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tests.push(RegisteredTest {
            name: name.to_string(),
            category,
            options,
            func: Arc::new(move |ctx| func(ctx).boxed()),
        });
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|t| t.name.as_str())
    }

    /// Run the selected tests one after another in registration order
    pub async fn run(&self, selection: Selection) -> TestReport {
        let mut results = Vec::new();
        for test in self.tests.iter().filter(|t| selection.includes(t.category)) {
            let result = self.run_test(test).await;
            match result.status {
                TestStatus::Fail => warn!(
                    test = %result.name,
                    attempts = result.attempts,
                    error = result.error.as_deref().unwrap_or(""),
                    "Test failed"
                ),
                status => debug!(test = %result.name, %status, "Test finished"),
            }
            results.push(result);
        }

        let summary = TestSummary::from_results(&results);
        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Test run complete"
        );
        TestReport { results, summary }
    }

    async fn run_test(&self, test: &RegisteredTest) -> TestResult {
        if test.options.skip {
            return TestResult {
                name: test.name.clone(),
                category: test.category,
                status: TestStatus::Skip,
                duration: Duration::ZERO,
                attempts: 0,
                error: None,
            };
        }

        let policy = RetryPolicy::fixed(test.options.retries, self.retry_delay);
        let attempts = AtomicU32::new(0);
        let started = Instant::now();
        let outcome = policy
            .run(|attempt| {
                attempts.store(attempt, Ordering::SeqCst);
                self.attempt(test)
            })
            .await;

        let (status, error) = match outcome {
            Ok(()) => (TestStatus::Pass, None),
            Err(e) => (TestStatus::Fail, Some(format!("{:#}", e))),
        };
        TestResult {
            name: test.name.clone(),
            category: test.category,
            status,
            duration: started.elapsed(),
            attempts: attempts.load(Ordering::SeqCst),
            error,
        }
    }

    /// One isolated attempt: timeouts and panics become errors
    async fn attempt(&self, test: &RegisteredTest) -> anyhow::Result<()> {
        let func = Arc::clone(&test.func);
        let context = Arc::clone(&self.context);
        let body = AssertUnwindSafe(async move { func(context).await }).catch_unwind();

        match tokio::time::timeout(test.options.timeout, body).await {
            Err(_) => Err(anyhow::anyhow!(TIMEOUT_MESSAGE)),
            Ok(Err(panic)) => Err(anyhow::anyhow!("Test panicked: {}", panic_message(&*panic))),
            Ok(Ok(result)) => result,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> TestHarness {
        TestHarness::new(Arc::new(AppContext::in_memory())).with_retry_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_never_resolving_test_times_out() {
        let mut h = harness();
        h.register(
            "hangs",
            TestCategory::Unit,
            TestOptions::timeout(Duration::from_millis(50)),
            |_| futures::future::pending::<anyhow::Result<()>>(),
        );

        let started = Instant::now();
        let report = h.run(Selection::All).await;
        let result = &report.results[0];
        assert_eq!(result.status, TestStatus::Fail);
        assert_eq!(result.error.as_deref(), Some(TIMEOUT_MESSAGE));
        assert!(result.duration >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_timeout_still_fails_with_retries() {
        let mut h = harness();
        h.register(
            "hangs",
            TestCategory::Unit,
            TestOptions::timeout(Duration::from_millis(20)).with_retries(2),
            |_| futures::future::pending::<anyhow::Result<()>>(),
        );
        let report = h.run(Selection::All).await;
        assert_eq!(report.results[0].status, TestStatus::Fail);
        assert_eq!(report.results[0].attempts, 3);
        assert_eq!(report.results[0].error.as_deref(), Some(TIMEOUT_MESSAGE));
    }

    #[tokio::test]
    async fn test_retry_records_final_outcome() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut h = harness();
        h.register(
            "flaky",
            TestCategory::Integration,
            TestOptions::default().with_retries(2),
            move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    anyhow::ensure!(n >= 1, "first attempt fails");
                    Ok(())
                }
            },
        );

        let report = h.run(Selection::All).await;
        assert_eq!(report.results[0].status, TestStatus::Pass);
        assert_eq!(report.results[0].attempts, 2);
        assert!(report.results[0].error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_skip_and_panic_isolation() {
        let mut h = harness();
        h.register("skipped", TestCategory::Unit, TestOptions::default().skipped(), |_| async {
            anyhow::bail!("must not run")
        });
        h.register("panics", TestCategory::Unit, TestOptions::default(), |_| async {
            panic!("boom")
        });
        h.register("passes", TestCategory::Unit, TestOptions::default(), |_| async { Ok(()) });

        let report = h.run(Selection::All).await;
        let statuses: Vec<TestStatus> = report.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![TestStatus::Skip, TestStatus::Fail, TestStatus::Pass]);
        assert_eq!(report.results[0].duration, Duration::ZERO);
        assert!(report.results[1].error.as_deref().unwrap().contains("boom"));

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 1);
        assert!(!report.all_passed());
    }

    #[tokio::test]
    async fn test_selection_by_category() {
        let mut h = harness();
        h.register("u", TestCategory::Unit, TestOptions::default(), |_| async { Ok(()) });
        h.register("i", TestCategory::Integration, TestOptions::default(), |_| async { Ok(()) });
        h.register("p", TestCategory::Performance, TestOptions::default(), |_| async { Ok(()) });

        let report = h.run(Selection::Category(TestCategory::Integration)).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].name, "i");
        assert_eq!(h.run(Selection::All).await.summary.total, 3);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!("all".parse::<Selection>(), Ok(Selection::All));
        assert_eq!(
            "Performance".parse::<Selection>(),
            Ok(Selection::Category(TestCategory::Performance))
        );
        assert!("smoke".parse::<Selection>().is_err());
    }

    #[tokio::test]
    async fn test_builtin_suite_passes_on_fresh_context() {
        let h = builtin_suite(Arc::new(AppContext::in_memory()));
        assert!(!h.is_empty());
        let report = h.run(Selection::All).await;
        let failures: Vec<String> = report
            .failures()
            .map(|r| format!("{}: {}", r.name, r.error.clone().unwrap_or_default()))
            .collect();
        assert!(failures.is_empty(), "{:?}", failures);
    }
}
