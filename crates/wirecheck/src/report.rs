//! Per-fixture verdicts and their aggregate.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// The verdict for one fixture. Failures carry a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub message: Option<String>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self { name: name.into(), status: TestStatus::Pass, message: None }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), status: TestStatus::Fail, message: Some(message.into()) }
    }

    pub fn is_pass(&self) -> bool {
        self.status == TestStatus::Pass
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.name)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Results of a batch, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRun {
    results: Vec<TestResult>,
}

impl TestRun {
    pub fn new(results: Vec<TestResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    /// True when every fixture passed. An empty run passes.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(TestResult::is_pass)
    }

    /// Process exit status for a runner: 0 when everything passed.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() { 0 } else { 1 }
    }
}

impl std::fmt::Display for TestRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for result in &self.results {
            writeln!(f, "{}", result)?;
        }
        write!(f, "{} passed, {} failed", self.passed(), self.failed())
    }
}
