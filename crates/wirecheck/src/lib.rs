//! # Wirecheck
//!
//! Conformance testing for wirerpc services: a catalog of named fixtures, a
//! tester that runs them against any [`wirerpc::Service`], and a stub service
//! that answers from the same catalog.

pub mod catalog;
pub mod report;
pub mod stub;
pub mod tester;

pub use catalog::Catalog;
pub use catalog::ConformanceTestCase;
pub use report::TestResult;
pub use report::TestRun;
pub use report::TestStatus;
pub use stub::FixtureService;
pub use tester::ConformanceTester;
pub use tester::TEST_SELECTOR_HEADER;
