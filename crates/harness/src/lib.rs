mod cache;

pub use cache::{TestCache, TestResult, at, init_tracing, sample, test_retry};
