//! Result aggregation

use crate::types::{Summary, TestResult, TestStatus};

/// Count passing and failing tests; `total` is the list length, so
/// pending or unknown results only show up there.
pub fn summarize(tests: &[TestResult]) -> Summary {
    let pass = tests.iter().filter(|t| t.status == TestStatus::Pass).count();
    let fail = tests.iter().filter(|t| t.status == TestStatus::Fail).count();
    Summary {
        pass,
        fail,
        total: tests.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: &str) -> TestResult {
        TestResult {
            title: format!("t-{}", status),
            status: TestStatus::from(status),
            duration_ms: 1,
            error: None,
        }
    }

    #[test]
    fn test_counts_pass_fail_total() {
        let tests = vec![result("pass"), result("fail"), result("pass")];
        assert_eq!(
            summarize(&tests),
            Summary {
                pass: 2,
                fail: 1,
                total: 3
            }
        );
    }

    #[test]
    fn test_other_states_only_count_toward_total() {
        let tests = vec![result("pending"), result("unknown"), result("skipped")];
        let summary = summarize(&tests);
        assert_eq!(summary.pass, 0);
        assert_eq!(summary.fail, 0);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(summarize(&[]), Summary::default());
    }
}
