//! Outcome of a batch run

use std::time::Duration;

use catalink_domain::{CatalinkError, ErrorKind};

/// Successes and failures of one batch, each tagged with its input index
///
/// For paginated fetches the index of a failure is the page number.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T> {
    pub successes: Vec<(usize, T)>,
    pub failures: Vec<(usize, CatalinkError)>,
    pub elapsed: Duration,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self { successes: Vec::new(), failures: Vec::new(), elapsed: Duration::ZERO }
    }
}

impl<T> BatchResult<T> {
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|(index, _)| *index).collect()
    }

    /// Successful values in index order
    pub fn into_values(mut self) -> Vec<T> {
        self.successes.sort_by_key(|(index, _)| *index);
        self.successes.into_iter().map(|(_, value)| value).collect()
    }

    /// Summary error for callers that want to treat any failure as fatal
    pub fn partial_failure_error(&self) -> Option<CatalinkError> {
        let (first_index, first) = self.failures.first()?;
        Some(
            CatalinkError::new(
                ErrorKind::BatchPartialFailure,
                format!(
                    "{} of {} items failed; first failure at {first_index}: {first}",
                    self.failures.len(),
                    self.total()
                ),
            )
            .with_retryable(false)
            .with_context("failed", self.failures.len().to_string())
            .with_context("succeeded", self.successes.len().to_string()),
        )
    }

    pub(crate) fn sort(&mut self) {
        self.successes.sort_by_key(|(index, _)| *index);
        self.failures.sort_by_key(|(index, _)| *index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_summary() {
        let result = BatchResult {
            successes: vec![(2, "c"), (0, "a")],
            failures: vec![(1, CatalinkError::not_found("b"))],
            elapsed: Duration::ZERO,
        };

        assert_eq!(result.total(), 3);
        assert!(!result.is_complete_success());
        assert_eq!(result.failed_indices(), vec![1]);

        let summary = result.partial_failure_error().unwrap();
        assert_eq!(summary.kind, ErrorKind::BatchPartialFailure);
        assert!(summary.message.starts_with("1 of 3 items failed"));

        assert_eq!(result.into_values(), vec!["a", "c"]);
    }

    #[test]
    fn test_no_summary_without_failures() {
        let result: BatchResult<u8> = BatchResult::default();
        assert!(result.partial_failure_error().is_none());
    }
}
