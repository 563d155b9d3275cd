//! Whole-listing fetch, one page at a time
//!
//! Stops when the accumulated item count reaches the server-reported total
//! or a page comes back empty. A circuit-open failure stops the walk at
//! once; any other page failure is recorded (keyed by page number) and the
//! next page is tried after a longer backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use catalink_common::observability::ClientMetrics;
use catalink_domain::constants::MIN_PAGE;
use catalink_domain::{BatchSettings, ErrorKind, Page, Result};
use tracing::{debug, info, warn};

use super::result::BatchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub page_size: u32,
    /// Pause after a successful page
    pub page_delay: Duration,
    /// Pause after a failed page
    pub failure_backoff: Duration,
    pub max_pages: Option<u32>,
    pub max_consecutive_failures: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&BatchSettings::default())
    }
}

impl From<&BatchSettings> for FetchOptions {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            page_size: settings.page_size,
            page_delay: settings.page_delay(),
            failure_backoff: settings.page_failure_backoff(),
            max_pages: settings.max_pages,
            max_consecutive_failures: settings.max_consecutive_page_failures.max(1),
        }
    }
}

/// Reported after every successful page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub page: u32,
    /// Server-reported total item count
    pub total: u64,
    pub accumulated: usize,
}

#[derive(Debug, Clone)]
pub struct PaginatedFetcher {
    options: FetchOptions,
    metrics: Arc<ClientMetrics>,
}

impl PaginatedFetcher {
    pub fn new(options: FetchOptions) -> Self {
        Self { options, metrics: Arc::new(ClientMetrics::new()) }
    }

    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Walk pages starting at page 1
    ///
    /// Success indices are positions in the accumulated listing; failure
    /// indices are page numbers.
    pub async fn fetch_all<T, F, Fut>(
        &self,
        operation: &str,
        fetch_page: F,
        on_progress: Option<&(dyn Fn(FetchProgress) + Send + Sync)>,
    ) -> BatchResult<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        let started = Instant::now();
        let mut batch = BatchResult::default();
        let mut page = MIN_PAGE;
        let mut pages_requested: u32 = 0;
        let mut known_total: Option<u64> = None;
        let mut consecutive_failures: u32 = 0;

        loop {
            if self.options.max_pages.is_some_and(|max| pages_requested >= max) {
                debug!(operation, pages_requested, "page limit reached");
                break;
            }
            pages_requested += 1;

            match fetch_page(page).await {
                Ok(result) => {
                    consecutive_failures = 0;
                    known_total = Some(result.total);
                    let page_was_empty = result.items.is_empty();

                    for item in result.items {
                        let position = batch.successes.len();
                        batch.successes.push((position, item));
                    }
                    let accumulated = batch.successes.len();
                    if let Some(report) = on_progress {
                        report(FetchProgress { page, total: result.total, accumulated });
                    }

                    if page_was_empty || accumulated as u64 >= result.total {
                        break;
                    }
                    tokio::time::sleep(self.options.page_delay).await;
                }
                Err(err) if err.kind == ErrorKind::CircuitOpen => {
                    warn!(operation, page, "circuit open, stopping paginated fetch");
                    batch.failures.push((page as usize, err));
                    break;
                }
                Err(err) => {
                    warn!(operation, page, error = %err, "page fetch failed");
                    batch.failures.push((page as usize, err));
                    consecutive_failures += 1;

                    if consecutive_failures >= self.options.max_consecutive_failures {
                        warn!(operation, consecutive_failures, "too many failed pages, giving up");
                        break;
                    }
                    let past_last_page = known_total.is_some_and(|total| {
                        u64::from(page) * u64::from(self.options.page_size) >= total
                    });
                    if past_last_page {
                        break;
                    }
                    tokio::time::sleep(self.options.failure_backoff).await;
                }
            }
            page += 1;
        }

        batch.elapsed = started.elapsed();
        self.metrics.record_batch(batch.success_count() as u64, batch.failure_count() as u64);
        info!(
            operation,
            pages = pages_requested,
            items = batch.success_count(),
            failed_pages = batch.failure_count(),
            "paginated fetch finished"
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use catalink_domain::CatalinkError;
    use parking_lot::Mutex;

    use super::*;

    fn options(page_size: u32) -> FetchOptions {
        FetchOptions {
            page_size,
            page_delay: Duration::ZERO,
            failure_backoff: Duration::from_millis(1),
            max_pages: None,
            max_consecutive_failures: 3,
        }
    }

    fn listing(total: u32, page_size: u32, page: u32) -> Page<u32> {
        let start = (page - 1) * page_size;
        let end = (start + page_size).min(total);
        Page { total: u64::from(total), page, items: (start..end).collect() }
    }

    /// Validates that T items over P pages take exactly P calls.
    ///
    /// Assertions:
    /// - 250 items at 100 per page: 3 calls, 250 items, in order.
    /// - Progress is reported once per page with the running count.
    #[tokio::test]
    async fn test_fetches_exactly_the_needed_pages() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let progress = Mutex::new(Vec::new());
        let record = |p: FetchProgress| progress.lock().push((p.page, p.accumulated));

        let result = PaginatedFetcher::new(options(100))
            .fetch_all(
                "list_products",
                move |page| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(listing(250, 100, page))
                },
                Some(&record),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.success_count(), 250);
        assert_eq!(result.into_values(), (0..250).collect::<Vec<_>>());
        assert_eq!(*progress.lock(), vec![(1, 100), (2, 200), (3, 250)]);
    }

    #[tokio::test]
    async fn test_empty_page_stops() {
        let result = PaginatedFetcher::new(options(10))
            .fetch_all(
                "list_products",
                |page| async move { Ok(Page { total: 1_000, page, items: Vec::<u32>::new() }) },
                None,
            )
            .await;
        assert_eq!(result.total(), 0);
    }

    #[tokio::test]
    async fn test_circuit_open_stops_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = PaginatedFetcher::new(options(10))
            .fetch_all(
                "list_products",
                move |page| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if page == 1 {
                        Ok(listing(50, 10, page))
                    } else {
                        Err(CatalinkError::circuit_open("list_products", Duration::from_secs(30)))
                    }
                },
                None,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.success_count(), 10);
        assert_eq!(result.failed_indices(), vec![2]);
    }

    /// Validates that a failed middle page is skipped, not fatal.
    ///
    /// Assertions:
    /// - Page 2 is recorded as a failure by page number.
    /// - Pages 1 and 3 are accumulated.
    #[tokio::test]
    async fn test_failed_page_is_recorded_and_skipped() {
        let result = PaginatedFetcher::new(options(10))
            .fetch_all(
                "list_products",
                |page| async move {
                    if page == 2 {
                        Err(CatalinkError::api("HTTP 502"))
                    } else {
                        Ok(listing(25, 10, page))
                    }
                },
                None,
            )
            .await;

        assert_eq!(result.failed_indices(), vec![2]);
        assert_eq!(result.success_count(), 15);
    }

    #[tokio::test]
    async fn test_consecutive_failures_and_page_limit() {
        let result = PaginatedFetcher::new(options(10))
            .fetch_all(
                "list_products",
                |_page| async move { Err::<Page<u32>, _>(CatalinkError::timeout("slow")) },
                None,
            )
            .await;
        assert_eq!(result.failed_indices(), vec![1, 2, 3]);

        let mut limited = options(10);
        limited.max_pages = Some(2);
        let result = PaginatedFetcher::new(limited)
            .fetch_all("list_products", |page| async move { Ok(listing(100, 10, page)) }, None)
            .await;
        assert_eq!(result.success_count(), 20);
    }
}
