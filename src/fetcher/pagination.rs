//! Cursor-based pagination for Hydrocron requests
//!
//! One chunk may span several pages linked by a continuation cursor. The
//! loop here follows cursors until the last page, a failure, the page bound
//! or a repeated cursor, recording every page outcome in order.

use super::{AttemptOutcome, Failure, FailureKind};
use crate::downloader::{QueryDescriptor, RetryOutcome};
use std::collections::HashSet;
use std::future::Future;
use tracing::debug;

/// Page outcomes of one chunk plus the transport calls they took
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPages {
    /// One outcome per page, in page order; only the last may be a failure
    pub pages: Vec<AttemptOutcome>,
    /// Transport calls across all pages
    pub attempts: u32,
    /// Pages for which at least one transport call was made
    pub pages_requested: u32,
}

/// Pagination helper for Hydrocron requests
pub struct PaginationHelper;

impl PaginationHelper {
    /// Follow continuation cursors starting from `first`
    ///
    /// # Arguments
    /// * `first` - Descriptor of the first page (no cursor)
    /// * `max_pages` - Maximum pages fetched for the chunk
    /// * `fetch_page` - Async function fetching one page (with retries)
    ///
    /// # Returns
    /// Every page outcome in order. Stops after the first failure. Exceeding
    /// `max_pages` or receiving a cursor already seen appends a
    /// [`FailureKind::ParseError`] outcome.
    pub async fn collect_pages<F, Fut>(
        first: QueryDescriptor,
        max_pages: usize,
        mut fetch_page: F,
    ) -> ChunkPages
    where
        F: FnMut(QueryDescriptor) -> Fut,
        Fut: Future<Output = RetryOutcome>,
    {
        let max_pages = max_pages.max(1);
        let mut pages = Vec::new();
        let mut attempts = 0u32;
        let mut pages_requested = 0u32;
        let mut seen_cursors = HashSet::new();
        let mut descriptor = first;

        loop {
            debug!(
                feature_id = %descriptor.feature_id(),
                chunk = %descriptor.chunk(),
                page = pages.len() + 1,
                cursor = ?descriptor.cursor(),
                "Fetching page"
            );

            let RetryOutcome {
                outcome,
                attempts: page_attempts,
            } = fetch_page(descriptor.clone()).await;
            attempts = attempts.saturating_add(page_attempts);
            if page_attempts > 0 {
                pages_requested += 1;
            }

            let next_cursor = outcome.next_cursor().map(str::to_string);
            if let AttemptOutcome::Success(page) = &outcome {
                debug!(
                    feature_id = %descriptor.feature_id(),
                    page = pages.len() + 1,
                    rows = page.rows.len(),
                    has_next = next_cursor.is_some(),
                    "Received page"
                );
            }
            pages.push(outcome);

            let Some(cursor) = next_cursor else {
                break;
            };

            if !seen_cursors.insert(cursor.clone()) {
                pages.push(AttemptOutcome::Failure(Failure::new(
                    FailureKind::ParseError,
                    format!("cursor '{cursor}' repeated; pagination stopped"),
                )));
                break;
            }

            if pages.len() >= max_pages {
                pages.push(AttemptOutcome::Failure(Failure::new(
                    FailureKind::ParseError,
                    format!("more than {max_pages} pages for one chunk; pagination stopped"),
                )));
                break;
            }

            descriptor = match descriptor.with_cursor(cursor) {
                Ok(next) => next,
                Err(e) => {
                    pages.push(AttemptOutcome::Failure(Failure::new(
                        FailureKind::InvalidSelection,
                        e.to_string(),
                    )));
                    break;
                }
            };
        }

        debug!(
            pages = pages.len(),
            attempts = attempts,
            "Pagination completed"
        );

        ChunkPages {
            pages,
            attempts,
            pages_requested,
        }
    }
}
