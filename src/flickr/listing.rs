//! Collection enumeration across listing pages.

use tracing::{debug, info, warn};

use super::executor::RequestOutcome;
use super::types::PhotoRecord;
use super::FlickrService;

/// Default and maximum page size accepted by the listing endpoint.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Everything an enumeration pass produced.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Records in page order, then response order within a page. Never
    /// deduplicated: an id repeated across pages appears twice.
    pub records: Vec<PhotoRecord>,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    /// The page cap stopped enumeration before the reported last page.
    pub truncated: bool,
}

/// Walk the listing pages of `account_id`.
///
/// `total_pages` starts at 1 and is refreshed from every successful
/// response, since the API may revise it mid-walk. A page that fails is
/// logged and skipped; the page counter still advances.
pub async fn enumerate(
    service: &FlickrService,
    account_id: &str,
    page_size: u32,
    max_pages: Option<u32>,
) -> Enumeration {
    let mut result = Enumeration::default();
    let mut total_pages: u32 = 1;
    let mut page: u32 = 1;

    while page <= total_pages {
        if let Some(cap) = max_pages {
            if page > cap {
                info!(
                    "Stopping at page cap {} ({} pages reported)",
                    cap, total_pages
                );
                result.truncated = true;
                break;
            }
        }

        match service.list_photos(account_id, page, page_size).await {
            RequestOutcome::Success(resp) => {
                debug!(
                    page = resp.photos.page,
                    pages = resp.photos.pages,
                    total = resp.photos.total,
                    "listing page received"
                );
                total_pages = resp.photos.pages;
                let count = resp.photos.photo.len();
                result.records.extend(resp.photos.photo);
                result.pages_fetched += 1;
                info!(
                    "Fetched page {}/{} ({} items, {} total so far)",
                    page,
                    total_pages,
                    count,
                    result.records.len()
                );
            }
            failure => {
                warn!(
                    "Skipping listing page {} for {}: {}",
                    page,
                    account_id,
                    failure.describe()
                );
                result.pages_failed += 1;
            }
        }
        page += 1;
    }

    debug!(
        pages_fetched = result.pages_fetched,
        pages_failed = result.pages_failed,
        truncated = result.truncated,
        "enumeration finished"
    );
    result
}
