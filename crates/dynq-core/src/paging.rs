//! Page window arithmetic and paged results.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::provider::Query;

/// Skip/take window for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    /// Rows before the page.
    pub skip: usize,
    /// Rows in the page.
    pub take: usize,
}

impl PageWindow {
    /// Window for 1-based `page` of `page_size` rows.
    ///
    /// Both values must be at least 1 and `page_size` must not exceed
    /// `max_page_size` when one is set.
    pub fn new(page: i64, page_size: i64, max_page_size: Option<usize>) -> Result<Self> {
        if page < 1 {
            return Err(Error::validation(format!(
                "page must be at least 1, got {}",
                page
            )));
        }
        if page_size < 1 {
            return Err(Error::validation(format!(
                "page size must be at least 1, got {}",
                page_size
            )));
        }

        let too_large = || Error::validation(format!("page window {} x {} is too large", page, page_size));
        let take = usize::try_from(page_size).map_err(|_| too_large())?;
        if let Some(max) = max_page_size {
            if take > max {
                return Err(Error::validation(format!(
                    "page size {} exceeds the maximum of {}",
                    take, max
                )));
            }
        }
        let skip = usize::try_from(page - 1)
            .ok()
            .and_then(|p| p.checked_mul(take))
            .ok_or_else(too_large)?;

        Ok(Self { skip, take })
    }
}

/// Number of pages needed for `row_count` rows.
pub fn page_count(row_count: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    row_count.div_ceil(page_size)
}

/// One page of a sequence plus paging metadata.
///
/// Serializes the metadata only.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult {
    /// 1-based page number.
    pub current_page: usize,
    /// Rows per page.
    pub page_size: usize,
    /// Total number of pages.
    pub page_count: usize,
    /// Rows in the whole source.
    pub row_count: usize,
    /// Handle over the page's rows.
    #[serde(skip)]
    pub query: Query,
}

impl PagedResult {
    /// Check if a later page exists.
    pub fn has_next_page(&self) -> bool {
        self.current_page < self.page_count
    }

    /// Check if an earlier page exists.
    pub fn has_previous_page(&self) -> bool {
        self.current_page > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window() {
        assert_eq!(
            PageWindow::new(1, 10, None).unwrap(),
            PageWindow { skip: 0, take: 10 }
        );
        assert_eq!(
            PageWindow::new(3, 25, None).unwrap(),
            PageWindow { skip: 50, take: 25 }
        );
    }

    #[test]
    fn test_window_validation() {
        assert!(PageWindow::new(0, 10, None).unwrap_err().is_validation());
        assert!(PageWindow::new(1, 0, None).unwrap_err().is_validation());
        assert!(PageWindow::new(-2, 5, None).unwrap_err().is_validation());
        assert!(PageWindow::new(1, 101, Some(100)).unwrap_err().is_validation());
        assert!(PageWindow::new(i64::MAX, i64::MAX, None).unwrap_err().is_validation());
        assert!(PageWindow::new(2, 100, Some(100)).is_ok());
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(10, 3), 4);
        assert_eq!(page_count(9, 3), 3);
        assert_eq!(page_count(0, 3), 0);
        assert_eq!(page_count(1, 50), 1);
    }
}
