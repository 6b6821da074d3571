//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

impl Pagination {
    /// Row offset for the current page
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Date range for kardex queries (inclusive bounds)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub desde: Option<chrono::DateTime<chrono::Utc>>,
    pub hasta: Option<chrono::DateTime<chrono::Utc>>,
}

impl DateRange {
    pub fn unbounded() -> Self {
        Self {
            desde: None,
            hasta: None,
        }
    }

    /// A range is well-formed when both bounds are present and ordered,
    /// or at least one bound is open.
    pub fn is_well_formed(&self) -> bool {
        match (self.desde, self.hasta) {
            (Some(d), Some(h)) => d <= h,
            _ => true,
        }
    }
}
