//! Pagination parameters shared by `Match` and `Reverse` (§4.6, §9
//! "pagination via keys, not offsets").

use crate::bounds::{Cursor, PageSize};
use serde::{Deserialize, Serialize};

/// Pagination parameters for a paged read. `page_key` resumes a prior scan
/// from the key it left off at; an initial (empty) cursor starts from the
/// beginning of the matched key range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging {
    /// Cursor to resume from, or `Cursor::initial()` for a first page.
    #[serde(default)]
    pub page_key: Cursor,
    /// Maximum rows to return in this page.
    #[serde(default = "PageSize::default_value")]
    pub limit: PageSize,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_key: Cursor::default(),
            limit: PageSize::default_value(),
        }
    }
}
