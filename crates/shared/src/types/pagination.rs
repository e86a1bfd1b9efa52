//! Limit/offset pagination for list endpoints.

use serde::Deserialize;

/// Hard ceiling on rows returned by a single list call.
pub const MAX_PAGE_SIZE: u64 = 200;

const DEFAULT_PAGE_SIZE: u64 = 50;

/// Query parameters accepted by every list endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    /// Requested page size; clamped to `1..=MAX_PAGE_SIZE`.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
}

impl PageRequest {
    /// Creates a page request.
    #[must_use]
    pub const fn new(limit: u64, offset: u64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Effective limit after defaults and clamping.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Effective offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}
