//! Bounded scalar newtypes shared by requests and responses.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Default and maximum page size for `Match`/`Reverse` (§4.6).
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 10_000;
pub const MAX_CONCURRENCY: u32 = 256;
pub const MAX_RANK_ITERATIONS: u32 = 1_000;
pub const DEFAULT_RANK_ITERATIONS: u32 = 10;
pub const DEFAULT_RANK_DAMPING: f64 = 0.85;
pub const DEFAULT_RANK_SCALE: u32 = 4;

/// `serde(default = ...)` helper for `RankParams::scale`.
pub fn default_rank_scale() -> u32 {
    DEFAULT_RANK_SCALE
}

/// Page size for paginated reads. Bounded to keep a single RPC response
/// from growing unbounded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageSize(NonZeroU32);

impl PageSize {
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    pub fn default_value() -> Self {
        PageSize(NonZeroU32::new(DEFAULT_PAGE_SIZE).unwrap())
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::default_value()
    }
}

impl TryFrom<u32> for PageSize {
    type Error = BoundsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(BoundsError::TooSmall);
        }
        if value > MAX_PAGE_SIZE {
            return Err(BoundsError::TooLarge);
        }
        Ok(PageSize(NonZeroU32::new(value).unwrap()))
    }
}

/// Bounded concurrency for `Scan`'s worker pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Concurrency(NonZeroU32);

impl Concurrency {
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for Concurrency {
    type Error = BoundsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(BoundsError::TooSmall);
        }
        if value > MAX_CONCURRENCY {
            return Err(BoundsError::TooLarge);
        }
        Ok(Concurrency(NonZeroU32::new(value).unwrap()))
    }
}

/// Uniform sample rate in `[0.0, 1.0]` used by `Scan`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SampleRate(f64);

impl SampleRate {
    pub fn get(&self) -> f64 {
        self.0
    }

    pub fn always() -> Self {
        SampleRate(1.0)
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::always()
    }
}

impl TryFrom<f64> for SampleRate {
    type Error = BoundsError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(BoundsError::OutOfRange);
        }
        Ok(SampleRate(value))
    }
}

/// PageRank damping factor in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Damping(f64);

impl Damping {
    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for Damping {
    fn default() -> Self {
        Damping(DEFAULT_RANK_DAMPING)
    }
}

impl TryFrom<f64> for Damping {
    type Error = BoundsError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(BoundsError::OutOfRange);
        }
        Ok(Damping(value))
    }
}

/// PageRank iteration count, bounded to avoid runaway compute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Iterations(NonZeroU32);

impl Iterations {
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl Default for Iterations {
    fn default() -> Self {
        Iterations(NonZeroU32::new(DEFAULT_RANK_ITERATIONS).unwrap())
    }
}

impl TryFrom<u32> for Iterations {
    type Error = BoundsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(BoundsError::TooSmall);
        }
        if value > MAX_RANK_ITERATIONS {
            return Err(BoundsError::TooLarge);
        }
        Ok(Iterations(NonZeroU32::new(value).unwrap()))
    }
}

#[derive(Debug, Clone)]
pub enum BoundsError {
    TooSmall,
    TooLarge,
    OutOfRange,
}

impl std::fmt::Display for BoundsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundsError::TooSmall => write!(f, "value too small"),
            BoundsError::TooLarge => write!(f, "value too large"),
            BoundsError::OutOfRange => write!(f, "value out of range"),
        }
    }
}

impl std::error::Error for BoundsError {}

/// Opaque pagination cursor. An empty cursor means "start from the
/// beginning"; a non-empty cursor is the import-path key to resume a scan
/// from (§4.2's "pagination via keys, not offsets").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    pub fn initial() -> Self {
        Cursor(String::new())
    }

    pub fn is_initial(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::initial()
    }
}

impl From<String> for Cursor {
    fn from(data: String) -> Self {
        Cursor(data)
    }
}

impl From<&str> for Cursor {
    fn from(data: &str) -> Self {
        Cursor(data.to_string())
    }
}

impl AsRef<str> for Cursor {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_bounds() {
        assert!(PageSize::try_from(1).is_ok());
        assert!(PageSize::try_from(MAX_PAGE_SIZE).is_ok());
        assert!(PageSize::try_from(MAX_PAGE_SIZE + 1).is_err());
        assert!(PageSize::try_from(0).is_err());
    }

    #[test]
    fn sample_rate_bounds() {
        assert!(SampleRate::try_from(0.0).is_ok());
        assert!(SampleRate::try_from(1.0).is_ok());
        assert!(SampleRate::try_from(1.5).is_err());
        assert!(SampleRate::try_from(-0.1).is_err());
    }

    #[test]
    fn cursor_initial_is_empty() {
        let cursor = Cursor::initial();
        assert_eq!(cursor.get(), "");
        assert!(cursor.is_initial());

        let cursor = Cursor::from("github.com/foo/bar".to_string());
        assert_eq!(cursor.get(), "github.com/foo/bar");
        assert!(!cursor.is_initial());
    }
}
