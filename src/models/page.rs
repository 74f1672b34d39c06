//! Offset/limit pagination derived from a 1-based page number.

use serde::Deserialize;

use crate::errors::AppError;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination query parameters as they arrive on the wire.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl PageParams {
    /// Validate and convert into an offset/limit pair.
    pub fn page(&self) -> Result<Page, AppError> {
        Page::new(
            self.page_number.unwrap_or(1),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

/// A validated page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Result<Self, AppError> {
        if number < 1 {
            return Err(AppError::Validation(
                "pageNumber must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(AppError::Validation(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(Self { number, size })
    }

    pub fn first(size: u32) -> Result<Self, AppError> {
        Self::new(1, size)
    }

    pub fn next(&self) -> Self {
        Self {
            number: self.number + 1,
            size: self.size,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number as i64 - 1) * self.size as i64
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let page = PageParams::default().page().unwrap();
        assert_eq!(page.offset(), 0);
        assert_eq!(page.limit(), 50);
    }

    #[test]
    fn test_offset_from_page_number() {
        let page = Page::new(3, 20).unwrap();
        assert_eq!(page.offset(), 40);
        assert_eq!(page.next().offset(), 60);
    }

    #[test]
    fn test_bounds() {
        assert!(Page::new(0, 10).is_err());
        assert!(Page::new(1, 0).is_err());
        assert!(Page::new(1, 101).is_err());
        assert!(Page::new(1, 100).is_ok());
    }
}
