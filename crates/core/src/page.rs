use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            total: 0,
            page: 1,
            total_pages: 0,
        }
    }
}

pub fn total_pages(total: u64, limit: u32) -> u32 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(u64::from(limit)) as u32
}

impl Pagination {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        Self {
            total,
            page: page.max(1),
            total_pages: total_pages(total, limit),
        }
    }

    /// A page index past the last page collapses to the first page.
    pub fn clamped(self) -> Self {
        let page = if self.page > self.total_pages.max(1) || self.page == 0 {
            1
        } else {
            self.page
        };
        Self { page, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn out_of_range_page_clamps_to_first() {
        let p = Pagination {
            total: 10,
            page: 2,
            total_pages: 1,
        };
        assert_eq!(p.clamped().page, 1);

        let empty = Pagination::new(0, 1, 10).clamped();
        assert_eq!(empty.page, 1);

        let in_range = Pagination::new(25, 3, 10).clamped();
        assert_eq!(in_range.page, 3);
    }
}
