//! Paginação das listagens: `?page=&limit=` e o envelope da resposta

use clinic_core::coordinator::{page_request, MAX_PAGE_SIZE};
use clinic_core::{Page, PageRequest};
use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: i64 = 10;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn request(&self) -> PageRequest {
        page_request(self.page(), self.per_page())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn new(page: Page<T>, params: &PageParams) -> Self {
        let per_page = params.per_page();
        let current = params.page();
        let pages = (page.total + per_page - 1) / per_page;
        Self {
            items: page.items,
            pagination: Pagination {
                page: current,
                per_page,
                total: page.total,
                pages,
                has_next: current < pages,
                has_prev: current > 1,
            },
        }
    }
}
