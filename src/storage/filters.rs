//! Pagination and sorting parameters, validated before they reach storage.

use serde::Serialize;

use crate::validator::{permitted_value, Validator};

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    /// Column named by `sort` without its direction prefix. Callers validate first;
    /// anything outside the safelist falls back to `id`.
    pub fn sort_column(&self) -> &str {
        if !permitted_value(&self.sort.as_str(), self.sort_safelist) { return "id"; }
        self.sort.trim_start_matches('-')
    }

    pub fn descending(&self) -> bool { self.sort.starts_with('-') }

    pub fn limit(&self) -> usize { self.page_size.max(0) as usize }

    pub fn offset(&self) -> usize { ((self.page - 1).max(0) * self.page_size.max(0)) as usize }
}

pub fn validate_filters(v: &mut Validator, f: &Filters) {
    v.check(f.page > 0, "page", "must be greater than zero");
    v.check(f.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(f.page_size > 0, "page_size", "must be greater than zero");
    v.check(f.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
    v.check(permitted_value(&f.sort.as_str(), f.sort_safelist), "sort", "invalid sort value");
}

fn is_zero(n: &i64) -> bool { *n == 0 }

/// Pagination summary; every field is omitted when there are no records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 { return Metadata::default(); }
        Metadata {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}
