use std::{fmt::Display, str::FromStr};

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{Error, error::Result};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Title,
    Year,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Parsed `sort` parameter. Only these combinations can ever reach a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub const SAFELIST: &[&str] = &[
        "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
    ];

    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// ORDER BY fragment for the `movies m` table alias.
    pub fn order_clause(&self) -> &'static str {
        use SortDirection::*;
        use SortField::*;
        match (self.field, self.direction) {
            (Id, Asc) => "m.id ASC",
            (Id, Desc) => "m.id DESC",
            (Title, Asc) => "m.title ASC",
            (Title, Desc) => "m.title DESC",
            (Year, Asc) => "m.year ASC",
            (Year, Desc) => "m.year DESC",
            (Runtime, Asc) => "m.runtime ASC",
            (Runtime, Desc) => "m.runtime DESC",
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        Self::new(SortField::Id, SortDirection::Asc)
    }
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, direction) = match s.trim() {
            name if name.starts_with('-') => (&name[1..], SortDirection::Desc),
            name if name.starts_with('+') => (&name[1..], SortDirection::Asc),
            name => (name, SortDirection::Asc),
        };
        let field = match name {
            "id" => SortField::Id,
            "title" => SortField::Title,
            "year" => SortField::Year,
            "runtime" => SortField::Runtime,
            _ => return Err(Error::InvalidOrderByField(s.to_string())),
        };
        Ok(Self::new(field, direction))
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.field {
            SortField::Id => "id",
            SortField::Title => "title",
            SortField::Year => "year",
            SortField::Runtime => "runtime",
        };
        match self.direction {
            SortDirection::Asc => write!(f, "{name}"),
            SortDirection::Desc => write!(f, "-{name}"),
        }
    }
}

fn validate_page(page: &i64, _ctx: &()) -> garde::Result {
    if *page <= 0 {
        Err(garde::Error::new("must be greater than zero"))
    } else if *page > MAX_PAGE {
        Err(garde::Error::new("must be a maximum of 10 million"))
    } else {
        Ok(())
    }
}

fn validate_page_size(page_size: &i64, _ctx: &()) -> garde::Result {
    if *page_size <= 0 {
        Err(garde::Error::new("must be greater than zero"))
    } else if *page_size > MAX_PAGE_SIZE {
        Err(garde::Error::new("must be a maximum of 100"))
    } else {
        Ok(())
    }
}

fn validate_sort(sort: &str, _ctx: &()) -> garde::Result {
    sort.parse::<SortKey>()
        .map(|_| ())
        .map_err(|_| garde::Error::new("invalid sort value"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Filters {
    #[garde(custom(validate_page))]
    pub page: i64,
    #[garde(custom(validate_page_size))]
    pub page_size: i64,
    #[garde(custom(validate_sort))]
    pub sort: String,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: "id".to_string(),
        }
    }
}

impl Filters {
    pub fn new(page: i64, page_size: i64, sort: impl Into<String>) -> Self {
        Self {
            page,
            page_size,
            sort: sort.into(),
        }
    }

    pub fn sort_key(&self) -> Result<SortKey> {
        self.sort.parse()
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records <= 0 || page_size <= 0 {
            return Metadata::default();
        }

        Metadata {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }
}
