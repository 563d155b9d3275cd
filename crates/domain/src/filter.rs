//! Filter query builder for paginated listings
//!
//! Every fallible step validates eagerly, so a malformed query is rejected
//! with a `ValidationError` before any request is built.
//!
//! ```rust
//! use catalink_domain::{FilterBuilder, SortDirection};
//!
//! let query = FilterBuilder::new()
//!     .eq("platform", "pc")
//!     .between("price", 5.0, 20.0)?
//!     .sort_by("price", SortDirection::Asc)
//!     .paginate(1, 50)?
//!     .build();
//!
//! assert_eq!(query.page, 1);
//! assert_eq!(query.page_size, 50);
//! # Ok::<(), catalink_domain::CatalinkError>(())
//! ```

use std::fmt::Display;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE};
use crate::errors::{CatalinkError, Result};
use crate::impl_wire_name;

/// Field name the vendor uses for last-modified timestamps
pub const UPDATED_AT_FIELD: &str = "updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    Between,
}

impl_wire_name!(FilterOp {
    Eq => "eq",
    Ne => "ne",
    Gt => "gt",
    Gte => "gte",
    Lt => "lt",
    Lte => "lte",
    In => "in",
    NotIn => "not_in",
    Like => "like",
    Between => "between",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchClause {
    pub query: String,
    pub fields: Vec<String>,
}

/// A validated listing query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterQuery {
    pub predicates: Vec<Predicate>,
    pub sort: Vec<SortKey>,
    pub page: u32,
    pub page_size: u32,
    pub search: Option<SearchClause>,
}

impl Default for FilterQuery {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
            sort: Vec::new(),
            page: MIN_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl FilterQuery {
    /// Same query positioned on another page
    ///
    /// Used by the paginated fetcher, which walks pages itself.
    pub fn for_page(&self, page: u32) -> Self {
        Self { page: page.max(MIN_PAGE), ..self.clone() }
    }

    /// This query narrowed to records modified at or after `since`, oldest
    /// first
    ///
    /// Existing predicates are kept. Any existing sort keys follow
    /// `updated_at` ascending.
    pub fn changed_since(&self, since: DateTime<Utc>) -> Self {
        let mut query = FilterBuilder { query: self.clone() }.updated_since(since).build();
        query.sort.retain(|key| key.field != UPDATED_AT_FIELD);
        query.sort.insert(
            0,
            SortKey { field: UPDATED_AT_FIELD.to_string(), direction: SortDirection::Asc },
        );
        query
    }

    /// Render as query-string pairs
    ///
    /// Predicates become `filter[field][op]=v1,v2`, sort keys are joined as
    /// `field,-field` (leading `-` for descending).
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(self.predicates.len() + 5);

        for predicate in &self.predicates {
            params.push((
                format!("filter[{}][{}]", predicate.field, predicate.op),
                predicate.values.join(","),
            ));
        }

        if !self.sort.is_empty() {
            let sort = self
                .sort
                .iter()
                .map(|key| match key.direction {
                    SortDirection::Asc => key.field.clone(),
                    SortDirection::Desc => format!("-{}", key.field),
                })
                .collect::<Vec<_>>()
                .join(",");
            params.push(("sort".to_string(), sort));
        }

        if let Some(search) = &self.search {
            params.push(("search".to_string(), search.query.clone()));
            params.push(("search_fields".to_string(), search.fields.join(",")));
        }

        params.push(("page".to_string(), self.page.to_string()));
        params.push(("page_size".to_string(), self.page_size.to_string()));
        params
    }
}

/// Builder for [`FilterQuery`]
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    query: FilterQuery,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: &str, op: FilterOp, values: Vec<String>) -> Self {
        self.query.predicates.push(Predicate { field: field.to_string(), op, values });
        self
    }

    pub fn eq(self, field: &str, value: impl Display) -> Self {
        self.push(field, FilterOp::Eq, vec![value.to_string()])
    }

    pub fn ne(self, field: &str, value: impl Display) -> Self {
        self.push(field, FilterOp::Ne, vec![value.to_string()])
    }

    pub fn gt(self, field: &str, value: impl Display) -> Self {
        self.push(field, FilterOp::Gt, vec![value.to_string()])
    }

    pub fn gte(self, field: &str, value: impl Display) -> Self {
        self.push(field, FilterOp::Gte, vec![value.to_string()])
    }

    pub fn lt(self, field: &str, value: impl Display) -> Self {
        self.push(field, FilterOp::Lt, vec![value.to_string()])
    }

    pub fn lte(self, field: &str, value: impl Display) -> Self {
        self.push(field, FilterOp::Lte, vec![value.to_string()])
    }

    /// SQL-style pattern match (`%` wildcard)
    pub fn like(self, field: &str, pattern: impl Display) -> Self {
        self.push(field, FilterOp::Like, vec![pattern.to_string()])
    }

    /// Set membership. Rejects an empty set.
    pub fn in_set<I, V>(self, field: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        if values.is_empty() {
            return Err(CatalinkError::validation(format!("`in` filter on {field} needs values")));
        }
        Ok(self.push(field, FilterOp::In, values))
    }

    pub fn not_in_set<I, V>(self, field: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        if values.is_empty() {
            return Err(CatalinkError::validation(format!(
                "`not_in` filter on {field} needs values"
            )));
        }
        Ok(self.push(field, FilterOp::NotIn, values))
    }

    /// Inclusive range. Rejects `min > max`.
    pub fn between<V>(self, field: &str, min: V, max: V) -> Result<Self>
    where
        V: PartialOrd + Display,
    {
        if min > max {
            return Err(CatalinkError::validation(format!(
                "invalid range for {field}: min {min} is greater than max {max}"
            )));
        }
        Ok(self.push(field, FilterOp::Between, vec![min.to_string(), max.to_string()]))
    }

    /// Records modified at or after `since`
    pub fn updated_since(self, since: DateTime<Utc>) -> Self {
        self.gte(UPDATED_AT_FIELD, since.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Append a sort key; earlier keys take precedence.
    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.query.sort.push(SortKey { field: field.to_string(), direction });
        self
    }

    pub fn paginate(mut self, page: u32, page_size: u32) -> Result<Self> {
        if page < MIN_PAGE {
            return Err(CatalinkError::validation(format!("page must be >= {MIN_PAGE}, got {page}")));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(CatalinkError::validation(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        self.query.page = page;
        self.query.page_size = page_size;
        Ok(self)
    }

    /// Free-text search over the named fields
    pub fn search<I, S>(mut self, query: &str, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let query = query.trim();
        if query.is_empty() {
            return Err(CatalinkError::validation("search query must not be empty"));
        }
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(CatalinkError::validation("search needs at least one field"));
        }
        self.query.search = Some(SearchClause { query: query.to_string(), fields });
        Ok(self)
    }

    pub fn build(self) -> FilterQuery {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_paginate_rejects_out_of_range_values() {
        let err = FilterBuilder::new().paginate(0, 50).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);

        let err = FilterBuilder::new().paginate(1, 501).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);

        assert!(FilterBuilder::new().paginate(1, 0).is_err());
        assert!(FilterBuilder::new().paginate(3, 500).is_ok());
    }

    #[test]
    fn test_search_validation() {
        assert!(FilterBuilder::new().search("   ", ["name"]).is_err());
        assert!(FilterBuilder::new().search("witcher", Vec::<String>::new()).is_err());

        let query = FilterBuilder::new().search(" witcher ", ["name", "tags"]).unwrap().build();
        let search = query.search.unwrap();
        assert_eq!(search.query, "witcher");
        assert_eq!(search.fields, vec!["name", "tags"]);
    }

    #[test]
    fn test_between_rejects_inverted_range() {
        let err = FilterBuilder::new().between("price", 20, 5).unwrap_err();
        assert!(err.message.contains("min 20 is greater than max 5"));
        assert!(FilterBuilder::new().between("price", 5, 5).is_ok());
    }

    /// Validates narrowing an existing query to a delta window.
    ///
    /// Assertions:
    /// - The caller's predicate survives next to the `updated_at` bound.
    /// - `updated_at` ascending becomes the leading sort key.
    #[test]
    fn test_changed_since_keeps_existing_predicates() {
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let base = FilterBuilder::new()
            .eq("region", "EU")
            .sort_by("name", SortDirection::Desc)
            .sort_by(UPDATED_AT_FIELD, SortDirection::Desc)
            .build();

        let params = base.changed_since(since).to_query_params();

        assert!(params.contains(&("filter[region][eq]".to_string(), "EU".to_string())));
        assert!(params.contains(&(
            "filter[updated_at][gte]".to_string(),
            "2026-03-01T12:00:00.000Z".to_string()
        )));
        assert!(params.contains(&("sort".to_string(), "updated_at,-name".to_string())));
    }

    #[test]
    fn test_empty_sets_rejected() {
        assert!(FilterBuilder::new().in_set("id", Vec::<u32>::new()).is_err());
        assert!(FilterBuilder::new().not_in_set("id", Vec::<u32>::new()).is_err());
    }

    #[test]
    fn test_query_params_rendering() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let query = FilterBuilder::new()
            .eq("platform", "pc")
            .in_set("region", ["eu", "us"])
            .unwrap()
            .updated_since(since)
            .sort_by("price", SortDirection::Asc)
            .sort_by("name", SortDirection::Desc)
            .paginate(2, 25)
            .unwrap()
            .build();

        let params = query.to_query_params();
        assert!(params.contains(&("filter[platform][eq]".into(), "pc".into())));
        assert!(params.contains(&("filter[region][in]".into(), "eu,us".into())));
        assert!(params
            .contains(&("filter[updated_at][gte]".into(), "2024-03-01T12:00:00.000Z".into())));
        assert!(params.contains(&("sort".into(), "price,-name".into())));
        assert!(params.contains(&("page".into(), "2".into())));
        assert!(params.contains(&("page_size".into(), "25".into())));
    }

    #[test]
    fn test_for_page_keeps_predicates() {
        let query = FilterBuilder::new().eq("platform", "pc").build();
        let next = query.for_page(4);
        assert_eq!(next.page, 4);
        assert_eq!(next.predicates, query.predicates);
        assert_eq!(query.for_page(0).page, 1);
    }
}
