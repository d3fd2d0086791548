//! Composable equality filters for repository lookups.
//!
//! A repository exposes a column enum implementing [`Column`]; callers pass
//! a slice of [`Filter`]s which is rendered as a conjunction after the
//! repository's base query. Values are always bound, never interpolated.

use sqlx::{QueryBuilder, Sqlite};

use crate::error::{ForumError, Result};

/// A filterable column of one entity.
pub trait Column: Copy {
    /// Qualified SQL expression for this column.
    fn sql(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    NotEq,
}

impl Op {
    const fn sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::NotEq => " <> ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Int(i64),
    Text(String),
    Bool(bool),
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter<C> {
    pub column: C,
    pub op: Op,
    pub value: FilterValue,
}

impl<C: Column> Filter<C> {
    pub fn eq(column: C, value: impl Into<FilterValue>) -> Self {
        Self {
            column,
            op: Op::Eq,
            value: value.into(),
        }
    }

    pub fn ne(column: C, value: impl Into<FilterValue>) -> Self {
        Self {
            column,
            op: Op::NotEq,
            value: value.into(),
        }
    }
}

/// Append ` WHERE a = ? AND b <> ?` for the given filters. Nothing is
/// pushed for an empty slice.
pub(crate) fn push_where<C: Column>(qb: &mut QueryBuilder<'_, Sqlite>, filters: &[Filter<C>]) {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(filter.column.sql());
        qb.push(filter.op.sql());
        match &filter.value {
            FilterValue::Int(v) => qb.push_bind(*v),
            FilterValue::Text(v) => qb.push_bind(v.clone()),
            FilterValue::Bool(v) => qb.push_bind(*v),
        };
    }
}

/// Collapse a `find` result into the single row `find_one` promises.
pub(crate) fn exactly_one<T>(mut rows: Vec<T>) -> Result<T> {
    match rows.len() {
        0 => Err(ForumError::NotFound),
        1 => Ok(rows.swap_remove(0)),
        n => Err(ForumError::AmbiguousResult(n)),
    }
}
