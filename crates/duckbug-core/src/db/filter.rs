//! Structured filters compiled to parameterised SQL.
//!
//! Callers never splice values into SQL text. Each filter field becomes one
//! [`Predicate`]; a [`WhereClause`] renders the predicates with positional
//! `?N` placeholders and hands back the bound values in the same order.
//! Column names are `&'static str` so only fixed identifiers reach the SQL.
//!
//! Case-insensitive search goes through [`FOLD_FN`], a Unicode lower-casing
//! scalar registered on every store connection by [`register_functions`].
//! SQLite's built-in `lower()` only folds ASCII.

use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;

use crate::error::UnknownVariant;

/// One condition over a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = ?`
    Eq(&'static str, Value),
    /// `column >= ?` (inclusive lower bound)
    Gte(&'static str, Value),
    /// `column <= ?` (inclusive upper bound)
    Lte(&'static str, Value),
    /// Case-insensitive substring match; `%`, `_` and `\` in the needle are
    /// matched literally.
    ContainsIgnoreCase(&'static str, String),
    /// `column IN (?, ?, ...)`; an empty list matches nothing.
    InList(&'static str, Vec<Value>),
}

impl Predicate {
    /// Equality on a text column; `None` when the value is absent or blank.
    #[must_use]
    pub fn text_eq(column: &'static str, value: Option<&str>) -> Option<Self> {
        non_blank(value).map(|v| Self::Eq(column, Value::Text(v.to_string())))
    }

    /// Substring search; `None` when the needle is absent or blank.
    #[must_use]
    pub fn search(column: &'static str, needle: Option<&str>) -> Option<Self> {
        non_blank(needle).map(|v| Self::ContainsIgnoreCase(column, v.to_string()))
    }

    fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Self::Eq(column, value) => {
                params.push(value.clone());
                let _ = write!(sql, "{column} = ?{}", params.len());
            }
            Self::Gte(column, value) => {
                params.push(value.clone());
                let _ = write!(sql, "{column} >= ?{}", params.len());
            }
            Self::Lte(column, value) => {
                params.push(value.clone());
                let _ = write!(sql, "{column} <= ?{}", params.len());
            }
            Self::ContainsIgnoreCase(column, needle) => {
                params.push(Value::Text(format!("%{}%", escape_like(needle))));
                let _ = write!(
                    sql,
                    "{FOLD_FN}({column}) LIKE {FOLD_FN}(?{}) ESCAPE '\\'",
                    params.len()
                );
            }
            Self::InList(column, values) => {
                if values.is_empty() {
                    sql.push_str("0 = 1");
                    return;
                }
                let _ = write!(sql, "{column} IN (");
                for (idx, value) in values.iter().enumerate() {
                    params.push(value.clone());
                    if idx > 0 {
                        sql.push_str(", ");
                    }
                    let _ = write!(sql, "?{}", params.len());
                }
                sql.push(')');
            }
        }
    }
}

/// Name of the Unicode case-folding SQL function.
pub const FOLD_FN: &str = "duckbug_fold";

/// Register the scalar functions filters rely on. Must run once per
/// connection before any search predicate is executed.
///
/// # Errors
///
/// Returns an error if SQLite rejects the function registration.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).to_lowercase()),
                other => Value::from(other),
            })
        },
    )
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Escape LIKE wildcards so the needle matches literally under `ESCAPE '\'`.
#[must_use]
pub fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Conjunction of predicates (AND semantics).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    predicates: Vec<Predicate>,
}

impl WhereClause {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add the predicate only when present.
    #[must_use]
    pub fn and_opt(self, predicate: Option<Predicate>) -> Self {
        match predicate {
            Some(predicate) => self.and(predicate),
            None => self,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Render as ` WHERE a = ?1 AND b >= ?2` (or an empty string) plus the
    /// values to bind.
    #[must_use]
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_after(Vec::new())
    }

    /// Like [`Self::build`], but numbering continues after `leading`, the
    /// values already bound by the surrounding statement (`?1..?N`). The
    /// returned params start with `leading`.
    #[must_use]
    pub fn build_after(&self, leading: Vec<Value>) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = leading;
        for (idx, predicate) in self.predicates.iter().enumerate() {
            sql.push_str(if idx == 0 { " WHERE " } else { " AND " });
            predicate.render(&mut sql, &mut params);
        }
        (sql, params)
    }
}

/// Direction of a single-column sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// `ORDER BY` fragment for `column`. Equal keys fall back to insertion
    /// order.
    #[must_use]
    pub fn order_by(self, column: &'static str) -> String {
        let keyword = match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        };
        format!(" ORDER BY {column} {keyword}, rowid ASC")
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(UnknownVariant {
                field: "sort",
                raw: s.to_string(),
                expected: "asc, desc",
            }),
        }
    }
}

/// Limit/offset window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 50;

    #[must_use]
    pub const fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Cap `limit` at `max`.
    #[must_use]
    pub const fn clamped(self, max: u32) -> Self {
        Self {
            limit: if self.limit > max { max } else { self.limit },
            offset: self.offset,
        }
    }

    pub(crate) fn sql(self) -> String {
        format!(" LIMIT {} OFFSET {}", self.limit, self.offset)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}
