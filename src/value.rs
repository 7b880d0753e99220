//! Cell values - the closed scalar variant stored in table cells
//!
//! Cells are JSON-like scalars: string, number, boolean or null. Join-key
//! comparison never fails on mixed types; values of different variants fall
//! back to comparing their display form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Display form used for search, projection to text, and type-coercing
    /// comparisons. Null renders as the empty string, integral numbers
    /// render without a fractional part.
    pub fn display(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Str(s) => s.clone(),
        }
    }

    /// Join-key form of this value. Null cells and empty strings carry no
    /// key: a source row with no key has zero candidates, and a target row
    /// with no key is never indexed.
    pub fn join_key(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Str(s) if s.is_empty() => None,
            other => Some(other.display()),
        }
    }

    /// Equality with coercion: same variants compare natively, mixed
    /// variants compare by display form. Null equals nothing, not even
    /// another null.
    pub fn loose_eq(&self, other: &CellValue) -> bool {
        match (self, other) {
            (CellValue::Null, _) | (_, CellValue::Null) => false,
            (CellValue::Bool(a), CellValue::Bool(b)) => a == b,
            (CellValue::Number(a), CellValue::Number(b)) => a == b,
            (CellValue::Str(a), CellValue::Str(b)) => a == b,
            (a, b) => a.display() == b.display(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Str(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Str(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// Format a number the way spreadsheet exports do: integral values without
/// a trailing ".0" so that number 42 and string "42" compare equal.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
