//! Error Classifier
//!
//! Reduces warehouse diagnostics to one readable line and classifies them
//! for the recovery prompt.

use serde::{Deserialize, Serialize};
use std::fmt;

const EMPTY_ERROR: &str = "Unknown error (empty error message)";
const BOILERPLATE_PREFIXES: &[&str] = &["Error: ", "SnowflakeError: ", "Exception: "];
const FALLBACK_CHARS: usize = 200;

/// First line mentioning "error" (boilerplate prefixes removed), else the
/// first non-blank line, else a short prefix of the raw text.
pub fn normalize_error(raw: &str) -> String {
    if raw.trim().is_empty() {
        return EMPTY_ERROR.to_string();
    }

    if let Some(line) = raw.lines().find(|l| l.to_lowercase().contains("error")) {
        let mut cleaned = line.trim();
        for prefix in BOILERPLATE_PREFIXES {
            if let Some(rest) = cleaned.strip_prefix(prefix) {
                cleaned = rest;
            }
        }
        return cleaned.to_string();
    }

    if let Some(line) = raw.lines().map(str::trim).find(|l| !l.is_empty()) {
        return line.to_string();
    }

    raw.chars().take(FALLBACK_CHARS).collect::<String>().trim().to_string()
}

/// SQL error classification taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlErrorClass {
    ObjectNotFound,
    InvalidIdentifier,
    AmbiguousColumn,
    InvalidAggregation,
    TypeMismatch,
    Syntax,
    Permission,
    Other,
}

impl fmt::Display for SqlErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlErrorClass::ObjectNotFound => "ObjectNotFound",
            SqlErrorClass::InvalidIdentifier => "InvalidIdentifier",
            SqlErrorClass::AmbiguousColumn => "AmbiguousColumn",
            SqlErrorClass::InvalidAggregation => "InvalidAggregation",
            SqlErrorClass::TypeMismatch => "TypeMismatch",
            SqlErrorClass::Syntax => "Syntax",
            SqlErrorClass::Permission => "Permission",
            SqlErrorClass::Other => "Other",
        };
        write!(f, "{}", name)
    }
}

impl SqlErrorClass {
    /// One-line fix suggestion appended to the recovery prompt
    pub fn hint(&self) -> &'static str {
        match self {
            SqlErrorClass::ObjectNotFound => {
                "A table does not exist. Use only the fully qualified tables listed in AVAILABLE TABLES."
            }
            SqlErrorClass::InvalidIdentifier => {
                "A column name is wrong or attached to the wrong table. Use only columns listed under their table in the schema."
            }
            SqlErrorClass::AmbiguousColumn => {
                "A column exists in more than one joined table. Qualify every column with its table name."
            }
            SqlErrorClass::InvalidAggregation => {
                "Every non-aggregated selected column must appear in GROUP BY; aggregate before applying window functions."
            }
            SqlErrorClass::TypeMismatch => {
                "Compared or combined values have incompatible types. Cast explicitly or use the correct date functions."
            }
            SqlErrorClass::Syntax => "The statement does not parse. Use plain Snowflake SQL with no commentary.",
            SqlErrorClass::Permission => "The role cannot read an object. Use only the listed tables.",
            SqlErrorClass::Other => "Re-check the joins, filters and functions against the schema.",
        }
    }
}

/// Error classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a (normalized or raw) warehouse message
    pub fn classify(&self, message: &str) -> SqlErrorClass {
        let msg = message.to_lowercase();

        if msg.contains("invalid identifier") {
            return SqlErrorClass::InvalidIdentifier;
        }

        if msg.contains("does not exist") || msg.contains("not found") {
            return SqlErrorClass::ObjectNotFound;
        }

        if msg.contains("ambiguous") {
            return SqlErrorClass::AmbiguousColumn;
        }

        if msg.contains("group by") || msg.contains("aggregate") || msg.contains("aggregation") {
            return SqlErrorClass::InvalidAggregation;
        }

        if msg.contains("is not recognized")
            || msg.contains("cannot be cast")
            || msg.contains("invalid argument types")
            || (msg.contains("type") && (msg.contains("mismatch") || msg.contains("incompatible")))
        {
            return SqlErrorClass::TypeMismatch;
        }

        if msg.contains("syntax error") || msg.contains("unexpected") {
            return SqlErrorClass::Syntax;
        }

        if msg.contains("insufficient privileges") || msg.contains("not authorized") {
            return SqlErrorClass::Permission;
        }

        SqlErrorClass::Other
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
