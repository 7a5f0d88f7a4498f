// peakstack-core/src/core/value.rs
// ============================================================================
// Module: Peakstack Parameter Values
// Description: Tagged parameter value type with coercion and constraints.
// Purpose: Provide one value model shared by documents and flat storage.
// Dependencies: regex, serde, serde_json
// ============================================================================

//! ## Overview
//! Every configuration leaf carries a [`ParamValue`], a closed sum over the
//! semantic types the configuration model supports. Coercion is performed by
//! small pure functions per tag, and canonical stringification round-trips
//! with parsing so the flat storage representation is loss-free.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::error::ConfigError;

// ============================================================================
// SECTION: Value Kind
// ============================================================================

/// Discriminant of the semantic parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Free-form string.
    Str,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Bool,
    /// List of strings.
    StrList,
    /// Structured JSON blob.
    Json,
}

impl ValueKind {
    /// Coerces a document value into a typed parameter value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the raw value does not
    /// match this kind.
    pub fn parse_document(self, key: &str, raw: &Value) -> Result<ParamValue, ConfigError> {
        let parsed = match self {
            Self::Str => raw.as_str().map(|text| ParamValue::Str(text.to_string())),
            Self::Int => raw.as_i64().map(ParamValue::Int),
            Self::Float => raw.as_f64().map(ParamValue::Float),
            Self::Bool => raw.as_bool().map(ParamValue::Bool),
            Self::StrList => raw.as_array().and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(ToString::to_string))
                    .collect::<Option<Vec<String>>>()
                    .map(ParamValue::StrList)
            }),
            Self::Json => Some(ParamValue::Json(raw.clone())),
        };
        parsed.ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: compact_json(raw),
            allowed: format!("a value of type {self}"),
        })
    }

    /// Parses a canonical storage string back into a typed parameter value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the string cannot be
    /// parsed as this kind.
    pub fn parse_storage(self, key: &str, raw: &str) -> Result<ParamValue, ConfigError> {
        let parsed = match self {
            Self::Str => Some(ParamValue::Str(raw.to_string())),
            Self::Int => raw.parse::<i64>().ok().map(ParamValue::Int),
            Self::Float => raw.parse::<f64>().ok().map(ParamValue::Float),
            Self::Bool => match raw {
                "true" => Some(ParamValue::Bool(true)),
                "false" => Some(ParamValue::Bool(false)),
                _ => None,
            },
            Self::StrList => {
                if raw.is_empty() {
                    Some(ParamValue::StrList(Vec::new()))
                } else {
                    Some(ParamValue::StrList(raw.split(',').map(ToString::to_string).collect()))
                }
            }
            Self::Json => serde_json::from_str(raw).ok().map(ParamValue::Json),
        };
        parsed.ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            allowed: format!("a value of type {self}"),
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("string"),
            Self::Int => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("boolean"),
            Self::StrList => f.write_str("string list"),
            Self::Json => f.write_str("structured"),
        }
    }
}

// ============================================================================
// SECTION: Parameter Value
// ============================================================================

/// Typed configuration leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Free-form string.
    Str(String),
    /// List of strings.
    StrList(Vec<String>),
    /// Structured JSON blob.
    Json(Value),
}

impl ParamValue {
    /// Returns the kind discriminant of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Str(_) => ValueKind::Str,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Bool(_) => ValueKind::Bool,
            Self::StrList(_) => ValueKind::StrList,
            Self::Json(_) => ValueKind::Json,
        }
    }

    /// Returns the string payload when this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer payload when this is an integer value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean payload when this is a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the list payload when this is a string-list value.
    #[must_use]
    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            Self::StrList(items) => Some(items),
            _ => None,
        }
    }

    /// Converts this value into its document (JSON) representation.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Str(text) => Value::String(text.clone()),
            Self::Int(value) => Value::from(*value),
            Self::Float(value) => Value::from(*value),
            Self::Bool(value) => Value::Bool(*value),
            Self::StrList(items) => {
                Value::Array(items.iter().map(|item| Value::String(item.clone())).collect())
            }
            Self::Json(value) => value.clone(),
        }
    }

    /// Returns the canonical string form used by the flat storage format.
    ///
    /// The canonical form round-trips through [`ValueKind::parse_storage`].
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Str(text) => text.clone(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::StrList(items) => items.join(","),
            Self::Json(value) => compact_json(value),
        }
    }
}

/// Serializes a JSON value compactly, falling back to an empty string.
fn compact_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

// ============================================================================
// SECTION: Allowed Values
// ============================================================================

/// Constraint on the values a parameter accepts.
#[derive(Debug, Clone)]
pub enum AllowedValues {
    /// Any value of the declared kind.
    Any,
    /// Exact membership in an enumerated set (canonical string forms).
    OneOf(Vec<String>),
    /// Full-match regular expression over the canonical string form.
    Pattern(Regex),
}

impl AllowedValues {
    /// Builds an enumerated-set constraint.
    #[must_use]
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Builds an anchored full-match pattern constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] when the pattern does not compile.
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        let anchored = format!("^(?:{pattern})$");
        Regex::new(&anchored)
            .map(Self::Pattern)
            .map_err(|err| ConfigError::Schema(format!("invalid pattern '{pattern}': {err}")))
    }

    /// Checks a value against this constraint.
    ///
    /// String lists are checked element-wise; scalar values are checked on
    /// their canonical string form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the value is outside the
    /// constraint.
    pub fn check(&self, key: &str, value: &ParamValue) -> Result<(), ConfigError> {
        if matches!(self, Self::Any) {
            return Ok(());
        }
        match value {
            ParamValue::StrList(items) => {
                for item in items {
                    self.check_text(key, item)?;
                }
                Ok(())
            }
            other => self.check_text(key, &other.canonical()),
        }
    }

    /// Checks a single canonical string form.
    fn check_text(&self, key: &str, text: &str) -> Result<(), ConfigError> {
        let allowed = match self {
            Self::Any => return Ok(()),
            Self::OneOf(values) => {
                if values.iter().any(|candidate| candidate == text) {
                    return Ok(());
                }
                format!("one of [{}]", values.join(", "))
            }
            Self::Pattern(regex) => {
                if regex.is_match(text) {
                    return Ok(());
                }
                format!("matching pattern {}", regex.as_str())
            }
        };
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: text.to_string(),
            allowed,
        })
    }

    /// Returns a short description used in error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any value".to_string(),
            Self::OneOf(values) => format!("one of [{}]", values.join(", ")),
            Self::Pattern(regex) => format!("matching pattern {}", regex.as_str()),
        }
    }
}
