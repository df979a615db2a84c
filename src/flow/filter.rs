//! Predicate filtering applied to extracted values.

use crate::error::Result;
use crate::flow::schema::{FilterProps, FilterType};
use regex::{Regex, RegexBuilder};
use serde_json::Value;

struct Predicate {
    kind: FilterType,
    needle: String,
    regex: Option<Regex>,
    case_sensitive: bool,
    numeric: bool,
}

impl Predicate {
    fn build(kind: FilterType, needle: String, props: &FilterProps) -> Result<Self> {
        let case_sensitive = props.case_sensitive.unwrap_or(true);
        let regex = match kind {
            FilterType::Regex => Some(
                RegexBuilder::new(&needle)
                    .case_insensitive(!case_sensitive)
                    .build()?,
            ),
            _ => None,
        };
        Ok(Self {
            kind,
            needle,
            regex,
            case_sensitive,
            numeric: props.numeric,
        })
    }

    fn is_negative(&self) -> bool {
        matches!(self.kind, FilterType::NotContains | FilterType::NotEquals)
    }

    /// Positive form of the predicate: `notContains` tests containment.
    fn positive(&self, text: &str) -> bool {
        let (hay, needle) = if self.case_sensitive {
            (text.to_string(), self.needle.clone())
        } else {
            (text.to_lowercase(), self.needle.to_lowercase())
        };
        match self.kind {
            FilterType::Regex => self.regex.as_ref().is_some_and(|r| r.is_match(text)),
            FilterType::Contains | FilterType::NotContains => hay.contains(&needle),
            FilterType::Equals | FilterType::NotEquals => hay == needle,
            FilterType::GreaterThan => self.compare(text).is_some_and(|o| o.is_gt()),
            FilterType::LessThan => self.compare(text).is_some_and(|o| o.is_lt()),
        }
    }

    fn compare(&self, text: &str) -> Option<std::cmp::Ordering> {
        if self.numeric {
            let lhs = js_number(text)?;
            let rhs = js_number(&self.needle)?;
            lhs.partial_cmp(&rhs)
        } else {
            Some(text.cmp(self.needle.as_str()))
        }
    }

    fn matches(&self, text: &str) -> bool {
        if self.is_negative() {
            !self.positive(text)
        } else {
            self.positive(text)
        }
    }

    fn matches_row(&self, row: &[Value], column: Option<usize>) -> bool {
        if let Some(col) = column {
            return row.get(col).map(value_text).is_some_and(|t| self.matches(&t));
        }
        let any_positive = row.iter().any(|cell| self.positive(&value_text(cell)));
        if self.is_negative() {
            !any_positive
        } else {
            any_positive
        }
    }
}

/// Coerce the way JavaScript's `Number()` does; `None` stands for NaN.
fn js_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok().map(|n| n as f64)
    } else {
        match trimmed {
            "Infinity" | "+Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            s if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => None,
            s => s.parse::<f64>().ok(),
        }
    };
    parsed.filter(|n| !n.is_nan())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Apply the configured filter. Identity unless the filter is enabled and both a
/// type and a value are set.
pub fn apply_filter(value: Value, props: &FilterProps) -> Result<Value> {
    if !props.enable_filter {
        return Ok(value);
    }
    let (Some(kind), Some(needle)) = (props.filter_type, props.filter_value_text()) else {
        return Ok(value);
    };
    let predicate = Predicate::build(kind, needle, props)?;

    let filtered = match value {
        Value::Array(items) => {
            let tabular = !items.is_empty() && items.iter().all(|i| i.is_array());
            if tabular {
                let mut rows = items.into_iter();
                let mut kept: Vec<Value> = rows.next().into_iter().collect();
                kept.extend(rows.filter(|row| match row {
                    Value::Array(cells) => predicate.matches_row(cells, props.filter_column),
                    _ => false,
                }));
                Value::Array(kept)
            } else {
                Value::Array(
                    items
                        .into_iter()
                        .filter(|item| predicate.matches(&value_text(item)))
                        .collect(),
                )
            }
        }
        Value::Null => Value::Null,
        scalar => {
            if predicate.matches(&value_text(&scalar)) {
                scalar
            } else {
                Value::Null
            }
        }
    };
    Ok(filtered)
}
