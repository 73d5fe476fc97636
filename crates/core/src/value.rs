//! Typed values for collected conversation data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Collected or extracted data, keyed by declared field name.
pub type DataMap = BTreeMap<String, FieldValue>;

/// A single typed data value.
///
/// Serialized untagged so snapshots and scripts read naturally:
/// `{"company_size": 10, "pain_points": ["cost", "speed"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Short kind name used in logs and validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::List(_) => "list",
        }
    }

    /// Numeric view, if this value is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// An empty text or empty list counts as "not provided".
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Append `incoming` onto `existing` for accumulate-only fields.
    ///
    /// Lists are flattened one level and duplicates are skipped, so replaying
    /// the same extraction twice leaves the value unchanged.
    pub fn accumulate(existing: Option<&FieldValue>, incoming: FieldValue) -> FieldValue {
        let mut items = match existing {
            Some(FieldValue::List(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };
        let additions = match incoming {
            FieldValue::List(more) => more,
            single => vec![single],
        };
        for item in additions {
            if !items.contains(&item) {
                items.push(item);
            }
        }
        FieldValue::List(items)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Float(x)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_picks_narrowest_kind() {
        let data: DataMap =
            serde_json::from_str(r#"{"a": true, "b": 10, "c": 2.5, "d": "x", "e": [1, "y"]}"#)
                .unwrap();
        assert_eq!(data["a"], FieldValue::Bool(true));
        assert_eq!(data["b"], FieldValue::Int(10));
        assert_eq!(data["c"], FieldValue::Float(2.5));
        assert_eq!(data["d"], FieldValue::Text("x".into()));
        assert_eq!(
            data["e"],
            FieldValue::List(vec![FieldValue::Int(1), FieldValue::Text("y".into())])
        );
    }

    #[test]
    fn accumulate_appends_without_duplicates() {
        let first = FieldValue::accumulate(None, "cost".into());
        assert_eq!(first, FieldValue::List(vec!["cost".into()]));

        let second = FieldValue::accumulate(
            Some(&first),
            FieldValue::List(vec!["cost".into(), "speed".into()]),
        );
        assert_eq!(second, FieldValue::List(vec!["cost".into(), "speed".into()]));
    }

    #[test]
    fn accumulate_promotes_scalar_to_list() {
        let existing = FieldValue::Text("cost".into());
        let merged = FieldValue::accumulate(Some(&existing), "speed".into());
        assert_eq!(merged, FieldValue::List(vec!["cost".into(), "speed".into()]));
    }

    #[test]
    fn blank_values() {
        assert!(FieldValue::Text("  ".into()).is_blank());
        assert!(FieldValue::List(vec![]).is_blank());
        assert!(!FieldValue::Int(0).is_blank());
    }

    #[test]
    fn display_renders_lists() {
        let v = FieldValue::List(vec![FieldValue::Int(1), "two".into()]);
        assert_eq!(v.to_string(), "[1, two]");
    }
}
