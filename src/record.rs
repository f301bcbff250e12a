//! Raw Record Module
//!
//! Total path traversal over the loosely-structured JSON records that come
//! out of the document store. Nothing in here fails: a missing segment, a
//! scalar in the middle of a path or an out-of-range array index all yield
//! `Lookup::Absent`.

use serde_json::Value;

/// Marker rendered for fields that could not be resolved from any source.
pub const NOT_AVAILABLE: &str = "N/A";
pub const YES: &str = "Yes";
pub const NO: &str = "No";

/// Result of walking a dotted path through a raw record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Absent,
    Present(&'a Value),
}

impl<'a> Lookup<'a> {
    /// The value, if it is present and not empty.
    pub fn filled(self) -> Option<&'a Value> {
        match self {
            Lookup::Present(value) if !is_empty_value(value) => Some(value),
            _ => None,
        }
    }
}

/// Walks `path` (segments separated by `.`) through `root`.
///
/// Numeric segments index into arrays, so `owners.0.name` is valid.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Lookup<'a> {
    let mut current = root;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Lookup::Absent,
        }
    }
    Lookup::Present(current)
}

/// Null, blank strings and the not-available marker count as empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.is_empty() || trimmed == NOT_AVAILABLE
        }
        _ => false,
    }
}

/// Renders a scalar as display text. Booleans become the yes/no token.
/// Arrays and objects have no scalar rendering and yield `None`.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(true) => Some(YES.to_string()),
        Value::Bool(false) => Some(NO.to_string()),
        Value::Number(n) => Some(number_text(n)),
        _ => None,
    }
}

// Whole floats print without the trailing ".0" serde_json would add.
fn number_text(n: &serde_json::Number) -> String {
    if let Some(f) = n.as_f64()
        && n.is_f64()
        && f.fract() == 0.0
        && f.abs() < 1e15
    {
        return format!("{}", f as i64);
    }
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_nested_objects_and_arrays() {
        let record = json!({"ownerDetails": {"owners": [{"name": "A. Shah"}]}});
        assert_eq!(
            get_path(&record, "ownerDetails.owners.0.name"),
            Lookup::Present(&json!("A. Shah"))
        );
    }

    #[test]
    fn missing_or_scalar_segments_are_absent() {
        let record = json!({"locationDetails": "flattened by an old writer"});
        assert_eq!(get_path(&record, "locationDetails.city"), Lookup::Absent);
        assert_eq!(get_path(&record, "nope.city"), Lookup::Absent);
        assert_eq!(get_path(&json!({"a": [1]}), "a.3"), Lookup::Absent);
    }

    #[test]
    fn empty_values_are_not_filled() {
        let record = json!({"a": null, "b": "  ", "c": "N/A", "d": 0, "e": false});
        assert_eq!(get_path(&record, "a").filled(), None);
        assert_eq!(get_path(&record, "b").filled(), None);
        assert_eq!(get_path(&record, "c").filled(), None);
        assert_eq!(get_path(&record, "d").filled(), Some(&json!(0)));
        assert_eq!(get_path(&record, "e").filled(), Some(&json!(false)));
    }

    #[test]
    fn scalar_text_converts_booleans_and_numbers() {
        assert_eq!(scalar_text(&json!(true)).as_deref(), Some("Yes"));
        assert_eq!(scalar_text(&json!(false)).as_deref(), Some("No"));
        assert_eq!(scalar_text(&json!(1500000)).as_deref(), Some("1500000"));
        assert_eq!(scalar_text(&json!(2500000.0)).as_deref(), Some("2500000"));
        assert_eq!(scalar_text(&json!(12.5)).as_deref(), Some("12.5"));
        assert_eq!(scalar_text(&json!({"x": 1})), None);
    }
}
