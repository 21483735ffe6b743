use crate::common::value::{Fields, Value};
use crate::error::{Error, Result};

use std::fmt;

/// Separator for field path components.
const PATH_SEPARATOR: char = '.';

/// Dot-separated path to a (possibly nested) field.
///
/// ```rust
/// use document_crud::common::{path::FieldPath, value::{Fields, Value}};
///
/// let path = FieldPath::parse("address.city").unwrap();
/// let mut fields = Fields::new();
/// path.set(&mut fields, Value::from("Lisbon"));
/// assert_eq!(path.get(&fields), Some(&Value::from("Lisbon")));
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dot-separated path; every segment must be non-empty.
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<String> = path.split(PATH_SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidArgument(format!("invalid field path `{path}`")));
        }
        Ok(Self { segments })
    }

    /// The path components, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Look up the value at this path.
    pub fn get<'a>(&self, fields: &'a Fields) -> Option<&'a Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = fields;
        for segment in parents {
            current = current.get(segment)?.as_map()?;
        }
        current.get(last)
    }

    /// Assign the value at this path, replacing non-map intermediates with maps.
    pub fn set(&self, fields: &mut Fields, value: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };
        let mut current = fields;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Map(Fields::new()));
            current = ensure_map(entry);
        }
        current.insert(last.clone(), value);
    }

    /// Remove and return the value at this path.
    pub fn remove(&self, fields: &mut Fields) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = fields;
        for segment in parents {
            current = match current.get_mut(segment)? {
                Value::Map(map) => map,
                _ => return None,
            };
        }
        current.shift_remove(last)
    }
}

fn ensure_map(value: &mut Value) -> &mut Fields {
    if !matches!(value, Value::Map(_)) {
        *value = Value::Map(Fields::new());
    }
    match value {
        Value::Map(map) => map,
        _ => unreachable!("value was just replaced by a map"),
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(&PATH_SEPARATOR.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use serde_json::json;

    fn fields(json: serde_json::Value) -> Fields {
        crate::common::value::to_fields(&json).unwrap()
    }

    #[rstest]
    #[case::single("name", vec!["name"])]
    #[case::nested("address.city", vec!["address", "city"])]
    fn test_parse(#[case] path: &str, #[case] expected: Vec<&str>) {
        let actual = FieldPath::parse(path).unwrap();
        assert_eq!(actual.segments(), expected.as_slice());
        assert_eq!(actual.to_string(), path);
    }

    #[rstest]
    #[case::empty("")]
    #[case::leading_dot(".name")]
    #[case::double_dot("a..b")]
    fn test_parse_invalid(#[case] path: &str) {
        assert!(FieldPath::parse(path).is_err());
    }

    #[rstest]
    #[case::top_level("name", Some(Value::from("Hyatt")))]
    #[case::nested("address.city", Some(Value::from("Lisbon")))]
    #[case::missing("address.zip", None)]
    #[case::through_scalar("name.first", None)]
    fn test_get(#[case] path: &str, #[case] expected: Option<Value>) {
        let fields = fields(json!({"name": "Hyatt", "address": {"city": "Lisbon"}}));
        let path = FieldPath::parse(path).unwrap();
        assert_eq!(path.get(&fields).cloned(), expected);
    }

    #[rstest]
    #[case::new_top_level("rating", json!({"name": "Hyatt", "rating": 5}))]
    #[case::creates_intermediate("meta.rating", json!({"name": "Hyatt", "meta": {"rating": 5}}))]
    #[case::replaces_scalar_intermediate("name.rating", json!({"name": {"rating": 5}}))]
    fn test_set(#[case] path: &str, #[case] expected: serde_json::Value) {
        let mut actual = fields(json!({"name": "Hyatt"}));
        FieldPath::parse(path)
            .unwrap()
            .set(&mut actual, Value::Integer(5));
        assert_eq!(actual, fields(expected));
    }

    #[test]
    fn test_remove() {
        let mut actual =
            fields(json!({"name": "Hyatt", "address": {"city": "Lisbon", "zip": "1000"}}));
        let removed = FieldPath::parse("address.city").unwrap().remove(&mut actual);
        assert_eq!(removed, Some(Value::from("Lisbon")));
        assert_eq!(actual, fields(json!({"name": "Hyatt", "address": {"zip": "1000"}})));
        assert_eq!(FieldPath::parse("nope.deeper").unwrap().remove(&mut actual), None);
    }
}
