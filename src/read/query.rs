use crate::common::{
    path::FieldPath,
    value::{Fields, Value},
};
use crate::error::{Error, Result};

use std::cmp;

/// Comparison applied by a [`Filter`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FilterOperator {
    /// The field equals the value.
    Equals,
    /// The field exists and differs from the value.
    NotEqual,
    /// The field is greater than the value.
    GreaterThan,
    /// The field is greater than or equal to the value.
    GreaterThanOrEqual,
    /// The field is less than the value.
    LessThan,
    /// The field is less than or equal to the value.
    LessThanOrEqual,
    /// The field is an array containing the value.
    Contains,
    /// The field equals one of the values of an array value.
    In,
}

/// Condition on a single field.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    /// The field to test.
    pub path: FieldPath,
    /// The comparison.
    pub operator: FilterOperator,
    /// The operand; an array for [`FilterOperator::In`].
    pub value: Value,
}

impl Filter {
    /// Whether the document fields satisfy the filter. Missing fields never match.
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = self.path.get(fields) else {
            return false;
        };
        match self.operator {
            FilterOperator::Equals => actual.loosely_equals(&self.value),
            FilterOperator::NotEqual => !actual.loosely_equals(&self.value),
            FilterOperator::GreaterThan => {
                actual.compare(&self.value) == Some(cmp::Ordering::Greater)
            }
            FilterOperator::GreaterThanOrEqual => matches!(
                actual.compare(&self.value),
                Some(cmp::Ordering::Greater | cmp::Ordering::Equal)
            ),
            FilterOperator::LessThan => actual.compare(&self.value) == Some(cmp::Ordering::Less),
            FilterOperator::LessThanOrEqual => matches!(
                actual.compare(&self.value),
                Some(cmp::Ordering::Less | cmp::Ordering::Equal)
            ),
            FilterOperator::Contains => actual
                .as_array()
                .is_some_and(|values| values.iter().any(|value| value.loosely_equals(&self.value))),
            FilterOperator::In => self
                .value
                .as_array()
                .is_some_and(|values| values.iter().any(|value| actual.loosely_equals(value))),
        }
    }
}

/// Field filters over one collection, combined with AND.
///
/// ```rust
/// use document_crud::read::query::{FilterOperator, Query};
///
/// let query = Query::new("sample")
///     .filter("name", FilterOperator::Equals, "Test Property Name")
///     .unwrap()
///     .limit(10);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// The collection to search.
    pub collection: String,
    /// Filters every returned document satisfies.
    pub filters: Vec<Filter>,
    /// Maximum number of documents returned.
    pub limit: Option<usize>,
}

impl Query {
    /// Query every document of a collection.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Add a filter on a dot-separated field path.
    pub fn filter(
        mut self,
        path: &str,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let value = value.into();
        if operator == FilterOperator::In && value.as_array().is_none() {
            return Err(Error::InvalidArgument(format!(
                "`in` filter on `{path}` needs an array operand"
            )));
        }
        self.filters.push(Filter {
            path: FieldPath::parse(path)?,
            operator,
            value,
        });
        Ok(self)
    }

    /// Cap the number of returned documents.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the document fields satisfy every filter.
    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|filter| filter.matches(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::value;

    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::equals_string(FilterOperator::Equals, Value::from("Hyatt"), "name", true)]
    #[case::equals_cross_numeric(FilterOperator::Equals, Value::Double(999.0), "property_id", true)]
    #[case::not_equal(FilterOperator::NotEqual, Value::from("Hilton"), "name", true)]
    #[case::not_equal_missing(FilterOperator::NotEqual, Value::from("Hilton"), "missing", false)]
    #[case::greater_than(FilterOperator::GreaterThan, Value::Integer(100), "property_id", true)]
    #[case::greater_than_or_equal(
        FilterOperator::GreaterThanOrEqual,
        Value::Integer(999),
        "property_id",
        true
    )]
    #[case::less_than(FilterOperator::LessThan, Value::Integer(999), "property_id", false)]
    #[case::less_than_or_equal(
        FilterOperator::LessThanOrEqual,
        Value::Integer(999),
        "property_id",
        true
    )]
    #[case::mismatched_types(FilterOperator::LessThan, Value::from("a"), "property_id", false)]
    #[case::contains(FilterOperator::Contains, Value::from("pool"), "tags", true)]
    #[case::contains_absent(FilterOperator::Contains, Value::from("spa"), "tags", false)]
    #[case::in_values(
        FilterOperator::In,
        Value::Array(
            vec![
                Value::from("Hilton"),
                Value::from("Hyatt"),
            ]
        ),
        "name",
        true
    )]
    #[case::nested(FilterOperator::Equals, Value::from("Lisbon"), "address.city", true)]
    fn test_filter_matches(
        #[case] operator: FilterOperator,
        #[case] operand: Value,
        #[case] path: &str,
        #[case] expected: bool,
    ) {
        let fields = value::to_fields(&json!({
            "name": "Hyatt",
            "property_id": 999,
            "tags": ["pool", "gym"],
            "address": {"city": "Lisbon"},
        }))
        .unwrap();
        let filter = Filter {
            path: FieldPath::parse(path).unwrap(),
            operator,
            value: operand,
        };
        assert_eq!(filter.matches(&fields), expected);
    }

    #[test]
    fn test_in_requires_array() {
        let error = Query::new("sample")
            .filter("name", FilterOperator::In, "Hyatt")
            .unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)), "{error}");
    }

    #[test]
    fn test_query_matches_all_filters() {
        let query = Query::new("sample")
            .filter("name", FilterOperator::Equals, "Hyatt")
            .unwrap()
            .filter("property_id", FilterOperator::GreaterThan, 1000)
            .unwrap();
        let fields = value::to_fields(&json!({"name": "Hyatt", "property_id": 999})).unwrap();
        assert!(!query.matches(&fields));
    }
}
