use crate::common::{path::FieldPath, value::Value};
use crate::error::Result;
use crate::read::query::{Filter, FilterOperator};

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use serde_dynamo::to_attribute_value;
use std::collections;

pub(crate) fn join(left: String, operator: &str, right: String) -> String {
    if left.is_empty() {
        right
    } else if right.is_empty() {
        left
    } else {
        format!("{left}{operator}{right}")
    }
}

/// Placeholders shared by the expressions of one request.
///
/// Attribute names become `#a{n}` (one placeholder per distinct name) and values become
/// `:v{n}`, so user-supplied names never have to be valid expression tokens.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ExpressionInput {
    names: IndexMap<String, String>,
    values: collections::HashMap<String, types::AttributeValue>,
}

impl ExpressionInput {
    pub(crate) fn name(&mut self, name: &str) -> String {
        let next = self.names.len();
        self.names
            .entry(name.to_string())
            .or_insert_with(|| format!("#a{next}"))
            .clone()
    }

    pub(crate) fn path(&mut self, path: &FieldPath) -> String {
        path.segments()
            .iter()
            .map(|segment| self.name(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub(crate) fn attribute_value(&mut self, value: types::AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    pub(crate) fn value(&mut self, value: &Value) -> Result<String> {
        Ok(self.attribute_value(to_attribute_value(value)?))
    }

    /// Filter expression of a query; `None` when there is nothing to filter on.
    pub(crate) fn filters(&mut self, filters: &[Filter]) -> Result<Option<String>> {
        let mut expression = String::new();
        for filter in filters {
            let condition = self.filter(filter)?;
            expression = join(expression, " AND ", condition);
        }
        Ok((!expression.is_empty()).then_some(expression))
    }

    fn filter(&mut self, filter: &Filter) -> Result<String> {
        let path = self.path(&filter.path);
        let expression = match filter.operator {
            FilterOperator::Equals => format!("{path} = {}", self.value(&filter.value)?),
            FilterOperator::NotEqual => format!(
                "attribute_exists({path}) AND {path} <> {}",
                self.value(&filter.value)?
            ),
            FilterOperator::GreaterThan => format!("{path} > {}", self.value(&filter.value)?),
            FilterOperator::GreaterThanOrEqual => {
                format!("{path} >= {}", self.value(&filter.value)?)
            }
            FilterOperator::LessThan => format!("{path} < {}", self.value(&filter.value)?),
            FilterOperator::LessThanOrEqual => {
                format!("{path} <= {}", self.value(&filter.value)?)
            }
            FilterOperator::Contains => {
                format!("contains({path}, {})", self.value(&filter.value)?)
            }
            FilterOperator::In => {
                let operands = filter.value.as_array().unwrap_or_default();
                let mut placeholders = Vec::with_capacity(operands.len());
                for operand in operands {
                    placeholders.push(self.value(operand)?);
                }
                format!("{path} IN ({})", placeholders.join(", "))
            }
        };
        Ok(expression)
    }

    pub(crate) fn into_attributes(
        self,
    ) -> (
        Option<collections::HashMap<String, String>>,
        Option<collections::HashMap<String, types::AttributeValue>>,
    ) {
        let names = (!self.names.is_empty()).then(|| {
            self.names
                .into_iter()
                .map(|(name, placeholder)| (placeholder, name))
                .collect()
        });
        let values = (!self.values.is_empty()).then_some(self.values);
        (names, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::query::Query;

    use rstest::rstest;

    #[rstest]
    #[case::equals(
        Query::new("sample").filter("name", FilterOperator::Equals, "Test Property Name").unwrap(),
        Some("#a0 = :v0"),
        vec![("#a0", "name")],
        vec![(":v0", types::AttributeValue::S("Test Property Name".to_string()))]
    )]
    #[case::nested_and_repeated(
        Query::new("sample")
            .filter("meta.stars", FilterOperator::GreaterThanOrEqual, 3)
            .unwrap()
            .filter("meta.stars", FilterOperator::LessThan, 5)
            .unwrap(),
        Some("#a0.#a1 >= :v0 AND #a0.#a1 < :v1"),
        vec![("#a0", "meta"), ("#a1", "stars")],
        vec![
            (":v0", types::AttributeValue::N("3".to_string())),
            (":v1", types::AttributeValue::N("5".to_string())),
        ]
    )]
    #[case::not_equal(
        Query::new("sample").filter("name", FilterOperator::NotEqual, "x").unwrap(),
        Some("attribute_exists(#a0) AND #a0 <> :v0"),
        vec![("#a0", "name")],
        vec![(":v0", types::AttributeValue::S("x".to_string()))]
    )]
    #[case::in_list(
        Query::new("sample")
            .filter(
                "tier",
                FilterOperator::In,
                vec![Value::from("gold"), Value::from("platinum")]
            )
            .unwrap(),
        Some("#a0 IN (:v0, :v1)"),
        vec![("#a0", "tier")],
        vec![
            (":v0", types::AttributeValue::S("gold".to_string())),
            (":v1", types::AttributeValue::S("platinum".to_string())),
        ]
    )]
    #[case::contains(
        Query::new("sample").filter("tags", FilterOperator::Contains, "new").unwrap(),
        Some("contains(#a0, :v0)"),
        vec![("#a0", "tags")],
        vec![(":v0", types::AttributeValue::S("new".to_string()))]
    )]
    #[case::empty(Query::new("sample"), None, vec![], vec![])]
    fn test_filters(
        #[case] query: Query,
        #[case] expected_expression: Option<&str>,
        #[case] expected_names: Vec<(&str, &str)>,
        #[case] expected_values: Vec<(&str, types::AttributeValue)>,
    ) {
        let mut input = ExpressionInput::default();
        let expression = input.filters(&query.filters).unwrap();
        assert_eq!(expression.as_deref(), expected_expression);
        let (names, values) = input.into_attributes();
        let expected_names = (!expected_names.is_empty()).then(|| {
            expected_names
                .into_iter()
                .map(|(placeholder, name)| (placeholder.to_string(), name.to_string()))
                .collect()
        });
        let expected_values = (!expected_values.is_empty()).then(|| {
            expected_values
                .into_iter()
                .map(|(placeholder, value)| (placeholder.to_string(), value))
                .collect()
        });
        assert_eq!(names, expected_names);
        assert_eq!(values, expected_values);
    }

    #[rstest]
    #[case::both("a".to_string(), "b".to_string(), "a AND b")]
    #[case::left_empty(String::new(), "b".to_string(), "b")]
    #[case::right_empty("a".to_string(), String::new(), "a")]
    fn test_join(#[case] left: String, #[case] right: String, #[case] expected: &str) {
        assert_eq!(join(left, " AND ", right), expected);
    }
}
