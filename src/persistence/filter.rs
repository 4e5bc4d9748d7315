use serde::{Deserialize, Serialize};

use crate::core::{EngineError, Result, Value};

/// Whitelisted comparison operators for dynamic filters. Parsing any other
/// name is an `UnsupportedOperation` error, never a silent skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl FilterOperator {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "Equals" => Ok(Self::Equals),
            "NotEquals" => Ok(Self::NotEquals),
            "Contains" => Ok(Self::Contains),
            "StartsWith" => Ok(Self::StartsWith),
            "GreaterThan" => Ok(Self::GreaterThan),
            "GreaterOrEqual" => Ok(Self::GreaterOrEqual),
            "LessThan" => Ok(Self::LessThan),
            "LessOrEqual" => Ok(Self::LessOrEqual),
            other => Err(EngineError::UnsupportedOperation(format!(
                "Filter operator '{}' is not supported",
                other
            ))),
        }
    }

    /// Evaluate against a stored cell. NULL cells never match ordering or
    /// string operators; `Equals`/`NotEquals` treat NULL literally.
    pub fn matches(&self, actual: &Value, expected: &Value) -> Result<bool> {
        match self {
            Self::Equals => Ok(actual == expected),
            Self::NotEquals => Ok(actual != expected),
            Self::Contains | Self::StartsWith => {
                let (Value::Text(haystack), Value::Text(needle)) = (actual, expected) else {
                    if actual.is_null() {
                        return Ok(false);
                    }
                    return Err(EngineError::UnsupportedOperation(format!(
                        "Operator {:?} requires text values, got {} and {}",
                        self,
                        actual.type_name(),
                        expected.type_name()
                    )));
                };
                Ok(match self {
                    Self::Contains => haystack.contains(needle.as_str()),
                    _ => haystack.starts_with(needle.as_str()),
                })
            }
            Self::GreaterThan | Self::GreaterOrEqual | Self::LessThan | Self::LessOrEqual => {
                if actual.is_null() || expected.is_null() {
                    return Ok(false);
                }
                let ordering = actual.compare(expected)?;
                Ok(match self {
                    Self::GreaterThan => ordering.is_gt(),
                    Self::GreaterOrEqual => ordering.is_ge(),
                    Self::LessThan => ordering.is_lt(),
                    _ => ordering.is_le(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    pub value: serde_json::Value,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: serde_json::Value) -> Self {
        Self { field: field.into(), operator, value }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    pub filters: Vec<FilterCondition>,
    pub order_by: Option<String>,
    pub descending: bool,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub include_deleted: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(field.into());
        self.descending = descending;
        self
    }

    pub fn page(mut self, skip: usize, take: usize) -> Self {
        self.skip = Some(skip);
        self.take = Some(take);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_operator_name() {
        assert!(matches!(
            FilterOperator::parse("Between"),
            Err(EngineError::UnsupportedOperation(_))
        ));
        assert_eq!(FilterOperator::parse("Contains").unwrap(), FilterOperator::Contains);
    }

    #[test]
    fn test_string_operators() {
        let hay = Value::Text("Widget Pro".into());
        assert!(FilterOperator::Contains.matches(&hay, &Value::Text("get".into())).unwrap());
        assert!(FilterOperator::StartsWith.matches(&hay, &Value::Text("Wid".into())).unwrap());
        assert!(
            FilterOperator::Contains
                .matches(&Value::Integer(5), &Value::Text("5".into()))
                .is_err()
        );
    }

    #[test]
    fn test_null_never_matches_ordering() {
        assert!(
            !FilterOperator::GreaterThan
                .matches(&Value::Null, &Value::Integer(1))
                .unwrap()
        );
        assert!(FilterOperator::Equals.matches(&Value::Null, &Value::Null).unwrap());
    }
}
