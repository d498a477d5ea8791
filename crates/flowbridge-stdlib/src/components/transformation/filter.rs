use super::functions::{evaluate, is_truthy, stringify};
use super::message::Message;
use async_trait::async_trait;
use flowbridge_core::{CoreError, StepExecutor, StepOutcome, TransformationStep};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Comparison applied by a structured filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    /// Text equality
    Equals,
    /// Text inequality
    NotEquals,
    /// Substring
    Contains,
    /// Prefix
    StartsWith,
    /// Suffix
    EndsWith,
    /// Numeric `>`
    GreaterThan,
    /// Numeric `<`
    LessThan,
    /// Regular expression match
    Regex,
    /// Field is present
    Exists,
    /// Field is absent
    NotExists,
}

/// How structured conditions combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterLogic {
    /// Every condition must hold
    #[default]
    And,
    /// One condition is enough
    Or,
}

/// Whether matching messages are kept or dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterMode {
    /// Keep matching messages
    #[default]
    Include,
    /// Drop matching messages
    Exclude,
}

/// One structured condition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    /// Field reference
    pub field: String,
    /// Comparison
    pub operator: FilterOperator,
    /// Operand, unused by EXISTS / NOT_EXISTS
    #[serde(default)]
    pub value: Option<Value>,
}

/// Configuration of a FILTER step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    /// JEXL predicate over the payload
    pub condition: Option<String>,
    /// Structured conditions
    pub conditions: Vec<FilterCondition>,
    /// Combination of `conditions`
    pub logic: FilterLogic,
    /// Keep or drop matches
    pub mode: FilterMode,
}

/// FILTER executor. A message that does not pass is reported as
/// [`StepOutcome::Filtered`], never as an error.
#[derive(Debug, Default)]
pub struct FilterExecutor;

impl FilterExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepExecutor for FilterExecutor {
    async fn apply(&self, step: &TransformationStep, input: &str) -> Result<StepOutcome, CoreError> {
        if step.configuration.is_null() {
            return Err(CoreError::TransformationConfigError(
                "Filter transformation configuration is missing".to_string(),
            ));
        }
        let config: FilterConfig = serde_json::from_value(step.configuration.clone())
            .map_err(|e| CoreError::TransformationConfigError(format!("Invalid filter configuration: {}", e)))?;

        let message = Message::parse(input)?;
        let (matched, description) = match config.condition.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(condition) => (is_truthy(&evaluate(condition, &message.context())?), condition.to_string()),
            None if !config.conditions.is_empty() => {
                let mut results = Vec::with_capacity(config.conditions.len());
                for condition in &config.conditions {
                    results.push(check(&message, condition)?);
                }
                let matched = match config.logic {
                    FilterLogic::And => results.iter().all(|r| *r),
                    FilterLogic::Or => results.iter().any(|r| *r),
                };
                (matched, format!("{} structured condition(s)", config.conditions.len()))
            }
            None => {
                return Err(CoreError::TransformationConfigError(
                    "Filter requires a condition or conditions".to_string(),
                ))
            }
        };

        let keep = match config.mode {
            FilterMode::Include => matched,
            FilterMode::Exclude => !matched,
        };
        debug!(step = %step.name, matched, keep, "Evaluated filter");
        if keep {
            Ok(StepOutcome::Continue(input.to_string()))
        } else {
            let verb = if matched { "matched" } else { "did not match" };
            Ok(StepOutcome::Filtered {
                reason: format!("message {} {}", verb, description),
            })
        }
    }
}

fn check(message: &Message, condition: &FilterCondition) -> Result<bool, CoreError> {
    let actual = message.get(&condition.field)?;
    let expected = condition.value.as_ref().map(stringify).unwrap_or_default();

    let Some(actual) = actual else {
        return Ok(matches!(condition.operator, FilterOperator::NotExists | FilterOperator::NotEquals));
    };
    Ok(match condition.operator {
        FilterOperator::Exists => true,
        FilterOperator::NotExists => false,
        FilterOperator::Equals => actual == expected,
        FilterOperator::NotEquals => actual != expected,
        FilterOperator::Contains => actual.contains(&expected),
        FilterOperator::StartsWith => actual.starts_with(&expected),
        FilterOperator::EndsWith => actual.ends_with(&expected),
        FilterOperator::GreaterThan => compare(&actual, &expected).map_or(false, |o| o.is_gt()),
        FilterOperator::LessThan => compare(&actual, &expected).map_or(false, |o| o.is_lt()),
        FilterOperator::Regex => Regex::new(&expected)
            .map_err(|e| CoreError::TransformationConfigError(format!("Invalid filter pattern '{}': {}", expected, e)))?
            .is_match(&actual),
    })
}

fn compare(actual: &str, expected: &str) -> Option<std::cmp::Ordering> {
    let a: f64 = actual.trim().parse().ok()?;
    let b: f64 = expected.trim().parse().ok()?;
    a.partial_cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbridge_core::{FlowId, TransformationKind};
    use serde_json::json;

    fn step(config: Value) -> TransformationStep {
        TransformationStep::new("filter", FlowId::from("f"), TransformationKind::Filter, 1).with_config(config)
    }

    const ORDER: &str = "<Order><Amount>150</Amount><Country>DE</Country></Order>";

    #[tokio::test]
    async fn test_expression_condition() {
        let exec = FilterExecutor::new();
        let kept = exec.apply(&step(json!({ "condition": "Amount > 100" })), ORDER).await.unwrap();
        assert_eq!(kept, StepOutcome::Continue(ORDER.to_string()));

        let dropped = exec.apply(&step(json!({ "condition": "Amount > 500" })), ORDER).await.unwrap();
        assert!(matches!(dropped, StepOutcome::Filtered { .. }));
    }

    #[tokio::test]
    async fn test_structured_conditions_with_logic_and_mode() {
        let exec = FilterExecutor::new();
        let conditions = json!([
            { "field": "Country", "operator": "EQUALS", "value": "FR" },
            { "field": "Amount", "operator": "GREATER_THAN", "value": 100 }
        ]);

        let and = exec.apply(&step(json!({ "conditions": conditions })), ORDER).await.unwrap();
        assert!(matches!(and, StepOutcome::Filtered { .. }));

        let or = exec
            .apply(&step(json!({ "conditions": conditions, "logic": "OR" })), ORDER)
            .await
            .unwrap();
        assert!(matches!(or, StepOutcome::Continue(_)));

        let exclude = exec
            .apply(&step(json!({ "conditions": conditions, "logic": "OR", "mode": "EXCLUDE" })), ORDER)
            .await
            .unwrap();
        assert!(matches!(exclude, StepOutcome::Filtered { .. }));
    }

    #[tokio::test]
    async fn test_exists_and_regex() {
        let exec = FilterExecutor::new();
        let config = json!({ "conditions": [
            { "field": "Discount", "operator": "NOT_EXISTS" },
            { "field": "Country", "operator": "REGEX", "value": "^(DE|AT)$" }
        ]});
        assert!(matches!(exec.apply(&step(config), ORDER).await.unwrap(), StepOutcome::Continue(_)));

        let bad = json!({ "conditions": [{ "field": "Country", "operator": "REGEX", "value": "(" }]});
        assert!(exec.apply(&step(bad), ORDER).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_condition_is_a_config_error() {
        let err = FilterExecutor::new().apply(&step(json!({})), ORDER).await.unwrap_err();
        assert!(matches!(err, CoreError::TransformationConfigError(_)));
    }
}
