use super::message::Message;
use async_trait::async_trait;
use flowbridge_core::{CoreError, StepExecutor, StepOutcome, TransformationStep};
use jsonschema::{Draft, JSONSchema};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Expected type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    /// Any text
    String,
    /// Integer or decimal
    Number,
    /// Whole number
    Integer,
    /// `true` / `false`
    Boolean,
}

/// Constraints on one field
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationRule {
    /// Field reference
    pub field: String,
    /// Field must be present and non-empty
    pub required: bool,
    /// Expected type
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    /// Regular expression the whole value must match
    pub pattern: Option<String>,
    /// Minimum length in characters
    pub min_length: Option<usize>,
    /// Maximum length in characters
    pub max_length: Option<usize>,
    /// Numeric lower bound
    pub min: Option<f64>,
    /// Numeric upper bound
    pub max: Option<f64>,
    /// Permitted values
    pub allowed_values: Vec<String>,
    /// Replaces the generated violation text
    pub message: Option<String>,
}

/// Configuration of a VALIDATION step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Field rules
    pub rules: Vec<ValidationRule>,
    /// JSON Schema (Draft 7) for JSON payloads
    pub schema: Option<Value>,
}

/// VALIDATION executor. Collects every violation; never changes the payload.
#[derive(Debug, Default)]
pub struct ValidationExecutor;

impl ValidationExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepExecutor for ValidationExecutor {
    async fn apply(&self, step: &TransformationStep, input: &str) -> Result<StepOutcome, CoreError> {
        let config: ValidationConfig = if step.configuration.is_null() {
            ValidationConfig::default()
        } else {
            serde_json::from_value(step.configuration.clone())
                .map_err(|e| CoreError::TransformationConfigError(format!("Invalid validation configuration: {}", e)))?
        };
        if config.rules.is_empty() && config.schema.is_none() {
            return Err(CoreError::TransformationConfigError(
                "Validation transformation configuration is missing".to_string(),
            ));
        }

        let message = Message::parse(input)?;
        let mut violations = Vec::new();
        for rule in &config.rules {
            if let Some(violation) = check_rule(&message, rule)? {
                violations.push(violation);
            }
        }

        if let Some(schema) = &config.schema {
            match &message {
                Message::Json(value) => violations.extend(schema_violations(schema, value)?),
                Message::Xml(_) => debug!(step = %step.name, "JSON Schema ignored for XML payload"),
            }
        }

        if violations.is_empty() {
            Ok(StepOutcome::Continue(input.to_string()))
        } else {
            Err(CoreError::ValidationError(violations))
        }
    }
}

fn check_rule(message: &Message, rule: &ValidationRule) -> Result<Option<String>, CoreError> {
    let value = message.get(&rule.field)?.filter(|v| !v.is_empty());
    let violation = |text: String| Some(rule.message.clone().unwrap_or(text));

    let Some(value) = value else {
        return Ok(if rule.required {
            violation(format!("{} is required", rule.field))
        } else {
            None
        });
    };

    if let Some(field_type) = rule.field_type {
        let ok = match field_type {
            FieldType::String => true,
            FieldType::Number => value.trim().parse::<f64>().is_ok(),
            FieldType::Integer => value.trim().parse::<i64>().is_ok(),
            FieldType::Boolean => matches!(value.trim(), "true" | "false"),
        };
        if !ok {
            return Ok(violation(format!("{} must be of type {:?}", rule.field, field_type)));
        }
    }

    let length = value.chars().count();
    if let Some(min) = rule.min_length.filter(|min| length < *min) {
        return Ok(violation(format!("{} must be at least {} characters", rule.field, min)));
    }
    if let Some(max) = rule.max_length.filter(|max| length > *max) {
        return Ok(violation(format!("{} must be at most {} characters", rule.field, max)));
    }

    if let Some(pattern) = &rule.pattern {
        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| CoreError::TransformationConfigError(format!("Invalid pattern '{}': {}", pattern, e)))?;
        if !regex.is_match(&value) {
            return Ok(violation(format!("{} does not match pattern {}", rule.field, pattern)));
        }
    }

    if rule.min.is_some() || rule.max.is_some() {
        let Ok(number) = value.trim().parse::<f64>() else {
            return Ok(violation(format!("{} must be numeric", rule.field)));
        };
        if let Some(min) = rule.min.filter(|min| number < *min) {
            return Ok(violation(format!("{} must be >= {}", rule.field, min)));
        }
        if let Some(max) = rule.max.filter(|max| number > *max) {
            return Ok(violation(format!("{} must be <= {}", rule.field, max)));
        }
    }

    if !rule.allowed_values.is_empty() && !rule.allowed_values.contains(&value) {
        return Ok(violation(format!(
            "{} must be one of [{}]",
            rule.field,
            rule.allowed_values.join(", ")
        )));
    }
    Ok(None)
}

fn schema_violations(schema: &Value, instance: &Value) -> Result<Vec<String>, CoreError> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| CoreError::TransformationConfigError(format!("Invalid JSON Schema: {}", e)))?;
    let violations = match compiled.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                }
            })
            .collect(),
    };
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbridge_core::{FlowId, TransformationKind};
    use serde_json::json;

    fn step(config: Value) -> TransformationStep {
        TransformationStep::new("check", FlowId::from("f"), TransformationKind::Validation, 1).with_config(config)
    }

    #[tokio::test]
    async fn test_valid_payload_is_unchanged() {
        let input = "<Order><Id>A-1</Id><Amount>10</Amount></Order>";
        let config = json!({ "rules": [
            { "field": "Id", "required": true, "pattern": "[A-Z]-\\d+" },
            { "field": "Amount", "type": "NUMBER", "min": 1, "max": 100 }
        ]});
        let outcome = ValidationExecutor::new().apply(&step(config), input).await.unwrap();
        assert_eq!(outcome, StepOutcome::Continue(input.to_string()));
    }

    #[tokio::test]
    async fn test_all_violations_are_collected() {
        let config = json!({ "rules": [
            { "field": "Id", "required": true },
            { "field": "Amount", "max": 100 },
            { "field": "Currency", "allowedValues": ["EUR", "USD"], "message": "unsupported currency" }
        ]});
        let err = ValidationExecutor::new()
            .apply(&step(config), "<Order><Amount>500</Amount><Currency>GBP</Currency></Order>")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::ValidationError(vec![
                "Id is required".to_string(),
                "Amount must be <= 100".to_string(),
                "unsupported currency".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_json_schema() {
        let config = json!({ "schema": {
            "type": "object",
            "required": ["id"],
            "properties": { "id": { "type": "integer" } }
        }});
        let exec = ValidationExecutor::new();
        assert!(exec.apply(&step(config.clone()), r#"{"id": 7}"#).await.is_ok());

        let err = exec.apply(&step(config), r#"{"id": "x"}"#).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(v) if v.len() == 1 && v[0].starts_with("/id")));
    }

    #[tokio::test]
    async fn test_empty_configuration_is_rejected() {
        let err = ValidationExecutor::new().apply(&step(json!({})), "<a/>").await.unwrap_err();
        assert!(matches!(err, CoreError::TransformationConfigError(_)));
    }
}
