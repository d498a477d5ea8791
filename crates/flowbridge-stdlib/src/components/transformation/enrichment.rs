use super::message::{json_search, Message};
use async_trait::async_trait;
use flowbridge_core::{CoreError, LookupSource, StepExecutor, StepOutcome, TransformationStep};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Lookup against a secondary table
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupSpec {
    /// Table name
    pub table: String,
    /// Payload field holding the lookup key
    pub key_field: String,
    /// JMESPath applied to the looked-up record
    #[serde(default)]
    pub path: Option<String>,
    /// Used when the key or the record is missing
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Fail instead of skipping when nothing is found
    #[serde(default)]
    pub required: bool,
}

/// One field to add
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentField {
    /// Target field reference
    #[serde(alias = "field", alias = "name")]
    pub target: String,
    /// Static value
    #[serde(default)]
    pub value: Option<Value>,
    /// Looked-up value
    #[serde(default)]
    pub lookup: Option<LookupSpec>,
}

/// Configuration of an ENRICHMENT step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnrichmentConfig {
    /// Fields to add
    pub fields: Vec<EnrichmentField>,
    /// Replace fields already present in the payload
    pub overwrite: bool,
}

/// ENRICHMENT executor
#[derive(Default)]
pub struct EnrichmentExecutor {
    lookups: Option<Arc<dyn LookupSource>>,
}

impl EnrichmentExecutor {
    /// Executor for static values only
    pub fn new() -> Self {
        Self { lookups: None }
    }

    /// Builder: enable lookups
    pub fn with_lookups(mut self, lookups: Arc<dyn LookupSource>) -> Self {
        self.lookups = Some(lookups);
        self
    }

    async fn resolve(&self, message: &Message, field: &EnrichmentField) -> Result<Option<Value>, CoreError> {
        if let Some(value) = &field.value {
            return Ok(Some(value.clone()));
        }
        let Some(lookup) = &field.lookup else {
            return Err(CoreError::TransformationConfigError(format!(
                "Enrichment field '{}' needs a value or a lookup",
                field.target
            )));
        };
        let lookups = self.lookups.as_ref().ok_or_else(|| {
            CoreError::ConfigurationError(format!(
                "Enrichment field '{}' uses a lookup but no lookup source is configured",
                field.target
            ))
        })?;

        let found = match message.get(&lookup.key_field)? {
            Some(key) => match lookups.lookup(&lookup.table, &key).await? {
                Some(record) => match lookup.path.as_deref() {
                    Some(path) => Some(json_search(&record, path)?).filter(|v| !v.is_null()),
                    None => Some(record),
                },
                None => None,
            },
            None => None,
        };

        match found.or_else(|| lookup.default_value.clone()) {
            Some(value) => Ok(Some(value)),
            None if lookup.required => Err(CoreError::ValidationError(vec![format!(
                "No '{}' entry for key field '{}'",
                lookup.table, lookup.key_field
            )])),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StepExecutor for EnrichmentExecutor {
    async fn apply(&self, step: &TransformationStep, input: &str) -> Result<StepOutcome, CoreError> {
        let config: EnrichmentConfig = if step.configuration.is_null() {
            EnrichmentConfig::default()
        } else {
            serde_json::from_value(step.configuration.clone())
                .map_err(|e| CoreError::TransformationConfigError(format!("Invalid enrichment configuration: {}", e)))?
        };
        if config.fields.is_empty() {
            return Err(CoreError::TransformationConfigError(
                "Enrichment transformation configuration is missing".to_string(),
            ));
        }

        let mut message = Message::parse(input)?;
        for field in &config.fields {
            if !config.overwrite && message.get(&field.target)?.is_some() {
                debug!(field = %field.target, "Field present, not overwritten");
                continue;
            }
            match self.resolve(&message, field).await? {
                Some(value) => message.set(&field.target, &value)?,
                None => debug!(field = %field.target, "Nothing found, field skipped"),
            }
        }
        Ok(StepOutcome::Continue(message.render()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbridge_core::{FlowId, TransformationKind};
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    mock! {
        pub Lookups {}

        #[async_trait]
        impl LookupSource for Lookups {
            async fn lookup(&self, table: &str, key: &str) -> Result<Option<Value>, CoreError>;
        }
    }

    fn step(config: Value) -> TransformationStep {
        TransformationStep::new("enrich", FlowId::from("f"), TransformationKind::Enrichment, 1).with_config(config)
    }

    fn customers() -> Arc<MockLookups> {
        let mut lookups = MockLookups::new();
        lookups.expect_lookup().returning(|table, key| {
            Ok((table == "customers" && key == "C1").then(|| json!({ "name": "Ann", "tier": { "level": "gold" } })))
        });
        Arc::new(lookups)
    }

    #[tokio::test]
    async fn test_static_values_respect_overwrite() {
        let exec = EnrichmentExecutor::new();
        let input = "<Order><Status>open</Status></Order>";
        let config = json!({ "fields": [
            { "target": "Status", "value": "new" },
            { "target": "Source", "value": "web" }
        ]});
        assert_eq!(
            exec.apply(&step(config.clone()), input).await.unwrap(),
            StepOutcome::Continue("<Order><Status>open</Status><Source>web</Source></Order>".to_string())
        );

        let mut overwrite = config;
        overwrite["overwrite"] = json!(true);
        assert_eq!(
            exec.apply(&step(overwrite), input).await.unwrap(),
            StepOutcome::Continue("<Order><Status>new</Status><Source>web</Source></Order>".to_string())
        );
    }

    #[tokio::test]
    async fn test_lookup_with_path_and_default() {
        let exec = EnrichmentExecutor::new().with_lookups(customers());
        let config = json!({ "fields": [
            { "target": "customer.tier", "lookup": { "table": "customers", "keyField": "customerId", "path": "tier.level" } },
            { "target": "customer.region", "lookup": { "table": "regions", "keyField": "customerId", "defaultValue": "EU" } }
        ]});
        let out = exec.apply(&step(config), r#"{"customerId":"C1"}"#).await.unwrap();
        assert_eq!(
            out,
            StepOutcome::Continue(r#"{"customer":{"region":"EU","tier":"gold"},"customerId":"C1"}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_required_lookup_miss_fails() {
        let exec = EnrichmentExecutor::new().with_lookups(customers());
        let config = json!({ "fields": [
            { "target": "name", "lookup": { "table": "customers", "keyField": "customerId", "required": true } }
        ]});
        let err = exec.apply(&step(config), r#"{"customerId":"C9"}"#).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_lookup_without_source_is_a_config_error() {
        let config = json!({ "fields": [
            { "target": "name", "lookup": { "table": "customers", "keyField": "customerId" } }
        ]});
        let err = EnrichmentExecutor::new().apply(&step(config), "{}").await.unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }
}
