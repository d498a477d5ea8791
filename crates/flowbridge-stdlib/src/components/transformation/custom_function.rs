use super::functions::{stringify, Function};
use super::message::Message;
use async_trait::async_trait;
use flowbridge_core::{CoreError, FunctionRegistry, StepExecutor, StepOutcome, TransformationStep};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Configuration of a CUSTOM_FUNCTION step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomFunctionConfig {
    /// Registered function name, or the function body itself
    #[serde(alias = "javaFunction", alias = "functionName")]
    pub function: Option<String>,
    /// Payload fields passed as positional arguments
    #[serde(alias = "inputFields")]
    pub source_fields: Vec<String>,
}

/// CUSTOM_FUNCTION executor: the function's stringified result replaces the payload
pub struct CustomFunctionExecutor {
    registry: Arc<dyn FunctionRegistry>,
}

impl CustomFunctionExecutor {
    /// Create a new executor
    pub fn new(registry: Arc<dyn FunctionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl StepExecutor for CustomFunctionExecutor {
    async fn apply(&self, step: &TransformationStep, input: &str) -> Result<StepOutcome, CoreError> {
        if step.configuration.is_null() {
            return Err(CoreError::TransformationConfigError(
                "Custom function configuration is missing".to_string(),
            ));
        }
        let config: CustomFunctionConfig = serde_json::from_value(step.configuration.clone())
            .map_err(|e| CoreError::TransformationConfigError(format!("Invalid custom function configuration: {}", e)))?;
        let reference = config
            .function
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| CoreError::TransformationConfigError("Custom function name/body is missing".to_string()))?;

        let body = match self.registry.find_function(reference).await? {
            Some(function) => function.body,
            None => {
                debug!(function = %reference, "Function not registered, using configured text as body");
                reference.to_string()
            }
        };

        let message = Message::parse(input)?;
        let mut args = Vec::with_capacity(config.source_fields.len());
        for field in &config.source_fields {
            args.push(message.get_value(field)?.unwrap_or(Value::Null));
        }

        let result = Function::parse(&body).call(&args, &message.context())?;
        Ok(StepOutcome::Continue(stringify(&result)))
    }
}
