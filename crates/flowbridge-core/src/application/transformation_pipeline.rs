use crate::domain::correlation::CorrelationContext;
use crate::domain::transformation::{ordered_active_steps, TransformationKind, TransformationStep};
use crate::types::LogLevel;
use crate::{CoreError, StepExecutor, StepOutcome};
use std::sync::Arc;
use tracing::{debug, info};

/// One executor per transformation kind
#[derive(Clone)]
pub struct StepExecutors {
    /// FIELD_MAPPING
    pub field_mapping: Arc<dyn StepExecutor>,
    /// CUSTOM_FUNCTION
    pub custom_function: Arc<dyn StepExecutor>,
    /// FILTER
    pub filter: Arc<dyn StepExecutor>,
    /// ENRICHMENT
    pub enrichment: Arc<dyn StepExecutor>,
    /// VALIDATION
    pub validation: Arc<dyn StepExecutor>,
}

/// Result of running the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// All steps ran; the transformed payload
    Completed(String),
    /// A FILTER step dropped the message
    Filtered {
        /// Step name
        step: String,
        /// Why the message was dropped
        reason: String,
    },
}

/// Runs a flow's transformation steps in order.
///
/// Only active steps run, sorted by `executionOrder` then id. Each step's
/// output is the next step's input. VALIDATION steps never change the
/// payload.
pub struct TransformationPipeline {
    executors: StepExecutors,
}

impl TransformationPipeline {
    /// Create a pipeline over the given executors
    pub fn new(executors: StepExecutors) -> Self {
        Self { executors }
    }

    fn executor_for(&self, kind: TransformationKind) -> Result<&Arc<dyn StepExecutor>, CoreError> {
        match kind {
            TransformationKind::FieldMapping => Ok(&self.executors.field_mapping),
            TransformationKind::CustomFunction => Ok(&self.executors.custom_function),
            TransformationKind::Filter => Ok(&self.executors.filter),
            TransformationKind::Enrichment => Ok(&self.executors.enrichment),
            TransformationKind::Validation => Ok(&self.executors.validation),
            TransformationKind::Unsupported => Err(CoreError::TransformationConfigError(
                "Unrecognized transformation kind".to_string(),
            )),
        }
    }

    /// Apply `steps` to `input`
    pub async fn apply(
        &self,
        steps: &[TransformationStep],
        input: String,
        ctx: Option<&CorrelationContext>,
    ) -> Result<PipelineOutcome, CoreError> {
        let mut payload = input;

        for step in ordered_active_steps(steps) {
            let wrap = |err: CoreError| CoreError::StepExecutionError {
                step: step.name.clone(),
                kind: step.kind.as_str().to_string(),
                source: Box::new(err),
            };

            let executor = self.executor_for(step.kind).map_err(wrap)?;
            debug!(step = %step.id, kind = %step.kind, order = step.execution_order, "applying transformation step");

            match executor.apply(step, &payload).await.map_err(wrap)? {
                StepOutcome::Continue(output) => {
                    if step.kind != TransformationKind::Validation {
                        payload = output;
                    }
                    if let Some(ctx) = ctx {
                        ctx.record_step(
                            LogLevel::Info,
                            format!("Applied {} step '{}'", step.kind, step.name),
                        );
                    }
                }
                StepOutcome::Filtered { reason } => {
                    info!(step = %step.id, %reason, "message filtered out");
                    if let Some(ctx) = ctx {
                        ctx.record_step(
                            LogLevel::Info,
                            format!("Message filtered by step '{}': {}", step.name, reason),
                        );
                    }
                    return Ok(PipelineOutcome::Filtered {
                        step: step.name.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(PipelineOutcome::Completed(payload))
    }
}
