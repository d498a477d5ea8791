//!
//! Standard library for the FlowBridge integration platform
//!
//! Protocol adapters, transformation step executors and format conversion
//! plugged into the ports defined by `flowbridge-core`.
//!

use flowbridge_core::{
    FieldMappingRepository, FunctionRegistry, LookupSource, StepExecutors, TemplateRepository,
};
use std::sync::Arc;

pub mod components;

pub use components::adapters::{ProtocolAdapterGateway, DEFAULT_TIMEOUT};
pub use components::conversion::DefaultFormatConverter;
pub use components::transformation::{
    CustomFunctionExecutor, EnrichmentExecutor, FieldMappingExecutor, FilterExecutor,
    ValidationExecutor,
};

/// Collaborators the standard step executors read from
#[derive(Clone)]
pub struct StepSources {
    /// Field mapping rows of FIELD_MAPPING steps
    pub mappings: Arc<dyn FieldMappingRepository>,
    /// Named functions
    pub functions: Arc<dyn FunctionRegistry>,
    /// Target templates referenced by `targetStructureId`
    pub templates: Option<Arc<dyn TemplateRepository>>,
    /// Lookup tables for ENRICHMENT steps
    pub lookups: Option<Arc<dyn LookupSource>>,
}

/// Build the executor set for every step kind
pub fn standard_executors(sources: StepSources) -> StepExecutors {
    let mut field_mapping = FieldMappingExecutor::new(sources.mappings, sources.functions.clone());
    if let Some(templates) = sources.templates {
        field_mapping = field_mapping.with_templates(templates);
    }
    let mut enrichment = EnrichmentExecutor::new();
    if let Some(lookups) = sources.lookups {
        enrichment = enrichment.with_lookups(lookups);
    }

    StepExecutors {
        field_mapping: Arc::new(field_mapping),
        custom_function: Arc::new(CustomFunctionExecutor::new(sources.functions)),
        filter: Arc::new(FilterExecutor::new()),
        enrichment: Arc::new(enrichment),
        validation: Arc::new(ValidationExecutor::new()),
    }
}
