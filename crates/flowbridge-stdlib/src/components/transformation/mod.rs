//! Executors for the five transformation step kinds

pub mod custom_function;
pub mod enrichment;
pub mod field_mapping;
pub mod filter;
pub mod functions;
pub mod message;
pub mod validation;

pub use custom_function::CustomFunctionExecutor;
pub use enrichment::EnrichmentExecutor;
pub use field_mapping::FieldMappingExecutor;
pub use filter::FilterExecutor;
pub use message::Message;
pub use validation::ValidationExecutor;
