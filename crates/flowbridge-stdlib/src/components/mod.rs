// Module definitions for the various component categories

pub mod adapters;
pub mod conversion;
pub mod transformation;

// Re-export common components
pub use adapters::ProtocolAdapterGateway;
pub use conversion::DefaultFormatConverter;
pub use transformation::*;
