/// Integration flow aggregate
pub mod flow;

/// Adapter descriptors and typed adapter configuration
pub mod adapter;

/// Transformation steps, field mappings and functions
pub mod transformation;

/// Correlation context and payload capture
pub mod correlation;

/// Execution state machine and outcomes
pub mod execution;

/// Endpoint generation and deployment metadata
pub mod deployment;

/// Format conversion settings
pub mod conversion;

/// Repository interfaces
pub mod repository;
