/// Transformation pipeline
pub mod transformation_pipeline;

/// Flow execution service
pub mod flow_execution_service;

/// Deployment lifecycle
pub mod deployment_service;

/// Inbound SOAP/REST routing
pub mod endpoint_service;

/// Scheduled execution of polling flows
pub mod polling_scheduler;

#[cfg(test)]
pub(crate) mod test_support;
