use crate::domain::adapter::AdapterId;
use crate::domain::deployment::DeploymentMetadata;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value object: Flow ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(s: &str) -> Self {
        FlowId(s.to_string())
    }
}

/// Deployment status of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    /// Created or undeployed; no public endpoint
    #[default]
    DevelopedInactive,

    /// Published; the endpoint accepts traffic
    DeployedActive,
}

impl FlowStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::DevelopedInactive => "DEVELOPED_INACTIVE",
            FlowStatus::DeployedActive => "DEPLOYED_ACTIVE",
        }
    }
}

/// How the payload travels between source and target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingMode {
    /// Payload is forwarded unchanged
    #[default]
    PassThrough,

    /// Payload is converted to XML, transformed, and converted to the target format
    WithMapping,
}

/// Aggregate: an integration flow linking one source adapter to one target adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationFlow {
    /// Unique identifier
    pub id: FlowId,

    /// Globally unique name
    pub name: String,

    /// Free text description
    #[serde(default)]
    pub description: Option<String>,

    /// Adapter the payload comes from
    pub source_adapter_id: AdapterId,

    /// Adapter the payload goes to
    pub target_adapter_id: AdapterId,

    /// Mapping mode
    #[serde(default)]
    pub mapping_mode: MappingMode,

    /// Bypass conversion and transformation entirely
    #[serde(default)]
    pub skip_xml_conversion: bool,

    /// Deployment status
    #[serde(default)]
    pub status: FlowStatus,

    /// Public endpoint while deployed
    #[serde(default)]
    pub deployment_endpoint: Option<String>,

    /// Derived deployment hints while deployed
    #[serde(default)]
    pub deployment_metadata: Option<DeploymentMetadata>,

    /// When the current deployment happened
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,

    /// Who performed the current deployment
    #[serde(default)]
    pub deployed_by: Option<String>,

    /// Timestamp of the last execution
    #[serde(default)]
    pub last_execution_at: Option<DateTime<Utc>>,

    /// Total executions
    #[serde(default)]
    pub execution_count: u64,

    /// Successful executions
    #[serde(default)]
    pub success_count: u64,

    /// Failed executions
    #[serde(default)]
    pub error_count: u64,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl IntegrationFlow {
    /// Create a new flow in `DEVELOPED_INACTIVE`
    pub fn new(
        id: FlowId,
        name: impl Into<String>,
        source_adapter_id: AdapterId,
        target_adapter_id: AdapterId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            source_adapter_id,
            target_adapter_id,
            mapping_mode: MappingMode::PassThrough,
            skip_xml_conversion: false,
            status: FlowStatus::DevelopedInactive,
            deployment_endpoint: None,
            deployment_metadata: None,
            deployed_at: None,
            deployed_by: None,
            last_execution_at: None,
            execution_count: 0,
            success_count: 0,
            error_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set the mapping mode
    pub fn with_mapping_mode(mut self, mode: MappingMode) -> Self {
        self.mapping_mode = mode;
        self
    }

    /// Builder: set the skip-conversion flag
    pub fn with_skip_xml_conversion(mut self, skip: bool) -> Self {
        self.skip_xml_conversion = skip;
        self
    }

    /// Whether the flow currently serves traffic
    pub fn is_deployed(&self) -> bool {
        self.status == FlowStatus::DeployedActive
    }

    /// Transition to `DEPLOYED_ACTIVE`
    pub fn mark_deployed(
        &mut self,
        endpoint: String,
        metadata: DeploymentMetadata,
        actor: &str,
    ) -> Result<(), CoreError> {
        if self.status == FlowStatus::DeployedActive {
            return Err(CoreError::IllegalState(format!(
                "Flow '{}' is already deployed at {}",
                self.name,
                self.deployment_endpoint.as_deref().unwrap_or("<unknown>")
            )));
        }

        let now = Utc::now();
        self.status = FlowStatus::DeployedActive;
        self.deployment_endpoint = Some(endpoint);
        self.deployment_metadata = Some(metadata);
        self.deployed_at = Some(now);
        self.deployed_by = Some(actor.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Transition back to `DEVELOPED_INACTIVE`, clearing endpoint and metadata
    pub fn mark_undeployed(&mut self) -> Result<(), CoreError> {
        if self.status != FlowStatus::DeployedActive {
            return Err(CoreError::IllegalState(format!(
                "Flow '{}' is not deployed (status {})",
                self.name,
                self.status.as_str()
            )));
        }

        self.status = FlowStatus::DevelopedInactive;
        self.deployment_endpoint = None;
        self.deployment_metadata = None;
        self.deployed_at = None;
        self.deployed_by = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Update execution counters after a run
    pub fn record_execution(&mut self, success: bool, at: DateTime<Utc>) {
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
        self.last_execution_at = Some(at);
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> IntegrationFlow {
        IntegrationFlow::new(
            FlowId::from("f1"),
            "Orders",
            AdapterId::from("src"),
            AdapterId::from("tgt"),
        )
    }

    #[test]
    fn test_new_flow_is_inactive() {
        let flow = flow();
        assert_eq!(flow.status, FlowStatus::DevelopedInactive);
        assert!(flow.deployment_endpoint.is_none());
        assert_eq!(flow.mapping_mode, MappingMode::PassThrough);
    }

    #[test]
    fn test_deploy_twice_is_illegal() {
        let mut flow = flow();
        flow.mark_deployed("http://h/soap/orders".to_string(), DeploymentMetadata::default(), "ops")
            .unwrap();

        let err = flow
            .mark_deployed("http://h/other".to_string(), DeploymentMetadata::default(), "ops")
            .unwrap_err();
        assert!(matches!(err, CoreError::IllegalState(_)));
        assert_eq!(flow.deployment_endpoint.as_deref(), Some("http://h/soap/orders"));
    }

    #[test]
    fn test_undeploy_requires_deployed() {
        let mut flow = flow();
        let before = flow.clone();
        assert!(matches!(flow.mark_undeployed(), Err(CoreError::IllegalState(_))));
        assert_eq!(flow, before);
    }

    #[test]
    fn test_record_execution_counters() {
        let mut flow = flow();
        let now = Utc::now();
        flow.record_execution(true, now);
        flow.record_execution(false, now);
        assert_eq!(flow.execution_count, 2);
        assert_eq!(flow.success_count, 1);
        assert_eq!(flow.error_count, 1);
        assert_eq!(flow.last_execution_at, Some(now));
    }

    #[test]
    fn test_flow_deserializes_camel_case() {
        let flow: IntegrationFlow = serde_json::from_value(serde_json::json!({
            "id": "f1",
            "name": "Orders",
            "sourceAdapterId": "a",
            "targetAdapterId": "b",
            "mappingMode": "WITH_MAPPING",
            "skipXmlConversion": true
        }))
        .unwrap();
        assert_eq!(flow.mapping_mode, MappingMode::WithMapping);
        assert!(flow.skip_xml_conversion);
        assert_eq!(flow.status, FlowStatus::DevelopedInactive);
    }
}
