use crate::domain::adapter::{AdapterConfig, AdapterDescriptor, AdapterId};
use crate::domain::deployment::{
    build_metadata, generate_endpoint, DeploymentInfo, EndpointSettings,
};
use crate::domain::flow::{FlowId, FlowStatus, IntegrationFlow};
use crate::domain::repository::{AdapterRepository, FlowRepository};
use crate::CoreError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Publishes flows as live endpoints and takes them down again
pub struct FlowDeploymentService {
    flow_repo: Arc<dyn FlowRepository>,
    adapter_repo: Arc<dyn AdapterRepository>,
    settings: EndpointSettings,
}

impl FlowDeploymentService {
    /// Create a new deployment service
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        adapter_repo: Arc<dyn AdapterRepository>,
        settings: EndpointSettings,
    ) -> Self {
        Self {
            flow_repo,
            adapter_repo,
            settings,
        }
    }

    /// Deploy a flow.
    ///
    /// Both adapters must exist and be active. The status transition is a
    /// compare-and-set on `DEVELOPED_INACTIVE`, so of two concurrent deploys
    /// exactly one wins. If adapter-specific setup fails the flow is put
    /// back to `DEVELOPED_INACTIVE`.
    pub async fn deploy(&self, flow_id: &FlowId, actor: &str) -> Result<DeploymentInfo, CoreError> {
        let flow = self.load_flow(flow_id).await?;
        if flow.is_deployed() {
            return Err(CoreError::IllegalState(format!(
                "Flow '{}' is already deployed at {}",
                flow.name,
                flow.deployment_endpoint.as_deref().unwrap_or("<unknown>")
            )));
        }

        let source = self.require_adapter(&flow.source_adapter_id, "Source").await?;
        let target = self.require_adapter(&flow.target_adapter_id, "Target").await?;
        for (role, adapter) in [("Source", &source), ("Target", &target)] {
            if !adapter.active {
                warn!(%flow_id, adapter = %adapter.name, "Refusing to deploy flow with inactive adapter");
                return Err(CoreError::AdapterInactive {
                    role: role.to_string(),
                    adapter: adapter.name.clone(),
                });
            }
        }

        let source_config = source.typed_config()?;
        let endpoint = generate_endpoint(&self.settings, &flow, &source, &source_config);
        let metadata = build_metadata(&flow, &source, &source_config, &endpoint);
        debug!(%flow_id, %endpoint, "Generated deployment endpoint");

        let mut deployed = flow.clone();
        deployed.mark_deployed(endpoint.clone(), metadata, actor)?;
        if !self
            .flow_repo
            .save_if_status(&deployed, FlowStatus::DevelopedInactive)
            .await?
        {
            return Err(CoreError::IllegalState(format!(
                "Flow '{}' was deployed concurrently",
                flow.name
            )));
        }

        if let Err(err) = self.prepare_endpoint(&source, &source_config, &endpoint).await {
            error!(%flow_id, error = %err, "Endpoint setup failed, rolling back deployment");
            if let Err(rollback) = self.roll_back(flow_id).await {
                error!(%flow_id, error = %rollback, "Rollback of failed deployment failed");
            }
            return Err(err);
        }

        info!(%flow_id, %endpoint, %actor, "Flow deployed");
        DeploymentInfo::of(&deployed).ok_or_else(|| {
            CoreError::IllegalState(format!("Flow '{}' has no deployment endpoint", flow.name))
        })
    }

    /// Take a deployed flow down, clearing its endpoint and metadata
    pub async fn undeploy(&self, flow_id: &FlowId, actor: &str) -> Result<(), CoreError> {
        let flow = self.load_flow(flow_id).await?;
        let mut undeployed = flow.clone();
        undeployed.mark_undeployed()?;

        if !self
            .flow_repo
            .save_if_status(&undeployed, FlowStatus::DeployedActive)
            .await?
        {
            return Err(CoreError::IllegalState(format!(
                "Flow '{}' was undeployed concurrently",
                flow.name
            )));
        }

        info!(%flow_id, %actor, "Flow undeployed");
        Ok(())
    }

    /// Deployment view of a flow; `None` unless deployed
    pub async fn deployment_info(&self, flow_id: &FlowId) -> Result<Option<DeploymentInfo>, CoreError> {
        let flow = self.load_flow(flow_id).await?;
        Ok(DeploymentInfo::of(&flow))
    }

    // Reload so counters written since the deploy CAS survive
    async fn roll_back(&self, flow_id: &FlowId) -> Result<(), CoreError> {
        let mut current = self.load_flow(flow_id).await?;
        current.mark_undeployed()?;
        if !self
            .flow_repo
            .save_if_status(&current, FlowStatus::DeployedActive)
            .await?
        {
            warn!(%flow_id, "Flow changed status during rollback");
        }
        Ok(())
    }

    async fn load_flow(&self, flow_id: &FlowId) -> Result<IntegrationFlow, CoreError> {
        self.flow_repo
            .find_by_id(flow_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Flow", flow_id.to_string()))
    }

    async fn require_adapter(&self, id: &AdapterId, role: &str) -> Result<AdapterDescriptor, CoreError> {
        self.adapter_repo.find_by_id(id).await?.ok_or_else(|| {
            CoreError::ConfigurationError(format!(
                "Cannot deploy flow: {} adapter '{}' is not configured",
                role.to_lowercase(),
                id
            ))
        })
    }

    async fn prepare_endpoint(
        &self,
        source: &AdapterDescriptor,
        config: &AdapterConfig,
        endpoint: &str,
    ) -> Result<(), CoreError> {
        match config {
            AdapterConfig::File(file) => {
                let directory = match file.directory.as_deref().filter(|d| !d.trim().is_empty()) {
                    Some(directory) => directory.to_string(),
                    None => endpoint.trim_start_matches("file://").to_string(),
                };
                tokio::fs::create_dir_all(&directory).await.map_err(|e| {
                    CoreError::IOError(format!(
                        "Cannot prepare directory '{}' for adapter '{}': {}",
                        directory, source.name, e
                    ))
                })?;
                debug!(adapter = %source.name, %directory, "Prepared file endpoint directory");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
