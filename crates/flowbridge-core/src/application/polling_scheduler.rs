use crate::application::flow_execution_service::FlowExecutionService;
use crate::domain::adapter::ConnectionMode;
use crate::domain::repository::{AdapterRepository, FlowRepository};
use crate::CoreError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Periodically runs deployed flows whose source adapter polls
pub struct PollingScheduler {
    flow_repo: Arc<dyn FlowRepository>,
    adapter_repo: Arc<dyn AdapterRepository>,
    executor: FlowExecutionService,
}

impl PollingScheduler {
    /// Create a new scheduler
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        adapter_repo: Arc<dyn AdapterRepository>,
        executor: FlowExecutionService,
    ) -> Self {
        Self {
            flow_repo,
            adapter_repo,
            executor,
        }
    }

    /// One scheduling pass: spawn an execution for every due flow
    pub async fn poll_once(&self) -> Result<Vec<JoinHandle<()>>, CoreError> {
        let mut handles = Vec::new();

        for flow in self.flow_repo.find_all().await? {
            if !flow.is_deployed() {
                continue;
            }
            let Some(source) = self.adapter_repo.find_by_id(&flow.source_adapter_id).await? else {
                warn!(flow_id = %flow.id, adapter_id = %flow.source_adapter_id, "Deployed flow has no source adapter");
                continue;
            };
            let polls = match source.typed_config() {
                Ok(config) => config.connection_mode() == Some(ConnectionMode::Poll),
                Err(err) => {
                    warn!(flow_id = %flow.id, error = %err, "Skipping flow with invalid source configuration");
                    false
                }
            };
            if polls && source.active {
                debug!(flow_id = %flow.id, "Scheduling poll execution");
                handles.push(self.executor.spawn_flow(flow.id.clone()));
            }
        }

        Ok(handles)
    }

    /// Run [`poll_once`](Self::poll_once) every `interval` until the task is aborted
    pub fn start(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!(interval_ms = interval.as_millis() as u64, "Starting polling scheduler");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = self.poll_once().await {
                    error!(error = %err, "Polling pass failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::*;
    use crate::domain::adapter::{AdapterDescriptor, AdapterId, AdapterMode, AdapterType};
    use crate::domain::deployment::DeploymentMetadata;
    use crate::domain::flow::{FlowId, IntegrationFlow};
    use crate::types::Payload;
    use serde_json::json;

    async fn flow(flows: &FakeFlows, id: &str, source: &str, deploy: bool) {
        let mut flow = IntegrationFlow::new(FlowId::from(id), id, AdapterId::from(source), AdapterId::from("out"));
        if deploy {
            flow.mark_deployed(format!("http://localhost/{id}"), DeploymentMetadata::default(), "t")
                .unwrap();
        }
        flows.insert(flow).await;
    }

    #[tokio::test]
    async fn test_only_deployed_polling_flows_run() {
        let flows = Arc::new(FakeFlows::default());
        let adapters = Arc::new(FakeAdapters::default());
        adapters
            .insert(
                AdapterDescriptor::new("poller", "Poller", AdapterType::Http, AdapterMode::Sender)
                    .with_config(json!({ "endpoint": "http://src/feed", "connectionMode": "POLL" })),
            )
            .await;
        adapters
            .insert(
                AdapterDescriptor::new("pusher", "Pusher", AdapterType::Http, AdapterMode::Sender)
                    .with_config(json!({ "endpoint": "http://src/feed", "connectionMode": "PUSH" })),
            )
            .await;
        adapters
            .insert(
                AdapterDescriptor::new("out", "Out", AdapterType::Http, AdapterMode::Receiver)
                    .with_config(json!({ "endpoint": "http://dst/in" })),
            )
            .await;
        flow(&flows, "polling", "poller", true).await;
        flow(&flows, "pushing", "pusher", true).await;
        flow(&flows, "idle", "poller", false).await;

        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(Payload::text("{\"n\":1}")));
        gateway
            .expect_send()
            .times(1)
            .returning(|_, _, _| Ok(Payload::text("")));
        let executor = FlowExecutionService::new(
            flows.clone(),
            adapters.clone(),
            Arc::new(FakeSteps::default()),
            Arc::new(FakeSteps::default()),
            Arc::new(gateway),
            Arc::new(test_pipeline()),
            Arc::new(TaggingConverter),
        );
        let scheduler = PollingScheduler::new(flows.clone(), adapters, executor);

        let handles = scheduler.poll_once().await.unwrap();
        assert_eq!(handles.len(), 1);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(flows.get("polling").await.success_count, 1);
        assert_eq!(flows.get("pushing").await.execution_count, 0);
    }
}
