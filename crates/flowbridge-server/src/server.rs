//! FlowBridge server
//!
//! Wires the in-memory state, the standard adapters and step executors and
//! the core services together, and serves them over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use flowbridge_core::{
    FlowDeploymentService, FlowExecutionService, IntegrationEndpointService, PollingScheduler,
    TransformationPipeline,
};
use flowbridge_state_inmemory::{InMemoryMessageLog, InMemoryStateStoreProvider, Repositories};
use flowbridge_stdlib::{standard_executors, DefaultFormatConverter, ProtocolAdapterGateway, StepSources};

use crate::config::ServerConfig;
use crate::error::ServerResult;

// How often the message log is swept for expired entries
const MESSAGE_LOG_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Services shared by the request handlers
pub struct FlowBridgeServer {
    /// Configuration
    pub config: ServerConfig,
    provider: InMemoryStateStoreProvider,
    repositories: Repositories,
    executor: FlowExecutionService,
    deployment: FlowDeploymentService,
    endpoints: IntegrationEndpointService,
    message_log: Arc<InMemoryMessageLog>,
    sweeper: JoinHandle<()>,
}

impl std::fmt::Debug for FlowBridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowBridgeServer")
            .field("config", &self.config)
            .finish()
    }
}

impl FlowBridgeServer {
    /// Build a server over empty in-memory storage.
    ///
    /// Must be called inside a tokio runtime; the message log sweep is
    /// started here.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        Self::with_provider(config, InMemoryStateStoreProvider::new())
    }

    /// Build a server over an existing provider
    pub fn with_provider(config: ServerConfig, provider: InMemoryStateStoreProvider) -> ServerResult<Self> {
        let repositories = provider.create_repositories();

        let gateway = Arc::new(ProtocolAdapterGateway::new(config.adapter_timeout())?);
        let pipeline = Arc::new(TransformationPipeline::new(standard_executors(StepSources {
            mappings: repositories.mappings.clone(),
            functions: repositories.functions.clone(),
            templates: Some(repositories.templates.clone()),
            lookups: Some(repositories.lookups.clone()),
        })));

        let (message_log, sweeper) =
            InMemoryMessageLog::start(config.retention_policy(), MESSAGE_LOG_SWEEP_INTERVAL);

        let executor = FlowExecutionService::new(
            repositories.flows.clone(),
            repositories.adapters.clone(),
            repositories.steps.clone(),
            repositories.mappings.clone(),
            gateway,
            pipeline,
            Arc::new(DefaultFormatConverter::new()),
        )
        .with_recorder(message_log.clone());

        let deployment = FlowDeploymentService::new(
            repositories.flows.clone(),
            repositories.adapters.clone(),
            config.endpoint_settings(),
        );
        let endpoints = IntegrationEndpointService::new(
            repositories.flows.clone(),
            repositories.adapters.clone(),
            executor.clone(),
        );

        Ok(Self {
            config,
            provider,
            repositories,
            executor,
            deployment,
            endpoints,
            message_log,
            sweeper,
        })
    }

    /// Storage provider, for seeding
    pub fn provider(&self) -> &InMemoryStateStoreProvider {
        &self.provider
    }

    /// Repositories over the server's storage
    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    /// Flow orchestrator
    pub fn executor(&self) -> &FlowExecutionService {
        &self.executor
    }

    /// Deployment manager
    pub fn deployment(&self) -> &FlowDeploymentService {
        &self.deployment
    }

    /// Inbound SOAP/REST router
    pub fn endpoints(&self) -> &IntegrationEndpointService {
        &self.endpoints
    }

    /// Execution message log
    pub fn message_log(&self) -> &Arc<InMemoryMessageLog> {
        &self.message_log
    }

    /// HTTP routes over this server
    pub fn router(self: &Arc<Self>) -> Router {
        crate::api::build_router(self.clone())
    }

    /// Start the polling scheduler, unless polling is disabled
    pub fn start_scheduler(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.poll_interval()?;
        let scheduler = Arc::new(PollingScheduler::new(
            self.repositories.flows.clone(),
            self.repositories.adapters.clone(),
            self.executor.clone(),
        ));
        Some(scheduler.start(interval))
    }

    /// Serve until ctrl-c
    pub async fn run(self: Arc<Self>) -> ServerResult<()> {
        info!("Starting FlowBridge server");

        let scheduler = self.start_scheduler();
        if scheduler.is_none() {
            info!("Polling scheduler disabled");
        }

        let app = self.router();
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|err| {
                crate::error::ServerError::ConfigError(format!(
                    "Invalid bind address {}:{}: {}",
                    self.config.bind_address, self.config.port, err
                ))
            })?;
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(handle) = scheduler {
            handle.abort();
        }
        info!("FlowBridge server stopped");
        Ok(())
    }
}

impl Drop for FlowBridgeServer {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
