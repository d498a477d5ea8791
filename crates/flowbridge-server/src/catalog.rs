//! YAML catalog used to seed the in-memory repositories at startup
//!
//! ```yaml
//! adapters:
//!   - id: orders-ws
//!     name: Orders WS
//!     type: SOAP
//!     mode: SENDER
//!     active: true
//!     configuration:
//!       endpoint: http://erp.local/ws/orders
//! flows:
//!   - id: orders
//!     name: Orders
//!     sourceAdapterId: orders-ws
//!     targetAdapterId: orders-api
//! lookups:
//!   customers:
//!     C1: { tier: gold }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use flowbridge_core::{
    AdapterDescriptor, FieldMapping, IntegrationFlow, TransformationFunction, TransformationStep,
};
use flowbridge_state_inmemory::InMemoryStateStoreProvider;

use crate::error::{ServerError, ServerResult};

/// Everything a catalog document may declare
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Catalog {
    pub adapters: Vec<AdapterDescriptor>,
    pub flows: Vec<IntegrationFlow>,
    pub steps: Vec<TransformationStep>,
    pub mappings: Vec<FieldMapping>,
    pub functions: Vec<TransformationFunction>,
    /// Target templates by structure id
    pub templates: HashMap<String, String>,
    /// Lookup tables: table name to key to value
    pub lookups: HashMap<String, HashMap<String, Value>>,
}

impl Catalog {
    /// Parse a YAML document
    pub fn parse(yaml: &str) -> ServerResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub async fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path).await.map_err(|err| {
            ServerError::CatalogError(format!("Cannot read {}: {}", path.display(), err))
        })?;
        Self::parse(&yaml)
    }

    /// Write every entry into the provider's storage
    pub async fn apply(&self, provider: &InMemoryStateStoreProvider) -> ServerResult<()> {
        let repos = provider.create_repositories();

        for adapter in &self.adapters {
            repos.adapters.save(adapter).await?;
        }
        for flow in &self.flows {
            for adapter_id in [&flow.source_adapter_id, &flow.target_adapter_id] {
                if repos.adapters.find_by_id(adapter_id).await?.is_none() {
                    return Err(ServerError::CatalogError(format!(
                        "Flow '{}' references unknown adapter '{}'",
                        flow.name, adapter_id
                    )));
                }
            }
            repos.flows.save(flow).await?;
        }
        for step in &self.steps {
            repos.steps.save(step).await?;
        }
        for mapping in &self.mappings {
            repos.mappings.save(mapping).await?;
        }
        for function in &self.functions {
            provider.functions().register(function.clone()).await;
        }
        for (structure_id, template) in &self.templates {
            provider.templates().insert(structure_id.clone(), template.clone()).await;
        }
        for (table, rows) in &self.lookups {
            provider.lookups().load_table(table.clone(), rows.clone()).await;
        }

        info!(
            adapters = self.adapters.len(),
            flows = self.flows.len(),
            steps = self.steps.len(),
            mappings = self.mappings.len(),
            "Catalog loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbridge_core::{AdapterId, AdapterType, FlowId, TransformationKind};
    use serde_json::json;

    const CATALOG: &str = r#"
adapters:
  - id: src
    name: Orders WS
    type: SOAP
    mode: SENDER
    active: true
    configuration:
      endpoint: http://erp.local/ws/orders
  - id: dst
    name: Orders API
    type: REST
    mode: RECEIVER
    active: true
    configuration:
      endpoint: http://crm.local/api/orders
      method: PUT
flows:
  - id: f1
    name: Orders
    sourceAdapterId: src
    targetAdapterId: dst
    mappingMode: WITH_MAPPING
steps:
  - id: s1
    flowId: f1
    type: FILTER
    executionOrder: 1
    configuration:
      condition: "Amount > 0"
mappings:
  - id: m1
    stepId: s2
    sourceFields: ["/Req/Amount"]
    targetField: "/Out/Total"
functions:
  - name: double
    body: "(x) => x * 2"
templates:
  order-v1: "<Order/>"
lookups:
  customers:
    C1: { tier: gold }
"#;

    #[tokio::test]
    async fn test_catalog_seeds_repositories() {
        let catalog = Catalog::parse(CATALOG).unwrap();
        let provider = InMemoryStateStoreProvider::new();
        catalog.apply(&provider).await.unwrap();

        let repos = provider.create_repositories();
        let adapter = repos.adapters.find_by_id(&AdapterId::from("src")).await.unwrap().unwrap();
        assert_eq!(adapter.adapter_type, AdapterType::Soap);
        assert!(adapter.active);

        let flow = repos.flows.find_by_id(&FlowId::from("f1")).await.unwrap().unwrap();
        assert!(!flow.is_deployed());

        let steps = repos.steps.find_by_flow(&FlowId::from("f1")).await.unwrap();
        assert_eq!(steps[0].kind, TransformationKind::Filter);
        assert!(steps[0].active);

        assert!(repos.functions.find_function("double").await.unwrap().is_some());
        assert_eq!(repos.templates.find_template("order-v1").await.unwrap(), Some("<Order/>".into()));
        assert_eq!(repos.lookups.lookup("customers", "C1").await.unwrap(), Some(json!({ "tier": "gold" })));
    }

    #[tokio::test]
    async fn test_flow_with_unknown_adapter_is_rejected() {
        let catalog = Catalog::parse(
            r#"
flows:
  - id: f1
    name: Orphan
    sourceAdapterId: nope
    targetAdapterId: nope
"#,
        )
        .unwrap();
        let err = catalog.apply(&InMemoryStateStoreProvider::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::CatalogError(msg) if msg.contains("nope")));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, CATALOG).unwrap();

        let catalog = Catalog::load(&path).await.unwrap();
        assert_eq!(catalog.adapters.len(), 2);
        assert_eq!(catalog.flows[0].name, "Orders");

        let missing = Catalog::load(dir.path().join("missing.yaml")).await;
        assert!(matches!(missing, Err(ServerError::CatalogError(_))));
    }

    #[test]
    fn test_invalid_yaml_is_a_catalog_error() {
        assert!(matches!(Catalog::parse("adapters: {"), Err(ServerError::CatalogError(_))));
    }
}
