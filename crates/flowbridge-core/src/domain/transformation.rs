use crate::domain::flow::FlowId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Value object: Transformation step ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub String);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        StepId(s.to_string())
    }
}

/// Kind of a transformation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationKind {
    /// Source fields to target fields
    FieldMapping,
    /// Whole-payload function
    CustomFunction,
    /// Predicate that may drop the message
    Filter,
    /// Adds fields from static values or lookups
    Enrichment,
    /// Checks constraints without touching the payload
    Validation,
    /// Any kind this engine does not know
    #[serde(other)]
    Unsupported,
}

impl TransformationKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformationKind::FieldMapping => "FIELD_MAPPING",
            TransformationKind::CustomFunction => "CUSTOM_FUNCTION",
            TransformationKind::Filter => "FILTER",
            TransformationKind::Enrichment => "ENRICHMENT",
            TransformationKind::Validation => "VALIDATION",
            TransformationKind::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for TransformationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of a flow's transformation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationStep {
    /// Unique identifier, also the ordering tie-breaker
    pub id: StepId,

    /// Owning flow
    pub flow_id: FlowId,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Step kind
    #[serde(rename = "type")]
    pub kind: TransformationKind,

    /// Position in the pipeline; gaps are allowed
    #[serde(default)]
    pub execution_order: i32,

    /// Inactive steps are skipped
    #[serde(default = "default_true")]
    pub active: bool,

    /// Kind specific configuration
    #[serde(default)]
    pub configuration: Value,
}

fn default_true() -> bool {
    true
}

impl TransformationStep {
    /// Create an active step
    pub fn new(
        id: impl Into<String>,
        flow_id: FlowId,
        kind: TransformationKind,
        execution_order: i32,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: StepId(id),
            flow_id,
            kind,
            execution_order,
            active: true,
            configuration: Value::Null,
        }
    }

    /// Builder: set the configuration
    pub fn with_config(mut self, configuration: Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Builder: set the active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Active steps in pipeline order: ascending `executionOrder`, ties broken by id
pub fn ordered_active_steps(steps: &[TransformationStep]) -> Vec<&TransformationStep> {
    let mut active: Vec<_> = steps.iter().filter(|s| s.active).collect();
    active.sort_by(|a, b| {
        a.execution_order
            .cmp(&b.execution_order)
            .then_with(|| a.id.cmp(&b.id))
    });
    active
}

/// Grouping metadata carried by FIELD_MAPPING steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingGroupConfig {
    /// Free form mapping type label
    pub mapping_type: Option<String>,
    /// Source WSDL operation the mappings belong to
    pub source_wsdl_operation: Option<String>,
    /// Target WSDL operation the mappings belong to
    pub target_wsdl_operation: Option<String>,
    /// Message structure holding the target template
    pub target_structure_id: Option<String>,
    /// Inline target template
    pub target_template: Option<String>,
}

/// A source-to-target field assignment inside a FIELD_MAPPING step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Unique identifier
    pub id: String,

    /// Owning step
    pub step_id: StepId,

    /// Source field references (XPath or flat key); never empty
    pub source_fields: Vec<String>,

    /// Target field reference
    pub target_field: String,

    /// Explicit source XPath, overrides `source_fields`
    #[serde(default)]
    pub source_xpath: Option<String>,

    /// Explicit target XPath, overrides `target_field`
    #[serde(default)]
    pub target_xpath: Option<String>,

    /// Inline function body
    #[serde(default)]
    pub function_body: Option<String>,

    /// Registered function name
    #[serde(default)]
    pub function_name: Option<String>,

    /// Join rule for multiple sources
    #[serde(default)]
    pub mapping_rule: Option<String>,

    /// Map once per repeated context node
    #[serde(default)]
    pub is_array_mapping: bool,

    /// XPath selecting the repeated context nodes
    #[serde(default)]
    pub array_context_path: Option<String>,

    /// Inactive mappings are skipped
    #[serde(default = "default_true")]
    pub active: bool,

    /// Position among the step's mappings
    #[serde(default)]
    pub mapping_order: i32,
}

impl FieldMapping {
    /// Simple one-to-one mapping
    pub fn new(
        id: impl Into<String>,
        step_id: StepId,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            step_id,
            source_fields: vec![source.into()],
            target_field: target.into(),
            source_xpath: None,
            target_xpath: None,
            function_body: None,
            function_name: None,
            mapping_rule: None,
            is_array_mapping: false,
            array_context_path: None,
            active: true,
            mapping_order: 0,
        }
    }

    /// Builder: set the mapping order
    pub fn with_order(mut self, order: i32) -> Self {
        self.mapping_order = order;
        self
    }

    /// Builder: make this an array mapping over `context_path`
    pub fn with_array_context(mut self, context_path: impl Into<String>) -> Self {
        self.is_array_mapping = true;
        self.array_context_path = Some(context_path.into());
        self
    }

    /// Builder: set an inline function body
    pub fn with_function(mut self, body: impl Into<String>) -> Self {
        self.function_body = Some(body.into());
        self
    }

    /// Effective source references
    pub fn sources(&self) -> Vec<&str> {
        match self.source_xpath.as_deref() {
            Some(xpath) if !xpath.trim().is_empty() => vec![xpath],
            _ => self.source_fields.iter().map(String::as_str).collect(),
        }
    }

    /// Effective target reference
    pub fn target(&self) -> &str {
        match self.target_xpath.as_deref() {
            Some(xpath) if !xpath.trim().is_empty() => xpath,
            _ => &self.target_field,
        }
    }
}

/// Active mappings in execution order
pub fn ordered_active_mappings(mappings: &[FieldMapping]) -> Vec<&FieldMapping> {
    let mut active: Vec<_> = mappings.iter().filter(|m| m.active).collect();
    active.sort_by(|a, b| {
        a.mapping_order
            .cmp(&b.mapping_order)
            .then_with(|| a.id.cmp(&b.id))
    });
    active
}

/// A reusable function referenced by name from mappings and CUSTOM_FUNCTION steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationFunction {
    /// Unique name
    pub name: String,
    /// Expression body
    pub body: String,
    /// Free text description
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_steps_sorted_by_order_then_id() {
        let flow = FlowId::from("f");
        let steps = vec![
            TransformationStep::new("c", flow.clone(), TransformationKind::Filter, 20),
            TransformationStep::new("b", flow.clone(), TransformationKind::Validation, 10),
            TransformationStep::new("a", flow.clone(), TransformationKind::Enrichment, 10),
            TransformationStep::new("z", flow.clone(), TransformationKind::Filter, 1).with_active(false),
        ];
        let ids: Vec<_> = ordered_active_steps(&steps).iter().map(|s| s.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_kind_is_kept_as_unsupported() {
        let step: TransformationStep = serde_json::from_value(json!({
            "id": "s1",
            "flowId": "f",
            "type": "XSLT",
            "executionOrder": 1
        }))
        .unwrap();
        assert_eq!(step.kind, TransformationKind::Unsupported);
        assert!(step.active);
    }

    #[test]
    fn test_xpath_overrides_fields() {
        let mut mapping = FieldMapping::new("m", StepId::from("s"), "amount", "total");
        assert_eq!(mapping.sources(), vec!["amount"]);
        assert_eq!(mapping.target(), "total");

        mapping.source_xpath = Some("/Req/Amount".to_string());
        mapping.target_xpath = Some("/Out/Total".to_string());
        assert_eq!(mapping.sources(), vec!["/Req/Amount"]);
        assert_eq!(mapping.target(), "/Out/Total");
    }
}
