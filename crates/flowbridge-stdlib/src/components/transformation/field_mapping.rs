use super::functions::{stringify, Function};
use super::message::{is_bare_name, json_search, set_json_path, xml_target_path, Message};
use crate::components::conversion::json_xml::infer_scalar;
use async_trait::async_trait;
use flowbridge_core::domain::transformation::{ordered_active_mappings, MappingGroupConfig};
use flowbridge_core::xml::{select_first_value, set_value, XPath, XmlDocument, XmlElement};
use flowbridge_core::{
    CoreError, FieldMapping, FieldMappingRepository, FunctionRegistry, StepExecutor, StepOutcome,
    TemplateRepository, TransformationStep,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Root of a synthesized target document whose mappings do not agree on one
const FALLBACK_ROOT: &str = "mappedData";

/// FIELD_MAPPING executor.
///
/// XML payloads go through the hierarchical mapper: every mapping reads its
/// source(s) by XPath, optionally runs a function, and writes the result at
/// the target XPath of an output document built from the step's template (or
/// synthesized from the targets). JSON payloads use JMESPath sources and
/// dotted targets.
pub struct FieldMappingExecutor {
    mappings: Arc<dyn FieldMappingRepository>,
    functions: Arc<dyn FunctionRegistry>,
    templates: Option<Arc<dyn TemplateRepository>>,
}

impl FieldMappingExecutor {
    /// Create a new executor
    pub fn new(
        mappings: Arc<dyn FieldMappingRepository>,
        functions: Arc<dyn FunctionRegistry>,
    ) -> Self {
        Self {
            mappings,
            functions,
            templates: None,
        }
    }

    /// Builder: resolve `targetStructureId` through a template repository
    pub fn with_templates(mut self, templates: Arc<dyn TemplateRepository>) -> Self {
        self.templates = Some(templates);
        self
    }

    async fn target_template(&self, config: &MappingGroupConfig) -> Result<Option<String>, CoreError> {
        if let Some(template) = config.target_template.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(Some(template.to_string()));
        }
        match (&self.templates, config.target_structure_id.as_deref()) {
            (Some(templates), Some(id)) => templates.find_template(id).await,
            _ => Ok(None),
        }
    }

    /// Resolve the function attached to a mapping, inline body first
    async fn function_for(&self, mapping: &FieldMapping) -> Result<Option<Function>, CoreError> {
        if let Some(body) = mapping.function_body.as_deref().filter(|b| !b.trim().is_empty()) {
            return Ok(Some(Function::parse(body)));
        }
        let Some(name) = mapping.function_name.as_deref().filter(|n| !n.trim().is_empty()) else {
            return Ok(None);
        };
        let function = self.functions.find_function(name).await?.ok_or_else(|| {
            CoreError::TransformationConfigError(format!(
                "Mapping '{}' references unknown function '{}'",
                mapping.id, name
            ))
        })?;
        Ok(Some(Function::parse(&function.body)))
    }
}

/// A mapping with its function resolved, ready for the synchronous mapper
struct PreparedMapping<'a> {
    mapping: &'a FieldMapping,
    function: Option<Function>,
}

#[async_trait]
impl StepExecutor for FieldMappingExecutor {
    async fn apply(&self, step: &TransformationStep, input: &str) -> Result<StepOutcome, CoreError> {
        let rows = self.mappings.find_by_step(&step.id).await?;
        let ordered = ordered_active_mappings(&rows);
        if ordered.is_empty() {
            return Err(CoreError::TransformationConfigError(format!(
                "Step '{}' has no active field mappings",
                step.name
            )));
        }

        let config: MappingGroupConfig = if step.configuration.is_null() {
            MappingGroupConfig::default()
        } else {
            serde_json::from_value(step.configuration.clone()).map_err(|e| {
                CoreError::TransformationConfigError(format!("Invalid mapping configuration: {}", e))
            })?
        };

        let mut prepared = Vec::with_capacity(ordered.len());
        for mapping in ordered {
            prepared.push(PreparedMapping {
                mapping,
                function: self.function_for(mapping).await?,
            });
        }

        let output = match Message::parse(input)? {
            Message::Xml(source) => {
                let template = self.target_template(&config).await?;
                map_xml(&source, template.as_deref(), &prepared)?
            }
            Message::Json(source) => map_json(&source, &prepared)?,
        };
        debug!(step = %step.name, mappings = prepared.len(), "Applied field mappings");
        Ok(StepOutcome::Continue(output))
    }
}

fn map_xml(
    source: &XmlDocument,
    template: Option<&str>,
    mappings: &[PreparedMapping<'_>],
) -> Result<String, CoreError> {
    let mut target = match template {
        Some(xml) => XmlDocument::parse(xml)?,
        None => XmlDocument::new(XmlElement::new(synthesized_root(mappings))),
    };

    for prepared in mappings {
        let mapping = prepared.mapping;
        if mapping.is_array_mapping {
            let context_path = mapping.array_context_path.as_deref().unwrap_or_default();
            if context_path.trim().is_empty() {
                return Err(CoreError::TransformationConfigError(format!(
                    "Array mapping '{}' has no arrayContextPath",
                    mapping.id
                )));
            }
            let contexts = XPath::parse(context_path)?.select(source, None);
            for (index, context) in contexts.iter().enumerate() {
                let values = read_sources(source, Some(context.element_path()), mapping)?;
                if let Some(value) = mapped_value(values, prepared)? {
                    let field = mapping.target().replace("[*]", &format!("[{}]", index + 1));
                    let path = xml_target_path(&target, &field)?;
                    set_value(&mut target, &path, &value)?;
                }
            }
        } else {
            let values = read_sources(source, None, mapping)?;
            match mapped_value(values, prepared)? {
                Some(value) => {
                    let path = xml_target_path(&target, mapping.target())?;
                    set_value(&mut target, &path, &value)?;
                }
                None => debug!(mapping = %mapping.id, "Source resolved to nothing, mapping skipped"),
            }
        }
    }
    Ok(target.to_xml())
}

/// Common first segment of the absolute targets, else the fallback root
fn synthesized_root(mappings: &[PreparedMapping<'_>]) -> String {
    let mut roots = mappings.iter().filter_map(|p| {
        p.mapping
            .target()
            .strip_prefix('/')
            .and_then(|rest| rest.split('/').next())
            .map(|segment| segment.split('[').next().unwrap_or(segment))
    });
    match roots.next() {
        Some(first) if !first.is_empty() && roots.all(|other| other == first) => first.to_string(),
        _ => FALLBACK_ROOT.to_string(),
    }
}

/// Quoted source fields are literals
fn literal(field: &str) -> Option<&str> {
    let field = field.trim();
    ['\'', '"'].iter().find_map(|q| {
        field
            .strip_prefix(*q)
            .and_then(|rest| rest.strip_suffix(*q))
    })
}

fn read_sources(
    doc: &XmlDocument,
    context: Option<&[usize]>,
    mapping: &FieldMapping,
) -> Result<Vec<Option<String>>, CoreError> {
    mapping
        .sources()
        .into_iter()
        .map(|field| {
            if let Some(text) = literal(field) {
                return Ok(Some(text.to_string()));
            }
            let expr = match context {
                None if is_bare_name(field) => format!("//{}", field),
                _ => field.to_string(),
            };
            select_first_value(doc, context, &expr)
        })
        .collect()
}

/// Combine the resolved sources into the value written at the target.
/// `None` when no source resolved.
fn mapped_value(values: Vec<Option<String>>, prepared: &PreparedMapping<'_>) -> Result<Option<String>, CoreError> {
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    if let Some(function) = &prepared.function {
        let args: Vec<Value> = values
            .iter()
            .map(|v| v.as_deref().map(infer_scalar).unwrap_or(Value::Null))
            .collect();
        let result = function.call(&args, &Value::Null)?;
        return Ok(Some(stringify(&result)));
    }

    let present: Vec<String> = values.into_iter().flatten().collect();
    if prepared.mapping.mapping_rule.as_deref().map_or(false, |r| !r.trim().is_empty()) {
        Ok(Some(present.join(" ")))
    } else {
        Ok(present.into_iter().next())
    }
}

fn map_json(source: &Value, mappings: &[PreparedMapping<'_>]) -> Result<String, CoreError> {
    let mut target = Value::Object(Default::default());
    for prepared in mappings {
        let mapping = prepared.mapping;
        let mut values = Vec::new();
        for field in mapping.sources() {
            let value = match literal(field) {
                Some(text) => Value::String(text.to_string()),
                None => json_search(source, field)?,
            };
            values.push(value);
        }
        if values.iter().all(Value::is_null) {
            debug!(mapping = %mapping.id, "Source resolved to nothing, mapping skipped");
            continue;
        }

        let value = match &prepared.function {
            Some(function) => function.call(&values, source)?,
            None if mapping.mapping_rule.is_some() && values.len() > 1 => Value::String(
                values
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(stringify)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            None => values.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null),
        };
        set_json_path(&mut target, mapping.target(), value)?;
    }
    Ok(target.to_string())
}
