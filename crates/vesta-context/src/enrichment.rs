//! Enrichments - structured intents attached to a conversation turn
//!
//! An enrichment tells the pipeline what supporting data (or orientation)
//! the current turn needs. Enrichments are immutable value objects created
//! by the UI/AI layer; the pipeline reads them and never mutates them.
//!
//! The wire format is a tagged JSON object with camelCase configuration
//! keys, e.g.:
//!
//! ```json
//! {"type": "pointer", "selectedPath": "tools.T1", "selectionLevel": "INSTANCE",
//!  "selectedContext": "DATA", "selectedResources": ["data"], "importance": "essential"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::temporal::TimestampSelection;

/// Granularity of the entity a pointer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionLevel {
    /// A whole zone
    Zone,
    /// One tool instance inside a zone
    Instance,
    /// One field of a tool instance
    Field,
}

/// Which facet of the target the pointer is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceContext {
    /// Orientation only; no data fetch
    Generic,
    /// Configuration values
    Config,
    /// Recorded time-series entries
    Data,
    /// Execution records
    Executions,
}

/// How much the pointed-at data matters for the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// The turn cannot be answered without this data
    Essential,
    /// Helpful context worth fetching
    Relevant,
    /// Nice to have; never fetched proactively
    Optional,
}

impl Default for Importance {
    fn default() -> Self {
        Self::Relevant
    }
}

/// Sub-resources of a tool instance a pointer can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubResource {
    /// Instance configuration
    Config,
    /// Schema definitions for the selected context
    Schema,
    /// Full data entries (bounded by the time window)
    Data,
    /// A small recent sample of data entries
    Sample,
    /// Execution records
    Executions,
}

/// Pointer enrichment: "this entity (or part of it) is relevant".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEnrichment {
    /// Entity path, `zones.<id>` or `tools.<id>`
    pub selected_path: String,
    /// Target granularity
    pub selection_level: SelectionLevel,
    /// Facet of the target
    pub selected_context: ResourceContext,
    /// Selected sub-resources (instance level only)
    #[serde(default)]
    pub selected_resources: Vec<SubResource>,
    /// Fetch priority
    #[serde(default)]
    pub importance: Importance,
    /// Optional time filter for data/execution contexts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_selection: Option<TimestampSelection>,
}

/// Use enrichment: "the model is about to operate this tool instance".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseEnrichment {
    /// Target tool instance id
    pub tool_instance_id: String,
    /// Optional hint about the intended operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_hint: Option<String>,
}

/// Create enrichment: orientation for creating a new entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnrichment {
    /// Type of entity to create
    pub target_type: String,
    /// Container (zone) the entity should live in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_container: Option<String>,
    /// Suggested name for the new entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_name: Option<String>,
}

/// ModifyConfig enrichment: "the model will adjust this instance's config".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyConfigEnrichment {
    /// Target tool instance id
    pub tool_instance_id: String,
    /// Configuration aspect being adjusted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,
}

/// Organize enrichment: restructuring intent, not yet wired to data fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizeEnrichment {
    /// Zone the reorganization concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

/// Document enrichment: display-only note, lowest priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEnrichment {
    /// Free-form note content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Closed set of enrichment variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Enrichment {
    /// Points at an existing entity or part of it
    Pointer(PointerEnrichment),
    /// Announces use of a tool instance
    Use(UseEnrichment),
    /// Orientation for creating a new entity
    Create(CreateEnrichment),
    /// Announces a configuration change
    ModifyConfig(ModifyConfigEnrichment),
    /// Restructuring intent
    Organize(OrganizeEnrichment),
    /// Display-only note
    Document(DocumentEnrichment),
}

impl Enrichment {
    /// Short human label for the variant.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pointer(_) => "Pointer",
            Self::Use(_) => "Use",
            Self::Create(_) => "Create",
            Self::ModifyConfig(_) => "Modify configuration",
            Self::Organize(_) => "Organize",
            Self::Document(_) => "Document",
        }
    }

    /// Fetch priority; lower values are handled first.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            Self::Use(_) | Self::ModifyConfig(_) => 0,
            Self::Pointer(_) | Self::Create(_) | Self::Organize(_) => 1,
            Self::Document(_) => 2,
        }
    }

    /// True for variants that only render in the conversation view.
    #[must_use]
    pub fn is_display_only(&self) -> bool {
        matches!(self, Self::Document(_))
    }

    /// Machine schema describing the variant's configuration shape.
    #[must_use]
    pub fn config_schema(&self) -> Value {
        let timestamp_selection = json!({
            "type": "object",
            "properties": {
                "relativeStart": {"$ref": "#/definitions/relativeMarker"},
                "relativeEnd": {"$ref": "#/definitions/relativeMarker"},
                "minCustomDateTime": {"type": "integer"},
                "maxCustomDateTime": {"type": "integer"},
                "selectedPeriod": {
                    "type": "object",
                    "properties": {
                        "type": {"enum": ["DAY", "WEEK", "MONTH", "YEAR"]},
                        "reference": {"type": "integer"}
                    },
                    "required": ["type", "reference"]
                }
            }
        });

        match self {
            Self::Pointer(_) => json!({
                "type": "object",
                "properties": {
                    "selectedPath": {"type": "string"},
                    "selectionLevel": {"enum": ["ZONE", "INSTANCE", "FIELD"]},
                    "selectedContext": {"enum": ["GENERIC", "CONFIG", "DATA", "EXECUTIONS"]},
                    "selectedResources": {
                        "type": "array",
                        "items": {"enum": ["config", "schema", "data", "sample", "executions"]}
                    },
                    "importance": {"enum": ["essential", "relevant", "optional"]},
                    "timestampSelection": timestamp_selection
                },
                "required": ["selectedPath", "selectionLevel", "selectedContext"]
            }),
            Self::Use(_) => json!({
                "type": "object",
                "properties": {
                    "toolInstanceId": {"type": "string"},
                    "operationHint": {"type": "string"}
                },
                "required": ["toolInstanceId"]
            }),
            Self::Create(_) => json!({
                "type": "object",
                "properties": {
                    "targetType": {"type": "string"},
                    "targetContainer": {"type": "string"},
                    "suggestedName": {"type": "string"}
                },
                "required": ["targetType"]
            }),
            Self::ModifyConfig(_) => json!({
                "type": "object",
                "properties": {
                    "toolInstanceId": {"type": "string"},
                    "aspect": {"type": "string"}
                },
                "required": ["toolInstanceId"]
            }),
            Self::Organize(_) => json!({
                "type": "object",
                "properties": {
                    "zoneId": {"type": "string"}
                }
            }),
            Self::Document(_) => json!({
                "type": "object",
                "properties": {
                    "note": {"type": "string"}
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_wire_format() {
        let value = json!({
            "type": "pointer",
            "selectedPath": "tools.T1",
            "selectionLevel": "INSTANCE",
            "selectedContext": "DATA",
            "selectedResources": ["data"],
            "importance": "optional",
            "timestampSelection": {"minCustomDateTime": 1000, "maxCustomDateTime": 2000}
        });
        let enrichment: Enrichment = serde_json::from_value(value).unwrap();
        let Enrichment::Pointer(p) = &enrichment else {
            panic!("expected pointer");
        };
        assert_eq!(p.selected_path, "tools.T1");
        assert_eq!(p.selection_level, SelectionLevel::Instance);
        assert_eq!(p.selected_context, ResourceContext::Data);
        assert_eq!(p.selected_resources, vec![SubResource::Data]);
        assert_eq!(p.importance, Importance::Optional);
        assert_eq!(
            p.timestamp_selection.as_ref().unwrap().min_custom_date_time,
            Some(1000)
        );
    }

    #[test]
    fn test_importance_defaults_when_absent() {
        let value = json!({
            "type": "pointer",
            "selectedPath": "zones.Z1",
            "selectionLevel": "ZONE",
            "selectedContext": "CONFIG"
        });
        let enrichment: Enrichment = serde_json::from_value(value).unwrap();
        let Enrichment::Pointer(p) = enrichment else {
            panic!("expected pointer");
        };
        assert_eq!(p.importance, Importance::Relevant);
        assert!(p.selected_resources.is_empty());
    }

    #[test]
    fn test_labels_and_priorities() {
        let doc = Enrichment::Document(DocumentEnrichment::default());
        let useit = Enrichment::Use(UseEnrichment {
            tool_instance_id: "T1".into(),
            operation_hint: None,
        });
        assert_eq!(doc.label(), "Document");
        assert!(doc.is_display_only());
        assert!(doc.priority() > useit.priority());
        assert!(!useit.is_display_only());
    }

    #[test]
    fn test_every_variant_has_a_config_schema() {
        let variants = vec![
            Enrichment::Pointer(PointerEnrichment {
                selected_path: "zones.Z1".into(),
                selection_level: SelectionLevel::Zone,
                selected_context: ResourceContext::Config,
                selected_resources: vec![],
                importance: Importance::default(),
                timestamp_selection: None,
            }),
            Enrichment::Use(UseEnrichment {
                tool_instance_id: "T1".into(),
                operation_hint: None,
            }),
            Enrichment::Create(CreateEnrichment {
                target_type: "tracker".into(),
                target_container: None,
                suggested_name: None,
            }),
            Enrichment::ModifyConfig(ModifyConfigEnrichment {
                tool_instance_id: "T1".into(),
                aspect: None,
            }),
            Enrichment::Organize(OrganizeEnrichment::default()),
            Enrichment::Document(DocumentEnrichment::default()),
        ];
        for variant in variants {
            let schema = variant.config_schema();
            assert_eq!(schema["type"], "object", "{}", variant.label());
        }
    }
}
