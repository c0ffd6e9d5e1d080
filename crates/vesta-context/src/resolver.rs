//! Resolution engine - turns enrichments into executable commands
//!
//! Each enrichment either needs no supporting data (orientation-only
//! variants) or expands into an ordered list of fetch commands. The only
//! dispatch issued during resolution is a `tools.get` lookup to resolve the
//! schema ids of a tool instance; everything else happens later in the
//! executor.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use vesta_core::{Coordinator, Error, ExecutableCommand, Params, Result, SchemaKind};

use crate::enrichment::{
    Enrichment, Importance, PointerEnrichment, ResourceContext, SelectionLevel, SubResource,
};
use crate::temporal::{
    resolve_window, PeriodMath, TemporalMode, TimeWindow, TimestampSelection,
};

/// Schema ids of one tool instance, resolved through `tools.get`.
#[derive(Debug, Clone)]
struct ToolSchemaRefs {
    config_schema_id: String,
    data_schema_id: String,
    execution_schema_id: String,
}

/// Turns enrichments into zero or more executable commands.
pub struct ResolutionEngine {
    coordinator: Arc<dyn Coordinator>,
    period_math: Arc<dyn PeriodMath>,
}

impl ResolutionEngine {
    /// Create an engine dispatching lookups through the given coordinator.
    #[must_use]
    pub fn new(coordinator: Arc<dyn Coordinator>, period_math: Arc<dyn PeriodMath>) -> Self {
        Self {
            coordinator,
            period_math,
        }
    }

    /// Whether the enrichment needs a data fetch at all.
    ///
    /// Pointers are gated on a single importance flag plus the GENERIC
    /// exclusion; Use and ModifyConfig always fetch; the remaining variants
    /// are orientation- or display-only.
    #[must_use]
    pub fn should_generate_query(&self, enrichment: &Enrichment) -> bool {
        match enrichment {
            Enrichment::Pointer(p) => {
                p.importance != Importance::Optional
                    && p.selected_context != ResourceContext::Generic
            }
            Enrichment::Use(_) | Enrichment::ModifyConfig(_) => true,
            Enrichment::Create(_) | Enrichment::Organize(_) | Enrichment::Document(_) => false,
        }
    }

    /// Expand an enrichment into its ordered command list.
    ///
    /// `is_relative` selects the temporal resolution mode: automation
    /// contexts keep relative markers symbolic, interactive contexts resolve
    /// them against "now" immediately.
    #[instrument(skip(self, enrichment, cancel), fields(label = enrichment.label()))]
    pub async fn generate_commands(
        &self,
        enrichment: &Enrichment,
        is_relative: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExecutableCommand>> {
        if !self.should_generate_query(enrichment) {
            return Ok(Vec::new());
        }

        match enrichment {
            Enrichment::Pointer(p) => self.pointer_commands(p, is_relative, cancel).await,
            Enrichment::Use(u) => {
                let refs = self.resolve_schema_refs(&u.tool_instance_id, cancel).await?;
                Ok(vec![
                    ExecutableCommand::query("tools", "get").with_param("id", &*u.tool_instance_id),
                    schema_fetch(&refs.config_schema_id),
                    schema_fetch(&refs.data_schema_id),
                    ExecutableCommand::query("tool_data", "sample")
                        .with_param("id", &*u.tool_instance_id),
                    ExecutableCommand::query("tool_data", "stats")
                        .with_param("id", &*u.tool_instance_id),
                ])
            }
            Enrichment::ModifyConfig(m) => {
                let refs = self.resolve_schema_refs(&m.tool_instance_id, cancel).await?;
                // Schema first: the model should see the shape before the values.
                Ok(vec![
                    schema_fetch(&refs.config_schema_id),
                    ExecutableCommand::query("tools", "get").with_param("id", &*m.tool_instance_id),
                ])
            }
            Enrichment::Create(_) | Enrichment::Organize(_) | Enrichment::Document(_) => {
                Ok(Vec::new())
            }
        }
    }

    /// One-line summary of what the enrichment contributed to the turn.
    #[must_use]
    pub fn generate_summary(&self, enrichment: &Enrichment) -> String {
        match enrichment {
            Enrichment::Pointer(p) => {
                let facet = match p.selected_context {
                    ResourceContext::Generic => "reference to",
                    ResourceContext::Config => "configuration of",
                    ResourceContext::Data => "recorded data of",
                    ResourceContext::Executions => "executions of",
                };
                format!("Shared {} {}", facet, p.selected_path)
            }
            Enrichment::Use(u) => match &u.operation_hint {
                Some(hint) => format!("Preparing to use tool {} ({})", u.tool_instance_id, hint),
                None => format!("Preparing to use tool {}", u.tool_instance_id),
            },
            Enrichment::Create(c) => match &c.suggested_name {
                Some(name) => format!("Orienting to create a {} named '{}'", c.target_type, name),
                None => format!("Orienting to create a {}", c.target_type),
            },
            Enrichment::ModifyConfig(m) => {
                format!("Preparing to modify configuration of {}", m.tool_instance_id)
            }
            Enrichment::Organize(o) => match &o.zone_id {
                Some(zone) => format!("Reorganizing zone {zone}"),
                None => "Reorganizing zones".to_string(),
            },
            Enrichment::Document(_) => "Added a note".to_string(),
        }
    }

    async fn pointer_commands(
        &self,
        pointer: &PointerEnrichment,
        is_relative: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExecutableCommand>> {
        match pointer.selection_level {
            SelectionLevel::Zone => {
                if pointer.selected_context == ResourceContext::Config {
                    let zone_id = parse_entity_path(&pointer.selected_path, "zones")?;
                    Ok(vec![
                        ExecutableCommand::query("zones", "get").with_param("id", zone_id)
                    ])
                } else {
                    debug!(path = %pointer.selected_path, "zone-level pointer without config context");
                    Ok(Vec::new())
                }
            }
            SelectionLevel::Instance => self.instance_commands(pointer, is_relative, cancel).await,
            SelectionLevel::Field => {
                // Field-level selection is not wired to a fetch path yet.
                debug!(path = %pointer.selected_path, "field-level pointer ignored");
                Ok(Vec::new())
            }
        }
    }

    async fn instance_commands(
        &self,
        pointer: &PointerEnrichment,
        is_relative: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExecutableCommand>> {
        let instance_id = parse_entity_path(&pointer.selected_path, "tools")?;

        let wants = |r: SubResource| pointer.selected_resources.contains(&r);

        // Schema ids are only resolvable through the instance record; the
        // lookup is skipped entirely unless schemas were selected.
        let refs = if wants(SubResource::Schema) {
            Some(self.resolve_schema_refs(&instance_id, cancel).await?)
        } else {
            None
        };

        let window = self.resolve_pointer_window(pointer, is_relative)?;

        let mut commands = Vec::new();

        if wants(SubResource::Config) {
            commands.push(ExecutableCommand::query("tools", "get").with_param("id", &*instance_id));
        }

        if let Some(refs) = &refs {
            commands.push(schema_fetch(&refs.config_schema_id));
            match pointer.selected_context {
                ResourceContext::Data => commands.push(schema_fetch(&refs.data_schema_id)),
                ResourceContext::Executions => {
                    commands.push(schema_fetch(&refs.execution_schema_id));
                }
                ResourceContext::Generic | ResourceContext::Config => {}
            }
        }

        if pointer.selected_context == ResourceContext::Data {
            if wants(SubResource::Data) {
                let mut cmd =
                    ExecutableCommand::query("tool_data", "get").with_param("id", &*instance_id);
                window.apply(&mut cmd.params);
                commands.push(cmd);
            } else if wants(SubResource::Sample) {
                commands.push(
                    ExecutableCommand::query("tool_data", "sample")
                        .with_param("id", &*instance_id),
                );
            }
        }

        if pointer.selected_context == ResourceContext::Executions && wants(SubResource::Executions)
        {
            let mut cmd =
                ExecutableCommand::query("executions", "list").with_param("id", &*instance_id);
            window.apply(&mut cmd.params);
            commands.push(cmd);
        }

        Ok(commands)
    }

    fn resolve_pointer_window(
        &self,
        pointer: &PointerEnrichment,
        is_relative: bool,
    ) -> Result<TimeWindow> {
        let Some(selection) = &pointer.timestamp_selection else {
            return Ok(TimeWindow::default());
        };
        if !matches!(
            pointer.selected_context,
            ResourceContext::Data | ResourceContext::Executions
        ) {
            return Ok(TimeWindow::default());
        }
        let mode = if is_relative {
            TemporalMode::Relative
        } else {
            TemporalMode::Absolute
        };
        resolve_timestamp_selection(selection, mode, &*self.period_math)
    }

    /// Resolve a tool instance's schema ids.
    ///
    /// Failure here is a hard error for the enrichment: without the schema,
    /// the companion data commands are unreadable to the model.
    async fn resolve_schema_refs(
        &self,
        instance_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolSchemaRefs> {
        if cancel.is_cancelled() {
            return Err(Error::SchemaResolution(format!(
                "lookup for '{instance_id}' cancelled"
            )));
        }

        let mut params = Params::new();
        params.insert("id".into(), instance_id.into());
        let result = self
            .coordinator
            .process_command("tools.get", &params, cancel)
            .await;

        if !result.success {
            return Err(Error::SchemaResolution(format!(
                "tools.get failed for '{}': {}",
                instance_id,
                result.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        let data = result.data.unwrap_or_default();
        let explicit = |key: &str| {
            data.get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        let tool_type = explicit("tool_type");

        let derive = |kind: SchemaKind| tool_type.as_deref().map(|t| kind.id_for(t));
        let config_schema_id = explicit("config_schema_id").or_else(|| derive(SchemaKind::Config));
        let data_schema_id = explicit("data_schema_id").or_else(|| derive(SchemaKind::Data));
        let execution_schema_id =
            explicit("execution_schema_id").or_else(|| derive(SchemaKind::Execution));

        match (config_schema_id, data_schema_id, execution_schema_id) {
            (Some(config), Some(data), Some(execution)) => Ok(ToolSchemaRefs {
                config_schema_id: config,
                data_schema_id: data,
                execution_schema_id: execution,
            }),
            _ => Err(Error::SchemaResolution(format!(
                "instance '{instance_id}' carries no schema ids and no tool type"
            ))),
        }
    }
}

/// Resolve a timestamp selection with the engine's conventions.
pub(crate) fn resolve_timestamp_selection(
    selection: &TimestampSelection,
    mode: TemporalMode,
    math: &dyn PeriodMath,
) -> Result<TimeWindow> {
    resolve_window(selection, mode, Utc::now(), math)
        .map_err(|e| Error::Temporal(e.to_string()))
}

fn schema_fetch(schema_id: &str) -> ExecutableCommand {
    ExecutableCommand::query("schemas", "get").with_param("schema_id", schema_id)
}

/// Split an entity path (`zones.<id>` / `tools.<id>`) into its id.
fn parse_entity_path(path: &str, expected_kind: &str) -> Result<String> {
    match path.split_once('.') {
        Some((kind, id)) if kind == expected_kind && !id.is_empty() => Ok(id.to_string()),
        _ => Err(Error::InvalidCommand(format!(
            "entity path '{path}' is not of the form {expected_kind}.<id>"
        ))),
    }
}
