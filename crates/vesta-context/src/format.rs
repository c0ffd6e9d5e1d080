//! Result formatting - projections, verbalizations and data titles
//!
//! Raw dispatcher results are reshaped twice:
//! - the audit projection bounds what gets persisted into session history
//!   (ids and counts survive, bulk content and timestamps do not), and
//! - the prompt rendering gives the model a framed view of the full data.
//!
//! Data titles deliberately restate the resolved target name, the exact
//! time window, the query that would reproduce the result, and that the
//! reported count is exact even when zero. The model must never be left
//! room to guess that an empty result means "not fetched".

use serde_json::Value;

use vesta_core::{ExecutableCommand, Params};

use crate::temporal::TimeWindow;

/// Fields kept for created/updated entities.
const IDENTITY_FIELDS: &[&str] = &["id", "name"];

/// Fields kept for query results; bulk content is always dropped.
const QUERY_FIELDS: &[&str] = &["id", "name", "tool_type", "count", "min", "max", "mean"];

/// Project a raw result into the audit record persisted in history.
///
/// Returns `None` when nothing is worth keeping (deletes).
#[must_use]
pub fn project_data(command: &ExecutableCommand, data: &Params) -> Option<Params> {
    if command.is_action_command {
        project_action_data(&command.operation, data)
    } else {
        Some(project_query_data(command, data))
    }
}

fn project_action_data(operation: &str, data: &Params) -> Option<Params> {
    match operation {
        "delete" => None,
        "create" | "update" => {
            let mut kept = Params::new();
            for field in IDENTITY_FIELDS {
                if let Some(v) = data.get(*field) {
                    kept.insert((*field).to_string(), v.clone());
                }
            }
            Some(kept)
        }
        "batch_create" | "batch_update" | "batch_delete" => {
            let mut kept = Params::new();
            for (key, value) in data {
                if key == "count" || key.ends_with("_count") {
                    kept.insert(key.clone(), value.clone());
                }
            }
            Some(kept)
        }
        // Unknown mutating operation: keep identity fields only.
        _ => {
            let mut kept = Params::new();
            for field in IDENTITY_FIELDS {
                if let Some(v) = data.get(*field) {
                    kept.insert((*field).to_string(), v.clone());
                }
            }
            Some(kept)
        }
    }
}

fn project_query_data(command: &ExecutableCommand, data: &Params) -> Params {
    let mut kept = Params::new();
    if command.is_schema_fetch() {
        // Only the schema id survives: it is the sole field read back on
        // later turns to rebuild the deduplication cache.
        if let Some(id) = data.get("schema_id").or_else(|| command.params.get("schema_id")) {
            kept.insert("schema_id".into(), id.clone());
        }
        return kept;
    }
    for field in QUERY_FIELDS {
        if let Some(v) = data.get(*field) {
            kept.insert((*field).to_string(), v.clone());
        }
    }
    if !kept.contains_key("count") {
        if let Some(n) = entry_count(data) {
            kept.insert("count".into(), Value::from(n));
        }
    }
    kept
}

/// Verbalize a mutating action for history and the conversation view.
#[must_use]
pub fn verbalize_action(command: &ExecutableCommand, data: Option<&Params>) -> String {
    let noun = resource_noun(&command.resource);
    let name = display_name(command, data);
    match command.operation.as_str() {
        "create" => format!("Created {noun} '{name}'"),
        "update" => format!("Updated {noun} '{name}'"),
        "delete" => format!("Deleted {noun} '{name}'"),
        "batch_create" => format!(
            "Created {} {}",
            batch_count(data),
            resource_noun_plural(&command.resource)
        ),
        "batch_update" => format!(
            "Updated {} {}",
            batch_count(data),
            resource_noun_plural(&command.resource)
        ),
        "batch_delete" => format!(
            "Deleted {} {}",
            batch_count(data),
            resource_noun_plural(&command.resource)
        ),
        other => format!("Executed {other} on {noun} '{name}'"),
    }
}

/// Generate the prompt title for a query result.
#[must_use]
pub fn data_title(command: &ExecutableCommand, data: &Params) -> String {
    let name = display_name(command, Some(data));
    match command.command_id().as_str() {
        "schemas.get" => {
            let id = command.param_str("schema_id").unwrap_or("unknown");
            format!("Schema definition '{id}'")
        }
        "zones.get" => format!("Configuration of zone '{name}'"),
        "tools.get" => format!("Configuration of tool '{name}'"),
        "tool_data.get" => counted_title("Entries", command, data, &name),
        "tool_data.sample" => counted_title("Recent sample entries", command, data, &name),
        "executions.list" => counted_title("Executions", command, data, &name),
        "tool_data.stats" => format!(
            "Statistics for '{}' covering {} entries. {}",
            name,
            entry_count(data).unwrap_or(0),
            reproduce_clause(command)
        ),
        other => format!("Result of {other}"),
    }
}

/// Prompt-ready rendering of the full (unprojected) result data.
#[must_use]
pub fn format_prompt_body(data: &Params) -> String {
    serde_json::to_string_pretty(&Value::Object(data.clone()))
        .unwrap_or_else(|_| "{}".to_string())
}

fn counted_title(
    what: &str,
    command: &ExecutableCommand,
    data: &Params,
    name: &str,
) -> String {
    let count = entry_count(data).unwrap_or(0);
    let window = TimeWindow::from_params(&command.params).describe();
    format!(
        "{what} for '{name}' ({window}): {count} result(s). {reproduce} \
         The count is exact even when zero; do not re-issue this query.",
        reproduce = reproduce_clause(command)
    )
}

fn reproduce_clause(command: &ExecutableCommand) -> String {
    let params = serde_json::to_string(&Value::Object(command.params.clone()))
        .unwrap_or_else(|_| "{}".to_string());
    format!("Reproduce with: {} {}.", command.command_id(), params)
}

fn entry_count(data: &Params) -> Option<u64> {
    if let Some(n) = data.get("count").and_then(Value::as_u64) {
        return Some(n);
    }
    data.get("entries")
        .or_else(|| data.get("items"))
        .and_then(Value::as_array)
        .map(|a| a.len() as u64)
}

fn batch_count(data: Option<&Params>) -> u64 {
    let Some(data) = data else { return 0 };
    data.get("count")
        .and_then(Value::as_u64)
        .or_else(|| {
            data.iter()
                .find(|(k, _)| k.ends_with("_count"))
                .and_then(|(_, v)| v.as_u64())
        })
        .unwrap_or(0)
}

fn display_name(command: &ExecutableCommand, data: Option<&Params>) -> String {
    data.and_then(|d| d.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| command.param_str("name").map(str::to_string))
        .or_else(|| {
            data.and_then(|d| d.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| command.param_str("id").map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn resource_noun(resource: &str) -> &'static str {
    match resource {
        "zones" => "zone",
        "tools" => "tool",
        "tool_data" => "data entry",
        "executions" => "execution",
        "schemas" => "schema",
        _ => "resource",
    }
}

fn resource_noun_plural(resource: &str) -> &'static str {
    match resource {
        "zones" => "zones",
        "tools" => "tools",
        "tool_data" => "data entries",
        "executions" => "executions",
        "schemas" => "schemas",
        _ => "resources",
    }
}
