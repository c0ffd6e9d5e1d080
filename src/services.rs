//! In-memory entity services
//!
//! Black-box CRUD stand-ins for the persistent stores the pipeline talks
//! to through the coordinator: zones, tool instances, time-series entries,
//! executions and schema definitions. Used by the demo binary and the
//! integration tests; a deployment would register its own service
//! implementations instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vesta_core::{
    OperationResult, Params, ResourceService, Schema, SchemaKind, SchemaProvider, SchemaRegistry,
};

fn require_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, OperationResult> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| OperationResult::fail(format!("missing required parameter '{key}'")))
}

fn entry_timestamp(entry: &Params) -> i64 {
    entry
        .get("timestamp")
        .and_then(Value::as_i64)
        .unwrap_or_default()
}

fn within_window(params: &Params, timestamp: i64) -> bool {
    // Symbolic (string-encoded) bounds are resolved upstream; here only
    // numeric bounds filter.
    let start = params.get("start_time").and_then(Value::as_i64);
    let end = params.get("end_time").and_then(Value::as_i64);
    start.is_none_or(|s| timestamp >= s) && end.is_none_or(|e| timestamp <= e)
}

/// Zones: named containers for tool instances.
#[derive(Default)]
pub struct ZoneService {
    zones: RwLock<HashMap<String, Params>>,
}

impl ZoneService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceService for ZoneService {
    fn resource(&self) -> &str {
        "zones"
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Params,
        _cancel: &CancellationToken,
    ) -> OperationResult {
        match operation {
            "get" => {
                let id = match require_str(params, "id") {
                    Ok(id) => id,
                    Err(fail) => return fail,
                };
                match self.zones.read().await.get(id) {
                    Some(zone) => OperationResult::ok(zone.clone()),
                    None => OperationResult::fail(format!("zone '{id}' not found")),
                }
            }
            "create" => {
                let name = match require_str(params, "name") {
                    Ok(name) => name.to_string(),
                    Err(fail) => return fail,
                };
                let id = params
                    .get("id")
                    .and_then(Value::as_str)
                    .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
                let mut zone = Params::new();
                zone.insert("id".into(), json!(id));
                zone.insert("name".into(), json!(name));
                if let Some(config) = params.get("config") {
                    zone.insert("config".into(), config.clone());
                }
                zone.insert("created_at".into(), json!(Utc::now().timestamp_millis()));
                self.zones.write().await.insert(id, zone.clone());
                OperationResult::ok(zone)
            }
            "update" => {
                let id = match require_str(params, "id") {
                    Ok(id) => id,
                    Err(fail) => return fail,
                };
                let mut zones = self.zones.write().await;
                let Some(zone) = zones.get_mut(id) else {
                    return OperationResult::fail(format!("zone '{id}' not found"));
                };
                for (key, value) in params {
                    if key != "id" {
                        zone.insert(key.clone(), value.clone());
                    }
                }
                OperationResult::ok(zone.clone())
            }
            "delete" => {
                let id = match require_str(params, "id") {
                    Ok(id) => id,
                    Err(fail) => return fail,
                };
                match self.zones.write().await.remove(id) {
                    Some(zone) => OperationResult::ok(zone),
                    None => OperationResult::fail(format!("zone '{id}' not found")),
                }
            }
            other => OperationResult::fail(format!("unknown operation '{other}'")),
        }
    }
}

/// Tool instances: configured tools living inside zones.
#[derive(Default)]
pub struct ToolService {
    tools: RwLock<HashMap<String, Params>>,
}

impl ToolService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved display name of an instance, for sibling services.
    pub async fn name_of(&self, id: &str) -> Option<String> {
        self.tools
            .read()
            .await
            .get(id)
            .and_then(|t| t.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[async_trait]
impl ResourceService for ToolService {
    fn resource(&self) -> &str {
        "tools"
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Params,
        _cancel: &CancellationToken,
    ) -> OperationResult {
        match operation {
            "get" => {
                let id = match require_str(params, "id") {
                    Ok(id) => id,
                    Err(fail) => return fail,
                };
                let tools = self.tools.read().await;
                let Some(tool) = tools.get(id) else {
                    return OperationResult::fail(format!("tool instance '{id}' not found"));
                };
                let mut data = tool.clone();
                // Schema ids derive from the tool type unless set explicitly.
                if let Some(tool_type) = tool.get("tool_type").and_then(Value::as_str) {
                    for kind in [SchemaKind::Config, SchemaKind::Data, SchemaKind::Execution] {
                        let key = format!("{}_schema_id", kind.as_str());
                        data.entry(key).or_insert_with(|| json!(kind.id_for(tool_type)));
                    }
                }
                OperationResult::ok(data)
            }
            "create" => {
                let name = match require_str(params, "name") {
                    Ok(name) => name.to_string(),
                    Err(fail) => return fail,
                };
                let id = params
                    .get("id")
                    .and_then(Value::as_str)
                    .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
                let mut tool = Params::new();
                tool.insert("id".into(), json!(id));
                tool.insert("name".into(), json!(name));
                for key in ["tool_type", "zone_id", "config"] {
                    if let Some(value) = params.get(key) {
                        tool.insert(key.into(), value.clone());
                    }
                }
                tool.insert("created_at".into(), json!(Utc::now().timestamp_millis()));
                self.tools.write().await.insert(id, tool.clone());
                OperationResult::ok(tool)
            }
            "update" => {
                let id = match require_str(params, "id") {
                    Ok(id) => id,
                    Err(fail) => return fail,
                };
                let mut tools = self.tools.write().await;
                let Some(tool) = tools.get_mut(id) else {
                    return OperationResult::fail(format!("tool instance '{id}' not found"));
                };
                for (key, value) in params {
                    if key != "id" {
                        tool.insert(key.clone(), value.clone());
                    }
                }
                OperationResult::ok(tool.clone())
            }
            "delete" => {
                let id = match require_str(params, "id") {
                    Ok(id) => id,
                    Err(fail) => return fail,
                };
                match self.tools.write().await.remove(id) {
                    Some(tool) => OperationResult::ok(tool),
                    None => OperationResult::fail(format!("tool instance '{id}' not found")),
                }
            }
            other => OperationResult::fail(format!("unknown operation '{other}'")),
        }
    }
}

/// Time-series entries recorded by tool instances.
pub struct ToolDataService {
    tools: Arc<ToolService>,
    entries: RwLock<HashMap<String, Vec<Params>>>,
    sample_size: usize,
}

impl ToolDataService {
    /// Create a service resolving display names through `tools`.
    #[must_use]
    pub fn new(tools: Arc<ToolService>, sample_size: usize) -> Self {
        Self {
            tools,
            entries: RwLock::new(HashMap::new()),
            sample_size,
        }
    }

    async fn base_data(&self, tool_id: &str) -> Params {
        let mut data = Params::new();
        data.insert("id".into(), json!(tool_id));
        if let Some(name) = self.tools.name_of(tool_id).await {
            data.insert("name".into(), json!(name));
        }
        data
    }
}

#[async_trait]
impl ResourceService for ToolDataService {
    fn resource(&self) -> &str {
        "tool_data"
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Params,
        _cancel: &CancellationToken,
    ) -> OperationResult {
        let tool_id = match require_str(params, "id") {
            Ok(id) => id.to_string(),
            Err(fail) => return fail,
        };

        match operation {
            "get" => {
                let entries = self.entries.read().await;
                let matching: Vec<Value> = entries
                    .get(&tool_id)
                    .map(|list| {
                        list.iter()
                            .filter(|e| within_window(params, entry_timestamp(e)))
                            .map(|e| Value::Object(e.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                let mut data = self.base_data(&tool_id).await;
                data.insert("count".into(), json!(matching.len()));
                data.insert("entries".into(), Value::Array(matching));
                OperationResult::ok(data)
            }
            "sample" => {
                let limit = params
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map_or(self.sample_size, |l| l as usize);
                let entries = self.entries.read().await;
                let sample: Vec<Value> = entries
                    .get(&tool_id)
                    .map(|list| {
                        list.iter()
                            .rev()
                            .take(limit)
                            .map(|e| Value::Object(e.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                let mut data = self.base_data(&tool_id).await;
                data.insert("count".into(), json!(sample.len()));
                data.insert("entries".into(), Value::Array(sample));
                OperationResult::ok(data)
            }
            "stats" => {
                let entries = self.entries.read().await;
                let values: Vec<f64> = entries
                    .get(&tool_id)
                    .map(|list| {
                        list.iter()
                            .filter_map(|e| e.get("value").and_then(Value::as_f64))
                            .collect()
                    })
                    .unwrap_or_default();
                let mut data = self.base_data(&tool_id).await;
                data.insert("count".into(), json!(values.len()));
                if !values.is_empty() {
                    let sum: f64 = values.iter().sum();
                    data.insert(
                        "min".into(),
                        json!(values.iter().cloned().fold(f64::INFINITY, f64::min)),
                    );
                    data.insert(
                        "max".into(),
                        json!(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
                    );
                    data.insert("mean".into(), json!(sum / values.len() as f64));
                }
                OperationResult::ok(data)
            }
            "create" => {
                let Some(payload) = params.get("data").and_then(Value::as_object) else {
                    return OperationResult::fail("missing required parameter 'data'");
                };
                let mut entry = payload.clone();
                let entry_id = Uuid::new_v4().to_string();
                entry.insert("entry_id".into(), json!(entry_id));
                entry
                    .entry("timestamp".to_string())
                    .or_insert_with(|| json!(Utc::now().timestamp_millis()));
                self.entries
                    .write()
                    .await
                    .entry(tool_id.clone())
                    .or_default()
                    .push(entry);

                let mut data = self.base_data(&tool_id).await;
                data.insert("id".into(), json!(entry_id));
                data.insert("created_at".into(), json!(Utc::now().timestamp_millis()));
                OperationResult::ok(data)
            }
            "update" => {
                let entry_id = match require_str(params, "entry_id") {
                    Ok(id) => id.to_string(),
                    Err(fail) => return fail,
                };
                let Some(payload) = params.get("data").and_then(Value::as_object) else {
                    return OperationResult::fail("missing required parameter 'data'");
                };
                let mut entries = self.entries.write().await;
                let Some(list) = entries.get_mut(&tool_id) else {
                    return OperationResult::fail(format!("no entries for tool '{tool_id}'"));
                };
                let Some(entry) = list
                    .iter_mut()
                    .find(|e| e.get("entry_id").and_then(Value::as_str) == Some(&entry_id))
                else {
                    return OperationResult::fail(format!("entry '{entry_id}' not found"));
                };
                for (key, value) in payload {
                    if key != "entry_id" {
                        entry.insert(key.clone(), value.clone());
                    }
                }
                let mut data = Params::new();
                data.insert("id".into(), json!(entry_id));
                OperationResult::ok(data)
            }
            "delete" => {
                let entry_id = match require_str(params, "entry_id") {
                    Ok(id) => id.to_string(),
                    Err(fail) => return fail,
                };
                let mut entries = self.entries.write().await;
                let Some(list) = entries.get_mut(&tool_id) else {
                    return OperationResult::fail(format!("no entries for tool '{tool_id}'"));
                };
                let before = list.len();
                list.retain(|e| e.get("entry_id").and_then(Value::as_str) != Some(&entry_id));
                if list.len() == before {
                    return OperationResult::fail(format!("entry '{entry_id}' not found"));
                }
                let mut data = Params::new();
                data.insert("id".into(), json!(entry_id));
                OperationResult::ok(data)
            }
            "batch_create" => {
                let Some(batch) = params.get("entries").and_then(Value::as_array) else {
                    return OperationResult::fail("missing required parameter 'entries'");
                };
                let mut created = 0u64;
                let mut entries = self.entries.write().await;
                let list = entries.entry(tool_id.clone()).or_default();
                for item in batch {
                    let Some(payload) = item.as_object() else { continue };
                    let mut entry = payload.clone();
                    entry.insert("entry_id".into(), json!(Uuid::new_v4().to_string()));
                    entry
                        .entry("timestamp".to_string())
                        .or_insert_with(|| json!(Utc::now().timestamp_millis()));
                    list.push(entry);
                    created += 1;
                }
                let mut data = Params::new();
                data.insert("created_count".into(), json!(created));
                OperationResult::ok(data)
            }
            other => OperationResult::fail(format!("unknown operation '{other}'")),
        }
    }
}

/// Execution records of tool instances.
pub struct ExecutionService {
    tools: Arc<ToolService>,
    executions: RwLock<HashMap<String, Vec<Params>>>,
}

impl ExecutionService {
    /// Create a service resolving display names through `tools`.
    #[must_use]
    pub fn new(tools: Arc<ToolService>) -> Self {
        Self {
            tools,
            executions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ResourceService for ExecutionService {
    fn resource(&self) -> &str {
        "executions"
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Params,
        _cancel: &CancellationToken,
    ) -> OperationResult {
        let tool_id = match require_str(params, "id") {
            Ok(id) => id.to_string(),
            Err(fail) => return fail,
        };
        match operation {
            "list" => {
                let executions = self.executions.read().await;
                let matching: Vec<Value> = executions
                    .get(&tool_id)
                    .map(|list| {
                        list.iter()
                            .filter(|e| within_window(params, entry_timestamp(e)))
                            .map(|e| Value::Object(e.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                let mut data = Params::new();
                data.insert("id".into(), json!(tool_id));
                if let Some(name) = self.tools.name_of(&tool_id).await {
                    data.insert("name".into(), json!(name));
                }
                data.insert("count".into(), json!(matching.len()));
                data.insert("entries".into(), Value::Array(matching));
                OperationResult::ok(data)
            }
            "record" => {
                let mut record = Params::new();
                record.insert("execution_id".into(), json!(Uuid::new_v4().to_string()));
                record.insert("timestamp".into(), json!(Utc::now().timestamp_millis()));
                if let Some(status) = params.get("status") {
                    record.insert("status".into(), status.clone());
                }
                self.executions
                    .write()
                    .await
                    .entry(tool_id)
                    .or_default()
                    .push(record.clone());
                OperationResult::ok(record)
            }
            other => OperationResult::fail(format!("unknown operation '{other}'")),
        }
    }
}

/// Static provider for the fixed system schemas.
pub struct SystemSchemaProvider {
    schemas: HashMap<String, Schema>,
}

impl SystemSchemaProvider {
    /// Provider carrying the built-in `zone_config` schema.
    #[must_use]
    pub fn builtin() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(
            "zone_config".to_string(),
            Schema {
                id: "zone_config".to_string(),
                name: "Zone configuration".to_string(),
                content: json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "icon": {"type": "string"},
                        "color": {"type": "string"}
                    },
                    "required": ["name"]
                }),
            },
        );
        Self { schemas }
    }
}

#[async_trait]
impl SchemaProvider for SystemSchemaProvider {
    fn provides(&self, schema_id: &str) -> bool {
        self.schemas.contains_key(schema_id)
    }

    async fn get(&self, schema_id: &str) -> Option<Schema> {
        self.schemas.get(schema_id).cloned()
    }
}

/// Discovery fallback synthesizing a generic schema from the id convention.
pub struct ToolTypeDiscoveryProvider;

#[async_trait]
impl SchemaProvider for ToolTypeDiscoveryProvider {
    fn provides(&self, schema_id: &str) -> bool {
        schema_id.contains('_')
    }

    async fn get(&self, schema_id: &str) -> Option<Schema> {
        let (domain, kind) = schema_id.rsplit_once('_')?;
        if !matches!(kind, "config" | "data" | "execution") {
            return None;
        }
        Some(Schema {
            id: schema_id.to_string(),
            name: format!("{domain} {kind}"),
            content: json!({
                "type": "object",
                "properties": {
                    "value": {"type": "number"},
                    "timestamp": {"type": "integer"}
                }
            }),
        })
    }
}

/// Schema definitions resolved through the registry chain.
pub struct SchemasService {
    registry: SchemaRegistry,
}

impl SchemasService {
    /// Create a service over the given registry.
    #[must_use]
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Registry with the system providers and the discovery fallback.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            SchemaRegistry::new()
                .with_provider(Arc::new(SystemSchemaProvider::builtin()))
                .with_discovery(Arc::new(ToolTypeDiscoveryProvider)),
        )
    }
}

#[async_trait]
impl ResourceService for SchemasService {
    fn resource(&self) -> &str {
        "schemas"
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Params,
        _cancel: &CancellationToken,
    ) -> OperationResult {
        if operation != "get" {
            return OperationResult::fail(format!("unknown operation '{operation}'"));
        }
        let schema_id = match require_str(params, "schema_id") {
            Ok(id) => id,
            Err(fail) => return fail,
        };
        match self.registry.resolve(schema_id).await {
            Some(schema) => {
                let mut data = Params::new();
                data.insert("schema_id".into(), json!(schema.id));
                data.insert("name".into(), json!(schema.name));
                data.insert("content".into(), schema.content);
                OperationResult::ok(data)
            }
            None => OperationResult::fail(format!("unknown schema '{schema_id}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tool_get_derives_schema_ids() {
        let tools = ToolService::new();
        let cancel = CancellationToken::new();
        let mut params = Params::new();
        params.insert("name".into(), json!("Sleep Tracker"));
        params.insert("tool_type".into(), json!("tracker"));
        let created = tools.execute("create", &params, &cancel).await;
        let id = created.data.unwrap()["id"].as_str().unwrap().to_string();

        let mut get = Params::new();
        get.insert("id".into(), json!(id));
        let fetched = tools.execute("get", &get, &cancel).await;
        let data = fetched.data.unwrap();
        assert_eq!(data["config_schema_id"], json!("tracker_config"));
        assert_eq!(data["data_schema_id"], json!("tracker_data"));
        assert_eq!(data["execution_schema_id"], json!("tracker_execution"));
    }

    #[tokio::test]
    async fn test_tool_data_window_filter() {
        let tools = Arc::new(ToolService::new());
        let data_service = ToolDataService::new(Arc::clone(&tools), 5);
        let cancel = CancellationToken::new();

        for ts in [500i64, 1500, 2500] {
            let mut params = Params::new();
            params.insert("id".into(), json!("T1"));
            params.insert("data".into(), json!({"value": 7.0, "timestamp": ts}));
            assert!(data_service.execute("create", &params, &cancel).await.success);
        }

        let mut query = Params::new();
        query.insert("id".into(), json!("T1"));
        query.insert("start_time".into(), json!(1000));
        query.insert("end_time".into(), json!(2000));
        let result = data_service.execute("get", &query, &cancel).await;
        assert_eq!(result.data.unwrap()["count"], json!(1));
    }

    #[tokio::test]
    async fn test_schema_service_resolution_chain() {
        let service = SchemasService::with_defaults();
        let cancel = CancellationToken::new();

        let mut params = Params::new();
        params.insert("schema_id".into(), json!("zone_config"));
        let system = service.execute("get", &params, &cancel).await;
        assert_eq!(system.data.unwrap()["name"], json!("Zone configuration"));

        params.insert("schema_id".into(), json!("tracker_data"));
        let discovered = service.execute("get", &params, &cancel).await;
        assert!(discovered.success);
        assert_eq!(discovered.data.unwrap()["name"], json!("tracker data"));

        params.insert("schema_id".into(), json!("nonsense"));
        let missing = service.execute("get", &params, &cancel).await;
        assert!(!missing.success);
    }
}
