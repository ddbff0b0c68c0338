//! The tool layer: named operations the agent can invoke.
//!
//! Each tool exposes an OpenAI function-calling JSON Schema and performs
//! exactly one [`DiveStore`] operation. [`ToolRegistry::dispatch`] is the
//! single entry point used by the agent; it never fails. Unknown tools,
//! malformed arguments and store errors all come back as
//!
//! ```json
//! { "success": false, "error": { "code": "validation_error", "message": "..." } }
//! ```
//!
//! # Built-in tools
//!
//! | Tool | Store operation |
//! |------|-----------------|
//! | `search_dive_logs` | [`DiveStore::search`] |
//! | `get_all_dives` | [`DiveStore::get_all`] |
//! | `get_dive_log` | [`DiveStore::get`] |
//! | `create_dive_log` | [`DiveStore::create`] |
//! | `get_user_preference` | [`DiveStore::get_preference`] |
//! | `save_user_preference` | [`DiveStore::set_preference`] |

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::error::{DiveLogError, DiveResult};
use crate::models::{DiveSummary, NewDiveLog, SearchFilters, SearchRequest};
use crate::store::DiveStore;

/// A named operation the agent can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, as sent by the model.
    fn name(&self) -> &str;

    /// One-line description the model uses to pick a tool.
    fn description(&self) -> &str;

    /// OpenAI function-calling JSON Schema for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with parameters already checked by [`validate_params`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> DiveResult<Value>;
}

/// What a tool handler can reach.
#[derive(Clone)]
pub struct ToolContext {
    store: Arc<DiveStore>,
}

impl ToolContext {
    pub fn new(store: Arc<DiveStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DiveStore {
        &self.store
    }
}

/// Result of a dispatched tool call.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    /// JSON payload handed back to the model.
    pub payload: Value,
}

impl ToolOutcome {
    fn failure(err: &DiveLogError) -> Self {
        Self {
            success: false,
            payload: json!({
                "success": false,
                "error": { "code": err.code(), "message": err.to_string() }
            }),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> DiveResult<T> {
    serde_json::from_value(params)
        .map_err(|e| DiveLogError::validation(format!("invalid parameters: {}", e)))
}

// ============ search_dive_logs ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(flatten)]
    filters: SearchFilters,
    limit: Option<i64>,
}

pub struct SearchDiveLogsTool;

#[async_trait]
impl Tool for SearchDiveLogsTool {
    fn name(&self) -> &str {
        "search_dive_logs"
    }

    fn description(&self) -> &str {
        "Search the dive log by free text (sites, marine life, conditions, highlights) with optional location, dive type and depth filters. An empty query lists every dive matching the filters."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords to search for, e.g. 'manta ray' or 'wreck visibility'. Omit or leave empty to filter only.",
                    "default": ""
                },
                "location": {
                    "type": "string",
                    "description": "Country, area or dive site name, matched exactly (case-insensitive)"
                },
                "dive_type": {
                    "type": "string",
                    "description": "Dive type such as recreational, wreck, cave, decompression. Several may be comma-separated to match any."
                },
                "max_depth": { "type": "number", "description": "Only dives whose maximum depth is at most this many meters" },
                "min_depth": { "type": "number", "description": "Only dives whose maximum depth is at least this many meters" },
                "limit": { "type": "integer", "description": "Maximum number of results (1-100)" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> DiveResult<Value> {
        let params: SearchParams = parse_params(params)?;
        let request = SearchRequest {
            query: params.query,
            filters: params.filters,
            limit: params.limit,
        };
        let results = ctx.store().search(&request).await?;
        Ok(json!({
            "success": true,
            "count": results.len(),
            "results": results,
        }))
    }
}

// ============ get_all_dives ============

pub struct GetAllDivesTool;

#[async_trait]
impl Tool for GetAllDivesTool {
    fn name(&self) -> &str {
        "get_all_dives"
    }

    fn description(&self) -> &str {
        "Return every logged dive, most recent first, with a summary (total dives, total minutes, deepest dive, countries). Use for counts, totals and other aggregate questions."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> DiveResult<Value> {
        let dives = ctx.store().get_all().await?;
        let summary = DiveSummary::from_entries(&dives);
        Ok(json!({
            "success": true,
            "count": dives.len(),
            "results": dives,
            "summary": summary,
        }))
    }
}

// ============ get_dive_log ============

#[derive(Debug, Deserialize)]
struct GetParams {
    id: String,
}

pub struct GetDiveLogTool;

#[async_trait]
impl Tool for GetDiveLogTool {
    fn name(&self) -> &str {
        "get_dive_log"
    }

    fn description(&self) -> &str {
        "Fetch a single dive log entry by its id"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Dive log id as returned by search or list results" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> DiveResult<Value> {
        let params: GetParams = parse_params(params)?;
        let id = params.id.trim();
        if id.is_empty() {
            return Err(DiveLogError::validation("id must not be empty"));
        }
        match ctx.store().get(id).await? {
            Some(dive) => Ok(json!({ "success": true, "dive": dive })),
            None => Err(DiveLogError::NotFound(format!("no dive log with id {}", id))),
        }
    }
}

// ============ create_dive_log ============

pub struct CreateDiveLogTool;

#[async_trait]
impl Tool for CreateDiveLogTool {
    fn name(&self) -> &str {
        "create_dive_log"
    }

    fn description(&self) -> &str {
        "Record a new dive in the log. Depths are in meters and length in minutes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "site": { "type": "string", "description": "Dive site name" },
                "narrative": { "type": "string", "description": "Free-text description of the dive" },
                "depth_max": { "type": "number", "description": "Maximum depth in meters" },
                "length_minutes": { "type": "integer", "description": "Bottom time in minutes" },
                "dive_type": { "type": "string", "description": "recreational, wreck, cave, decompression, or a comma-separated combination" },
                "area": { "type": "string", "description": "Region or area, e.g. Red Sea" },
                "country": { "type": "string" },
                "depth_avg": { "type": "number", "description": "Average depth in meters, not above depth_max" },
                "highlights": { "type": "string", "description": "Notable sightings or moments" },
                "date": { "type": "string", "description": "YYYY-MM-DD" },
                "time": { "type": "string", "description": "HH:MM, 24-hour local time" },
                "equipment": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Equipment used"
                }
            },
            "required": ["site", "narrative", "depth_max", "length_minutes", "dive_type"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> DiveResult<Value> {
        let input: NewDiveLog = parse_params(params)?;
        let dive_id = ctx.store().create(input).await?;
        Ok(json!({ "success": true, "dive_id": dive_id }))
    }
}

// ============ preferences ============

#[derive(Debug, Deserialize)]
struct PreferenceKey {
    key: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceEntry {
    key: String,
    value: String,
}

pub struct GetUserPreferenceTool;

#[async_trait]
impl Tool for GetUserPreferenceTool {
    fn name(&self) -> &str {
        "get_user_preference"
    }

    fn description(&self) -> &str {
        "Read a stored user preference such as depth_unit. Unset keys report is_set = false."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "Preference name, e.g. depth_unit" }
            },
            "required": ["key"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> DiveResult<Value> {
        let params: PreferenceKey = parse_params(params)?;
        let value = ctx.store().get_preference(&params.key).await?;
        Ok(json!({
            "success": true,
            "key": params.key.trim(),
            "is_set": value.is_some(),
            "value": value,
        }))
    }
}

pub struct SaveUserPreferenceTool;

#[async_trait]
impl Tool for SaveUserPreferenceTool {
    fn name(&self) -> &str {
        "save_user_preference"
    }

    fn description(&self) -> &str {
        "Store a user preference (for example depth_unit = feet). Overwrites any previous value."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "Preference name" },
                "value": { "type": "string", "description": "Preference value" }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> DiveResult<Value> {
        let params: PreferenceEntry = parse_params(params)?;
        ctx.store()
            .set_preference(&params.key, &params.value)
            .await?;
        Ok(json!({
            "success": true,
            "key": params.key.trim(),
            "value": params.value,
        }))
    }
}

// ============ Registry ============

/// Ordered set of tools exposed to the model.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding the six built-in dive log tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchDiveLogsTool));
        registry.register(Box::new(GetAllDivesTool));
        registry.register(Box::new(GetDiveLogTool));
        registry.register(Box::new(CreateDiveLogTool));
        registry.register(Box::new(GetUserPreferenceTool));
        registry.register(Box::new(SaveUserPreferenceTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Tool definitions in the chat-completions `tools` format.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    /// Run the named tool with a raw JSON arguments string.
    ///
    /// Never fails: every error becomes a structured failure payload.
    pub async fn dispatch(&self, name: &str, arguments: &str, ctx: &ToolContext) -> ToolOutcome {
        match self.try_dispatch(name, arguments, ctx).await {
            Ok(payload) => ToolOutcome {
                success: true,
                payload,
            },
            Err(err) => {
                tracing::debug!(tool = name, code = err.code(), error = %err, "tool call failed");
                ToolOutcome::failure(&err)
            }
        }
    }

    async fn try_dispatch(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
    ) -> DiveResult<Value> {
        let tool = self
            .find(name)
            .ok_or_else(|| DiveLogError::validation(format!("unknown tool: {}", name)))?;

        let raw: Value = if arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(arguments).map_err(|e| {
                DiveLogError::validation(format!("arguments are not valid JSON: {}", e))
            })?
        };

        let params = validate_params(&tool.parameters_schema(), &raw)?;
        tool.execute(params, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Parameter validation ============

/// Validate parameters against a tool's schema.
///
/// Checks that `params` is an object, that required fields are present,
/// and that values match their declared JSON types and enums. Explicit
/// `null` on an optional field counts as absent. Defaults are injected for
/// missing optional fields.
pub fn validate_params(schema: &Value, params: &Value) -> DiveResult<Value> {
    let params_obj = params
        .as_object()
        .ok_or_else(|| {
            DiveLogError::validation(format!(
                "arguments must be a JSON object, got {}",
                json_type_name(params)
            ))
        })?
        .clone();

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<String> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    for req_field in &required {
        if params_obj.get(req_field).map_or(true, Value::is_null) {
            return Err(DiveLogError::validation(format!(
                "missing required parameter: {}",
                req_field
            )));
        }
    }

    let mut result = Map::new();

    for (prop_name, prop_schema) in &properties {
        match params_obj.get(prop_name).filter(|v| !v.is_null()) {
            Some(value) => {
                if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
                    let type_ok = match expected_type {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "array" => value.is_array(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !type_ok {
                        return Err(DiveLogError::validation(format!(
                            "parameter '{}' must be of type '{}', got {}",
                            prop_name,
                            expected_type,
                            json_type_name(value)
                        )));
                    }
                }

                if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                    if !enum_values.contains(value) {
                        let allowed: Vec<String> =
                            enum_values.iter().map(|v| v.to_string()).collect();
                        return Err(DiveLogError::validation(format!(
                            "parameter '{}' must be one of [{}], got {}",
                            prop_name,
                            allowed.join(", "),
                            value
                        )));
                    }
                }

                result.insert(prop_name.clone(), value.clone());
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    result.insert(prop_name.clone(), default.clone());
                }
            }
        }
    }

    // unknown keys are dropped
    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
