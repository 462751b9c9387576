//! Tool definitions and the registry that executes them.
//!
//! Tools are the sole extension point by which host functionality (e.g.
//! "look up a stored vocabulary entry") becomes callable by a model. A
//! [`ToolDefinition`] couples a name, a parameter schema, and an async
//! handler; the [`ToolRegistry`] advertises schemas to adapters and turns
//! model-issued tool calls into [`ContentBlock::ToolResult`] blocks.
//!
//! Execution failures are data, not control flow: an unknown tool, a
//! mistyped argument, or a handler error all come back as a result block
//! with `is_error` set, so the model can see the failure and recover
//! conversationally.
//!
//! # Example
//!
//! ```rust
//! use polyllm::tool_registry::{ToolDefinition, ToolParameter, ToolParameterType, ToolRegistry};
//! use std::sync::Arc;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(
//!     ToolDefinition::new("get_current_time", "Current date and time.")
//!         .with_handler(Arc::new(|_args| {
//!             Box::pin(async { Ok(serde_json::json!("2026-08-28 12:00:00")) })
//!         })),
//! ).unwrap();
//!
//! assert_eq!(registry.schemas_for(None).count(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::polyllm::error::ToolRegistryError;
use crate::polyllm::message::ContentBlock;

/// Type alias for the asynchronous functions backing tools.
///
/// The handler receives the validated argument object and returns the tool's
/// JSON result, or an error that the registry folds into an `is_error`
/// result block.
pub type ToolHandler = Arc<
    dyn Fn(
            JsonValue,
        ) -> Pin<
            Box<dyn Future<Output = Result<JsonValue, Box<dyn Error + Send + Sync>>> + Send>,
        > + Send
        + Sync,
>;

/// Declared type of a tool parameter, mirrored into JSON-schema `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ToolParameterType {
    fn json_name(self) -> &'static str {
        match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
        }
    }

    fn matches(self, value: &JsonValue) -> bool {
        match self {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Integer => value.is_i64() || value.is_u64(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => value.is_array(),
            ToolParameterType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ToolParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_name())
    }
}

/// Declares one parameter of a tool.
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
}

impl ToolParameter {
    /// Define a new tool parameter with the provided name and type.
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
        }
    }

    /// Add a human readable description that will surface in generated schemas.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the argument as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A host capability callable by the model.
///
/// Immutable once registered; the registry rejects duplicate names. Tags
/// scope which tools are advertised on a given call — untagged tools are
/// always included.
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
    pub tags: HashSet<String>,
    handler: Option<ToolHandler>,
}

impl ToolDefinition {
    /// Create a definition with the supplied identifier and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            tags: HashSet::new(),
            handler: None,
        }
    }

    /// Append a parameter declaration.
    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Add a tag used for per-call tool selection.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Attach the async handler executed on invocation.
    pub fn with_handler(mut self, handler: ToolHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Render the parameter declarations as a JSON-schema object, the shape
    /// every provider's function-declaration format embeds.
    pub fn parameters_schema(&self) -> JsonValue {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.param_type.json_name(),
                    "description": param.description.clone().unwrap_or_default(),
                }),
            );
            if param.required {
                required.push(JsonValue::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// The wire-facing descriptor advertised to providers.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters_schema: self.parameters_schema(),
        }
    }

    /// Check the supplied arguments against the declared parameters.
    ///
    /// Rejects unknown fields, missing required fields, and type mismatches.
    fn validate_arguments(
        &self,
        arguments: &serde_json::Map<String, JsonValue>,
    ) -> Result<(), String> {
        for key in arguments.keys() {
            if !self.parameters.iter().any(|p| &p.name == key) {
                return Err(format!("unknown argument '{}'", key));
            }
        }
        for param in &self.parameters {
            match arguments.get(&param.name) {
                Some(value) => {
                    if !param.param_type.matches(value) {
                        return Err(format!(
                            "argument '{}' expected type {}, got {}",
                            param.name,
                            param.param_type,
                            json_type_name(value)
                        ));
                    }
                }
                None => {
                    if param.required {
                        return Err(format!("missing required argument '{}'", param.name));
                    }
                }
            }
        }
        Ok(())
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Provider-facing descriptor of one tool: everything an adapter needs to
/// build its native function declaration, nothing it doesn't (no handler).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: JsonValue,
}

/// Registry of callable tools.
///
/// Registration happens once during process initialization; afterwards the
/// registry is read-only and safe to share across sessions without
/// synchronization (the router holds it in an `Arc`).
#[derive(Default)]
pub struct ToolRegistry {
    /// Definitions in registration order — `schemas_for` iteration is stable
    /// so the advertised tool list is reproducible across calls.
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool definition.
    ///
    /// Fails with [`ToolRegistryError::DuplicateTool`] when the name is
    /// already taken. Must not be called concurrently with `invoke`; the
    /// intended pattern is registration at startup, invocation afterwards.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), ToolRegistryError> {
        if self.index.contains_key(&definition.name) {
            return Err(ToolRegistryError::DuplicateTool(definition.name));
        }
        log::info!("registered tool '{}'", definition.name);
        self.index
            .insert(definition.name.clone(), self.tools.len());
        self.tools.push(definition);
        Ok(())
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Borrow a definition by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Iterate the wire descriptors of tools enabled for the given tags, in
    /// registration order.
    ///
    /// Untagged tools are always included. `tags = None` yields only the
    /// untagged set; to advertise everything use [`schemas_for_all`].
    ///
    /// [`schemas_for_all`]: ToolRegistry::schemas_for_all
    pub fn schemas_for<'a>(
        &'a self,
        tags: Option<&'a [String]>,
    ) -> impl Iterator<Item = ToolSpec> + 'a {
        self.tools
            .iter()
            .filter(move |def| match tags {
                None => def.tags.is_empty(),
                Some(enabled) => {
                    def.tags.is_empty() || def.tags.iter().any(|t| enabled.contains(t))
                }
            })
            .map(ToolDefinition::spec)
    }

    /// Iterate every registered tool's wire descriptor, in registration order.
    pub fn schemas_for_all(&self) -> impl Iterator<Item = ToolSpec> + '_ {
        self.tools.iter().map(ToolDefinition::spec)
    }

    /// Execute a named tool and encode the outcome as a result block.
    ///
    /// Never fails: unknown tools, argument validation failures, missing
    /// handlers, and handler errors all produce a
    /// `ToolResult { is_error: true }` block carrying a descriptive string,
    /// which the router feeds back into the conversation.
    pub async fn invoke(
        &self,
        call_id: &str,
        name: &str,
        arguments: &serde_json::Map<String, JsonValue>,
    ) -> ContentBlock {
        let definition = match self.get(name) {
            Some(def) => def,
            None => {
                return error_result(call_id, name, format!("no tool named '{}'", name));
            }
        };

        if let Err(reason) = definition.validate_arguments(arguments) {
            return error_result(call_id, name, format!("invalid arguments: {}", reason));
        }

        let handler = match &definition.handler {
            Some(h) => Arc::clone(h),
            None => {
                return error_result(call_id, name, format!("tool '{}' has no handler", name));
            }
        };

        match handler(JsonValue::Object(arguments.clone())).await {
            Ok(result) => ContentBlock::ToolResult {
                call_id: call_id.to_string(),
                tool_name: name.to_string(),
                result,
                is_error: false,
            },
            Err(err) => {
                log::error!("tool '{}' failed: {}", name, err);
                error_result(call_id, name, format!("tool '{}' failed: {}", name, err))
            }
        }
    }
}

fn error_result(call_id: &str, name: &str, message: String) -> ContentBlock {
    ContentBlock::ToolResult {
        call_id: call_id.to_string(),
        tool_name: name.to_string(),
        result: JsonValue::String(message),
        is_error: true,
    }
}
