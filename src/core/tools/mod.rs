//! Tool declarations and handlers.
//!
//! Declarations are sent to the engine with the conversation context. When the
//! engine requests a call, the [`ToolRegistry`] validates the arguments
//! against the declaration and runs the matching handler.

pub mod builtin;
mod registry;

pub use builtin::{DEFAULT_SYSTEM_INSTRUCTION, default_registry};
pub use registry::{
    FnTool, ToolRegistry, ToolRegistryBuilder, ToolRegistryError, TypedTool, tool_fn,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Schema of a tool exposed to the engine. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema for each parameter, keyed by parameter name
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    /// Add a parameter with its JSON schema.
    pub fn param(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Full JSON schema object for the parameters.
    pub fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": Value::Object(self.properties.clone()),
            "required": self.required,
        })
    }
}
