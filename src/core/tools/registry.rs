use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::ToolDeclaration;
use crate::errors::ToolInvocationError;

/// A tool handler with statically typed arguments.
///
/// Arguments are deserialized from the engine's JSON before `call` runs; the
/// output must serialize to a JSON object.
#[async_trait]
pub trait TypedTool: Send + Sync + 'static {
    type Args: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    async fn call(&self, args: Self::Args) -> Result<Self::Output, String>;
}

/// Adapts an async closure into a [`TypedTool`].
pub struct FnTool<F, A> {
    func: F,
    _args: PhantomData<fn(A)>,
}

/// Build a tool from an async closure taking typed arguments.
pub fn tool_fn<F, Fut, A>(func: F) -> FnTool<F, A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
    A: DeserializeOwned + Send + 'static,
{
    FnTool {
        func,
        _args: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, A> TypedTool for FnTool<F, A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
    A: DeserializeOwned + Send + 'static,
{
    type Args = A;
    type Output = Value;

    async fn call(&self, args: A) -> Result<Value, String> {
        (self.func)(args).await
    }
}

/// Object-safe form stored in the registry.
#[async_trait]
trait ErasedTool: Send + Sync {
    async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolInvocationError>;
}

struct Erased<T>(T);

#[async_trait]
impl<T: TypedTool> ErasedTool for Erased<T> {
    async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolInvocationError> {
        let typed: T::Args =
            serde_json::from_value(args).map_err(|e| ToolInvocationError::InvalidArguments {
                tool: name.to_string(),
                reason: e.to_string(),
            })?;

        let output = self
            .0
            .call(typed)
            .await
            .map_err(|reason| ToolInvocationError::HandlerFailed {
                tool: name.to_string(),
                reason,
            })?;

        match serde_json::to_value(output) {
            Ok(value @ Value::Object(_)) => Ok(value),
            _ => Err(ToolInvocationError::InvalidResult(name.to_string())),
        }
    }
}

/// Registry construction failures. All are detected at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolRegistryError {
    #[error("Tool '{0}' is declared more than once")]
    DuplicateDeclaration(String),

    #[error("Tool '{0}' has more than one handler")]
    DuplicateHandler(String),

    #[error("Tool '{0}' is declared but has no handler")]
    MissingHandler(String),

    #[error("Handler '{0}' has no matching declaration")]
    UndeclaredHandler(String),

    #[error("Tool '{tool}' requires undeclared parameter '{param}'")]
    UnknownRequiredParam { tool: String, param: String },

    #[error("Tool declaration has an empty name")]
    EmptyName,
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    declarations: Vec<ToolDeclaration>,
    handlers: Vec<(String, Arc<dyn ErasedTool>)>,
}

impl ToolRegistryBuilder {
    pub fn declare(mut self, declaration: ToolDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn handler<T: TypedTool>(mut self, name: impl Into<String>, tool: T) -> Self {
        self.handlers.push((name.into(), Arc::new(Erased(tool))));
        self
    }

    /// Declare a tool and register its handler in one step.
    pub fn tool<T: TypedTool>(self, declaration: ToolDeclaration, tool: T) -> Self {
        let name = declaration.name.clone();
        self.declare(declaration).handler(name, tool)
    }

    /// Validate declarations against handlers.
    pub fn build(self) -> Result<ToolRegistry, ToolRegistryError> {
        let mut declared: HashMap<String, usize> = HashMap::new();
        for (idx, decl) in self.declarations.iter().enumerate() {
            if decl.name.trim().is_empty() {
                return Err(ToolRegistryError::EmptyName);
            }
            if declared.insert(decl.name.clone(), idx).is_some() {
                return Err(ToolRegistryError::DuplicateDeclaration(decl.name.clone()));
            }
            if let Some(param) = decl
                .required
                .iter()
                .find(|p| !decl.properties.contains_key(p.as_str()))
            {
                return Err(ToolRegistryError::UnknownRequiredParam {
                    tool: decl.name.clone(),
                    param: param.clone(),
                });
            }
        }

        let mut handlers: HashMap<String, Arc<dyn ErasedTool>> = HashMap::new();
        for (name, handler) in self.handlers {
            if !declared.contains_key(&name) {
                return Err(ToolRegistryError::UndeclaredHandler(name));
            }
            if handlers.insert(name.clone(), handler).is_some() {
                return Err(ToolRegistryError::DuplicateHandler(name));
            }
        }

        if let Some(decl) = self
            .declarations
            .iter()
            .find(|d| !handlers.contains_key(&d.name))
        {
            return Err(ToolRegistryError::MissingHandler(decl.name.clone()));
        }

        debug!("Tool registry built with {} tools", handlers.len());

        Ok(ToolRegistry {
            declarations: Arc::from(self.declarations),
            index: declared,
            handlers,
        })
    }
}

/// Mapping from tool name to typed handler, validated against the declared
/// schema set. Read-only after startup.
pub struct ToolRegistry {
    declarations: Arc<[ToolDeclaration]>,
    index: HashMap<String, usize>,
    handlers: HashMap<String, Arc<dyn ErasedTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn declarations(&self) -> Arc<[ToolDeclaration]> {
        self.declarations.clone()
    }

    pub fn declaration(&self, name: &str) -> Option<&ToolDeclaration> {
        self.index.get(name).map(|&idx| &self.declarations[idx])
    }

    pub fn names(&self) -> Vec<&str> {
        self.declarations.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Run a tool call requested by the engine.
    ///
    /// `arguments` is the raw JSON text from the engine; an empty string is
    /// treated as no arguments.
    pub async fn invoke(&self, name: &str, arguments: &str) -> Result<Value, ToolInvocationError> {
        let (Some(declaration), Some(handler)) = (self.declaration(name), self.handlers.get(name))
        else {
            warn!("Engine requested unknown tool: {}", name);
            return Err(ToolInvocationError::UnknownTool(name.to_string()));
        };

        let args = parse_arguments(name, arguments)?;
        if let Some(param) = declaration
            .required
            .iter()
            .find(|p| args.get(p.as_str()).is_none_or(Value::is_null))
        {
            return Err(ToolInvocationError::MissingParameter {
                tool: name.to_string(),
                param: param.clone(),
            });
        }

        handler.invoke(name, Value::Object(args)).await
    }

    /// Like [`invoke`](Self::invoke) but folds failures into the error
    /// payload submitted to the engine.
    pub async fn invoke_or_error(&self, name: &str, arguments: &str) -> Value {
        match self.invoke(name, arguments).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Tool invocation failed: {}", e);
                e.to_payload()
            }
        }
    }
}

fn parse_arguments(name: &str, arguments: &str) -> Result<Map<String, Value>, ToolInvocationError> {
    if arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ToolInvocationError::InvalidArguments {
            tool: name.to_string(),
            reason: "arguments must be a JSON object".to_string(),
        }),
        Err(e) => Err(ToolInvocationError::InvalidArguments {
            tool: name.to_string(),
            reason: e.to_string(),
        }),
    }
}
