use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::engine::{EngineFactory, default_engine_factory};
use crate::core::pipeline::SessionHooks;
use crate::core::tools::{ToolRegistry, ToolRegistryError, default_registry};

/// Application state shared by every connection
pub struct AppState {
    pub config: ServerConfig,
    /// Tools offered to the engine in every session
    pub tools: Arc<ToolRegistry>,
    /// Builds one engine adapter per session
    pub engine_factory: EngineFactory,
    pub hooks: SessionHooks,
}

impl AppState {
    /// Create state with the built-in tools and the configured engine provider.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, ToolRegistryError> {
        Self::with_engine_factory(config, default_engine_factory())
    }

    /// Create state with a custom engine factory.
    pub fn with_engine_factory(
        config: ServerConfig,
        engine_factory: EngineFactory,
    ) -> Result<Arc<Self>, ToolRegistryError> {
        Self::build(config, engine_factory, default_registry)
    }

    /// Create state from a registry constructor. A registry that fails to
    /// build fails startup.
    pub fn build(
        config: ServerConfig,
        engine_factory: EngineFactory,
        registry: impl FnOnce() -> Result<ToolRegistry, ToolRegistryError>,
    ) -> Result<Arc<Self>, ToolRegistryError> {
        let tools = registry()?;
        info!(tools = ?tools.names(), "Tool registry ready");

        Ok(Arc::new(Self {
            config,
            tools: Arc::new(tools),
            engine_factory,
            hooks: SessionHooks::default(),
        }))
    }

    /// Replace the tool registry.
    pub fn with_tools(mut self: Arc<Self>, tools: ToolRegistry) -> Arc<Self> {
        match Arc::get_mut(&mut self) {
            Some(state) => state.tools = Arc::new(tools),
            None => warn!("AppState already shared, tool registry unchanged"),
        }
        self
    }

    /// Install session lifecycle hooks.
    pub fn with_hooks(mut self: Arc<Self>, hooks: SessionHooks) -> Arc<Self> {
        match Arc::get_mut(&mut self) {
            Some(state) => state.hooks = hooks,
            None => warn!("AppState already shared, hooks unchanged"),
        }
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("tools", &self.tools.names())
            .field("hooks", &self.hooks)
            .finish()
    }
}
