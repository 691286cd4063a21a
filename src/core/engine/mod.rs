//! Speech-to-speech engine adapters.
//!
//! The pipeline only sees the [`EngineAdapter`] trait. Concrete adapters are
//! selected by provider name through [`create_engine`].

mod base;
pub mod realtime;

pub use base::{
    BoxedEngine, EngineAdapter, EngineConfig, EngineError, EngineEvent, EngineFactory,
    EngineResult,
};
pub use realtime::{REALTIME_SAMPLE_RATE, RealtimeEngine};

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineProvider {
    Realtime,
}

impl EngineProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "realtime" | "openai" | "openai-realtime" => Some(EngineProvider::Realtime),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineProvider::Realtime => write!(f, "realtime"),
        }
    }
}

/// Create an unconnected engine for `provider`.
pub fn create_engine(provider: &str, config: EngineConfig) -> EngineResult<BoxedEngine> {
    match EngineProvider::parse(provider) {
        Some(EngineProvider::Realtime) => Ok(Box::new(RealtimeEngine::new(config)?)),
        None => Err(EngineError::UnsupportedProvider(provider.to_string())),
    }
}

pub fn get_supported_engines() -> Vec<&'static str> {
    vec!["realtime"]
}

/// Factory that builds engines from the configured provider name.
pub fn default_engine_factory() -> EngineFactory {
    Arc::new(|config: &EngineConfig| create_engine(&config.provider, config.clone()))
}
