pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use crate::core::*;
pub use errors::auth_error::{AuthError, AuthResult};
pub use errors::pipeline_error::{PipelineFault, PipelineResult};
pub use state::AppState;
