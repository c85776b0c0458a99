pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod lambda;
pub mod logging;
pub mod model;
pub mod monitoring;
pub mod preprocess;
pub mod routes;
pub mod server;
pub mod service;

pub use config::{Deployment, Settings};
pub use error::ApiError;
pub use service::AnalysisService;

/// Reads settings from the environment and checks the artifact paths.
pub fn load_settings() -> Result<Settings, config::ConfigError> {
    let settings = Settings::from_env()?;
    settings.validate_paths()?;
    Ok(settings)
}
