//! Infrastructure layer module
//!
//! Adapters and external integrations:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - HTTP squad API target (reqwest)

pub mod config;
pub mod logging;
pub mod squad_api;

pub use config::{ConfigError, ConfigLoader};
pub use squad_api::HttpSquadTarget;
