pub mod app_config;
pub mod config;
pub mod events;
pub mod query;
pub mod results;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use events::{FinalResponse, InboundEvent, OutboundEvent, ProgressUpdate};
pub use query::{Coordinate, Query, SubmissionRequest, FALLBACK_COORDINATE};
pub use results::{FinalResultSet, LocationResult, ResultParseError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
