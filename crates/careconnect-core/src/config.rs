use crate::app_config::{AppConfig, Environment};
use crate::query::{Coordinate, FALLBACK_COORDINATE};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but cannot be parsed.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but cannot be parsed.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Every variable has a default, so an empty environment yields a usable
/// config pointed at a local backend.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_f64 = |var: &str, default: f64| -> Result<f64, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.parse::<f64>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let env = parse_environment(&or_default("CARECONNECT_ENV", "development"))?;

    let server_addr = parse_addr("CARECONNECT_SERVER_ADDR", "127.0.0.1:8000")?;
    let log_level = or_default("CARECONNECT_LOG_LEVEL", "info");

    let location_timeout_ms = parse_u64("CARECONNECT_LOCATION_TIMEOUT_MS", "10000")?;
    let location_max_age_ms = parse_u64("CARECONNECT_LOCATION_MAX_AGE_MS", "300000")?;
    let response_timeout_secs = match lookup("CARECONNECT_RESPONSE_TIMEOUT_SECS") {
        Ok(raw) if raw.trim().is_empty() => None,
        Ok(raw) => Some(
            raw.trim()
                .parse::<u64>()
                .map_err(|e| invalid("CARECONNECT_RESPONSE_TIMEOUT_SECS", e.to_string()))?,
        ),
        Err(_) => None,
    };

    let connect_max_retries = parse_u32("CARECONNECT_CONNECT_MAX_RETRIES", "3")?;
    let connect_backoff_base_ms = parse_u64("CARECONNECT_CONNECT_BACKOFF_BASE_MS", "500")?;

    let state_path = PathBuf::from(or_default(
        "CARECONNECT_STATE_PATH",
        "./.careconnect/last-visit",
    ));
    let splash_ms = parse_u64("CARECONNECT_SPLASH_MS", "5000")?;

    let fallback_location = Coordinate::new(
        parse_f64("CARECONNECT_FALLBACK_LAT", FALLBACK_COORDINATE.lat)?,
        parse_f64("CARECONNECT_FALLBACK_LNG", FALLBACK_COORDINATE.lng)?,
    );
    if !fallback_location.is_valid() {
        return Err(invalid(
            "CARECONNECT_FALLBACK_LAT",
            format!("fallback coordinate {fallback_location} is out of range"),
        ));
    }

    Ok(AppConfig {
        env,
        server_addr,
        log_level,
        location_timeout_ms,
        location_max_age_ms,
        response_timeout_secs,
        connect_max_retries,
        connect_backoff_base_ms,
        state_path,
        splash_ms,
        fallback_location,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CARECONNECT_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
