use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::query::Coordinate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    /// Address of the realtime backend the client connects to.
    pub server_addr: SocketAddr,
    pub log_level: String,
    /// Bounded wait for a single device location fix.
    pub location_timeout_ms: u64,
    /// How long an acquired coordinate may be reused without asking again.
    pub location_max_age_ms: u64,
    /// `None` waits for `final_res` indefinitely.
    pub response_timeout_secs: Option<u64>,
    pub connect_max_retries: u32,
    pub connect_backoff_base_ms: u64,
    /// File holding the last-visit timestamp used to skip the cold-start splash.
    pub state_path: PathBuf,
    pub splash_ms: u64,
    pub fallback_location: Coordinate,
}

impl AppConfig {
    #[must_use]
    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    #[must_use]
    pub fn location_max_age(&self) -> Duration {
        Duration::from_millis(self.location_max_age_ms)
    }

    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn splash_duration(&self) -> Duration {
        Duration::from_millis(self.splash_ms)
    }
}
