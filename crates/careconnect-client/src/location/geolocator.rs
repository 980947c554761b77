//! Platform geolocation seam.

use std::future::Future;
use std::time::Duration;

use careconnect_core::Coordinate;

use crate::error::LocationError;

/// Platform permission for location access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    /// The platform would ask the user.
    Prompt,
    Denied,
    /// The permission could not be determined.
    Unknown,
}

impl PermissionState {
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}

/// Access to the device's position.
pub trait Geolocator: Send + Sync + 'static {
    /// Current permission for location access.
    ///
    /// # Errors
    ///
    /// Returns a [`LocationError`] when the platform cannot report it. Callers
    /// treat that as "not granted".
    fn permission(&self) -> impl Future<Output = Result<PermissionState, LocationError>> + Send;

    /// Asks the device for a fix. May wait for the user or hardware.
    ///
    /// # Errors
    ///
    /// Returns the [`LocationError`] describing why no fix is available.
    fn current_position(&self) -> impl Future<Output = Result<Coordinate, LocationError>> + Send;
}

/// Requests a fix, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`LocationError::Timeout`] if no fix arrives in time, or whatever
/// the geolocator reported.
pub async fn acquire<G: Geolocator>(
    geolocator: &G,
    timeout: Duration,
) -> Result<Coordinate, LocationError> {
    match tokio::time::timeout(timeout, geolocator.current_position()).await {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout),
    }
}

/// A device whose position and permission are configured up front.
#[derive(Debug, Clone)]
pub struct FixedGeolocator {
    permission: PermissionState,
    position: Result<Coordinate, LocationError>,
    delay: Duration,
}

impl FixedGeolocator {
    #[must_use]
    pub fn new(permission: PermissionState, position: Result<Coordinate, LocationError>) -> Self {
        Self {
            permission,
            position,
            delay: Duration::ZERO,
        }
    }

    /// Simulates how long the hardware takes to produce a fix.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Geolocator for FixedGeolocator {
    async fn permission(&self) -> Result<PermissionState, LocationError> {
        Ok(self.permission)
    }

    async fn current_position(&self) -> Result<Coordinate, LocationError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.permission == PermissionState::Denied {
            return Err(LocationError::PermissionDenied);
        }
        self.position
    }
}

/// A platform without any geolocation support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedGeolocator;

impl Geolocator for UnsupportedGeolocator {
    async fn permission(&self) -> Result<PermissionState, LocationError> {
        Err(LocationError::Unsupported)
    }

    async fn current_position(&self) -> Result<Coordinate, LocationError> {
        Err(LocationError::Unsupported)
    }
}
