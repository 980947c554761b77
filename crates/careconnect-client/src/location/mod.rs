//! Location acquisition: cache, platform seam and resolution policy.

pub mod cache;
pub mod geolocator;
pub mod policy;

pub use cache::LocationCache;
pub use geolocator::{acquire, FixedGeolocator, Geolocator, PermissionState, UnsupportedGeolocator};
pub use policy::{ConsentChoice, ConsentPrompt};
