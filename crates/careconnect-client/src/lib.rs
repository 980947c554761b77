//! Client-side orchestration for the resource finder.
//!
//! A [`Session`] owns one [`QueryController`], an explicitly opened
//! [`Channel`] to the backend and a [`Geolocator`]. The controller is a plain
//! state machine: it decides, the session performs the asynchronous work and
//! feeds the outcomes back, and a [`Presenter`] renders whatever state results.

pub mod channel;
pub mod clock;
pub mod controller;
pub mod error;
pub mod location;
pub mod session;
pub mod visit;

pub use channel::{BackendEnd, Channel, RetryPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Command, Lifecycle, QueryController, SubmissionId};
pub use error::{ChannelError, LocationError};
pub use location::{
    ConsentChoice, ConsentPrompt, FixedGeolocator, Geolocator, LocationCache, PermissionState,
    UnsupportedGeolocator,
};
pub use session::{Presenter, Session, SessionConfig, UserAction};
pub use visit::{SplashDecision, VisitTracker};
