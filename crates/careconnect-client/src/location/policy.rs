//! Location resolution policy.
//!
//! Pure decisions only. Each function maps what is known so far (cache,
//! permission, the user's answer, an acquisition failure) to the next step;
//! the controller carries the steps out and the presentation layer reacts to
//! whatever prompt results.

use careconnect_core::Coordinate;
use chrono::{DateTime, Utc};

use super::cache::LocationCache;
use super::geolocator::PermissionState;
use crate::error::LocationError;

/// What the user is being asked about location access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPrompt {
    /// No coordinate has been acquired yet.
    Request,
    /// A coordinate was acquired earlier but has aged out.
    Update,
    /// Acquisition failed after consent; offer retry or continue without location.
    Failed(LocationError),
}

/// The user's answer to a [`ConsentPrompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentChoice {
    Allow,
    Decline,
    Retry,
    ProceedWithoutLocation,
}

/// First step of a submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationStep {
    UseCached(Coordinate),
    CheckPermission,
}

/// Step after the permission state is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStep {
    /// Permission is already granted; query the device without asking.
    RequestSilently,
    AskConsent(ConsentPrompt),
}

/// Step after the user answers a consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentStep {
    RequestPosition,
    Fallback,
}

/// Step after a device request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStep {
    Fallback,
    OfferRetry(ConsentPrompt),
}

#[must_use]
pub fn plan(cache: &LocationCache, now: DateTime<Utc>) -> LocationStep {
    match cache.fresh(now) {
        Some(coordinate) => LocationStep::UseCached(coordinate),
        None => LocationStep::CheckPermission,
    }
}

/// `permission` is `None` when the platform could not be asked; that counts
/// as not granted.
#[must_use]
pub fn after_permission(
    permission: Option<PermissionState>,
    cache: &LocationCache,
    now: DateTime<Utc>,
) -> PermissionStep {
    if permission.is_some_and(PermissionState::is_granted) {
        return PermissionStep::RequestSilently;
    }
    if cache.is_expired(now) {
        PermissionStep::AskConsent(ConsentPrompt::Update)
    } else {
        PermissionStep::AskConsent(ConsentPrompt::Request)
    }
}

#[must_use]
pub fn after_consent(choice: ConsentChoice) -> ConsentStep {
    match choice {
        ConsentChoice::Allow | ConsentChoice::Retry => ConsentStep::RequestPosition,
        ConsentChoice::Decline | ConsentChoice::ProceedWithoutLocation => ConsentStep::Fallback,
    }
}

/// A silent request (permission already granted) never prompts: it falls
/// back. A request the user consented to offers a retry instead.
#[must_use]
pub fn after_failure(prompted: bool, error: LocationError) -> FailureStep {
    if prompted {
        FailureStep::OfferRetry(ConsentPrompt::Failed(error))
    } else {
        FailureStep::Fallback
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn fresh_cache_skips_permission_check() {
        let mut cache = LocationCache::default();
        let coord = Coordinate::new(43.65, -79.38);
        cache.store(coord, t0());
        assert_eq!(
            plan(&cache, t0() + Duration::milliseconds(299_999)),
            LocationStep::UseCached(coord)
        );
    }

    #[test]
    fn stale_cache_checks_permission() {
        let mut cache = LocationCache::default();
        cache.store(Coordinate::new(43.65, -79.38), t0());
        assert_eq!(
            plan(&cache, t0() + Duration::milliseconds(300_001)),
            LocationStep::CheckPermission
        );
    }

    #[test]
    fn granted_permission_requests_silently() {
        let cache = LocationCache::default();
        assert_eq!(
            after_permission(Some(PermissionState::Granted), &cache, t0()),
            PermissionStep::RequestSilently
        );
    }

    #[test]
    fn unknown_or_unavailable_permission_asks_for_consent() {
        let cache = LocationCache::default();
        for permission in [
            None,
            Some(PermissionState::Unknown),
            Some(PermissionState::Prompt),
            Some(PermissionState::Denied),
        ] {
            assert_eq!(
                after_permission(permission, &cache, t0()),
                PermissionStep::AskConsent(ConsentPrompt::Request),
                "permission {permission:?}"
            );
        }
    }

    #[test]
    fn expired_cache_asks_for_an_update() {
        let mut cache = LocationCache::default();
        cache.store(Coordinate::new(43.65, -79.38), t0());
        assert_eq!(
            after_permission(Some(PermissionState::Prompt), &cache, t0() + Duration::hours(1)),
            PermissionStep::AskConsent(ConsentPrompt::Update)
        );
    }

    #[test]
    fn consent_choices_map_to_request_or_fallback() {
        assert_eq!(after_consent(ConsentChoice::Allow), ConsentStep::RequestPosition);
        assert_eq!(after_consent(ConsentChoice::Retry), ConsentStep::RequestPosition);
        assert_eq!(after_consent(ConsentChoice::Decline), ConsentStep::Fallback);
        assert_eq!(
            after_consent(ConsentChoice::ProceedWithoutLocation),
            ConsentStep::Fallback
        );
    }

    #[test]
    fn silent_failure_falls_back_without_prompting() {
        assert_eq!(
            after_failure(false, LocationError::Timeout),
            FailureStep::Fallback
        );
    }

    #[test]
    fn prompted_failure_offers_retry() {
        assert_eq!(
            after_failure(true, LocationError::PositionUnavailable),
            FailureStep::OfferRetry(ConsentPrompt::Failed(LocationError::PositionUnavailable))
        );
    }
}
