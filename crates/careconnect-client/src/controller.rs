//! Query submission controller.
//!
//! Owns every piece of mutable state for one query lifecycle. The controller
//! performs no I/O: operations return a [`Command`] describing the next
//! asynchronous step, and the caller reports the outcome back tagged with the
//! [`SubmissionId`] it was issued for. Outcomes for any other id are dropped,
//! so a late location fix from an abandoned attempt cannot leak into a newer
//! submission.

use careconnect_core::{
    Coordinate, FinalResponse, FinalResultSet, InboundEvent, Query, SubmissionRequest,
    FALLBACK_COORDINATE,
};
use chrono::{DateTime, Utc};

use crate::error::LocationError;
use crate::location::cache::LocationCache;
use crate::location::geolocator::PermissionState;
use crate::location::policy::{
    self, ConsentChoice, ConsentPrompt, ConsentStep, FailureStep, LocationStep, PermissionStep,
};

pub const NO_RESPONSE_ERROR: &str = "No response from server. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(u64);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<SubmissionId> for u64 {
    fn from(id: SubmissionId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    AwaitingLocation,
    Loading,
    Completed,
    Failed,
    /// No terminal event arrived within the configured response timeout.
    TimedOut,
}

impl Lifecycle {
    /// A submission is in progress and a new one would be rejected.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Lifecycle::AwaitingLocation | Lifecycle::Loading)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Lifecycle::Completed | Lifecycle::Failed | Lifecycle::TimedOut
        )
    }
}

/// Asynchronous work the caller must perform on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CheckPermission(SubmissionId),
    RequestPosition(SubmissionId),
    Emit {
        id: SubmissionId,
        request: SubmissionRequest,
    },
}

#[derive(Debug, Clone)]
struct ActiveSubmission {
    id: SubmissionId,
    query: Query,
    /// The user was asked for consent during this submission.
    prompted: bool,
}

#[derive(Debug)]
pub struct QueryController {
    next_id: u64,
    active: Option<ActiveSubmission>,
    lifecycle: Lifecycle,
    progress: Vec<String>,
    final_result: Option<FinalResultSet>,
    location_error: Option<LocationError>,
    backend_error: Option<String>,
    consent: Option<ConsentPrompt>,
    /// Submissions turned away because another one was in flight.
    rejected_while_busy: u64,
    cache: LocationCache,
    fallback: Coordinate,
}

impl Default for QueryController {
    fn default() -> Self {
        Self::new(LocationCache::default(), FALLBACK_COORDINATE)
    }
}

impl QueryController {
    #[must_use]
    pub fn new(cache: LocationCache, fallback: Coordinate) -> Self {
        Self {
            next_id: 0,
            active: None,
            lifecycle: Lifecycle::Idle,
            progress: Vec::new(),
            final_result: None,
            location_error: None,
            backend_error: None,
            consent: None,
            rejected_while_busy: 0,
            cache,
            fallback,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Progress messages of the current submission, in arrival order.
    #[must_use]
    pub fn progress(&self) -> &[String] {
        &self.progress
    }

    #[must_use]
    pub fn final_result(&self) -> Option<&FinalResultSet> {
        self.final_result.as_ref()
    }

    #[must_use]
    pub fn location_error(&self) -> Option<LocationError> {
        self.location_error
    }

    #[must_use]
    pub fn backend_error(&self) -> Option<&str> {
        self.backend_error.as_deref()
    }

    /// The consent question currently awaiting the user's answer.
    #[must_use]
    pub fn consent_prompt(&self) -> Option<ConsentPrompt> {
        self.consent
    }

    #[must_use]
    pub fn active_id(&self) -> Option<SubmissionId> {
        self.active.as_ref().map(|active| active.id)
    }

    #[must_use]
    pub fn active_query(&self) -> Option<&Query> {
        self.active.as_ref().map(|active| &active.query)
    }

    /// How many submissions have been rejected because another was in flight.
    #[must_use]
    pub fn rejected_while_busy(&self) -> u64 {
        self.rejected_while_busy
    }

    #[must_use]
    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    /// Starts a new submission.
    ///
    /// Blank text is ignored without any state change, as is a call while
    /// another submission is still in flight.
    pub fn submit(&mut self, text: &str, now: DateTime<Utc>) -> Option<Command> {
        let query = Query::parse(text)?;
        if self.lifecycle.is_in_flight() {
            tracing::info!(lifecycle = ?self.lifecycle, query = %query, "submission already in flight, ignoring");
            self.rejected_while_busy += 1;
            return None;
        }

        self.next_id += 1;
        let id = SubmissionId(self.next_id);
        self.progress.clear();
        self.final_result = None;
        self.backend_error = None;
        self.location_error = None;
        self.consent = None;
        self.active = Some(ActiveSubmission {
            id,
            query,
            prompted: false,
        });

        match policy::plan(&self.cache, now) {
            LocationStep::UseCached(coordinate) => {
                tracing::debug!(submission = %id, %coordinate, "using cached location");
                self.emit_with(coordinate)
            }
            LocationStep::CheckPermission => {
                self.lifecycle = Lifecycle::AwaitingLocation;
                Some(Command::CheckPermission(id))
            }
        }
    }

    /// Reports the platform permission. `None` means it could not be checked.
    pub fn permission_resolved(
        &mut self,
        id: SubmissionId,
        permission: Option<PermissionState>,
        now: DateTime<Utc>,
    ) -> Option<Command> {
        if !self.is_awaiting(id) {
            tracing::debug!(submission = %id, "dropping stale permission result");
            return None;
        }
        match policy::after_permission(permission, &self.cache, now) {
            PermissionStep::RequestSilently => Some(Command::RequestPosition(id)),
            PermissionStep::AskConsent(prompt) => {
                self.mark_prompted();
                self.consent = Some(prompt);
                None
            }
        }
    }

    /// Applies the user's answer to the pending consent prompt.
    pub fn consent(&mut self, choice: ConsentChoice) -> Option<Command> {
        let id = self.active_id()?;
        if self.consent.is_none() || !self.is_awaiting(id) {
            tracing::debug!(?choice, "no consent prompt pending, ignoring");
            return None;
        }
        self.consent = None;
        match policy::after_consent(choice) {
            ConsentStep::RequestPosition => {
                self.location_error = None;
                self.mark_prompted();
                Some(Command::RequestPosition(id))
            }
            ConsentStep::Fallback => {
                self.location_error = None;
                tracing::info!(submission = %id, "continuing without location");
                self.emit_with(self.fallback)
            }
        }
    }

    /// Reports the outcome of a device location request.
    pub fn location_resolved(
        &mut self,
        id: SubmissionId,
        result: Result<Coordinate, LocationError>,
        now: DateTime<Utc>,
    ) -> Option<Command> {
        if !self.is_awaiting(id) {
            tracing::debug!(submission = %id, "dropping stale location result");
            return None;
        }
        match result {
            Ok(coordinate) => {
                self.cache.store(coordinate, now);
                self.emit_with(coordinate)
            }
            Err(error) => {
                let prompted = self.active.as_ref().is_some_and(|active| active.prompted);
                match policy::after_failure(prompted, error) {
                    FailureStep::Fallback => {
                        tracing::warn!(submission = %id, %error, "location unavailable, using fallback");
                        self.emit_with(self.fallback)
                    }
                    FailureStep::OfferRetry(prompt) => {
                        tracing::info!(submission = %id, %error, "location failed after consent");
                        self.location_error = Some(error);
                        self.consent = Some(prompt);
                        None
                    }
                }
            }
        }
    }

    /// Folds one inbound realtime event into the state.
    pub fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Connect => tracing::info!("connected to server"),
            InboundEvent::Disconnect => tracing::info!("disconnected from server"),
            InboundEvent::Update(update) => {
                tracing::debug!(message = %update.message, "progress update");
                self.progress.push(update.message);
            }
            InboundEvent::FinalRes(response) => self.finish(&response),
        }
    }

    /// The backend did not answer the submission `id` in time.
    pub fn response_timed_out(&mut self, id: SubmissionId) {
        if self.active_id() != Some(id) || self.lifecycle != Lifecycle::Loading {
            return;
        }
        tracing::warn!(submission = %id, "no final result before the response timeout");
        self.lifecycle = Lifecycle::TimedOut;
        self.backend_error = Some(NO_RESPONSE_ERROR.to_owned());
    }

    /// The request for `id` could not be handed to the transport.
    pub fn emit_failed(&mut self, id: SubmissionId, reason: &str) {
        if self.active_id() != Some(id) || self.lifecycle != Lifecycle::Loading {
            return;
        }
        self.lifecycle = Lifecycle::Failed;
        self.backend_error = Some(format!("Could not reach the server: {reason}"));
    }

    pub fn dismiss_location_error(&mut self) {
        self.location_error = None;
    }

    pub fn dismiss_backend_error(&mut self) {
        self.backend_error = None;
    }

    fn finish(&mut self, response: &FinalResponse) {
        if !matches!(self.lifecycle, Lifecycle::Loading) && !self.lifecycle.is_terminal() {
            tracing::warn!(lifecycle = ?self.lifecycle, "final_res without a pending request, ignoring");
            return;
        }
        if let Some(error) = response.error() {
            tracing::warn!(error, "server reported an error");
            self.lifecycle = Lifecycle::Failed;
            self.final_result = None;
            self.backend_error = Some(error.to_owned());
            return;
        }
        match FinalResultSet::from_message(&response.message) {
            Ok(results) => {
                tracing::info!(count = results.len(), "final result received");
                self.lifecycle = Lifecycle::Completed;
                self.backend_error = None;
                self.final_result = Some(results);
            }
            Err(e) => {
                tracing::warn!(error = %e, "unreadable final result");
                self.lifecycle = Lifecycle::Failed;
                self.final_result = None;
                self.backend_error = Some(e.to_string());
            }
        }
    }

    fn emit_with(&mut self, location: Coordinate) -> Option<Command> {
        let active = self.active.as_ref()?;
        self.lifecycle = Lifecycle::Loading;
        self.consent = None;
        tracing::info!(submission = %active.id, query = %active.query, %location, "submitting query");
        Some(Command::Emit {
            id: active.id,
            request: SubmissionRequest {
                query: active.query.clone(),
                location,
            },
        })
    }

    fn is_awaiting(&self, id: SubmissionId) -> bool {
        self.active_id() == Some(id) && self.lifecycle == Lifecycle::AwaitingLocation
    }

    fn mark_prompted(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.prompted = true;
        }
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
