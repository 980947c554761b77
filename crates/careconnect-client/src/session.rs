//! Async driver around [`QueryController`].
//!
//! One task runs the loop below; location work runs on spawned tasks that
//! report back over an internal channel, tagged with the submission they
//! belong to. The controller decides what those reports mean.

use std::sync::Arc;
use std::time::Duration;

use careconnect_core::{Coordinate, OutboundEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::channel::Channel;
use crate::clock::Clock;
use crate::controller::{Command, Lifecycle, QueryController, SubmissionId};
use crate::error::{ChannelError, LocationError};
use crate::location::geolocator::{acquire, Geolocator, PermissionState};
use crate::location::policy::ConsentChoice;

/// Something the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Submit(String),
    Consent(ConsentChoice),
    DismissLocationError,
    DismissBackendError,
    Shutdown,
}

/// Renders controller state. Called after every change.
pub trait Presenter: Send {
    fn render(&mut self, state: &QueryController);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub location_timeout: Duration,
    /// `None` waits for `final_res` indefinitely.
    pub response_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            location_timeout: Duration::from_secs(10),
            response_timeout: None,
        }
    }
}

#[derive(Debug)]
enum LocationReport {
    Permission(SubmissionId, Option<PermissionState>),
    Position(SubmissionId, Result<Coordinate, LocationError>),
}

pub struct Session<G, C, P> {
    controller: QueryController,
    channel: Channel,
    geolocator: Arc<G>,
    clock: C,
    presenter: P,
    config: SessionConfig,
    reports_tx: mpsc::Sender<LocationReport>,
    reports_rx: mpsc::Receiver<LocationReport>,
    deadline: Option<(SubmissionId, Instant)>,
}

impl<G, C, P> Session<G, C, P>
where
    G: Geolocator,
    C: Clock,
    P: Presenter,
{
    pub fn new(
        controller: QueryController,
        channel: Channel,
        geolocator: G,
        clock: C,
        presenter: P,
        config: SessionConfig,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::channel(8);
        Self {
            controller,
            channel,
            geolocator: Arc::new(geolocator),
            clock,
            presenter,
            config,
            reports_tx,
            reports_rx,
            deadline: None,
        }
    }

    /// Processes actions and events until `Shutdown`, the action stream ends,
    /// or the backend connection goes away. Returns the final controller state.
    pub async fn run(mut self, mut actions: mpsc::Receiver<UserAction>) -> QueryController {
        self.presenter.render(&self.controller);
        loop {
            let deadline = self.deadline;
            tokio::select! {
                action = actions.recv() => {
                    let Some(action) = action else { break };
                    if action == UserAction::Shutdown {
                        break;
                    }
                    self.on_action(action).await;
                }
                event = self.channel.next_event() => {
                    let Some(event) = event else {
                        tracing::info!("realtime channel closed, ending session");
                        break;
                    };
                    self.controller.handle_event(event);
                }
                Some(report) = self.reports_rx.recv() => {
                    self.on_report(report).await;
                }
                () = wait_until(deadline) => {
                    if let Some((id, _)) = self.deadline.take() {
                        self.controller.response_timed_out(id);
                    }
                }
            }
            if self.controller.lifecycle() != Lifecycle::Loading {
                self.deadline = None;
            }
            self.presenter.render(&self.controller);
        }
        self.channel.close();
        self.controller
    }

    async fn on_action(&mut self, action: UserAction) {
        let now = self.clock.now();
        let command = match action {
            UserAction::Submit(text) => self.controller.submit(&text, now),
            UserAction::Consent(choice) => self.controller.consent(choice),
            UserAction::DismissLocationError => {
                self.controller.dismiss_location_error();
                None
            }
            UserAction::DismissBackendError => {
                self.controller.dismiss_backend_error();
                None
            }
            UserAction::Shutdown => None,
        };
        self.execute(command).await;
    }

    async fn on_report(&mut self, report: LocationReport) {
        let now = self.clock.now();
        let command = match report {
            LocationReport::Permission(id, permission) => {
                self.controller.permission_resolved(id, permission, now)
            }
            LocationReport::Position(id, result) => {
                self.controller.location_resolved(id, result, now)
            }
        };
        self.execute(command).await;
    }

    async fn execute(&mut self, command: Option<Command>) {
        let Some(command) = command else { return };
        match command {
            Command::CheckPermission(id) => {
                let geolocator = Arc::clone(&self.geolocator);
                let reports = self.reports_tx.clone();
                tokio::spawn(async move {
                    let permission = match geolocator.permission().await {
                        Ok(state) => Some(state),
                        Err(e) => {
                            tracing::debug!(error = %e, "permission state unavailable");
                            None
                        }
                    };
                    let _ = reports.send(LocationReport::Permission(id, permission)).await;
                });
            }
            Command::RequestPosition(id) => {
                let geolocator = Arc::clone(&self.geolocator);
                let reports = self.reports_tx.clone();
                let timeout = self.config.location_timeout;
                tokio::spawn(async move {
                    let result = acquire(geolocator.as_ref(), timeout).await;
                    let _ = reports.send(LocationReport::Position(id, result)).await;
                });
            }
            Command::Emit { id, request } => {
                if let Err(e) = self.channel.emit(OutboundEvent::SubmitQuery(request)).await {
                    self.on_emit_error(id, &e);
                    return;
                }
                if let Some(timeout) = self.config.response_timeout {
                    self.deadline = Some((id, Instant::now() + timeout));
                }
            }
        }
    }

    fn on_emit_error(&mut self, id: SubmissionId, error: &ChannelError) {
        tracing::error!(submission = %id, %error, "failed to send query");
        self.controller.emit_failed(id, &error.to_string());
    }
}

async fn wait_until(deadline: Option<(SubmissionId, Instant)>) {
    match deadline {
        Some((_, at)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
