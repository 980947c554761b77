use std::collections::VecDeque;
use std::io::{self, BufRead};

use anyhow::Context;
use careconnect_client::{
    Channel, ConsentChoice, ConsentPrompt, FixedGeolocator, Lifecycle, LocationCache,
    LocationError, PermissionState, QueryController, RetryPolicy, Session, SessionConfig,
    SystemClock, UserAction,
};
use careconnect_core::{AppConfig, Coordinate, Query};
use tokio::sync::{mpsc, watch};

use crate::render::{parse_answer, TerminalPresenter};
use crate::{splash, PermissionArg, SearchOpts};

pub async fn run_search(config: &AppConfig, opts: &SearchOpts, query: String) -> anyhow::Result<()> {
    if Query::parse(&query).is_none() {
        anyhow::bail!("query must not be blank");
    }
    let controller = run(config, opts, Some(query)).await?;
    match controller.lifecycle() {
        Lifecycle::Completed => Ok(()),
        Lifecycle::Failed | Lifecycle::TimedOut => anyhow::bail!(
            "search failed: {}",
            controller.backend_error().unwrap_or("unknown error")
        ),
        other => anyhow::bail!("connection closed before the search finished ({other:?})"),
    }
}

pub async fn run_interactive(config: &AppConfig, opts: &SearchOpts) -> anyhow::Result<()> {
    println!("Type what you are looking for and press enter. `:quit` exits.");
    run(config, opts, None).await?;
    Ok(())
}

async fn run(
    config: &AppConfig,
    opts: &SearchOpts,
    query: Option<String>,
) -> anyhow::Result<QueryController> {
    let device = device(opts)?;
    let addr = opts.server.unwrap_or(config.server_addr);
    let policy = RetryPolicy {
        max_retries: config.connect_max_retries,
        backoff_base_ms: config.connect_backoff_base_ms,
    };

    tracing::info!(%addr, "connecting");
    let connecting = Channel::connect_tcp(addr, policy);
    let connected = if opts.no_splash {
        connecting.await
    } else {
        splash::while_connecting(config, connecting).await
    };
    let channel = connected.with_context(|| format!("failed to connect to {addr}"))?;

    let max_age = chrono::Duration::from_std(config.location_max_age())
        .context("location max age out of range")?;
    let controller = QueryController::new(LocationCache::new(max_age), config.fallback_location);

    let single = query.is_some();
    let (actions_tx, actions_rx) = mpsc::channel(16);
    let (prompt_tx, prompt_rx) = watch::channel(None);
    let presenter = TerminalPresenter::new(
        io::stdout(),
        actions_tx.clone(),
        prompt_tx,
        opts.consent,
        single,
    );
    let session = Session::new(
        controller,
        channel,
        device,
        SystemClock,
        presenter,
        SessionConfig {
            location_timeout: config.location_timeout(),
            response_timeout: config.response_timeout(),
        },
    );

    if let Some(query) = query {
        actions_tx.send(UserAction::Submit(query)).await?;
    }
    tokio::spawn(route_input(spawn_stdin_reader(), prompt_rx, actions_tx, !single));

    Ok(session.run(actions_rx).await)
}

fn device(opts: &SearchOpts) -> anyhow::Result<FixedGeolocator> {
    let position = match (opts.lat, opts.lng) {
        (Some(lat), Some(lng)) => {
            let coordinate = Coordinate::new(lat, lng);
            if !coordinate.is_valid() {
                anyhow::bail!("{coordinate} is not a valid coordinate");
            }
            Ok(coordinate)
        }
        _ => Err(LocationError::PositionUnavailable),
    };
    let device = match opts.permission {
        PermissionArg::Granted => FixedGeolocator::new(PermissionState::Granted, position),
        PermissionArg::Prompt => FixedGeolocator::new(PermissionState::Prompt, position),
        PermissionArg::Denied => FixedGeolocator::new(PermissionState::Denied, position),
        PermissionArg::Unsupported => {
            FixedGeolocator::new(PermissionState::Unknown, Err(LocationError::Unsupported))
        }
    };
    Ok(device)
}

/// Reads stdin on a plain thread; a blocking read must not hold up runtime shutdown.
///
/// The returned receiver yields one item per line and ends at end of input.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                return;
            }
        }
    });
    rx
}

/// Turns typed lines into user actions until the session goes away.
///
/// Consent prompts can open at any time, so in `search` mode lines that
/// arrive while no prompt is open are held for the next one, and a prompt
/// that opens after end of input is answered with "continue without location".
async fn route_input(
    mut lines: mpsc::Receiver<String>,
    mut prompt: watch::Receiver<Option<ConsentPrompt>>,
    actions: mpsc::Sender<UserAction>,
    interactive: bool,
) {
    let mut router = LineRouter::new(interactive);
    let mut input_open = true;
    let mut pending = router.on_prompt(*prompt.borrow_and_update());
    loop {
        for action in pending.drain(..) {
            if actions.send(action).await.is_err() {
                return;
            }
        }
        pending = tokio::select! {
            line = lines.recv(), if input_open => {
                let open = *prompt.borrow();
                match line {
                    Some(line) => router.on_line(open, &line),
                    None => {
                        input_open = false;
                        router.on_eof(open)
                    }
                }
            }
            changed = prompt.changed() => {
                if changed.is_err() {
                    return;
                }
                router.on_prompt(*prompt.borrow_and_update())
            }
        };
    }
}

#[derive(Debug, Default)]
struct LineRouter {
    interactive: bool,
    held: VecDeque<String>,
    input_ended: bool,
}

impl LineRouter {
    fn new(interactive: bool) -> Self {
        Self {
            interactive,
            ..Self::default()
        }
    }

    /// A line typed while `open` is the current prompt. An open prompt takes
    /// precedence over queries.
    fn on_line(&mut self, open: Option<ConsentPrompt>, line: &str) -> Vec<UserAction> {
        if let Some(prompt) = open {
            return match parse_answer(prompt, line) {
                Some(choice) => vec![UserAction::Consent(choice)],
                None => {
                    eprintln!("Please answer the location prompt.");
                    Vec::new()
                }
            };
        }
        if !self.interactive {
            self.held.push_back(line.to_owned());
            return Vec::new();
        }
        match line.trim() {
            ":quit" | ":q" => vec![UserAction::Shutdown],
            ":dismiss" => vec![
                UserAction::DismissLocationError,
                UserAction::DismissBackendError,
            ],
            text => vec![UserAction::Submit(text.to_owned())],
        }
    }

    /// The prompt changed to `open`. Held lines are tried first, in order.
    fn on_prompt(&mut self, open: Option<ConsentPrompt>) -> Vec<UserAction> {
        let Some(prompt) = open else {
            return Vec::new();
        };
        while let Some(line) = self.held.pop_front() {
            if let Some(choice) = parse_answer(prompt, &line) {
                return vec![UserAction::Consent(choice)];
            }
        }
        if self.input_ended {
            vec![UserAction::Consent(ConsentChoice::ProceedWithoutLocation)]
        } else {
            Vec::new()
        }
    }

    fn on_eof(&mut self, open: Option<ConsentPrompt>) -> Vec<UserAction> {
        self.input_ended = true;
        if self.interactive {
            return vec![UserAction::Shutdown];
        }
        self.on_prompt(open)
    }
}
