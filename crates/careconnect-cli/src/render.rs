//! Terminal rendering of controller state.

use std::io::{self, Write};

use careconnect_client::{
    ConsentChoice, ConsentPrompt, Lifecycle, LocationError, Presenter, QueryController,
    SubmissionId, UserAction,
};
use careconnect_core::{FinalResultSet, LocationResult};
use tokio::sync::{mpsc, watch};

use crate::ConsentArg;

/// Prints only what changed since the previous render.
pub struct TerminalPresenter<W> {
    out: W,
    actions: mpsc::Sender<UserAction>,
    prompt: watch::Sender<Option<ConsentPrompt>>,
    auto_consent: Option<ConsentArg>,
    exit_on_terminal: bool,
    seen: Option<SubmissionId>,
    printed_progress: usize,
    last_lifecycle: Lifecycle,
    last_prompt: Option<ConsentPrompt>,
    last_location_error: Option<LocationError>,
    last_rejected: u64,
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(
        out: W,
        actions: mpsc::Sender<UserAction>,
        prompt: watch::Sender<Option<ConsentPrompt>>,
        auto_consent: Option<ConsentArg>,
        exit_on_terminal: bool,
    ) -> Self {
        Self {
            out,
            actions,
            prompt,
            auto_consent,
            exit_on_terminal,
            seen: None,
            printed_progress: 0,
            last_lifecycle: Lifecycle::Idle,
            last_prompt: None,
            last_location_error: None,
            last_rejected: 0,
        }
    }

    fn draw(&mut self, state: &QueryController) -> io::Result<()> {
        if state.active_id() != self.seen {
            self.seen = state.active_id();
            self.printed_progress = 0;
            self.last_lifecycle = Lifecycle::Idle;
            self.last_location_error = None;
        }

        if state.rejected_while_busy() > self.last_rejected {
            self.last_rejected = state.rejected_while_busy();
            let current = state.active_query().map_or("", |query| query.as_str());
            writeln!(
                self.out,
                "Still searching for \"{current}\". Wait for it to finish before asking again."
            )?;
        }

        let lifecycle = state.lifecycle();
        if lifecycle == Lifecycle::Loading && self.last_lifecycle != Lifecycle::Loading {
            writeln!(self.out, "Searching...")?;
        }

        let progress = state.progress().get(self.printed_progress..).unwrap_or(&[]);
        for message in progress {
            writeln!(self.out, "  {message}")?;
        }
        self.printed_progress += progress.len();

        let prompt = state.consent_prompt();
        if prompt != self.last_prompt {
            self.last_prompt = prompt;
            self.prompt.send_replace(prompt);
            if let Some(prompt) = prompt {
                self.ask(prompt)?;
            }
        }

        let location_error = state.location_error();
        if location_error != self.last_location_error {
            self.last_location_error = location_error;
            if let Some(error) = location_error {
                writeln!(self.out, "Location: {error}")?;
            }
        }

        if lifecycle != self.last_lifecycle {
            self.last_lifecycle = lifecycle;
            self.finish(state)?;
        }
        self.out.flush()
    }

    fn ask(&mut self, prompt: ConsentPrompt) -> io::Result<()> {
        writeln!(self.out, "{}", consent_question(prompt))?;
        match self.auto_consent {
            Some(answer) => {
                let choice = auto_answer(answer, prompt);
                tracing::debug!(?prompt, ?choice, "answering location prompt");
                self.send(UserAction::Consent(choice));
            }
            None => write!(self.out, "{} ", answer_hint(prompt))?,
        }
        Ok(())
    }

    fn finish(&mut self, state: &QueryController) -> io::Result<()> {
        match state.lifecycle() {
            Lifecycle::Completed => {
                let empty = FinalResultSet::default();
                write_results(&mut self.out, state.final_result().unwrap_or(&empty))?;
            }
            Lifecycle::Failed | Lifecycle::TimedOut => {
                let message = state.backend_error().unwrap_or("Search failed.");
                writeln!(self.out, "Error: {message}")?;
            }
            Lifecycle::Idle | Lifecycle::AwaitingLocation | Lifecycle::Loading => return Ok(()),
        }
        if self.exit_on_terminal {
            self.send(UserAction::Shutdown);
        }
        Ok(())
    }

    fn send(&self, action: UserAction) {
        if let Err(e) = self.actions.try_send(action) {
            tracing::warn!(error = %e, "dropped user action");
        }
    }
}

impl<W: Write + Send> Presenter for TerminalPresenter<W> {
    fn render(&mut self, state: &QueryController) {
        if let Err(e) = self.draw(state) {
            tracing::warn!(error = %e, "failed to write to terminal");
        }
    }
}

pub fn consent_question(prompt: ConsentPrompt) -> &'static str {
    match prompt {
        ConsentPrompt::Request => {
            "We'd like to access your location to provide you with the most relevant community resources nearby."
        }
        ConsentPrompt::Update => {
            "Your location information has expired. We'd like to update it to provide you with the most current and relevant community resources nearby."
        }
        ConsentPrompt::Failed(_) => {
            "Location access failed. You can try again or continue without location."
        }
    }
}

fn answer_hint(prompt: ConsentPrompt) -> &'static str {
    match prompt {
        ConsentPrompt::Request | ConsentPrompt::Update => "Allow? [y/n]",
        ConsentPrompt::Failed(_) => "[r]etry or [c]ontinue without location?",
    }
}

/// Non-interactive answer. A failed acquisition is never retried automatically.
pub fn auto_answer(answer: ConsentArg, prompt: ConsentPrompt) -> ConsentChoice {
    match (prompt, answer) {
        (ConsentPrompt::Failed(_), _) | (_, ConsentArg::Without) => {
            ConsentChoice::ProceedWithoutLocation
        }
        (_, ConsentArg::Allow) => ConsentChoice::Allow,
        (_, ConsentArg::Decline) => ConsentChoice::Decline,
    }
}

/// Interprets a line typed while `prompt` is open.
pub fn parse_answer(prompt: ConsentPrompt, line: &str) -> Option<ConsentChoice> {
    let answer = line.trim().to_ascii_lowercase();
    match prompt {
        ConsentPrompt::Request | ConsentPrompt::Update => match answer.as_str() {
            "y" | "yes" | "allow" => Some(ConsentChoice::Allow),
            "n" | "no" | "decline" => Some(ConsentChoice::Decline),
            _ => None,
        },
        ConsentPrompt::Failed(_) => match answer.as_str() {
            "r" | "retry" | "y" | "yes" => Some(ConsentChoice::Retry),
            "c" | "continue" | "n" | "no" => Some(ConsentChoice::ProceedWithoutLocation),
            _ => None,
        },
    }
}

pub fn write_results(out: &mut impl Write, results: &FinalResultSet) -> io::Result<()> {
    if results.is_empty() {
        return writeln!(out, "No resources found.");
    }
    for (i, result) in results.addresses.iter().enumerate() {
        writeln!(out)?;
        write_card(out, i + 1, result)?;
    }
    Ok(())
}

fn write_card(out: &mut impl Write, index: usize, result: &LocationResult) -> io::Result<()> {
    writeln!(out, "{index}. {}", result.address)?;
    if let Some(phone) = &result.phone {
        writeln!(out, "   phone:   {phone}")?;
    }
    if let Some(email) = &result.email {
        writeln!(out, "   email:   {email}")?;
    }
    if let Some(website) = result.website_display() {
        writeln!(out, "   website: {website}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use careconnect_core::{FinalResponse, InboundEvent};
    use chrono::DateTime;

    use super::*;

    fn presenter(
        auto: Option<ConsentArg>,
    ) -> (
        TerminalPresenter<Vec<u8>>,
        mpsc::Receiver<UserAction>,
        watch::Receiver<Option<ConsentPrompt>>,
    ) {
        let (tx, rx) = mpsc::channel(8);
        let (prompt_tx, prompt_rx) = watch::channel(None);
        (
            TerminalPresenter::new(Vec::new(), tx, prompt_tx, auto, true),
            rx,
            prompt_rx,
        )
    }

    fn output(p: &TerminalPresenter<Vec<u8>>) -> String {
        String::from_utf8(p.out.clone()).unwrap()
    }

    #[test]
    fn card_omits_missing_fields_and_strips_scheme() {
        let mut result = LocationResult::new("123 Main St");
        result.website = Some("https://foodbank.example.org".to_owned());
        let mut out = Vec::new();
        write_card(&mut out, 1, &result).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1. 123 Main St"));
        assert!(text.contains("website: foodbank.example.org"));
        assert!(!text.contains("phone"));
        assert!(!text.contains("email"));
    }

    #[test]
    fn empty_result_set_says_so() {
        let mut out = Vec::new();
        write_results(&mut out, &FinalResultSet::default()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No resources found.\n");
    }

    #[test]
    fn failed_prompt_is_never_auto_retried() {
        let failed = ConsentPrompt::Failed(LocationError::Unsupported);
        assert_eq!(
            auto_answer(ConsentArg::Allow, failed),
            ConsentChoice::ProceedWithoutLocation
        );
        assert_eq!(
            auto_answer(ConsentArg::Allow, ConsentPrompt::Request),
            ConsentChoice::Allow
        );
        assert_eq!(
            auto_answer(ConsentArg::Decline, ConsentPrompt::Update),
            ConsentChoice::Decline
        );
    }

    #[test]
    fn typed_answers_depend_on_the_open_prompt() {
        let failed = ConsentPrompt::Failed(LocationError::Timeout);
        assert_eq!(
            parse_answer(ConsentPrompt::Request, " Y "),
            Some(ConsentChoice::Allow)
        );
        assert_eq!(parse_answer(failed, "y"), Some(ConsentChoice::Retry));
        assert_eq!(
            parse_answer(failed, "continue"),
            Some(ConsentChoice::ProceedWithoutLocation)
        );
        assert_eq!(parse_answer(ConsentPrompt::Update, "maybe"), None);
    }

    #[test]
    fn prints_progress_once_and_shuts_down_on_completion() {
        let (mut p, mut actions, _prompt) = presenter(None);
        let mut state = QueryController::default();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let Some(careconnect_client::Command::CheckPermission(id)) = state.submit("food bank", now)
        else {
            panic!("expected a permission check");
        };
        state.permission_resolved(id, None, now);
        p.render(&state);
        state.consent(ConsentChoice::Decline);
        state.handle_event(InboundEvent::update("Searching shelters..."));
        p.render(&state);
        p.render(&state);
        state.handle_event(InboundEvent::FinalRes(FinalResponse::success(
            r#"{"addresses":[{"address":"123 Main St"}]}"#,
        )));
        p.render(&state);

        let text = output(&p);
        assert_eq!(text.matches("Searching shelters...").count(), 1);
        assert!(text.contains("1. 123 Main St"));
        assert_eq!(actions.try_recv().unwrap(), UserAction::Shutdown);
    }

    #[test]
    fn busy_submission_is_reported() {
        let (mut p, _actions, _prompt) = presenter(None);
        let mut state = QueryController::default();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        state.submit("shelter", now);
        p.render(&state);
        state.submit("food bank", now);
        p.render(&state);
        p.render(&state);

        let text = output(&p);
        assert_eq!(text.matches("Still searching for \"shelter\"").count(), 1);
    }

    #[test]
    fn auto_consent_answers_the_prompt() {
        let (mut p, mut actions, prompt) = presenter(Some(ConsentArg::Without));
        let mut state = QueryController::default();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let Some(careconnect_client::Command::CheckPermission(id)) = state.submit("shelter", now)
        else {
            panic!("expected a permission check");
        };
        state.permission_resolved(id, None, now);
        p.render(&state);

        assert_eq!(*prompt.borrow(), Some(ConsentPrompt::Request));
        assert_eq!(
            actions.try_recv().unwrap(),
            UserAction::Consent(ConsentChoice::ProceedWithoutLocation)
        );
    }
}
