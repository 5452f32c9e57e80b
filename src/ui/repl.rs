//! Line-oriented front end over the session engine.
//!
//! One `tokio::select!` loop multiplexes stdin commands, stream events, and
//! side-effect results. All state mutation happens on this loop; spawned
//! tasks only ever talk back through channels, so chunk application order is
//! arrival order and nothing races the generation controller.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::api::models::{display_name, format_context_length, provider_label, supports_vision};
use crate::api::titles::derive_title;
use crate::api::ModelInfo;
use crate::commands::{parse_input, Command, HELP_TEXT};
use crate::core::attachments::StagingManager;
use crate::core::config::Config;
use crate::core::generation::{GenerationController, GenerationOutcome, StreamEvent, StreamMessage};
use crate::core::message::MessageOrigin;
use crate::core::store::{CloseError, SessionId, SessionStore};
use crate::core::tabs::{TabLayout, Zone};
use crate::ui::executors::{
    spawn_models_loader, spawn_rename_persist, spawn_title_refresh, SideEffect,
};
use crate::utils::logging::TranscriptLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct ChatApp {
    pub store: SessionStore,
    pub tabs: TabLayout,
    pub staging: StagingManager,
    pub generation: GenerationController,
    pub logging: TranscriptLog,
    pub models: Vec<ModelInfo>,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    effects_tx: UnboundedSender<SideEffect>,
    notices: Vec<String>,
}

impl ChatApp {
    pub fn new(
        config: &Config,
        logging: TranscriptLog,
        effects_tx: UnboundedSender<SideEffect>,
    ) -> (Self, UnboundedReceiver<StreamEvent>) {
        let client = reqwest::Client::new();
        let (generation, stream_rx) =
            GenerationController::new(client.clone(), config.base_url().to_string());

        let mut store = SessionStore::new();
        let first = store.create_session(config.default_model());
        let tabs = TabLayout::new(first, config.tab_capacity());

        let app = Self {
            store,
            tabs,
            staging: StagingManager::new(config.staging_policy()),
            generation,
            logging,
            models: Vec::new(),
            client,
            base_url: config.base_url().to_string(),
            default_model: config.default_model().to_string(),
            effects_tx,
            notices: Vec::new(),
        };
        (app, stream_rx)
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn notice(&mut self, line: impl Into<String>) {
        self.notices.push(line.into());
    }

    /// Resolve a 1-based `/tabs` number: visible tabs first, then the
    /// overflow list.
    fn tab_at(&self, number: usize) -> Option<SessionId> {
        let index = number.checked_sub(1)?;
        let visible = self.tabs.visible();
        if index < visible.len() {
            Some(visible[index])
        } else {
            self.tabs.overflow().get(index - visible.len()).copied()
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Send(text) => self.send_message(text),
            Command::NewSession => {
                let id = self.store.create_session(&self.default_model);
                self.tabs.add(id);
                self.notice("Opened a new session.");
            }
            Command::Close(number) => self.close_session(number),
            Command::Switch(number) => match self.tab_at(number) {
                Some(id) => {
                    self.tabs.activate(id);
                    self.print_active_header();
                }
                None => self.notice(format!("No tab {number}.")),
            },
            Command::Move(number) => match self.tab_at(number) {
                Some(id) if self.tabs.visible().contains(&id) => {
                    self.tabs.demote(id);
                    if self.tabs.zone_of(id) == Some(Zone::Overflow) {
                        self.notice("Moved to the overflow list.");
                    } else {
                        self.notice("Nothing to swap in; the tab stays visible.");
                    }
                }
                Some(_) => self.notice("Already in the overflow list."),
                None => self.notice(format!("No tab {number}.")),
            },
            Command::Tabs => self.list_tabs(),
            Command::Models => {
                if self.models.is_empty() {
                    spawn_models_loader(
                        self.client.clone(),
                        self.base_url.clone(),
                        self.effects_tx.clone(),
                    );
                    self.notice("Fetching model list...");
                } else {
                    self.list_models();
                }
            }
            Command::SetModel(model) => {
                if !self.models.is_empty() && !self.models.iter().any(|m| m.id == model) {
                    self.notice(format!("Note: '{model}' is not in the fetched catalog."));
                }
                let active = self.tabs.active();
                self.store.update_model(active, &model);
                self.notice(format!("Model set to {model}."));
            }
            Command::Attach(paths) => {
                let active = self.tabs.active();
                let Some(staged) = self.store.attachments_mut(active) else {
                    return Flow::Continue;
                };
                let report = self.staging.stage(staged, &paths);
                for rejected in &report.rejected {
                    self.notices
                        .push(format!("Rejected {}: {}", rejected.name, rejected.reason));
                }
                for id in &report.accepted {
                    self.notices
                        .push(format!("Attached file #{id} to the next message."));
                }
            }
            Command::Unattach(file_id) => {
                let active = self.tabs.active();
                let removed = match self.store.attachments_mut(active) {
                    Some(staged) => self.staging.unstage(staged, file_id),
                    None => false,
                };
                if removed {
                    self.notice(format!("Removed attachment #{file_id}."));
                } else {
                    self.notice(format!("No staged attachment #{file_id}."));
                }
            }
            Command::Rename(title) => self.rename_active(title),
            Command::Stop => {
                let active = self.tabs.active();
                if self.generation.cancel_send(&mut self.store, active) {
                    self.notice("Cancelled; your message is back in the draft.");
                } else {
                    self.notice("Nothing is streaming.");
                }
            }
            Command::Log(path) => {
                let result = match path {
                    Some(path) => self.logging.set_log_file(path),
                    None => self.logging.toggle(),
                };
                match result {
                    Ok(message) => self.notice(message),
                    Err(e) => self.notice(format!("Error: {e}")),
                }
            }
            Command::Help => self.notice(HELP_TEXT),
            Command::Quit => return Flow::Quit,
            Command::Noop => {}
            Command::Unknown(name) => {
                self.notice(format!("Unknown command {name}. Try /help."));
            }
            Command::Invalid { usage } => self.notice(format!("Usage: {usage}")),
        }
        Flow::Continue
    }

    fn send_message(&mut self, text: String) {
        let active = self.tabs.active();
        self.store.update_draft(active, &text);
        match self.generation.send(&mut self.store, active) {
            Ok(()) => {
                if let Err(e) = self.logging.log_entry(&format!("You: {text}")) {
                    warn!("failed to log message: {e}");
                }
            }
            Err(e) => self.notice(format!("Not sent: {e}")),
        }
    }

    fn close_session(&mut self, number: Option<usize>) {
        let target = match number {
            Some(n) => match self.tab_at(n) {
                Some(id) => id,
                None => {
                    self.notice(format!("No tab {n}."));
                    return;
                }
            },
            None => self.tabs.active(),
        };

        if self.store.len() <= 1 {
            self.notice("The last session stays open.");
            return;
        }

        // Tear down any in-flight stream before the session record goes
        // away; its moved-out attachments are released here.
        self.generation
            .abort_for_close(&mut self.store, &mut self.staging, target);

        match self.store.close_session(target) {
            Ok(mut removed) => {
                self.staging.clear_staged(&mut removed.pending_attachments);
                self.tabs.close(target);
                self.notice(format!("Closed \"{}\".", removed.title));
            }
            Err(CloseError::LastSessionBlocked) => {
                self.notice("The last session stays open.");
            }
            Err(CloseError::UnknownSession) => {}
        }
    }

    fn rename_active(&mut self, title: String) {
        let active = self.tabs.active();
        let previous_title = match self.store.get(active) {
            Some(session) => session.title.clone(),
            None => return,
        };
        self.store.rename_title(active, &title);
        spawn_rename_persist(
            self.client.clone(),
            self.base_url.clone(),
            active,
            title.clone(),
            previous_title,
            self.effects_tx.clone(),
        );
        self.notice(format!("Renamed to \"{title}\"."));
    }

    fn list_tabs(&mut self) {
        let mut lines = Vec::new();
        let active = self.tabs.active();
        for (index, id) in self.tabs.visible().iter().enumerate() {
            lines.push(self.tab_line(index + 1, *id, *id == active));
        }
        if !self.tabs.overflow().is_empty() {
            lines.push("  -- overflow --".to_string());
            let offset = self.tabs.visible().len();
            for (index, id) in self.tabs.overflow().iter().enumerate() {
                lines.push(self.tab_line(offset + index + 1, *id, false));
            }
        }
        self.notices.extend(lines);
    }

    fn tab_line(&self, number: usize, id: SessionId, active: bool) -> String {
        let Some(session) = self.store.get(id) else {
            return format!("{number}. <missing>");
        };
        let marker = if active { "*" } else { " " };
        let streaming = if session.generation_in_flight() {
            " [streaming]"
        } else {
            ""
        };
        let staged = if session.pending_attachments.is_empty() {
            String::new()
        } else {
            format!(" [{} file(s)]", session.pending_attachments.len())
        };
        format!("{marker}{number}. {}{streaming}{staged}", session.title)
    }

    fn list_models(&mut self) {
        let mut lines = Vec::new();
        for model in &self.models {
            let mut line = format!(
                "  {} - {} ({})",
                provider_label(&model.id),
                display_name(model),
                model.id
            );
            if let Some(context) = model.context_length {
                line.push_str(&format!(" {}", format_context_length(context)));
            }
            if supports_vision(model) {
                line.push_str(" [vision]");
            }
            lines.push(line);
        }
        self.notices.extend(lines);
    }

    fn print_active_header(&mut self) {
        let active = self.tabs.active();
        let mut lines = Vec::new();
        if let Some(session) = self.store.get(active) {
            lines.push(format!("-- {} ({}) --", session.title, session.model));
            for message in &session.messages {
                let prefix = match message.origin {
                    MessageOrigin::User => "You: ",
                    MessageOrigin::Assistant => "",
                };
                lines.push(format!("{prefix}{}", message.text));
            }
        }
        self.notices.extend(lines);
    }

    /// Route a stream event through the generation controller and turn the
    /// terminal outcomes into user-visible lines and side effects.
    pub fn apply_stream_event(&mut self, event: StreamEvent) -> Vec<String> {
        let session_id = event.session;
        let outcome = self
            .generation
            .handle_event(&mut self.store, &mut self.staging, event);

        match outcome {
            Some(GenerationOutcome::Completed {
                session,
                first_exchange,
            }) => {
                if let Some(record) = self.store.get(session) {
                    if let Some(reply) = record
                        .messages
                        .iter()
                        .rev()
                        .find(|m| m.origin == MessageOrigin::Assistant)
                    {
                        if let Err(e) = self.logging.log_entry(&reply.text) {
                            warn!("failed to log response: {e}");
                        }
                    }
                }
                if first_exchange {
                    spawn_title_refresh(
                        self.client.clone(),
                        self.base_url.clone(),
                        session,
                        self.effects_tx.clone(),
                    );
                }
                Vec::new()
            }
            Some(GenerationOutcome::Failed { error, .. }) => {
                vec![format!(
                    "Error: {error} (your message is back in the draft)"
                )]
            }
            None => {
                debug!(%session_id, "stream event produced no outcome");
                Vec::new()
            }
        }
    }

    pub fn apply_side_effect(&mut self, effect: SideEffect) -> Vec<String> {
        match effect {
            SideEffect::ModelsLoaded { result } => match result {
                Ok(models) => {
                    self.models = models;
                    self.list_models();
                    self.take_notices()
                }
                Err(e) => vec![format!(
                    "Could not load models (falling back to {}): {e}",
                    self.default_model
                )],
            },
            SideEffect::TitleFetched { session, result } => match result {
                Ok(title) => {
                    self.store.rename_title(session, &title);
                    Vec::new()
                }
                Err(e) => {
                    // Best effort only: derive a title from the first user
                    // message instead.
                    debug!(%session, "title fetch failed: {e}");
                    let fallback = self.store.get(session).and_then(|record| {
                        record
                            .messages
                            .iter()
                            .find(|m| m.origin == MessageOrigin::User)
                            .map(|m| derive_title(&m.text))
                    });
                    if let Some(title) = fallback {
                        self.store.rename_title(session, &title);
                    }
                    Vec::new()
                }
            },
            SideEffect::RenamePersisted {
                session,
                previous_title,
                error,
            } => match error {
                Some(e) => {
                    self.store.rename_title(session, &previous_title);
                    vec![format!(
                        "Rename not saved (reverted to \"{previous_title}\"): {e}"
                    )]
                }
                None => Vec::new(),
            },
        }
    }
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run_chat(
    config: Config,
    log_file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let logging = TranscriptLog::new(log_file.or_else(|| config.log_file.clone()))?;
    let (effects_tx, mut effects_rx) = mpsc::unbounded_channel();
    let (mut app, mut stream_rx) = ChatApp::new(&config, logging, effects_tx);

    println!("tabchat - {} (transcript log: {})", config.base_url(), app.logging.status());
    println!("Type a message to chat, /help for commands.");
    spawn_models_loader(
        app.client.clone(),
        app.base_url.clone(),
        app.effects_tx.clone(),
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if app.handle_command(parse_input(&line)) == Flow::Quit {
                            break;
                        }
                        for notice in app.take_notices() {
                            println!("{notice}");
                        }
                    }
                    None => break,
                }
            }
            Some(event) = stream_rx.recv() => {
                // Echo chunk deltas for the active session as they arrive.
                if let StreamMessage::Chunk(text) = &event.message {
                    if event.session == app.tabs.active()
                        && app.store.is_current_stream(event.session, event.stream_id)
                    {
                        print!("{text}");
                        std::io::stdout().flush()?;
                    }
                }
                let completed = matches!(event.message, StreamMessage::End);
                let for_active = event.session == app.tabs.active();
                let output = app.apply_stream_event(event);
                if completed && for_active {
                    println!();
                }
                for line in output {
                    println!("{line}");
                }
            }
            Some(effect) = effects_rx.recv() => {
                for line in app.apply_side_effect(effect) {
                    println!("{line}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn test_app(capacity: usize) -> (ChatApp, UnboundedReceiver<SideEffect>) {
        let config = Config {
            visible_tabs: Some(capacity),
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..Default::default()
        };
        let (effects_tx, effects_rx) = mpsc::unbounded_channel();
        let logging = TranscriptLog::new(None).expect("logging");
        let (app, _stream_rx) = ChatApp::new(&config, logging, effects_tx);
        (app, effects_rx)
    }

    #[test]
    fn starts_with_one_visible_active_session() {
        let (app, _rx) = test_app(2);
        assert_eq!(app.store.len(), 1);
        assert_eq!(app.tabs.visible().len(), 1);
        assert_eq!(app.tabs.zone_of(app.tabs.active()), Some(Zone::Tabs));
    }

    #[test]
    fn new_sessions_spill_into_overflow_at_capacity() {
        let (mut app, _rx) = test_app(2);
        app.handle_command(Command::NewSession);
        app.handle_command(Command::NewSession);

        assert_eq!(app.store.len(), 3);
        assert_eq!(app.tabs.visible().len(), 2);
        assert_eq!(app.tabs.overflow().len(), 1);
        assert_eq!(app.tabs.active(), app.tabs.visible()[1]);
    }

    #[test]
    fn switch_by_number_promotes_overflow() {
        let (mut app, _rx) = test_app(2);
        app.handle_command(Command::NewSession);
        app.handle_command(Command::NewSession);
        app.take_notices();

        // Tab 3 is the overflow session.
        let overflow_id = app.tabs.overflow()[0];
        app.handle_command(Command::Switch(3));
        assert_eq!(app.tabs.active(), overflow_id);
        assert_eq!(app.tabs.zone_of(overflow_id), Some(Zone::Tabs));

        app.handle_command(Command::Switch(9));
        assert!(app.take_notices().iter().any(|n| n.contains("No tab 9")));
    }

    #[test]
    fn closing_the_last_session_is_refused() {
        let (mut app, _rx) = test_app(2);
        app.handle_command(Command::Close(None));

        assert_eq!(app.store.len(), 1);
        assert!(app
            .take_notices()
            .iter()
            .any(|n| n.contains("last session")));
    }

    #[test]
    fn close_releases_staged_previews() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        runtime.block_on(async {
            let (mut app, _rx) = test_app(2);
            let dir = tempdir().expect("tempdir");
            let path = dir.path().join("photo.png");
            std::fs::write(&path, b"bytes").expect("fixture");

            app.handle_command(Command::NewSession);
            app.handle_command(Command::Attach(vec![path]));
            let active = app.tabs.active();
            let preview = app.store.get(active).unwrap().pending_attachments[0]
                .preview_path()
                .expect("preview")
                .to_path_buf();
            assert!(preview.exists());

            app.handle_command(Command::Close(None));
            assert!(!preview.exists());
            assert!(app.store.get(active).is_none());
        });
    }

    #[test]
    fn attach_reports_rejections_alongside_accepts() {
        let (mut app, _rx) = test_app(2);
        let dir = tempdir().expect("tempdir");
        let good = dir.path().join("photo.png");
        std::fs::write(&good, b"bytes").expect("fixture");
        let bad = dir.path().join("notes.txt");
        std::fs::write(&bad, b"bytes").expect("fixture");

        app.handle_command(Command::Attach(vec![good, bad]));
        let notices = app.take_notices();
        assert!(notices.iter().any(|n| n.starts_with("Attached file #")));
        assert!(notices.iter().any(|n| n.contains("Rejected notes.txt")));

        app.handle_command(Command::Unattach(999));
        assert!(app
            .take_notices()
            .iter()
            .any(|n| n.contains("No staged attachment")));
    }

    #[test]
    fn failed_title_fetch_falls_back_to_first_message() {
        let (mut app, _rx) = test_app(2);
        let active = app.tabs.active();
        let mid = app.store.next_message_id();
        app.store.append_message(
            active,
            crate::core::message::Message::user(
                mid,
                "plan a weekend trip to the coast with the dog".to_string(),
                None,
            ),
        );

        let lines = app.apply_side_effect(SideEffect::TitleFetched {
            session: active,
            result: Err("503".to_string()),
        });
        assert!(lines.is_empty());
        assert_eq!(
            app.store.get(active).unwrap().title,
            "plan a weekend trip to the coa..."
        );
    }

    #[test]
    fn failed_rename_persist_reverts_the_title() {
        let (mut app, _rx) = test_app(2);
        let active = app.tabs.active();
        app.store.rename_title(active, "My title");

        let lines = app.apply_side_effect(SideEffect::RenamePersisted {
            session: active,
            previous_title: "New Chat".to_string(),
            error: Some("500".to_string()),
        });
        assert_eq!(app.store.get(active).unwrap().title, "New Chat");
        assert!(lines[0].contains("reverted"));
    }

    #[test]
    fn successful_title_fetch_renames_session() {
        let (mut app, _rx) = test_app(2);
        let active = app.tabs.active();

        app.apply_side_effect(SideEffect::TitleFetched {
            session: active,
            result: Ok("Coast trip".to_string()),
        });
        assert_eq!(app.store.get(active).unwrap().title, "Coast trip");
    }

    #[test]
    fn tabs_listing_marks_active_and_overflow() {
        let (mut app, _rx) = test_app(2);
        app.handle_command(Command::NewSession);
        app.handle_command(Command::NewSession);
        app.take_notices();

        app.handle_command(Command::Tabs);
        let notices = app.take_notices();
        assert_eq!(notices.len(), 4); // two visible, separator, one overflow
        assert!(notices[1].starts_with("*2."));
        assert!(notices[2].contains("overflow"));
    }

    #[test]
    fn unsupported_attach_target_never_panics() {
        let (mut app, _rx) = test_app(2);
        app.handle_command(Command::Attach(vec![PathBuf::from("/definitely/missing.png")]));
        assert!(app
            .take_notices()
            .iter()
            .any(|n| n.contains("could not be read")));
    }
}
