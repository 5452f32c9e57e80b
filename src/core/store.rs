//! Authoritative table of chat sessions.
//!
//! All session data is read and mutated through the operations here; no
//! other component holds references into the table. Message-log mutators
//! (`append_message`, `replace_streaming_text`, `finish_streaming`,
//! `truncate_messages`) are reserved for the generation controller, which is
//! the sole writer of a streaming message for the lifetime of its stream.

use std::collections::HashMap;
use std::fmt;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::attachments::StagedFile;
use crate::core::message::Message;

pub const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cancellation handle for the one in-flight generation a session may have.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub messages: Vec<Message>,
    pub draft_input: String,
    pub model: String,
    pub pending_attachments: Vec<StagedFile>,
    stream: Option<StreamHandle>,
}

impl Session {
    fn new(id: SessionId, model: String) -> Self {
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            draft_input: String::new(),
            model,
            pending_attachments: Vec::new(),
            stream: None,
        }
    }

    pub fn generation_in_flight(&self) -> bool {
        self.stream.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseError {
    /// Closing the only remaining session is refused; no state changes.
    LastSessionBlocked,
    UnknownSession,
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseError::LastSessionBlocked => {
                write!(f, "the last remaining session cannot be closed")
            }
            CloseError::UnknownSession => write!(f, "no such session"),
        }
    }
}

impl std::error::Error for CloseError {}

pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    next_message_id: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_message_id: 1,
        }
    }

    pub fn create_session(&mut self, model: &str) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(id, Session::new(id, model.to_string()));
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Remove a session from the table. The removed record is returned so
    /// the caller can release its staged attachments and fix up the tab
    /// partition.
    pub fn close_session(&mut self, id: SessionId) -> Result<Session, CloseError> {
        if !self.sessions.contains_key(&id) {
            return Err(CloseError::UnknownSession);
        }
        if self.sessions.len() <= 1 {
            return Err(CloseError::LastSessionBlocked);
        }
        Ok(self.sessions.remove(&id).expect("presence checked above"))
    }

    pub fn update_draft(&mut self, id: SessionId, text: &str) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.draft_input = text.to_string();
        }
    }

    pub fn update_model(&mut self, id: SessionId, model: &str) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.model = model.to_string();
        }
    }

    pub fn rename_title(&mut self, id: SessionId, title: &str) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.title = title.to_string();
        }
    }

    pub fn next_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    pub fn append_message(&mut self, id: SessionId, message: Message) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.messages.push(message);
        }
    }

    /// Replace the text of a still-streaming assistant message with the
    /// running accumulator. Finalized messages are never touched.
    pub fn replace_streaming_text(&mut self, id: SessionId, message_id: u64, text: &str) {
        if let Some(message) = self.message_mut(id, message_id) {
            if message.streaming {
                message.text = text.to_string();
            }
        }
    }

    pub fn finish_streaming(&mut self, id: SessionId, message_id: u64) {
        if let Some(message) = self.message_mut(id, message_id) {
            message.streaming = false;
        }
    }

    /// Drop every message from `from_index` onward, returning the removed
    /// tail. Used by send rollback to remove exactly the messages that send
    /// appended.
    pub fn truncate_messages(&mut self, id: SessionId, from_index: usize) -> Vec<Message> {
        match self.sessions.get_mut(&id) {
            Some(session) if from_index <= session.messages.len() => {
                session.messages.split_off(from_index)
            }
            _ => Vec::new(),
        }
    }

    fn message_mut(&mut self, id: SessionId, message_id: u64) -> Option<&mut Message> {
        self.sessions
            .get_mut(&id)?
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
    }

    /// Mutable access to a session's staging area, for the staging manager.
    pub fn attachments_mut(&mut self, id: SessionId) -> Option<&mut Vec<StagedFile>> {
        self.sessions.get_mut(&id).map(|s| &mut s.pending_attachments)
    }

    /// Move every staged file out of the session, handles intact. The send
    /// path calls this; rollback puts the files back via
    /// `restore_attachments`.
    pub fn take_attachments(&mut self, id: SessionId) -> Vec<StagedFile> {
        self.sessions
            .get_mut(&id)
            .map(|s| std::mem::take(&mut s.pending_attachments))
            .unwrap_or_default()
    }

    /// Put rolled-back staged files back, ahead of anything staged while
    /// the send was in flight.
    pub fn restore_attachments(&mut self, id: SessionId, mut files: Vec<StagedFile>) {
        if let Some(session) = self.sessions.get_mut(&id) {
            files.append(&mut session.pending_attachments);
            session.pending_attachments = files;
        }
    }

    pub fn take_draft(&mut self, id: SessionId) -> String {
        self.sessions
            .get_mut(&id)
            .map(|s| std::mem::take(&mut s.draft_input))
            .unwrap_or_default()
    }

    pub fn generation_in_flight(&self, id: SessionId) -> bool {
        self.get(id).map(Session::generation_in_flight).unwrap_or(false)
    }

    pub(crate) fn mark_generation_started(
        &mut self,
        id: SessionId,
        cancel_token: CancellationToken,
        stream_id: u64,
    ) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.stream = Some(StreamHandle {
                cancel_token,
                stream_id,
            });
        }
    }

    /// Unconditionally drop the in-flight marker. Runs on every terminal
    /// state so a failed rollback can never leave a session unable to send.
    pub(crate) fn clear_generation(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.stream = None;
        }
    }

    pub(crate) fn cancel_token(&self, id: SessionId) -> Option<CancellationToken> {
        self.get(id)
            .and_then(|s| s.stream.as_ref())
            .map(|h| h.cancel_token.clone())
    }

    /// Whether `stream_id` identifies the session's current in-flight
    /// stream. Events from superseded streams are dropped by this check.
    pub fn is_current_stream(&self, id: SessionId, stream_id: u64) -> bool {
        self.get(id)
            .and_then(|s| s.stream.as_ref())
            .map(|h| h.stream_id == stream_id)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;

    #[test]
    fn create_session_uses_defaults() {
        let mut store = SessionStore::new();
        let id = store.create_session("openai/gpt-4o");
        let session = store.get(id).expect("session exists");

        assert_eq!(session.title, DEFAULT_TITLE);
        assert!(session.messages.is_empty());
        assert!(session.draft_input.is_empty());
        assert_eq!(session.model, "openai/gpt-4o");
        assert!(session.pending_attachments.is_empty());
        assert!(!session.generation_in_flight());
    }

    #[test]
    fn mutators_are_no_ops_for_unknown_ids() {
        let mut store = SessionStore::new();
        let id = store.create_session("m");
        let ghost = SessionId::new();

        store.update_draft(ghost, "text");
        store.update_model(ghost, "other");
        store.rename_title(ghost, "title");
        let mid = store.next_message_id();
        store.append_message(ghost, Message::user(mid, "hi".into(), None));

        let session = store.get(id).expect("session");
        assert!(session.draft_input.is_empty());
        assert_eq!(session.model, "m");
        assert_eq!(session.title, DEFAULT_TITLE);
        assert!(store.get(ghost).is_none());
    }

    #[test]
    fn closing_the_last_session_is_blocked() {
        let mut store = SessionStore::new();
        let only = store.create_session("m");

        assert_eq!(
            store.close_session(only).unwrap_err(),
            CloseError::LastSessionBlocked
        );
        assert_eq!(store.len(), 1);

        let second = store.create_session("m");
        assert!(store.close_session(only).is_ok());
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.close_session(second).unwrap_err(),
            CloseError::LastSessionBlocked
        );
    }

    #[test]
    fn close_returns_the_removed_record() {
        let mut store = SessionStore::new();
        let first = store.create_session("m");
        store.create_session("m");
        store.update_draft(first, "unsent");

        let removed = store.close_session(first).expect("closed");
        assert_eq!(removed.id, first);
        assert_eq!(removed.draft_input, "unsent");
        assert!(store.get(first).is_none());
    }

    #[test]
    fn streaming_text_replacement_only_touches_streaming_messages() {
        let mut store = SessionStore::new();
        let id = store.create_session("m");

        let user_id = store.next_message_id();
        store.append_message(id, Message::user(user_id, "hello".into(), None));
        let assistant_id = store.next_message_id();
        store.append_message(id, Message::assistant_placeholder(assistant_id));

        store.replace_streaming_text(id, assistant_id, "Hel");
        store.replace_streaming_text(id, user_id, "clobbered");

        let session = store.get(id).expect("session");
        assert_eq!(session.messages[0].text, "hello");
        assert_eq!(session.messages[1].text, "Hel");

        store.finish_streaming(id, assistant_id);
        store.replace_streaming_text(id, assistant_id, "late chunk");
        assert_eq!(store.get(id).unwrap().messages[1].text, "Hel");
    }

    #[test]
    fn truncate_messages_removes_exactly_the_tail() {
        let mut store = SessionStore::new();
        let id = store.create_session("m");
        for text in ["one", "two", "three"] {
            let mid = store.next_message_id();
            store.append_message(id, Message::user(mid, text.into(), None));
        }

        let removed = store.truncate_messages(id, 1);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.get(id).unwrap().messages.len(), 1);
        assert_eq!(store.get(id).unwrap().messages[0].text, "one");

        // Out-of-range index leaves the log untouched.
        let removed = store.truncate_messages(id, 5);
        assert!(removed.is_empty());
        assert_eq!(store.get(id).unwrap().messages.len(), 1);
    }

    #[test]
    fn stream_markers_track_the_current_stream() {
        let mut store = SessionStore::new();
        let id = store.create_session("m");
        let token = CancellationToken::new();

        store.mark_generation_started(id, token, 3);
        assert!(store.generation_in_flight(id));
        assert!(store.is_current_stream(id, 3));
        assert!(!store.is_current_stream(id, 2));

        store.clear_generation(id);
        assert!(!store.generation_in_flight(id));
        assert!(!store.is_current_stream(id, 3));
    }
}
