//! Drives one request/response cycle per send action.
//!
//! The controller owns the per-send state machine (Sending -> Streaming ->
//! Completed | Cancelled | Failed) and is the only component that touches a
//! streaming message's text or flips its `streaming` flag. Network I/O runs
//! on a spawned task that reports back over an unbounded channel, tagged
//! with the stream id it belongs to; events from superseded streams are
//! dropped on arrival.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ChatRequest;
use crate::core::attachments::{AttachmentKind, StagedFile, StagingManager};
use crate::core::message::Message;
use crate::core::store::{SessionId, SessionStore};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

#[derive(Debug)]
pub struct StreamEvent {
    pub session: SessionId,
    pub stream_id: u64,
    pub message: StreamMessage,
}

/// File part of a multipart upload send. Points at the staged file's
/// preview copy, which stays alive until the send reaches a terminal state.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub preview_path: PathBuf,
    pub file_name: String,
    pub mime: &'static str,
    pub kind: AttachmentKind,
}

#[derive(Debug)]
pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub model: String,
    pub session_id: SessionId,
    pub prompt: String,
    pub upload: Option<UploadPart>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// Pull a maximal valid UTF-8 prefix out of the byte buffer, leaving any
/// incomplete trailing sequence for the next chunk.
fn drain_valid_utf8(buffer: &mut Vec<u8>) -> Option<String> {
    let valid_len = match std::str::from_utf8(buffer) {
        Ok(_) => buffer.len(),
        Err(e) => e.valid_up_to(),
    };
    if valid_len == 0 {
        return None;
    }
    let tail = buffer.split_off(valid_len);
    let head = std::mem::replace(buffer, tail);
    Some(String::from_utf8(head).expect("prefix length came from the validator"))
}

/// Condense an HTTP error body into a single line. The backend wraps
/// failures as JSON with an `error`/`message`/`detail` field; anything else
/// is passed through trimmed.
fn error_summary(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<no body>".to_string();
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["error", "message", "detail"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.split_whitespace().collect::<Vec<_>>().join(" ");
            }
        }
    }
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Issue the one outbound request for a send and feed the streamed
    /// reply back as events. Cancellation is observed at every suspension
    /// point; a cancelled task exits without emitting further events.
    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                model,
                session_id,
                prompt,
                upload,
                cancel_token,
                stream_id,
            } = params;

            let send_event = |message: StreamMessage| {
                let _ = tx.send(StreamEvent {
                    session: session_id,
                    stream_id,
                    message,
                });
            };

            tokio::select! {
                _ = async {
                    let request = match upload {
                        Some(part) => {
                            let url = construct_api_url(&base_url, part.kind.upload_endpoint());
                            let bytes = match tokio::fs::read(&part.preview_path).await {
                                Ok(bytes) => bytes,
                                Err(e) => {
                                    send_event(StreamMessage::Error(format!(
                                        "could not read attachment: {e}"
                                    )));
                                    send_event(StreamMessage::End);
                                    return;
                                }
                            };
                            let file_part = match reqwest::multipart::Part::bytes(bytes)
                                .file_name(part.file_name.clone())
                                .mime_str(part.mime)
                            {
                                Ok(file_part) => file_part,
                                Err(e) => {
                                    send_event(StreamMessage::Error(e.to_string()));
                                    send_event(StreamMessage::End);
                                    return;
                                }
                            };
                            let form = reqwest::multipart::Form::new()
                                .text("model", model)
                                .text("sessionId", session_id.to_string())
                                .text("prompt", prompt)
                                .part("file", file_part);
                            client.post(url).multipart(form)
                        }
                        None => {
                            let url = construct_api_url(&base_url, "chat");
                            client.post(url).json(&ChatRequest {
                                message: prompt,
                                model,
                                session_id: session_id.to_string(),
                            })
                        }
                    };

                    match request.send().await {
                        Ok(response) => {
                            if !response.status().is_success() {
                                let status = response.status();
                                let body = response
                                    .text()
                                    .await
                                    .unwrap_or_else(|_| String::new());
                                send_event(StreamMessage::Error(format!(
                                    "request failed ({status}): {}",
                                    error_summary(&body)
                                )));
                                send_event(StreamMessage::End);
                                return;
                            }

                            // The reply is raw text chunks with no framing;
                            // the only terminator is stream close.
                            let mut stream = response.bytes_stream();
                            let mut buffer: Vec<u8> = Vec::new();

                            while let Some(chunk) = stream.next().await {
                                if cancel_token.is_cancelled() {
                                    return;
                                }
                                match chunk {
                                    Ok(bytes) => {
                                        buffer.extend_from_slice(&bytes);
                                        if let Some(text) = drain_valid_utf8(&mut buffer) {
                                            send_event(StreamMessage::Chunk(text));
                                        }
                                    }
                                    Err(e) => {
                                        send_event(StreamMessage::Error(e.to_string()));
                                        send_event(StreamMessage::End);
                                        return;
                                    }
                                }
                            }

                            if !buffer.is_empty() {
                                send_event(StreamMessage::Chunk(
                                    String::from_utf8_lossy(&buffer).into_owned(),
                                ));
                            }
                            send_event(StreamMessage::End);
                        }
                        Err(e) => {
                            send_event(StreamMessage::Error(e.to_string()));
                            send_event(StreamMessage::End);
                        }
                    }
                } => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The session already has a generation in flight; the send is refused.
    GenerationInFlight,
    /// Neither draft text nor staged attachments to send.
    NothingToSend,
    UnknownSession,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::GenerationInFlight => {
                write!(f, "a response is already streaming in this session")
            }
            SendError::NothingToSend => write!(f, "nothing to send"),
            SendError::UnknownSession => write!(f, "no such session"),
        }
    }
}

impl std::error::Error for SendError {}

#[derive(Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed {
        session: SessionId,
        first_exchange: bool,
    },
    Failed {
        session: SessionId,
        error: String,
    },
}

/// Everything needed to undo a send: the pre-send draft and staged files,
/// and where the transcript ended before the optimistic append.
struct PendingSend {
    draft_backup: String,
    attachments: Vec<StagedFile>,
    base_len: usize,
    assistant_msg_id: u64,
    accumulator: String,
    first_exchange: bool,
}

pub struct GenerationController {
    service: ChatStreamService,
    client: reqwest::Client,
    base_url: String,
    pending: HashMap<SessionId, PendingSend>,
    next_stream_id: u64,
}

impl GenerationController {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (service, rx) = ChatStreamService::new();
        (
            Self {
                service,
                client,
                base_url,
                pending: HashMap::new(),
                next_stream_id: 0,
            },
            rx,
        )
    }

    /// Guard the send and apply the optimistic update: append the finalized
    /// user message and the streaming placeholder, clear the draft and the
    /// staging area, and record the rollback snapshot. Runs synchronously,
    /// before any network suspension, so the transcript reflects the send
    /// immediately.
    pub fn begin_send(
        &mut self,
        store: &mut SessionStore,
        id: SessionId,
    ) -> Result<StreamParams, SendError> {
        let session = store.get(id).ok_or(SendError::UnknownSession)?;
        if session.generation_in_flight() {
            return Err(SendError::GenerationInFlight);
        }
        let prompt = session.draft_input.trim().to_string();
        if prompt.is_empty() && session.pending_attachments.is_empty() {
            return Err(SendError::NothingToSend);
        }

        let base_len = session.messages.len();
        let first_exchange = base_len == 0;
        let model = session.model.clone();

        let draft_backup = store.take_draft(id);
        let attachments = store.take_attachments(id);
        let meta = attachments.first().map(StagedFile::attachment_meta);
        let upload = attachments.first().map(|file| UploadPart {
            preview_path: file
                .preview_path()
                .unwrap_or(&file.path)
                .to_path_buf(),
            file_name: file.name.clone(),
            mime: file.mime,
            kind: file.kind,
        });

        let user_msg_id = store.next_message_id();
        store.append_message(id, Message::user(user_msg_id, prompt.clone(), meta));
        let assistant_msg_id = store.next_message_id();
        store.append_message(id, Message::assistant_placeholder(assistant_msg_id));

        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        let cancel_token = CancellationToken::new();
        store.mark_generation_started(id, cancel_token.clone(), stream_id);

        self.pending.insert(
            id,
            PendingSend {
                draft_backup,
                attachments,
                base_len,
                assistant_msg_id,
                accumulator: String::new(),
                first_exchange,
            },
        );

        Ok(StreamParams {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model,
            session_id: id,
            prompt,
            upload,
            cancel_token,
            stream_id,
        })
    }

    /// Full send: optimistic update plus the spawned network stream.
    pub fn send(&mut self, store: &mut SessionStore, id: SessionId) -> Result<(), SendError> {
        let params = self.begin_send(store, id)?;
        self.service.spawn_stream(params);
        Ok(())
    }

    /// User-initiated stop. Signals the cancellation token and undoes the
    /// send; the in-flight task observes the token at its next suspension
    /// point and exits without further events.
    pub fn cancel_send(&mut self, store: &mut SessionStore, id: SessionId) -> bool {
        let Some(token) = store.cancel_token(id) else {
            return false;
        };
        token.cancel();
        self.rollback(store, id);
        true
    }

    /// Tear down any in-flight generation ahead of a session close. The
    /// staged files moved out by the send are released here since there is
    /// no session left to restore them to.
    pub fn abort_for_close(
        &mut self,
        store: &mut SessionStore,
        staging: &mut StagingManager,
        id: SessionId,
    ) {
        if let Some(token) = store.cancel_token(id) {
            token.cancel();
        }
        if let Some(mut pending) = self.pending.remove(&id) {
            staging.clear_staged(&mut pending.attachments);
        }
        store.clear_generation(id);
    }

    /// Apply one stream event to the store. Returns an outcome for the
    /// terminal states so the caller can surface errors and run the
    /// title-refresh side effect.
    pub fn handle_event(
        &mut self,
        store: &mut SessionStore,
        staging: &mut StagingManager,
        event: StreamEvent,
    ) -> Option<GenerationOutcome> {
        let StreamEvent {
            session,
            stream_id,
            message,
        } = event;

        if !store.is_current_stream(session, stream_id) {
            debug!(%session, stream_id, "dropping event for superseded stream");
            return None;
        }

        match message {
            StreamMessage::Chunk(text) => {
                let pending = self.pending.get_mut(&session)?;
                pending.accumulator.push_str(&text);
                store.replace_streaming_text(session, pending.assistant_msg_id, &pending.accumulator);
                None
            }
            StreamMessage::End => {
                let mut pending = self.pending.remove(&session)?;
                store.finish_streaming(session, pending.assistant_msg_id);
                store.clear_generation(session);
                staging.clear_staged(&mut pending.attachments);
                Some(GenerationOutcome::Completed {
                    session,
                    first_exchange: pending.first_exchange,
                })
            }
            StreamMessage::Error(error) => {
                self.rollback(store, session);
                Some(GenerationOutcome::Failed { session, error })
            }
        }
    }

    /// Undo the optimistic update: drop exactly the messages this send
    /// appended and put the pre-send draft and staged files back. The
    /// in-flight marker is cleared unconditionally so the session is always
    /// left sendable.
    fn rollback(&mut self, store: &mut SessionStore, id: SessionId) {
        if let Some(pending) = self.pending.remove(&id) {
            store.truncate_messages(id, pending.base_len);
            store.update_draft(id, &pending.draft_backup);
            store.restore_attachments(id, pending.attachments);
        }
        store.clear_generation(id);
    }
}
