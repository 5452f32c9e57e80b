use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::attachments::AttachmentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    User,
    Assistant,
}

impl MessageOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageOrigin::User => "user",
            MessageOrigin::Assistant => "assistant",
        }
    }
}

/// Descriptor for a file sent alongside a user message. Carries only the
/// display metadata; the preview resource itself stays with the staged file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub name: String,
    pub kind: AttachmentKind,
    pub preview_path: String,
}

/// One entry in a session's transcript. Immutable once `streaming` is false;
/// while true, only the generation controller may rewrite `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub origin: MessageOrigin,
    pub created_at: DateTime<Utc>,
    pub streaming: bool,
    pub attachment: Option<AttachmentMeta>,
}

impl Message {
    pub fn user(id: u64, text: String, attachment: Option<AttachmentMeta>) -> Self {
        Self {
            id,
            text,
            origin: MessageOrigin::User,
            created_at: Utc::now(),
            streaming: false,
            attachment,
        }
    }

    /// Empty assistant placeholder appended at send time and filled in as
    /// stream chunks arrive.
    pub fn assistant_placeholder(id: u64) -> Self {
        Self {
            id,
            text: String::new(),
            origin: MessageOrigin::Assistant,
            created_at: Utc::now(),
            streaming: true,
            attachment: None,
        }
    }
}
