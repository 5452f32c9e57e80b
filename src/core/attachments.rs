//! Staging and validation for files selected for the next send.
//!
//! Every accepted file gets a preview handle backed by a temp-file copy. The
//! staging manager is the only component that allocates or releases those
//! handles; release happens exactly once, on unstage, on session close, or
//! when the send that consumed the file completes.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::core::message::AttachmentMeta;

pub const MAX_FILES_PER_MESSAGE: usize = 1;
pub const MAX_FILE_SIZE: u64 = 15 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
}

impl AttachmentKind {
    /// Map a MIME type onto a kind. Returns `None` for anything outside the
    /// allow-list.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" | "image/png" | "image/gif" | "image/webp" => {
                Some(AttachmentKind::Image)
            }
            "application/pdf" => Some(AttachmentKind::Pdf),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Pdf => "pdf",
        }
    }

    /// Endpoint path for the kind-specific multipart upload.
    pub fn upload_endpoint(self) -> &'static str {
        match self {
            AttachmentKind::Image => "chat/upload/image",
            AttachmentKind::Pdf => "chat/upload/pdf",
        }
    }
}

/// Guess the MIME type of a local file from its extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Revocable preview resource for a staged file. Wraps a temp-file copy of
/// the source; releasing the handle deletes the copy. A handle may only be
/// released once.
#[derive(Debug)]
pub struct PreviewHandle {
    temp: Option<NamedTempFile>,
}

impl PreviewHandle {
    fn allocate(source: &Path) -> io::Result<Self> {
        let temp = NamedTempFile::new()?;
        fs::copy(source, temp.path())?;
        Ok(Self { temp: Some(temp) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.temp.as_ref().map(NamedTempFile::path)
    }

    pub fn is_released(&self) -> bool {
        self.temp.is_none()
    }

    fn release(&mut self) {
        match self.temp.take() {
            Some(temp) => drop(temp),
            None => warn!("preview handle released twice"),
        }
    }
}

#[derive(Debug)]
pub struct StagedFile {
    pub id: u64,
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub kind: AttachmentKind,
    pub mime: &'static str,
    preview: PreviewHandle,
}

impl StagedFile {
    pub fn preview_path(&self) -> Option<&Path> {
        self.preview.path()
    }

    pub fn preview_released(&self) -> bool {
        self.preview.is_released()
    }

    /// Display descriptor carried on the user message that sends this file.
    pub fn attachment_meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            name: self.name.clone(),
            kind: self.kind,
            preview_path: self
                .preview
                .path()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooManyFiles { limit: usize },
    TooLarge { size: u64, limit: u64 },
    UnsupportedType { detail: String },
    Duplicate,
    Unreadable { detail: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooManyFiles { limit } => {
                write!(f, "only {limit} file(s) can be attached per message")
            }
            RejectReason::TooLarge { size, limit } => {
                let size_mb = *size as f64 / (1024.0 * 1024.0);
                let limit_mb = *limit as f64 / (1024.0 * 1024.0);
                write!(f, "file is {size_mb:.1} MB, limit is {limit_mb:.0} MB")
            }
            RejectReason::UnsupportedType { detail } => {
                write!(f, "unsupported file type ({detail}); allowed: jpeg, png, gif, webp, pdf")
            }
            RejectReason::Duplicate => write!(f, "an identical file is already attached"),
            RejectReason::Unreadable { detail } => write!(f, "file could not be read: {detail}"),
        }
    }
}

impl std::error::Error for RejectReason {}

#[derive(Debug)]
pub struct RejectedFile {
    pub name: String,
    pub reason: RejectReason,
}

/// Per-batch outcome: validation failures are per-file and never abort the
/// batch.
#[derive(Debug, Default)]
pub struct StagingReport {
    pub accepted: Vec<u64>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Clone, Copy)]
pub struct StagingPolicy {
    pub max_files: usize,
    pub max_bytes: u64,
}

impl Default for StagingPolicy {
    fn default() -> Self {
        Self {
            max_files: MAX_FILES_PER_MESSAGE,
            max_bytes: MAX_FILE_SIZE,
        }
    }
}

pub struct StagingManager {
    policy: StagingPolicy,
    next_file_id: u64,
}

impl StagingManager {
    pub fn new(policy: StagingPolicy) -> Self {
        Self {
            policy,
            next_file_id: 1,
        }
    }

    /// Validate and stage a batch of candidate files against the given
    /// staging area.
    pub fn stage(&mut self, staged: &mut Vec<StagedFile>, candidates: &[PathBuf]) -> StagingReport {
        let mut report = StagingReport::default();

        for path in candidates {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned());

            if staged.len() >= self.policy.max_files {
                report.rejected.push(RejectedFile {
                    name,
                    reason: RejectReason::TooManyFiles {
                        limit: self.policy.max_files,
                    },
                });
                continue;
            }

            let size = match fs::metadata(path) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    report.rejected.push(RejectedFile {
                        name,
                        reason: RejectReason::Unreadable {
                            detail: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            if size > self.policy.max_bytes {
                report.rejected.push(RejectedFile {
                    name,
                    reason: RejectReason::TooLarge {
                        size,
                        limit: self.policy.max_bytes,
                    },
                });
                continue;
            }

            let kind_for_mime =
                mime_for_path(path).and_then(|m| AttachmentKind::from_mime(m).map(|k| (m, k)));
            let Some((mime, kind)) = kind_for_mime else {
                let detail = path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_else(|| "no extension".to_string());
                report.rejected.push(RejectedFile {
                    name,
                    reason: RejectReason::UnsupportedType { detail },
                });
                continue;
            };

            if staged.iter().any(|f| f.name == name && f.size == size) {
                report.rejected.push(RejectedFile {
                    name,
                    reason: RejectReason::Duplicate,
                });
                continue;
            }

            let preview = match PreviewHandle::allocate(path) {
                Ok(preview) => preview,
                Err(e) => {
                    report.rejected.push(RejectedFile {
                        name,
                        reason: RejectReason::Unreadable {
                            detail: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            let id = self.next_file_id;
            self.next_file_id += 1;
            staged.push(StagedFile {
                id,
                path: path.clone(),
                name,
                size,
                kind,
                mime,
                preview,
            });
            report.accepted.push(id);
        }

        report
    }

    /// Remove one staged file and release its preview handle. Returns false
    /// if no file with that id is staged.
    pub fn unstage(&mut self, staged: &mut Vec<StagedFile>, file_id: u64) -> bool {
        match staged.iter().position(|f| f.id == file_id) {
            Some(index) => {
                let mut file = staged.remove(index);
                file.preview.release();
                true
            }
            None => false,
        }
    }

    /// Release every staged file's preview handle and empty the staging
    /// area. Used on session close and after a completed send.
    pub fn clear_staged(&mut self, staged: &mut Vec<StagedFile>) {
        for file in staged.iter_mut() {
            file.preview.release();
        }
        staged.clear();
    }
}
