use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Submission ───────────────────────────────────────────────────────────

/// A file as handed over by the drop zone or file chooser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFile {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Content-type label (e.g. "application/pdf"). May be empty.
    #[serde(rename = "type", default)]
    pub content_type: String,
}

impl RawFile {
    pub fn new(name: impl Into<String>, size: u64, content_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            content_type: content_type.into(),
        }
    }
}

// ── Upload Record ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Set at creation, before the driver's first tick.
    Uploading,
    /// Every non-terminal tick reports this, regardless of stage.
    Processing,
    Completed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// One tracked upload and its simulated processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    /// 0..=100, never decreases.
    pub progress: f64,
    pub status: UploadStatus,
    /// 0 before the first tick, then 1..=4.
    pub current_stage: u8,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadedFile {
    pub(crate) fn from_raw(id: String, raw: RawFile) -> Self {
        Self {
            id,
            name: raw.name,
            size: raw.size,
            content_type: raw.content_type,
            progress: 0.0,
            status: UploadStatus::Uploading,
            current_stage: 0,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Tally of tracked records by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCounts {
    pub total: usize,
    pub uploading: usize,
    pub processing: usize,
    pub completed: usize,
}

// ── Upload Events ────────────────────────────────────────────────────────

/// Broadcast after every observable change to the tracked set.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    Submitted { file: UploadedFile },
    Progress { file: UploadedFile },
    Completed { file: UploadedFile },
    Removed { id: String },
}

impl UploadEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Removed { .. } => "removed",
        }
    }

    pub fn file_id(&self) -> &str {
        match self {
            Self::Submitted { file } | Self::Progress { file } | Self::Completed { file } => {
                &file.id
            }
            Self::Removed { id } => id,
        }
    }

    pub fn file(&self) -> Option<&UploadedFile> {
        match self {
            Self::Submitted { file } | Self::Progress { file } | Self::Completed { file } => {
                Some(file)
            }
            Self::Removed { .. } => None,
        }
    }
}
