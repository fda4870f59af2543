//! Display helpers for the upload list.

use std::path::Path;

use serde::Serialize;

use crate::stages::{all_stages, Stage};
use crate::types::UploadStatus;

/// Extensions the file chooser offers. The simulator itself accepts anything.
pub const ACCEPTED_EXTENSIONS: [&str; 6] = ["pdf", "docx", "doc", "png", "jpg", "jpeg"];

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human-readable size, base 1024, at most two decimals ("1.5 KB").
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

/// Case-insensitive check of the final extension against [`ACCEPTED_EXTENSIONS`].
pub fn is_accepted(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            ACCEPTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

pub fn progress_percent(progress: f64) -> u8 {
    progress.clamp(0.0, 100.0).round() as u8
}

pub fn status_label(status: UploadStatus) -> &'static str {
    match status {
        UploadStatus::Completed => "Complete",
        UploadStatus::Uploading | UploadStatus::Processing => "Processing...",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageMark {
    #[serde(flatten)]
    pub stage: Stage,
    pub reached: bool,
}

/// Every catalog stage, flagged when `current_stage` has reached it.
pub fn stage_checklist(current_stage: u8) -> Vec<StageMark> {
    all_stages()
        .iter()
        .map(|stage| StageMark {
            stage: *stage,
            reached: current_stage >= stage.id,
        })
        .collect()
}
