use std::collections::HashSet;

use chrono::Utc;
use rand::Rng;

use crate::stages::{stage_for_progress, FINAL_STAGE};
use crate::types::{RawFile, UploadCounts, UploadStatus, UploadedFile};

const ID_LEN: usize = 8;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Result of applying one driver tick to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The record was removed; the driver should stop.
    Missing,
    /// Non-terminal update applied.
    Advanced(UploadedFile),
    /// This tick completed the record.
    Completed(UploadedFile),
    /// The record was already completed; nothing changed.
    Terminal,
}

impl TickOutcome {
    /// Whether the driver should schedule another tick.
    pub fn keeps_running(&self) -> bool {
        matches!(self, Self::Advanced(_))
    }
}

/// Tracked upload records in submission order, plus every id ever issued.
#[derive(Debug, Default)]
pub struct UploadStore {
    files: Vec<UploadedFile>,
    issued: HashSet<String>,
}

impl UploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fresh record for `raw` and return a copy of it.
    pub fn create(&mut self, raw: RawFile) -> UploadedFile {
        let id = self.fresh_id();
        let file = UploadedFile::from_raw(id, raw);
        self.files.push(file.clone());
        file
    }

    fn fresh_id(&mut self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let id: String = (0..ID_LEN)
                .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
                .collect();
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Apply a driver's accumulated progress to its record.
    pub fn apply_tick(&mut self, id: &str, accumulated: f64) -> TickOutcome {
        let Some(file) = self.files.iter_mut().find(|f| f.id == id) else {
            return TickOutcome::Missing;
        };
        if file.status.is_terminal() {
            return TickOutcome::Terminal;
        }

        // Never move backwards, even if a caller passes a smaller value.
        let progress = accumulated.max(file.progress);
        if progress >= 100.0 {
            file.progress = 100.0;
            file.status = UploadStatus::Completed;
            file.current_stage = FINAL_STAGE;
            file.completed_at = Some(Utc::now());
            TickOutcome::Completed(file.clone())
        } else {
            file.progress = progress;
            file.status = UploadStatus::Processing;
            file.current_stage = stage_for_progress(progress);
            TickOutcome::Advanced(file.clone())
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<UploadedFile> {
        let idx = self.files.iter().position(|f| f.id == id)?;
        Some(self.files.remove(idx))
    }

    pub fn get(&self, id: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn snapshot(&self) -> Vec<UploadedFile> {
        self.files.clone()
    }

    pub fn counts(&self) -> UploadCounts {
        let mut counts = UploadCounts {
            total: self.files.len(),
            ..UploadCounts::default()
        };
        for file in &self.files {
            match file.status {
                UploadStatus::Uploading => counts.uploading += 1,
                UploadStatus::Processing => counts.processing += 1,
                UploadStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
