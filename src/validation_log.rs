use chrono::Local;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{ExportError, ExportResult};
use crate::models::{Judgment, Track};

const MAX_NAME_ATTEMPTS: usize = 1000;

/// Identity of one track as it appeared in a validation batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggedTrack {
    pub id: String,
    pub name: String,
    pub artist: String,
}

impl From<&Track> for LoggedTrack {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            artist: track.artist.clone(),
        }
    }
}

/// Audit record for one validation batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationLogEntry {
    /// 1-based batch number within the run
    pub batch_number: usize,
    pub timestamp: String,
    pub tracks: Vec<LoggedTrack>,
    pub prompt: String,
    /// Raw oracle reply, absent when the call itself failed
    pub raw_response: Option<String>,
    /// Judgments assigned to the batch, in track order
    pub results: Vec<Judgment>,
    /// Failure cause when the batch fell back
    pub error: Option<String>,
}

impl ValidationLogEntry {
    pub fn new(batch_number: usize, tracks: &[Track], prompt: impl Into<String>) -> Self {
        Self {
            batch_number,
            timestamp: Local::now().to_rfc3339(),
            tracks: tracks.iter().map(LoggedTrack::from).collect(),
            prompt: prompt.into(),
            raw_response: None,
            results: Vec::new(),
            error: None,
        }
    }
}

/// Append-only destination for validation audit records
pub trait ValidationSink {
    fn record(&self, entry: &ValidationLogEntry);
}

/// Writes each batch to a human-readable log and a JSON Lines log.
///
/// Both files are created fresh per run, suffixed with the run timestamp.
/// Existing logs are never reopened or truncated.
/// Write failures are logged and otherwise ignored.
pub struct ValidationLog {
    text_path: PathBuf,
    json_path: PathBuf,
}

impl ValidationLog {
    pub fn create(dir: impl AsRef<Path>) -> ExportResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| ExportError::CreateDirFailed {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let (text_path, mut text_file, json_path) = Self::claim_paths(dir, &stamp)?;

        let header = format!(
            "Party playlist validation log\nStarted: {}\n{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            "=".repeat(60)
        );
        text_file
            .write_all(header.as_bytes())
            .map_err(|e| write_failed(&text_path, e))?;

        info!("Validation log: {}", text_path.display());
        Ok(Self { text_path, json_path })
    }

    /// Create both log files without touching existing ones. Runs started in
    /// the same second get a `_1`, `_2`, ... suffix.
    fn claim_paths(dir: &Path, stamp: &str) -> ExportResult<(PathBuf, File, PathBuf)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let base = match attempt {
                0 => format!("validation_log_{}", stamp),
                n => format!("validation_log_{}_{}", stamp, n),
            };
            let text_path = dir.join(format!("{}.txt", base));
            let json_path = dir.join(format!("{}.jsonl", base));

            let text_file = match create_new(&text_path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(write_failed(&text_path, e)),
            };
            match create_new(&json_path) {
                Ok(_) => return Ok((text_path, text_file, json_path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    drop(text_file);
                    let _ = fs::remove_file(&text_path);
                }
                Err(e) => return Err(write_failed(&json_path, e)),
            }
        }

        Err(ExportError::WriteFailed {
            path: dir.join(format!("validation_log_{}.txt", stamp)).display().to_string(),
            message: "too many validation logs with the same timestamp".to_string(),
        })
    }

    pub fn text_path(&self) -> &Path {
        &self.text_path
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    fn append(path: &Path, content: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).create(true).open(path)?;
        file.write_all(content.as_bytes())
    }
}

impl ValidationSink for ValidationLog {
    fn record(&self, entry: &ValidationLogEntry) {
        if let Err(e) = Self::append(&self.text_path, &render_entry(entry)) {
            warn!("Failed to write validation log {}: {}", self.text_path.display(), e);
        }

        match serde_json::to_string(entry) {
            Ok(line) => {
                if let Err(e) = Self::append(&self.json_path, &format!("{}\n", line)) {
                    warn!("Failed to write validation log {}: {}", self.json_path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize validation batch {}: {}", entry.batch_number, e),
        }
    }
}

fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

fn write_failed(path: &Path, error: io::Error) -> ExportError {
    ExportError::WriteFailed {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}

fn render_entry(entry: &ValidationLogEntry) -> String {
    let mut out = String::new();
    out.push_str(&format!("\nBatch {} ({})\n", entry.batch_number, entry.timestamp));
    out.push_str(&"-".repeat(60));
    out.push('\n');

    out.push_str("Tracks:\n");
    for (i, track) in entry.tracks.iter().enumerate() {
        out.push_str(&format!("  {}. {} - {} [{}]\n", i + 1, track.name, track.artist, track.id));
    }

    out.push_str("\nPrompt:\n");
    out.push_str(&entry.prompt);
    out.push_str("\n\nResponse:\n");
    out.push_str(entry.raw_response.as_deref().unwrap_or("<no response>"));
    out.push('\n');

    if let Some(error) = &entry.error {
        out.push_str(&format!("\nError: {}\n", error));
    }

    out.push_str("\nResults:\n");
    for (track, result) in entry.tracks.iter().zip(&entry.results) {
        out.push_str(&format!(
            "  {} - {}: {} ({}) {}\n",
            track.name, track.artist, result.party_score, result.recommendation, result.reasoning
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Recommendation;
    use tempfile::TempDir;

    fn entry() -> ValidationLogEntry {
        let tracks = vec![Track::new("t1", "Dancing Queen", "ABBA")];
        let mut entry = ValidationLogEntry::new(1, &tracks, "Rate these tracks");
        entry.raw_response = Some("[{\"party_score\": 9}]".to_string());
        entry.results = vec![Judgment {
            party_score: 9.0,
            reasoning: "Classic floor filler".to_string(),
            recommendation: Recommendation::Yes,
        }];
        entry
    }

    #[test]
    fn test_create_makes_fresh_files() {
        let dir = TempDir::new().unwrap();
        let log = ValidationLog::create(dir.path().join("logs")).unwrap();

        assert!(log.text_path().exists());
        assert!(log.json_path().exists());
        let name = log.text_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("validation_log_"));
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn test_record_appends_to_both_logs() {
        let dir = TempDir::new().unwrap();
        let log = ValidationLog::create(dir.path()).unwrap();

        let first = entry();
        let mut second = entry();
        second.batch_number = 2;
        second.raw_response = None;
        second.error = Some("Oracle call failed: timeout".to_string());

        log.record(&first);
        log.record(&second);

        let text = fs::read_to_string(log.text_path()).unwrap();
        assert!(text.contains("Batch 1"));
        assert!(text.contains("Rate these tracks"));
        assert!(text.contains("Dancing Queen - ABBA: 9 (yes) Classic floor filler"));
        assert!(text.contains("Batch 2"));
        assert!(text.contains("<no response>"));
        assert!(text.contains("Error: Oracle call failed: timeout"));

        let json = fs::read_to_string(log.json_path()).unwrap();
        let lines: Vec<&str> = json.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: ValidationLogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, first);
        let parsed: ValidationLogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.batch_number, 2);
        assert_eq!(parsed.raw_response, None);
    }

    #[test]
    fn test_runs_in_the_same_second_keep_separate_logs() {
        let dir = TempDir::new().unwrap();
        let first = ValidationLog::create(dir.path()).unwrap();
        first.record(&entry());
        let second = ValidationLog::create(dir.path()).unwrap();

        assert_ne!(first.text_path(), second.text_path());
        assert_ne!(first.json_path(), second.json_path());

        let text = fs::read_to_string(first.text_path()).unwrap();
        assert!(text.contains("Batch 1"));
        let json = fs::read_to_string(first.json_path()).unwrap();
        assert_eq!(json.lines().count(), 1);
        assert_eq!(fs::read_to_string(second.json_path()).unwrap(), "");
    }
}
