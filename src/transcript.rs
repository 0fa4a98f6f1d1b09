//! Run transcript.
//!
//! Appends each run's captured answer to a markdown file so an answer is
//! never lost to a closed terminal. Strictly best-effort: a write failure is
//! logged and ignored, it never fails the run.

use crate::Result;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File-backed append-only transcript of delivered answers.
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the user's data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("chunk-courier").join("transcript.md"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one run's intent and answer. Errors are surfaced to the
    /// caller only so `record_best_effort` can log them.
    pub fn record(&self, intent: &str, answer: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = format!(
            "## {}\n\n**Intent:** {}\n\n{}\n\n---\n\n",
            Utc::now().to_rfc3339(),
            intent,
            answer
        );
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())?;
        Ok(())
    }

    /// Record without letting a filesystem problem touch the run outcome.
    pub fn record_best_effort(&self, intent: &str, answer: &str) {
        if let Err(e) = self.record(intent, answer) {
            warn!("Failed to write transcript {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_appends() {
        let dir = TempDir::new().unwrap();
        let transcript = Transcript::new(dir.path().join("nested").join("transcript.md"));

        transcript.record("First intent", "First answer").unwrap();
        transcript.record("Second intent", "Second answer").unwrap();

        let text = std::fs::read_to_string(transcript.path()).unwrap();
        assert!(text.contains("First answer"));
        assert!(text.contains("Second answer"));
        assert!(text.find("First answer").unwrap() < text.find("Second answer").unwrap());
    }

    #[test]
    fn test_best_effort_swallows_errors() {
        // A path that cannot be created (file used as directory)
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let transcript = Transcript::new(blocker.join("transcript.md"));
        // Must not panic
        transcript.record_best_effort("intent", "answer");
    }
}
