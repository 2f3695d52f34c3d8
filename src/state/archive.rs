use crate::state::transcript::Message;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Durable transcript storage, one JSON file per student identity.
///
/// Only closed messages are ever written; the caller snapshots the transcript
/// after a turn completes, never mid-stream.
pub struct TranscriptArchive {
    dir: PathBuf,
}

impl TranscriptArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn save(&self, student: &str, messages: &[Message]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating archive dir {}", self.dir.display()))?;
        let path = self.student_path(student);
        let json = serde_json::to_string_pretty(messages)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing transcript archive {}", path.display()))?;
        Ok(())
    }

    /// Missing archives read as an empty transcript.
    pub fn load(&self, student: &str) -> Result<Vec<Message>> {
        let path = self.student_path(student);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("reading transcript archive {}", path.display()))
            }
        };
        serde_json::from_str(&json)
            .with_context(|| format!("parsing transcript archive {}", path.display()))
    }

    fn student_path(&self, student: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_student(student)))
    }
}

/// Student identities come from the environment; keep filenames tame.
fn sanitize_student(student: &str) -> String {
    let cleaned: String = student
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::transcript::Transcript;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = TranscriptArchive::new(dir.path());

        let mut transcript = Transcript::new();
        transcript.push_user("What is osmosis?".to_string());
        let ticket = transcript.begin_assistant();
        transcript.append_open(ticket, "Movement of water across a membrane.");
        transcript.close_open(ticket, None);

        archive.save("sam", transcript.messages()).unwrap();
        let restored = archive.load("sam").unwrap();
        assert_eq!(restored, transcript.messages());
    }

    #[test]
    fn test_missing_archive_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let archive = TranscriptArchive::new(dir.path());
        assert!(archive.load("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_student_names_are_sanitized_for_filenames() {
        assert_eq!(sanitize_student("sam jones"), "sam_jones");
        assert_eq!(sanitize_student("../evil"), "___evil");
        assert_eq!(sanitize_student(""), "default");
    }
}
