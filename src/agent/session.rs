//! Agent Session Management
//!
//! Session identity and the persisted conversation record. The record is
//! rewritten in full after every turn through a temp file and rename, so a
//! crash mid-write leaves the previous snapshot intact.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::error::Result;
use crate::models::message::{Message, SessionMetadata, SessionRecord};

/// Use case recorded when none was chosen or stored
pub const DEFAULT_USE_CASE: &str = "general";

/// Six hex characters, enough to tell sessions in one logs directory apart
pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

/// Identity and file locations of one running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub use_case: String,
    pub provider: String,
    pub log_file: PathBuf,
    pub conversation_file: PathBuf,
}

impl SessionContext {
    pub fn new(logs_dir: &Path, use_case: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::with_id(generate_session_id(), logs_dir, use_case, provider)
    }

    pub fn with_id(
        session_id: impl Into<String>,
        logs_dir: &Path,
        use_case: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            log_file: logs_dir.join(format!("debug_session_{}.log", session_id)),
            conversation_file: logs_dir.join(format!("conversation_{}.json", session_id)),
            session_id,
            use_case: use_case.into(),
            provider: provider.into(),
        }
    }

    /// Metadata stamped with the current time
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            use_case: self.use_case.clone(),
            session_id: self.session_id.clone(),
            provider: self.provider.clone(),
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }

    /// Command line that resumes this session, once its conversation is on disk
    pub fn resume_hint(&self, program: &str) -> Option<String> {
        self.conversation_file
            .is_file()
            .then(|| format!("{} {}", program, self.conversation_file.display()))
    }
}

/// Persisted copy of one session's conversation
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored record with `metadata` and the full `messages` list
    pub fn save(&self, metadata: &SessionMetadata, messages: &[Message]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let record = serde_json::json!({
            "metadata": metadata,
            "messages": messages,
        });
        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        // Persist the rename itself
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!("Conversation saved to {}", self.path.display());
        Ok(())
    }

    /// Read a stored session back.
    ///
    /// Accepts the metadata-wrapped record and the older bare message array.
    /// Missing, unparsable or empty sessions yield `None`.
    pub fn load(path: &Path) -> Option<SessionRecord> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cannot read conversation file {}: {}", path.display(), e);
                return None;
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Error parsing conversation file {}: {}", path.display(), e);
                return None;
            }
        };

        let record = match value {
            Value::Array(_) => serde_json::from_value::<Vec<Message>>(value)
                .map(|messages| SessionRecord {
                    metadata: SessionMetadata::default(),
                    messages,
                }),
            other => serde_json::from_value::<SessionRecord>(other),
        };

        match record {
            Ok(mut record) if !record.messages.is_empty() => {
                if record.metadata.use_case.is_empty() {
                    record.metadata.use_case = DEFAULT_USE_CASE.to_string();
                }
                Some(record)
            }
            Ok(_) => {
                warn!("Conversation file {} has no messages", path.display());
                None
            }
            Err(e) => {
                warn!("Invalid conversation data in {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_context_file_names() {
        let ctx = SessionContext::with_id("abc123", Path::new("/tmp/logs"), "debugging", "gemini");
        assert_eq!(ctx.log_file, PathBuf::from("/tmp/logs/debug_session_abc123.log"));
        assert_eq!(ctx.conversation_file, PathBuf::from("/tmp/logs/conversation_abc123.json"));

        let metadata = ctx.metadata();
        assert_eq!(metadata.session_id, "abc123");
        assert_eq!(metadata.provider, "gemini");
        assert!(!metadata.timestamp.is_empty());
    }

    #[test]
    fn test_resume_hint_requires_saved_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SessionContext::with_id("f00d42", dir.path(), "general", "anthropic");
        assert_eq!(ctx.resume_hint("ai-debugger"), None);

        SessionStore::new(&ctx.conversation_file)
            .save(&ctx.metadata(), &[Message::user("fix it")])
            .unwrap();
        assert_eq!(
            ctx.resume_hint("ai-debugger"),
            Some(format!("ai-debugger {}", ctx.conversation_file.display()))
        );
    }

    #[test]
    fn test_save_then_load_preserves_order_and_use_case() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SessionContext::with_id("a1b2c3", &dir.path().join("logs"), "refactoring", "openai");
        let store = SessionStore::new(&ctx.conversation_file);
        let messages = vec![
            Message::user("fix it"),
            Message::assistant(r#"{"action":"request_file"}"#),
            Message::user("Here is the content of the requested files:\n\n"),
        ];

        store.save(&ctx.metadata(), &messages).unwrap();
        assert!(!ctx.conversation_file.with_extension("json.tmp").exists());

        let loaded = SessionStore::load(store.path()).unwrap();
        assert_eq!(loaded.messages, messages);
        assert_eq!(loaded.metadata.use_case, "refactoring");
        assert_eq!(loaded.metadata.session_id, "a1b2c3");
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("conversation_x.json"));
        let ctx = SessionContext::with_id("x", dir.path(), "general", "anthropic");

        store.save(&ctx.metadata(), &[Message::user("one"), Message::assistant("two")]).unwrap();
        store.save(&ctx.metadata(), &[Message::user("one")]).unwrap();

        let loaded = SessionStore::load(store.path()).unwrap();
        assert_eq!(loaded.messages, vec![Message::user("one")]);
    }

    #[test]
    fn test_load_legacy_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        fs::write(&path, r#"[{"role": "user", "content": "hi"}]"#).unwrap();

        let loaded = SessionStore::load(&path).unwrap();
        assert_eq!(loaded.messages, vec![Message::user("hi")]);
        assert_eq!(loaded.metadata.use_case, DEFAULT_USE_CASE);
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();

        assert!(SessionStore::load(&dir.path().join("missing.json")).is_none());

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{not json").unwrap();
        assert!(SessionStore::load(&garbage).is_none());

        let empty = dir.path().join("empty.json");
        fs::write(&empty, r#"{"metadata": {}, "messages": []}"#).unwrap();
        assert!(SessionStore::load(&empty).is_none());

        let wrong_shape = dir.path().join("wrong.json");
        fs::write(&wrong_shape, r#"{"hello": "world"}"#).unwrap();
        assert!(SessionStore::load(&wrong_shape).is_none());
    }
}
