//! Durable state: conversation history and task registry snapshots.
//!
//! Each concern lives in its own JSON file (`conversation.json`, `tasks.json`)
//! and every write goes through a temp file + rename, so a crash mid-write
//! leaves at most one file stale and neither half-written.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::types::{TaskStatus, TaskView, Turn};

pub const CONVERSATION_FILE: &str = "conversation.json";
pub const TASKS_FILE: &str = "tasks.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What a restore produced.
#[derive(Debug, Default)]
pub struct Restored {
    /// `None` on first run; the agent then seeds a bootstrap conversation.
    pub conversation: Option<Vec<Turn>>,
    pub tasks: BTreeMap<String, TaskView>,
    /// Names of tasks that were running when state was last written.
    pub interrupted: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn conversation_path(&self) -> PathBuf {
        self.dir.join(CONVERSATION_FILE)
    }

    fn tasks_path(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    /// Persist conversation turns verbatim and the value-only task views.
    pub fn snapshot(
        &self,
        conversation: &[Turn],
        tasks: &BTreeMap<String, TaskView>,
    ) -> Result<(), StoreError> {
        write_atomic(&self.conversation_path(), conversation)?;
        write_atomic(&self.tasks_path(), tasks)?;
        tracing::debug!(
            turns = conversation.len(),
            tasks = tasks.len(),
            dir = %self.dir.display(),
            "state snapshot written"
        );
        Ok(())
    }

    /// Load persisted state. Every task that was `running` comes back
    /// `interrupted` with a synthetic result; that transition is final.
    pub fn restore(&self) -> Result<Restored, StoreError> {
        let conversation: Option<Vec<Turn>> = read_optional(&self.conversation_path())?;
        let persisted: BTreeMap<String, TaskView> =
            read_optional(&self.tasks_path())?.unwrap_or_default();

        let mut interrupted = Vec::new();
        let tasks = persisted
            .into_iter()
            .map(|(name, view)| {
                if view.status == TaskStatus::Running {
                    interrupted.push(name.clone());
                }
                (name, view.reconcile_after_restart())
            })
            .collect();

        if !interrupted.is_empty() {
            tracing::warn!(tasks = ?interrupted, "tasks interrupted by restart");
        }
        tracing::info!(
            turns = conversation.as_ref().map_or(0, Vec::len),
            fresh = conversation.is_none(),
            "state restored"
        );

        Ok(Restored {
            conversation,
            tasks,
            interrupted,
        })
    }

    /// Move unreadable state files aside (`<name>.corrupt-<timestamp>`) so the
    /// next restore starts fresh. Returns the paths that were moved.
    pub fn quarantine(&self) -> Result<Vec<PathBuf>, StoreError> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let mut moved = Vec::new();
        for path in [self.conversation_path(), self.tasks_path()] {
            if !path.exists() {
                continue;
            }
            let target = path.with_extension(format!("json.corrupt-{stamp}"));
            fs::rename(&path, &target).map_err(|source| StoreError::Io {
                action: "quarantine",
                path: path.clone(),
                source,
            })?;
            tracing::warn!(from = %path.display(), to = %target.display(), "state file quarantined");
            moved.push(target);
        }
        Ok(moved)
    }
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                action: "read",
                path: path.to_owned(),
                source,
            });
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_owned(),
            source,
        })
}

fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |action: &'static str| {
        move |source: std::io::Error| StoreError::Io {
            action,
            path: path.to_owned(),
            source,
        }
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_err("create directory for"))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err("create temp file for"))?;
    serde_json::to_writer_pretty(&mut tmp, value).map_err(|e| StoreError::Io {
        action: "serialize",
        path: path.to_owned(),
        source: e.into(),
    })?;
    tmp.write_all(b"\n").map_err(io_err("write"))?;
    tmp.as_file().sync_all().map_err(io_err("sync"))?;
    tmp.persist(path).map_err(|e| StoreError::Io {
        action: "replace",
        path: path.to_owned(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(command: &str, status: TaskStatus, result: Option<&str>) -> TaskView {
        TaskView {
            command: command.into(),
            status,
            result: result.map(String::from),
        }
    }

    #[test]
    fn first_run_has_no_conversation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("state"));
        let restored = store.restore().expect("restore");
        assert!(restored.conversation.is_none());
        assert!(restored.tasks.is_empty());
    }

    #[test]
    fn round_trip_interrupts_running_tasks_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path());

        let conversation = vec![
            Turn::user("USER_SUGGESTION: explore"),
            Turn::model(r#"{"thought":"look around","action":{"name":"list-tasks","parameters":{}}}"#),
            Turn::user("TOOL_RESULT for 'list-tasks':\nNo tasks."),
        ];
        let mut tasks = BTreeMap::new();
        tasks.insert("task_1".to_string(), task("echo hi", TaskStatus::Finished, Some("STDOUT:\nhi\n")));
        tasks.insert("task_2".to_string(), task("sleep 100", TaskStatus::Running, None));

        store.snapshot(&conversation, &tasks).expect("snapshot");
        let restored = store.restore().expect("restore");

        assert_eq!(restored.conversation.as_deref(), Some(conversation.as_slice()));
        assert_eq!(restored.tasks["task_1"], tasks["task_1"]);
        assert_eq!(restored.tasks["task_2"].status, TaskStatus::Interrupted);
        assert_eq!(
            restored.tasks["task_2"].result.as_deref(),
            Some(crate::types::INTERRUPTED_RESULT)
        );
        assert_eq!(restored.interrupted, vec!["task_2".to_string()]);
    }

    #[test]
    fn persisted_formats_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path());
        let mut tasks = BTreeMap::new();
        tasks.insert("task_1".to_string(), task("true", TaskStatus::Running, None));
        store.snapshot(&[Turn::user("hi")], &tasks).expect("snapshot");

        let conv: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join(CONVERSATION_FILE)).unwrap())
                .unwrap();
        assert_eq!(conv, serde_json::json!([{"role": "user", "parts": [{"text": "hi"}]}]));

        let tasks: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join(TASKS_FILE)).unwrap())
                .unwrap();
        assert_eq!(
            tasks,
            serde_json::json!({"task_1": {"command": "true", "status": "running", "result": null}})
        );
    }

    #[test]
    fn snapshot_replaces_previous_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path());
        store.snapshot(&[Turn::user("one")], &BTreeMap::new()).unwrap();
        store
            .snapshot(&[Turn::user("one"), Turn::model("two")], &BTreeMap::new())
            .unwrap();
        let restored = store.restore().unwrap();
        assert_eq!(restored.conversation.map(|c| c.len()), Some(2));
    }

    #[test]
    fn corrupt_file_is_reported_then_quarantined() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path());
        fs::write(temp.path().join(CONVERSATION_FILE), "{not json").unwrap();

        assert!(matches!(store.restore(), Err(StoreError::Corrupt { .. })));

        let moved = store.quarantine().unwrap();
        assert_eq!(moved.len(), 1);
        assert!(moved[0].exists());
        assert!(store.restore().unwrap().conversation.is_none());
    }
}
