use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Tasks ──────────────────────────────────────────────────────

/// Lifecycle state of a spawned command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Finished,
    /// The agent restarted while the command was running; the handle is gone.
    Interrupted,
}

impl TaskStatus {
    /// Finished and Interrupted never transition again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Synthetic result recorded for tasks that were running when the agent stopped.
pub const INTERRUPTED_RESULT: &str = "INTERRUPTED: the agent restarted while this command was \
running. Its process handle could not be recovered and no output was captured. \
Spawn the command again if its result is still needed.";

/// Value-only projection of a task: what gets persisted and listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub command: String,
    pub status: TaskStatus,
    pub result: Option<String>,
}

impl TaskView {
    /// Reclassify a task loaded from disk. A `running` task has lost its
    /// process, so it becomes `interrupted` with the synthetic result.
    pub fn reconcile_after_restart(self) -> Self {
        match self.status {
            TaskStatus::Running => Self {
                command: self.command,
                status: TaskStatus::Interrupted,
                result: Some(INTERRUPTED_RESULT.to_owned()),
            },
            TaskStatus::Finished | TaskStatus::Interrupted => self,
        }
    }
}

// ── Conversation ───────────────────────────────────────────────

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// One exchange unit. Persisted verbatim as `{role, parts: [{text}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Model, text)
    }

    /// All parts concatenated.
    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

// ── Outbound messages ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// The agent's reasoning for the current step.
    Thought,
    /// Text the agent addressed to the operator.
    Reply,
    /// Loop-level notices (protocol or transport failures).
    Notice,
}

/// An outbound message for the front end.
#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub kind: MessageKind,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Thought, content)
    }

    pub fn reply(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Reply, content)
    }

    pub fn notice(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Notice, content)
    }
}

// ── Agent status ───────────────────────────────────────────────

/// Where the agent loop currently is within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Starting,
    Collecting,
    Deciding,
    BackingOff,
    Dispatching,
    CoolingDown,
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Collecting => "collecting",
            Self::Deciding => "deciding",
            Self::BackingOff => "backing off",
            Self::Dispatching => "dispatching",
            Self::CoolingDown => "cooling down",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Snapshot broadcast by the agent loop for the status bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStatus {
    pub iteration: u64,
    pub phase: Phase,
    pub running_tasks: usize,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_task_reconciles_to_interrupted() {
        let view = TaskView {
            command: "sleep 100".into(),
            status: TaskStatus::Running,
            result: None,
        };
        let view = view.reconcile_after_restart();
        assert_eq!(view.status, TaskStatus::Interrupted);
        assert_eq!(view.result.as_deref(), Some(INTERRUPTED_RESULT));
    }

    #[test]
    fn terminal_tasks_are_untouched_by_reconcile() {
        let view = TaskView {
            command: "echo hi".into(),
            status: TaskStatus::Finished,
            result: Some("STDOUT:\nhi\n".into()),
        };
        assert_eq!(view.clone().reconcile_after_restart(), view);
    }

    #[test]
    fn turn_serializes_as_role_and_parts() {
        let turn = Turn::model("{\"thought\":\"x\"}");
        let v = serde_json::to_value(&turn).unwrap();
        assert_eq!(v["role"], "model");
        assert_eq!(v["parts"][0]["text"], "{\"thought\":\"x\"}");
    }

    #[test]
    fn task_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TaskStatus::Interrupted).unwrap(), "\"interrupted\"");
        assert!(TaskStatus::Finished.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
