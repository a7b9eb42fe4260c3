//! Task state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a task does. The orchestrator itself is agnostic; the kind is
/// bookkeeping for callers polling the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Extract vocabulary from a fetched article.
    Extraction,
    /// Create or extend a themed vocabulary list.
    TopicCreation,
    /// Generate pronunciation audio.
    AudioGeneration,
    /// Push entries to the flashcard deck.
    DeckSync,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Extraction => "extraction",
            Self::TopicCreation => "topic_creation",
            Self::AudioGeneration => "audio_generation",
            Self::DeckSync => "deck_sync",
        };
        write!(f, "{s}")
    }
}

/// State of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, not yet picked up by a worker.
    Pending,
    /// A worker is executing the job body.
    Running,
    /// Job body returned normally; `result` is set.
    Completed,
    /// Job body errored; `error` is set.
    Failed,
}

impl TaskState {
    /// Check if this state allows transitioning to another state.
    /// The lifecycle never moves backward and never skips `Running`.
    pub fn can_transition_to(&self, target: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, target),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A unit of background work. Owned exclusively by the orchestrator's task
/// table; callers only ever see cloned snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a fresh pending task.
    pub fn new(kind: TaskKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: TaskState::Pending,
            progress: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Transition to a new state. `completed_at` is set exactly once, at the
    /// first terminal transition.
    pub fn transition_to(&mut self, new_state: TaskState) -> Result<(), String> {
        if !self.status.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status, new_state
            ));
        }
        self.status = new_state;
        if new_state.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(TaskState::Pending.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Completed));
        assert!(TaskState::Running.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn invalid_transitions() {
        assert!(!TaskState::Pending.can_transition_to(TaskState::Completed));
        assert!(!TaskState::Pending.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Completed.can_transition_to(TaskState::Running));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Running));
        assert!(!TaskState::Completed.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Running.can_transition_to(TaskState::Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn completed_at_set_once() {
        let mut task = Task::new(TaskKind::Extraction);
        assert!(task.completed_at.is_none());

        task.transition_to(TaskState::Running).unwrap();
        assert!(task.completed_at.is_none());

        task.transition_to(TaskState::Completed).unwrap();
        let first = task.completed_at.unwrap();

        // Any further transition attempt fails and never touches the stamp.
        assert!(task.transition_to(TaskState::Failed).is_err());
        assert_eq!(task.completed_at, Some(first));
    }

    #[test]
    fn serializes_with_snake_case_fields() {
        let task = Task::new(TaskKind::TopicCreation);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"], "topic_creation");
        assert_eq!(json["status"], "pending");
        // Absent optionals are omitted from the payload
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("completed_at").is_none());
    }
}
