//! Task orchestrator: in-memory task table plus a bounded worker pool.
//!
//! Tasks are records in a `RwLock<HashMap>`; the pool is a `Semaphore` with
//! one permit per worker. A submitted job stays `pending` while queued on the
//! semaphore and flips to `running` only once a permit is held, so callers
//! polling a saturated pool observe honest status.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, TaskError};

use super::model::{Task, TaskKind, TaskState};

/// Default number of concurrent workers.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Coordinates background jobs: creates task records, runs job bodies on a
/// bounded pool, and serves status snapshots to pollers.
///
/// Task records live only in memory. A restart forgets everything; pollers
/// holding stale ids get `TaskError::NotFound`.
pub struct TaskOrchestrator {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    handles: RwLock<HashMap<Uuid, JoinHandle<()>>>,
    pool: Arc<Semaphore>,
    max_workers: usize,
}

impl TaskOrchestrator {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            handles: RwLock::new(HashMap::new()),
            pool: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Create a new pending task and return its id.
    pub async fn create_task(&self, kind: TaskKind) -> Uuid {
        let task = Task::new(kind);
        let id = task.id;
        self.tasks.write().await.insert(id, task);
        debug!(%id, %kind, "Task created");
        id
    }

    /// Submit the job body for a pending task.
    ///
    /// Runs the body at most once per task id: a second call for the same id
    /// fails with `AlreadyStarted`. The body is spawned immediately but waits
    /// on the worker pool; the task transitions to `running` only after a
    /// permit is acquired. Panics in the body are caught and recorded as
    /// failures.
    pub async fn run<F>(&self, id: Uuid, job: F) -> Result<(), TaskError>
    where
        F: Future<Output = Result<serde_json::Value, Error>> + Send + 'static,
    {
        {
            let tasks = self.tasks.read().await;
            let task = tasks.get(&id).ok_or(TaskError::NotFound { id })?;
            if task.status != TaskState::Pending {
                return Err(TaskError::InvalidTransition {
                    id,
                    from: task.status,
                    to: TaskState::Running,
                });
            }
        }

        // The handle table is the at-most-once gate: holding its write lock
        // across the check and the insert closes the race between two
        // concurrent `run` calls for the same id.
        let mut handles = self.handles.write().await;
        if handles.contains_key(&id) {
            return Err(TaskError::AlreadyStarted { id });
        }

        let tasks = Arc::clone(&self.tasks);
        let pool = Arc::clone(&self.pool);
        let handle = tokio::spawn(async move {
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                // Semaphore closed means we are shutting down; the shutdown
                // path marks unfinished tasks failed.
                Err(_) => return,
            };

            if !mark_running(&tasks, id).await {
                return;
            }

            // Run the body on its own task so a panic surfaces as a
            // JoinError instead of tearing down the worker.
            let outcome = match tokio::spawn(job).await {
                Ok(result) => result,
                Err(join_err) => Err(Error::Task(TaskError::Panicked {
                    id,
                    message: join_err.to_string(),
                })),
            };

            finish(&tasks, id, outcome).await;
        });
        handles.insert(id, handle);
        Ok(())
    }

    /// Snapshot a task's current state.
    pub async fn get_task(&self, id: Uuid) -> Result<Task, TaskError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TaskError::NotFound { id })
    }

    /// Update the free-form progress note. Only meaningful while the task is
    /// running; ignored otherwise.
    pub async fn set_progress(&self, id: Uuid, message: impl Into<String>) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id) {
            if task.status == TaskState::Running {
                task.progress = Some(message.into());
            }
        }
    }

    /// Number of task records currently held.
    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Drop task records older than `max_age`, regardless of state. Returns
    /// how many were removed.
    ///
    /// Sweeping does not cancel work: a running job whose record was swept
    /// finishes normally and its final transition is a no-op.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| task.created_at >= cutoff);
        let removed = before - tasks.len();
        drop(tasks);

        // Tidy the handle table alongside the records.
        self.handles
            .write()
            .await
            .retain(|_, handle| !handle.is_finished());

        if removed > 0 {
            info!(removed, "Swept old task records");
        }
        removed
    }

    /// Stop accepting work and mark every unfinished task failed.
    pub async fn shutdown(&self) {
        self.pool.close();

        let handles: Vec<(Uuid, JoinHandle<()>)> =
            self.handles.write().await.drain().collect();
        for (_, handle) in &handles {
            handle.abort();
        }

        let mut tasks = self.tasks.write().await;
        for task in tasks.values_mut() {
            if !task.status.is_terminal() {
                if task.status == TaskState::Pending {
                    let _ = task.transition_to(TaskState::Running);
                }
                if task.transition_to(TaskState::Failed).is_ok() {
                    task.error = Some("Shut down before completion".to_string());
                }
            }
        }
        let unfinished = handles.len();
        if unfinished > 0 {
            warn!(aborted = unfinished, "Orchestrator shut down with tasks in flight");
        }
    }
}

async fn mark_running(tasks: &RwLock<HashMap<Uuid, Task>>, id: Uuid) -> bool {
    let mut tasks = tasks.write().await;
    match tasks.get_mut(&id) {
        Some(task) => match task.transition_to(TaskState::Running) {
            Ok(()) => true,
            Err(reason) => {
                warn!(%id, reason, "Skipping job for task no longer pending");
                false
            }
        },
        // Swept while queued.
        None => {
            debug!(%id, "Task record gone before job start");
            false
        }
    }
}

async fn finish(
    tasks: &RwLock<HashMap<Uuid, Task>>,
    id: Uuid,
    outcome: Result<serde_json::Value, Error>,
) {
    let mut tasks = tasks.write().await;
    let Some(task) = tasks.get_mut(&id) else {
        debug!(%id, "Task record gone before job finished");
        return;
    };
    match outcome {
        Ok(result) => {
            if task.transition_to(TaskState::Completed).is_ok() {
                task.result = Some(result);
                task.progress = None;
                info!(%id, kind = %task.kind, "Task completed");
            }
        }
        Err(err) => {
            if task.transition_to(TaskState::Failed).is_ok() {
                task.error = Some(err.to_string());
                task.progress = None;
                error!(%id, kind = %task.kind, error = %err, "Task failed");
            }
        }
    }
}

/// Spawn a loop that periodically drops task records older than `max_age`.
pub fn spawn_sweep_task(orchestrator: Arc<TaskOrchestrator>, max_age: Duration) {
    tokio::spawn(async move {
        let period = Duration::from_secs(15 * 60);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            orchestrator.sweep(max_age).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn wait_for_terminal(orch: &TaskOrchestrator, id: Uuid) -> Task {
        for _ in 0..200 {
            let task = orch.get_task(id).await.unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never reached a terminal state");
    }

    #[tokio::test]
    async fn create_and_poll_successful_task() {
        let orch = TaskOrchestrator::new(2);
        let id = orch.create_task(TaskKind::Extraction).await;

        let task = orch.get_task(id).await.unwrap();
        assert_eq!(task.status, TaskState::Pending);
        assert!(task.result.is_none());

        orch.run(id, async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(json!({"new_words": 3}))
        })
        .await
        .unwrap();

        // While the body sleeps the task is running or still queued.
        let mid = orch.get_task(id).await.unwrap();
        assert!(matches!(mid.status, TaskState::Running | TaskState::Pending));

        let done = wait_for_terminal(&orch, id).await;
        assert_eq!(done.status, TaskState::Completed);
        assert_eq!(done.result, Some(json!({"new_words": 3})));
        assert!(done.error.is_none());
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_job_records_error() {
        let orch = TaskOrchestrator::new(1);
        let id = orch.create_task(TaskKind::DeckSync).await;
        orch.run(id, async {
            Err(Error::Task(TaskError::NotFound { id: Uuid::nil() }))
        })
        .await
        .unwrap();

        let done = wait_for_terminal(&orch, id).await;
        assert_eq!(done.status, TaskState::Failed);
        assert!(done.error.is_some());
        assert!(done.result.is_none());
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn panicking_job_becomes_failed() {
        let orch = TaskOrchestrator::new(1);
        let id = orch.create_task(TaskKind::AudioGeneration).await;
        orch.run(id, async { panic!("boom") }).await.unwrap();

        let done = wait_for_terminal(&orch, id).await;
        assert_eq!(done.status, TaskState::Failed);
        assert!(done.error.is_some());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let orch = TaskOrchestrator::new(1);
        let missing = Uuid::new_v4();
        assert!(matches!(
            orch.get_task(missing).await,
            Err(TaskError::NotFound { .. })
        ));
        assert!(matches!(
            orch.run(missing, async { Ok(json!({})) }).await,
            Err(TaskError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn run_is_at_most_once() {
        let orch = TaskOrchestrator::new(1);
        let id = orch.create_task(TaskKind::Extraction).await;
        orch.run(id, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!({}))
        })
        .await
        .unwrap();

        let second = orch.run(id, async { Ok(json!({})) }).await;
        assert!(matches!(
            second,
            Err(TaskError::AlreadyStarted { .. }) | Err(TaskError::InvalidTransition { .. })
        ));

        wait_for_terminal(&orch, id).await;
        // Re-running a finished task is rejected too.
        let third = orch.run(id, async { Ok(json!({})) }).await;
        assert!(third.is_err());
    }

    #[tokio::test]
    async fn saturated_pool_queues_jobs_as_pending() {
        let orch = TaskOrchestrator::new(1);
        let gate = Arc::new(tokio::sync::Notify::new());

        let first = orch.create_task(TaskKind::Extraction).await;
        let release = Arc::clone(&gate);
        orch.run(first, async move {
            release.notified().await;
            Ok(json!({"slot": 1}))
        })
        .await
        .unwrap();

        // Wait until the first job actually holds the only permit.
        for _ in 0..100 {
            if orch.get_task(first).await.unwrap().status == TaskState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(orch.get_task(first).await.unwrap().status, TaskState::Running);

        let second = orch.create_task(TaskKind::Extraction).await;
        orch.run(second, async { Ok(json!({"slot": 2})) })
            .await
            .unwrap();

        // The second job is queued behind the semaphore, so it stays pending.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            orch.get_task(second).await.unwrap().status,
            TaskState::Pending
        );

        gate.notify_one();
        assert_eq!(
            wait_for_terminal(&orch, first).await.status,
            TaskState::Completed
        );
        assert_eq!(
            wait_for_terminal(&orch, second).await.status,
            TaskState::Completed
        );
    }

    #[tokio::test]
    async fn progress_only_updates_running_tasks() {
        let orch = TaskOrchestrator::new(1);
        let id = orch.create_task(TaskKind::TopicCreation).await;

        orch.set_progress(id, "too early").await;
        assert!(orch.get_task(id).await.unwrap().progress.is_none());

        let gate = Arc::new(tokio::sync::Notify::new());
        let release = Arc::clone(&gate);
        orch.run(id, async move {
            release.notified().await;
            Ok(json!({}))
        })
        .await
        .unwrap();

        for _ in 0..100 {
            if orch.get_task(id).await.unwrap().status == TaskState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        orch.set_progress(id, "halfway").await;
        assert_eq!(
            orch.get_task(id).await.unwrap().progress.as_deref(),
            Some("halfway")
        );

        gate.notify_one();
        let done = wait_for_terminal(&orch, id).await;
        // Progress is cleared when the task finishes.
        assert!(done.progress.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_old_records() {
        let orch = TaskOrchestrator::new(1);
        let old = orch.create_task(TaskKind::Extraction).await;
        let fresh = orch.create_task(TaskKind::Extraction).await;

        // Backdate the first record past the cutoff.
        {
            let mut tasks = orch.tasks.write().await;
            tasks.get_mut(&old).unwrap().created_at = Utc::now() - chrono::Duration::hours(48);
        }

        let removed = orch.sweep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(removed, 1);
        assert!(matches!(
            orch.get_task(old).await,
            Err(TaskError::NotFound { .. })
        ));
        assert!(orch.get_task(fresh).await.is_ok());
        assert_eq!(orch.sweep(Duration::from_secs(24 * 3600)).await, 0);
    }

    #[tokio::test]
    async fn shutdown_fails_unfinished_tasks() {
        let orch = TaskOrchestrator::new(1);
        let gate = Arc::new(tokio::sync::Notify::new());

        let stuck = orch.create_task(TaskKind::DeckSync).await;
        let release = Arc::clone(&gate);
        orch.run(stuck, async move {
            release.notified().await;
            Ok(json!({}))
        })
        .await
        .unwrap();
        let queued = orch.create_task(TaskKind::DeckSync).await;

        for _ in 0..100 {
            if orch.get_task(stuck).await.unwrap().status == TaskState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        orch.shutdown().await;

        let stuck = orch.get_task(stuck).await.unwrap();
        assert_eq!(stuck.status, TaskState::Failed);
        assert!(stuck.error.as_deref().unwrap().contains("Shut down"));
        let queued = orch.get_task(queued).await.unwrap();
        assert_eq!(queued.status, TaskState::Failed);
    }
}
