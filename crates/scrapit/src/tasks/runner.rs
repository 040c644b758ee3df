//! Task runner
//!
//! Walks a persisted task's steps in order, executing each through the
//! action executor. Status transitions are forward-only: a completed,
//! failed, or cancelled task is returned untouched. Steps are mutated in
//! place and the task row is persisted after every step so progress polling
//! sees live state.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use log::{info, warn};
use serde_json::{Map, Value};

use crate::actions::ActionExecutor;
use crate::models::{Task, TaskStatus};
use crate::storage::EmailStore;

/// Execute a task to completion or first failure.
///
/// Step failures end the task as Failed with the error recorded on both the
/// step and the task; the error is carried in the returned task rather than
/// in the Result, which is reserved for infrastructure problems (missing
/// task, storage errors).
pub fn run_task(
    store: &dyn EmailStore,
    executor: &ActionExecutor,
    task_id: i64,
) -> Result<Task> {
    let Some(mut task) = store.get_task(task_id)? else {
        bail!("Task {} not found", task_id);
    };

    if task.status.is_terminal() {
        info!(
            "Task {} already {}, not re-running",
            task.id,
            task.status.as_str()
        );
        return Ok(task);
    }

    info!("Executing task {}: {}", task.id, task.description);

    task.status = TaskStatus::InProgress;
    task.updated_at = Utc::now();
    store.update_task(&task)?;

    let total_steps = task.steps.len();
    let mut completed_steps = 0usize;
    let mut results = Map::new();

    for index in 0..total_steps {
        let step_number = index + 1;

        if task.steps[index].completed {
            completed_steps += 1;
            continue;
        }

        let action = task.steps[index].action.clone();
        info!(
            "Task {}: step {}/{} ({})",
            task.id,
            step_number,
            total_steps,
            action.name()
        );

        match executor.execute(&action) {
            Ok(outcome) => {
                let outcome_json = serde_json::to_value(&outcome)
                    .context("Failed to serialize step outcome")?;
                task.steps[index].completed = true;
                task.steps[index].result = Some(outcome_json.clone());
                results.insert(format!("step_{}", step_number), outcome_json);
                completed_steps += 1;
            }
            Err(e) => {
                warn!(
                    "Task {}: step {}/{} failed: {}",
                    task.id, step_number, total_steps, e
                );
                task.steps[index].error = Some(e.to_string());
                task.status = TaskStatus::Failed;
                task.error = Some(e.to_string());
                task.updated_at = Utc::now();
                store.update_task(&task)?;
                return Ok(task);
            }
        }

        task.progress = if total_steps > 0 {
            ((completed_steps * 100) / total_steps) as u8
        } else {
            100
        };
        task.updated_at = Utc::now();
        store.update_task(&task)?;
    }

    task.status = TaskStatus::Completed;
    task.progress = 100;
    task.result = Some(Value::Object(results));
    task.completed_at = Some(Utc::now());
    task.updated_at = Utc::now();
    store.update_task(&task)?;

    info!("Task {} completed ({} steps)", task.id, total_steps);
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{GmailMessage, ListMessagesResponse};
    use crate::gmail::{ApiError, MailApi};
    use crate::models::{EmailAction, EmailRecord, GmailId, Task, TaskKind, TaskStep};
    use crate::storage::InMemoryStore;
    use std::sync::Arc;

    /// Provider stub: mutations succeed unless the ID list contains "bad"
    struct StubApi;

    impl MailApi for StubApi {
        fn authenticate(&self) -> bool {
            true
        }

        fn list_messages(
            &self,
            _query: Option<&str>,
            _max_results: usize,
            _page_token: Option<&str>,
        ) -> Result<ListMessagesResponse, ApiError> {
            Ok(ListMessagesResponse::default())
        }

        fn get_message(&self, _id: &str) -> Result<GmailMessage, ApiError> {
            Err(ApiError::Status(404))
        }

        fn batch_modify(
            &self,
            ids: &[GmailId],
            _add_labels: &[&str],
            _remove_labels: &[&str],
        ) -> Result<(), ApiError> {
            if ids.iter().any(|id| id.as_str() == "bad") {
                return Err(ApiError::Status(500));
            }
            Ok(())
        }

        fn batch_delete(&self, _ids: &[GmailId]) -> Result<(), ApiError> {
            Ok(())
        }

        fn ensure_label(&self, name: &str) -> Result<String, ApiError> {
            Ok(format!("Label_{}", name))
        }
    }

    fn setup() -> (Arc<InMemoryStore>, ActionExecutor) {
        let store = Arc::new(InMemoryStore::new());
        let email = EmailRecord::builder(1, GmailId::new("m1"))
            .subject("Test")
            .sender("a@example.com")
            .labels(vec!["INBOX".to_string()])
            .build();
        store.commit_batch(&[email]).unwrap();

        let executor = ActionExecutor::new(Arc::new(StubApi), store.clone(), 1);
        (store, executor)
    }

    fn archive_step(id: &str) -> TaskStep {
        TaskStep::new(EmailAction::Archive {
            message_ids: vec![GmailId::new(id)],
        })
    }

    #[test]
    fn test_run_task_to_completion() {
        let (store, executor) = setup();

        let task = store
            .insert_task(Task::new(
                1,
                TaskKind::EmailOrganization,
                "archive everything",
                vec![archive_step("m1"), archive_step("m1")],
            ))
            .unwrap();

        let finished = run_task(store.as_ref(), &executor, task.id).unwrap();
        assert_eq!(finished.status, TaskStatus::Completed);
        assert_eq!(finished.progress, 100);
        assert!(finished.completed_at.is_some());
        assert!(finished.steps.iter().all(|s| s.completed));

        let result = finished.result.unwrap();
        assert!(result.get("step_1").is_some());
        assert!(result.get("step_2").is_some());

        // Terminal state persisted
        let stored = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
    }

    #[test]
    fn test_step_failure_fails_task() {
        let (store, executor) = setup();

        let task = store
            .insert_task(Task::new(
                1,
                TaskKind::EmailCleanup,
                "one good, one bad",
                vec![archive_step("m1"), archive_step("bad"), archive_step("m1")],
            ))
            .unwrap();

        let finished = run_task(store.as_ref(), &executor, task.id).unwrap();
        assert_eq!(finished.status, TaskStatus::Failed);
        assert!(finished.error.is_some());
        assert!(finished.steps[0].completed);
        assert!(!finished.steps[1].completed);
        assert!(finished.steps[1].error.is_some());
        // Third step never ran
        assert!(!finished.steps[2].completed);
    }

    #[test]
    fn test_terminal_task_not_resurrected() {
        let (store, executor) = setup();

        let mut task = Task::new(1, TaskKind::Custom, "done already", vec![archive_step("m1")]);
        task.status = TaskStatus::Completed;
        let task = store.insert_task(task).unwrap();

        let result = run_task(store.as_ref(), &executor, task.id).unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
        // The step was never executed
        assert!(!result.steps[0].completed);
    }

    #[test]
    fn test_completed_steps_skipped_on_rerun() {
        let (store, executor) = setup();

        let mut step_done = archive_step("m1");
        step_done.completed = true;
        let task = store
            .insert_task(Task::new(
                1,
                TaskKind::Custom,
                "partially done",
                vec![step_done, archive_step("m1")],
            ))
            .unwrap();

        let finished = run_task(store.as_ref(), &executor, task.id).unwrap();
        assert_eq!(finished.status, TaskStatus::Completed);
        // Only the second step produced a fresh result
        let result = finished.result.unwrap();
        assert!(result.get("step_1").is_none());
        assert!(result.get("step_2").is_some());
    }

    #[test]
    fn test_missing_task_is_error() {
        let (store, executor) = setup();
        assert!(run_task(store.as_ref(), &executor, 9999).is_err());
    }

    #[test]
    fn test_empty_task_completes() {
        let (store, executor) = setup();
        let task = store
            .insert_task(Task::new(1, TaskKind::Custom, "nothing to do", Vec::new()))
            .unwrap();

        let finished = run_task(store.as_ref(), &executor, task.id).unwrap();
        assert_eq!(finished.status, TaskStatus::Completed);
        assert_eq!(finished.progress, 100);
    }
}
