use crate::db::schema::{Task, TaskStatus};
use crate::db::{Database, TASK_COLUMNS};
use crate::error::DispatchError;
use chrono::{DateTime, Utc};
use tracing::info;

/// A requested transition on a collection task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    Assign { authority_id: i64 },
    Unassign,
    Schedule { scheduled_for: DateTime<Utc> },
    Start,
    Complete {
        collection_proof: Option<String>,
        notes: Option<String>,
    },
    Cancel { reason: Option<String> },
}

/// Pure transition guard: the status the task moves to, or a validation
/// error when the action is not legal from the current state.
pub fn next_status(task: &Task, action: &TaskAction, now: DateTime<Utc>) -> Result<TaskStatus, DispatchError> {
    let invalid = |action_name: &str| {
        Err(DispatchError::Validation(format!(
            "cannot {} task {} in status {:?}",
            action_name, task.id, task.status
        )))
    };
    match action {
        TaskAction::Assign { .. } => match task.status {
            TaskStatus::Pending => Ok(TaskStatus::Assigned),
            _ => invalid("assign"),
        },
        TaskAction::Unassign => match task.status {
            TaskStatus::Assigned => Ok(TaskStatus::Pending),
            _ => invalid("unassign"),
        },
        TaskAction::Schedule { scheduled_for } => {
            if *scheduled_for <= now {
                return Err(DispatchError::Validation(
                    "scheduledFor must be in the future".to_string(),
                ));
            }
            match task.status {
                TaskStatus::Assigned | TaskStatus::Scheduled => Ok(TaskStatus::Scheduled),
                _ => invalid("schedule"),
            }
        }
        TaskAction::Start => match task.status {
            TaskStatus::Assigned | TaskStatus::Scheduled => Ok(TaskStatus::InProgress),
            _ => invalid("start"),
        },
        TaskAction::Complete { .. } => {
            if task.started_at.is_none() {
                return Err(DispatchError::Validation(format!(
                    "task {} was never started",
                    task.id
                )));
            }
            match task.status {
                TaskStatus::InProgress => Ok(TaskStatus::Completed),
                _ => invalid("complete"),
            }
        }
        TaskAction::Cancel { .. } => {
            if task.status.is_terminal() {
                return invalid("cancel");
            }
            Ok(TaskStatus::Cancelled)
        }
    }
}

/// Applies an action to a stored task and returns the updated row.
pub async fn apply_action(
    db: &Database,
    task_id: i64,
    action: TaskAction,
) -> Result<Task, DispatchError> {
    let task = db
        .get_task(task_id)
        .await?
        .ok_or(DispatchError::NotFound("task", task_id))?;
    let status = next_status(&task, &action, Utc::now())?;

    let updated: Task = match &action {
        TaskAction::Assign { authority_id } => {
            sqlx::query_as(&format!(
                r#"
                UPDATE tasks SET status = $2, assigned_to = $3, updated_at = NOW()
                WHERE id = $1 RETURNING {}
            "#,
                TASK_COLUMNS
            ))
            .bind(task_id)
            .bind(status)
            .bind(authority_id)
            .fetch_one(&db.pool())
            .await?
        }
        TaskAction::Unassign => {
            sqlx::query_as(&format!(
                r#"
                UPDATE tasks SET status = $2, assigned_to = NULL, updated_at = NOW()
                WHERE id = $1 RETURNING {}
            "#,
                TASK_COLUMNS
            ))
            .bind(task_id)
            .bind(status)
            .fetch_one(&db.pool())
            .await?
        }
        TaskAction::Schedule { scheduled_for } => {
            sqlx::query_as(&format!(
                r#"
                UPDATE tasks SET status = $2, scheduled_for = $3, updated_at = NOW()
                WHERE id = $1 RETURNING {}
            "#,
                TASK_COLUMNS
            ))
            .bind(task_id)
            .bind(status)
            .bind(scheduled_for)
            .fetch_one(&db.pool())
            .await?
        }
        TaskAction::Start => {
            sqlx::query_as(&format!(
                r#"
                UPDATE tasks SET status = $2, started_at = NOW(), updated_at = NOW()
                WHERE id = $1 RETURNING {}
            "#,
                TASK_COLUMNS
            ))
            .bind(task_id)
            .bind(status)
            .fetch_one(&db.pool())
            .await?
        }
        TaskAction::Complete {
            collection_proof,
            notes,
        } => {
            sqlx::query_as(&format!(
                r#"
                UPDATE tasks SET
                    status = $2,
                    completed_at = NOW(),
                    collection_proof = COALESCE($3, collection_proof),
                    notes = COALESCE($4, notes),
                    updated_at = NOW()
                WHERE id = $1 RETURNING {}
            "#,
                TASK_COLUMNS
            ))
            .bind(task_id)
            .bind(status)
            .bind(collection_proof)
            .bind(notes)
            .fetch_one(&db.pool())
            .await?
        }
        TaskAction::Cancel { reason } => {
            sqlx::query_as(&format!(
                r#"
                UPDATE tasks SET status = $2, cancel_reason = $3, updated_at = NOW()
                WHERE id = $1 RETURNING {}
            "#,
                TASK_COLUMNS
            ))
            .bind(task_id)
            .bind(status)
            .bind(reason)
            .fetch_one(&db.pool())
            .await?
        }
    };

    info!("task {} moved to {:?}", task_id, updated.status);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::TaskPriority;
    use chrono::Duration;

    fn task(status: TaskStatus, started: bool) -> Task {
        let now = Utc::now();
        Task {
            id: 1,
            report_id: 10,
            assigned_to: Some(5),
            status,
            priority: TaskPriority::High,
            lat: 12.97,
            lng: 77.59,
            address: "12 Lake Rd".to_string(),
            city: "Springfield".to_string(),
            state: "Oregon".to_string(),
            locality: "Riverside".to_string(),
            category: "plastic".to_string(),
            scheduled_for: None,
            started_at: started.then_some(now),
            completed_at: None,
            collection_proof: None,
            notes: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn happy_path_transitions() {
        let now = Utc::now();
        let assign = TaskAction::Assign { authority_id: 5 };
        assert_eq!(
            next_status(&task(TaskStatus::Pending, false), &assign, now).unwrap(),
            TaskStatus::Assigned
        );
        let schedule = TaskAction::Schedule {
            scheduled_for: now + Duration::hours(2),
        };
        assert_eq!(
            next_status(&task(TaskStatus::Assigned, false), &schedule, now).unwrap(),
            TaskStatus::Scheduled
        );
        assert_eq!(
            next_status(&task(TaskStatus::Scheduled, false), &TaskAction::Start, now).unwrap(),
            TaskStatus::InProgress
        );
        let complete = TaskAction::Complete {
            collection_proof: None,
            notes: None,
        };
        assert_eq!(
            next_status(&task(TaskStatus::InProgress, true), &complete, now).unwrap(),
            TaskStatus::Completed
        );
    }

    #[test]
    fn start_requires_assigned_or_scheduled() {
        let now = Utc::now();
        for status in [TaskStatus::Pending, TaskStatus::Completed, TaskStatus::Cancelled] {
            let err = next_status(&task(status, false), &TaskAction::Start, now).unwrap_err();
            assert!(matches!(err, DispatchError::Validation(_)));
        }
    }

    #[test]
    fn complete_requires_a_start_timestamp() {
        let now = Utc::now();
        let complete = TaskAction::Complete {
            collection_proof: Some("proof/key.jpg".to_string()),
            notes: None,
        };
        let err = next_status(&task(TaskStatus::InProgress, false), &complete, now).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn schedule_rejects_past_timestamps() {
        let now = Utc::now();
        let schedule = TaskAction::Schedule {
            scheduled_for: now - Duration::minutes(1),
        };
        let err = next_status(&task(TaskStatus::Assigned, false), &schedule, now).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn cancel_is_reachable_from_any_non_terminal_state() {
        let now = Utc::now();
        let cancel = TaskAction::Cancel { reason: None };
        for status in [
            TaskStatus::Pending,
            TaskStatus::Assigned,
            TaskStatus::Scheduled,
            TaskStatus::InProgress,
        ] {
            assert_eq!(
                next_status(&task(status, false), &cancel, now).unwrap(),
                TaskStatus::Cancelled
            );
        }
        for status in [TaskStatus::Completed, TaskStatus::Cancelled] {
            assert!(next_status(&task(status, false), &cancel, now).is_err());
        }
    }

    #[test]
    fn unassign_returns_an_assigned_task_to_pending() {
        let now = Utc::now();
        assert_eq!(
            next_status(&task(TaskStatus::Assigned, false), &TaskAction::Unassign, now).unwrap(),
            TaskStatus::Pending
        );
        assert!(next_status(&task(TaskStatus::Scheduled, false), &TaskAction::Unassign, now).is_err());
    }
}
