use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::services::background_jobs::ScheduleEvent;
use crate::services::recurrence::{next_due_date, should_end, start_of_day};
use crate::services::todos::{self, TodoError};
use crate::services::schedule_registry::ScheduleRegistry;
use shared::{RecurrenceInterval, RecurrenceRule, Subtask, Todo, UpdateTodoRequest};

#[derive(Debug, Error)]
pub enum RecurringTaskError {
    #[error("Task does not belong to the requesting user")]
    PermissionDenied,
    #[error("Invalid recurrence rule")]
    InvalidRule,
    #[error(transparent)]
    Todo(#[from] TodoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurringTaskState {
    Idle,
    Armed { fire_at: DateTime<Utc> },
    /// The series produced its last instance
    Ended,
}

/// Creates the next instance of a recurring task when the current one becomes due
pub struct RecurringTaskScheduler {
    pool: SqlitePool,
    registry: Arc<ScheduleRegistry>,
    events: UnboundedSender<ScheduleEvent>,
    tz: Tz,
}

impl RecurringTaskScheduler {
    pub fn new(pool: SqlitePool, registry: Arc<ScheduleRegistry>, events: UnboundedSender<ScheduleEvent>, tz: Tz) -> Self {
        Self {
            pool,
            registry,
            events,
            tz,
        }
    }

    pub fn registry(&self) -> &Arc<ScheduleRegistry> {
        &self.registry
    }

    /// Arm the task for the start of its due day
    pub fn schedule(&self, task: &Todo) -> RecurringTaskState {
        let (Some(due_date), Some(_)) = (task.due_date, task.recurrence.as_ref()) else {
            return RecurringTaskState::Idle;
        };
        let Some(fire_at) = start_of_day(due_date, self.tz) else {
            log::warn!("Task {} has a due date that cannot be placed in {}", task.id, self.tz);
            return RecurringTaskState::Idle;
        };
        if fire_at < Utc::now() {
            log::debug!("Task {} was due on {}, not creating instances for the past", task.id, due_date);
            return RecurringTaskState::Idle;
        }

        let task_id = task.id;
        let events = self.events.clone();
        self.registry.arm(task_id, fire_at, move || {
            if events.send(ScheduleEvent::RecurringTaskDue { task_id }).is_err() {
                log::warn!("Dispatcher is gone, dropping recurring task {}", task_id);
            }
        });
        log::info!("Recurring task {} armed for {}", task_id, fire_at);

        RecurringTaskState::Armed { fire_at }
    }

    /// Handle an elapsed timer by creating the next instance of the series
    pub async fn fire(&self, task_id: &Uuid) -> Result<RecurringTaskState, RecurringTaskError> {
        let Some(task) = todos::get_todo(&self.pool, task_id).await? else {
            log::debug!("Recurring task {} fired after it was deleted", task_id);
            return Ok(RecurringTaskState::Idle);
        };
        let (Some(due_date), Some(rule)) = (task.due_date, task.recurrence.as_ref()) else {
            log::debug!("Task {} is no longer recurring", task_id);
            return Ok(RecurringTaskState::Idle);
        };

        let occurrence = task.recurring_occurrence.unwrap_or(0).saturating_add(1);
        let next = match next_due_date(due_date, rule) {
            Some(next) if !should_end(rule, occurrence, Some(next)) => next,
            _ => {
                log::info!("Recurring series of task {} ended", task_id);
                self.registry.cancel(task_id);
                return Ok(RecurringTaskState::Ended);
            }
        };

        let instance = next_instance(&task, next, occurrence, Utc::now());
        todos::insert_todo(&self.pool, &instance).await?;
        log::info!(
            "Created occurrence {} of task {} due {} as {}",
            occurrence,
            instance.recurring_parent_id.unwrap_or(task.id),
            next,
            instance.id
        );

        Ok(self.schedule(&instance))
    }

    /// Store a task submitted by its owner and start its series
    pub async fn start_series(&self, task: &Todo, user_id: &str) -> Result<Todo, RecurringTaskError> {
        if task.user_id != user_id {
            return Err(RecurringTaskError::PermissionDenied);
        }
        let Some(rule) = &task.recurrence else {
            return Err(RecurringTaskError::InvalidRule);
        };
        validate_rule(rule)?;

        let task = match todos::get_todo(&self.pool, &task.id).await? {
            Some(existing) if existing.user_id != user_id => return Err(RecurringTaskError::PermissionDenied),
            Some(existing) => existing,
            None => {
                let task = Todo {
                    is_recurring_parent: task.recurring_parent_id.is_none(),
                    ..task.clone()
                };
                todos::insert_todo(&self.pool, &task).await?;
                task
            }
        };

        if self.is_latest_instance(&task).await? {
            self.schedule(&task);
        } else {
            log::debug!("Task {} is not the latest instance of its series, leaving it idle", task.id);
        }
        Ok(task)
    }

    /// Apply changes to a task and re-arm it while it still heads its series
    pub async fn update(&self, task_id: &Uuid, user_id: &str, request: &UpdateTodoRequest) -> Result<Todo, RecurringTaskError> {
        if let Some(rule) = &request.recurrence {
            validate_rule(rule)?;
        }

        let task = todos::update_todo(&self.pool, task_id, user_id, request).await?;
        self.registry.cancel(task_id);

        if task.recurrence.is_some() && self.is_latest_instance(&task).await? {
            self.schedule(&task);
        }
        Ok(task)
    }

    /// Stop the whole series of an owned task. The instances stay, their rule is dropped.
    pub async fn stop(&self, task_id: &Uuid, user_id: &str) -> Result<bool, RecurringTaskError> {
        let task = todos::get_todo_for_user(&self.pool, task_id, user_id).await?;
        let series_id = task.recurring_parent_id.unwrap_or(task.id);

        let mut cancelled = false;
        for instance_id in todos::stop_series(&self.pool, &series_id).await? {
            cancelled |= self.registry.cancel(&instance_id);
        }
        log::info!("Recurring series {} stopped", series_id);

        Ok(cancelled)
    }

    pub fn cancel(&self, task_id: &Uuid) -> bool {
        self.registry.cancel(task_id)
    }

    async fn is_latest_instance(&self, task: &Todo) -> Result<bool, TodoError> {
        let series_id = task.recurring_parent_id.unwrap_or(task.id);
        let latest = todos::latest_instance(&self.pool, &series_id).await?;
        Ok(latest.is_some_and(|latest| latest.id == task.id))
    }
}

/// Reject rules that could never produce a next occurrence
pub fn validate_rule(rule: &RecurrenceRule) -> Result<(), RecurringTaskError> {
    // Any date works as a probe since validity does not depend on the start date
    let probe = NaiveDate::from_ymd_opt(2000, 1, 1).ok_or(RecurringTaskError::InvalidRule)?;
    if rule.interval == RecurrenceInterval::Unknown || next_due_date(probe, rule).is_none() {
        return Err(RecurringTaskError::InvalidRule);
    }
    Ok(())
}

/// Build the instance that follows `source` in its series
pub fn next_instance(source: &Todo, due_date: NaiveDate, occurrence: u32, now: DateTime<Utc>) -> Todo {
    Todo {
        id: Uuid::new_v4(),
        user_id: source.user_id.clone(),
        title: source.title.clone(),
        description: source.description.clone(),
        due_date: Some(due_date),
        is_completed: false,
        subtasks: source
            .subtasks
            .iter()
            .map(|subtask| Subtask {
                id: Uuid::new_v4(),
                title: subtask.title.clone(),
                is_completed: false,
            })
            .collect(),
        recurrence: source.recurrence.clone(),
        is_recurring_parent: false,
        recurring_parent_id: Some(source.recurring_parent_id.unwrap_or(source.id)),
        recurring_occurrence: Some(occurrence),
        created_at: now,
        updated_at: now,
    }
}
