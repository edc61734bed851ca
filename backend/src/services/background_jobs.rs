use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

use crate::services::recurring_tasks::{RecurringTaskError, RecurringTaskScheduler, RecurringTaskState};
use crate::services::reminder_scheduler::{ReminderScheduler, ReminderSchedulerError, ReminderState};
use crate::services::reminders::{self, ReminderError};
use crate::services::schedule_registry::ScheduleRegistry;
use crate::services::todos::{self, TodoError};
use shared::{Reminder, Todo};

#[derive(Debug, Error)]
pub enum BackgroundJobError {
    #[error("Reminder error: {0}")]
    ReminderError(#[from] ReminderError),
    #[error("Todo error: {0}")]
    TodoError(#[from] TodoError),
    #[error("Reminder scheduling error: {0}")]
    ReminderSchedulerError(#[from] ReminderSchedulerError),
    #[error("Recurring task error: {0}")]
    RecurringTaskError(#[from] RecurringTaskError),
}

/// Sent by an elapsed timer to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    ReminderDue { reminder_id: Uuid },
    RecurringTaskDue { task_id: Uuid },
}

/// Report from rebuilding the timers after a start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartReport {
    pub processed_at: Option<DateTime<Utc>>,
    pub reminders_checked: usize,
    pub reminders_armed: usize,
    pub recurring_tasks_checked: usize,
    pub recurring_tasks_armed: usize,
    /// Records that could not be decoded or scheduled
    pub skipped: usize,
}

impl RestartReport {
    pub fn armed(&self) -> usize {
        self.reminders_armed + self.recurring_tasks_armed
    }
}

/// Owns both schedulers and the dispatcher that runs their fire transitions
pub struct ScheduleEngine {
    pool: SqlitePool,
    reminders: ReminderScheduler,
    recurring_tasks: RecurringTaskScheduler,
}

impl ScheduleEngine {
    /// Build the engine and spawn its dispatcher on `runtime`.
    /// Timers are spawned on the same runtime.
    pub fn start(pool: SqlitePool, tz: Tz, runtime: Handle) -> Arc<Self> {
        let (events, receiver) = unbounded_channel();

        let reminders = ReminderScheduler::new(
            pool.clone(),
            ScheduleRegistry::new("reminders", runtime.clone()),
            events.clone(),
            tz,
        );
        let recurring_tasks = RecurringTaskScheduler::new(
            pool.clone(),
            ScheduleRegistry::new("recurring-tasks", runtime.clone()),
            events,
            tz,
        );

        let engine = Arc::new(Self {
            pool,
            reminders,
            recurring_tasks,
        });

        runtime.spawn(run_dispatcher(Arc::downgrade(&engine), receiver));
        log::info!("Schedule engine started with time zone {}", tz);

        engine
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    pub fn recurring_tasks(&self) -> &RecurringTaskScheduler {
        &self.recurring_tasks
    }

    pub async fn schedule_reminder(&self, reminder: &Reminder) -> Result<ReminderState, ReminderSchedulerError> {
        self.reminders.schedule(reminder).await
    }

    pub fn cancel_reminder(&self, reminder_id: &Uuid) -> bool {
        self.reminders.cancel(reminder_id)
    }

    pub fn schedule_recurring_task(&self, task: &Todo, user_id: &str) -> Result<RecurringTaskState, RecurringTaskError> {
        if task.user_id != user_id {
            return Err(RecurringTaskError::PermissionDenied);
        }
        Ok(self.recurring_tasks.schedule(task))
    }

    pub fn cancel_recurring_task(&self, task_id: &Uuid) -> bool {
        self.recurring_tasks.cancel(task_id)
    }

    /// Delete a todo and drop every timer that refers to it
    pub async fn delete_todo(&self, todo_id: &Uuid, user_id: &str) -> Result<(), BackgroundJobError> {
        todos::get_todo_for_user(&self.pool, todo_id, user_id).await?;
        let reminder_ids = reminders::list_reminder_ids_for_todo(&self.pool, todo_id).await?;

        todos::delete_todo(&self.pool, todo_id, user_id).await?;

        self.recurring_tasks.cancel(todo_id);
        for reminder_id in &reminder_ids {
            self.reminders.cancel(reminder_id);
        }
        Ok(())
    }

    /// Re-arm everything that was pending when the process stopped
    pub async fn restart(&self) -> Result<RestartReport, BackgroundJobError> {
        let mut report = RestartReport {
            processed_at: Some(Utc::now()),
            ..Default::default()
        };

        for row in reminders::list_pending_reminder_rows(&self.pool).await? {
            report.reminders_checked += 1;

            let reminder = match row.to_shared() {
                Ok(reminder) => reminder,
                Err(e) => {
                    log::warn!("Skipping reminder {}: {}", row.id, e);
                    report.skipped += 1;
                    continue;
                }
            };

            match self.reminders.schedule(&reminder).await {
                Ok(ReminderState::Armed { .. }) => report.reminders_armed += 1,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Could not restore reminder {}: {}", reminder.id, e);
                    report.skipped += 1;
                }
            }
        }

        for raw_id in todos::list_active_series_ids(&self.pool).await? {
            report.recurring_tasks_checked += 1;

            let series_id = match Uuid::parse_str(&raw_id) {
                Ok(id) => id,
                Err(e) => {
                    log::warn!("Skipping recurring series {}: {}", raw_id, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let latest = match todos::latest_instance(&self.pool, &series_id).await {
                Ok(Some(latest)) => latest,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Could not load the latest instance of series {}: {}", series_id, e);
                    report.skipped += 1;
                    continue;
                }
            };

            if let RecurringTaskState::Armed { .. } = self.recurring_tasks.schedule(&latest) {
                report.recurring_tasks_armed += 1;
            }
        }

        log::info!(
            "Schedules restored: {} of {} reminders and {} of {} recurring tasks armed, {} skipped",
            report.reminders_armed,
            report.reminders_checked,
            report.recurring_tasks_armed,
            report.recurring_tasks_checked,
            report.skipped
        );

        Ok(report)
    }

    /// Returns the number of timers armed
    pub async fn restart_all_schedules(&self) -> Result<usize, BackgroundJobError> {
        Ok(self.restart().await?.armed())
    }

    async fn dispatch(&self, event: ScheduleEvent) {
        match event {
            ScheduleEvent::ReminderDue { reminder_id } => {
                if let Err(e) = self.reminders.fire(&reminder_id).await {
                    log::error!("Error firing reminder {}: {}", reminder_id, e);
                }
            }
            ScheduleEvent::RecurringTaskDue { task_id } => {
                if let Err(e) = self.recurring_tasks.fire(&task_id).await {
                    log::error!("Error creating next instance of task {}: {}", task_id, e);
                }
            }
        }
    }
}

/// Process timer events one at a time until the engine goes away
pub async fn run_dispatcher(engine: Weak<ScheduleEngine>, mut events: UnboundedReceiver<ScheduleEvent>) {
    log::info!("Schedule dispatcher started");

    while let Some(event) = events.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        log::debug!("Dispatching {:?}", event);
        engine.dispatch(event).await;
    }

    log::info!("Schedule dispatcher stopped");
}
