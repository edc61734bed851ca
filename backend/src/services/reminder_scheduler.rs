use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::services::background_jobs::ScheduleEvent;
use crate::services::notifications::{self, NotificationError};
use crate::services::recurrence::{local_date, next_occurrence, should_end};
use crate::services::reminders::{self, ReminderError};
use crate::services::schedule_registry::ScheduleRegistry;
use shared::{CreateReminderRequest, RecurrenceRule, Reminder, UpdateReminderRequest};

#[derive(Debug, Error)]
pub enum ReminderSchedulerError {
    #[error(transparent)]
    Reminder(#[from] ReminderError),
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),
}

/// Where a reminder stands after a scheduler transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    /// Nothing armed, the reminder waits for an update
    Idle,
    Armed { fire_at: DateTime<Utc> },
    /// Series finished or one-shot reminder fired
    Terminated,
    Removed,
}

/// Drives reminders through arm, catch-up, fire and termination
pub struct ReminderScheduler {
    pool: SqlitePool,
    registry: Arc<ScheduleRegistry>,
    events: UnboundedSender<ScheduleEvent>,
    tz: Tz,
}

impl ReminderScheduler {
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

    /// Arm a reminder, catching up first when a recurring one lies in the past
    pub async fn schedule(&self, reminder: &Reminder) -> Result<ReminderState, ReminderSchedulerError> {
        if reminder.is_triggered {
            return Ok(ReminderState::Terminated);
        }

        let now = Utc::now();
        if reminder.reminder_date_time >= now {
            return Ok(self.arm(reminder.id, reminder.reminder_date_time));
        }

        match &reminder.recurrence {
            None => {
                log::debug!("Reminder {} is in the past and does not repeat, leaving it idle", reminder.id);
                Ok(ReminderState::Idle)
            }
            Some(rule) => self.catch_up(reminder, rule, now).await,
        }
    }

    /// Skip every occurrence that is already over without notifying, counting
    /// each skipped one against the end condition
    async fn catch_up(
        &self,
        reminder: &Reminder,
        rule: &RecurrenceRule,
        now: DateTime<Utc>,
    ) -> Result<ReminderState, ReminderSchedulerError> {
        let mut candidate = reminder.reminder_date_time;
        let mut occurrence_count = reminder.occurrence_count;

        while candidate <= now {
            let Some(next) = next_occurrence(candidate, rule, self.tz) else {
                log::warn!("Reminder {} has a recurrence that cannot be continued", reminder.id);
                return self.terminate(&reminder.id, now).await;
            };
            occurrence_count = occurrence_count.saturating_add(1);
            if should_end(rule, occurrence_count, Some(local_date(next, self.tz))) {
                log::info!("Reminder {} series ended while catching up", reminder.id);
                return self.terminate(&reminder.id, now).await;
            }
            candidate = next;
        }

        reminders::record_occurrence(&self.pool, &reminder.id, candidate, occurrence_count).await?;
        log::info!(
            "Reminder {} caught up by {} occurrence(s) to {}",
            reminder.id,
            occurrence_count - reminder.occurrence_count,
            candidate
        );

        Ok(self.arm(reminder.id, candidate))
    }

    /// Handle an elapsed timer
    pub async fn fire(&self, reminder_id: &Uuid) -> Result<ReminderState, ReminderSchedulerError> {
        let Some(reminder) = reminders::get_reminder(&self.pool, reminder_id).await? else {
            log::debug!("Reminder {} fired after it was deleted", reminder_id);
            return Ok(ReminderState::Idle);
        };

        let now = Utc::now();
        if reminder.is_triggered {
            log::debug!("Reminder {} fired but was already triggered", reminder_id);
            return Ok(ReminderState::Terminated);
        }
        if reminder.reminder_date_time > now {
            log::debug!("Reminder {} fired but was moved to {}", reminder_id, reminder.reminder_date_time);
            return Ok(self.state_of(reminder_id));
        }

        notifications::create_notification(&self.pool, &reminder).await?;
        log::info!("Reminder {} triggered for user {}", reminder.id, reminder.user_id);

        let Some(rule) = &reminder.recurrence else {
            reminders::mark_triggered(&self.pool, &reminder.id, now).await?;
            return Ok(ReminderState::Terminated);
        };

        let occurrence_count = reminder.occurrence_count.saturating_add(1);
        let next = next_occurrence(reminder.reminder_date_time, rule, self.tz);
        let next = match next {
            Some(next) if !should_end(rule, occurrence_count, Some(local_date(next, self.tz))) => next,
            _ => {
                log::info!("Reminder {} series ended after {} occurrence(s)", reminder.id, occurrence_count);
                return self.terminate(&reminder.id, now).await;
            }
        };

        reminders::record_occurrence(&self.pool, &reminder.id, next, occurrence_count).await?;

        let advanced = Reminder {
            reminder_date_time: next,
            occurrence_count,
            is_triggered: false,
            triggered_at: None,
            ..reminder
        };
        self.schedule(&advanced).await
    }

    pub async fn create(&self, user_id: &str, request: &CreateReminderRequest) -> Result<Reminder, ReminderSchedulerError> {
        let reminder = reminders::create_reminder(&self.pool, user_id, request).await?;
        let state = self.schedule(&reminder).await?;

        if matches!(state, ReminderState::Armed { fire_at } if fire_at == reminder.reminder_date_time) {
            return Ok(reminder);
        }
        // Catch-up may have moved or closed the reminder
        Ok(reminders::get_reminder(&self.pool, &reminder.id).await?.unwrap_or(reminder))
    }

    /// Apply changes to a reminder and re-arm it from its new state
    pub async fn update(
        &self,
        reminder_id: &Uuid,
        user_id: &str,
        request: &UpdateReminderRequest,
    ) -> Result<Reminder, ReminderSchedulerError> {
        let reminder = reminders::update_reminder(&self.pool, reminder_id, user_id, request).await?;
        self.registry.cancel(reminder_id);

        let state = self.schedule(&reminder).await?;
        if matches!(state, ReminderState::Armed { fire_at } if fire_at == reminder.reminder_date_time)
            || state == ReminderState::Idle
        {
            return Ok(reminder);
        }
        Ok(reminders::get_reminder(&self.pool, reminder_id).await?.unwrap_or(reminder))
    }

    pub async fn delete(&self, reminder_id: &Uuid, user_id: &str) -> Result<ReminderState, ReminderSchedulerError> {
        reminders::delete_reminder(&self.pool, reminder_id, user_id).await?;
        self.registry.cancel(reminder_id);
        Ok(ReminderState::Removed)
    }

    pub fn cancel(&self, reminder_id: &Uuid) -> bool {
        self.registry.cancel(reminder_id)
    }

    fn arm(&self, reminder_id: Uuid, fire_at: DateTime<Utc>) -> ReminderState {
        let events = self.events.clone();
        self.registry.arm(reminder_id, fire_at, move || {
            if events.send(ScheduleEvent::ReminderDue { reminder_id }).is_err() {
                log::warn!("Dispatcher is gone, dropping reminder {}", reminder_id);
            }
        });
        log::info!("Reminder {} armed for {}", reminder_id, fire_at);
        ReminderState::Armed { fire_at }
    }

    async fn terminate(&self, reminder_id: &Uuid, now: DateTime<Utc>) -> Result<ReminderState, ReminderSchedulerError> {
        reminders::mark_triggered(&self.pool, reminder_id, now).await?;
        self.registry.cancel(reminder_id);
        Ok(ReminderState::Terminated)
    }

    fn state_of(&self, reminder_id: &Uuid) -> ReminderState {
        match self.registry.fire_time(reminder_id) {
            Some(fire_at) => ReminderState::Armed { fire_at },
            None => ReminderState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{create_test_todo, setup_test_db};
    use chrono::Duration;
    use shared::RecurrenceInterval;
    use tokio::runtime::Handle;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    async fn setup() -> (ReminderScheduler, UnboundedReceiver<ScheduleEvent>, Uuid) {
        let pool = setup_test_db().await;
        let todo = create_test_todo(&pool, "user-1").await;
        let (tx, rx) = unbounded_channel();
        let registry = ScheduleRegistry::new("reminders", Handle::current());
        (ReminderScheduler::new(pool, registry, tx, Tz::UTC), rx, todo.id)
    }

    fn request(todo_id: Uuid, at: DateTime<Utc>, recurrence: Option<RecurrenceRule>) -> CreateReminderRequest {
        CreateReminderRequest {
            todo_id,
            reminder_date_time: at,
            reminder_type: None,
            message: Some("Stretch".to_string()),
            recurrence,
        }
    }

    async fn stored(scheduler: &ReminderScheduler, id: &Uuid) -> Reminder {
        reminders::get_reminder(&scheduler.pool, id).await.unwrap().unwrap()
    }

    async fn notification_count(scheduler: &ReminderScheduler, id: &Uuid) -> usize {
        notifications::list_notifications_for_reminder(&scheduler.pool, id)
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_future_reminder_is_armed() {
        let (scheduler, _rx, todo_id) = setup().await;
        let at = Utc::now() + Duration::hours(2);
        let reminder = reminders::create_reminder(&scheduler.pool, "user-1", &request(todo_id, at, None))
            .await
            .unwrap();

        let state = scheduler.schedule(&reminder).await.unwrap();

        assert_eq!(state, ReminderState::Armed { fire_at: at });
        assert_eq!(scheduler.registry().fire_time(&reminder.id), Some(at));
    }

    #[tokio::test]
    async fn test_past_one_shot_reminder_stays_idle() {
        let (scheduler, _rx, todo_id) = setup().await;
        let at = Utc::now() - Duration::hours(2);
        let reminder = reminders::create_reminder(&scheduler.pool, "user-1", &request(todo_id, at, None))
            .await
            .unwrap();

        let state = scheduler.schedule(&reminder).await.unwrap();

        assert_eq!(state, ReminderState::Idle);
        assert!(!scheduler.registry().has(&reminder.id));
        assert!(!stored(&scheduler, &reminder.id).await.is_triggered);
    }

    #[tokio::test]
    async fn test_catch_up_skips_missed_daily_occurrences() {
        let (scheduler, _rx, todo_id) = setup().await;
        let at = Utc::now() - Duration::days(3) + Duration::hours(1);
        let rule = RecurrenceRule::new(RecurrenceInterval::Daily);
        let reminder = reminders::create_reminder(&scheduler.pool, "user-1", &request(todo_id, at, Some(rule)))
            .await
            .unwrap();

        let state = scheduler.schedule(&reminder).await.unwrap();

        let expected = at + Duration::days(3);
        assert_eq!(state, ReminderState::Armed { fire_at: expected });
        let reminder = stored(&scheduler, &reminder.id).await;
        assert_eq!(reminder.occurrence_count, 3);
        assert_eq!(reminder.reminder_date_time, expected);
        assert_eq!(notification_count(&scheduler, &reminder.id).await, 0);
    }

    #[tokio::test]
    async fn test_catch_up_terminates_when_count_runs_out() {
        let (scheduler, _rx, todo_id) = setup().await;
        let at = Utc::now() - Duration::days(5);
        let rule = RecurrenceRule::new(RecurrenceInterval::Daily).ending_after(2);
        let reminder = reminders::create_reminder(&scheduler.pool, "user-1", &request(todo_id, at, Some(rule)))
            .await
            .unwrap();

        let state = scheduler.schedule(&reminder).await.unwrap();

        assert_eq!(state, ReminderState::Terminated);
        let reminder = stored(&scheduler, &reminder.id).await;
        assert!(reminder.is_triggered);
        assert!(reminder.recurrence.is_none());
        assert!(!scheduler.registry().has(&reminder.id));
    }

    #[tokio::test]
    async fn test_fire_one_shot_reminder() {
        let (scheduler, _rx, todo_id) = setup().await;
        let at = Utc::now() - Duration::seconds(1);
        let reminder = reminders::create_reminder(&scheduler.pool, "user-1", &request(todo_id, at, None))
            .await
            .unwrap();

        let state = scheduler.fire(&reminder.id).await.unwrap();

        assert_eq!(state, ReminderState::Terminated);
        assert_eq!(notification_count(&scheduler, &reminder.id).await, 1);
        let reminder = stored(&scheduler, &reminder.id).await;
        assert!(reminder.is_triggered);
        assert!(reminder.triggered_at.is_some());
    }

    #[tokio::test]
    async fn test_fire_advances_recurring_reminder() {
        let (scheduler, _rx, todo_id) = setup().await;
        let at = Utc::now() - Duration::seconds(1);
        let rule = RecurrenceRule::new(RecurrenceInterval::Weekly);
        let reminder = reminders::create_reminder(&scheduler.pool, "user-1", &request(todo_id, at, Some(rule)))
            .await
            .unwrap();

        let state = scheduler.fire(&reminder.id).await.unwrap();

        let next = at + Duration::days(7);
        assert_eq!(state, ReminderState::Armed { fire_at: next });
        assert_eq!(notification_count(&scheduler, &reminder.id).await, 1);
        let reminder = stored(&scheduler, &reminder.id).await;
        assert_eq!(reminder.occurrence_count, 1);
        assert_eq!(reminder.reminder_date_time, next);
        assert!(!reminder.is_triggered);
    }

    #[tokio::test]
    async fn test_fire_last_occurrence_terminates() {
        let (scheduler, _rx, todo_id) = setup().await;
        let at = Utc::now() - Duration::seconds(1);
        let rule = RecurrenceRule::new(RecurrenceInterval::Daily).ending_after(3);
        let reminder = reminders::create_reminder(&scheduler.pool, "user-1", &request(todo_id, at, Some(rule)))
            .await
            .unwrap();
        reminders::record_occurrence(&scheduler.pool, &reminder.id, at, 2).await.unwrap();

        let state = scheduler.fire(&reminder.id).await.unwrap();

        assert_eq!(state, ReminderState::Terminated);
        assert_eq!(notification_count(&scheduler, &reminder.id).await, 1);
        assert!(stored(&scheduler, &reminder.id).await.is_triggered);
    }

    #[tokio::test]
    async fn test_fire_after_reschedule_is_skipped() {
        let (scheduler, _rx, todo_id) = setup().await;
        let at = Utc::now() + Duration::hours(1);
        let reminder = reminders::create_reminder(&scheduler.pool, "user-1", &request(todo_id, at, None))
            .await
            .unwrap();

        let state = scheduler.fire(&reminder.id).await.unwrap();

        assert_eq!(state, ReminderState::Idle);
        assert_eq!(notification_count(&scheduler, &reminder.id).await, 0);
    }

    #[tokio::test]
    async fn test_fire_missing_reminder() {
        let (scheduler, _rx, _todo_id) = setup().await;
        assert_eq!(scheduler.fire(&Uuid::new_v4()).await.unwrap(), ReminderState::Idle);
    }

    #[tokio::test]
    async fn test_update_rearms_at_new_time() {
        let (scheduler, _rx, todo_id) = setup().await;
        let reminder = scheduler
            .create("user-1", &request(todo_id, Utc::now() + Duration::hours(1), None))
            .await
            .unwrap();
        let moved = Utc::now() + Duration::hours(5);

        let update = UpdateReminderRequest {
            reminder_date_time: Some(moved),
            ..Default::default()
        };
        let updated = scheduler.update(&reminder.id, "user-1", &update).await.unwrap();

        assert_eq!(updated.reminder_date_time, moved);
        assert_eq!(scheduler.registry().len(), 1);
        assert_eq!(scheduler.registry().fire_time(&reminder.id), Some(moved));
    }

    #[tokio::test]
    async fn test_delete_cancels_timer() {
        let (scheduler, _rx, todo_id) = setup().await;
        let reminder = scheduler
            .create("user-1", &request(todo_id, Utc::now() + Duration::hours(1), None))
            .await
            .unwrap();

        let state = scheduler.delete(&reminder.id, "user-1").await.unwrap();

        assert_eq!(state, ReminderState::Removed);
        assert!(scheduler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_elapsed_timer_sends_event() {
        let (scheduler, mut rx, todo_id) = setup().await;
        let reminder = scheduler
            .create("user-1", &request(todo_id, Utc::now() + Duration::milliseconds(50), None))
            .await
            .unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event, ScheduleEvent::ReminderDue { reminder_id: reminder.id });
    }
}
