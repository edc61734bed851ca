use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{encode_json, ModelError, ReminderRow};
use crate::services::todos;
use shared::{CreateReminderRequest, Reminder, UpdateReminderRequest, DEFAULT_REMINDER_TYPE};

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Reminder not found")]
    NotFound,
    #[error("Todo not found")]
    TodoNotFound,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Invalid stored reminder: {0}")]
    ModelError(#[from] ModelError),
}

impl From<todos::TodoError> for ReminderError {
    fn from(err: todos::TodoError) -> Self {
        match err {
            todos::TodoError::NotFound => ReminderError::TodoNotFound,
            todos::TodoError::DatabaseError(e) => ReminderError::DatabaseError(e),
            todos::TodoError::ModelError(e) => ReminderError::ModelError(e),
        }
    }
}

pub async fn create_reminder(
    pool: &SqlitePool,
    user_id: &str,
    request: &CreateReminderRequest,
) -> Result<Reminder, ReminderError> {
    // Only the owner of a todo may attach reminders to it
    let todo = todos::get_todo_for_user(pool, &request.todo_id, user_id).await?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let reminder_type = request
        .reminder_type
        .clone()
        .unwrap_or_else(|| DEFAULT_REMINDER_TYPE.to_string());
    let message = request
        .message
        .clone()
        .unwrap_or_else(|| format!("Reminder for: {}", todo.title));
    let recurrence = request
        .recurrence
        .as_ref()
        .map(|rule| encode_json("recurrence", rule))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO reminders (id, todo_id, user_id, reminder_date_time, reminder_type, message,
                               recurrence, occurrence_count, is_triggered, triggered_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, NULL, ?, NULL)
        "#,
    )
    .bind(id.to_string())
    .bind(request.todo_id.to_string())
    .bind(user_id)
    .bind(request.reminder_date_time)
    .bind(&reminder_type)
    .bind(&message)
    .bind(&recurrence)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Reminder {
        id,
        todo_id: request.todo_id,
        user_id: user_id.to_string(),
        reminder_date_time: request.reminder_date_time,
        reminder_type,
        message,
        recurrence: request.recurrence.clone(),
        occurrence_count: 0,
        is_triggered: false,
        triggered_at: None,
        created_at: now,
        updated_at: None,
    })
}

pub async fn get_reminder(pool: &SqlitePool, reminder_id: &Uuid) -> Result<Option<Reminder>, ReminderError> {
    let row: Option<ReminderRow> = sqlx::query_as("SELECT * FROM reminders WHERE id = ?")
        .bind(reminder_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.to_shared()).transpose()?)
}

pub async fn get_reminder_for_user(
    pool: &SqlitePool,
    reminder_id: &Uuid,
    user_id: &str,
) -> Result<Reminder, ReminderError> {
    match get_reminder(pool, reminder_id).await? {
        Some(reminder) if reminder.user_id == user_id => Ok(reminder),
        _ => Err(ReminderError::NotFound),
    }
}

/// Reminders of one todo, earliest first
pub async fn list_reminders_for_todo(
    pool: &SqlitePool,
    todo_id: &Uuid,
    user_id: &str,
) -> Result<Vec<Reminder>, ReminderError> {
    let rows: Vec<ReminderRow> = sqlx::query_as(
        "SELECT * FROM reminders WHERE todo_id = ? AND user_id = ? ORDER BY reminder_date_time ASC",
    )
    .bind(todo_id.to_string())
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
}

/// Raw rows of every reminder that has not been triggered yet.
/// Rows are returned undecoded so a single corrupt record can be skipped.
pub async fn list_pending_reminder_rows(pool: &SqlitePool) -> Result<Vec<ReminderRow>, ReminderError> {
    let rows = sqlx::query_as("SELECT * FROM reminders WHERE is_triggered = 0 ORDER BY reminder_date_time ASC")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn list_reminder_ids_for_todo(pool: &SqlitePool, todo_id: &Uuid) -> Result<Vec<Uuid>, ReminderError> {
    let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM reminders WHERE todo_id = ?")
        .bind(todo_id.to_string())
        .fetch_all(pool)
        .await?;

    Ok(ids
        .iter()
        .map(|(id,)| crate::models::parse_id("id", id))
        .collect::<Result<_, _>>()?)
}

/// Merge the requested changes into a stored reminder.
///
/// Moving `reminder_date_time` or setting a new rule re-opens a reminder that already fired.
pub async fn update_reminder(
    pool: &SqlitePool,
    reminder_id: &Uuid,
    user_id: &str,
    request: &UpdateReminderRequest,
) -> Result<Reminder, ReminderError> {
    let mut reminder = get_reminder_for_user(pool, reminder_id, user_id).await?;
    let now = Utc::now();

    if let Some(reminder_date_time) = request.reminder_date_time {
        reminder.reminder_date_time = reminder_date_time;
        reminder.is_triggered = false;
        reminder.triggered_at = None;
    }
    if let Some(reminder_type) = &request.reminder_type {
        reminder.reminder_type = reminder_type.clone();
    }
    if let Some(message) = &request.message {
        reminder.message = message.clone();
    }
    if let Some(recurrence) = &request.recurrence {
        reminder.recurrence = Some(recurrence.clone());
        reminder.is_triggered = false;
        reminder.triggered_at = None;
    }
    reminder.updated_at = Some(now);

    let recurrence = reminder
        .recurrence
        .as_ref()
        .map(|rule| encode_json("recurrence", rule))
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE reminders
        SET reminder_date_time = ?, reminder_type = ?, message = ?, recurrence = ?,
            is_triggered = ?, triggered_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(reminder.reminder_date_time)
    .bind(&reminder.reminder_type)
    .bind(&reminder.message)
    .bind(&recurrence)
    .bind(reminder.is_triggered)
    .bind(reminder.triggered_at)
    .bind(now)
    .bind(reminder_id.to_string())
    .execute(pool)
    .await?;

    Ok(reminder)
}

pub async fn delete_reminder(pool: &SqlitePool, reminder_id: &Uuid, user_id: &str) -> Result<(), ReminderError> {
    let result = sqlx::query("DELETE FROM reminders WHERE id = ? AND user_id = ?")
        .bind(reminder_id.to_string())
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ReminderError::NotFound);
    }

    Ok(())
}

/// Move a reminder to its next occurrence and mark it pending again
pub async fn record_occurrence(
    pool: &SqlitePool,
    reminder_id: &Uuid,
    reminder_date_time: DateTime<Utc>,
    occurrence_count: u32,
) -> Result<(), ReminderError> {
    sqlx::query(
        r#"
        UPDATE reminders
        SET reminder_date_time = ?, occurrence_count = ?, is_triggered = 0, triggered_at = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(reminder_date_time)
    .bind(i64::from(occurrence_count))
    .bind(Utc::now())
    .bind(reminder_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Put a reminder in its terminal state. The recurrence is dropped so the
/// series is never picked up again.
pub async fn mark_triggered(pool: &SqlitePool, reminder_id: &Uuid, at: DateTime<Utc>) -> Result<(), ReminderError> {
    sqlx::query(
        "UPDATE reminders SET is_triggered = 1, triggered_at = ?, recurrence = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(at)
    .bind(at)
    .bind(reminder_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}
