use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ModelError, NotificationRow};
use shared::{Notification, Reminder, REMINDER_NOTIFICATION_TITLE, REMINDER_NOTIFICATION_TYPE};

pub const DEFAULT_NOTIFICATION_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Invalid stored notification: {0}")]
    ModelError(#[from] ModelError),
}

/// Record that a reminder fired
pub async fn create_notification(pool: &SqlitePool, reminder: &Reminder) -> Result<Notification, NotificationError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, todo_id, reminder_id, title, message, notification_type, is_read, created_at, read_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, NULL)
        "#,
    )
    .bind(id.to_string())
    .bind(&reminder.user_id)
    .bind(reminder.todo_id.to_string())
    .bind(reminder.id.to_string())
    .bind(REMINDER_NOTIFICATION_TITLE)
    .bind(&reminder.message)
    .bind(REMINDER_NOTIFICATION_TYPE)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Notification {
        id,
        user_id: reminder.user_id.clone(),
        todo_id: reminder.todo_id,
        reminder_id: reminder.id,
        title: REMINDER_NOTIFICATION_TITLE.to_string(),
        message: reminder.message.clone(),
        notification_type: REMINDER_NOTIFICATION_TYPE.to_string(),
        is_read: false,
        created_at: now,
        read_at: None,
    })
}

/// Newest notifications of a user
pub async fn list_notifications(
    pool: &SqlitePool,
    user_id: &str,
    limit: u32,
    unread_only: bool,
) -> Result<Vec<Notification>, NotificationError> {
    let rows: Vec<NotificationRow> = sqlx::query_as(
        r#"
        SELECT * FROM notifications
        WHERE user_id = ? AND (? = 0 OR is_read = 0)
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
}

pub async fn mark_read(pool: &SqlitePool, notification_id: &Uuid, user_id: &str) -> Result<Notification, NotificationError> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1, read_at = ? WHERE id = ? AND user_id = ?")
        .bind(Utc::now())
        .bind(notification_id.to_string())
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(NotificationError::NotFound);
    }

    let row: NotificationRow = sqlx::query_as("SELECT * FROM notifications WHERE id = ?")
        .bind(notification_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(row.to_shared()?)
}

pub async fn delete_notification(pool: &SqlitePool, notification_id: &Uuid, user_id: &str) -> Result<(), NotificationError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(notification_id.to_string())
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(NotificationError::NotFound);
    }

    Ok(())
}

/// Notifications emitted for one reminder, oldest first
pub async fn list_notifications_for_reminder(
    pool: &SqlitePool,
    reminder_id: &Uuid,
) -> Result<Vec<Notification>, NotificationError> {
    let rows: Vec<NotificationRow> =
        sqlx::query_as("SELECT * FROM notifications WHERE reminder_id = ? ORDER BY created_at ASC")
            .bind(reminder_id.to_string())
            .fetch_all(pool)
            .await?;

    Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
}
