use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{parse_id, ModelError};

/// Database model for notifications
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub todo_id: String,
    pub reminder_id: String,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationRow {
    pub fn to_shared(&self) -> Result<shared::Notification, ModelError> {
        Ok(shared::Notification {
            id: parse_id("id", &self.id)?,
            user_id: self.user_id.clone(),
            todo_id: parse_id("todo_id", &self.todo_id)?,
            reminder_id: parse_id("reminder_id", &self.reminder_id)?,
            title: self.title.clone(),
            message: self.message.clone(),
            notification_type: self.notification_type.clone(),
            is_read: self.is_read,
            created_at: self.created_at,
            read_at: self.read_at,
        })
    }
}
