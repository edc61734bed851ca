use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{parse_counter, parse_id, parse_json, ModelError};

/// Database model for reminders
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReminderRow {
    pub id: String,
    pub todo_id: String,
    pub user_id: String,
    pub reminder_date_time: DateTime<Utc>,
    pub reminder_type: String,
    pub message: String,
    pub recurrence: Option<String>,
    pub occurrence_count: i64,
    pub is_triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReminderRow {
    pub fn to_shared(&self) -> Result<shared::Reminder, ModelError> {
        let recurrence = self
            .recurrence
            .as_deref()
            .map(|raw| parse_json("recurrence", raw))
            .transpose()?;

        Ok(shared::Reminder {
            id: parse_id("id", &self.id)?,
            todo_id: parse_id("todo_id", &self.todo_id)?,
            user_id: self.user_id.clone(),
            reminder_date_time: self.reminder_date_time,
            reminder_type: self.reminder_type.clone(),
            message: self.message.clone(),
            recurrence,
            occurrence_count: parse_counter("occurrence_count", self.occurrence_count)?,
            is_triggered: self.is_triggered,
            triggered_at: self.triggered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
