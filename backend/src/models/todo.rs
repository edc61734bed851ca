use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{parse_counter, parse_id, parse_json, ModelError};

/// Database model for todos
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TodoRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub is_completed: bool,
    pub subtasks: String,
    pub recurrence: Option<String>,
    pub is_recurring_parent: bool,
    pub recurring_parent_id: Option<String>,
    pub recurring_occurrence: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TodoRow {
    pub fn to_shared(&self) -> Result<shared::Todo, ModelError> {
        let recurrence = self
            .recurrence
            .as_deref()
            .map(|raw| parse_json("recurrence", raw))
            .transpose()?;

        let recurring_parent_id = self
            .recurring_parent_id
            .as_deref()
            .map(|raw| parse_id("recurring_parent_id", raw))
            .transpose()?;

        let recurring_occurrence = self
            .recurring_occurrence
            .map(|value| parse_counter("recurring_occurrence", value))
            .transpose()?;

        Ok(shared::Todo {
            id: parse_id("id", &self.id)?,
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            due_date: self.due_date,
            is_completed: self.is_completed,
            subtasks: parse_json("subtasks", &self.subtasks)?,
            recurrence,
            is_recurring_parent: self.is_recurring_parent,
            recurring_parent_id,
            recurring_occurrence,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
