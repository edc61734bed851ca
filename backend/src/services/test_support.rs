//! Fixtures shared by the service tests

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::services::todos;
use shared::{RecurrenceRule, Todo};

/// In-memory database with the real migrations applied.
/// A single connection keeps every query on the same in-memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    pool
}

pub fn build_todo(user_id: &str, due_date: Option<NaiveDate>, recurrence: Option<RecurrenceRule>) -> Todo {
    let now = Utc::now();
    Todo {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        title: "Water the plants".to_string(),
        description: String::new(),
        due_date,
        is_completed: false,
        subtasks: Vec::new(),
        is_recurring_parent: recurrence.is_some(),
        recurrence,
        recurring_parent_id: None,
        recurring_occurrence: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn create_test_todo(pool: &SqlitePool, user_id: &str) -> Todo {
    let todo = build_todo(user_id, None, None);
    todos::insert_todo(pool, &todo).await.unwrap();
    todo
}
