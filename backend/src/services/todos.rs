use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{encode_json, ModelError, TodoRow};
use shared::{CreateTodoRequest, Subtask, Todo, UpdateTodoRequest};

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("Todo not found")]
    NotFound,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Invalid stored todo: {0}")]
    ModelError(#[from] ModelError),
}

pub async fn create_todo(pool: &SqlitePool, user_id: &str, request: &CreateTodoRequest) -> Result<Todo, TodoError> {
    let now = Utc::now();
    let subtasks = request
        .subtasks
        .iter()
        .flatten()
        .map(|subtask| Subtask {
            id: Uuid::new_v4(),
            title: subtask.title.clone(),
            is_completed: false,
        })
        .collect();

    let todo = Todo {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        title: request.title.clone(),
        description: request.description.clone().unwrap_or_default(),
        due_date: request.due_date,
        is_completed: false,
        subtasks,
        recurrence: request.recurrence.clone(),
        // A todo created with a rule starts its own series
        is_recurring_parent: request.recurrence.is_some(),
        recurring_parent_id: None,
        recurring_occurrence: None,
        created_at: now,
        updated_at: now,
    };

    insert_todo(pool, &todo).await?;
    Ok(todo)
}

/// Store a fully built todo as is
pub async fn insert_todo(pool: &SqlitePool, todo: &Todo) -> Result<(), TodoError> {
    let subtasks = encode_json("subtasks", &todo.subtasks)?;
    let recurrence = todo
        .recurrence
        .as_ref()
        .map(|rule| encode_json("recurrence", rule))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO todos (id, user_id, title, description, due_date, is_completed, subtasks, recurrence,
                           is_recurring_parent, recurring_parent_id, recurring_occurrence, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(todo.id.to_string())
    .bind(&todo.user_id)
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.due_date)
    .bind(todo.is_completed)
    .bind(&subtasks)
    .bind(&recurrence)
    .bind(todo.is_recurring_parent)
    .bind(todo.recurring_parent_id.map(|id| id.to_string()))
    .bind(todo.recurring_occurrence.map(i64::from))
    .bind(todo.created_at)
    .bind(todo.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_todo(pool: &SqlitePool, todo_id: &Uuid) -> Result<Option<Todo>, TodoError> {
    let row: Option<TodoRow> = sqlx::query_as("SELECT * FROM todos WHERE id = ?")
        .bind(todo_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.to_shared()).transpose()?)
}

pub async fn get_todo_for_user(pool: &SqlitePool, todo_id: &Uuid, user_id: &str) -> Result<Todo, TodoError> {
    match get_todo(pool, todo_id).await? {
        Some(todo) if todo.user_id == user_id => Ok(todo),
        _ => Err(TodoError::NotFound),
    }
}

pub async fn list_todos(pool: &SqlitePool, user_id: &str) -> Result<Vec<Todo>, TodoError> {
    let rows: Vec<TodoRow> = sqlx::query_as(
        "SELECT * FROM todos WHERE user_id = ? ORDER BY due_date IS NULL, due_date ASC, created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
}

pub async fn update_todo(
    pool: &SqlitePool,
    todo_id: &Uuid,
    user_id: &str,
    request: &UpdateTodoRequest,
) -> Result<Todo, TodoError> {
    let mut todo = get_todo_for_user(pool, todo_id, user_id).await?;

    if let Some(title) = &request.title {
        todo.title = title.clone();
    }
    if let Some(description) = &request.description {
        todo.description = description.clone();
    }
    if let Some(due_date) = request.due_date {
        todo.due_date = Some(due_date);
    }
    if let Some(is_completed) = request.is_completed {
        todo.is_completed = is_completed;
    }
    if let Some(subtasks) = &request.subtasks {
        todo.subtasks = subtasks.clone();
    }
    if let Some(recurrence) = &request.recurrence {
        todo.recurrence = Some(recurrence.clone());
        if todo.recurring_parent_id.is_none() {
            todo.is_recurring_parent = true;
        }
    }
    todo.updated_at = Utc::now();

    let subtasks = encode_json("subtasks", &todo.subtasks)?;
    let recurrence = todo
        .recurrence
        .as_ref()
        .map(|rule| encode_json("recurrence", rule))
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE todos
        SET title = ?, description = ?, due_date = ?, is_completed = ?, subtasks = ?, recurrence = ?,
            is_recurring_parent = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.due_date)
    .bind(todo.is_completed)
    .bind(&subtasks)
    .bind(&recurrence)
    .bind(todo.is_recurring_parent)
    .bind(todo.updated_at)
    .bind(todo_id.to_string())
    .execute(pool)
    .await?;

    Ok(todo)
}

/// Delete a todo together with its reminders
pub async fn delete_todo(pool: &SqlitePool, todo_id: &Uuid, user_id: &str) -> Result<(), TodoError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM todos WHERE id = ? AND user_id = ?")
        .bind(todo_id.to_string())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(TodoError::NotFound);
    }

    sqlx::query("DELETE FROM reminders WHERE todo_id = ?")
        .bind(todo_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Ids of every series that still recurs, whether or not its originator survives
pub async fn list_active_series_ids(pool: &SqlitePool) -> Result<Vec<String>, TodoError> {
    let ids: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT COALESCE(recurring_parent_id, id) FROM todos
        WHERE recurrence IS NOT NULL AND (is_recurring_parent = 1 OR recurring_parent_id IS NOT NULL)
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().map(|(id,)| id).collect())
}

/// Drop the rule from every instance of a series and return the instance ids
pub async fn stop_series(pool: &SqlitePool, series_id: &Uuid) -> Result<Vec<Uuid>, TodoError> {
    let mut tx = pool.begin().await?;

    let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM todos WHERE id = ? OR recurring_parent_id = ?")
        .bind(series_id.to_string())
        .bind(series_id.to_string())
        .fetch_all(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        UPDATE todos
        SET recurrence = NULL, is_recurring_parent = 0, updated_at = ?
        WHERE id = ? OR recurring_parent_id = ?
        "#,
    )
    .bind(Utc::now())
    .bind(series_id.to_string())
    .bind(series_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ids
        .iter()
        .map(|(id,)| crate::models::parse_id("id", id))
        .collect::<Result<_, _>>()?)
}

/// Most recent instance of a series: the clone with the highest occurrence,
/// or the originator when nothing was cloned yet
pub async fn latest_instance(pool: &SqlitePool, series_id: &Uuid) -> Result<Option<Todo>, TodoError> {
    let row: Option<TodoRow> = sqlx::query_as(
        r#"
        SELECT * FROM todos
        WHERE recurring_parent_id = ? OR id = ?
        ORDER BY COALESCE(recurring_occurrence, 0) DESC, created_at DESC
        LIMIT 1
        "#,
    )
    .bind(series_id.to_string())
    .bind(series_id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.to_shared()).transpose()?)
}
