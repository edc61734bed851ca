use actix_web::{web, HttpResponse, Result};
use shared::{ApiError, ApiSuccess, CreateTodoRequest, UpdateTodoRequest};

use crate::handlers::parse_id;
use crate::models::AppState;
use crate::services::background_jobs::BackgroundJobError;
use crate::services::recurring_tasks::RecurringTaskError;
use crate::services::todos::{self as todo_service, TodoError};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/todos")
            .route("", web::get().to(list_todos))
            .route("", web::post().to(create_todo))
            .route("/{todo_id}", web::get().to(get_todo))
            .route("/{todo_id}", web::put().to(update_todo))
            .route("/{todo_id}", web::delete().to(delete_todo)),
    );
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ApiError {
        error: "not_found".to_string(),
        message: "Todo not found".to_string(),
    })
}

fn internal_error(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(ApiError {
        error: "internal_error".to_string(),
        message: message.to_string(),
    })
}

async fn list_todos(state: web::Data<AppState>, req: actix_web::HttpRequest) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    match todo_service::list_todos(&state.db, &user_id).await {
        Ok(todos) => Ok(HttpResponse::Ok().json(ApiSuccess::new(todos))),
        Err(e) => {
            log::error!("Error listing todos: {:?}", e);
            Ok(internal_error("Failed to list todos"))
        }
    }
}

async fn create_todo(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    body: web::Json<CreateTodoRequest>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    if body.title.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "Title is required".to_string(),
        }));
    }

    if let Some(rule) = &body.recurrence {
        if crate::services::recurring_tasks::validate_rule(rule).is_err() {
            return Ok(HttpResponse::BadRequest().json(ApiError {
                error: "invalid_recurrence".to_string(),
                message: "Invalid recurrence rule".to_string(),
            }));
        }
    }

    match todo_service::create_todo(&state.db, &user_id, &body).await {
        Ok(todo) => {
            if todo.recurrence.is_some() {
                if let Err(e) = state.engine.schedule_recurring_task(&todo, &user_id) {
                    log::error!("Error scheduling todo {}: {:?}", todo.id, e);
                }
            }
            Ok(HttpResponse::Created().json(ApiSuccess::new(todo)))
        }
        Err(e) => {
            log::error!("Error creating todo: {:?}", e);
            Ok(internal_error("Failed to create todo"))
        }
    }
}

async fn get_todo(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let todo_id = match parse_id(&path.into_inner(), "todo") {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match todo_service::get_todo_for_user(&state.db, &todo_id, &user_id).await {
        Ok(todo) => Ok(HttpResponse::Ok().json(ApiSuccess::new(todo))),
        Err(TodoError::NotFound) => Ok(not_found()),
        Err(e) => {
            log::error!("Error getting todo: {:?}", e);
            Ok(internal_error("Failed to get todo"))
        }
    }
}

async fn update_todo(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateTodoRequest>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let todo_id = match parse_id(&path.into_inner(), "todo") {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match state.engine.recurring_tasks().update(&todo_id, &user_id, &body).await {
        Ok(todo) => Ok(HttpResponse::Ok().json(ApiSuccess::new(todo))),
        Err(RecurringTaskError::Todo(TodoError::NotFound)) => Ok(not_found()),
        Err(RecurringTaskError::InvalidRule) => Ok(HttpResponse::BadRequest().json(ApiError {
            error: "invalid_recurrence".to_string(),
            message: "Invalid recurrence rule".to_string(),
        })),
        Err(e) => {
            log::error!("Error updating todo: {:?}", e);
            Ok(internal_error("Failed to update todo"))
        }
    }
}

async fn delete_todo(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let todo_id = match parse_id(&path.into_inner(), "todo") {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match state.engine.delete_todo(&todo_id, &user_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(BackgroundJobError::TodoError(TodoError::NotFound)) => Ok(not_found()),
        Err(e) => {
            log::error!("Error deleting todo: {:?}", e);
            Ok(internal_error("Failed to delete todo"))
        }
    }
}
