use actix_web::{web, HttpResponse, Result};
use shared::{ApiError, ApiSuccess, RecurringTaskStatus, ScheduleRecurringTaskRequest, UpdateTodoRequest};

use crate::handlers::parse_id;
use crate::models::AppState;
use crate::services::recurring_tasks::RecurringTaskError;
use crate::services::todos::TodoError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/recurring-tasks")
            .route("", web::post().to(schedule_recurring_task))
            .route("/{todo_id}", web::put().to(update_recurring_task))
            .route("/{todo_id}", web::delete().to(cancel_recurring_task)),
    );
}

fn error_response(err: &RecurringTaskError, action: &str) -> HttpResponse {
    match err {
        RecurringTaskError::PermissionDenied => HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "Unauthorized".to_string(),
        }),
        RecurringTaskError::InvalidRule => HttpResponse::BadRequest().json(ApiError {
            error: "invalid_recurrence".to_string(),
            message: "Invalid recurrence pattern".to_string(),
        }),
        RecurringTaskError::Todo(TodoError::NotFound) => HttpResponse::NotFound().json(ApiError {
            error: "not_found".to_string(),
            message: "Todo not found".to_string(),
        }),
        e => {
            log::error!("Error trying to {} recurring task: {:?}", action, e);
            HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: format!("Failed to {} recurring task", action),
            })
        }
    }
}

async fn schedule_recurring_task(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    body: web::Json<ScheduleRecurringTaskRequest>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    if body.user_id != user_id {
        return Ok(error_response(&RecurringTaskError::PermissionDenied, "schedule"));
    }

    match state.engine.recurring_tasks().start_series(&body.todo_data, &user_id).await {
        Ok(task) => Ok(HttpResponse::Ok().json(ApiSuccess::new(RecurringTaskStatus {
            message: "Recurring task scheduled".to_string(),
            task_id: task.id,
        }))),
        Err(e) => Ok(error_response(&e, "schedule")),
    }
}

async fn update_recurring_task(
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
        Ok(task) => Ok(HttpResponse::Ok().json(ApiSuccess::new(RecurringTaskStatus {
            message: "Recurring task updated".to_string(),
            task_id: task.id,
        }))),
        Err(e) => Ok(error_response(&e, "update")),
    }
}

async fn cancel_recurring_task(
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

    match state.engine.recurring_tasks().stop(&todo_id, &user_id).await {
        Ok(_) => Ok(HttpResponse::Ok().json(ApiSuccess::new(RecurringTaskStatus {
            message: "Recurring task cancelled".to_string(),
            task_id: todo_id,
        }))),
        Err(e) => Ok(error_response(&e, "cancel")),
    }
}
