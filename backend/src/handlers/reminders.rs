use actix_web::{web, HttpResponse, Result};
use shared::{ApiError, ApiSuccess, CreateReminderRequest, UpdateReminderRequest};

use crate::handlers::parse_id;
use crate::models::AppState;
use crate::services::reminder_scheduler::ReminderSchedulerError;
use crate::services::reminders::{self as reminder_service, ReminderError};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reminders")
            .route("", web::post().to(create_reminder))
            .route("/todo/{todo_id}", web::get().to(list_reminders))
            .route("/{reminder_id}", web::get().to(get_reminder))
            .route("/{reminder_id}", web::put().to(update_reminder))
            .route("/{reminder_id}", web::delete().to(delete_reminder)),
    );
}

fn error_response(err: &ReminderSchedulerError, action: &str) -> HttpResponse {
    match err {
        ReminderSchedulerError::Reminder(ReminderError::NotFound) => HttpResponse::NotFound().json(ApiError {
            error: "not_found".to_string(),
            message: "Reminder not found".to_string(),
        }),
        ReminderSchedulerError::Reminder(ReminderError::TodoNotFound) => HttpResponse::NotFound().json(ApiError {
            error: "not_found".to_string(),
            message: "Todo not found".to_string(),
        }),
        e => {
            log::error!("Error trying to {} reminder: {:?}", action, e);
            HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: format!("Failed to {} reminder", action),
            })
        }
    }
}

async fn list_reminders(
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

    match reminder_service::list_reminders_for_todo(&state.db, &todo_id, &user_id).await {
        Ok(reminders) => Ok(HttpResponse::Ok().json(ApiSuccess::new(reminders))),
        Err(e) => {
            log::error!("Error listing reminders: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to list reminders".to_string(),
            }))
        }
    }
}

async fn get_reminder(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let reminder_id = match parse_id(&path.into_inner(), "reminder") {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match reminder_service::get_reminder_for_user(&state.db, &reminder_id, &user_id).await {
        Ok(reminder) => Ok(HttpResponse::Ok().json(ApiSuccess::new(reminder))),
        Err(e) => Ok(error_response(&ReminderSchedulerError::from(e), "get")),
    }
}

async fn create_reminder(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    body: web::Json<CreateReminderRequest>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    match state.engine.reminders().create(&user_id, &body).await {
        Ok(reminder) => Ok(HttpResponse::Created().json(ApiSuccess::new(reminder))),
        Err(e) => Ok(error_response(&e, "create")),
    }
}

async fn update_reminder(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateReminderRequest>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let reminder_id = match parse_id(&path.into_inner(), "reminder") {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match state.engine.reminders().update(&reminder_id, &user_id, &body).await {
        Ok(reminder) => Ok(HttpResponse::Ok().json(ApiSuccess::new(reminder))),
        Err(e) => Ok(error_response(&e, "update")),
    }
}

async fn delete_reminder(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let reminder_id = match parse_id(&path.into_inner(), "reminder") {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match state.engine.reminders().delete(&reminder_id, &user_id).await {
        Ok(_) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(error_response(&e, "delete")),
    }
}
