use actix_web::{web, HttpResponse, Result};
use serde::Deserialize;
use shared::{ApiError, ApiSuccess};

use crate::handlers::parse_id;
use crate::models::AppState;
use crate::services::notifications::{self as notification_service, NotificationError, DEFAULT_NOTIFICATION_LIMIT};

/// Must be registered before the reminder scope, whose `/{reminder_id}` would
/// otherwise capture `notifications`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reminders/notifications")
            .route("", web::get().to(list_notifications))
            .route("/{notification_id}/read", web::patch().to(mark_read))
            .route("/{notification_id}", web::delete().to(delete_notification)),
    );
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub limit: Option<u32>,
    #[serde(default)]
    pub unread_only: bool,
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ApiError {
        error: "not_found".to_string(),
        message: "Notification not found".to_string(),
    })
}

async fn list_notifications(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    query: web::Query<ListNotificationsQuery>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let limit = query.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT);

    match notification_service::list_notifications(&state.db, &user_id, limit, query.unread_only).await {
        Ok(notifications) => Ok(HttpResponse::Ok().json(ApiSuccess::new(notifications))),
        Err(e) => {
            log::error!("Error listing notifications: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to list notifications".to_string(),
            }))
        }
    }
}

async fn mark_read(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let notification_id = match parse_id(&path.into_inner(), "notification") {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match notification_service::mark_read(&state.db, &notification_id, &user_id).await {
        Ok(notification) => Ok(HttpResponse::Ok().json(ApiSuccess::new(notification))),
        Err(NotificationError::NotFound) => Ok(not_found()),
        Err(e) => {
            log::error!("Error marking notification as read: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to update notification".to_string(),
            }))
        }
    }
}

async fn delete_notification(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.verifier) {
        Ok(id) => id,
        Err(e) => return Ok(crate::middleware::auth::unauthorized(&e)),
    };

    let notification_id = match parse_id(&path.into_inner(), "notification") {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match notification_service::delete_notification(&state.db, &notification_id, &user_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(NotificationError::NotFound) => Ok(not_found()),
        Err(e) => {
            log::error!("Error deleting notification: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to delete notification".to_string(),
            }))
        }
    }
}
