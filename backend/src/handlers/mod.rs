use actix_web::{web, HttpResponse};
use shared::ApiError;
use uuid::Uuid;

pub mod notifications;
pub mod recurring_tasks;
pub mod reminders;
pub mod todos;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(notifications::configure)
            .configure(reminders::configure)
            .configure(recurring_tasks::configure)
            .configure(todos::configure),
    );
}

/// Liveness probe
pub async fn health() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body("Todo reminder backend is running")
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw).map_err(|_| {
        HttpResponse::BadRequest().json(ApiError {
            error: "invalid_id".to_string(),
            message: format!("Invalid {} ID format", what),
        })
    })
}
