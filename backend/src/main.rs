use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::runtime::Handle;

use backend::config::Config;
use backend::handlers;
use backend::models::AppState;
use backend::services::auth::TokenVerifier;
use backend::services::background_jobs::ScheduleEngine;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    log::info!("Starting server at {}:{}", config.host, config.port);

    if config.allow_unverified_tokens {
        log::warn!("Unverified tokens are accepted as a fallback");
    }

    // Create database pool
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to create database pool");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    log::info!("Database migrations completed");

    // Start the reminder and recurring task engine, then restore pending timers
    let engine = ScheduleEngine::start(pool.clone(), config.scheduler_timezone, Handle::current());
    match engine.restart_all_schedules().await {
        Ok(restored) => log::info!("Restored {} schedules", restored),
        Err(e) => log::error!("Error restoring schedules: {}", e),
    }

    // Create app state
    let app_state = web::Data::new(AppState {
        db: pool,
        verifier: TokenVerifier::new(config.jwt_secret.clone(), config.allow_unverified_tokens),
        config: config.clone(),
        engine,
    });

    let allowed_origins = config.cors_origins.clone();

    // Start HTTP server
    HttpServer::new(move || {
        let allowed_origins = allowed_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origin_str = origin.to_str().unwrap_or("");
                allowed_origins.iter().any(|allowed| origin_str.starts_with(allowed))
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type"])
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .route("/", web::get().to(handlers::health))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
