use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::services::auth::TokenVerifier;
use crate::services::background_jobs::ScheduleEngine;

pub mod notification;
pub mod reminder;
pub mod todo;

pub use notification::*;
pub use reminder::*;
pub use todo::*;

/// Application state shared across all handlers
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub verifier: TokenVerifier,
    pub engine: Arc<ScheduleEngine>,
}

/// A stored row that cannot be turned back into its shared type
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid id in column {column}: {value}")]
    InvalidId { column: &'static str, value: String },
    #[error("Invalid JSON in column {column}: {source}")]
    InvalidJson {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Counter out of range in column {column}: {value}")]
    InvalidCounter { column: &'static str, value: i64 },
}

pub(crate) fn parse_id(column: &'static str, value: &str) -> Result<Uuid, ModelError> {
    Uuid::parse_str(value).map_err(|_| ModelError::InvalidId {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn parse_json<T: DeserializeOwned>(column: &'static str, value: &str) -> Result<T, ModelError> {
    serde_json::from_str(value).map_err(|source| ModelError::InvalidJson { column, source })
}

pub(crate) fn encode_json<T: Serialize>(column: &'static str, value: &T) -> Result<String, ModelError> {
    serde_json::to_string(value).map_err(|source| ModelError::InvalidJson { column, source })
}

pub(crate) fn parse_counter(column: &'static str, value: i64) -> Result<u32, ModelError> {
    u32::try_from(value).map_err(|_| ModelError::InvalidCounter { column, value })
}
