//! Common API utilities and shared types

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use serde::Deserialize;

use super::middleware::ApiError;
use crate::config::UploadConfig;
use crate::services::image::ImageError;

pub const MAX_PAGE_SIZE: i64 = 100;

pub fn default_limit() -> i64 {
    20
}

pub fn default_message_limit() -> i64 {
    50
}

/// `skip`/`limit` query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl PaginationQuery {
    /// Negative skips become zero; limits are held to 1..=100
    pub fn clamped(&self) -> (i64, i64) {
        clamp_page(self.skip, self.limit)
    }
}

/// Same as `PaginationQuery` with a 50 message default
#[derive(Debug, Deserialize)]
pub struct MessagePaginationQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_message_limit")]
    pub limit: i64,
}

impl MessagePaginationQuery {
    pub fn clamped(&self) -> (i64, i64) {
        clamp_page(self.skip, self.limit)
    }
}

pub fn clamp_page(skip: i64, limit: i64) -> (i64, i64) {
    (skip.max(0), limit.clamp(1, MAX_PAGE_SIZE))
}

/// Request body cap for upload routes. Leaves room for the other form
/// fields so an oversized file still gets the descriptive 400.
pub fn upload_body_limit(config: &UploadConfig) -> usize {
    config.max_file_size as usize + 1024 * 1024
}

pub fn image_error(e: ImageError) -> ApiError {
    match e {
        ImageError::InvalidType(_) | ImageError::TooLarge(_) => ApiError::bad_request(e.to_string()),
        ImageError::Io(_) | ImageError::Task(_) => ApiError::internal(e),
    }
}

/// A file part read fully into memory
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Map multipart failures; a body over the limit is 413
pub fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Request body too large")
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

pub async fn read_file(field: Field<'_>) -> Result<UploadedFile, ApiError> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
    Ok(UploadedFile { file_name, bytes })
}

pub async fn read_text(field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(multipart_error)
}

/// Pull the `file` part out of a form that carries nothing else
pub async fn single_file(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            return read_file(field).await;
        }
    }
    Err(ApiError::validation_error("Missing file"))
}
