//! Request and response shapes for the HTTP API

use serde::Serialize;

pub mod alert_dto;

/// Envelope for every successful JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub is_successful: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            is_successful: true,
            data,
        }
    }
}
