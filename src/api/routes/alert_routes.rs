//! Alert routes (e.g., /api/v1/alerts/*)

use axum::{routing::{get, post}, Router};
use crate::api::controller::alert::AlertController;
use crate::app_state::AppState;

pub fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(AlertController::list_active))
        .route("/analyze", post(AlertController::analyze))
        .route("/stream", get(AlertController::stream))
        .route("/{id}", get(AlertController::get))
        .route("/{id}/acknowledge", post(AlertController::acknowledge))
        .route("/{id}/in-progress", post(AlertController::mark_in_progress))
        .route("/{id}/resolve", post(AlertController::resolve))
}
