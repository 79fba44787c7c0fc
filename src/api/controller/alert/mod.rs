//! Alert controller: connects routes to the crisis lifecycle

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use validator::Validate;

use crate::api::dto::alert_dto::{
    AcknowledgeRequest, AnalyzeRequest, InProgressRequest, ListAlertsQuery, ResolveRequest,
    StreamQuery,
};
use crate::api::dto::ApiResponse;
use crate::api::util::json::to_json;
use crate::app_state::AppState;
use crate::core::persistence::alerts::crisis_alert_entity::CrisisAlert;
use crate::errors::{AppError, CrisisError};

pub struct AlertController;

impl AlertController {
    /// Screens a message. Responds with `data: null` when no crisis is found.
    pub async fn analyze(
        State(state): State<AppState>,
        Json(payload): Json<AnalyzeRequest>,
    ) -> Result<Json<ApiResponse<Option<CrisisAlert>>>, AppError> {
        payload.validate().map_err(CrisisError::from)?;
        let (message, context) = payload.into_parts();
        to_json(state.crisis_service.analyze(&message, context).await)
    }

    pub async fn list_active(
        State(state): State<AppState>,
        Query(query): Query<ListAlertsQuery>,
    ) -> Result<Json<ApiResponse<Vec<CrisisAlert>>>, AppError> {
        let alerts = state.crisis_service.list_active_alerts(&query.into());
        Ok(Json(ApiResponse::ok(alerts)))
    }

    pub async fn get(
        State(state): State<AppState>,
        Path(id): Path<String>,
    ) -> Result<Json<ApiResponse<CrisisAlert>>, AppError> {
        to_json(state.crisis_service.get_alert(&id))
    }

    pub async fn acknowledge(
        State(state): State<AppState>,
        Path(id): Path<String>,
        Json(payload): Json<AcknowledgeRequest>,
    ) -> Result<Json<ApiResponse<CrisisAlert>>, AppError> {
        payload.validate().map_err(CrisisError::from)?;
        to_json(
            state
                .crisis_service
                .acknowledge(&id, &payload.responder_id, &payload.role, payload.notes)
                .await,
        )
    }

    pub async fn mark_in_progress(
        State(state): State<AppState>,
        Path(id): Path<String>,
        Json(payload): Json<InProgressRequest>,
    ) -> Result<Json<ApiResponse<CrisisAlert>>, AppError> {
        payload.validate().map_err(CrisisError::from)?;
        to_json(
            state
                .crisis_service
                .mark_in_progress(&id, &payload.responder_id)
                .await,
        )
    }

    pub async fn resolve(
        State(state): State<AppState>,
        Path(id): Path<String>,
        Json(payload): Json<ResolveRequest>,
    ) -> Result<Json<ApiResponse<CrisisAlert>>, AppError> {
        payload.validate().map_err(CrisisError::from)?;
        to_json(
            state
                .crisis_service
                .resolve(&id, &payload.responder_id, &payload.resolution)
                .await,
        )
    }

    /// Live updates as Server-Sent Events, one `alert` event per change.
    pub async fn stream(
        State(state): State<AppState>,
        Query(query): Query<StreamQuery>,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let updates = state.crisis_service.subscribe(query.into()).filter_map(|update| async move {
            match Event::default()
                .event("alert")
                .id(format!("{}:{}", update.alert_id, update.status.as_code()))
                .json_data(&update)
            {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::error!(alert_id = %update.alert_id, error = %e, "Failed to encode alert update");
                    None
                }
            }
        });

        Sse::new(updates).keep_alive(KeepAlive::default())
    }
}
