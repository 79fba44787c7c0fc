use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use crate::app_state::AppState;

/// Build the main application router
pub fn app_router() -> Router<AppState> {
    let api_v1 = Router::new()
        .nest("/alerts", crate::api::routes::alert_routes::alert_routes())
        .nest("/system", crate::api::routes::system_routes::system_routes());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1)
        .fallback(handler_404)
        .layer(CorsLayer::very_permissive())
}

async fn root() -> &'static str {
    "Crisis engine is running!"
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        "The requested resource was not found",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::app_state::build_app_state;
    use crate::core::config::app_config::{AppConfig, CollaboratorConfig, StorageBackend};
    use crate::core::config::crisis_config::CrisisConfig;
    use crate::core::persistence::alerts::crisis_alert_entity::Severity;
    use crate::domain::crisis::service::crisis_service::tests::{harness, Harness};

    fn app(h: &Harness) -> Router {
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            data_dir: "./data".into(),
            log_dir: "./data/logs".into(),
            storage: StorageBackend::Memory,
            collaborators: CollaboratorConfig::default(),
            crisis: CrisisConfig::default(),
        };
        app_router().with_state(build_app_state(Arc::new(config), h.service.clone()))
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn analyze_body(message: &str) -> Value {
        json!({
            "message": message,
            "user_id": "resident-1",
            "session_id": "session-1",
            "facility_id": "facility-1",
        })
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_then_acknowledge_then_resolve() {
        let h = harness(Severity::Urgent);

        let (status, body) = call(app(&h), Method::POST, "/api/v1/alerts/analyze", Some(analyze_body("help"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_successful"], true);
        assert_eq!(body["data"]["severity"], "URGENT");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(app(&h), Method::GET, "/api/v1/alerts?facility_id=facility-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            app(&h),
            Method::POST,
            &format!("/api/v1/alerts/{id}/acknowledge"),
            Some(json!({ "responder_id": "rn", "role": "nurse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ACKNOWLEDGED");

        let (status, body) = call(
            app(&h),
            Method::POST,
            &format!("/api/v1/alerts/{id}/resolve"),
            Some(json!({ "responder_id": "rn", "resolution": "Talked it through" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "RESOLVED");

        let (status, _) = call(
            app(&h),
            Method::POST,
            &format!("/api/v1/alerts/{id}/acknowledge"),
            Some(json!({ "responder_id": "rn", "role": "nurse" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test(start_paused = true)]
    async fn no_crisis_returns_null_data() {
        let h = harness(Severity::None);

        let (status, body) = call(app(&h), Method::POST, "/api/v1/alerts/analyze", Some(analyze_body("hello"))).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_requests_are_rejected() {
        let h = harness(Severity::Urgent);

        let (status, body) = call(app(&h), Method::POST, "/api/v1/alerts/analyze", Some(analyze_body(""))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Validation"));

        let (status, _) = call(app(&h), Method::GET, "/api/v1/alerts/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn system_and_fallback_routes() {
        let h = harness(Severity::Urgent);

        let (status, body) = call(app(&h), Method::GET, "/api/v1/system/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");

        let (status, body) = call(app(&h), Method::GET, "/api/v1/system/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["crisis"]["emergency_number"], "911");

        let (status, _) = call(app(&h), Method::GET, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
