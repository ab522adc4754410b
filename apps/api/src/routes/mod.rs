pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::blueprint::handlers as blueprint;
use crate::generation::handlers as generation;
use crate::ingest::handlers as ingest;
use crate::state::AppState;

/// Largest accepted request body; multi-file PDF uploads are the big case.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Corpus
        .route("/api/v1/ingest", post(ingest::handle_ingest))
        .route("/api/v1/corpus", delete(ingest::handle_reset_corpus))
        .route("/api/v1/stats", get(ingest::handle_stats))
        .route("/api/v1/parse-cv", post(ingest::handle_parse_cv))
        // Blueprint
        .route("/api/v1/analyze", post(blueprint::handle_analyze))
        .route("/api/v1/blueprint", get(blueprint::handle_get_blueprint))
        // Generation
        .route("/api/v1/generate", post(generation::handle_generate))
        .route("/api/v1/quality", post(generation::handle_quality))
        .route("/api/v1/synthetic", post(generation::handle_synthetic))
        .route("/api/v1/export", post(generation::handle_export))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::state::test_support::context_with;

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState::new(context_with(dir.path(), None)));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_generate_on_empty_corpus_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState::new(context_with(dir.path(), None)));
        let request = json_request(
            Method::POST,
            "/api/v1/generate",
            json!({
                "target_course": "Law",
                "motivation_text": "I sat in on a tribunal hearing in Leeds."
            }),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "EMPTY_CORPUS");
    }

    #[tokio::test]
    async fn test_stats_and_default_blueprint_on_fresh_install() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState::new(context_with(dir.path(), None)));

        let response = app
            .clone()
            .oneshot(Request::get("/api/v1/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let stats = body_json(response).await;
        assert_eq!(stats["exemplar_count"], 0);
        assert!(stats["blueprint_revision"].is_null());

        let response = app
            .oneshot(Request::get("/api/v1/blueprint").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["analyzed"], false);
    }

    #[tokio::test]
    async fn test_quality_rejects_banned_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState::new(context_with(dir.path(), None)));
        let request = json_request(
            Method::POST,
            "/api/v1/quality",
            json!({ "text": "I want to delve into the rich tapestry of law." }),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["passed"], false);
    }

    #[tokio::test]
    async fn test_export_defaults_to_docx_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState::new(context_with(dir.path(), None)));
        let request = json_request(
            Method::POST,
            "/api/v1/export",
            json!({ "essay": { "q1_answer": "One.", "q2_answer": "Two.", "q3_answer": "Three." } }),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"personal_statement.docx\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_export_markdown_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState::new(context_with(dir.path(), None)));
        let request = json_request(
            Method::POST,
            "/api/v1/export",
            json!({
                "essay": { "q1_answer": "One.", "q2_answer": "Two.", "q3_answer": "Three." },
                "format": "markdown"
            }),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_synthetic_without_credential_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState::new(context_with(dir.path(), None)));
        let request = json_request(
            Method::POST,
            "/api/v1/synthetic",
            json!({ "exemplar": "A strong essay.", "subjects": ["Law"] }),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"]["code"], "CONFIGURATION_ERROR");
    }
}
