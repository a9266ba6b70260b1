use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

/// Builds the control-plane router (§6). Every route requires the bearer
/// token; there are no public endpoints.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/sources", get(handlers::list_sources))
        .route("/sources/:id", get(handlers::get_source))
        .route("/sources/:id/status", get(handlers::get_source_status))
        .route("/sources/:id/start", post(handlers::start_source))
        .route("/sources/:id/stop", post(handlers::stop_source))
        .route("/sources/:id/restart", post(handlers::restart_source))
        .route("/sources/:id/data", get(handlers::data_by_source))
        .route("/sources/:id/discovery", get(handlers::get_source_discovery))
        .route("/sources/:id/configure", post(handlers::configure_source))
        .route("/config/sources/reload", post(handlers::reload_sources_config))
        .route("/config/sources/configure", post(handlers::configure_sources))
        .route("/config/storage/reload", post(handlers::reload_storage_config))
        .route("/config/storage/configure", post(handlers::configure_storage))
        .route("/data/latest", get(handlers::data_latest))
        .route("/data/source/:id", get(handlers::data_by_source))
        .route("/data/range", get(handlers::data_range))
        .route("/data/search", get(handlers::data_search))
        .route("/data/export", get(handlers::data_export))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use daqg_buffer::InMemoryBuffer;
    use daqg_engine::Orchestrator;
    use daqg_mapping::{MappingCatalog, MappingEngine};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token";

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sources_path = dir.path().join("sources.yml");
        let storage_path = dir.path().join("storage.yml");
        std::fs::write(&sources_path, "sources: []\n").unwrap();
        std::fs::write(&storage_path, "storage: {}\n").unwrap();

        let catalog = MappingCatalog::load(dir.path().join("catalog.yml")).unwrap();
        let mapping = Arc::new(MappingEngine::new(catalog));
        let buffer = Arc::new(InMemoryBuffer::new());
        let orchestrator = Orchestrator::new(
            mapping,
            buffer.clone(),
            vec![],
            daqg_domain::BufferConfig::default(),
        )
        .unwrap();

        let state = AppState {
            orchestrator,
            buffer,
            auth_token: Arc::new(TEST_TOKEN.to_string()),
            sources_path: Arc::new(sources_path),
            storage_path: Arc::new(storage_path),
        };
        (state, dir)
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_TOKEN))
    }

    #[tokio::test]
    async fn unauthenticated_request_returns_401() {
        let (state, _dir) = test_state();
        let app = build_app(state);
        let resp = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_returns_200_when_authenticated() {
        let (state, _dir) = test_state();
        let app = build_app(state);
        let resp = app
            .oneshot(authed(Request::builder().uri("/status")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_source_returns_404() {
        let (state, _dir) = test_state();
        let app = build_app(state);
        let resp = app
            .oneshot(
                authed(Request::builder().uri("/sources/nonexistent"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn data_latest_returns_200_on_empty_buffer() {
        let (state, _dir) = test_state();
        let app = build_app(state);
        let resp = app
            .oneshot(authed(Request::builder().uri("/data/latest")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
