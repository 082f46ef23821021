//! HTTP surface over [`InstanceManager`].

use crate::{
    bundles::ArtifactKind,
    error::Error,
    identity::{self, Identity},
    instances::{
        InstanceManager, MessageResponse, StartResponse, StatusResponse, Submission,
        TestResponse, VerifyOutcome,
    },
    telemetry::{Metrics, MetricsSnapshot},
};
use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<InstanceManager>,
    pub metrics: Arc<Metrics>,
    pub jwt_secret: Arc<str>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("missing Authorization header".to_string()))?;
        identity::from_bearer(header, &state.jwt_secret)
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "Healthy" }))
        .route("/metrics", get(metrics))
        .route("/challenges/{id}/start", post(start_instance))
        .route("/challenges/{id}/stop", post(stop_instance))
        .route("/challenges/{id}/status", get(status))
        .route("/challenges/{id}/logs", get(logs))
        .route("/challenges/{id}/download", get(download_challenge))
        .route("/challenges/{id}/handout", get(download_handout))
        .route("/solutions/{id}/start", post(start_test))
        .route("/solutions/{id}/stop", post(stop_test))
        .route("/solutions/{id}/verify", post(verify))
        .route("/solutions/{id}/download", get(download_solution))
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn start_instance(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<StartResponse>> {
    Ok(Json(state.manager.start_instance(&identity, &id).await?))
}

async fn stop_instance(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    Ok(Json(state.manager.stop_instance(&identity, &id).await?))
}

async fn status(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>> {
    Ok(Json(state.manager.status(&identity, &id).await?))
}

async fn logs(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<String> {
    state.manager.logs(&identity, &id).await
}

async fn start_test(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<TestResponse>> {
    Ok(Json(state.manager.start_test(&identity, &id).await?))
}

async fn stop_test(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    Ok(Json(state.manager.stop_test(&identity, &id).await?))
}

/// Called from inside the test sandbox, so no bearer token
async fn verify(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let submission = Submission::parse(&body);
    let response = match state.manager.verify_flag(&id, submission).await? {
        VerifyOutcome::Success => {
            (StatusCode::OK, Json(serde_json::json!({ "status": "success" }))).into_response()
        }
        VerifyOutcome::Failure { submitted } => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "status": "failure",
                "submitted-flag": format!("\"{}\"", submitted),
            })),
        )
            .into_response(),
    };
    Ok(response)
}

async fn download(
    state: &AppState,
    id: &str,
    query: &DownloadQuery,
    kind: ArtifactKind,
) -> Result<Response> {
    let bytes = state
        .manager
        .download(id, &query.token, kind, Utc::now())
        .await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", kind.file_name()),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn download_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    download(&state, &id, &query, ArtifactKind::Challenge).await
}

async fn download_handout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    download(&state, &id, &query, ArtifactKind::Handout).await
}

async fn download_solution(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    download(&state, &id, &query, ArtifactKind::Solution).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::fake::FakeCluster,
        config::DeployerConfig,
        flags::StaticFlags,
        identity::Role,
        store::{Challenge, ChallengeStore, MemoryStore},
    };
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    struct TestApp {
        router: Router,
        cluster: Arc<FakeCluster>,
        store: Arc<MemoryStore>,
    }

    fn app(upload_path: Option<&std::path::Path>) -> TestApp {
        let cluster = Arc::new(FakeCluster::new());
        let store = Arc::new(MemoryStore::with_challenges(vec![Challenge {
            id: "web-1".to_string(),
            user_id: "author".to_string(),
            published: true,
            ctfd_id: None,
            verified: false,
            flag: "flag{ok}".to_string(),
        }]));
        let mut config = DeployerConfig::default();
        config.jwt_secret = SECRET.to_string();
        if let Some(path) = upload_path {
            config.upload_path = path.display().to_string();
        }
        let metrics = Arc::new(Metrics::default());
        let manager = InstanceManager::new(
            cluster.clone(),
            store.clone(),
            Arc::new(StaticFlags::default()),
            Arc::new(config),
            metrics.clone(),
        );
        let router = router(AppState {
            manager: Arc::new(manager),
            metrics,
            jwt_secret: Arc::from(SECRET),
        });
        TestApp {
            router,
            cluster,
            store,
        }
    }

    fn bearer(user: &str, role: Role) -> String {
        format!(
            "Bearer {}",
            identity::issue(&Identity::new(user, role), SECRET)
        )
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(None)
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_start_requires_token() {
        let response = app(None)
            .router
            .oneshot(
                Request::post("/challenges/web-1/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_start_then_status() {
        let app = app(None);
        let response = app
            .router
            .clone()
            .oneshot(
                Request::post("/challenges/web-1/start")
                    .header(header::AUTHORIZATION, bearer("p1", Role::Player))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["started"], true);
        assert_eq!(body["secondsLeft"], 3600);
        assert!(body["url"].as_str().unwrap().ends_with(".challenges.localhost"));
        assert_eq!(app.cluster.namespace_names().len(), 1);

        let response = app
            .router
            .clone()
            .oneshot(
                Request::get("/challenges/web-1/status")
                    .header(header::AUTHORIZATION, bearer("p2", Role::Player))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(response).await, serde_json::json!({ "started": false }));

        let response = app
            .router
            .oneshot(
                Request::get("/metrics").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(response).await["instancesStarted"], 1);
    }

    #[tokio::test]
    async fn test_unknown_challenge_is_404() {
        let response = app(None)
            .router
            .oneshot(
                Request::post("/challenges/missing/stop")
                    .header(header::AUTHORIZATION, bearer("p1", Role::Player))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_verify_failure_reports_flag() {
        let app = app(None);
        let response = app
            .router
            .clone()
            .oneshot(
                Request::post("/solutions/web-1/start")
                    .header(header::AUTHORIZATION, bearer("author", Role::Developer))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(
                Request::post("/solutions/web-1/verify")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"flag": "flag{wrong}"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "failure");
        assert_eq!(body["submitted-flag"], "\"flag{wrong}\"");
        assert!(app.cluster.namespace_names().is_empty());
        assert!(!app.store.get_challenge("web-1").await.unwrap().unwrap().verified);
    }

    #[tokio::test]
    async fn test_verify_success() {
        let app = app(None);
        app.router
            .clone()
            .oneshot(
                Request::post("/solutions/web-1/start")
                    .header(header::AUTHORIZATION, bearer("root", Role::Admin))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .router
            .oneshot(
                Request::post("/solutions/web-1/verify")
                    .body(Body::from(r#"{"flag": "flag{ok}"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "success");
        assert!(app.store.get_challenge("web-1").await.unwrap().unwrap().verified);
    }

    #[tokio::test]
    async fn test_malformed_verify_is_400_and_stops_test() {
        for body in ["not json", "{}"] {
            let app = app(None);
            let response = app
                .router
                .clone()
                .oneshot(
                    Request::post("/solutions/web-1/start")
                        .header(header::AUTHORIZATION, bearer("author", Role::Developer))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(app.cluster.namespace_names().len(), 1);

            let response = app
                .router
                .oneshot(
                    Request::post("/solutions/web-1/verify")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(app.cluster.namespace_names().is_empty());
        }
    }

    #[tokio::test]
    async fn test_download_with_token() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("web-1")).unwrap();
        std::fs::write(dir.path().join("web-1/challenge.zip"), b"PK").unwrap();
        let app = app(Some(dir.path()));
        let instance = app.store.create_instance("p1", "web-1").await.unwrap();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::get(format!("/challenges/web-1/download?token={}", instance.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/zip"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"PK");

        let response = app
            .router
            .oneshot(
                Request::get("/challenges/web-1/download?token=bogus")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
