//! HTTP surface: admission, status polling and health.

mod error;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::orchestrator::JobOrchestrator;
use crate::owner::OwnerDirectory;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub owners: Arc<dyn OwnerDirectory>,
}

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/videos", post(handlers::create_video))
        .route("/api/videos/:id", get(handlers::get_video))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobState, PublicState};
    use crate::orchestrator::RetryConfig;
    use crate::pool::{PoolConfig, WorkerPool};
    use crate::render::{RenderEngine, RenderError, RenderRequest, RenderResult};
    use crate::stager::FileStager;
    use crate::job::NewJob;
    use crate::owner::StaticOwnerDirectory;
    use crate::store::{InMemoryJobStore, JobStore};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "slidecast-test-boundary";

    struct FixedEngine;

    #[async_trait]
    impl RenderEngine for FixedEngine {
        async fn invoke(&self, req: &RenderRequest) -> Result<RenderResult, RenderError> {
            Ok(RenderResult {
                filename: "video.mp4".into(),
                full_path: format!("{}/video.mp4", req.output_path),
                duration_seconds: 15.0,
                images_used: None,
                resolution: None,
                fps: None,
            })
        }
    }

    enum Part<'a> {
        File(&'a str, &'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(name, filename, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(token: Option<&str>, parts: &[Part<'_>]) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/videos")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(multipart(parts))).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    struct Harness {
        router: Router,
        store: Arc<InMemoryJobStore>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryJobStore::new());
        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            FileStager::new(dir.path()),
            Arc::new(FixedEngine),
            WorkerPool::start(PoolConfig::default()),
            RetryConfig::default(),
        ));
        let owners = StaticOwnerDirectory::new(HashMap::from([(
            "tok-1".to_string(),
            "alice".to_string(),
        )]));
        let router = create_router(
            AppState {
                orchestrator,
                owners: Arc::new(owners),
            },
            10 * 1024 * 1024,
        );
        Harness {
            router,
            store,
            _dir: dir,
        }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn accepted_upload_completes_and_is_pollable() {
        let h = harness();
        let response = h
            .router
            .clone()
            .oneshot(upload(
                Some("tok-1"),
                &[
                    Part::File("images", "b.png", b"bbb"),
                    Part::File("images", "a.png", b"aaa"),
                    Part::Text("orders", "1,0"),
                    Part::Text("transition_seconds", "5"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["state"], "EN_PROCESO");
        assert!(body["title"].as_str().unwrap().starts_with("video-"));
        assert!(body.get("output_path").is_none());
        let id = body["id"].as_u64().unwrap();

        let stored = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id, "alice");
        assert_eq!(stored.transition_seconds, 5);
        assert_eq!(stored.image_count, 2);

        let mut last = serde_json::Value::Null;
        for _ in 0..200 {
            let response = h
                .router
                .clone()
                .oneshot(get_request(&format!("/api/videos/{id}")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            last = json_body(response).await;
            if last["state"] != "EN_PROCESO" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last["state"], "COMPLETADO");
        assert_eq!(last["duration_seconds"], 15.0);
        assert!(last["output_path"].as_str().unwrap().ends_with("video.mp4"));
    }

    #[tokio::test]
    async fn upload_without_images_is_rejected() {
        let h = harness();
        let response = h
            .router
            .clone()
            .oneshot(upload(Some("tok-1"), &[Part::Text("format", "mp4")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "at least one image is required");
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn upload_with_client_id_is_rejected() {
        let h = harness();
        let response = h
            .router
            .clone()
            .oneshot(upload(
                Some("tok-1"),
                &[Part::File("images", "a.jpg", b"a"), Part::Text("id", "12")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("cannot already have an ID"));
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn mismatched_orders_are_rejected() {
        let h = harness();
        let response = h
            .router
            .clone()
            .oneshot(upload(
                Some("tok-1"),
                &[Part::File("images", "a.jpg", b"a"), Part::Text("orders", "0,1")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unnamed_audio_gets_the_stager_default_name() {
        let h = harness();
        let response = h
            .router
            .clone()
            .oneshot(upload(
                Some("tok-1"),
                &[
                    Part::File("images", "a.jpg", b"a"),
                    Part::File("audio", "", b"music"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let id = json_body(response).await["id"].as_u64().unwrap();

        let stored = h.store.get(id).await.unwrap().unwrap();
        assert!(stored.has_audio);
        assert_eq!(
            stored.audio_filename.as_deref(),
            Some(crate::stager::DEFAULT_AUDIO_FILENAME)
        );
    }

    #[tokio::test]
    async fn upload_requires_known_token() {
        let h = harness();
        let parts = [Part::File("images", "a.jpg", b"a")];

        let missing = h.router.clone().oneshot(upload(None, &parts)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let unknown = h
            .router
            .clone()
            .oneshot(upload(Some("nope"), &parts))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let h = harness();
        let response = h
            .router
            .clone()
            .oneshot(get_request("/api/videos/999"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "job not found: 999");
    }

    #[tokio::test]
    async fn failed_job_hides_outputs() {
        let h = harness();
        let job = h
            .store
            .insert(NewJob::new("alice".into(), 1, None, None, None))
            .await
            .unwrap();
        let mut failed = job.clone();
        failed.state = JobState::Failed;
        failed.output_path = Some("/leftover.mp4".into());
        h.store.update(&failed, JobState::Created).await.unwrap();

        let response = h
            .router
            .clone()
            .oneshot(get_request(&format!("/api/videos/{}", job.id)))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["state"], serde_json::to_value(PublicState::Error).unwrap());
        assert_eq!(body["state"], "ERROR");
        assert!(body.get("output_path").is_none());
    }

    #[tokio::test]
    async fn health_reports_worker_stats() {
        let h = harness();
        let response = h.router.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["workers"]["max_workers"], 10);
    }
}
