//! # API REST
//!
//! REST API implementation for the hemogram service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `api-shared` for wire types and header authentication.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use hemogram_core::{CoreConfig, ReviewService, SampleService};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_shared::dto;
use handlers::*;

pub use error::ApiError;

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub samples: SampleService,
    pub reviews: ReviewService,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, api_key: impl Into<String>) -> Self {
        let samples = SampleService::new(cfg);
        Self {
            reviews: samples.reviews(),
            samples,
            api_key: Arc::from(api_key.into()),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        taxonomy,
        compute,
        list_samples,
        register_sample,
        get_sample,
        classify_cell,
        add_finding,
        remove_finding,
        finalize,
        sample_events,
        list_reviews,
        complete_review,
        list_morphologies,
        create_morphology,
        pending,
    ),
    components(schemas(
        dto::HealthRes,
        dto::TaxonomyEntry,
        dto::TaxonomyRes,
        dto::CategoryRef,
        dto::RawCountReq,
        dto::DifferentialReq,
        dto::DifferentialRes,
        dto::RegisterSampleReq,
        dto::SampleSummary,
        dto::ListSamplesRes,
        dto::CbcDto,
        dto::CellDto,
        dto::FindingDto,
        dto::SampleDetail,
        dto::ClassifyCellReq,
        dto::FindingReq,
        dto::RemoveFindingReq,
        dto::FindingRes,
        dto::FinalizeRes,
        dto::EventDto,
        dto::EventsRes,
        dto::PendingRes,
        dto::ReviewDto,
        dto::ListReviewsRes,
        dto::CompleteReviewReq,
        dto::MorphologyDto,
        dto::ListMorphologiesRes,
        dto::CreateMorphologyReq,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/taxonomy", get(taxonomy))
        .route("/differentials", post(compute))
        .route("/samples", get(list_samples).post(register_sample))
        .route("/samples/:id", get(get_sample))
        .route("/samples/:id/cells/:cell", put(classify_cell))
        .route(
            "/samples/:id/findings",
            post(add_finding).delete(remove_finding),
        )
        .route("/samples/:id/finalize", post(finalize))
        .route("/samples/:id/events", get(sample_events))
        .route("/reviews", get(list_reviews))
        .route("/reviews/:sample_id/complete", post(complete_review))
        .route(
            "/morphologies",
            get(list_morphologies).post(create_morphology),
        )
        .route("/pending", get(pending))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hemogram_core::Environment;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn test_state(dir: &TempDir) -> AppState {
        let cfg = CoreConfig::new(dir.path().to_path_buf(), Environment::Testing)
            .expect("CoreConfig::new should succeed");
        AppState::new(Arc::new(cfg), KEY)
    }

    fn make_request(method: &str, uri: &str, role: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder
                .header("x-api-key", KEY)
                .header("x-lab-user", "tester")
                .header("x-lab-role", role);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn register(state: &AppState, cell_count: usize) -> String {
        let (status, body) = send(
            state,
            make_request(
                "POST",
                "/samples",
                Some("lead"),
                Some(json!({"accession": "ORD-1", "wbc": 8.5, "cell_count": cell_count})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn classify(state: &AppState, id: &str, cell: usize, category: &str) {
        let (status, _) = send(
            state,
            make_request(
                "PUT",
                &format!("/samples/{id}/cells/{cell}"),
                Some("technologist"),
                Some(json!({ "category": category })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_open() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(&test_state(&dir), make_request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn protected_routes_require_api_key() {
        let dir = TempDir::new().unwrap();
        let (status, body) =
            send(&test_state(&dir), make_request("GET", "/taxonomy", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn taxonomy_lists_categories() {
        let dir = TempDir::new().unwrap();
        let (status, body) =
            send(&test_state(&dir), make_request("GET", "/taxonomy", Some("basic"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let categories = body["categories"].as_array().unwrap();
        assert_eq!(categories.len(), 11);
        assert_eq!(categories[1]["name"], "neutrophils");
    }

    #[tokio::test]
    async fn stateless_differential_matches_expected_report() {
        let dir = TempDir::new().unwrap();
        let req = json!({
            "wbc": 8.5,
            "counts": [
                {"category": 1, "count": 60},
                {"category": "lymphocytes", "count": 30},
                {"category": 3, "count": 10}
            ]
        });
        let (status, body) = send(
            &test_state(&dir),
            make_request("POST", "/differentials", Some("basic"), Some(req)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let report = &body["report"];
        assert_eq!(report["total"], 100);
        assert_eq!(report["diff"]["neutrophils"]["absolute"], 5.1);
        assert_eq!(report["diff"]["eosinophils"]["relative"], 0.0);
        assert!(report.get("nrbcs").is_none());
    }

    #[tokio::test]
    async fn duplicate_category_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let req = json!({
            "wbc": 5.0,
            "counts": [{"category": 1, "count": 10}, {"category": 1, "count": 5}]
        });
        let (status, body) = send(
            &test_state(&dir),
            make_request("POST", "/differentials", Some("basic"), Some(req)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn basic_role_cannot_register_samples() {
        let dir = TempDir::new().unwrap();
        let (status, _) = send(
            &test_state(&dir),
            make_request(
                "POST",
                "/samples",
                Some("basic"),
                Some(json!({"accession": "ORD-1", "wbc": 8.5, "cell_count": 3})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn finalize_once_then_conflict() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let id = register(&state, 2).await;
        classify(&state, &id, 0, "neutrophils").await;
        classify(&state, &id, 1, "monocytes").await;

        let uri = format!("/samples/{id}/finalize");
        let (status, body) = send(&state, make_request("POST", &uri, Some("technologist"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["review_required"], false);
        assert_eq!(body["report"]["diff"]["neutrophils"]["relative"], 50.0);

        let (status, body) = send(&state, make_request("POST", &uri, Some("technologist"), None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "ALREADY_FINALIZED");

        let (status, _) = send(
            &state,
            make_request(
                "PUT",
                &format!("/samples/{id}/cells/0"),
                Some("technologist"),
                Some(json!({"category": "blasts"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &state,
            make_request("GET", &format!("/samples/{id}"), Some("basic"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["finalized"], true);
        assert_eq!(body["differential"]["report"]["total"], 2);
    }

    #[tokio::test]
    async fn review_trigger_flow() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let id = register(&state, 1).await;
        classify(&state, &id, 0, "blasts").await;

        let findings = format!("/samples/{id}/findings");
        let finding = json!({"name": "Smear to be reviewed by Pathologist", "note": "Blasts present"});
        let (status, body) = send(
            &state,
            make_request("POST", &findings, Some("technologist"), Some(finding.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "attached");

        let (_, body) = send(
            &state,
            make_request("POST", &findings, Some("technologist"), Some(finding)),
        )
        .await;
        assert_eq!(body["status"], "already attached");

        let (status, body) = send(
            &state,
            make_request("POST", &format!("/samples/{id}/finalize"), Some("technologist"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["review_required"], true);

        let (_, body) = send(&state, make_request("GET", "/pending", Some("basic"), None)).await;
        assert_eq!(body["reviews"], 1);
        assert_eq!(body["samples"], 0);

        let (status, body) =
            send(&state, make_request("GET", "/reviews", Some("pathologist"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reviews"][0]["review_for"], "Blasts present");

        let complete = format!("/reviews/{id}/complete");
        let (status, body) = send(
            &state,
            make_request(
                "POST",
                &complete,
                Some("pathologist"),
                Some(json!({"review": "Acute leukaemia suspected"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");

        let (status, body) = send(
            &state,
            make_request("POST", &complete, Some("pathologist"), Some(json!({"review": "again"}))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "ALREADY_COMPLETED");

        let (status, _) = send(
            &state,
            make_request("GET", &format!("/samples/{id}/events"), Some("technologist"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &state,
            make_request("GET", &format!("/samples/{id}/events"), Some("admin"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let types: Vec<&str> = body["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event_type"].as_str().unwrap())
            .collect();
        assert!(types.contains(&"PATH_REVIEW_ORDERED"));
        assert_eq!(types.last(), Some(&"PATH_REVIEW_COMPLETED"));
    }

    #[tokio::test]
    async fn morphology_catalogue_requires_moderate() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let entry = json!({"cell_type": "rbc", "name": "Target cells", "result_options": ["slight", "marked"]});

        let (status, _) = send(
            &state,
            make_request("POST", "/morphologies", Some("technologist"), Some(entry.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &state,
            make_request("POST", "/morphologies", Some("lead"), Some(entry.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["result_options"], json!(["slight", "marked"]));

        let (status, body) = send(
            &state,
            make_request("POST", "/morphologies", Some("lead"), Some(entry)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "DUPLICATE_MORPHOLOGY");

        let (_, body) = send(&state, make_request("GET", "/morphologies", Some("basic"), None)).await;
        assert_eq!(body["morphologies"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_sample_is_not_found() {
        let dir = TempDir::new().unwrap();
        let uri = format!("/samples/{}", hemogram_core::LabUuid::new());
        let (status, body) = send(&test_state(&dir), make_request("GET", &uri, Some("basic"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn list_samples_rejects_unknown_status() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        register(&state, 1).await;

        let (_, body) = send(&state, make_request("GET", "/samples?status=all", Some("basic"), None)).await;
        assert_eq!(body["samples"].as_array().unwrap().len(), 1);

        let (status, _) =
            send(&state, make_request("GET", "/samples?status=closed", Some("basic"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(
            &test_state(&dir),
            make_request("GET", "/api-docs/openapi.json", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/samples/{id}/finalize").is_some());
    }
}
