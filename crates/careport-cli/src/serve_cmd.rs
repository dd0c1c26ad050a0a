use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use careport_core::store::{ConnectError, InsuranceStore};
use careport_store::models::{Plan, Provider};

type AppState = Arc<InsuranceStore>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<ConnectError> for AppError {
    fn from(err: ConnectError) -> Self {
        let status = match &err {
            ConnectError::Busy => StatusCode::CONFLICT,
            ConnectError::PlanNotFound(_) | ConnectError::ProviderNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ConnectError::MissingMemberId | ConnectError::PlanProviderMismatch { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ConnectError::ConnectFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ProviderDetailResponse {
    #[serde(flatten)]
    pub provider: Provider,
    pub plans: Vec<Plan>,
}

#[derive(Debug, Deserialize)]
pub struct PlanFilter {
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BenefitQuery {
    pub clinic: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectBody {
    pub provider_id: String,
    pub plan_id: String,
    pub member_id: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(store: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/providers", get(list_providers))
        .route("/api/providers/{id}", get(get_provider))
        .route("/api/plans", get(list_plans))
        .route("/api/plans/{id}", get(get_plan))
        .route("/api/service-options", get(list_service_options))
        .route(
            "/api/connection",
            get(get_connection)
                .post(post_connection)
                .delete(delete_connection),
        )
        .route("/api/benefits/{service_option_id}", get(get_benefits))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(store: InsuranceStore, bind: &str, port: u16) -> Result<()> {
    let app = build_router(Arc::new(store));
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("careport serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("careport serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C; shutting down");
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index(State(store): State<AppState>) -> Html<String> {
    let catalog = store.catalog();
    let rows = catalog
        .plans()
        .iter()
        .map(|p| {
            format!(
                "<tr><td><a href=\"/api/plans/{id}\">{name}</a></td><td>{provider}</td><td>{category}</td></tr>",
                id = p.id,
                name = p.name,
                provider = p.provider_id,
                category = p.category,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let connected = match store.connection() {
        Some(conn) => format!("Connected: {} (member {})", conn.plan_id, conn.member_id),
        None => "No plan connected.".to_string(),
    };

    Html(format!(
        "<!DOCTYPE html>\
<html><head><title>careport</title></head><body>\
<h1>careport</h1>\
<p>{connected}</p>\
<p><a href=\"/api/providers\">/api/providers</a> | <a href=\"/api/plans\">/api/plans</a> | <a href=\"/api/connection\">/api/connection</a></p>\
<table><tr><th>Plan</th><th>Provider</th><th>Type</th></tr>{rows}</table>\
</body></html>"
    ))
}

async fn list_providers(State(store): State<AppState>) -> Json<Vec<Provider>> {
    Json(store.catalog().providers().to_vec())
}

async fn get_provider(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProviderDetailResponse>, AppError> {
    let catalog = store.catalog();
    let provider = catalog
        .find_provider(&id)
        .ok_or_else(|| AppError::not_found(format!("provider {id} not found")))?;
    Ok(Json(ProviderDetailResponse {
        provider: provider.clone(),
        plans: catalog.plans_for_provider(&id).cloned().collect(),
    }))
}

async fn list_plans(
    State(store): State<AppState>,
    Query(filter): Query<PlanFilter>,
) -> Json<Vec<Plan>> {
    let catalog = store.catalog();
    let plans = match filter.provider.as_deref() {
        Some(provider_id) => catalog.plans_for_provider(provider_id).cloned().collect(),
        None => catalog.plans().to_vec(),
    };
    Json(plans)
}

async fn get_plan(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Plan>, AppError> {
    store
        .catalog()
        .find_plan(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("plan {id} not found")))
}

async fn list_service_options(State(store): State<AppState>) -> impl IntoResponse {
    Json(store.catalog().service_options().to_vec())
}

async fn get_connection(State(store): State<AppState>) -> impl IntoResponse {
    Json(store.snapshot())
}

async fn post_connection(
    State(store): State<AppState>,
    Json(body): Json<ConnectBody>,
) -> Result<axum::response::Response, AppError> {
    let conn = store
        .connect(&body.provider_id, &body.plan_id, &body.member_id)
        .await?;
    Ok((StatusCode::CREATED, Json(conn)).into_response())
}

async fn delete_connection(State(store): State<AppState>) -> Result<StatusCode, AppError> {
    store.disconnect().map_err(AppError::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_benefits(
    State(store): State<AppState>,
    Path(service_option_id): Path<String>,
    Query(query): Query<BenefitQuery>,
) -> impl IntoResponse {
    let breakdown = match query.clinic.as_deref() {
        Some(clinic) => store.benefits_at_clinic(&service_option_id, clinic),
        None => store.benefits_for_service_option(&service_option_id),
    };
    Json(breakdown)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    use careport_core::catalog::Catalog;
    use careport_core::gateway::LocalGateway;
    use careport_core::store::{InsuranceStore, StoreOptions};
    use careport_store::kv::MemoryStore;
    use careport_test_utils::SAMPLE_CATALOG_TOML;

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn test_store() -> Arc<InsuranceStore> {
        let catalog = Catalog::from_toml_str(SAMPLE_CATALOG_TOML).unwrap();
        Arc::new(InsuranceStore::open(
            Arc::new(catalog),
            Arc::new(MemoryStore::new()),
            Arc::new(LocalGateway::new()),
            StoreOptions::default(),
        ))
    }

    async fn send_request(store: Arc<InsuranceStore>, uri: &str) -> axum::response::Response {
        let app = super::build_router(store);
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn send_json(
        store: Arc<InsuranceStore>,
        method: Method,
        uri: &str,
        body: serde_json::Value,
    ) -> axum::response::Response {
        let app = super::build_router(store);
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_index_returns_html() {
        let resp = send_request(test_store(), "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1_048_576)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("<h1>careport</h1>"));
        assert!(html.contains("Acme Choice PPO"));
        assert!(html.contains("No plan connected."));
    }

    #[tokio::test]
    async fn test_list_providers() {
        let resp = send_request(test_store(), "/api/providers").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["id"], "acme");
        assert_eq!(json[0]["logo"], "logos/acme.svg");
    }

    #[tokio::test]
    async fn test_get_provider_includes_plans() {
        let resp = send_request(test_store(), "/api/providers/north").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["name"], "Northwind Mutual");
        assert_eq!(json["plans"].as_array().unwrap().len(), 1);
        assert_eq!(json["plans"][0]["id"], "north-hmo");
    }

    #[tokio::test]
    async fn test_get_provider_not_found() {
        let resp = send_request(test_store(), "/api/providers/ghost").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_list_plans_filtered() {
        let store = test_store();
        let all = body_json(send_request(store.clone(), "/api/plans").await).await;
        assert_eq!(all.as_array().unwrap().len(), 3);

        let acme = body_json(send_request(store, "/api/plans?provider=acme").await).await;
        let ids: Vec<&str> = acme
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["acme-ppo", "acme-met"]);
    }

    #[tokio::test]
    async fn test_get_plan() {
        let store = test_store();
        let resp = send_request(store.clone(), "/api/plans/acme-ppo").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["category"], "ppo");
        assert_eq!(json["coinsurance_percent"], 20);
        assert_eq!(json["copay_by_service_option_id"]["opt-1"], 25);

        let resp = send_request(store, "/api/plans/ghost").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_service_options() {
        let json = body_json(send_request(test_store(), "/api/service-options").await).await;
        assert_eq!(json[0]["id"], "opt-1");
        assert_eq!(json[1]["name"], "Specialist consult");
    }

    #[tokio::test]
    async fn test_connection_lifecycle() {
        let store = test_store();

        let json = body_json(send_request(store.clone(), "/api/connection").await).await;
        assert_eq!(json["connectedPlan"], serde_json::Value::Null);
        assert_eq!(json["loading"], false);

        let resp = send_json(
            store.clone(),
            Method::POST,
            "/api/connection",
            serde_json::json!({"providerId": "acme", "planId": "acme-ppo", "memberId": "MEM-1"}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["planId"], "acme-ppo");
        assert!(json.get("effectiveDate").is_some());

        let json = body_json(send_request(store.clone(), "/api/benefits/opt-1").await).await;
        assert_eq!(json["totalDueNow"], 175);
        assert_eq!(json["deductibleApplied"], 150);
        assert_eq!(json["deductibleRemaining"], 150);
        assert_eq!(json["inNetwork"], true);

        let json = body_json(
            send_request(store.clone(), "/api/benefits/opt-1?clinic=clinic-uptown").await,
        )
        .await;
        assert_eq!(json["inNetwork"], false);

        let resp = send_json(
            store.clone(),
            Method::DELETE,
            "/api/connection",
            serde_json::Value::Null,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let json = body_json(send_request(store, "/api/benefits/opt-1").await).await;
        assert_eq!(json["totalDueNow"], 0);
        assert_eq!(json["inNetwork"], false);
    }

    #[tokio::test]
    async fn test_connect_errors_map_to_status() {
        let store = test_store();

        let resp = send_json(
            store.clone(),
            Method::POST,
            "/api/connection",
            serde_json::json!({"providerId": "acme", "planId": "ghost", "memberId": "MEM-1"}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send_json(
            store.clone(),
            Method::POST,
            "/api/connection",
            serde_json::json!({"providerId": "north", "planId": "acme-ppo", "memberId": "MEM-1"}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // The failure is visible in the connection snapshot.
        let json = body_json(send_request(store, "/api/connection").await).await;
        assert!(json["error"].as_str().unwrap().contains("not offered"));
        assert_eq!(json["connectedPlan"], serde_json::Value::Null);
    }
}
