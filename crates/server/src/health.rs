use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use freightdesk_db::{DbPool, StorePools};

#[derive(Clone)]
struct HealthState {
    pools: StorePools,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub crm_database: HealthCheck,
    pub shipment_database: HealthCheck,
    pub checked_at: String,
}

pub fn router(pools: StorePools) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { pools })
}

async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let crm_database = check_database(&state.pools.crm).await;
    let shipment_database = check_database(&state.pools.shipment).await;

    let healthy = crm_database.status == "ok" && shipment_database.status == "ok";
    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        service: HealthCheck { status: "ok", detail: "accepting requests".to_string() },
        crm_database,
        shipment_database,
        checked_at: Utc::now().to_rfc3339(),
    };

    (status_code, Json(response))
}

async fn check_database(pool: &DbPool) -> HealthCheck {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => HealthCheck { status: "ok", detail: "reachable".to_string() },
        Err(error) => HealthCheck { status: "error", detail: error.to_string() },
    }
}
