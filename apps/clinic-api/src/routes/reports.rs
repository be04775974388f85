//! Painel, trilha de auditoria e health check

use axum::{extract::State, http::StatusCode, Json};
use clinic_core::commands::AuditQuery;
use clinic_core::models::{AuditLog, DashboardStats};
use serde::Serialize;
use tracing::warn;

use crate::auth::Authenticated;
use crate::built_info;
use crate::error::ApiResult;
use crate::extract::Params;
use crate::pagination::{PageParams, Paginated};
use crate::state::AppState;

pub async fn dashboard(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(state.coordinator.dashboard_stats(&actor).await?))
}

pub async fn audit_logs(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Params(params): Params<PageParams>,
    Params(query): Params<AuditQuery>,
) -> ApiResult<Json<Paginated<AuditLog>>> {
    let page = state
        .coordinator
        .list_audit_logs(&actor, &query, params.request())
        .await?;
    Ok(Json(Paginated::new(page, &params)))
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    /// Gravações de auditoria perdidas desde o início do processo
    pub audit_failures: u64,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let coordinator = &state.coordinator;
    let database_ok = sqlx::query("SELECT 1")
        .execute(coordinator.store().pool())
        .await
        .map_err(|e| warn!(error = %e, "Banco de dados indisponível"))
        .is_ok();

    let (status, code) = if database_ok {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };
    let health = Health {
        status,
        version: built_info::PKG_VERSION,
        database: if database_ok { "ok" } else { "unavailable" },
        audit_failures: coordinator.audit_logger().failed_writes(),
    };
    (code, Json(health))
}
