use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use clinic_core::commands::{NewProcedure, ProcedureChanges};
use clinic_core::models::Procedure;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{Authenticated, ClientContext};
use crate::error::ApiResult;
use crate::extract::{Params, Payload};
use crate::pagination::{PageParams, Paginated};
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Payload(input): Payload<NewProcedure>,
) -> ApiResult<(StatusCode, Json<Procedure>)> {
    let procedure = state.coordinator.create_procedure(&actor, &ctx, input).await?;
    Ok((StatusCode::CREATED, Json(procedure)))
}

/// O catálogo é visível a qualquer conta autenticada
pub async fn list(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    Params(params): Params<PageParams>,
) -> ApiResult<Json<Paginated<Procedure>>> {
    let page = state.coordinator.list_procedures(params.request()).await?;
    Ok(Json(Paginated::new(page, &params)))
}

pub async fn get(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Procedure>> {
    Ok(Json(state.coordinator.get_procedure(id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
    Payload(changes): Payload<ProcedureChanges>,
) -> ApiResult<Json<Procedure>> {
    Ok(Json(
        state
            .coordinator
            .update_procedure(&actor, &ctx, id, changes)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.coordinator.delete_procedure(&actor, &ctx, id).await?;
    Ok(Json(json!({ "message": "Procedimento removido com sucesso" })))
}
