use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use clinic_core::commands::{NewPatient, PatientChanges};
use clinic_core::models::Patient;
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
    Payload(input): Payload<NewPatient>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let patient = state.coordinator.create_patient(&actor, &ctx, input).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn list(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Params(params): Params<PageParams>,
) -> ApiResult<Json<Paginated<Patient>>> {
    let page = state
        .coordinator
        .list_patients(&actor, params.request())
        .await?;
    Ok(Json(Paginated::new(page, &params)))
}

pub async fn get(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(state.coordinator.get_patient(&actor, id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
    Payload(changes): Payload<PatientChanges>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(
        state
            .coordinator
            .update_patient(&actor, &ctx, id, changes)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.coordinator.delete_patient(&actor, &ctx, id).await?;
    Ok(Json(json!({ "message": "Paciente removido com sucesso" })))
}
