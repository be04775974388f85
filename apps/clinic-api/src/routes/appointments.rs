use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use clinic_core::commands::{AppointmentChanges, AppointmentQuery, NewAppointment};
use clinic_core::models::Appointment;
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
    Payload(input): Payload<NewAppointment>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let appointment = state
        .coordinator
        .create_appointment(&actor, &ctx, input)
        .await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// Pacientes veem apenas os próprios atendimentos
pub async fn list(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Params(params): Params<PageParams>,
    Params(query): Params<AppointmentQuery>,
) -> ApiResult<Json<Paginated<Appointment>>> {
    let page = state
        .coordinator
        .list_appointments(&actor, &query, params.request())
        .await?;
    Ok(Json(Paginated::new(page, &params)))
}

pub async fn get(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.coordinator.get_appointment(&actor, id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
    Payload(changes): Payload<AppointmentChanges>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(
        state
            .coordinator
            .update_appointment(&actor, &ctx, id, changes)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.coordinator.delete_appointment(&actor, &ctx, id).await?;
    Ok(Json(json!({ "message": "Atendimento removido com sucesso" })))
}
