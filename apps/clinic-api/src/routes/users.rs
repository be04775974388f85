use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use clinic_core::commands::{NewUser, UserChanges};
use clinic_core::models::User;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;
use zeroize::Zeroizing;

use crate::auth::{Authenticated, ClientContext};
use crate::error::ApiResult;
use crate::extract::{Params, Payload};
use crate::pagination::{PageParams, Paginated};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UserSearch {
    #[validate(length(min = 1, message = "Email é obrigatório"))]
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(alias = "nova_senha")]
    pub new_password: Zeroizing<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Payload(input): Payload<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.coordinator.create_user(&actor, &ctx, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Params(params): Params<PageParams>,
) -> ApiResult<Json<Paginated<User>>> {
    let page = state.coordinator.list_users(&actor, params.request()).await?;
    Ok(Json(Paginated::new(page, &params)))
}

pub async fn search(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Params(search): Params<UserSearch>,
) -> ApiResult<Json<User>> {
    search.validate()?;
    Ok(Json(
        state
            .coordinator
            .find_user_by_email(&actor, &search.email)
            .await?,
    ))
}

pub async fn update(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
    Payload(changes): Payload<UserChanges>,
) -> ApiResult<Json<User>> {
    Ok(Json(
        state
            .coordinator
            .update_user(&actor, &ctx, id, changes)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.coordinator.delete_user(&actor, &ctx, id).await?;
    Ok(Json(json!({ "message": "Usuário removido com sucesso" })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ClientContext(ctx): ClientContext,
    Path(id): Path<Uuid>,
    Payload(request): Payload<ResetPasswordRequest>,
) -> ApiResult<Json<Value>> {
    state
        .coordinator
        .reset_password(&actor, &ctx, id, request.new_password)
        .await?;
    Ok(Json(json!({ "message": "Senha redefinida com sucesso" })))
}
