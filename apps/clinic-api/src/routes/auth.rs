//! Login e troca da própria senha

use axum::{extract::State, Json};
use clinic_core::commands::PasswordChange;
use clinic_core::{Principal, PrincipalKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;
use validator::Validate;
use zeroize::Zeroizing;

use crate::auth::{Authenticated, ClientContext};
use crate::error::{ApiError, ApiResult};
use crate::extract::Payload;
use crate::state::AppState;

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Formato de email inválido"))]
    pub email: String,
    #[serde(alias = "senha")]
    pub password: Zeroizing<String>,
}

/// Resumo da conta devolvido no login
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: Uuid,
    pub nome: String,
    pub email: String,
    pub tipo: &'static str,
    pub kind: PrincipalKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_access: Option<bool>,
}

impl From<&Principal> for AccountView {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.id(),
            nome: principal.name().to_string(),
            email: principal.email().to_string(),
            tipo: principal.role_name(),
            kind: PrincipalKind::of(principal),
            first_access: match principal {
                Principal::Patient(patient) => Some(patient.first_access),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: AccountView,
}

pub async fn login(
    State(state): State<AppState>,
    Payload(request): Payload<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    request.validate()?;

    let principal = state
        .coordinator
        .authenticate(&request.email, &request.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Credenciais inválidas"))?;

    let access_token = state.tokens.issue(&principal)?;
    info!(principal_id = %principal.id(), role = principal.role_name(), "Sessão iniciada");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.tokens.ttl_secs(),
        user: AccountView::from(&principal),
    }))
}

pub async fn me(Authenticated(principal): Authenticated) -> Json<AccountView> {
    Json(AccountView::from(&principal))
}

pub async fn change_password(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    ClientContext(ctx): ClientContext,
    Payload(change): Payload<PasswordChange>,
) -> ApiResult<Json<Value>> {
    state
        .coordinator
        .change_own_password(&principal, &ctx, change)
        .await?;
    Ok(Json(json!({ "message": "Senha alterada com sucesso" })))
}
