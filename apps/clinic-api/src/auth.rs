//! Tokens de acesso (JWT HS256) e extratores de autenticação

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use clinic_core::{Principal, PrincipalKind, RequestContext};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

const MSG_MISSING_TOKEN: &str = "Token de acesso ausente";
const MSG_INVALID_TOKEN: &str = "Token de acesso inválido ou expirado";
const MSG_UNKNOWN_ACCOUNT: &str = "Conta do token não existe mais";

/// Conteúdo do token de acesso
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: PrincipalKind,
    pub iat: i64,
    pub exp: i64,
}

/// Chaves de assinatura e validade dos tokens
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: principal.id(),
            kind: PrincipalKind::of(principal),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Falha ao assinar token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Token rejeitado");
                ApiError::unauthorized(MSG_INVALID_TOKEN)
            })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Principal da requisição, recarregado do banco a cada chamada
///
/// Assim um papel alterado ou uma conta removida valem imediatamente.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| ApiError::unauthorized(MSG_MISSING_TOKEN))?;
        let claims = state.tokens.verify(token)?;

        state
            .coordinator
            .resolve_principal(claims.kind, claims.sub)
            .await?
            .map(Authenticated)
            .ok_or_else(|| ApiError::unauthorized(MSG_UNKNOWN_ACCOUNT))
    }
}

/// Origem da requisição para a auditoria
///
/// O primeiro endereço de `X-Forwarded-For` vence; sem ele, o endereço do peer
/// (disponível quando o servidor usa `ConnectInfo`).
#[derive(Debug, Clone)]
pub struct ClientContext(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientContext(RequestContext::new(forwarded, peer)))
    }
}
