//! Erros da API e sua conversão em respostas HTTP
//!
//! Toda resposta de erro tem o corpo `{"error": <mensagem>, "kind": <tipo>}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use clinic_core::CoreError;
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Token ausente, inválido ou expirado, ou credenciais que não conferem
    #[error("{0}")]
    Unauthorized(String),

    /// Corpo ou parâmetros que nem chegaram a ser lidos
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Core(err) => {
                let status = match err {
                    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    CoreError::Conflict(_) => StatusCode::CONFLICT,
                    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::Permission(_) => StatusCode::FORBIDDEN,
                    CoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind())
            }
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "Erro interno");
                "Erro interno do servidor".to_string()
            }
            // Mensagem genérica; a causa já foi registrada pelo núcleo
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: message, kind })).into_response()
    }
}

/// Primeira mensagem de validação, com o nome do campo quando não há mensagem
impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Campo inválido: {}", field),
                })
            })
            .next()
            .unwrap_or_else(|| "Dados inválidos".to_string());
        ApiError::BadRequest(message)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
