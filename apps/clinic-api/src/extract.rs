//! Extratores com rejeição no formato de erro da API

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, rejection::QueryRejection, FromRequest, FromRequestParts, Query},
    http::{request::Parts, Request},
    Json,
};

use crate::error::ApiError;

/// Corpo JSON; falhas de leitura viram `400` com o corpo de erro padrão
#[derive(Debug, Clone, Copy, Default)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for Payload<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(ApiError::bad_request(format!(
                "JSON inválido: {}",
                rejection.body_text()
            ))),
        }
    }
}

/// Parâmetros de query string com a mesma rejeição
#[derive(Debug, Clone, Copy, Default)]
pub struct Params<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Params<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Params(value)),
            Err(rejection) => Err(ApiError::bad_request(format!(
                "Parâmetros inválidos: {}",
                rejection.body_text()
            ))),
        }
    }
}
