//! Clinic API - API HTTP do back-office da clínica
//!
//! Camada fina sobre o `clinic-core`: autentica a requisição (JWT), monta o
//! contexto de auditoria e delega ao [`clinic_core::ChangeCoordinator`].

use axum::{extract::DefaultBodyLimit, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod pagination;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Informações geradas pelo `build.rs`
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Router completo com as camadas de trace, CORS, compressão e limites
pub fn app(state: AppState, concurrency_limit: usize) -> Router {
    routes::router(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
        .layer(TraceLayer::new_for_http())
}
