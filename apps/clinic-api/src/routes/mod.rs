//! Rotas HTTP

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

pub mod appointments;
pub mod auth;
pub mod patients;
pub mod procedures;
pub mod reports;
pub mod users;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(reports::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/change-password", post(auth::change_password))
        .route("/patients", post(patients::create).get(patients::list))
        .route(
            "/patients/:id",
            get(patients::get)
                .put(patients::update)
                .delete(patients::delete),
        )
        .route("/procedures", post(procedures::create).get(procedures::list))
        .route(
            "/procedures/:id",
            get(procedures::get)
                .put(procedures::update)
                .delete(procedures::delete),
        )
        .route(
            "/appointments",
            post(appointments::create).get(appointments::list),
        )
        .route(
            "/appointments/:id",
            get(appointments::get)
                .put(appointments::update)
                .delete(appointments::delete),
        )
        .route("/users", post(users::create).get(users::list))
        .route("/users/search", get(users::search))
        .route("/users/:id", put(users::update).delete(users::delete))
        .route("/users/:id/reset-password", post(users::reset_password))
        .route("/audit", get(reports::audit_logs))
        .route("/dashboard/stats", get(reports::dashboard))
        .with_state(state)
}
