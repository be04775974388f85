use anyhow::{Context, Result};
use clinic_api::config::LogFormat;
use clinic_api::{app, auth::TokenKeys, ApiConfig, AppState};
use clinic_core::{init_db_pool, DbConfig, Store};
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).flatten_event(true))
            .init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Falha ao escutar o sinal de encerramento");
    }
    info!("Encerrando servidor");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ApiConfig::from_env().context("Configuração inválida")?;
    init_logging(config.log_format);
    info!(
        version = clinic_api::built_info::PKG_VERSION,
        config = ?config,
        "Iniciando clinic-api"
    );

    let pool = init_db_pool(&DbConfig {
        db_path: config.database_path.clone(),
        max_connections: config.db_max_connections,
        log_statements: false,
    })
    .await?;

    let tokens = TokenKeys::new(config.jwt_secret.as_bytes(), config.token_ttl_secs);
    let state = AppState::with_store(Store::new(pool), tokens);

    if let Some(admin) = config.admin.clone() {
        let created = state
            .coordinator
            .bootstrap_admin(&admin.name, &admin.email, admin.password)
            .await
            .context("Falha ao criar o administrador inicial")?;
        match created {
            Some(user) => info!(user_id = %user.id, "Administrador inicial criado"),
            None => info!(email = %admin.email, "Administrador inicial já existe"),
        }
    }

    let router = app(state, config.concurrency_limit);
    info!(addr = %config.bind_addr, "Servidor ouvindo");
    axum::Server::bind(&config.bind_addr)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Falha no servidor HTTP")?;

    Ok(())
}
