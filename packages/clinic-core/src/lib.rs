//! Clinic Core - Núcleo do back-office da clínica
//!
//! Esta biblioteca fornece:
//! - Validação de identidade (CPF, email, idade) e regras de responsável legal
//! - Precificação de atendimentos por convênio ou particular
//! - Controle de acesso por papel e por posse
//! - Trilha de auditoria de melhor esforço
//! - O coordenador de alterações, que amarra validação, persistência e auditoria
//! - Pool de conexão e migrações do SQLite

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod audit;
pub mod clock;
pub mod commands;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod guardian;
pub mod migrations;
pub mod models;
pub mod permission;
pub mod pricing;
pub mod store;
pub mod validators;

pub use audit::{AuditEvent, AuditFilter, AuditLogger, AuditSink, RequestContext, SqliteAuditSink};
pub use clock::{Clock, SystemClock};
pub use coordinator::{ChangeCoordinator, PrincipalKind};
pub use crypto::{Argon2Hasher, Hasher};
pub use error::{CoreError, CoreResult, DbError};
pub use permission::Principal;
pub use store::{Page, PageRequest, Store};

/// Configuração da conexão com o banco de dados
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
    /// Registra cada comando SQL executado
    pub log_statements: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_path: "data/clinic.db".to_string(),
            max_connections: 5,
            log_statements: false,
        }
    }
}

/// Espera máxima pelo lock de escrita ao abrir uma transação
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Inicializa uma conexão com o banco de dados SQLite e aplica as migrações
pub async fn init_db_pool(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = Path::new(&config.db_path);

    // Verifica se o diretório pai existe
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .context("Falha ao criar diretório para banco de dados")?;
        }
    }

    let mut connection_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .pragma("synchronous", "NORMAL");

    if !config.log_statements {
        connection_options = connection_options.disable_statement_logging();
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connection_options)
        .await
        .context("Falha ao conectar ao banco de dados SQLite")?;

    migrations::run_migrations(&pool)
        .await
        .context("Falha ao aplicar migrações")?;

    info!("Banco de dados inicializado com sucesso: {}", config.db_path);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_db_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("test.db");

        let config = DbConfig {
            db_path: db_path.to_str().unwrap().to_string(),
            max_connections: 2,
            log_statements: true,
        };

        let pool = init_db_pool(&config).await?;

        let result: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
        assert_eq!(result.0, 1);

        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await?;
        assert_eq!(foreign_keys, 1);

        Ok(())
    }
}
