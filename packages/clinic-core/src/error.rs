//! Definições de erro para o núcleo da clínica
//!
//! Dois níveis de erro convivem aqui:
//! - [`DbError`]: falhas do armazenamento, convertidas a partir do SQLx
//! - [`CoreError`]: a taxonomia exposta aos chamadores (API HTTP, CLI, testes)

use thiserror::Error;

/// Códigos estendidos do SQLite para violações de restrição
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

/// Erros específicos para operações de banco de dados
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Erro de conexão com banco de dados: {0}")]
    ConnectionError(String),

    #[error("Erro de migração: {0}")]
    MigrationError(String),

    #[error("Erro de consulta: {0}")]
    QueryError(String),

    #[error("Entidade não encontrada: {0}")]
    NotFound(String),

    #[error("Violação de restrição: {0}")]
    ConstraintViolation(String),

    #[error("Erro de serialização: {0}")]
    SerializationError(String),

    #[error("Erro interno: {0}")]
    InternalError(String),
}

/// Conversão de erros específicos do SQLx para nossos tipos de erro
impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DbError::NotFound("Registro não encontrado".to_string()),
            sqlx::Error::Database(dbe) => {
                if let Some(code) = dbe.code() {
                    let code = code.as_ref();
                    if code == SQLITE_CONSTRAINT_UNIQUE
                        || code == SQLITE_CONSTRAINT_PRIMARYKEY
                        || code == SQLITE_CONSTRAINT_FOREIGNKEY
                    {
                        return DbError::ConstraintViolation(dbe.message().to_string());
                    }
                }
                DbError::QueryError(dbe.message().to_string())
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::QueryError(format!("Coluna não encontrada: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::QueryError(format!("Erro ao decodificar coluna {}: {}", index, source))
            }
            sqlx::Error::Io(io_err) => DbError::ConnectionError(io_err.to_string()),
            sqlx::Error::Configuration(conf_err) => DbError::ConnectionError(conf_err.to_string()),
            sqlx::Error::PoolClosed => {
                DbError::ConnectionError("Pool de conexões fechado".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                DbError::ConnectionError("Timeout no pool de conexões".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                DbError::InternalError("Worker do banco de dados falhou".to_string())
            }
            _ => DbError::InternalError(format!("Erro inesperado: {:?}", error)),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(error: serde_json::Error) -> Self {
        DbError::SerializationError(error.to_string())
    }
}

/// Erros devolvidos pelas operações do núcleo
///
/// Validação, conflito, permissão e "não encontrado" são resultados esperados e
/// carregam uma mensagem legível. Falhas de persistência escondem a causa: a
/// mensagem pública é genérica e o detalhe fica apenas no `source`.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Permission(String),

    #[error("Erro interno ao processar a operação")]
    Persistence(#[source] DbError),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        CoreError::Permission(message.into())
    }

    /// Identificador estável do tipo de erro, usado nas respostas JSON
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::Conflict(_) => "conflict_error",
            CoreError::NotFound(_) => "not_found",
            CoreError::Permission(_) => "permission_error",
            CoreError::Persistence(_) => "persistence_error",
        }
    }
}

/// Violações de restrição viram conflito: a constraint `UNIQUE` do banco é a
/// guarda definitiva de unicidade, a verificação prévia só melhora a mensagem.
impl From<DbError> for CoreError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::ConstraintViolation(detail) => {
                tracing::warn!(%detail, "Violação de restrição no banco de dados");
                CoreError::Conflict("Registro conflita com dados existentes".to_string())
            }
            other => CoreError::Persistence(other),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(error: sqlx::Error) -> Self {
        DbError::from(error).into()
    }
}

/// Resultado padrão das operações do núcleo
pub type CoreResult<T> = std::result::Result<T, CoreError>;
