//! Acesso ao banco SQLite
//!
//! As funções de repositório recebem `&mut SqliteConnection`: dentro de uma
//! operação de alteração é sempre a transação aberta por [`Store::begin`], fora
//! dela uma conexão do pool. Assim o escopo transacional é explícito e nunca
//! compartilhado entre requisições.

use std::ops::{Deref, DerefMut};

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::error::DbError;

pub mod appointments;
pub mod audit;
pub mod patients;
pub mod procedures;
pub mod users;

const SCOPE_CLOSED: &str = "escopo transacional usado após o encerramento";

/// Escopo transacional de uma operação
///
/// Abre com `BEGIN IMMEDIATE`, então o lock de escrita é disputado na abertura,
/// onde o `busy_timeout` da conexão se aplica, e não no meio da operação.
/// Termina uma única vez: [`Scope::commit`] confirma; descartado sem commit,
/// a transação é desfeita antes de a conexão voltar ao pool.
pub struct Scope {
    // `None` apenas depois de `commit` ou durante o `drop`
    conn: Option<PoolConnection<Sqlite>>,
}

impl Scope {
    pub async fn commit(mut self) -> Result<(), DbError> {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
                // Devolve a conexão para o `drop` desfazer a transação
                self.conn = Some(conn);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl Deref for Scope {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        self.conn.as_deref().expect(SCOPE_CLOSED)
    }
}

impl DerefMut for Scope {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        self.conn.as_deref_mut().expect(SCOPE_CLOSED)
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(rollback(conn));
            }
            // Sem runtime: fechar a conexão descarta a transação pendente
            Err(_) => drop(conn.detach()),
        }
    }
}

async fn rollback(mut conn: PoolConnection<Sqlite>) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        warn!(error = %e, "Falha ao desfazer transação; conexão descartada");
        drop(conn.detach());
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Abre o escopo transacional de uma operação, já com o lock de escrita
    pub async fn begin(&self) -> Result<Scope, DbError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Scope { conn: Some(conn) })
    }

    /// Conexão avulsa para consultas fora de uma alteração
    pub async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>, DbError> {
        Ok(self.pool.acquire().await?)
    }
}

/// Campos com restrição de unicidade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    PatientCpf,
    PatientEmail,
    ProcedureName,
    UserEmail,
}

impl UniqueField {
    fn table_and_column(self) -> (&'static str, &'static str) {
        match self {
            UniqueField::PatientCpf => ("patients", "cpf"),
            UniqueField::PatientEmail => ("patients", "email"),
            UniqueField::ProcedureName => ("procedures", "name"),
            UniqueField::UserEmail => ("users", "email"),
        }
    }
}

/// Id do registro que já usa `value` no campo único, se existir
pub async fn find_by_unique(
    conn: &mut SqliteConnection,
    field: UniqueField,
    value: &str,
) -> Result<Option<Uuid>, DbError> {
    let (table, column) = field.table_and_column();
    let sql = format!("SELECT id FROM {} WHERE {} = ?1 LIMIT 1", table, column);
    let id = sqlx::query_scalar::<_, Uuid>(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Janela de uma listagem paginada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}

/// Resultado de uma listagem: a página pedida e o total sem paginação
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
pub(crate) mod testing {
    //! Banco temporário com o esquema aplicado

    use super::*;
    use crate::{init_db_pool, DbConfig};
    use tempfile::TempDir;

    pub struct TestDb {
        pub store: Store,
        // Mantém o diretório vivo enquanto o teste usa o banco
        _dir: TempDir,
    }

    pub async fn test_db() -> TestDb {
        let dir = tempfile::tempdir().expect("diretório temporário");
        let config = DbConfig {
            db_path: dir.path().join("test.db").display().to_string(),
            max_connections: 2,
            log_statements: false,
        };
        let pool = init_db_pool(&config).await.expect("banco de testes");
        TestDb {
            store: Store::new(pool),
            _dir: dir,
        }
    }
}
