//! Sistema de migrações para banco de dados
//!
//! Este módulo gerencia as migrações do banco de dados SQLite. A versão
//! aplicada fica em `PRAGMA user_version`.

use anyhow::{Context, Result};
use sqlx::{Executor, SqlitePool};
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_initial_schema.sql
    r#"
    -- Usuários internos (administração e equipe)
    CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('admin', 'staff')),
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    -- Pacientes (também fazem login, senha inicial = CPF)
    CREATE TABLE IF NOT EXISTS patients (
        id BLOB PRIMARY KEY NOT NULL,
        cpf TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        first_access BOOLEAN NOT NULL DEFAULT 1,
        phone TEXT NOT NULL,
        birth_date DATE NOT NULL,
        state TEXT NOT NULL,
        city TEXT NOT NULL,
        district TEXT NOT NULL,
        zip_code TEXT NOT NULL,
        street TEXT NOT NULL,
        number TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    -- Responsáveis legais, no máximo um por paciente
    CREATE TABLE IF NOT EXISTS responsibles (
        id BLOB PRIMARY KEY NOT NULL,
        patient_id BLOB NOT NULL UNIQUE,
        name TEXT NOT NULL,
        cpf TEXT NOT NULL,
        birth_date DATE NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        FOREIGN KEY (patient_id) REFERENCES patients (id) ON DELETE CASCADE
    );

    -- Catálogo de procedimentos; valores em texto decimal
    CREATE TABLE IF NOT EXISTS procedures (
        id BLOB PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        plan_price TEXT NOT NULL,
        private_price TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    -- Atendimentos
    CREATE TABLE IF NOT EXISTS appointments (
        id BLOB PRIMARY KEY NOT NULL,
        scheduled_at TIMESTAMP NOT NULL,
        patient_id BLOB NOT NULL,
        user_id BLOB NOT NULL,
        type TEXT NOT NULL CHECK (type IN ('plano', 'particular')),
        insurance_card TEXT,
        total_value TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        FOREIGN KEY (patient_id) REFERENCES patients (id),
        FOREIGN KEY (user_id) REFERENCES users (id)
    );

    -- Procedimentos de cada atendimento
    CREATE TABLE IF NOT EXISTS appointment_procedures (
        appointment_id BLOB NOT NULL,
        procedure_id BLOB NOT NULL,
        PRIMARY KEY (appointment_id, procedure_id),
        FOREIGN KEY (appointment_id) REFERENCES appointments (id) ON DELETE CASCADE,
        FOREIGN KEY (procedure_id) REFERENCES procedures (id)
    );

    -- Trilha de auditoria (somente inserção); o autor pode ser usuário ou paciente
    CREATE TABLE IF NOT EXISTS audit_logs (
        id BLOB PRIMARY KEY NOT NULL,
        user_id BLOB,
        action TEXT NOT NULL CHECK (action IN ('CREATE', 'UPDATE', 'DELETE')),
        table_name TEXT NOT NULL,
        record_id BLOB NOT NULL,
        old_values TEXT,
        new_values TEXT,
        ip_address TEXT,
        details TEXT,
        created_at TIMESTAMP NOT NULL
    );

    -- Índices para otimização
    CREATE INDEX IF NOT EXISTS idx_appointments_patient_id ON appointments (patient_id);
    CREATE INDEX IF NOT EXISTS idx_appointments_user_id ON appointments (user_id);
    CREATE INDEX IF NOT EXISTS idx_appointments_scheduled_at ON appointments (scheduled_at);
    CREATE INDEX IF NOT EXISTS idx_appointment_procedures_procedure_id ON appointment_procedures (procedure_id);
    CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON audit_logs (created_at);
    CREATE INDEX IF NOT EXISTS idx_audit_logs_table_record ON audit_logs (table_name, record_id);
    "#,
];

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    // Obter a versão atual do banco de dados
    let mut version: i64 = 0;
    match sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
    {
        Ok(v) => version = v,
        Err(e) => {
            error!("Erro ao obter versão do banco: {}", e);
            // Continuar mesmo assim, pois pode ser a primeira execução
        }
    }

    info!("Versão atual do banco: {}", version);

    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        if migration_version <= version {
            info!("Migração {} já aplicada", migration_version);
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        let mut transaction = pool
            .begin()
            .await
            .context(format!("Falha ao iniciar transação para migração {}", migration_version))?;

        // Texto com vários comandos: executado sem preparar
        (&mut *transaction)
            .execute(*migration_sql)
            .await
            .context(format!("Falha ao executar migração {}", migration_version))?;

        (&mut *transaction)
            .execute(format!("PRAGMA user_version = {}", migration_version).as_str())
            .await
            .context(format!("Falha ao atualizar versão para {}", migration_version))?;

        transaction
            .commit()
            .await
            .context(format!("Falha ao confirmar transação para migração {}", migration_version))?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migrations.db");

        let conn_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(conn_options).await?;

        run_migrations(&pool).await?;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await?;

        assert_eq!(version, MIGRATIONS.len() as i64);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&pool)
        .await?;

        for expected in [
            "users",
            "patients",
            "responsibles",
            "procedures",
            "appointments",
            "appointment_procedures",
            "audit_logs",
        ] {
            assert!(tables.contains(&expected.to_string()), "tabela {} ausente", expected);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() -> Result<()> {
        let temp_dir = tempdir()?;
        let conn_options = SqliteConnectOptions::new()
            .filename(temp_dir.path().join("twice.db"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(conn_options).await?;

        run_migrations(&pool).await?;
        run_migrations(&pool).await?;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await?;
        assert_eq!(version, MIGRATIONS.len() as i64);
        Ok(())
    }
}
