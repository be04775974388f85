//! Repositório da trilha de auditoria (somente inserção e leitura)

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::{Page, PageRequest};
use crate::error::DbError;
use crate::models::{AuditAction, AuditLog};

const SELECT_AUDIT_LOG: &str = "SELECT id, user_id, action, table_name, record_id, old_values, \
     new_values, ip_address, details, created_at FROM audit_logs";

/// Filtros da consulta de auditoria
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub table_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn push_filter<'a>(query: &mut QueryBuilder<'a, Sqlite>, filter: &'a AuditFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(action) = filter.action {
        query.push(" AND action = ").push_bind(action.to_string());
    }
    if let Some(table_name) = &filter.table_name {
        query.push(" AND table_name = ").push_bind(table_name.as_str());
    }
    if let Some(user_id) = filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(from) = filter.from {
        query.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND created_at <= ").push_bind(to);
    }
}

pub async fn insert(conn: &mut SqliteConnection, log: &AuditLog) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO audit_logs (id, user_id, action, table_name, record_id, old_values, \
         new_values, ip_address, details, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(log.id)
    .bind(log.user_id)
    .bind(log.action.to_string())
    .bind(&log.table_name)
    .bind(log.record_id)
    .bind(&log.old_values)
    .bind(&log.new_values)
    .bind(&log.ip_address)
    .bind(&log.details)
    .bind(log.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Registros mais recentes primeiro
pub async fn list(
    conn: &mut SqliteConnection,
    filter: &AuditFilter,
    page: PageRequest,
) -> Result<Page<AuditLog>, DbError> {
    let mut count_query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
    push_filter(&mut count_query, filter);
    let total = count_query
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_AUDIT_LOG);
    push_filter(&mut query, filter);
    query
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset);

    let items = query
        .build_query_as::<AuditLog>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(Page { items, total })
}
