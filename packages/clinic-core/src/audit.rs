//! Trilha de auditoria
//!
//! Toda alteração confirmada gera um registro com quem fez, o quê, em qual
//! tabela e o estado antes/depois. A gravação é de melhor esforço: roda depois
//! do commit da operação, em escopo próprio, e uma falha aqui nunca muda o
//! resultado devolvido ao chamador. Falhas são registradas no `tracing` e
//! contadas em [`AuditLogger::failed_writes`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DbError;
use crate::models::{AuditAction, AuditLog};
use crate::store::{self, Store};

pub use crate::store::audit::AuditFilter;

/// Dados da requisição que originou a alteração
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    client_ip: Option<String>,
}

impl RequestContext {
    /// O primeiro endereço de `X-Forwarded-For` tem precedência sobre o peer
    pub fn new(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> Self {
        let forwarded = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        Self {
            client_ip: forwarded.or_else(|| peer.map(|ip| ip.to_string())),
        }
    }

    /// Alterações sem requisição de origem (bootstrap, tarefas internas)
    pub fn system() -> Self {
        Self::default()
    }

    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }
}

/// Serializa uma entidade para o snapshot de auditoria
pub fn snapshot<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "Falha ao serializar snapshot de auditoria");
        Value::Null
    })
}

/// Texto gravado nas colunas `old_values`/`new_values`
///
/// Textos são gravados como estão; qualquer outro valor vira JSON.
fn render(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Alteração a ser registrada
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: Uuid,
    pub actor: Option<Uuid>,
    pub old_values: Value,
    pub new_values: Value,
    pub details: Option<String>,
}

impl AuditEvent {
    fn new(action: AuditAction, table_name: &str, record_id: Uuid) -> Self {
        Self {
            action,
            table_name: table_name.to_string(),
            record_id,
            actor: None,
            old_values: Value::Null,
            new_values: Value::Null,
            details: None,
        }
    }

    pub fn created(table_name: &str, record_id: Uuid, new_values: Value) -> Self {
        Self {
            new_values,
            ..Self::new(AuditAction::Create, table_name, record_id)
        }
    }

    pub fn updated(table_name: &str, record_id: Uuid, old_values: Value, new_values: Value) -> Self {
        Self {
            old_values,
            new_values,
            ..Self::new(AuditAction::Update, table_name, record_id)
        }
    }

    pub fn deleted(table_name: &str, record_id: Uuid, old_values: Value) -> Self {
        Self {
            old_values,
            ..Self::new(AuditAction::Delete, table_name, record_id)
        }
    }

    pub fn by(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Destino dos registros de auditoria
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditLog) -> Result<(), DbError>;
}

/// Grava a auditoria na tabela `audit_logs`, numa conexão própria do pool
#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    store: Store,
}

impl SqliteAuditSink {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, entry: &AuditLog) -> Result<(), DbError> {
        let mut conn = self.store.acquire().await?;
        store::audit::insert(&mut conn, entry).await
    }
}

pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    failures: AtomicU64,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink,
            clock,
            failures: AtomicU64::new(0),
        }
    }

    /// Registra a alteração; devolve o registro gravado ou `None` se a gravação
    /// falhou
    pub async fn log_action(&self, ctx: &RequestContext, event: AuditEvent) -> Option<AuditLog> {
        let entry = AuditLog {
            id: Uuid::new_v4(),
            user_id: event.actor,
            action: event.action,
            table_name: event.table_name,
            record_id: event.record_id,
            old_values: render(event.old_values),
            new_values: render(event.new_values),
            ip_address: ctx.client_ip().map(str::to_string),
            details: event.details,
            created_at: self.clock.now(),
        };

        match self.sink.append(&entry).await {
            Ok(()) => {
                debug!(
                    action = %entry.action,
                    table = %entry.table_name,
                    record_id = %entry.record_id,
                    "Registro de auditoria gravado"
                );
                Some(entry)
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    error = %e,
                    action = %entry.action,
                    table = %entry.table_name,
                    record_id = %entry.record_id,
                    failures,
                    "Falha ao gravar registro de auditoria"
                );
                None
            }
        }
    }

    /// Quantas gravações de auditoria falharam desde a criação do logger
    pub fn failed_writes(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
