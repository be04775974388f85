//! Coordenador de alterações
//!
//! Cada operação percorre os estágios
//! `Received → Validated → Persisted → Audited → Done`. Erros de validação,
//! permissão, conflito ou "não encontrado" levam a `Rejected` sem gravar nada;
//! uma falha do banco depois da validação leva a `RolledBack` (a transação é
//! descartada e não há auditoria). A auditoria roda depois do commit e o seu
//! resultado não altera o retorno da operação.

use sqlx::SqliteConnection;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditLogger, RequestContext};
use crate::clock::Clock;
use crate::crypto::Hasher;
use crate::error::{CoreError, CoreResult};
use crate::store::{find_by_unique, PageRequest, Store, UniqueField};

mod appointments;
mod auth;
mod patients;
mod procedures;
mod reports;
mod users;

pub use auth::PrincipalKind;

/// Estágio de uma operação de alteração
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Persisted,
    Audited,
    Done,
    Rejected,
    RolledBack,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Persisted => "persisted",
            Stage::Audited => "audited",
            Stage::Done => "done",
            Stage::Rejected => "rejected",
            Stage::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

/// Acompanha os estágios de uma operação
struct Operation {
    name: &'static str,
    stage: Stage,
}

impl Operation {
    fn start(name: &'static str) -> Self {
        debug!(operation = name, stage = %Stage::Received, "Operação recebida");
        Self {
            name,
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug!(
            operation = self.name,
            from = %self.stage,
            to = %stage,
            "Transição de estágio"
        );
        self.stage = stage;
    }

    fn validated(&mut self) {
        self.advance(Stage::Validated);
    }

    fn persisted(&mut self) {
        self.advance(Stage::Persisted);
    }

    /// Fecha a fase transacional: antes da validação o erro é uma rejeição,
    /// depois dela a transação foi desfeita. Falha do banco é sempre
    /// desfazimento, mesmo ao abrir a transação.
    fn settle<T>(&mut self, result: CoreResult<T>) -> CoreResult<T> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let stage = match (&err, self.stage) {
            (CoreError::Persistence(_), _) => Stage::RolledBack,
            (_, Stage::Received) => Stage::Rejected,
            _ => Stage::RolledBack,
        };

        match &err {
            CoreError::Persistence(source) => {
                error!(operation = self.name, error = %source, "Falha de persistência");
            }
            other => {
                warn!(
                    operation = self.name,
                    kind = other.kind(),
                    reason = %other,
                    "Operação recusada"
                );
            }
        }
        self.advance(stage);
        Err(err)
    }
}

/// Ponto de entrada de todas as operações sobre pacientes, procedimentos,
/// atendimentos e usuários
pub struct ChangeCoordinator {
    store: Store,
    audit: Arc<AuditLogger>,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn Hasher>,
}

impl ChangeCoordinator {
    pub fn new(
        store: Store,
        audit: Arc<AuditLogger>,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn Hasher>,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            hasher,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn audit_logger(&self) -> &AuditLogger {
        &self.audit
    }

    /// Registra a auditoria de uma operação já confirmada e a encerra
    async fn finish(&self, op: &mut Operation, ctx: &RequestContext, event: AuditEvent) {
        if self.audit.log_action(ctx, event).await.is_some() {
            op.advance(Stage::Audited);
        }
        op.advance(Stage::Done);
    }
}

/// Recusa `value` se outro registro (diferente de `except`) já o usa
async fn ensure_unique(
    conn: &mut SqliteConnection,
    field: UniqueField,
    value: &str,
    except: Option<Uuid>,
    message: &str,
) -> CoreResult<()> {
    match find_by_unique(conn, field, value).await? {
        Some(existing) if Some(existing) != except => Err(CoreError::conflict(message)),
        _ => Ok(()),
    }
}

/// Texto obrigatório, sem espaços nas pontas
fn required(value: &str, message: &str) -> CoreResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::validation(message));
    }
    Ok(value.to_string())
}

/// Converte `page`/`limit` (base 1) na janela da consulta
///
/// `limit` fica entre 1 e 100; páginas menores que 1 viram a primeira.
pub fn page_request(page: i64, limit: i64) -> PageRequest {
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let page = page.max(1);
    PageRequest::new((page - 1).saturating_mul(limit), limit)
}

pub const MAX_PAGE_SIZE: i64 = 100;

#[cfg(test)]
pub(crate) mod testing {
    //! Coordenador ligado a um banco temporário

    use super::*;
    use crate::audit::{AuditSink, SqliteAuditSink};
    use crate::clock::FixedClock;
    use crate::commands::{NewPatient, NewProcedure, NewUser, ResponsibleInput};
    use crate::crypto::Argon2Hasher;
    use crate::models::{Address, Procedure, Role, User};
    use crate::permission::Principal;
    use crate::store::testing::{test_db, TestDb};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use zeroize::Zeroizing;

    pub struct Harness {
        pub coordinator: ChangeCoordinator,
        pub db: TestDb,
    }

    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    pub async fn harness() -> Harness {
        let db = test_db().await;
        let sink = Arc::new(SqliteAuditSink::new(db.store.clone()));
        harness_with_sink(db, sink)
    }

    pub fn harness_with_sink(db: TestDb, sink: Arc<dyn AuditSink>) -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(today()));
        let audit = Arc::new(AuditLogger::new(sink, clock.clone()));
        let hasher = Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap());
        Harness {
            coordinator: ChangeCoordinator::new(db.store.clone(), audit, clock, hasher),
            db,
        }
    }

    pub fn ctx() -> RequestContext {
        RequestContext::new(Some("203.0.113.7"), None)
    }

    pub fn address() -> Address {
        Address {
            state: "SP".to_string(),
            city: "Campinas".to_string(),
            district: "Cambuí".to_string(),
            zip_code: "13025000".to_string(),
            street: "Rua Coronel Quirino".to_string(),
            number: "100".to_string(),
        }
    }

    pub fn adult_responsible() -> ResponsibleInput {
        ResponsibleInput {
            name: "Marcos Lima".to_string(),
            cpf: "529.982.247-25".to_string(),
            birth_date: "1980-01-01".to_string(),
            email: "marcos@exemplo.com".to_string(),
            phone: "11988887777".to_string(),
        }
    }

    pub fn new_patient(cpf: &str, email: &str, birth_date: &str) -> NewPatient {
        NewPatient {
            cpf: cpf.to_string(),
            name: "Joana Lima".to_string(),
            email: email.to_string(),
            phone: "11999990000".to_string(),
            birth_date: birth_date.to_string(),
            address: address(),
            responsible: None,
        }
    }

    pub fn new_procedure(name: &str, plan: i64, private: i64) -> NewProcedure {
        NewProcedure {
            name: name.to_string(),
            description: None,
            plan_price: Decimal::new(plan, 2),
            private_price: Decimal::new(private, 2),
        }
    }

    impl Harness {
        pub async fn user(&self, role: Role, email: &str) -> User {
            let admin = Principal::Admin(crate::permission::fixtures::user(Role::Admin));
            self.coordinator
                .create_user(
                    &admin,
                    &RequestContext::system(),
                    NewUser {
                        name: "Equipe".to_string(),
                        email: email.to_string(),
                        password: Zeroizing::new("senha-inicial".to_string()),
                        role,
                    },
                )
                .await
                .unwrap()
        }

        pub async fn procedure(&self, name: &str, plan: i64, private: i64) -> Procedure {
            self.coordinator
                .create_procedure(
                    &crate::permission::fixtures::admin(),
                    &RequestContext::system(),
                    new_procedure(name, plan, private),
                )
                .await
                .unwrap()
        }

        pub async fn audit_count(&self) -> i64 {
            sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
                .fetch_one(self.db.store.pool())
                .await
                .unwrap()
        }
    }
}
