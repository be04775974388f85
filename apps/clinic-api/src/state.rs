//! Estado compartilhado entre os handlers

use std::sync::Arc;

use clinic_core::{
    Argon2Hasher, AuditLogger, ChangeCoordinator, Clock, Hasher, SqliteAuditSink, Store,
    SystemClock,
};

use crate::auth::TokenKeys;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ChangeCoordinator>,
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(coordinator: ChangeCoordinator, tokens: TokenKeys) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            tokens: Arc::new(tokens),
        }
    }

    /// Coordenador de produção: auditoria no próprio SQLite, relógio do sistema
    /// e Argon2id com os parâmetros padrão
    pub fn with_store(store: Store, tokens: TokenKeys) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_parts(store, tokens, clock, Arc::new(Argon2Hasher::default()))
    }

    pub fn with_parts(
        store: Store,
        tokens: TokenKeys,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn Hasher>,
    ) -> Self {
        let sink = Arc::new(SqliteAuditSink::new(store.clone()));
        let audit = Arc::new(AuditLogger::new(sink, clock.clone()));
        Self::new(ChangeCoordinator::new(store, audit, clock, hasher), tokens)
    }
}
