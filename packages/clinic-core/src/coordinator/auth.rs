//! Autenticação e troca de senha pelo próprio principal

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::patients::MSG_PATIENT_NOT_FOUND;
use super::users::{check_password, MSG_NEW_PASSWORD_REQUIRED, MSG_WRONG_PASSWORD};
use super::{ChangeCoordinator, Operation};
use crate::audit::{snapshot, AuditEvent, RequestContext};
use crate::commands::PasswordChange;
use crate::error::{CoreError, CoreResult};
use crate::models::{Patient, User};
use crate::permission::Principal;
use crate::store::{patients, users};

const MSG_USER_NOT_FOUND: &str = "Usuário não encontrado";

/// Tipo de conta por trás de um token de sessão
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Patient,
}

impl PrincipalKind {
    pub fn of(principal: &Principal) -> Self {
        match principal {
            Principal::Admin(_) | Principal::Staff(_) => PrincipalKind::User,
            Principal::Patient(_) => PrincipalKind::Patient,
        }
    }
}

/// Estado da conta depois da troca de senha
enum Account {
    User(User, User),
    Patient(Patient, Patient),
}

impl ChangeCoordinator {
    /// Confere email e senha, procurando primeiro entre os usuários internos e
    /// depois entre os pacientes
    ///
    /// `None` quando as credenciais não conferem.
    pub async fn authenticate(&self, email: &str, password: &str) -> CoreResult<Option<Principal>> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Ok(None);
        }

        let mut conn = self.store.acquire().await?;
        if let Some(user) = users::find_by_email(&mut conn, email).await? {
            if self.hasher.verify(password, &user.password_hash) {
                info!(user_id = %user.id, "Login de usuário");
                return Ok(Some(Principal::from_user(user)));
            }
        }
        if let Some(patient) = patients::find_by_email(&mut conn, email).await? {
            if self.hasher.verify(password, &patient.password_hash) {
                info!(patient_id = %patient.id, first_access = patient.first_access, "Login de paciente");
                return Ok(Some(Principal::Patient(patient)));
            }
        }

        debug!("Credenciais inválidas");
        Ok(None)
    }

    /// Recarrega o principal de uma sessão; `None` se a conta não existe mais
    pub async fn resolve_principal(
        &self,
        kind: PrincipalKind,
        id: Uuid,
    ) -> CoreResult<Option<Principal>> {
        let mut conn = self.store.acquire().await?;
        let principal = match kind {
            PrincipalKind::User => users::find(&mut conn, id).await?.map(Principal::from_user),
            PrincipalKind::Patient => patients::find(&mut conn, id).await?.map(Principal::Patient),
        };
        Ok(principal)
    }

    /// Troca a senha do próprio principal
    ///
    /// Pacientes em primeiro acesso trocam sem informar a senha atual (que é o
    /// CPF); a troca encerra o primeiro acesso.
    pub async fn change_own_password(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        change: PasswordChange,
    ) -> CoreResult<()> {
        let mut op = Operation::start("change_own_password");
        let result = self.change_own_password_tx(&mut op, actor, change).await;
        let account = op.settle(result)?;

        let event = match account {
            Account::User(before, after) => {
                info!(user_id = %after.id, "Senha alterada");
                AuditEvent::updated("users", after.id, snapshot(&before), snapshot(&after))
            }
            Account::Patient(before, after) => {
                info!(patient_id = %after.id, first_access = before.first_access, "Senha alterada");
                AuditEvent::updated("patients", after.id, snapshot(&before), snapshot(&after))
            }
        };
        let event = event.by(actor.id()).with_details("Senha alterada");
        self.finish(&mut op, ctx, event).await;
        Ok(())
    }

    async fn change_own_password_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        change: PasswordChange,
    ) -> CoreResult<Account> {
        check_password(&change.new_password, MSG_NEW_PASSWORD_REQUIRED)?;

        let mut scope = self.store.begin().await?;
        match actor {
            Principal::Patient(me) => {
                let current = patients::find(&mut scope, me.id)
                    .await?
                    .ok_or_else(|| CoreError::not_found(MSG_PATIENT_NOT_FOUND))?;
                if !current.first_access {
                    self.check_current(change.current_password.as_deref(), &current.password_hash)?;
                }

                let mut next = current.clone();
                next.password_hash = self.hasher.hash(&change.new_password)?;
                next.first_access = false;
                next.updated_at = self.clock.now();
                op.validated();

                patients::update(&mut scope, &next).await?;
                scope.commit().await?;
                op.persisted();
                Ok(Account::Patient(current, next))
            }
            Principal::Admin(me) | Principal::Staff(me) => {
                let current = users::find(&mut scope, me.id)
                    .await?
                    .ok_or_else(|| CoreError::not_found(MSG_USER_NOT_FOUND))?;
                self.check_current(change.current_password.as_deref(), &current.password_hash)?;

                let mut next = current.clone();
                next.password_hash = self.hasher.hash(&change.new_password)?;
                next.updated_at = self.clock.now();
                op.validated();

                users::update(&mut scope, &next).await?;
                scope.commit().await?;
                op.persisted();
                Ok(Account::User(current, next))
            }
        }
    }

    fn check_current(&self, given: Option<&String>, hash: &str) -> CoreResult<()> {
        match given {
            Some(password) if self.hasher.verify(password, hash) => Ok(()),
            _ => Err(CoreError::validation(MSG_WRONG_PASSWORD)),
        }
    }
}
