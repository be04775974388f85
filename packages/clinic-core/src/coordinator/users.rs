//! Usuários internos (administração e equipe)

use tracing::info;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{ensure_unique, required, ChangeCoordinator, Operation};
use crate::audit::{snapshot, AuditEvent, RequestContext};
use crate::commands::{NewUser, UserChanges};
use crate::error::{CoreError, CoreResult};
use crate::models::{Role, User};
use crate::permission::{self, Capability, Principal};
use crate::store::{appointments, users, Page, PageRequest, UniqueField};
use crate::validators::validate_email;

const TABLE: &str = "users";

const MSG_USER_NOT_FOUND: &str = "Usuário não encontrado";
const MSG_REQUIRED_FIELDS: &str = "Nome, email e senha são obrigatórios";
const MSG_INVALID_EMAIL: &str = "Formato de email inválido";
const MSG_EMAIL_IN_USE: &str = "Email já está em uso";
const MSG_EMAIL_REQUIRED: &str = "Email é obrigatório";
pub(super) const MSG_NEW_PASSWORD_REQUIRED: &str = "Nova senha é obrigatória";
const MSG_CURRENT_PASSWORD_REQUIRED: &str = "Senha atual é obrigatória para trocar a senha";
pub(super) const MSG_WRONG_PASSWORD: &str = "Senha atual incorreta";
const MSG_HAS_APPOINTMENTS: &str = "Não é possível remover usuário com atendimentos";

fn check_email(raw: &str) -> CoreResult<String> {
    let email = raw.trim();
    if !validate_email(email) {
        return Err(CoreError::validation(MSG_INVALID_EMAIL));
    }
    Ok(email.to_string())
}

/// Senha não vazia; espaços fazem parte da senha
pub(super) fn check_password(password: &str, message: &str) -> CoreResult<()> {
    if password.trim().is_empty() {
        return Err(CoreError::validation(message));
    }
    Ok(())
}

impl ChangeCoordinator {
    /// Cria um usuário (somente administradores)
    pub async fn create_user(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        input: NewUser,
    ) -> CoreResult<User> {
        let mut op = Operation::start("create_user");
        let result = self.create_user_tx(&mut op, actor, input).await;
        let user = op.settle(result)?;

        info!(user_id = %user.id, role = %user.role, "Usuário criado");
        let event = AuditEvent::created(TABLE, user.id, snapshot(&user))
            .by(actor.id())
            .with_details(format!("Usuário {} criado", user.email));
        self.finish(&mut op, ctx, event).await;
        Ok(user)
    }

    async fn create_user_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        input: NewUser,
    ) -> CoreResult<User> {
        permission::require(actor, Capability::ManageUsers)?;
        self.insert_user(op, input).await
    }

    async fn insert_user(&self, op: &mut Operation, input: NewUser) -> CoreResult<User> {
        let name = required(&input.name, MSG_REQUIRED_FIELDS)?;
        check_password(&input.password, MSG_REQUIRED_FIELDS)?;
        let email = check_email(&input.email)?;

        let mut scope = self.store.begin().await?;
        ensure_unique(&mut scope, UniqueField::UserEmail, &email, None, MSG_EMAIL_IN_USE).await?;

        let now = self.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash: self.hasher.hash(&input.password)?,
            role: input.role,
            created_at: now,
            updated_at: now,
        };
        op.validated();

        users::insert(&mut scope, &user).await?;
        scope.commit().await?;
        op.persisted();
        Ok(user)
    }

    /// Cria o administrador inicial, se o email ainda não estiver cadastrado
    pub async fn bootstrap_admin(
        &self,
        name: &str,
        email: &str,
        password: Zeroizing<String>,
    ) -> CoreResult<Option<User>> {
        let mut conn = self.store.acquire().await?;
        if users::find_by_email(&mut conn, email.trim()).await?.is_some() {
            return Ok(None);
        }
        drop(conn);

        let mut op = Operation::start("bootstrap_admin");
        let input = NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password,
            role: Role::Admin,
        };
        let result = self.insert_user(&mut op, input).await;
        let user = op.settle(result)?;

        info!(user_id = %user.id, email = %user.email, "Administrador inicial criado");
        let event = AuditEvent::created(TABLE, user.id, snapshot(&user))
            .with_details("Administrador inicial criado");
        self.finish(&mut op, &RequestContext::system(), event).await;
        Ok(Some(user))
    }

    /// Atualiza nome, email, papel ou senha de um usuário
    ///
    /// Trocar a senha por aqui exige a senha atual.
    pub async fn update_user(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
        changes: UserChanges,
    ) -> CoreResult<User> {
        let mut op = Operation::start("update_user");
        let password_changed = changes.password.is_some();
        let result = self.update_user_tx(&mut op, actor, id, changes).await;
        let (before, after) = op.settle(result)?;

        info!(user_id = %id, password_changed, "Usuário atualizado");
        let details = if password_changed {
            "Usuário atualizado (senha alterada)"
        } else {
            "Usuário atualizado"
        };
        let event = AuditEvent::updated(TABLE, id, snapshot(&before), snapshot(&after))
            .by(actor.id())
            .with_details(details);
        self.finish(&mut op, ctx, event).await;
        Ok(after)
    }

    async fn update_user_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
        changes: UserChanges,
    ) -> CoreResult<(User, User)> {
        let mut scope = self.store.begin().await?;
        let current = users::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_USER_NOT_FOUND))?;

        let changes_role = changes.role.map_or(false, |role| role != current.role);
        permission::authorize_user_update(actor, id, changes_role)?;

        let mut next = current.clone();
        if let Some(email) = changes.email {
            let email = check_email(&email)?;
            if email != current.email {
                ensure_unique(&mut scope, UniqueField::UserEmail, &email, Some(id), MSG_EMAIL_IN_USE)
                    .await?;
                next.email = email;
            }
        }
        if let Some(name) = changes.name {
            next.name = required(&name, MSG_REQUIRED_FIELDS)?;
        }
        if let Some(role) = changes.role {
            next.role = role;
        }
        if let Some(password) = changes.password {
            check_password(&password, MSG_NEW_PASSWORD_REQUIRED)?;
            let current_password = changes
                .current_password
                .ok_or_else(|| CoreError::validation(MSG_CURRENT_PASSWORD_REQUIRED))?;
            if !self.hasher.verify(&current_password, &current.password_hash) {
                return Err(CoreError::validation(MSG_WRONG_PASSWORD));
            }
            next.password_hash = self.hasher.hash(&password)?;
        }
        next.updated_at = self.clock.now();
        op.validated();

        users::update(&mut scope, &next).await?;
        scope.commit().await?;
        op.persisted();
        Ok((current, next))
    }

    /// Remove um usuário sem atendimentos (somente administradores)
    pub async fn delete_user(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
    ) -> CoreResult<()> {
        let mut op = Operation::start("delete_user");
        let result = self.delete_user_tx(&mut op, actor, id).await;
        let removed = op.settle(result)?;

        info!(user_id = %id, "Usuário removido");
        let event = AuditEvent::deleted(TABLE, id, snapshot(&removed))
            .by(actor.id())
            .with_details(format!("Usuário {} removido", removed.email));
        self.finish(&mut op, ctx, event).await;
        Ok(())
    }

    async fn delete_user_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
    ) -> CoreResult<User> {
        permission::authorize_user_delete(actor, id)?;

        let mut scope = self.store.begin().await?;
        let user = users::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_USER_NOT_FOUND))?;
        if appointments::count_by_user(&mut scope, id).await? > 0 {
            return Err(CoreError::conflict(MSG_HAS_APPOINTMENTS));
        }
        op.validated();

        users::delete(&mut scope, id).await?;
        scope.commit().await?;
        op.persisted();
        Ok(user)
    }

    /// Redefine a senha de outro usuário sem exigir a senha atual
    pub async fn reset_password(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
        new_password: Zeroizing<String>,
    ) -> CoreResult<()> {
        let mut op = Operation::start("reset_password");
        let result = self.reset_password_tx(&mut op, actor, id, new_password).await;
        let (before, after) = op.settle(result)?;

        info!(user_id = %id, "Senha de usuário redefinida");
        let event = AuditEvent::updated(TABLE, id, snapshot(&before), snapshot(&after))
            .by(actor.id())
            .with_details("Senha redefinida por administrador");
        self.finish(&mut op, ctx, event).await;
        Ok(())
    }

    async fn reset_password_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
        new_password: Zeroizing<String>,
    ) -> CoreResult<(User, User)> {
        permission::require(actor, Capability::ManageUsers)?;
        check_password(&new_password, MSG_NEW_PASSWORD_REQUIRED)?;

        let mut scope = self.store.begin().await?;
        let current = users::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_USER_NOT_FOUND))?;

        let mut next = current.clone();
        next.password_hash = self.hasher.hash(&new_password)?;
        next.updated_at = self.clock.now();
        op.validated();

        users::update(&mut scope, &next).await?;
        scope.commit().await?;
        op.persisted();
        Ok((current, next))
    }

    /// Usuários mais recentes primeiro (somente administradores)
    pub async fn list_users(&self, actor: &Principal, page: PageRequest) -> CoreResult<Page<User>> {
        permission::require(actor, Capability::ManageUsers)?;

        let mut conn = self.store.acquire().await?;
        Ok(users::list(&mut conn, page).await?)
    }

    /// Administradores buscam qualquer email; os demais apenas o próprio
    pub async fn find_user_by_email(&self, actor: &Principal, email: &str) -> CoreResult<User> {
        let email = email.trim();
        if email.is_empty() {
            return Err(CoreError::validation(MSG_EMAIL_REQUIRED));
        }
        permission::authorize_user_lookup(actor, email)?;

        let mut conn = self.store.acquire().await?;
        users::find_by_email(&mut conn, email)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_USER_NOT_FOUND))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::commands::NewAppointment;
    use crate::models::AppointmentType;
    use crate::permission::fixtures;

    fn secret(value: &str) -> Zeroizing<String> {
        Zeroizing::new(value.to_string())
    }

    #[tokio::test]
    async fn test_created_user_snapshot_has_no_password_hash() {
        let h = harness().await;
        let user = h.user(Role::Staff, "recepcao@clinica.med.br").await;

        assert!(h.coordinator.hasher.verify("senha-inicial", &user.password_hash));
        let new_values: Option<String> =
            sqlx::query_scalar("SELECT new_values FROM audit_logs WHERE record_id = ?1")
                .bind(user.id)
                .fetch_one(h.db.store.pool())
                .await
                .unwrap();
        let new_values = new_values.unwrap();
        assert!(!new_values.contains("password_hash"));
        assert!(!new_values.contains("argon2"));
    }

    #[tokio::test]
    async fn test_staff_cannot_create_users_or_promote_themselves() {
        let h = harness().await;
        let staff_user = h.user(Role::Staff, "recepcao@clinica.med.br").await;
        let staff = Principal::Staff(staff_user.clone());

        let err = h
            .coordinator
            .create_user(
                &staff,
                &ctx(),
                NewUser {
                    name: "Outra".to_string(),
                    email: "outra@clinica.med.br".to_string(),
                    password: secret("123456"),
                    role: Role::Staff,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let err = h
            .coordinator
            .update_user(
                &staff,
                &ctx(),
                staff_user.id,
                UserChanges {
                    role: Some(Role::Admin),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let renamed = h
            .coordinator
            .update_user(
                &staff,
                &ctx(),
                staff_user.id,
                UserChanges {
                    name: Some("Recepção".to_string()),
                    role: Some(Role::Staff),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Recepção");
    }

    #[tokio::test]
    async fn test_password_change_requires_current_password() {
        let h = harness().await;
        let user = h.user(Role::Staff, "recepcao@clinica.med.br").await;
        let me = Principal::Staff(user.clone());

        let err = h
            .coordinator
            .update_user(
                &me,
                &ctx(),
                user.id,
                UserChanges {
                    password: Some(secret("nova-senha")),
                    current_password: Some(secret("chute")),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_WRONG_PASSWORD);

        let updated = h
            .coordinator
            .update_user(
                &me,
                &ctx(),
                user.id,
                UserChanges {
                    password: Some(secret("nova-senha")),
                    current_password: Some(secret("senha-inicial")),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert!(h.coordinator.hasher.verify("nova-senha", &updated.password_hash));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let h = harness().await;
        let admin_user = h.user(Role::Admin, "admin@clinica.med.br").await;
        let admin = Principal::Admin(admin_user.clone());
        let author = h.user(Role::Staff, "autora@clinica.med.br").await;
        let idle = h.user(Role::Staff, "ociosa@clinica.med.br").await;

        let consulta = h.procedure("Consulta", 100_00, 150_00).await;
        let patient = h
            .coordinator
            .create_patient(
                &admin,
                &ctx(),
                new_patient("11144477735", "joana@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap();
        h.coordinator
            .create_appointment(
                &Principal::Staff(author.clone()),
                &ctx(),
                NewAppointment {
                    scheduled_at: "2024-06-15T11:00".to_string(),
                    patient_id: patient.id,
                    kind: AppointmentType::Private,
                    insurance_card: None,
                    procedure_ids: vec![consulta.id],
                },
            )
            .await
            .unwrap();

        let err = h
            .coordinator
            .delete_user(&admin, &ctx(), author.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict_error");

        let err = h
            .coordinator
            .delete_user(&admin, &ctx(), admin_user.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let err = h
            .coordinator
            .delete_user(&Principal::Staff(author.clone()), &ctx(), idle.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        h.coordinator
            .delete_user(&admin, &ctx(), idle.id)
            .await
            .unwrap();
        let page = h
            .coordinator
            .list_users(&admin, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_reset_password_and_lookup() {
        let h = harness().await;
        let user = h.user(Role::Staff, "recepcao@clinica.med.br").await;
        let me = Principal::Staff(user.clone());

        let err = h
            .coordinator
            .reset_password(&me, &ctx(), user.id, secret("outra"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        h.coordinator
            .reset_password(&fixtures::admin(), &ctx(), user.id, secret("redefinida"))
            .await
            .unwrap();
        let found = h
            .coordinator
            .find_user_by_email(&me, "recepcao@clinica.med.br")
            .await
            .unwrap();
        assert!(h.coordinator.hasher.verify("redefinida", &found.password_hash));

        let err = h
            .coordinator
            .find_user_by_email(&me, "admin@clinica.med.br")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let err = h
            .coordinator
            .find_user_by_email(&fixtures::admin(), "ninguem@clinica.med.br")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_bootstrap_admin_runs_once() {
        let h = harness().await;

        let created = h
            .coordinator
            .bootstrap_admin("Administrador", "admin@clinica.med.br", secret("trocar-depois"))
            .await
            .unwrap();
        assert_eq!(created.map(|u| u.role), Some(Role::Admin));

        let again = h
            .coordinator
            .bootstrap_admin("Administrador", "admin@clinica.med.br", secret("trocar-depois"))
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(h.audit_count().await, 1);
    }
}
