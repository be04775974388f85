//! Catálogo de procedimentos (somente administradores alteram)

use tracing::info;
use uuid::Uuid;

use super::{ensure_unique, required, ChangeCoordinator, Operation};
use crate::audit::{snapshot, AuditEvent, RequestContext};
use crate::commands::{NewProcedure, ProcedureChanges};
use crate::error::{CoreError, CoreResult};
use crate::models::Procedure;
use crate::permission::{self, Capability, Principal};
use crate::pricing::normalize_price;
use crate::store::{procedures, Page, PageRequest, UniqueField};

const TABLE: &str = "procedures";

const MSG_PROCEDURE_NOT_FOUND: &str = "Procedimento não encontrado";
const MSG_NAME_REQUIRED: &str = "Nome do procedimento é obrigatório";
const MSG_NAME_IN_USE: &str = "Nome do procedimento já existe";
const MSG_IN_USE: &str = "Não é possível remover procedimento usado em atendimentos";

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

impl ChangeCoordinator {
    pub async fn create_procedure(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        input: NewProcedure,
    ) -> CoreResult<Procedure> {
        let mut op = Operation::start("create_procedure");
        let result = self.create_procedure_tx(&mut op, actor, input).await;
        let procedure = op.settle(result)?;

        info!(procedure_id = %procedure.id, name = %procedure.name, "Procedimento cadastrado");
        let event = AuditEvent::created(TABLE, procedure.id, snapshot(&procedure))
            .by(actor.id())
            .with_details(format!("Procedimento {} cadastrado", procedure.name));
        self.finish(&mut op, ctx, event).await;
        Ok(procedure)
    }

    async fn create_procedure_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        input: NewProcedure,
    ) -> CoreResult<Procedure> {
        permission::require(actor, Capability::ManageProcedures)?;

        let name = required(&input.name, MSG_NAME_REQUIRED)?;
        let plan_price = normalize_price(input.plan_price)?;
        let private_price = normalize_price(input.private_price)?;

        let mut scope = self.store.begin().await?;
        ensure_unique(&mut scope, UniqueField::ProcedureName, &name, None, MSG_NAME_IN_USE)
            .await?;

        let now = self.clock.now();
        let procedure = Procedure {
            id: Uuid::new_v4(),
            name,
            description: clean_description(input.description),
            plan_price,
            private_price,
            created_at: now,
            updated_at: now,
        };
        op.validated();

        procedures::insert(&mut scope, &procedure).await?;
        scope.commit().await?;
        op.persisted();
        Ok(procedure)
    }

    /// Altera nome, descrição ou preços
    ///
    /// Atendimentos já registrados mantêm o valor total calculado na época.
    pub async fn update_procedure(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
        changes: ProcedureChanges,
    ) -> CoreResult<Procedure> {
        let mut op = Operation::start("update_procedure");
        let result = self.update_procedure_tx(&mut op, actor, id, changes).await;
        let (before, after) = op.settle(result)?;

        info!(procedure_id = %id, "Procedimento atualizado");
        let event = AuditEvent::updated(TABLE, id, snapshot(&before), snapshot(&after))
            .by(actor.id())
            .with_details(format!("Procedimento {} atualizado", after.name));
        self.finish(&mut op, ctx, event).await;
        Ok(after)
    }

    async fn update_procedure_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
        changes: ProcedureChanges,
    ) -> CoreResult<(Procedure, Procedure)> {
        permission::require(actor, Capability::ManageProcedures)?;

        let mut scope = self.store.begin().await?;
        let current = procedures::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_PROCEDURE_NOT_FOUND))?;

        let mut next = current.clone();
        if let Some(name) = changes.name {
            let name = required(&name, MSG_NAME_REQUIRED)?;
            if name != current.name {
                ensure_unique(
                    &mut scope,
                    UniqueField::ProcedureName,
                    &name,
                    Some(id),
                    MSG_NAME_IN_USE,
                )
                .await?;
                next.name = name;
            }
        }
        if changes.description.is_some() {
            next.description = clean_description(changes.description);
        }
        if let Some(price) = changes.plan_price {
            next.plan_price = normalize_price(price)?;
        }
        if let Some(price) = changes.private_price {
            next.private_price = normalize_price(price)?;
        }
        next.updated_at = self.clock.now();
        op.validated();

        procedures::update(&mut scope, &next).await?;
        scope.commit().await?;
        op.persisted();
        Ok((current, next))
    }

    /// Remove um procedimento que nenhum atendimento usa
    pub async fn delete_procedure(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
    ) -> CoreResult<()> {
        let mut op = Operation::start("delete_procedure");
        let result = self.delete_procedure_tx(&mut op, actor, id).await;
        let removed = op.settle(result)?;

        info!(procedure_id = %id, "Procedimento removido");
        let event = AuditEvent::deleted(TABLE, id, snapshot(&removed))
            .by(actor.id())
            .with_details(format!("Procedimento {} removido", removed.name));
        self.finish(&mut op, ctx, event).await;
        Ok(())
    }

    async fn delete_procedure_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
    ) -> CoreResult<Procedure> {
        permission::require(actor, Capability::ManageProcedures)?;

        let mut scope = self.store.begin().await?;
        let procedure = procedures::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_PROCEDURE_NOT_FOUND))?;
        if procedures::count_references(&mut scope, id).await? > 0 {
            return Err(CoreError::conflict(MSG_IN_USE));
        }
        op.validated();

        procedures::delete(&mut scope, id).await?;
        scope.commit().await?;
        op.persisted();
        Ok(procedure)
    }

    pub async fn get_procedure(&self, id: Uuid) -> CoreResult<Procedure> {
        let mut conn = self.store.acquire().await?;
        procedures::find(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_PROCEDURE_NOT_FOUND))
    }

    /// Catálogo em ordem alfabética
    pub async fn list_procedures(&self, page: PageRequest) -> CoreResult<Page<Procedure>> {
        let mut conn = self.store.acquire().await?;
        Ok(procedures::list(&mut conn, page).await?)
    }
}
