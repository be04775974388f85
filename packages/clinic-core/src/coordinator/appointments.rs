//! Registro de atendimentos
//!
//! O valor total é sempre calculado aqui, a partir dos procedimentos e da
//! modalidade; alterações recalculam o total quando a modalidade ou o conjunto
//! de procedimentos muda.

use chrono::NaiveDateTime;
use tracing::info;
use uuid::Uuid;

use super::patients::MSG_PATIENT_NOT_FOUND;
use super::{ChangeCoordinator, Operation};
use crate::audit::{snapshot, AuditEvent, RequestContext};
use crate::commands::{AppointmentChanges, AppointmentQuery, NewAppointment};
use crate::error::{CoreError, CoreResult};
use crate::models::Appointment;
use crate::permission::{self, Capability, Principal};
use crate::pricing;
use crate::store::appointments::{self, AppointmentFilter};
use crate::store::{patients, procedures, Page, PageRequest};
use crate::validators::{parse_datetime, parse_period_bound};

const TABLE: &str = "appointments";

const MSG_APPOINTMENT_NOT_FOUND: &str = "Atendimento não encontrado";
const MSG_INVALID_DATETIME: &str = "Formato de data/hora inválido (use ISO format)";
const MSG_INVALID_START: &str = "Formato de start_date inválido";
const MSG_INVALID_END: &str = "Formato de end_date inválido";

fn parse_scheduled_at(raw: &str) -> CoreResult<NaiveDateTime> {
    parse_datetime(raw).ok_or_else(|| CoreError::validation(MSG_INVALID_DATETIME))
}

fn parse_bound(raw: Option<&str>, message: &str) -> CoreResult<Option<NaiveDateTime>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => parse_period_bound(raw)
            .map(Some)
            .ok_or_else(|| CoreError::validation(message)),
        None => Ok(None),
    }
}

impl ChangeCoordinator {
    /// Registra um atendimento em nome do usuário autenticado
    pub async fn create_appointment(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        input: NewAppointment,
    ) -> CoreResult<Appointment> {
        let mut op = Operation::start("create_appointment");
        let result = self.create_appointment_tx(&mut op, actor, input).await;
        let (appointment, patient_name) = op.settle(result)?;

        info!(
            appointment_id = %appointment.id,
            patient_id = %appointment.patient_id,
            total = %appointment.total_value,
            "Atendimento registrado"
        );
        let event = AuditEvent::created(TABLE, appointment.id, snapshot(&appointment))
            .by(actor.id())
            .with_details(format!("Atendimento criado para paciente {}", patient_name));
        self.finish(&mut op, ctx, event).await;
        Ok(appointment)
    }

    async fn create_appointment_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        input: NewAppointment,
    ) -> CoreResult<(Appointment, String)> {
        permission::require(actor, Capability::RecordAppointments)?;

        let mut scope = self.store.begin().await?;
        let patient = patients::find(&mut scope, input.patient_id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_PATIENT_NOT_FOUND))?;

        let resolved = procedures::list_by_ids(&mut scope, &input.procedure_ids).await?;
        let quote = pricing::quote(input.kind, &input.procedure_ids, resolved)?;
        let insurance_card =
            pricing::check_insurance_card(input.kind, input.insurance_card.as_deref())?;
        let scheduled_at = parse_scheduled_at(&input.scheduled_at)?;

        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            scheduled_at,
            patient_id: patient.id,
            user_id: actor.id(),
            kind: input.kind,
            insurance_card,
            total_value: quote.total_value,
            procedures: quote.procedures,
            created_at: now,
            updated_at: now,
        };
        op.validated();

        appointments::insert(&mut scope, &appointment).await?;
        scope.commit().await?;
        op.persisted();
        Ok((appointment, patient.name))
    }

    /// Altera um atendimento; apenas quem o criou ou um administrador
    pub async fn update_appointment(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
        changes: AppointmentChanges,
    ) -> CoreResult<Appointment> {
        let mut op = Operation::start("update_appointment");
        let result = self.update_appointment_tx(&mut op, actor, id, changes).await;
        let (before, after) = op.settle(result)?;

        info!(appointment_id = %id, total = %after.total_value, "Atendimento atualizado");
        let event = AuditEvent::updated(TABLE, id, snapshot(&before), snapshot(&after))
            .by(actor.id())
            .with_details("Atendimento atualizado");
        self.finish(&mut op, ctx, event).await;
        Ok(after)
    }

    async fn update_appointment_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
        changes: AppointmentChanges,
    ) -> CoreResult<(Appointment, Appointment)> {
        let mut scope = self.store.begin().await?;
        let current = appointments::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_APPOINTMENT_NOT_FOUND))?;
        permission::authorize_appointment_change(actor, &current)?;

        // Estado desejado, comparado com o atual só para decidir o recálculo
        let mut next = current.clone();
        if let Some(raw) = changes.scheduled_at.as_deref() {
            next.scheduled_at = parse_scheduled_at(raw)?;
        }
        if let Some(kind) = changes.kind {
            next.kind = kind;
        }
        if changes.insurance_card.is_some() {
            next.insurance_card = changes.insurance_card;
        }
        next.insurance_card =
            pricing::check_insurance_card(next.kind, next.insurance_card.as_deref())?;

        match changes.procedure_ids {
            Some(ids) => {
                let resolved = procedures::list_by_ids(&mut scope, &ids).await?;
                let quote = pricing::quote(next.kind, &ids, resolved)?;
                next.procedures = quote.procedures;
                next.total_value = quote.total_value;
            }
            None if next.kind != current.kind => {
                next.total_value = pricing::total_for(&next.procedures, next.kind);
            }
            None => {}
        }
        next.updated_at = self.clock.now();
        op.validated();

        appointments::update(&mut scope, &next).await?;
        scope.commit().await?;
        op.persisted();
        Ok((current, next))
    }

    /// Remove um atendimento; apenas quem o criou ou um administrador
    pub async fn delete_appointment(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
    ) -> CoreResult<()> {
        let mut op = Operation::start("delete_appointment");
        let result = self.delete_appointment_tx(&mut op, actor, id).await;
        let removed = op.settle(result)?;

        info!(appointment_id = %id, "Atendimento removido");
        let event = AuditEvent::deleted(TABLE, id, snapshot(&removed))
            .by(actor.id())
            .with_details("Atendimento removido");
        self.finish(&mut op, ctx, event).await;
        Ok(())
    }

    async fn delete_appointment_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
    ) -> CoreResult<Appointment> {
        let mut scope = self.store.begin().await?;
        let appointment = appointments::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_APPOINTMENT_NOT_FOUND))?;
        permission::authorize_appointment_change(actor, &appointment)?;
        op.validated();

        appointments::delete(&mut scope, id).await?;
        scope.commit().await?;
        op.persisted();
        Ok(appointment)
    }

    pub async fn get_appointment(&self, actor: &Principal, id: Uuid) -> CoreResult<Appointment> {
        let mut conn = self.store.acquire().await?;
        let appointment = appointments::find(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_APPOINTMENT_NOT_FOUND))?;
        permission::authorize_appointment_view(actor, &appointment)?;
        Ok(appointment)
    }

    /// Atendimentos mais recentes primeiro; pacientes só veem os próprios
    pub async fn list_appointments(
        &self,
        actor: &Principal,
        query: &AppointmentQuery,
        page: PageRequest,
    ) -> CoreResult<Page<Appointment>> {
        let patient_id = match actor {
            Principal::Patient(patient) => Some(patient.id),
            other => {
                permission::require(other, Capability::ViewAllAppointments)?;
                None
            }
        };

        let filter = AppointmentFilter {
            patient_id,
            start: parse_bound(query.start_date.as_deref(), MSG_INVALID_START)?,
            end: parse_bound(query.end_date.as_deref(), MSG_INVALID_END)?,
        };

        let mut conn = self.store.acquire().await?;
        Ok(appointments::list(&mut conn, &filter, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::audit::{AuditSink, MockAuditSink};
    use crate::error::DbError;
    use crate::models::{AppointmentType, AuditLog, Patient, Procedure, Role, User};
    use crate::permission::fixtures;
    use crate::pricing::MSG_CARD_REQUIRED;
    use crate::store::testing::test_db;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    struct Scenario {
        h: Harness,
        staff: User,
        patient: Patient,
        a: Procedure,
        b: Procedure,
    }

    async fn scenario_with(h: Harness) -> Scenario {
        let staff = h.user(Role::Staff, "recepcao@clinica.med.br").await;
        let a = h.procedure("Consulta", 100_00, 150_00).await;
        let b = h.procedure("Raio-X", 50_00, 70_00).await;
        let patient = h
            .coordinator
            .create_patient(
                &Principal::Staff(staff.clone()),
                &ctx(),
                new_patient("11144477735", "joana@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap();
        Scenario {
            h,
            staff,
            patient,
            a,
            b,
        }
    }

    async fn scenario() -> Scenario {
        scenario_with(harness().await).await
    }

    fn new_appointment(s: &Scenario, kind: AppointmentType, card: Option<&str>) -> NewAppointment {
        NewAppointment {
            scheduled_at: "2024-06-15T09:30".to_string(),
            patient_id: s.patient.id,
            kind,
            insurance_card: card.map(str::to_string),
            procedure_ids: vec![s.a.id, s.b.id],
        }
    }

    #[tokio::test]
    async fn test_totals_follow_the_appointment_type() {
        let s = scenario().await;
        let staff = Principal::Staff(s.staff.clone());

        let plan = s
            .h
            .coordinator
            .create_appointment(
                &staff,
                &ctx(),
                new_appointment(&s, AppointmentType::Plan, Some("CART-001")),
            )
            .await
            .unwrap();
        assert_eq!(plan.total_value, Decimal::new(150_00, 2));
        assert_eq!(plan.user_id, s.staff.id);

        let private = s
            .h
            .coordinator
            .create_appointment(
                &staff,
                &ctx(),
                new_appointment(&s, AppointmentType::Private, None),
            )
            .await
            .unwrap();
        assert_eq!(private.total_value, Decimal::new(220_00, 2));
        assert_eq!(private.insurance_card, None);
    }

    #[tokio::test]
    async fn test_plan_requires_insurance_card() {
        let s = scenario().await;
        let staff = Principal::Staff(s.staff.clone());

        for card in [None, Some("   ")] {
            let err = s
                .h
                .coordinator
                .create_appointment(&staff, &ctx(), new_appointment(&s, AppointmentType::Plan, card))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), MSG_CARD_REQUIRED);
        }
    }

    #[tokio::test]
    async fn test_selection_errors() {
        let s = scenario().await;
        let staff = Principal::Staff(s.staff.clone());

        let mut repeated = new_appointment(&s, AppointmentType::Private, None);
        repeated.procedure_ids = vec![s.a.id, s.a.id];
        let err = s
            .h
            .coordinator
            .create_appointment(&staff, &ctx(), repeated)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), pricing::MSG_UNKNOWN_PROCEDURES);

        let mut empty = new_appointment(&s, AppointmentType::Private, None);
        empty.procedure_ids.clear();
        let err = s
            .h
            .coordinator
            .create_appointment(&staff, &ctx(), empty)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), pricing::MSG_NO_PROCEDURES);

        let mut unknown_patient = new_appointment(&s, AppointmentType::Private, None);
        unknown_patient.patient_id = Uuid::new_v4();
        let err = s
            .h
            .coordinator
            .create_appointment(&staff, &ctx(), unknown_patient)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let mut bad_date = new_appointment(&s, AppointmentType::Private, None);
        bad_date.scheduled_at = "15/06/2024 09:30".to_string();
        let err = s
            .h
            .coordinator
            .create_appointment(&staff, &ctx(), bad_date)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_INVALID_DATETIME);
    }

    #[tokio::test]
    async fn test_only_creator_or_admin_change_an_appointment() {
        let s = scenario().await;
        let creator = Principal::Staff(s.staff.clone());
        let appointment = s
            .h
            .coordinator
            .create_appointment(
                &creator,
                &ctx(),
                new_appointment(&s, AppointmentType::Private, None),
            )
            .await
            .unwrap();

        let other = Principal::Staff(s.h.user(Role::Staff, "outra@clinica.med.br").await);
        let err = s
            .h
            .coordinator
            .update_appointment(
                &other,
                &ctx(),
                appointment.id,
                AppointmentChanges {
                    scheduled_at: Some("2024-06-16T10:00".to_string()),
                    ..AppointmentChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let err = s
            .h
            .coordinator
            .delete_appointment(&Principal::Patient(s.patient.clone()), &ctx(), appointment.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let moved = s
            .h
            .coordinator
            .update_appointment(
                &creator,
                &ctx(),
                appointment.id,
                AppointmentChanges {
                    scheduled_at: Some("2024-06-16T10:00".to_string()),
                    ..AppointmentChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.scheduled_at.to_string(), "2024-06-16 10:00:00");
        assert_eq!(moved.total_value, appointment.total_value);

        s.h.coordinator
            .delete_appointment(&fixtures::admin(), &ctx(), appointment.id)
            .await
            .unwrap();
        let err = s
            .h
            .coordinator
            .get_appointment(&creator, appointment.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_update_recomputes_total() {
        let s = scenario().await;
        let creator = Principal::Staff(s.staff.clone());
        let appointment = s
            .h
            .coordinator
            .create_appointment(
                &creator,
                &ctx(),
                new_appointment(&s, AppointmentType::Private, None),
            )
            .await
            .unwrap();

        let switched = s
            .h
            .coordinator
            .update_appointment(
                &creator,
                &ctx(),
                appointment.id,
                AppointmentChanges {
                    kind: Some(AppointmentType::Plan),
                    insurance_card: Some("CART-002".to_string()),
                    ..AppointmentChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(switched.total_value, Decimal::new(150_00, 2));

        let narrowed = s
            .h
            .coordinator
            .update_appointment(
                &creator,
                &ctx(),
                appointment.id,
                AppointmentChanges {
                    procedure_ids: Some(vec![s.b.id]),
                    ..AppointmentChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(narrowed.total_value, Decimal::new(50_00, 2));
        assert_eq!(narrowed.procedure_ids(), vec![s.b.id]);

        let stored = s
            .h
            .coordinator
            .get_appointment(&creator, appointment.id)
            .await
            .unwrap();
        assert_eq!(stored, narrowed);

        // Trocar para convênio sem carteira continua proibido
        let err = s
            .h
            .coordinator
            .update_appointment(
                &creator,
                &ctx(),
                appointment.id,
                AppointmentChanges {
                    insurance_card: Some(String::new()),
                    ..AppointmentChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_CARD_REQUIRED);
    }

    #[tokio::test]
    async fn test_each_appointment_gets_one_matching_create_record() {
        let s = scenario().await;
        let staff = Principal::Staff(s.staff.clone());

        let mut created = Vec::new();
        for _ in 0..3 {
            created.push(
                s.h.coordinator
                    .create_appointment(
                        &staff,
                        &ctx(),
                        new_appointment(&s, AppointmentType::Private, None),
                    )
                    .await
                    .unwrap(),
            );
        }

        let records: Vec<AuditLog> = sqlx::query_as(
            "SELECT id, user_id, action, table_name, record_id, old_values, new_values, \
             ip_address, details, created_at FROM audit_logs \
             WHERE table_name = 'appointments' AND action = 'CREATE'",
        )
        .fetch_all(s.h.db.store.pool())
        .await
        .unwrap();
        assert_eq!(records.len(), created.len());

        for appointment in &created {
            let record = records
                .iter()
                .find(|r| r.record_id == appointment.id)
                .unwrap();
            let logged: serde_json::Value =
                serde_json::from_str(record.new_values.as_deref().unwrap()).unwrap();
            assert_eq!(logged, serde_json::to_value(appointment).unwrap());
            assert_eq!(record.user_id, Some(s.staff.id));
            assert_eq!(record.ip_address.as_deref(), Some("203.0.113.7"));
            assert_eq!(
                record.details.as_deref(),
                Some("Atendimento criado para paciente Joana Lima")
            );
        }
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_the_appointment() {
        let mut sink = MockAuditSink::new();
        sink.expect_append().returning(|entry| {
            if entry.table_name == "appointments" {
                Err(DbError::ConnectionError("disk full".to_string()))
            } else {
                Ok(())
            }
        });
        let sink: Arc<dyn AuditSink> = Arc::new(sink);
        let s = scenario_with(harness_with_sink(test_db().await, sink)).await;

        let appointment = s
            .h
            .coordinator
            .create_appointment(
                &Principal::Staff(s.staff.clone()),
                &ctx(),
                new_appointment(&s, AppointmentType::Private, None),
            )
            .await
            .unwrap();

        assert_eq!(appointment.total_value, Decimal::new(220_00, 2));
        assert_eq!(s.h.coordinator.audit_logger().failed_writes(), 1);
        let stored = s
            .h
            .coordinator
            .get_appointment(&fixtures::admin(), appointment.id)
            .await
            .unwrap();
        assert_eq!(stored, appointment);
    }

    #[tokio::test]
    async fn test_patients_only_list_their_own_appointments() {
        let s = scenario().await;
        let staff = Principal::Staff(s.staff.clone());
        let other = s
            .h
            .coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("52998224725", "pedro@exemplo.com", "1985-01-20"),
            )
            .await
            .unwrap();

        let mine = s
            .h
            .coordinator
            .create_appointment(
                &staff,
                &ctx(),
                new_appointment(&s, AppointmentType::Private, None),
            )
            .await
            .unwrap();
        let mut theirs = new_appointment(&s, AppointmentType::Private, None);
        theirs.patient_id = other.id;
        theirs.scheduled_at = "2024-07-01T08:00".to_string();
        let theirs = s
            .h
            .coordinator
            .create_appointment(&staff, &ctx(), theirs)
            .await
            .unwrap();

        let as_patient = Principal::Patient(s.patient.clone());
        let page = s
            .h
            .coordinator
            .list_appointments(&as_patient, &AppointmentQuery::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, mine.id);

        let err = s
            .h
            .coordinator
            .get_appointment(&as_patient, theirs.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let all = s
            .h
            .coordinator
            .list_appointments(&staff, &AppointmentQuery::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].id, theirs.id);

        let july = AppointmentQuery {
            start_date: Some("2024-07-01".to_string()),
            end_date: None,
        };
        let page = s
            .h
            .coordinator
            .list_appointments(&staff, &july, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, theirs.id);

        let bad = AppointmentQuery {
            start_date: None,
            end_date: Some("ontem".to_string()),
        };
        let err = s
            .h
            .coordinator
            .list_appointments(&staff, &bad, PageRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_INVALID_END);
    }

    #[tokio::test]
    async fn test_failed_procedure_link_rolls_back_the_appointment() {
        let s = scenario().await;
        let staff = Principal::Staff(s.staff.clone());
        let audited = s.h.audit_count().await;

        sqlx::query(
            "CREATE TRIGGER fail_procedure_link BEFORE INSERT ON appointment_procedures
             BEGIN SELECT RAISE(ABORT, 'disco cheio'); END",
        )
        .execute(s.h.db.store.pool())
        .await
        .unwrap();

        let err = s
            .h
            .coordinator
            .create_appointment(&staff, &ctx(), new_appointment(&s, AppointmentType::Private, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
        assert_eq!(err.to_string(), "Erro interno ao processar a operação");
        assert!(!err.to_string().contains("disco cheio"));

        let pool = s.h.db.store.pool();
        let appointments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appointments")
            .fetch_one(pool)
            .await
            .unwrap();
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appointment_procedures")
            .fetch_one(pool)
            .await
            .unwrap();
        assert_eq!(appointments, 0);
        assert_eq!(links, 0);
        assert_eq!(s.h.audit_count().await, audited);
    }
}
