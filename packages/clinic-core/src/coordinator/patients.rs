//! Cadastro de pacientes

use tracing::info;
use uuid::Uuid;

use super::{ensure_unique, required, ChangeCoordinator, Operation};
use crate::audit::{snapshot, AuditEvent, RequestContext};
use crate::commands::{NewPatient, PatientChanges};
use crate::error::{CoreError, CoreResult};
use crate::guardian::{self, ResponsiblePlan};
use crate::models::{Address, Patient};
use crate::permission::{self, Capability, Principal};
use crate::store::{appointments, patients, Page, PageRequest, UniqueField};
use crate::validators::{strip_cpf, validate_cpf, validate_email};

const TABLE: &str = "patients";

pub const MSG_PATIENT_NOT_FOUND: &str = "Paciente não encontrado";
const MSG_INVALID_CPF: &str = "CPF inválido";
const MSG_CPF_IN_USE: &str = "CPF já está em uso";
const MSG_INVALID_EMAIL: &str = "Formato de email inválido";
const MSG_EMAIL_IN_USE: &str = "Email já está em uso";
const MSG_REQUIRED_FIELDS: &str = "Todos os campos são obrigatórios";
const MSG_INVALID_STATE: &str = "Estado deve ter 2 letras";
const MSG_INVALID_ZIP_CODE: &str = "CEP deve ter 8 dígitos";
const MSG_HAS_APPOINTMENTS: &str = "Não é possível remover paciente com atendimentos";

fn check_cpf(raw: &str) -> CoreResult<String> {
    if !validate_cpf(raw) {
        return Err(CoreError::validation(MSG_INVALID_CPF));
    }
    Ok(strip_cpf(raw))
}

fn check_email(raw: &str) -> CoreResult<String> {
    let email = raw.trim();
    if !validate_email(email) {
        return Err(CoreError::validation(MSG_INVALID_EMAIL));
    }
    Ok(email.to_string())
}

/// UF em maiúsculas e CEP só com dígitos
fn normalize_address(address: Address) -> CoreResult<Address> {
    let state = address.state.trim().to_uppercase();
    if state.chars().count() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::validation(MSG_INVALID_STATE));
    }

    let zip_code: String = address.zip_code.chars().filter(char::is_ascii_digit).collect();
    if zip_code.len() != 8 {
        return Err(CoreError::validation(MSG_INVALID_ZIP_CODE));
    }

    Ok(Address {
        state,
        city: required(&address.city, MSG_REQUIRED_FIELDS)?,
        district: required(&address.district, MSG_REQUIRED_FIELDS)?,
        zip_code,
        street: required(&address.street, MSG_REQUIRED_FIELDS)?,
        number: required(&address.number, MSG_REQUIRED_FIELDS)?,
    })
}

impl ChangeCoordinator {
    /// Cadastra um paciente
    ///
    /// A senha inicial do paciente é o próprio CPF (só dígitos) e o primeiro
    /// acesso fica pendente.
    pub async fn create_patient(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        input: NewPatient,
    ) -> CoreResult<Patient> {
        let mut op = Operation::start("create_patient");
        let result = self.create_patient_tx(&mut op, actor, input).await;
        let patient = op.settle(result)?;

        info!(patient_id = %patient.id, minor = patient.responsible.is_some(), "Paciente cadastrado");
        let event = AuditEvent::created(TABLE, patient.id, snapshot(&patient))
            .by(actor.id())
            .with_details(format!("Paciente {} cadastrado", patient.name));
        self.finish(&mut op, ctx, event).await;
        Ok(patient)
    }

    async fn create_patient_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        input: NewPatient,
    ) -> CoreResult<Patient> {
        permission::require(actor, Capability::ManagePatients)?;

        let cpf = check_cpf(&input.cpf)?;
        let email = check_email(&input.email)?;
        let name = required(&input.name, MSG_REQUIRED_FIELDS)?;
        let phone = required(&input.phone, MSG_REQUIRED_FIELDS)?;
        let address = normalize_address(input.address)?;
        let (birth_date, responsible) = guardian::check_new_patient(
            &input.birth_date,
            input.responsible.as_ref(),
            self.clock.today(),
        )?;

        let mut scope = self.store.begin().await?;
        ensure_unique(&mut scope, UniqueField::PatientCpf, &cpf, None, MSG_CPF_IN_USE).await?;
        ensure_unique(&mut scope, UniqueField::PatientEmail, &email, None, MSG_EMAIL_IN_USE)
            .await?;

        let password_hash = self.hasher.hash(&cpf)?;
        let now = self.clock.now();
        let id = Uuid::new_v4();
        let patient = Patient {
            id,
            cpf,
            name,
            email,
            password_hash,
            first_access: true,
            phone,
            birth_date,
            address,
            responsible: responsible.map(|r| r.into_responsible(id, now)),
            created_at: now,
            updated_at: now,
        };
        op.validated();

        patients::insert(&mut scope, &patient).await?;
        scope.commit().await?;
        op.persisted();
        Ok(patient)
    }

    /// Atualiza o cadastro de um paciente; o próprio paciente pode se atualizar
    pub async fn update_patient(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
        changes: PatientChanges,
    ) -> CoreResult<Patient> {
        let mut op = Operation::start("update_patient");
        let result = self.update_patient_tx(&mut op, actor, id, changes).await;
        let (before, after) = op.settle(result)?;

        info!(patient_id = %id, "Paciente atualizado");
        let event = AuditEvent::updated(TABLE, id, snapshot(&before), snapshot(&after))
            .by(actor.id())
            .with_details(format!("Paciente {} atualizado", after.name));
        self.finish(&mut op, ctx, event).await;
        Ok(after)
    }

    async fn update_patient_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
        changes: PatientChanges,
    ) -> CoreResult<(Patient, Patient)> {
        permission::authorize_patient_profile(actor, id)?;

        let mut scope = self.store.begin().await?;
        let current = patients::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_PATIENT_NOT_FOUND))?;

        let mut next = current.clone();
        if let Some(cpf) = changes.cpf {
            let cpf = check_cpf(&cpf)?;
            if cpf != current.cpf {
                ensure_unique(&mut scope, UniqueField::PatientCpf, &cpf, Some(id), MSG_CPF_IN_USE)
                    .await?;
                next.cpf = cpf;
            }
        }
        if let Some(email) = changes.email {
            let email = check_email(&email)?;
            if email != current.email {
                ensure_unique(
                    &mut scope,
                    UniqueField::PatientEmail,
                    &email,
                    Some(id),
                    MSG_EMAIL_IN_USE,
                )
                .await?;
                next.email = email;
            }
        }
        if let Some(name) = changes.name {
            next.name = required(&name, MSG_REQUIRED_FIELDS)?;
        }
        if let Some(phone) = changes.phone {
            next.phone = required(&phone, MSG_REQUIRED_FIELDS)?;
        }
        if let Some(birth_date) = changes.birth_date {
            next.birth_date = guardian::parse_birth_date(&birth_date)?;
        }
        if let Some(address) = changes.address {
            let mut merged = next.address.clone();
            address.apply_to(&mut merged);
            next.address = normalize_address(merged)?;
        }

        let now = self.clock.now();
        let plan = guardian::plan_responsible_update(
            current.responsible.as_ref(),
            changes.responsible,
            next.birth_date,
            self.clock.today(),
            now,
        )?;
        match plan {
            ResponsiblePlan::Keep => {}
            ResponsiblePlan::Patch(responsible) => next.responsible = Some(responsible),
            ResponsiblePlan::Attach(responsible) => {
                next.responsible = Some(responsible.into_responsible(id, now))
            }
        }
        next.updated_at = now;
        op.validated();

        patients::update(&mut scope, &next).await?;
        scope.commit().await?;
        op.persisted();
        Ok((current, next))
    }

    /// Remove um paciente sem atendimentos; o responsável sai junto
    pub async fn delete_patient(
        &self,
        actor: &Principal,
        ctx: &RequestContext,
        id: Uuid,
    ) -> CoreResult<()> {
        let mut op = Operation::start("delete_patient");
        let result = self.delete_patient_tx(&mut op, actor, id).await;
        let removed = op.settle(result)?;

        info!(patient_id = %id, "Paciente removido");
        let event = AuditEvent::deleted(TABLE, id, snapshot(&removed))
            .by(actor.id())
            .with_details(format!("Paciente {} removido", removed.name));
        self.finish(&mut op, ctx, event).await;
        Ok(())
    }

    async fn delete_patient_tx(
        &self,
        op: &mut Operation,
        actor: &Principal,
        id: Uuid,
    ) -> CoreResult<Patient> {
        permission::require(actor, Capability::ManagePatients)?;

        let mut scope = self.store.begin().await?;
        let patient = patients::find(&mut scope, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_PATIENT_NOT_FOUND))?;
        if appointments::count_by_patient(&mut scope, id).await? > 0 {
            return Err(CoreError::conflict(MSG_HAS_APPOINTMENTS));
        }
        op.validated();

        patients::delete(&mut scope, id).await?;
        scope.commit().await?;
        op.persisted();
        Ok(patient)
    }

    pub async fn get_patient(&self, actor: &Principal, id: Uuid) -> CoreResult<Patient> {
        permission::authorize_patient_profile(actor, id)?;

        let mut conn = self.store.acquire().await?;
        patients::find(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::not_found(MSG_PATIENT_NOT_FOUND))
    }

    /// Pacientes mais recentes primeiro
    pub async fn list_patients(
        &self,
        actor: &Principal,
        page: PageRequest,
    ) -> CoreResult<Page<Patient>> {
        permission::require(actor, Capability::ViewAllPatients)?;

        let mut conn = self.store.acquire().await?;
        Ok(patients::list(&mut conn, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::commands::{AddressChanges, NewAppointment, ResponsibleChanges};
    use crate::guardian::{MSG_GUARDIAN_REQUIRED, MSG_MINOR_RESPONSIBLE};
    use crate::models::{AppointmentType, Role};
    use crate::permission::fixtures;

    #[tokio::test]
    async fn test_adult_patient_logs_in_with_cpf() {
        let h = harness().await;
        let staff = fixtures::staff();

        let mut input = new_patient("111.444.777-35", "joana@exemplo.com", "1990-05-10");
        input.address.state = "sp".to_string();
        input.address.zip_code = "13025-000".to_string();
        let patient = h.coordinator.create_patient(&staff, &ctx(), input).await.unwrap();

        assert_eq!(patient.cpf, "11144477735");
        assert_eq!(patient.address.state, "SP");
        assert_eq!(patient.address.zip_code, "13025000");
        assert!(patient.first_access);
        assert!(patient.responsible.is_none());
        assert!(h.coordinator.hasher.verify("11144477735", &patient.password_hash));
        assert_eq!(h.audit_count().await, 1);
    }

    #[tokio::test]
    async fn test_minor_without_responsible_is_rejected() {
        let h = harness().await;

        let err = h
            .coordinator
            .create_patient(
                &fixtures::staff(),
                &ctx(),
                new_patient("11144477735", "joana@exemplo.com", "2012-03-04"),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.to_string(), MSG_GUARDIAN_REQUIRED);
        assert_eq!(h.audit_count().await, 0);
    }

    #[tokio::test]
    async fn test_minor_responsible_is_rejected() {
        let h = harness().await;

        let mut input = new_patient("11144477735", "joana@exemplo.com", "2012-03-04");
        let mut responsible = adult_responsible();
        responsible.birth_date = "2008-01-01".to_string();
        input.responsible = Some(responsible);

        let err = h
            .coordinator
            .create_patient(&fixtures::staff(), &ctx(), input)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_MINOR_RESPONSIBLE);
    }

    #[tokio::test]
    async fn test_minor_with_adult_responsible_is_created() {
        let h = harness().await;

        let mut input = new_patient("11144477735", "joana@exemplo.com", "2012-03-04");
        input.responsible = Some(adult_responsible());
        let patient = h
            .coordinator
            .create_patient(&fixtures::staff(), &ctx(), input)
            .await
            .unwrap();

        let stored = h
            .coordinator
            .get_patient(&fixtures::admin(), patient.id)
            .await
            .unwrap();
        let responsible = stored.responsible.unwrap();
        assert_eq!(responsible.cpf, "52998224725");
        assert_eq!(responsible.patient_id, patient.id);
    }

    #[tokio::test]
    async fn test_duplicate_cpf_and_email_conflict() {
        let h = harness().await;
        let staff = fixtures::staff();
        h.coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("11144477735", "joana@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap();

        let err = h
            .coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("111.444.777-35", "outra@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict_error");
        assert_eq!(err.to_string(), MSG_CPF_IN_USE);

        let err = h
            .coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("52998224725", "joana@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_EMAIL_IN_USE);
    }

    #[tokio::test]
    async fn test_patient_principal_only_touches_own_profile() {
        let h = harness().await;
        let staff = fixtures::staff();
        let joana = h
            .coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("11144477735", "joana@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap();
        let pedro = h
            .coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("52998224725", "pedro@exemplo.com", "1985-01-20"),
            )
            .await
            .unwrap();

        let as_joana = Principal::Patient(joana.clone());
        let updated = h
            .coordinator
            .update_patient(
                &as_joana,
                &ctx(),
                joana.id,
                PatientChanges {
                    phone: Some("11911112222".to_string()),
                    address: Some(AddressChanges {
                        number: Some("200".to_string()),
                        ..AddressChanges::default()
                    }),
                    ..PatientChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone, "11911112222");
        assert_eq!(updated.address.number, "200");
        assert_eq!(updated.address.city, "Campinas");

        let err = h
            .coordinator
            .get_patient(&as_joana, pedro.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let err = h
            .coordinator
            .create_patient(
                &as_joana,
                &ctx(),
                new_patient("39053344705", "novo@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");

        let err = h
            .coordinator
            .list_patients(&as_joana, PageRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission_error");
    }

    #[tokio::test]
    async fn test_update_to_minor_requires_responsible() {
        let h = harness().await;
        let staff = fixtures::staff();
        let patient = h
            .coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("11144477735", "joana@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap();

        let err = h
            .coordinator
            .update_patient(
                &staff,
                &ctx(),
                patient.id,
                PatientChanges {
                    birth_date: Some("2012-03-04".to_string()),
                    ..PatientChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_GUARDIAN_REQUIRED);

        let updated = h
            .coordinator
            .update_patient(
                &staff,
                &ctx(),
                patient.id,
                PatientChanges {
                    birth_date: Some("2012-03-04".to_string()),
                    responsible: Some(ResponsibleChanges::from(adult_responsible())),
                    ..PatientChanges::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.responsible.is_some());

        // Com responsável cadastrado, atualizações parciais continuam válidas
        let renamed = h
            .coordinator
            .update_patient(
                &staff,
                &ctx(),
                patient.id,
                PatientChanges {
                    name: Some("Joana Lima Souza".to_string()),
                    ..PatientChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Joana Lima Souza");
        assert_eq!(
            renamed.responsible.map(|r| r.id),
            updated.responsible.map(|r| r.id)
        );
    }

    #[tokio::test]
    async fn test_delete_is_blocked_by_appointments() {
        let h = harness().await;
        let staff_user = h.user(Role::Staff, "recepcao@clinica.med.br").await;
        let staff = Principal::Staff(staff_user);
        let consulta = h.procedure("Consulta", 100_00, 150_00).await;

        let joana = h
            .coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("11144477735", "joana@exemplo.com", "1990-05-10"),
            )
            .await
            .unwrap();
        let pedro = h
            .coordinator
            .create_patient(
                &staff,
                &ctx(),
                new_patient("52998224725", "pedro@exemplo.com", "1985-01-20"),
            )
            .await
            .unwrap();

        h.coordinator
            .create_appointment(
                &staff,
                &ctx(),
                NewAppointment {
                    scheduled_at: "2024-06-15T09:00".to_string(),
                    patient_id: joana.id,
                    kind: AppointmentType::Private,
                    insurance_card: None,
                    procedure_ids: vec![consulta.id],
                },
            )
            .await
            .unwrap();

        let err = h
            .coordinator
            .delete_patient(&staff, &ctx(), joana.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict_error");

        h.coordinator
            .delete_patient(&staff, &ctx(), pedro.id)
            .await
            .unwrap();
        let err = h
            .coordinator
            .get_patient(&staff, pedro.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
