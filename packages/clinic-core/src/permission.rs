//! Controle de acesso por papel e por posse
//!
//! Cada requisição é feita por um [`Principal`]: administrador, equipe ou
//! paciente. As regras olham apenas para a variante do principal e para o dono
//! do registro alvo.

use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::{Appointment, Patient, Role, User};

/// Quem está executando a operação
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Admin(User),
    Staff(User),
    Patient(Patient),
}

/// Capacidades concedidas por papel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageUsers,
    ManageProcedures,
    ManagePatients,
    RecordAppointments,
    ViewAllAppointments,
    ViewAllPatients,
    ViewAuditTrail,
}

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::ManageUsers,
    Capability::ManageProcedures,
    Capability::ManagePatients,
    Capability::RecordAppointments,
    Capability::ViewAllAppointments,
    Capability::ViewAllPatients,
    Capability::ViewAuditTrail,
];

const STAFF_CAPABILITIES: &[Capability] = &[
    Capability::ManagePatients,
    Capability::RecordAppointments,
    Capability::ViewAllAppointments,
    Capability::ViewAllPatients,
];

const PATIENT_CAPABILITIES: &[Capability] = &[];

impl Principal {
    /// Principal de um usuário interno conforme o papel gravado
    pub fn from_user(user: User) -> Self {
        match user.role {
            Role::Admin => Principal::Admin(user),
            Role::Staff => Principal::Staff(user),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Principal::Admin(user) | Principal::Staff(user) => user.id,
            Principal::Patient(patient) => patient.id,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Principal::Admin(user) | Principal::Staff(user) => &user.email,
            Principal::Patient(patient) => &patient.email,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Principal::Admin(user) | Principal::Staff(user) => &user.name,
            Principal::Patient(patient) => &patient.name,
        }
    }

    /// Nome do papel, como aparece no login (`admin`, `staff`, `patient`)
    pub fn role_name(&self) -> &'static str {
        match self {
            Principal::Admin(_) => "admin",
            Principal::Staff(_) => "staff",
            Principal::Patient(_) => "patient",
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Principal::Admin(_) => ADMIN_CAPABILITIES,
            Principal::Staff(_) => STAFF_CAPABILITIES,
            Principal::Patient(_) => PATIENT_CAPABILITIES,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin(_))
    }
}

fn denial_message(capability: Capability) -> &'static str {
    match capability {
        Capability::ManageUsers => "Apenas administradores podem gerenciar usuários",
        Capability::ManageProcedures => "Apenas administradores podem gerenciar procedimentos",
        Capability::ManagePatients => "Sem permissão para gerenciar pacientes",
        Capability::RecordAppointments => "Sem permissão para registrar atendimentos",
        Capability::ViewAllAppointments => "Sem permissão para listar todos os atendimentos",
        Capability::ViewAllPatients => "Sem permissão para listar pacientes",
        Capability::ViewAuditTrail => "Acesso negado. Apenas administradores.",
    }
}

pub fn require(principal: &Principal, capability: Capability) -> CoreResult<()> {
    if principal.can(capability) {
        Ok(())
    } else {
        Err(CoreError::permission(denial_message(capability)))
    }
}

/// Alterar ou remover um atendimento: apenas quem o criou ou um administrador
pub fn authorize_appointment_change(
    principal: &Principal,
    appointment: &Appointment,
) -> CoreResult<()> {
    match principal {
        Principal::Admin(_) => Ok(()),
        Principal::Staff(user) if user.id == appointment.user_id => Ok(()),
        _ => Err(CoreError::permission(
            "Sem permissão para alterar este atendimento",
        )),
    }
}

/// Equipe vê todos os atendimentos; paciente só vê os próprios
pub fn authorize_appointment_view(
    principal: &Principal,
    appointment: &Appointment,
) -> CoreResult<()> {
    match principal {
        Principal::Admin(_) | Principal::Staff(_) => Ok(()),
        Principal::Patient(patient) if patient.id == appointment.patient_id => Ok(()),
        Principal::Patient(_) => Err(CoreError::permission(
            "Sem permissão para visualizar este atendimento",
        )),
    }
}

/// Ver ou alterar o cadastro de um paciente
pub fn authorize_patient_profile(principal: &Principal, patient_id: Uuid) -> CoreResult<()> {
    match principal {
        Principal::Admin(_) | Principal::Staff(_) => Ok(()),
        Principal::Patient(patient) if patient.id == patient_id => Ok(()),
        Principal::Patient(_) => Err(CoreError::permission(
            "Sem permissão para acessar este paciente",
        )),
    }
}

/// Alterar um usuário: o próprio usuário ou um administrador; só administradores
/// mudam papéis
pub fn authorize_user_update(
    principal: &Principal,
    target_id: Uuid,
    changes_role: bool,
) -> CoreResult<()> {
    match principal {
        Principal::Admin(_) => Ok(()),
        Principal::Staff(user) if user.id == target_id && !changes_role => Ok(()),
        Principal::Staff(user) if user.id == target_id => Err(CoreError::permission(
            "Apenas administradores podem alterar o tipo de usuário",
        )),
        _ => Err(CoreError::permission(
            "Sem permissão para alterar este usuário",
        )),
    }
}

/// Remover um usuário: apenas administradores, e nunca a própria conta
pub fn authorize_user_delete(principal: &Principal, target_id: Uuid) -> CoreResult<()> {
    require(principal, Capability::ManageUsers)?;
    if principal.id() == target_id {
        return Err(CoreError::permission(
            "Administradores não podem remover a própria conta",
        ));
    }
    Ok(())
}

/// Buscar usuário por email: administradores buscam qualquer um, os demais só a si
pub fn authorize_user_lookup(principal: &Principal, email: &str) -> CoreResult<()> {
    if principal.is_admin() || principal.email().eq_ignore_ascii_case(email) {
        Ok(())
    } else {
        Err(CoreError::permission(
            "Sem permissão para buscar este usuário",
        ))
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures {
    //! Principais prontos para testes

    use super::*;
    use chrono::{NaiveDate, Utc};

    use crate::models::Address;

    pub fn user(role: Role) -> User {
        let id = Uuid::new_v4();
        User {
            id,
            name: format!("Usuário {}", &id.to_string()[..8]),
            email: format!("{}@clinica.med.br", id.simple()),
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn admin() -> Principal {
        Principal::Admin(user(Role::Admin))
    }

    pub fn staff() -> Principal {
        Principal::Staff(user(Role::Staff))
    }

    pub fn patient_principal(patient_id: Uuid) -> Principal {
        Principal::Patient(Patient {
            id: patient_id,
            cpf: "11144477735".to_string(),
            name: "Paciente".to_string(),
            email: format!("{}@exemplo.com", patient_id.simple()),
            password_hash: String::new(),
            first_access: true,
            phone: "11999990000".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).expect("data fixa válida"),
            address: Address {
                state: "SP".to_string(),
                city: "São Paulo".to_string(),
                district: "Centro".to_string(),
                zip_code: "01001000".to_string(),
                street: "Praça da Sé".to_string(),
                number: "1".to_string(),
            },
            responsible: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::models::AppointmentType;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn appointment_by(user_id: Uuid, patient_id: Uuid) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            scheduled_at: Utc::now().naive_utc(),
            patient_id,
            user_id,
            kind: AppointmentType::Private,
            insurance_card: None,
            total_value: Decimal::ZERO,
            procedures: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_only_creator_or_admin_changes_appointment() {
        let creator = staff();
        let other = staff();
        let appointment = appointment_by(creator.id(), Uuid::new_v4());

        assert!(authorize_appointment_change(&creator, &appointment).is_ok());
        assert!(authorize_appointment_change(&admin(), &appointment).is_ok());

        let err = authorize_appointment_change(&other, &appointment).unwrap_err();
        assert_eq!(err.kind(), "permission_error");
    }

    #[test]
    fn test_promoted_staff_becomes_admin() {
        let mut user = user(Role::Staff);
        let appointment = appointment_by(Uuid::new_v4(), Uuid::new_v4());
        assert!(
            authorize_appointment_change(&Principal::from_user(user.clone()), &appointment)
                .is_err()
        );

        user.role = Role::Admin;
        assert!(authorize_appointment_change(&Principal::from_user(user), &appointment).is_ok());
    }

    #[test]
    fn test_patient_cannot_change_appointments() {
        let patient_id = Uuid::new_v4();
        let patient = patient_principal(patient_id);
        let appointment = appointment_by(Uuid::new_v4(), patient_id);

        assert!(authorize_appointment_change(&patient, &appointment).is_err());
        assert!(authorize_appointment_view(&patient, &appointment).is_ok());

        let someone_else = appointment_by(Uuid::new_v4(), Uuid::new_v4());
        assert!(authorize_appointment_view(&patient, &someone_else).is_err());
    }

    #[test]
    fn test_patient_profile_access() {
        let patient_id = Uuid::new_v4();
        let patient = patient_principal(patient_id);

        assert!(authorize_patient_profile(&patient, patient_id).is_ok());
        assert!(authorize_patient_profile(&patient, Uuid::new_v4()).is_err());
        assert!(authorize_patient_profile(&staff(), patient_id).is_ok());
    }

    #[test]
    fn test_capabilities_by_variant() {
        assert!(require(&admin(), Capability::ManageProcedures).is_ok());
        assert!(require(&staff(), Capability::ManageProcedures).is_err());
        assert!(require(&staff(), Capability::ManagePatients).is_ok());
        assert!(require(&patient_principal(Uuid::new_v4()), Capability::ManagePatients).is_err());
        assert!(require(&staff(), Capability::ViewAuditTrail).is_err());
    }

    #[test]
    fn test_user_update_rules() {
        let me = staff();
        assert!(authorize_user_update(&me, me.id(), false).is_ok());
        assert!(authorize_user_update(&me, me.id(), true).is_err());
        assert!(authorize_user_update(&me, Uuid::new_v4(), false).is_err());
        assert!(authorize_user_update(&admin(), Uuid::new_v4(), true).is_ok());
    }

    #[test]
    fn test_user_delete_is_admin_only_and_not_self() {
        let admin = admin();
        assert!(authorize_user_delete(&admin, Uuid::new_v4()).is_ok());
        assert!(authorize_user_delete(&admin, admin.id()).is_err());
        assert!(authorize_user_delete(&staff(), Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_user_lookup_by_email() {
        let me = staff();
        let my_email = me.email().to_uppercase();
        assert!(authorize_user_lookup(&me, &my_email).is_ok());
        assert!(authorize_user_lookup(&me, "outro@clinica.med.br").is_err());
        assert!(authorize_user_lookup(&admin(), "outro@clinica.med.br").is_ok());
    }
}
