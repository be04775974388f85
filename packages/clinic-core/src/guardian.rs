//! Regras de responsável legal para pacientes menores de idade
//!
//! Um paciente com menos de 18 anos só existe com um responsável válido
//! (CPF e email corretos, maior de idade). Um responsável informado para um
//! paciente adulto passa pelas mesmas validações.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::commands::{ResponsibleChanges, ResponsibleInput};
use crate::error::{CoreError, CoreResult};
use crate::models::Responsible;
use crate::validators::{is_minor, parse_date, strip_cpf, validate_cpf, validate_email};

pub const MSG_INVALID_BIRTH_DATE: &str = "Formato de data inválido (use YYYY-MM-DD)";
pub const MSG_GUARDIAN_REQUIRED: &str = "Paciente menor de idade requer dados do responsável";
pub const MSG_MINOR_RESPONSIBLE: &str = "Responsável não pode ser menor de idade";
pub const MSG_RESPONSIBLE_CPF: &str = "CPF do responsável inválido";
pub const MSG_RESPONSIBLE_EMAIL: &str = "Email do responsável inválido";
pub const MSG_RESPONSIBLE_BIRTH_DATE: &str = "Data de nascimento do responsável inválida";
pub const MSG_RESPONSIBLE_INCOMPLETE: &str =
    "Dados do responsável incompletos (nome, cpf, data_nascimento, email e telefone)";

/// Responsável já validado, ainda sem identidade persistida
#[derive(Debug, Clone, PartialEq)]
pub struct ValidResponsible {
    pub name: String,
    pub cpf: String,
    pub birth_date: NaiveDate,
    pub email: String,
    pub phone: String,
}

impl ValidResponsible {
    pub fn into_responsible(self, patient_id: Uuid, now: DateTime<Utc>) -> Responsible {
        Responsible {
            id: Uuid::new_v4(),
            patient_id,
            name: self.name,
            cpf: self.cpf,
            birth_date: self.birth_date,
            email: self.email,
            phone: self.phone,
            created_at: now,
            updated_at: now,
        }
    }
}

/// O que fazer com o responsável numa atualização de paciente
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsiblePlan {
    /// Nada informado; o responsável atual (se houver) continua igual
    Keep,
    /// Responsável existente com campos alterados no lugar
    Patch(Responsible),
    /// Paciente sem responsável recebe um novo
    Attach(ValidResponsible),
}

pub fn parse_birth_date(raw: &str) -> CoreResult<NaiveDate> {
    parse_date(raw).ok_or_else(|| CoreError::validation(MSG_INVALID_BIRTH_DATE))
}

fn check_responsible_cpf(cpf: &str) -> CoreResult<String> {
    if !validate_cpf(cpf) {
        return Err(CoreError::validation(MSG_RESPONSIBLE_CPF));
    }
    Ok(strip_cpf(cpf))
}

fn check_responsible_email(email: &str) -> CoreResult<()> {
    if !validate_email(email) {
        return Err(CoreError::validation(MSG_RESPONSIBLE_EMAIL));
    }
    Ok(())
}

fn check_responsible_birth_date(raw: &str, today: NaiveDate) -> CoreResult<NaiveDate> {
    let birth_date =
        parse_date(raw).ok_or_else(|| CoreError::validation(MSG_RESPONSIBLE_BIRTH_DATE))?;
    if is_minor(birth_date, today) {
        return Err(CoreError::validation(MSG_MINOR_RESPONSIBLE));
    }
    Ok(birth_date)
}

/// Valida um responsável completo
pub fn validate_responsible(
    input: &ResponsibleInput,
    today: NaiveDate,
) -> CoreResult<ValidResponsible> {
    let cpf = check_responsible_cpf(&input.cpf)?;
    check_responsible_email(&input.email)?;
    let birth_date = check_responsible_birth_date(&input.birth_date, today)?;

    Ok(ValidResponsible {
        name: input.name.trim().to_string(),
        cpf,
        birth_date,
        email: input.email.trim().to_string(),
        phone: input.phone.trim().to_string(),
    })
}

/// Regras para o cadastro de um paciente novo
///
/// Retorna a data de nascimento interpretada e o responsável validado, se houver.
pub fn check_new_patient(
    birth_date: &str,
    responsible: Option<&ResponsibleInput>,
    today: NaiveDate,
) -> CoreResult<(NaiveDate, Option<ValidResponsible>)> {
    let birth_date = parse_birth_date(birth_date)?;

    let responsible = match responsible {
        Some(input) => Some(validate_responsible(input, today)?),
        None if is_minor(birth_date, today) => {
            return Err(CoreError::validation(MSG_GUARDIAN_REQUIRED));
        }
        None => None,
    };

    Ok((birth_date, responsible))
}

/// Regras para a atualização de um paciente existente
///
/// `birth_date` é a data efetiva depois da atualização. Um responsável já
/// cadastrado satisfaz a exigência para menores; remover o responsável não é
/// suportado.
pub fn plan_responsible_update(
    existing: Option<&Responsible>,
    changes: Option<ResponsibleChanges>,
    birth_date: NaiveDate,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> CoreResult<ResponsiblePlan> {
    match (existing, changes) {
        (None, None) if is_minor(birth_date, today) => {
            Err(CoreError::validation(MSG_GUARDIAN_REQUIRED))
        }
        (_, None) => Ok(ResponsiblePlan::Keep),
        (Some(current), Some(changes)) => {
            patch_responsible(current, changes, today, now).map(ResponsiblePlan::Patch)
        }
        (None, Some(changes)) => {
            let input = changes
                .into_complete()
                .ok_or_else(|| CoreError::validation(MSG_RESPONSIBLE_INCOMPLETE))?;
            validate_responsible(&input, today).map(ResponsiblePlan::Attach)
        }
    }
}

fn patch_responsible(
    current: &Responsible,
    changes: ResponsibleChanges,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> CoreResult<Responsible> {
    let mut patched = current.clone();

    if let Some(cpf) = changes.cpf {
        patched.cpf = check_responsible_cpf(&cpf)?;
    }
    if let Some(email) = changes.email {
        check_responsible_email(&email)?;
        patched.email = email.trim().to_string();
    }
    if let Some(birth_date) = changes.birth_date {
        patched.birth_date = check_responsible_birth_date(&birth_date, today)?;
    }
    if let Some(name) = changes.name {
        patched.name = name.trim().to_string();
    }
    if let Some(phone) = changes.phone {
        patched.phone = phone.trim().to_string();
    }

    if patched != *current {
        patched.updated_at = now;
    }
    Ok(patched)
}
