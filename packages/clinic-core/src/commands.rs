//! Dados de entrada das operações de alteração
//!
//! Datas chegam como texto para que uma data mal formatada vire erro de
//! validação do núcleo, não erro de desserialização.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::models::{Address, AppointmentType, Role};

/// Dados completos de um responsável
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsibleInput {
    #[serde(rename = "nome")]
    pub name: String,
    pub cpf: String,
    #[serde(rename = "data_nascimento")]
    pub birth_date: String,
    pub email: String,
    #[serde(rename = "telefone")]
    pub phone: String,
}

/// Alteração parcial de um responsável
///
/// Quando o paciente ainda não tem responsável, todos os campos são exigidos.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsibleChanges {
    #[serde(rename = "nome")]
    pub name: Option<String>,
    pub cpf: Option<String>,
    #[serde(rename = "data_nascimento")]
    pub birth_date: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "telefone")]
    pub phone: Option<String>,
}

impl ResponsibleChanges {
    /// Converte em cadastro completo, se todos os campos vieram preenchidos
    pub fn into_complete(self) -> Option<ResponsibleInput> {
        Some(ResponsibleInput {
            name: self.name?,
            cpf: self.cpf?,
            birth_date: self.birth_date?,
            email: self.email?,
            phone: self.phone?,
        })
    }
}

impl From<ResponsibleInput> for ResponsibleChanges {
    fn from(input: ResponsibleInput) -> Self {
        Self {
            name: Some(input.name),
            cpf: Some(input.cpf),
            birth_date: Some(input.birth_date),
            email: Some(input.email),
            phone: Some(input.phone),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    pub cpf: String,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "data_nascimento")]
    pub birth_date: String,
    #[serde(rename = "endereco")]
    pub address: Address,
    pub responsible: Option<ResponsibleInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressChanges {
    #[serde(rename = "estado")]
    pub state: Option<String>,
    #[serde(rename = "cidade")]
    pub city: Option<String>,
    #[serde(rename = "bairro")]
    pub district: Option<String>,
    #[serde(rename = "cep")]
    pub zip_code: Option<String>,
    #[serde(rename = "rua")]
    pub street: Option<String>,
    #[serde(rename = "numero")]
    pub number: Option<String>,
}

impl AddressChanges {
    pub fn apply_to(self, address: &mut Address) {
        if let Some(state) = self.state {
            address.state = state;
        }
        if let Some(city) = self.city {
            address.city = city;
        }
        if let Some(district) = self.district {
            address.district = district;
        }
        if let Some(zip_code) = self.zip_code {
            address.zip_code = zip_code;
        }
        if let Some(street) = self.street {
            address.street = street;
        }
        if let Some(number) = self.number {
            address.number = number;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientChanges {
    pub cpf: Option<String>,
    #[serde(rename = "nome")]
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "telefone")]
    pub phone: Option<String>,
    #[serde(rename = "data_nascimento")]
    pub birth_date: Option<String>,
    #[serde(rename = "endereco")]
    pub address: Option<AddressChanges>,
    pub responsible: Option<ResponsibleChanges>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProcedure {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "descricao")]
    pub description: Option<String>,
    #[serde(rename = "valor_plano")]
    pub plan_price: Decimal,
    #[serde(rename = "valor_particular")]
    pub private_price: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcedureChanges {
    #[serde(rename = "nome")]
    pub name: Option<String>,
    #[serde(rename = "descricao")]
    pub description: Option<String>,
    #[serde(rename = "valor_plano")]
    pub plan_price: Option<Decimal>,
    #[serde(rename = "valor_particular")]
    pub private_price: Option<Decimal>,
}

/// O valor total não faz parte da entrada: é sempre calculado
#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    #[serde(rename = "data_hora")]
    pub scheduled_at: String,
    pub patient_id: Uuid,
    #[serde(rename = "tipo")]
    pub kind: AppointmentType,
    #[serde(rename = "numero_carteira")]
    pub insurance_card: Option<String>,
    #[serde(rename = "procedures")]
    pub procedure_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentChanges {
    #[serde(rename = "data_hora")]
    pub scheduled_at: Option<String>,
    #[serde(rename = "tipo")]
    pub kind: Option<AppointmentType>,
    #[serde(rename = "numero_carteira")]
    pub insurance_card: Option<String>,
    #[serde(rename = "procedures")]
    pub procedure_ids: Option<Vec<Uuid>>,
}

#[derive(Deserialize)]
pub struct NewUser {
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(rename = "senha")]
    pub password: Zeroizing<String>,
    #[serde(rename = "tipo", default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Staff
}

/// A troca de senha por aqui exige a senha atual; administradores que precisam
/// redefinir a senha de outra pessoa usam `reset_password`.
#[derive(Default, Deserialize)]
pub struct UserChanges {
    #[serde(rename = "nome")]
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "tipo")]
    pub role: Option<Role>,
    #[serde(rename = "senha")]
    pub password: Option<Zeroizing<String>>,
    #[serde(rename = "senha_atual")]
    pub current_password: Option<Zeroizing<String>>,
}

/// Troca da própria senha
///
/// A senha atual é dispensada apenas no primeiro acesso de um paciente.
#[derive(Deserialize)]
pub struct PasswordChange {
    #[serde(alias = "senha_atual")]
    pub current_password: Option<Zeroizing<String>>,
    #[serde(alias = "nova_senha")]
    pub new_password: Zeroizing<String>,
}

/// Filtro por período da listagem de atendimentos
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Filtros da consulta à trilha de auditoria
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub table_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
