//! Modelos de dados do back-office da clínica
//!
//! Este módulo define as entidades persistidas (pacientes, responsáveis,
//! procedimentos, atendimentos, usuários e registros de auditoria). Os nomes dos
//! campos no JSON seguem a convenção já usada pelo front-end (`nome`, `cpf`,
//! `data_nascimento`, `valor_total`...).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::str::FromStr;
use uuid::Uuid;

/// Papel de um usuário interno
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Acesso total
    Admin,
    /// Equipe da clínica; versões antigas gravavam `default`
    #[serde(alias = "default")]
    Staff,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Staff => write!(f, "staff"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "staff" | "default" => Ok(Role::Staff),
            other => Err(format!("Papel de usuário inválido: {}", other)),
        }
    }
}

/// Modalidade de cobrança de um atendimento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentType {
    /// Convênio: usa `valor_plano` e exige número da carteira
    #[serde(rename = "plano")]
    Plan,
    /// Particular: usa `valor_particular`
    #[serde(rename = "particular")]
    Private,
}

impl std::fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentType::Plan => write!(f, "plano"),
            AppointmentType::Private => write!(f, "particular"),
        }
    }
}

impl FromStr for AppointmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plano" => Ok(AppointmentType::Plan),
            "particular" => Ok(AppointmentType::Private),
            other => Err(format!("Tipo de atendimento inválido: {}", other)),
        }
    }
}

/// Ação registrada na trilha de auditoria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::Create => write!(f, "CREATE"),
            AuditAction::Update => write!(f, "UPDATE"),
            AuditAction::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            other => Err(format!("Ação de auditoria inválida: {}", other)),
        }
    }
}

/// Endereço do paciente
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// UF com duas letras
    #[serde(rename = "estado")]
    pub state: String,
    #[serde(rename = "cidade")]
    pub city: String,
    #[serde(rename = "bairro")]
    pub district: String,
    /// CEP com oito dígitos
    #[serde(rename = "cep")]
    pub zip_code: String,
    #[serde(rename = "rua")]
    pub street: String,
    #[serde(rename = "numero")]
    pub number: String,
}

/// Responsável legal de um paciente; pertence a exatamente um paciente
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Responsible {
    pub id: Uuid,
    pub patient_id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    pub cpf: String,
    #[serde(rename = "data_nascimento")]
    pub birth_date: NaiveDate,
    pub email: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Responsible {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            name: row.try_get("name")?,
            cpf: row.try_get("cpf")?,
            birth_date: row.try_get("birth_date")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Paciente da clínica
///
/// O paciente também é um principal de login: a senha inicial é o próprio CPF e
/// `first_access` permanece verdadeiro até a primeira troca de senha.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    /// Apenas dígitos
    pub cpf: String,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_access: bool,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "data_nascimento")]
    pub birth_date: NaiveDate,
    #[serde(rename = "endereco")]
    pub address: Address,
    pub responsible: Option<Responsible>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Patient {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            cpf: row.try_get("cpf")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            first_access: row.try_get("first_access")?,
            phone: row.try_get("phone")?,
            birth_date: row.try_get("birth_date")?,
            address: Address {
                state: row.try_get("state")?,
                city: row.try_get("city")?,
                district: row.try_get("district")?,
                zip_code: row.try_get("zip_code")?,
                street: row.try_get("street")?,
                number: row.try_get("number")?,
            },
            // Carregado separadamente pelo repositório
            responsible: None,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Procedimento faturável
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "descricao")]
    pub description: Option<String>,
    /// Preço cobrado em atendimentos por convênio
    #[serde(rename = "valor_plano", with = "rust_decimal::serde::float")]
    pub plan_price: Decimal,
    /// Preço cobrado em atendimentos particulares
    #[serde(rename = "valor_particular", with = "rust_decimal::serde::float")]
    pub private_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Procedure {
    /// Preço do procedimento para a modalidade informada
    pub fn price_for(&self, kind: AppointmentType) -> Decimal {
        match kind {
            AppointmentType::Plan => self.plan_price,
            AppointmentType::Private => self.private_price,
        }
    }
}

impl FromRow<'_, SqliteRow> for Procedure {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            plan_price: decode_money(row, "plan_price")?,
            private_price: decode_money(row, "private_price")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Atendimento: liga paciente, usuário criador e procedimentos a um valor total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    #[serde(rename = "data_hora")]
    pub scheduled_at: NaiveDateTime,
    pub patient_id: Uuid,
    /// Usuário que criou o atendimento (dono para fins de permissão)
    pub user_id: Uuid,
    #[serde(rename = "tipo")]
    pub kind: AppointmentType,
    #[serde(rename = "numero_carteira")]
    pub insurance_card: Option<String>,
    #[serde(rename = "valor_total", with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    pub procedures: Vec<Procedure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn procedure_ids(&self) -> Vec<Uuid> {
        self.procedures.iter().map(|p| p.id).collect()
    }
}

impl FromRow<'_, SqliteRow> for Appointment {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let kind: String = row.try_get("type")?;
        Ok(Self {
            id: row.try_get("id")?,
            scheduled_at: row.try_get("scheduled_at")?,
            patient_id: row.try_get("patient_id")?,
            user_id: row.try_get("user_id")?,
            kind: kind.parse().map_err(|e: String| decode_error("type", e))?,
            insurance_card: row.try_get("insurance_card")?,
            total_value: decode_money(row, "total_value")?,
            // Carregados separadamente a partir de appointment_procedures
            procedures: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Usuário interno (administração ou equipe)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(rename = "tipo")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: role.parse().map_err(|e: String| decode_error("role", e))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Registro da trilha de auditoria; nunca alterado depois de gravado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: Uuid,
    /// Estado anterior serializado em JSON
    pub old_values: Option<String>,
    /// Estado novo serializado em JSON
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for AuditLog {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let action: String = row.try_get("action")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            action: action.parse().map_err(|e: String| decode_error("action", e))?,
            table_name: row.try_get("table_name")?,
            record_id: row.try_get("record_id")?,
            old_values: row.try_get("old_values")?,
            new_values: row.try_get("new_values")?,
            ip_address: row.try_get("ip_address")?,
            details: row.try_get("details")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Indicadores do painel inicial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_patients: i64,
    pub appointments_today: i64,
    pub total_procedures: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_revenue: Decimal,
}

/// Valores monetários são gravados como texto decimal para não perder centavos;
/// no JSON saem como número, como o front-end espera
fn decode_money(row: &SqliteRow, column: &str) -> sqlx::Result<Decimal> {
    let raw: String = row.try_get(column)?;
    raw.parse::<Decimal>()
        .map_err(|e| decode_error(column, format!("Valor monetário inválido '{}': {}", raw, e)))
}

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message,
        )),
    }
}
