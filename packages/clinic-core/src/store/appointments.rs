//! Repositório de atendimentos e da tabela de ligação com procedimentos

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::{Page, PageRequest};
use crate::error::DbError;
use crate::models::{Appointment, Procedure};

const SELECT_APPOINTMENT: &str = "SELECT id, scheduled_at, patient_id, user_id, type, \
     insurance_card, total_value, created_at, updated_at FROM appointments";

/// Filtros da listagem de atendimentos
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    /// Restringe aos atendimentos de um paciente
    pub patient_id: Option<Uuid>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

async fn load_procedures(
    conn: &mut SqliteConnection,
    appointment: &mut Appointment,
) -> Result<(), DbError> {
    appointment.procedures = sqlx::query_as::<_, Procedure>(
        "SELECT p.id, p.name, p.description, p.plan_price, p.private_price, \
         p.created_at, p.updated_at \
         FROM procedures p \
         JOIN appointment_procedures ap ON ap.procedure_id = p.id \
         WHERE ap.appointment_id = ?1 \
         ORDER BY p.name",
    )
    .bind(appointment.id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Appointment>, DbError> {
    let sql = format!("{} WHERE id = ?1", SELECT_APPOINTMENT);
    let appointment = sqlx::query_as::<_, Appointment>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match appointment {
        Some(mut appointment) => {
            load_procedures(conn, &mut appointment).await?;
            Ok(Some(appointment))
        }
        None => Ok(None),
    }
}

fn push_filter<'a>(query: &mut QueryBuilder<'a, Sqlite>, filter: &AppointmentFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(patient_id) = filter.patient_id {
        query.push(" AND patient_id = ").push_bind(patient_id);
    }
    if let Some(start) = filter.start {
        query.push(" AND scheduled_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        query.push(" AND scheduled_at <= ").push_bind(end);
    }
}

/// Atendimentos mais recentes (pela data do atendimento) primeiro
pub async fn list(
    conn: &mut SqliteConnection,
    filter: &AppointmentFilter,
    page: PageRequest,
) -> Result<Page<Appointment>, DbError> {
    let mut count_query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM appointments");
    push_filter(&mut count_query, filter);
    let total: i64 = count_query
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_APPOINTMENT);
    push_filter(&mut query, filter);
    query
        .push(" ORDER BY scheduled_at DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset);

    let mut items = query
        .build_query_as::<Appointment>()
        .fetch_all(&mut *conn)
        .await?;

    for appointment in items.iter_mut() {
        load_procedures(conn, appointment).await?;
    }

    Ok(Page { items, total })
}

async fn insert_links(conn: &mut SqliteConnection, appointment: &Appointment) -> Result<(), DbError> {
    for procedure in &appointment.procedures {
        sqlx::query(
            "INSERT INTO appointment_procedures (appointment_id, procedure_id) VALUES (?1, ?2)",
        )
        .bind(appointment.id)
        .bind(procedure.id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Grava o atendimento e suas ligações; chamar dentro de uma transação
pub async fn insert(conn: &mut SqliteConnection, appointment: &Appointment) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO appointments (id, scheduled_at, patient_id, user_id, type, insurance_card, \
         total_value, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(appointment.id)
    .bind(appointment.scheduled_at)
    .bind(appointment.patient_id)
    .bind(appointment.user_id)
    .bind(appointment.kind.to_string())
    .bind(&appointment.insurance_card)
    .bind(appointment.total_value.to_string())
    .bind(appointment.created_at)
    .bind(appointment.updated_at)
    .execute(&mut *conn)
    .await?;

    insert_links(conn, appointment).await
}

/// Substitui o estado do atendimento, inclusive o conjunto de procedimentos
pub async fn update(conn: &mut SqliteConnection, appointment: &Appointment) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE appointments SET scheduled_at = ?2, type = ?3, insurance_card = ?4, \
         total_value = ?5, updated_at = ?6 WHERE id = ?1",
    )
    .bind(appointment.id)
    .bind(appointment.scheduled_at)
    .bind(appointment.kind.to_string())
    .bind(&appointment.insurance_card)
    .bind(appointment.total_value.to_string())
    .bind(appointment.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("atendimento {}", appointment.id)));
    }

    sqlx::query("DELETE FROM appointment_procedures WHERE appointment_id = ?1")
        .bind(appointment.id)
        .execute(&mut *conn)
        .await?;

    insert_links(conn, appointment).await
}

/// Remove o atendimento; as ligações saem junto pela chave estrangeira
pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM appointments WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_by_user(conn: &mut SqliteConnection, user_id: Uuid) -> Result<i64, DbError> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?,
    )
}

pub async fn count_by_patient(
    conn: &mut SqliteConnection,
    patient_id: Uuid,
) -> Result<i64, DbError> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE patient_id = ?1")
            .bind(patient_id)
            .fetch_one(&mut *conn)
            .await?,
    )
}

pub async fn count_on_day(conn: &mut SqliteConnection, day: NaiveDate) -> Result<i64, DbError> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE date(scheduled_at) = ?1")
            .bind(day.format("%Y-%m-%d").to_string())
            .fetch_one(&mut *conn)
            .await?,
    )
}

/// Soma dos valores dos atendimentos do mês de `day`
///
/// A soma é feita em `Decimal` para não passar pelos floats do SQLite.
pub async fn revenue_for_month(
    conn: &mut SqliteConnection,
    day: NaiveDate,
) -> Result<Decimal, DbError> {
    let values: Vec<String> = sqlx::query_scalar(
        "SELECT total_value FROM appointments WHERE strftime('%Y-%m', scheduled_at) = ?1",
    )
    .bind(day.format("%Y-%m").to_string())
    .fetch_all(&mut *conn)
    .await?;

    values.iter().try_fold(Decimal::ZERO, |acc, raw| {
        raw.parse::<Decimal>()
            .map(|value| acc + value)
            .map_err(|e| DbError::QueryError(format!("Valor total inválido '{}': {}", raw, e)))
    })
}
