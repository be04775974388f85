//! Repositório de pacientes e responsáveis

use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{Page, PageRequest};
use crate::error::DbError;
use crate::models::{Patient, Responsible};

const SELECT_PATIENT: &str = "SELECT id, cpf, name, email, password_hash, first_access, phone, \
     birth_date, state, city, district, zip_code, street, number, created_at, updated_at \
     FROM patients";

const SELECT_RESPONSIBLE: &str = "SELECT id, patient_id, name, cpf, birth_date, email, phone, \
     created_at, updated_at FROM responsibles";

async fn load_responsible(
    conn: &mut SqliteConnection,
    patient: &mut Patient,
) -> Result<(), DbError> {
    let sql = format!("{} WHERE patient_id = ?1", SELECT_RESPONSIBLE);
    patient.responsible = sqlx::query_as::<_, Responsible>(&sql)
        .bind(patient.id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(())
}

pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Patient>, DbError> {
    let sql = format!("{} WHERE id = ?1", SELECT_PATIENT);
    let patient = sqlx::query_as::<_, Patient>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match patient {
        Some(mut patient) => {
            load_responsible(conn, &mut patient).await?;
            Ok(Some(patient))
        }
        None => Ok(None),
    }
}

pub async fn find_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<Patient>, DbError> {
    let sql = format!("{} WHERE email = ?1", SELECT_PATIENT);
    let patient = sqlx::query_as::<_, Patient>(&sql)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;

    match patient {
        Some(mut patient) => {
            load_responsible(conn, &mut patient).await?;
            Ok(Some(patient))
        }
        None => Ok(None),
    }
}

/// Pacientes mais recentes primeiro
pub async fn list(conn: &mut SqliteConnection, page: PageRequest) -> Result<Page<Patient>, DbError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patients")
        .fetch_one(&mut *conn)
        .await?;

    let sql = format!(
        "{} ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        SELECT_PATIENT
    );
    let mut items = sqlx::query_as::<_, Patient>(&sql)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&mut *conn)
        .await?;

    for patient in items.iter_mut() {
        load_responsible(conn, patient).await?;
    }

    Ok(Page { items, total })
}

pub async fn insert(conn: &mut SqliteConnection, patient: &Patient) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO patients (id, cpf, name, email, password_hash, first_access, phone, \
         birth_date, state, city, district, zip_code, street, number, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    )
    .bind(patient.id)
    .bind(&patient.cpf)
    .bind(&patient.name)
    .bind(&patient.email)
    .bind(&patient.password_hash)
    .bind(patient.first_access)
    .bind(&patient.phone)
    .bind(patient.birth_date)
    .bind(&patient.address.state)
    .bind(&patient.address.city)
    .bind(&patient.address.district)
    .bind(&patient.address.zip_code)
    .bind(&patient.address.street)
    .bind(&patient.address.number)
    .bind(patient.created_at)
    .bind(patient.updated_at)
    .execute(&mut *conn)
    .await?;

    if let Some(responsible) = &patient.responsible {
        insert_responsible(conn, responsible).await?;
    }
    Ok(())
}

/// Grava o estado completo do paciente, incluindo o responsável
///
/// Um responsável novo é inserido; um existente é atualizado no lugar.
pub async fn update(conn: &mut SqliteConnection, patient: &Patient) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE patients SET cpf = ?2, name = ?3, email = ?4, password_hash = ?5, \
         first_access = ?6, phone = ?7, birth_date = ?8, state = ?9, city = ?10, \
         district = ?11, zip_code = ?12, street = ?13, number = ?14, updated_at = ?15 \
         WHERE id = ?1",
    )
    .bind(patient.id)
    .bind(&patient.cpf)
    .bind(&patient.name)
    .bind(&patient.email)
    .bind(&patient.password_hash)
    .bind(patient.first_access)
    .bind(&patient.phone)
    .bind(patient.birth_date)
    .bind(&patient.address.state)
    .bind(&patient.address.city)
    .bind(&patient.address.district)
    .bind(&patient.address.zip_code)
    .bind(&patient.address.street)
    .bind(&patient.address.number)
    .bind(patient.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("paciente {}", patient.id)));
    }

    if let Some(responsible) = &patient.responsible {
        let updated = sqlx::query(
            "UPDATE responsibles SET name = ?2, cpf = ?3, birth_date = ?4, email = ?5, \
             phone = ?6, updated_at = ?7 WHERE id = ?1",
        )
        .bind(responsible.id)
        .bind(&responsible.name)
        .bind(&responsible.cpf)
        .bind(responsible.birth_date)
        .bind(&responsible.email)
        .bind(&responsible.phone)
        .bind(responsible.updated_at)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            insert_responsible(conn, responsible).await?;
        }
    }
    Ok(())
}

async fn insert_responsible(
    conn: &mut SqliteConnection,
    responsible: &Responsible,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO responsibles (id, patient_id, name, cpf, birth_date, email, phone, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(responsible.id)
    .bind(responsible.patient_id)
    .bind(&responsible.name)
    .bind(&responsible.cpf)
    .bind(responsible.birth_date)
    .bind(&responsible.email)
    .bind(&responsible.phone)
    .bind(responsible.created_at)
    .bind(responsible.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Remove o paciente; o responsável sai junto pela chave estrangeira
pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM patients WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM patients")
        .fetch_one(&mut *conn)
        .await?)
}
