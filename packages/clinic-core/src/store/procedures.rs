//! Repositório do catálogo de procedimentos

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::{Page, PageRequest};
use crate::error::DbError;
use crate::models::Procedure;

const SELECT_PROCEDURE: &str = "SELECT id, name, description, plan_price, private_price, \
     created_at, updated_at FROM procedures";

pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Procedure>, DbError> {
    let sql = format!("{} WHERE id = ?1", SELECT_PROCEDURE);
    Ok(sqlx::query_as::<_, Procedure>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Procedimentos existentes entre os ids pedidos
///
/// Ids repetidos ou inexistentes simplesmente não aparecem no resultado.
pub async fn list_by_ids(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
) -> Result<Vec<Procedure>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("{} WHERE id IN (", SELECT_PROCEDURE));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY name");

    Ok(query
        .build_query_as::<Procedure>()
        .fetch_all(&mut *conn)
        .await?)
}

/// Catálogo em ordem alfabética
pub async fn list(
    conn: &mut SqliteConnection,
    page: PageRequest,
) -> Result<Page<Procedure>, DbError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM procedures")
        .fetch_one(&mut *conn)
        .await?;

    let sql = format!("{} ORDER BY name LIMIT ?1 OFFSET ?2", SELECT_PROCEDURE);
    let items = sqlx::query_as::<_, Procedure>(&sql)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Page { items, total })
}

pub async fn insert(conn: &mut SqliteConnection, procedure: &Procedure) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO procedures (id, name, description, plan_price, private_price, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(procedure.id)
    .bind(&procedure.name)
    .bind(&procedure.description)
    .bind(procedure.plan_price.to_string())
    .bind(procedure.private_price.to_string())
    .bind(procedure.created_at)
    .bind(procedure.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update(conn: &mut SqliteConnection, procedure: &Procedure) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE procedures SET name = ?2, description = ?3, plan_price = ?4, \
         private_price = ?5, updated_at = ?6 WHERE id = ?1",
    )
    .bind(procedure.id)
    .bind(&procedure.name)
    .bind(&procedure.description)
    .bind(procedure.plan_price.to_string())
    .bind(procedure.private_price.to_string())
    .bind(procedure.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("procedimento {}", procedure.id)));
    }
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM procedures WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Quantos atendimentos usam o procedimento
pub async fn count_references(conn: &mut SqliteConnection, id: Uuid) -> Result<i64, DbError> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM appointment_procedures WHERE procedure_id = ?1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?,
    )
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM procedures")
        .fetch_one(&mut *conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::test_db;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn procedure(name: &str, plan: i64, private: i64) -> Procedure {
        Procedure {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: Some(format!("{} de rotina", name)),
            plan_price: Decimal::new(plan, 2),
            private_price: Decimal::new(private, 2),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_prices_round_trip_exactly() {
        let db = test_db().await;
        let mut conn = db.store.acquire().await.unwrap();

        let consulta = procedure("Consulta", 100_10, 150_99);
        insert(&mut conn, &consulta).await.unwrap();

        let found = find(&mut conn, consulta.id).await.unwrap().unwrap();
        assert_eq!(found.plan_price, Decimal::new(100_10, 2));
        assert_eq!(found.private_price, Decimal::new(150_99, 2));
    }

    #[tokio::test]
    async fn test_list_by_ids_skips_unknown_and_repeated_ids() {
        let db = test_db().await;
        let mut conn = db.store.acquire().await.unwrap();

        let a = procedure("Consulta", 100_00, 150_00);
        let b = procedure("Raio-X", 50_00, 70_00);
        insert(&mut conn, &a).await.unwrap();
        insert(&mut conn, &b).await.unwrap();

        let found = list_by_ids(&mut conn, &[a.id, a.id, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        let both = list_by_ids(&mut conn, &[b.id, a.id]).await.unwrap();
        assert_eq!(both.len(), 2);

        assert!(list_by_ids(&mut conn, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_is_alphabetical_and_paginated() {
        let db = test_db().await;
        let mut conn = db.store.acquire().await.unwrap();

        for name in ["Sutura", "Curativo", "Raio-X"] {
            insert(&mut conn, &procedure(name, 10_00, 20_00)).await.unwrap();
        }

        let page = list(&mut conn, PageRequest::new(0, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Curativo", "Raio-X"]);
    }
}
