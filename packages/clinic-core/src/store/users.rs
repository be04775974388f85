//! Repositório de usuários internos

use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{Page, PageRequest};
use crate::error::DbError;
use crate::models::User;

const SELECT_USER: &str =
    "SELECT id, name, email, password_hash, role, created_at, updated_at FROM users";

pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>, DbError> {
    let sql = format!("{} WHERE id = ?1", SELECT_USER);
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn find_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<User>, DbError> {
    let sql = format!("{} WHERE email = ?1", SELECT_USER);
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Usuários mais recentes primeiro
pub async fn list(conn: &mut SqliteConnection, page: PageRequest) -> Result<Page<User>, DbError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *conn)
        .await?;

    let sql = format!("{} ORDER BY created_at DESC LIMIT ?1 OFFSET ?2", SELECT_USER);
    let items = sqlx::query_as::<_, User>(&sql)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Page { items, total })
}

pub async fn insert(conn: &mut SqliteConnection, user: &User) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update(conn: &mut SqliteConnection, user: &User) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE users SET name = ?2, email = ?3, password_hash = ?4, role = ?5, updated_at = ?6 \
         WHERE id = ?1",
    )
    .bind(user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("usuário {}", user.id)));
    }
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::store::testing::test_db;
    use chrono::Utc;

    fn user(email: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Renata".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_update_and_find_by_email() {
        let db = test_db().await;
        let mut conn = db.store.acquire().await.unwrap();

        let mut renata = user("renata@clinica.med.br", Role::Staff);
        insert(&mut conn, &renata).await.unwrap();

        renata.role = Role::Admin;
        update(&mut conn, &renata).await.unwrap();

        let found = find_by_email(&mut conn, "renata@clinica.med.br")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, renata.id);
        assert_eq!(found.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_update_missing_user_is_not_found() {
        let db = test_db().await;
        let mut conn = db.store.acquire().await.unwrap();

        let err = update(&mut conn, &user("ninguem@clinica.med.br", Role::Staff))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }
}
