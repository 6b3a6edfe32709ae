use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{NewUser, StoreError, UserStore};
use crate::models::user::DbUser;
use crate::rbac::RoleCode;

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// SQLite reports unique violations as error code 2067 with the offending
/// `table.column` in the message; pull the column out for the conflict meta.
fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let message = db_err.message();
        if message.contains("UNIQUE constraint failed") {
            let field = message
                .rsplit('.')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string();
            return StoreError::Conflict { field };
        }
    }
    StoreError::Database(err)
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, is_active, created_at, updated_at";

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create_user(&self, user: NewUser) -> Result<DbUser, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(true)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        self.get_user_by_id(id).await
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<DbUser, StoreError> {
        sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<DbUser>, StoreError> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<DbUser>, StoreError> {
        let users = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn set_active(&self, user_id: Uuid, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_user_roles(&self, user_id: Uuid) -> Result<HashSet<RoleCode>, StoreError> {
        let rows = sqlx::query("SELECT role_code FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        // role_code is constrained by the roles table, but rows predating a
        // registry change may hold codes we no longer accept; skip those.
        let roles = rows
            .iter()
            .filter_map(|row| RoleCode::new(row.get::<String, _>("role_code")).ok())
            .collect();
        Ok(roles)
    }

    async fn assign_role(&self, user_id: Uuid, role: &RoleCode) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_roles (user_id, role_code, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_role(&self, user_id: Uuid, role: &RoleCode) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_code = ?")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_users_with_role(&self, role: &RoleCode) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM user_roles WHERE role_code = ?")
                .bind(role.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
