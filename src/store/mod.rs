//! Storage port for users and role assignments.
//!
//! The trait is the contract the auth core consumes; `SqliteUserStore` is
//! the shipped adapter. Outcomes stay distinguishable: "not found",
//! "constraint violated" and "transient database failure" surface as
//! different variants so callers can map them honestly.

mod sqlite;

pub use sqlite::SqliteUserStore;

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::DbUser;
use crate::rbac::RoleCode;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated on {field}")]
    Conflict { field: String },
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::not_found("user not found"),
            StoreError::Conflict { field } => {
                AppError::conflict_on_field(format!("{field} already in use"), field)
            }
            StoreError::Database(inner) => AppError::Database(inner),
        }
    }
}

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<DbUser, StoreError>;
    async fn get_user_by_id(&self, user_id: Uuid) -> Result<DbUser, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<DbUser>, StoreError>;
    async fn list_users(&self) -> Result<Vec<DbUser>, StoreError>;
    async fn set_active(&self, user_id: Uuid, active: bool) -> Result<(), StoreError>;

    async fn get_user_roles(&self, user_id: Uuid) -> Result<HashSet<RoleCode>, StoreError>;
    /// Returns false when the role was already assigned.
    async fn assign_role(&self, user_id: Uuid, role: &RoleCode) -> Result<bool, StoreError>;
    /// Returns false when the role was not assigned in the first place.
    async fn revoke_role(&self, user_id: Uuid, role: &RoleCode) -> Result<bool, StoreError>;
    async fn count_users_with_role(&self, role: &RoleCode) -> Result<i64, StoreError>;
}
