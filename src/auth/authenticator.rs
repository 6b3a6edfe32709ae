use std::sync::Arc;

use uuid::Uuid;

use super::{AuthUser, PermissionDecision, PermissionSpec};
use crate::cache::AuthCache;
use crate::errors::{AppError, AppResult};
use crate::rbac::RoleRegistry;
use crate::store::{StoreError, UserStore};

/// Resolves user ids to [`AuthUser`] snapshots and computes per-request
/// permission decisions. Cache-first on both; the cache is advisory and a
/// miss always falls through to storage.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn UserStore>,
    cache: AuthCache,
    registry: Arc<RoleRegistry>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn UserStore>, cache: AuthCache, registry: Arc<RoleRegistry>) -> Self {
        Self {
            store,
            cache,
            registry,
        }
    }

    pub fn cache(&self) -> &AuthCache {
        &self.cache
    }

    /// `Ok(None)` covers "no such user": existence is never leaked to the
    /// caller as anything other than "not authenticated". Storage failures
    /// surface as errors, not as denials.
    pub async fn authenticate(&self, user_id: Uuid) -> AppResult<Option<AuthUser>> {
        if let Some(user) = self.cache.lookup_user(user_id).await {
            return Ok(Some(user));
        }

        let db_user = match self.store.get_user_by_id(user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let roles = self.store.get_user_roles(user_id).await.map_err(AppError::from)?;

        let user = AuthUser::resolve(&db_user, roles, &self.registry);
        self.cache.store_user(&user).await;
        Ok(Some(user))
    }

    /// Decision algorithm: missing or inactive user denies; superuser allows
    /// and bypasses field restrictions; otherwise membership of the spec's
    /// code in the role-derived permission set decides, with the spec's
    /// field restrictions passed through for the caller to enforce.
    pub async fn permission_for(
        &self,
        user_id: Uuid,
        spec: &PermissionSpec,
    ) -> AppResult<PermissionDecision> {
        if let Some(decision) = self.cache.lookup_permission(user_id, &spec.code).await {
            return Ok(decision);
        }

        let decision = match self.authenticate(user_id).await? {
            None => PermissionDecision::denied(),
            Some(user) if !user.is_active => PermissionDecision::denied(),
            Some(user) if user.is_superuser => PermissionDecision::superuser(),
            Some(user) => PermissionDecision {
                allowed: user.has_permission(&spec.code),
                deny_fields: spec.deny_fields.clone(),
                allow_all_fields: spec.allow_all_fields,
            },
        };

        self.cache
            .store_permission(user_id, &spec.code, &decision)
            .await;
        Ok(decision)
    }

    /// Route-level enforcement: deny is a 403, and so is touching a denied
    /// field when the decision does not allow all fields.
    pub async fn require(&self, user_id: Uuid, spec: &PermissionSpec) -> AppResult<()> {
        let decision = self.permission_for(user_id, spec).await?;

        if !decision.allowed {
            return Err(AppError::forbidden(format!(
                "missing permission {}",
                spec.code
            )));
        }

        if !decision.allow_all_fields {
            if let Some(denied) = spec
                .request_keys
                .iter()
                .find(|key| decision.deny_fields.contains(*key))
            {
                return Err(AppError::forbidden(format!(
                    "field {denied} is not accessible"
                )));
            }
        }

        Ok(())
    }
}
