use std::borrow::Borrow;
use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Validation error for role / permission identifiers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    #[error("invalid role code: {0:?}")]
    InvalidRole(String),
    #[error("invalid permission code: {0:?}")]
    InvalidPermission(String),
}

/// Validated role identifier: `^[a-z][a-z0-9_]{2,63}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "admin")]
pub struct RoleCode(String);

impl RoleCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CodeError> {
        let value = value.into();
        if is_valid_role(&value) {
            Ok(Self(value))
        } else {
            Err(CodeError::InvalidRole(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn super_admin() -> Self {
        Self(super::SUPER_ADMIN.to_string())
    }

    pub fn admin() -> Self {
        Self(super::ADMIN.to_string())
    }

    pub fn user() -> Self {
        Self(super::USER.to_string())
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RoleCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RoleCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RoleCode::new(raw).map_err(D::Error::custom)
    }
}

/// Validated permission identifier in `domain:action` form:
/// `^[a-z]+:[a-z_]+$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "users:read")]
pub struct PermissionCode(String);

impl PermissionCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CodeError> {
        let value = value.into();
        if is_valid_permission(&value) {
            Ok(Self(value))
        } else {
            Err(CodeError::InvalidPermission(value))
        }
    }

    /// Construct from a system constant. Only for the closed set declared in
    /// [`crate::rbac::permissions`]; panics on anything else, which makes a
    /// typo in a constant fail the process at startup instead of silently
    /// denying requests.
    pub(crate) fn well_known(value: &'static str) -> Self {
        Self::new(value).expect("well-known permission code must be valid")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PermissionCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PermissionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PermissionCode::new(raw).map_err(D::Error::custom)
    }
}

fn is_valid_role(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() < 3 || bytes.len() > 64 {
        return false;
    }
    if !bytes[0].is_ascii_lowercase() {
        return false;
    }
    bytes[1..]
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'_')
}

fn is_valid_permission(value: &str) -> bool {
    let Some((domain, action)) = value.split_once(':') else {
        return false;
    };
    !domain.is_empty()
        && !action.is_empty()
        && domain.bytes().all(|b| b.is_ascii_lowercase())
        && action.bytes().all(|b| b.is_ascii_lowercase() || b == b'_')
}
