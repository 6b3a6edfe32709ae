use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

const TYP_ACCESS: &str = "access";
const TYP_REFRESH: &str = "refresh";

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: Arc<Vec<u8>>,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub sub: Uuid,
    /// Unique per issued token. Timestamps alone are second-resolution, so
    /// without this two tokens minted in the same second would be
    /// byte-identical and rotation could "replace" a token with itself.
    pub jti: Uuid,
    pub typ: String,
    pub iat: usize,
    pub exp: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fpr: Option<String>,
}

impl TokenConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret =
            std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| "warden".to_string());
        let audience = std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "warden-api".to_string());
        let access_ttl_secs = env_secs("JWT_ACCESS_TTL_SECS", 900)?;
        let refresh_ttl_secs = env_secs("JWT_REFRESH_TTL_SECS", 14 * 24 * 3600)?;

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            issuer,
            audience,
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    pub fn issue_access(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue(user_id, TYP_ACCESS, self.access_ttl_secs, None)
    }

    pub fn issue_refresh(&self, user_id: Uuid, fingerprint: &str) -> Result<String, AppError> {
        self.issue(
            user_id,
            TYP_REFRESH,
            self.refresh_ttl_secs,
            Some(fingerprint.to_string()),
        )
    }

    /// Returns the subject of a valid access token. Every failure mode
    /// (signature, expiry, issuer, audience, missing claim, wrong typ)
    /// collapses into the same generic error so the response cannot be used
    /// as an oracle for which check rejected the token.
    pub fn verify_access(&self, token: &str) -> Result<Uuid, AppError> {
        let claims = self.decode(token)?;
        if claims.typ != TYP_ACCESS {
            return Err(AppError::invalid_token());
        }
        Ok(claims.sub)
    }

    /// Returns subject and device fingerprint of a valid refresh token.
    /// Same generic-error discipline as [`Self::verify_access`].
    pub fn verify_refresh(&self, token: &str) -> Result<(Uuid, String), AppError> {
        let claims = self.decode(token)?;
        if claims.typ != TYP_REFRESH {
            return Err(AppError::invalid_token());
        }
        match claims.fpr {
            Some(fpr) if !fpr.is_empty() => Ok((claims.sub, fpr)),
            _ => Err(AppError::invalid_token()),
        }
    }

    fn issue(
        &self,
        user_id: Uuid,
        typ: &str,
        ttl_secs: i64,
        fpr: Option<String>,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(ttl_secs);

        let claims = Claims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: user_id,
            jti: Uuid::new_v4(),
            typ: typ.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
            fpr,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::internal(format!("failed to sign token: {err}")))
    }

    fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::invalid_token())
    }
}

fn env_secs(name: &str, default: i64) -> Result<i64, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<i64>()
            .map_err(|_| AppError::configuration(format!("{name} must be a valid integer"))),
        Err(_) => Ok(default),
    }
}
