//! Bearer-credential verification and device-token helpers.
//!
//! Minting user accounts and tenant membership lives in the external auth
//! service (out of scope here); what this module owns is verifying bearer
//! JWTs on the Rule Engine and Device Service REST surfaces, minting the
//! long-lived host-client credential, and hashing high-entropy device
//! tokens so only their digest is ever persisted.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// JWT claims carried by both the external bearer token (subject = user,
/// tenant = workspace) and the host-client credential (subject = client_id).
///
/// Java equivalent:
/// ```java
/// class Claims {
///     String sub;
///     String tenant;
///     long exp;
///     long iat;
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub tenant: String,
    pub exp: usize,
    pub iat: usize,
}

/// Mint a bearer token. Used internally only for the host-client credential
/// (§4.5); end-user JWT minting belongs to the external auth service.
pub fn create_jwt(subject: &str, tenant: &str, secret: &str, expires_in_seconds: i64) -> Result<String> {
    let now = Utc::now();
    let expiration = now + Duration::seconds(expires_in_seconds);

    let claims = Claims {
        sub: subject.to_string(),
        tenant: tenant.to_string(),
        exp: expiration.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?;
    Ok(token)
}

/// Verify and decode a bearer token, rejecting expired or mis-signed tokens
/// before any tenant-scoped state is touched (§6 Auth, §7 `unauthorized`).
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            Error::Unauthorized("token expired".to_string())
        }
        _ => Error::Unauthorized(format!("invalid token: {e}")),
    })?;

    Ok(token_data.claims)
}

/// Generate a high-entropy device agent token (32 bytes, hex-encoded), per
/// §4.5. The caller is responsible for returning this exactly once and
/// persisting only its hash.
pub fn generate_device_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of a device token, hex-encoded, for storage as
/// `agent_token_hash`. Device tokens are high-entropy opaque bearer secrets
/// rather than user passwords, so a fast digest is appropriate here — unlike
/// the bcrypt hashing an external auth service would apply to passwords.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Authenticated tenant context, extracted from the `Authorization: Bearer`
/// header on every REST handler that needs one. The JWT secret is pulled
/// from request extensions (injected by a middleware layer per service),
/// mirroring the reference `AuthUser` extractor, generalized from a single
/// `user_id` subject to a `(subject, tenant)` pair since every entity here
/// is tenant-scoped.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
    pub tenant: String,
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("expected Bearer scheme".to_string()))?;

        let jwt_secret = parts
            .extensions
            .get::<String>()
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("jwt secret not configured")))?;

        let claims = verify_jwt(token, jwt_secret)?;

        if let Some(header_tenant) = parts
            .headers
            .get("X-Workspace-ID")
            .and_then(|h| h.to_str().ok())
        {
            if header_tenant != claims.tenant {
                return Err(Error::Unauthorized(
                    "X-Workspace-ID does not match token tenant".to_string(),
                ));
            }
        }

        Ok(AuthContext {
            subject: claims.sub,
            tenant: claims.tenant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_round_trip() {
        let secret = "test_secret_key_minimum_32_characters_long_123456";
        let token = create_jwt("client-1", "tenant-a", secret, 3600).unwrap();
        let claims = verify_jwt(&token, secret).unwrap();
        assert_eq!(claims.sub, "client-1");
        assert_eq!(claims.tenant, "tenant-a");
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let secret = "test_secret_key_minimum_32_characters_long_123456";
        let wrong = "wrong_secret_key_minimum_32_characters_long_654321";
        let token = create_jwt("client-1", "tenant-a", secret, 3600).unwrap();
        assert!(verify_jwt(&token, wrong).is_err());
    }

    #[test]
    fn test_jwt_expired_rejected() {
        let secret = "test_secret_key_minimum_32_characters_long_123456";
        let token = create_jwt("client-1", "tenant-a", secret, -10).unwrap();
        let err = verify_jwt(&token, secret).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_device_token_is_high_entropy_and_unique() {
        let a = generate_device_token();
        let b = generate_device_token();
        assert_eq!(a.len(), 64); // 32 bytes hex-encoded
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_token_deterministic_and_irreversible() {
        let token = generate_device_token();
        let hash1 = hash_token(&token);
        let hash2 = hash_token(&token);
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, token);
    }
}
