use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::AppError;

/// Fixed bcrypt work factor.
pub const BCRYPT_COST: u32 = 10;

/// Lifetime of a session token (and of the session cookie), in seconds.
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Role
///
/// Authorization level of an account. Serialised as `admin` / `superadmin`
/// both in tokens and in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }

    /// Unknown role strings degrade to `Admin`, never upwards.
    pub fn parse(value: &str) -> Self {
        match value {
            "superadmin" => Role::SuperAdmin,
            _ => Role::Admin,
        }
    }
}

/// Claims
///
/// The identity carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

/// Wire form of the token payload: the identity plus registered claims.
#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    #[serde(flatten)]
    identity: Claims,
    iat: i64,
    exp: i64,
}

/// hash_password
///
/// One-way salted bcrypt digest. Failure means the hashing backend is unusable.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// verify_password
///
/// Uses bcrypt's own comparison. A malformed digest never verifies.
pub fn verify_password(password: &str, digest: &str) -> bool {
    bcrypt::verify(password, digest).unwrap_or(false)
}

/// TokenIssuer
///
/// Signs and checks session tokens with the server-held secret (HS256).
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issues a token that expires 24 hours from now.
    pub fn issue(&self, user_id: i64, username: &str, role: Role) -> Result<String, AppError> {
        self.issue_with_ttl(user_id, username, role, TOKEN_TTL_SECS)
    }

    pub(crate) fn issue_with_ttl(
        &self,
        user_id: i64,
        username: &str,
        role: Role,
        ttl_secs: i64,
    ) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let payload = TokenPayload {
            identity: Claims {
                user_id,
                username: username.to_string(),
                role,
            },
            iat: now,
            exp: now + ttl_secs,
        };

        encode(&Header::new(Algorithm::HS256), &payload, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    /// Returns the identity for a genuine, unexpired token. Every kind of
    /// failure (garbage, bad signature, expiry) is the same `None`.
    pub fn validate(&self, token: &str) -> Option<Claims> {
        match decode::<TokenPayload>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims.identity),
            Err(e) => {
                tracing::debug!(reason = ?e.kind(), "Rejected session token");
                None
            }
        }
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenIssuer { .. }")
    }
}
