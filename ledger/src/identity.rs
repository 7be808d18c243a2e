//! Identity store and bearer tokens.
//!
//! Admin credentials are kept in a process-wide map guarded by its own
//! lock and written only at admin creation; passwords are hashed with
//! argon2 (memory-hard, salted) and validated in constant time by the
//! argon2 verifier. Bearer tokens are HMAC-SHA256 JWTs carrying the role
//! and, for voters, the voter id.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issuer claim stamped into every token.
pub const TOKEN_ISSUER: &str = "voting-blockchain-api";

/// Caller role carried in token claims.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Voter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Voter => write!(f, "voter"),
        }
    }
}

/// Errors from credential validation and token handling.
#[derive(Debug)]
pub enum IdentityError {
    /// Unknown username or wrong password. Deliberately one variant so
    /// responses cannot be used to enumerate accounts.
    InvalidCredentials,
    /// The token is expired.
    TokenExpired,
    /// The token is malformed, has a bad signature, or bad claims.
    TokenInvalid(String),
    /// Password hashing failed.
    Hashing(String),
    /// An admin with this username already exists.
    DuplicateUsername(String),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::InvalidCredentials => write!(f, "invalid credentials"),
            IdentityError::TokenExpired => write!(f, "token expired"),
            IdentityError::TokenInvalid(msg) => write!(f, "invalid token: {msg}"),
            IdentityError::Hashing(msg) => write!(f, "password hashing failed: {msg}"),
            IdentityError::DuplicateUsername(name) => {
                write!(f, "admin `{name}` already exists")
            }
        }
    }
}

impl std::error::Error for IdentityError {}

/// Claims carried by every bearer token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: same as `user_id`.
    pub sub: String,
    pub user_id: String,
    pub email: String,
    pub role: Role,
    /// Set only on voter tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<String>,
    /// Expiry, seconds since Unix epoch.
    pub exp: i64,
    /// Not valid before.
    pub nbf: i64,
    /// Issued at.
    pub iat: i64,
    pub iss: String,
}

/// Issues, validates, and refreshes HMAC-SHA256 bearer tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: i64,
}

impl TokenService {
    pub fn new(secret: &[u8], lifetime_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime_secs,
        }
    }

    /// Issues a token for the given identity.
    pub fn issue(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
        voter_id: Option<&str>,
    ) -> Result<String, IdentityError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            role,
            voter_id: voter_id.map(str::to_string),
            exp: now + self.lifetime_secs,
            nbf: now,
            iat: now,
            iss: TOKEN_ISSUER.to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| IdentityError::TokenInvalid(e.to_string()))
    }

    /// Validates a token and returns its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, IdentityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => IdentityError::TokenExpired,
                _ => IdentityError::TokenInvalid(e.to_string()),
            }
        })?;
        Ok(data.claims)
    }

    /// Validates a token, then re-issues it with a fresh expiry.
    pub fn refresh(&self, token: &str) -> Result<String, IdentityError> {
        let claims = self.validate(token)?;
        self.issue(
            &claims.user_id,
            &claims.email,
            claims.role,
            claims.voter_id.as_deref(),
        )
    }

    /// Configured token lifetime in seconds.
    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }
}

/// An administrator account.
#[derive(Clone, Debug)]
pub struct Admin {
    pub id: String,
    pub username: String,
    pub email: String,
    /// PHC-format argon2 hash; the cleartext is never kept.
    pub password_hash: String,
    pub role: Role,
    pub created_at: i64,
}

/// Process-wide admin registry.
///
/// Writes happen only when an admin is created (normally once, at boot,
/// from the seed configuration).
#[derive(Default)]
pub struct AdminStore {
    admins: RwLock<HashMap<String, Admin>>,
}

impl AdminStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an admin with a freshly hashed password.
    pub fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
        now: i64,
    ) -> Result<Admin, IdentityError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| IdentityError::Hashing(e.to_string()))?
            .to_string();

        let admin = Admin {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role: Role::Admin,
            created_at: now,
        };

        let mut admins = self.admins.write().unwrap_or_else(PoisonError::into_inner);
        if admins.contains_key(username) {
            return Err(IdentityError::DuplicateUsername(username.to_string()));
        }
        admins.insert(username.to_string(), admin.clone());
        Ok(admin)
    }

    /// Validates a username/password pair.
    ///
    /// The comparison runs inside argon2's verifier, which is constant
    /// time over the hash.
    pub fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Admin, IdentityError> {
        let admins = self.admins.read().unwrap_or_else(PoisonError::into_inner);
        let admin = admins
            .get(username)
            .ok_or(IdentityError::InvalidCredentials)?;

        let parsed = PasswordHash::new(&admin.password_hash)
            .map_err(|e| IdentityError::Hashing(e.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| IdentityError::InvalidCredentials)?;

        Ok(admin.clone())
    }

    /// Number of registered admins.
    pub fn len(&self) -> usize {
        self.admins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
