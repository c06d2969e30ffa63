use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const CREDENTIAL_VERSION: &str = "v1";
const PASSWORD_VERSION: &str = "v1";
const PASSWORD_ROUNDS: u32 = 10_000;
const MAX_CREDENTIAL_LEN: usize = 1024;

/// Env var that overrides the workspace-local signing secret.
pub const SECRET_ENV: &str = "ROLLCALLD_SECRET";
const SECRET_FILE: &str = "auth.secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed, tampered, or expired credential. Deliberately carries no
    /// detail about which check failed.
    Invalid,
    /// The provider itself failed (key setup, encoding).
    Provider(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Invalid => write!(f, "invalid credential"),
            AuthError::Provider(msg) => write!(f, "auth provider failure: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Claims embedded in a signed credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub user_id: String,
    pub role: String,
    pub exp: i64,
}

/// Capability boundary for password digests and signed session
/// credentials. The service core never sees plaintext storage or signing
/// keys through this trait.
pub trait AuthProvider {
    fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    fn verify_password(&self, password: &str, stored: &str) -> bool;
    fn issue(&self, user_id: &str, role: &str, ttl: Duration) -> Result<String, AuthError>;
    fn verify_credential(&self, credential: &str) -> Result<Claims, AuthError>;
}

/// Production provider: salted iterated SHA-256 password digests and
/// HMAC-SHA256-signed credentials in the form
/// `v1.<base64url payload>.<base64url signature>`.
pub struct HmacAuthProvider {
    secret: Vec<u8>,
}

impl HmacAuthProvider {
    pub fn new(secret: Vec<u8>) -> HmacAuthProvider {
        HmacAuthProvider { secret }
    }

    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        mac.update(bytes);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl AuthProvider for HmacAuthProvider {
    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = password_digest(&salt, password);
        Ok(format!("{}${}${}", PASSWORD_VERSION, salt, digest))
    }

    fn verify_password(&self, password: &str, stored: &str) -> bool {
        let parts: Vec<&str> = stored.split('$').collect();
        match parts.as_slice() {
            [version, salt, digest] if *version == PASSWORD_VERSION => {
                let Ok(expected) = hex::decode(digest) else {
                    return false;
                };
                let actual = password_digest_bytes(salt, password);
                // Compare without short-circuiting on a mismatch.
                bool::from(actual.as_slice().ct_eq(expected.as_slice()))
            }
            _ => false,
        }
    }

    fn issue(&self, user_id: &str, role: &str, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            role: role.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        let payload_bytes =
            serde_json::to_vec(&claims).map_err(|e| AuthError::Provider(e.to_string()))?;
        let payload_part = URL_SAFE_NO_PAD.encode(payload_bytes);
        let sig_part = URL_SAFE_NO_PAD.encode(self.sign(payload_part.as_bytes())?);
        Ok(format!(
            "{}.{}.{}",
            CREDENTIAL_VERSION, payload_part, sig_part
        ))
    }

    fn verify_credential(&self, credential: &str) -> Result<Claims, AuthError> {
        if credential.len() > MAX_CREDENTIAL_LEN {
            return Err(AuthError::Invalid);
        }
        let parts: Vec<&str> = credential.split('.').collect();
        let (payload_part, sig_part) = match parts.as_slice() {
            [version, payload, sig] if *version == CREDENTIAL_VERSION => (*payload, *sig),
            _ => return Err(AuthError::Invalid),
        };

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        mac.update(payload_part.as_bytes());
        let sig = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| AuthError::Invalid)?;
        mac.verify_slice(&sig).map_err(|_| AuthError::Invalid)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| AuthError::Invalid)?;
        let claims: Claims =
            serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::Invalid)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Invalid);
        }
        Ok(claims)
    }
}

fn password_digest(salt: &str, password: &str) -> String {
    hex::encode(password_digest_bytes(salt, password))
}

fn password_digest_bytes(salt: &str, password: &str) -> Vec<u8> {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..PASSWORD_ROUNDS {
        digest = Sha256::digest(digest);
    }
    digest.to_vec()
}

/// Resolve the signing secret for a workspace. `ROLLCALLD_SECRET` wins when
/// set; otherwise a secret is generated once and kept in the workspace so
/// credentials stay valid across restarts.
pub fn load_or_create_secret(workspace: &Path) -> anyhow::Result<Vec<u8>> {
    if let Ok(env_secret) = std::env::var(SECRET_ENV) {
        if !env_secret.trim().is_empty() {
            return Ok(env_secret.into_bytes());
        }
    }

    let path = workspace.join(SECRET_FILE);
    if path.is_file() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read secret file {}", path.to_string_lossy()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            anyhow::bail!("secret file {} is empty", path.to_string_lossy());
        }
        return Ok(trimmed.as_bytes().to_vec());
    }

    let generated = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    std::fs::write(&path, &generated)
        .with_context(|| format!("failed to write secret file {}", path.to_string_lossy()))?;
    Ok(generated.into_bytes())
}
