use std::time::{Duration, Instant};

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tracing::error;

/// Cost parameter for bcrypt; matches the demo's fixed work factor.
const BCRYPT_COST: u32 = 10;

/// Which algorithm produced a stored credential. Chosen at write time,
/// persisted next to the hash so compare can dispatch without guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum HashMethod {
    Md5,
    Sha1,
    Bcrypt,
    Argon2,
}

impl HashMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashMethod::Md5 => "md5",
            HashMethod::Sha1 => "sha1",
            HashMethod::Bcrypt => "bcrypt",
            HashMethod::Argon2 => "argon2",
        }
    }

    /// True for the unsalted, fast digests the crack demo can attack.
    pub fn is_fast(&self) -> bool {
        matches!(self, HashMethod::Md5 | HashMethod::Sha1)
    }
}

impl std::fmt::Display for HashMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash `plain` under the given method. md5/sha1 are intentionally
/// unsalted hex digests; bcrypt/argon2 embed their own salt.
pub fn hash(plain: &str, method: HashMethod) -> anyhow::Result<String> {
    match method {
        HashMethod::Md5 => Ok(hex::encode(Md5::digest(plain.as_bytes()))),
        HashMethod::Sha1 => Ok(hex::encode(Sha1::digest(plain.as_bytes()))),
        HashMethod::Bcrypt => Ok(bcrypt::hash(plain, BCRYPT_COST)?),
        HashMethod::Argon2 => {
            let salt = SaltString::generate(&mut OsRng);
            let hash = Argon2::default()
                .hash_password(plain.as_bytes(), &salt)
                .map_err(|e| {
                    error!(error = %e, "argon2 hash_password error");
                    anyhow::anyhow!(e.to_string())
                })?
                .to_string();
            Ok(hash)
        }
    }
}

/// Compare `plain` against a stored hash using the method recorded for it.
/// Weak methods re-hash and string-compare; strong methods use the
/// library verifier. Malformed stored hashes surface as errors.
pub fn compare(plain: &str, stored: &str, method: HashMethod) -> anyhow::Result<bool> {
    match method {
        HashMethod::Md5 | HashMethod::Sha1 => Ok(hash(plain, method)? == stored),
        HashMethod::Bcrypt => Ok(bcrypt::verify(plain, stored)?),
        HashMethod::Argon2 => {
            let parsed = PasswordHash::new(stored).map_err(|e| {
                error!(error = %e, "argon2 parse hash error");
                anyhow::anyhow!(e.to_string())
            })?;
            Ok(Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok())
        }
    }
}

/// `hash` plus wall-clock duration, for the timing demo endpoints.
pub fn hash_timed(plain: &str, method: HashMethod) -> anyhow::Result<(String, Duration)> {
    let start = Instant::now();
    let hashed = hash(plain, method)?;
    Ok((hashed, start.elapsed()))
}

/// `compare` plus wall-clock duration, for the crack demo.
pub fn compare_timed(
    plain: &str,
    stored: &str,
    method: HashMethod,
) -> anyhow::Result<(bool, Duration)> {
    let start = Instant::now();
    let matched = compare(plain, stored, method)?;
    Ok((matched, start.elapsed()))
}
