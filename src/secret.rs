use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

use crate::error::{EnrollmentError, Result};

/// Hashes and verifies course enrollment keys (argon2id, PHC strings at rest).
#[derive(Clone)]
pub struct KeyHasher {
    argon: Argon2<'static>,
}

impl Default for KeyHasher {
    fn default() -> Self {
        KeyHasher { argon: Argon2::default() }
    }
}

impl KeyHasher {
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| EnrollmentError::KeyHash(e.to_string()))?;
        Ok(digest.to_string())
    }

    /// False for a mismatch and for a digest that does not parse.
    pub fn verify(&self, digest: &str, secret: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self.argon.verify_password(secret.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!(error=%e, "stored enrollment key digest is malformed");
                false
            }
        }
    }
}

/// Cheap parameters so tests do not spend their time in argon2.
#[cfg(test)]
pub(crate) fn fast() -> KeyHasher {
    use argon2::{Algorithm, Params, Version};
    let params = Params::new(64, 1, 1, None).unwrap();
    KeyHasher { argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params) }
}
