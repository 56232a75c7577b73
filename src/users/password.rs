use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

use crate::config::HashingConfig;
use crate::users::error::HashingError;

/// Argon2id hasher with a configurable cost.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    pub fn new(config: &HashingConfig) -> Result<Self, HashingError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| HashingError(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hashes with a fresh random salt, so equal inputs give different outputs.
    pub fn hash(&self, plain: &str) -> Result<String, HashingError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| HashingError(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    pub fn verify(&self, plain: &str, hash: &str) -> Result<bool, HashingError> {
        let parsed = PasswordHash::new(hash).map_err(|e| HashingError(e.to_string()))?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> CredentialHasher {
    CredentialHasher::new(&HashingConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
    .expect("cheap argon2 params are valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_hash_verifies_against_the_cli_password() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("pw123").expect("hash");
        assert!(hash.starts_with("$argon2id$v=19$m=64,t=1,p=1$"), "unexpected hash {hash}");
        assert!(hasher.verify("pw123", &hash).expect("verify"));
        // a hasher with a different configured cost still reads the cost from the hash
        let other = CredentialHasher::new(&HashingConfig::default()).expect("default params");
        assert!(other.verify("pw123", &hash).expect("verify with default cost"));
    }

    #[test]
    fn near_miss_passwords_do_not_verify() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("pw123").expect("hash");
        for attempt in ["", "pw12", "pw1234", "PW123", " pw123"] {
            assert!(
                !hasher.verify(attempt, &hash).expect("verify"),
                "{attempt:?} should not match"
            );
        }
    }

    #[test]
    fn empty_password_still_gets_a_salted_hash() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("").expect("hash");
        assert!(!hash.is_empty());
        assert!(hasher.verify("", &hash).expect("verify"));
        assert!(!hasher.verify("pw123", &hash).expect("verify"));
    }

    #[test]
    fn unparsable_stored_hash_is_a_hashing_error() {
        let hasher = cheap_hasher();
        for stored in ["", "pw123", "not-a-valid-hash"] {
            assert!(hasher.verify("pw123", stored).is_err(), "{stored:?} parsed");
        }
    }

    #[test]
    fn same_password_gets_a_different_salt_each_time() {
        let hasher = cheap_hasher();
        let first = hasher.hash("pw123").expect("hash");
        let second = hasher.hash("pw123").expect("hash");
        assert_ne!(first, "pw123");
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
        assert!(hasher.verify("pw123", &first).expect("verify first"));
        assert!(hasher.verify("pw123", &second).expect("verify second"));
    }

    #[test]
    fn cost_parameters_end_up_in_the_hash() {
        let hasher = CredentialHasher::new(&HashingConfig {
            memory_kib: 128,
            iterations: 2,
            parallelism: 1,
        })
        .expect("valid params");
        let hash = hasher.hash("pw").expect("hash");
        assert!(hash.contains("m=128,t=2,p=1"), "unexpected hash {hash}");
    }

    #[test]
    fn rejects_invalid_cost_parameters() {
        let err = CredentialHasher::new(&HashingConfig {
            memory_kib: 64,
            iterations: 0,
            parallelism: 1,
        })
        .err()
        .expect("zero iterations must be rejected");
        assert!(err.to_string().contains("invalid argon2 parameters"));
    }
}
