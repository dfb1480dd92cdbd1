//! One-way credential hashing.
//!
//! The stored form of a password is the standard (padded) base64 encoding of
//! its SHA-256 digest, e.g. `"s3cret"` becomes a 44-character string. Records
//! written by earlier desktop builds use the same encoding, so they restore
//! and verify without migration.
//!
//! There is no plaintext path: a hasher that cannot produce a
//! digest returns [`HashError::Unavailable`] and the caller must give up.

use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroize;

/// Length of an encoded SHA-256 digest in standard padded base64.
pub const ENCODED_DIGEST_LEN: usize = 44;

/// Errors produced by a credential hasher
#[derive(Debug, Error)]
pub enum HashError {
    #[error("hash primitive unavailable: {0}")]
    Unavailable(String),
}

/// Deterministic one-way transform of a secret into a printable digest.
pub trait CredentialHasher: Send + Sync {
    /// Hash `plaintext` into its stored text form.
    fn hash(&self, plaintext: &str) -> Result<String, HashError>;

    /// Recompute the digest of `plaintext` and compare it with `digest`.
    ///
    /// The comparison runs in constant time with respect to the digest
    /// contents.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError> {
        let candidate = self.hash(plaintext)?;
        Ok(bool::from(candidate.as_bytes().ct_eq(digest.as_bytes())))
    }
}

/// SHA-256 + standard base64.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl CredentialHasher for Sha256Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let mut raw = Sha256::digest(plaintext.as_bytes());
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw.as_slice());
        raw.as_mut_slice().zeroize();
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // SHA-256("") = e3b0c442...b855, base64 of the raw bytes:
        assert_eq!(
            Sha256Hasher.hash("").unwrap(),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_digest_shape() {
        let digest = Sha256Hasher.hash("s3cret").unwrap();
        assert_eq!(digest.len(), ENCODED_DIGEST_LEN);
        assert_ne!(digest, "s3cret");
        assert_eq!(digest, Sha256Hasher.hash("s3cret").unwrap());
    }

    #[test]
    fn test_verify() {
        let digest = Sha256Hasher.hash("s3cret").unwrap();
        assert!(Sha256Hasher.verify("s3cret", &digest).unwrap());
        assert!(!Sha256Hasher.verify("wrong", &digest).unwrap());
        // a digest is never accepted as its own plaintext
        assert!(!Sha256Hasher.verify(&digest, &digest).unwrap());
    }

    #[test]
    fn test_verify_rejects_truncated_digest() {
        let digest = Sha256Hasher.hash("s3cret").unwrap();
        assert!(!Sha256Hasher.verify("s3cret", &digest[..20]).unwrap());
    }

    proptest! {
        #[test]
        fn hash_round_trips(p in ".*", q in ".*") {
            let digest = Sha256Hasher.hash(&p).unwrap();
            prop_assert!(Sha256Hasher.verify(&p, &digest).unwrap());
            prop_assert_eq!(Sha256Hasher.verify(&q, &digest).unwrap(), p == q);
        }
    }
}
