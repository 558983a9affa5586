//! Certificate keypairs
//!
//! A certificate publishes its Ed25519 verifying key and carries its signing
//! key sealed under a password:
//! - Argon2id over the password with a random salt gives a 32-byte key
//! - AES-256-GCM seals the 32-byte secret with a random nonce
//!
//! Anyone can verify; only someone who knows the password can sign.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::SigningError;
use crate::convergent::KeypairMaterial;

// Argon2id cost; sealed material is unreadable if these ever change
const KDF_MEMORY_KIB: u32 = 19 * 1024;
const KDF_ITERATIONS: u32 = 2;
const KDF_LANES: u32 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// An unsealed certificate keypair
pub struct CertificateKeys {
    signing_key: SigningKey,
}

impl CertificateKeys {
    /// Generate a new keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign arbitrary data with the Ed25519 signing key.
    pub fn sign(&self, data: &[u8]) -> Signature {
        self.signing_key.sign(data)
    }

    /// Seal the secret half under `password`.
    pub fn seal(&self, password: &str) -> Result<KeypairMaterial, SigningError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let cipher = seal_cipher(password, &salt)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let secret = Zeroizing::new(self.signing_key.to_bytes());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), &secret[..])
            .map_err(|e| SigningError::CryptoError(e.to_string()))?;

        // nonce (12 bytes) || ciphertext
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(KeypairMaterial {
            public_key: hex::encode(self.verifying_key().to_bytes()),
            salt: hex::encode(salt),
            sealed_secret: hex::encode(sealed),
        })
    }

    /// Recover the keypair from sealed material.
    ///
    /// Fails with `WrongPassword` when the seal does not open, and with
    /// `InvalidKeyMaterial` when the material is malformed or the secret does
    /// not match the published key.
    pub fn unseal(material: &KeypairMaterial, password: &str) -> Result<Self, SigningError> {
        let salt = decode_hex("salt", &material.salt)?;
        let sealed = decode_hex("sealed secret", &material.sealed_secret)?;
        if salt.len() != SALT_LEN {
            return Err(SigningError::InvalidKeyMaterial(format!(
                "salt must be {} bytes",
                SALT_LEN
            )));
        }
        if sealed.len() < NONCE_LEN {
            return Err(SigningError::InvalidKeyMaterial(
                "sealed secret too short (missing nonce)".to_string(),
            ));
        }

        let cipher = seal_cipher(password, &salt)?;
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let secret = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| SigningError::WrongPassword)?,
        );

        let secret_bytes: [u8; 32] = secret.as_slice().try_into().map_err(|_| {
            SigningError::InvalidKeyMaterial("secret key must be 32 bytes".to_string())
        })?;
        let keys = Self {
            signing_key: SigningKey::from_bytes(&secret_bytes),
        };

        if hex::encode(keys.verifying_key().to_bytes()) != material.public_key {
            return Err(SigningError::InvalidKeyMaterial(
                "secret key does not match public key".to_string(),
            ));
        }
        Ok(keys)
    }
}

/// Verify a hex-encoded signature against the public half of `material`.
///
/// Malformed keys or signatures count as a failed verification.
pub fn verify(material: &KeypairMaterial, data: &[u8], signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(&material.public_key) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let sig_bytes: [u8; 64] = match sig_bytes.as_slice().try_into() {
        Ok(b) => b,
        Err(_) => return false,
    };

    key.verify(data, &Signature::from_bytes(&sig_bytes)).is_ok()
}

fn seal_cipher(password: &str, salt: &[u8]) -> Result<Aes256Gcm, SigningError> {
    let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, KDF_LANES, Some(32))
        .map_err(|e| SigningError::CryptoError(e.to_string()))?;
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| SigningError::CryptoError(e.to_string()))?;
    Aes256Gcm::new_from_slice(&key[..]).map_err(|e| SigningError::CryptoError(e.to_string()))
}

fn decode_hex(what: &str, value: &str) -> Result<Vec<u8>, SigningError> {
    hex::decode(value).map_err(|e| SigningError::InvalidKeyMaterial(format!("{}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_unseal() {
        let keys = CertificateKeys::generate();
        let material = keys.seal("password").unwrap();

        let unsealed = CertificateKeys::unseal(&material, "password").unwrap();
        assert_eq!(unsealed.verifying_key(), keys.verifying_key());
    }

    #[test]
    fn test_wrong_password() {
        let material = CertificateKeys::generate().seal("password").unwrap();
        assert_eq!(
            CertificateKeys::unseal(&material, "wrong").err(),
            Some(SigningError::WrongPassword)
        );
    }

    #[test]
    fn test_seal_is_salted() {
        let keys = CertificateKeys::generate();
        let one = keys.seal("password").unwrap();
        let two = keys.seal("password").unwrap();

        assert_eq!(one.public_key, two.public_key);
        assert_ne!(one.salt, two.salt);
        assert_ne!(one.sealed_secret, two.sealed_secret);
    }

    #[test]
    fn test_mismatched_public_key() {
        let mut material = CertificateKeys::generate().seal("password").unwrap();
        material.public_key = hex::encode(CertificateKeys::generate().verifying_key().to_bytes());

        assert!(matches!(
            CertificateKeys::unseal(&material, "password"),
            Err(SigningError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_malformed_material() {
        let mut material = CertificateKeys::generate().seal("password").unwrap();
        material.sealed_secret = "abcd".to_string();
        assert!(matches!(
            CertificateKeys::unseal(&material, "password"),
            Err(SigningError::InvalidKeyMaterial(_))
        ));

        material.salt = "not hex".to_string();
        assert!(matches!(
            CertificateKeys::unseal(&material, "password"),
            Err(SigningError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_sealing_key_is_argon2id() {
        let keys = CertificateKeys::generate();
        let material = keys.seal("password").unwrap();
        let salt = hex::decode(&material.salt).unwrap();
        let sealed = hex::decode(&material.sealed_secret).unwrap();

        let params = Params::new(19 * 1024, 2, 1, Some(32)).unwrap();
        let mut key = [0u8; 32];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(b"password", &salt, &mut key)
            .unwrap();
        let cipher = Aes256Gcm::new_from_slice(&key).unwrap();
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let secret = cipher.decrypt(Nonce::from_slice(nonce), ciphertext).unwrap();

        assert_eq!(secret, keys.signing_key.to_bytes().to_vec());
        let unsealed = CertificateKeys::unseal(&material, "password").unwrap();
        assert_eq!(unsealed.verifying_key(), keys.verifying_key());
    }

    #[test]
    fn test_short_salt_is_invalid_material() {
        let mut material = CertificateKeys::generate().seal("password").unwrap();
        material.salt = "0011".to_string();
        assert!(matches!(
            CertificateKeys::unseal(&material, "password"),
            Err(SigningError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_verify() {
        let keys = CertificateKeys::generate();
        let material = keys.seal("password").unwrap();
        let sig = hex::encode(keys.sign(b"hello").to_bytes());

        assert!(verify(&material, b"hello", &sig));
        assert!(!verify(&material, b"tampered", &sig));

        // Too short, garbage, not hex
        assert!(!verify(&material, b"hello", "abcd"));
        assert!(!verify(&material, b"hello", &"00".repeat(64)));
        assert!(!verify(&material, b"hello", "zz"));
    }
}
