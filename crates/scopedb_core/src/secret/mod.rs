//! Encrypted and hashed string fields.
//!
//! Both wrappers split a transient plaintext (`decoded`) from the persisted
//! form. Only the persisted form reaches a document, and equality looks at
//! the persisted form alone. Plaintext is zeroized on drop.
//!
//! Encryption requires the `encryption` feature for [`AesGcmCipher`]; any
//! other [`FieldCipher`] implementation works without it.

#[cfg(feature = "encryption")]
mod cipher;

#[cfg(feature = "encryption")]
pub use cipher::{AesGcmCipher, FieldKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

#[cfg(not(feature = "encryption"))]
mod stub {
    use super::FieldCipher;
    use crate::error::{CoreError, CoreResult};

    /// Field key (stub when encryption is disabled).
    #[derive(Debug, Clone)]
    pub struct FieldKey {
        _private: (),
    }

    impl FieldKey {
        /// Always returns an error when encryption is disabled.
        pub fn generate() -> CoreResult<Self> {
            Err(CoreError::EncryptionNotEnabled)
        }

        /// Always returns an error when encryption is disabled.
        pub fn from_bytes(_bytes: &[u8]) -> CoreResult<Self> {
            Err(CoreError::EncryptionNotEnabled)
        }
    }

    /// AES-GCM cipher (stub when encryption is disabled).
    #[derive(Debug)]
    pub struct AesGcmCipher {
        _private: (),
    }

    impl AesGcmCipher {
        /// Always returns an error when encryption is disabled.
        pub fn new(_key: &FieldKey) -> CoreResult<Self> {
            Err(CoreError::EncryptionNotEnabled)
        }
    }

    impl FieldCipher for AesGcmCipher {
        fn encrypt(&self, _plaintext: &[u8]) -> CoreResult<Vec<u8>> {
            Err(CoreError::EncryptionNotEnabled)
        }

        fn decrypt(&self, _ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
            Err(CoreError::EncryptionNotEnabled)
        }
    }
}

#[cfg(not(feature = "encryption"))]
pub use stub::{AesGcmCipher, FieldKey};

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use scopedb_codec::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroizing;

/// Salt length for [`HashedString`], in bytes.
pub const SALT_LEN: usize = 16;

/// Opaque encrypt/decrypt primitive for [`EncryptedString`].
pub trait FieldCipher: Send + Sync {
    /// Encrypts `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>>;

    /// Decrypts output of [`FieldCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns an error if the data was tampered with or the key is wrong.
    fn decrypt(&self, ciphertext: &[u8]) -> CoreResult<Vec<u8>>;
}

/// A string persisted encrypted.
///
/// `encoded` is base64 of the cipher output. Setting new plaintext
/// invalidates `encoded` until the next [`EncryptedString::encode_with`].
#[derive(Clone, Default)]
pub struct EncryptedString {
    decoded: Option<Zeroizing<String>>,
    encoded: Option<String>,
}

impl EncryptedString {
    /// Wraps plaintext that has not been encrypted yet.
    pub fn from_plain(plain: impl Into<String>) -> Self {
        Self {
            decoded: Some(Zeroizing::new(plain.into())),
            encoded: None,
        }
    }

    /// Wraps a persisted ciphertext.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self {
            decoded: None,
            encoded: Some(encoded.into()),
        }
    }

    /// The plaintext, if known.
    pub fn decoded(&self) -> Option<&str> {
        self.decoded.as_deref().map(String::as_str)
    }

    /// The persisted ciphertext, if computed.
    pub fn encoded(&self) -> Option<&str> {
        self.encoded.as_deref()
    }

    /// Replaces the plaintext and drops the stale ciphertext.
    pub fn set_decoded(&mut self, plain: impl Into<String>) {
        self.decoded = Some(Zeroizing::new(plain.into()));
        self.encoded = None;
    }

    /// Encrypts the plaintext into `encoded`. No-op without plaintext.
    ///
    /// # Errors
    ///
    /// Propagates cipher errors.
    pub fn encode_with(&mut self, cipher: &dyn FieldCipher) -> CoreResult<()> {
        if let Some(plain) = &self.decoded {
            let sealed = cipher.encrypt(plain.as_bytes())?;
            self.encoded = Some(STANDARD.encode(sealed));
        }
        Ok(())
    }

    /// Decrypts `encoded` into the plaintext. No-op without ciphertext.
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` for bad base64 or non-UTF-8 plaintext, and
    /// propagates cipher errors.
    pub fn decode_with(&mut self, cipher: &dyn FieldCipher) -> CoreResult<()> {
        let Some(encoded) = &self.encoded else {
            return Ok(());
        };
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| CoreError::decryption_failed(format!("invalid base64: {e}")))?;
        let plain = Zeroizing::new(cipher.decrypt(&sealed)?);
        let text = std::str::from_utf8(&plain)
            .map_err(|_| CoreError::decryption_failed("plaintext is not UTF-8"))?;
        self.decoded = Some(Zeroizing::new(text.to_string()));
        Ok(())
    }

    /// Persisted form: the ciphertext text, or null.
    pub fn to_value(&self) -> Value {
        self.encoded.clone().map_or(Value::Null, Value::Text)
    }

    /// Reads the persisted form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for anything but text or null.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Text(s) => Ok(Self::from_encoded(s.clone())),
            other => Err(CoreError::invalid_format(format!(
                "expected encrypted text, found {}",
                other.type_name()
            ))),
        }
    }
}

impl PartialEq for EncryptedString {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for EncryptedString {}

impl fmt::Debug for EncryptedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedString")
            .field("decoded", &self.decoded.as_ref().map(|_| "[REDACTED]"))
            .field("encoded", &self.encoded)
            .finish()
    }
}

impl From<EncryptedString> for Value {
    fn from(secret: EncryptedString) -> Self {
        secret.to_value()
    }
}

impl From<&EncryptedString> for Value {
    fn from(secret: &EncryptedString) -> Self {
        secret.to_value()
    }
}

/// A string persisted as a salted SHA-256 hash.
///
/// The plaintext is kept only until the value is dropped; `hash` and
/// `salt` are hex.
#[derive(Clone, Default)]
pub struct HashedString {
    decoded: Option<Zeroizing<String>>,
    hash: Option<String>,
    salt: Option<String>,
}

impl HashedString {
    /// Hashes `plain` with a fresh random salt.
    pub fn from_plain(plain: impl Into<String>) -> Self {
        let mut hashed = Self::default();
        hashed.set_decoded(plain);
        hashed
    }

    /// Wraps a persisted hash and salt.
    pub fn from_parts(hash: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            decoded: None,
            hash: Some(hash.into()),
            salt: Some(salt.into()),
        }
    }

    /// Replaces the plaintext and rehashes it under a new salt.
    pub fn set_decoded(&mut self, plain: impl Into<String>) {
        let plain = Zeroizing::new(plain.into());
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        self.hash = Some(hex::encode(digest(&salt, plain.as_bytes())));
        self.salt = Some(hex::encode(salt));
        self.decoded = Some(plain);
    }

    /// The plaintext, if still held.
    pub fn decoded(&self) -> Option<&str> {
        self.decoded.as_deref().map(String::as_str)
    }

    /// The hex hash.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// The hex salt.
    pub fn salt(&self) -> Option<&str> {
        self.salt.as_deref()
    }

    /// Returns true if `candidate` hashes to the stored hash.
    pub fn verify(&self, candidate: &str) -> bool {
        let (Some(hash), Some(salt)) = (&self.hash, &self.salt) else {
            return false;
        };
        let (Ok(expected), Ok(salt)) = (hex::decode(hash), hex::decode(salt)) else {
            return false;
        };
        let actual = digest(&salt, candidate.as_bytes());
        expected.len() == actual.len()
            && expected
                .iter()
                .zip(actual.iter())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    /// Persisted form: `{hash, salt}`, or null.
    pub fn to_value(&self) -> Value {
        match (&self.hash, &self.salt) {
            (Some(hash), Some(salt)) => Value::Map(BTreeMap::from([
                ("hash".to_string(), Value::Text(hash.clone())),
                ("salt".to_string(), Value::Text(salt.clone())),
            ])),
            _ => Value::Null,
        }
    }

    /// Reads the persisted form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` unless the value is null or a map with text
    /// `hash` and `salt`.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Map(map) => match (map.get("hash"), map.get("salt")) {
                (Some(Value::Text(hash)), Some(Value::Text(salt))) => {
                    Ok(Self::from_parts(hash.clone(), salt.clone()))
                }
                _ => Err(CoreError::invalid_format("hashed value needs hash and salt")),
            },
            other => Err(CoreError::invalid_format(format!(
                "expected hashed value, found {}",
                other.type_name()
            ))),
        }
    }
}

fn digest(salt: &[u8], plain: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(plain);
    hasher.finalize().into()
}

impl PartialEq for HashedString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.salt == other.salt
    }
}

impl Eq for HashedString {}

impl fmt::Debug for HashedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedString")
            .field("decoded", &self.decoded.as_ref().map(|_| "[REDACTED]"))
            .field("hash", &self.hash)
            .field("salt", &self.salt)
            .finish()
    }
}

impl From<HashedString> for Value {
    fn from(secret: HashedString) -> Self {
        secret.to_value()
    }
}

impl From<&HashedString> for Value {
    fn from(secret: &HashedString) -> Self {
        secret.to_value()
    }
}
