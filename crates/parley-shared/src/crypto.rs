use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::constants::{KDF_CONTEXT_PASSWORD, PASSWORD_HASH_SIZE, SALT_SIZE};
use crate::error::CryptoError;

pub type Salt = [u8; SALT_SIZE];

pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// BLAKE3 KDF with domain separation: H(context; salt || password)
pub fn hash_password(password: &str, salt: &[u8]) -> [u8; PASSWORD_HASH_SIZE] {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_PASSWORD);
    hasher.update(salt);
    hasher.update(password.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Stored credential for one account: per-user salt plus the salted hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub salt: Salt,
    pub hash: [u8; PASSWORD_HASH_SIZE],
}

impl PasswordHash {
    /// Hash `password` under a freshly generated salt.
    pub fn create(password: &str) -> Self {
        let salt = generate_salt();
        let hash = hash_password(password, &salt);
        Self { salt, hash }
    }

    /// Recompute the hash with the stored salt and compare in constant time.
    pub fn verify(&self, password: &str) -> bool {
        let candidate = hash_password(password, &self.salt);
        candidate.ct_eq(&self.hash).into()
    }

    pub fn salt_hex(&self) -> String {
        hex::encode(self.salt)
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn from_hex(salt_hex: &str, hash_hex: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            salt: decode_fixed(salt_hex)?,
            hash: decode_fixed(hash_hex)?,
        })
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], CryptoError> {
    let bytes = hex::decode(s)?;
    if bytes.len() != N {
        return Err(CryptoError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}
