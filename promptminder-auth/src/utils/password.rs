use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha512;
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 64;
const ITERATIONS: u32 = 10_000;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for a stored `salt:digest` password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn derive(password: &Password, salt: &[u8]) -> [u8; DIGEST_LEN] {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha512>(password.as_str().as_bytes(), salt, ITERATIONS, &mut digest);
    digest
}

/// Hash a password with PBKDF2-HMAC-SHA512 and a fresh random salt.
///
/// The result is `hex(salt):hex(digest)`.
pub fn hash_password(password: &Password) -> PasswordHashString {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let digest = derive(password, &salt);

    PasswordHashString::new(format!("{}:{}", hex::encode(salt), hex::encode(digest)))
}

/// Verify a password against a stored hash.
///
/// Malformed hashes never match. Digests are compared in constant time.
pub fn verify_password(password: &Password, password_hash: &PasswordHashString) -> bool {
    let Some((salt_hex, digest_hex)) = password_hash.as_str().split_once(':') else {
        return false;
    };

    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };

    if salt.is_empty() || expected.len() != DIGEST_LEN {
        return false;
    }

    let actual = derive(password, &salt);
    actual[..].ct_eq(&expected[..]).into()
}
