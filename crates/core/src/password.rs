use rand::Rng;
use sha2::{Digest, Sha256};

/// Stored digest format: `salt$hex(sha256(salt:password))`.
pub fn hash_password(password: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    hash_password_with_salt(&salt, password)
}

pub fn hash_password_with_salt(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }

    format!("{salt}${hex}")
}

pub fn verify_password(stored_digest: &str, password: &str) -> bool {
    let Some((salt, _)) = stored_digest.split_once('$') else {
        return false;
    };
    hash_password_with_salt(salt, password) == stored_digest
}
