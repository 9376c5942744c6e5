use sha2::{Digest, Sha256};

/// File name for a cache key: hex SHA-256 plus `.json`.
pub fn entry_file_name(key: &str) -> String {
    let mut h = Sha256::new();
    h.update(key.as_bytes());
    format!("{}.json", hex::encode(h.finalize()))
}
