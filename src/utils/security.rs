//! Secret comparison for the upload/admin gate

use sha2::{Digest, Sha256};

/// Compares two secrets in constant time.
///
/// Both sides are hashed first so the comparison never branches on the
/// position of the first differing byte of the real secret.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());

    let mut diff = 0u8;
    for (x, y) in da.iter().zip(db.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_equal_secrets() {
        assert!(constant_time_eq("s3cret", "s3cret"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn rejects_mismatches() {
        assert!(!constant_time_eq("s3cret", "s3cret "));
        assert!(!constant_time_eq("a", "b"));
        assert!(!constant_time_eq("secret", ""));
    }
}
