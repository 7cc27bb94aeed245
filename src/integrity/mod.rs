use sha3::{Digest, Sha3_256};

use crate::config;

/// SHA3-256 digest type.
pub type Sha3Digest = [u8; config::HASH_SIZE];

/// Compute SHA3-256 of a byte slice.
pub fn sha3_256(data: &[u8]) -> Sha3Digest {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Check `data` against an expected digest carried in the payload.
/// A digest of the wrong length never matches.
pub fn verify_sha3(data: &[u8], expected: &[u8]) -> bool {
    expected.len() == config::HASH_SIZE && sha3_256(data).as_slice() == expected
}

/// Lowercase hex rendering for log output.
pub fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha3_256_known_value() {
        let hash = sha3_256(b"");
        let expected = "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a";
        assert_eq!(to_hex(&hash), expected);
    }

    #[test]
    fn test_sha3_256_abc() {
        let hash = sha3_256(b"abc");
        let expected = "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532";
        assert_eq!(to_hex(&hash), expected);
    }

    #[test]
    fn test_verify_sha3() {
        let data = b"pixels";
        let digest = sha3_256(data);
        assert!(verify_sha3(data, &digest));
        assert!(!verify_sha3(b"pixelz", &digest));
        assert!(!verify_sha3(data, &digest[..31]));
    }
}
