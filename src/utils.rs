use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{SecretsError, SecretsResult};

/// Generate random bytes of the specified length
///
/// The operating-system CSPRNG is the only randomness source used by this
/// crate. If it fails, generation fails hard rather than falling back to a
/// weaker generator.
pub fn random_bytes(length: usize) -> SecretsResult<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SecretsError::RandomGenerationError(e.to_string()))?;
    Ok(bytes)
}

/// Generate `length` random bytes and return them base64-encoded
/// (standard alphabet, padded).
pub fn random_base64(length: usize) -> SecretsResult<String> {
    let mut bytes = random_bytes(length)?;
    let encoded = base64::encode(&bytes);
    bytes.zeroize();
    Ok(encoded)
}

/// Generate `length` random bytes and return them as lowercase hex.
pub fn random_hex(length: usize) -> SecretsResult<String> {
    let mut bytes = random_bytes(length)?;
    let encoded = hex::encode(&bytes);
    bytes.zeroize();
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let bytes1 = random_bytes(32).unwrap();
        let bytes2 = random_bytes(32).unwrap();

        assert_eq!(bytes1.len(), 32);
        assert_eq!(bytes2.len(), 32);
        // Two random byte arrays should be different
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_random_base64_length() {
        // 48 input bytes encode to exactly 64 base64 characters
        let encoded = random_base64(48).unwrap();
        assert_eq!(encoded.len(), 64);
        assert!(base64::decode(&encoded).is_ok());
    }

    #[test]
    fn test_random_hex_length() {
        let encoded = random_hex(32).unwrap();
        assert_eq!(encoded.len(), 64);
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(encoded, encoded.to_lowercase());
    }

}
