//! String and filename encryption
//!
//! A string is encrypted as a tiny untagged file (header with chunk size 0,
//! then CTR ciphertext) and base64 encoded. The nonce travels inside the
//! header, so decryption needs only the key.
//!
//! Filenames additionally swap `/` for `-` so the result is a valid path
//! segment on every filesystem we target.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sealfs_core::{SealError, SealResult};

use crate::integrity::Integrity;
use crate::nonce::Nonce;
use crate::stream::{decrypt_bytes, encrypt_bytes};
use crate::KEY_SIZE;

/// Encrypt `text` under `key` with a caller-supplied, never-reused nonce.
pub fn encrypt_string(key: &[u8; KEY_SIZE], nonce: Nonce, text: &str) -> SealResult<String> {
    let encrypted = encrypt_bytes(text.as_bytes(), key, nonce, Integrity::disabled())?;
    Ok(STANDARD.encode(encrypted))
}

pub fn decrypt_string(key: &[u8; KEY_SIZE], encoded: &str) -> SealResult<String> {
    let encrypted = STANDARD
        .decode(encoded)
        .map_err(|e| SealError::Format(format!("base64 decode: {e}")))?;
    let plain = decrypt_bytes(&encrypted, key, None)?;
    String::from_utf8(plain).map_err(|e| SealError::Format(format!("decrypted text is not UTF-8: {e}")))
}

/// Encrypt one path segment into a filesystem-safe real name.
pub fn encrypt_name(key: &[u8; KEY_SIZE], nonce: Nonce, name: &str) -> SealResult<String> {
    Ok(encrypt_string(key, nonce, name)?.replace('/', "-"))
}

/// Reverse of [`encrypt_name`].
pub fn decrypt_name(key: &[u8; KEY_SIZE], real_name: &str) -> SealResult<String> {
    decrypt_string(key, &real_name.replace('-', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [0x5A; KEY_SIZE];

    #[test]
    fn test_name_roundtrip() {
        let real = encrypt_name(&KEY, [0, 0, 0, 0, 0, 0, 0, 3], "report (final).pdf").unwrap();
        assert!(!real.contains('/'));
        assert_eq!(decrypt_name(&KEY, &real).unwrap(), "report (final).pdf");
    }

    #[test]
    fn test_same_name_different_nonce_differs() {
        let a = encrypt_name(&KEY, [0; 8], "a.txt").unwrap();
        let b = encrypt_name(&KEY, [1; 8], "a.txt").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_slash_substitution_survives() {
        // try nonces until the base64 output contains a '/'
        let name = "some longer file name with unicode ü.txt";
        let found = (0u64..512).find_map(|n| {
            let encoded = encrypt_string(&KEY, n.to_be_bytes(), name).unwrap();
            encoded.contains('/').then_some(n)
        });
        let n = found.expect("a nonce producing '/' in base64 output");
        let real = encrypt_name(&KEY, n.to_be_bytes(), name).unwrap();
        assert!(!real.contains('/'));
        assert_eq!(decrypt_name(&KEY, &real).unwrap(), name);
    }

    #[test]
    fn test_decrypt_garbage_is_format_error() {
        assert!(matches!(
            decrypt_name(&KEY, "not-an-encrypted-name"),
            Err(SealError::Format(_))
        ));
    }

    #[test]
    fn test_wrong_key_does_not_roundtrip() {
        let real = encrypt_name(&KEY, [0; 8], "secret.txt").unwrap();
        let other = [0x01; KEY_SIZE];
        match decrypt_name(&other, &real) {
            Ok(name) => assert_ne!(name, "secret.txt"),
            Err(e) => assert!(matches!(e, SealError::Format(_))),
        }
    }
}
