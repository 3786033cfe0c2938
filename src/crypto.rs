//! Secure envelope codec
//!
//! Every request and response body is `IV || AES-CBC(payload)` with PKCS#7
//! padding. The IV is one block of random bytes generated per message.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;

/// AES block size in bytes (also the IV length)
pub const BLOCK_SIZE: usize = 16;

/// Normalize a caller-supplied key.
///
/// Keys shorter than one block are zero-padded on the right to 16 bytes.
/// 16, 24 and 32 byte keys select AES-128/192/256; any other length is rejected.
fn normalize_key(key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key.len() {
        0..=BLOCK_SIZE => {
            let mut padded = key.to_vec();
            padded.resize(BLOCK_SIZE, 0);
            Ok(padded)
        }
        24 | 32 => Ok(key.to_vec()),
        len => Err(CryptoError::InvalidKeyLength(len)),
    }
}

fn cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let invalid = |_| CryptoError::InvalidKeyLength(key.len());
    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        _ => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    };
    Ok(ciphertext)
}

fn cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let invalid = |_| CryptoError::InvalidKeyLength(key.len());
    let plaintext = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        _ => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
    };
    plaintext.map_err(|_| CryptoError::BadPadding)
}

/// Check that `key` can be used for [`encrypt`]/[`decrypt`]
pub fn check_key(key: &[u8]) -> Result<(), CryptoError> {
    normalize_key(key).map(|_| ())
}

/// Encrypt `plaintext` into an envelope: random IV followed by the ciphertext
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = normalize_key(key)?;

    let mut iv = [0u8; BLOCK_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cbc_encrypt(&key, &iv, plaintext)?;

    let mut envelope = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Open an envelope produced by [`encrypt`]
pub fn decrypt(envelope: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = normalize_key(key)?;

    // IV plus at least one padded block
    if envelope.len() < 2 * BLOCK_SIZE {
        return Err(CryptoError::TooShort(envelope.len()));
    }
    let (iv, ciphertext) = envelope.split_at(BLOCK_SIZE);
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Misaligned(ciphertext.len()));
    }

    cbc_decrypt(&key, iv, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef";

    #[test]
    fn test_round_trip() {
        let plaintext = br#"{"code":"int main(){}","lan":"cpp"}"#;
        let envelope = encrypt(plaintext, KEY).unwrap();

        assert_eq!(envelope.len() % BLOCK_SIZE, 0);
        assert_eq!(decrypt(&envelope, KEY).unwrap(), plaintext);
    }

    #[test]
    fn test_round_trip_long_keys() {
        for key in [&[7u8; 24][..], &[9u8; 32][..]] {
            let envelope = encrypt(b"hello", key).unwrap();
            assert_eq!(decrypt(&envelope, key).unwrap(), b"hello");
        }
    }

    #[test]
    fn test_empty_plaintext() {
        let envelope = encrypt(b"", KEY).unwrap();

        // IV plus one full padding block
        assert_eq!(envelope.len(), 2 * BLOCK_SIZE);
        assert!(decrypt(&envelope, KEY).unwrap().is_empty());
    }

    #[test]
    fn test_short_key_is_zero_padded() {
        let envelope = encrypt(b"payload", b"secret").unwrap();
        let padded = b"secret\0\0\0\0\0\0\0\0\0\0";

        assert_eq!(decrypt(&envelope, padded).unwrap(), b"payload");
    }

    #[test]
    fn test_iv_is_random() {
        let a = encrypt(b"same", KEY).unwrap();
        let b = encrypt(b"same", KEY).unwrap();

        assert_ne!(a[..BLOCK_SIZE], b[..BLOCK_SIZE]);
    }

    #[test]
    fn test_invalid_key_length() {
        assert_eq!(
            encrypt(b"x", &[1u8; 20]).unwrap_err(),
            CryptoError::InvalidKeyLength(20)
        );
        assert_eq!(
            decrypt(&[0u8; 32], &[1u8; 33]).unwrap_err(),
            CryptoError::InvalidKeyLength(33)
        );
    }

    #[test]
    fn test_truncated_envelope() {
        assert_eq!(decrypt(&[0u8; 20], KEY).unwrap_err(), CryptoError::TooShort(20));

        let envelope = encrypt(b"some longer payload here", KEY).unwrap();
        let cut = &envelope[..envelope.len() - 3];
        assert!(matches!(
            decrypt(cut, KEY).unwrap_err(),
            CryptoError::Misaligned(_)
        ));
    }

    #[test]
    fn test_wrong_key_never_yields_plaintext() {
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        let envelope = encrypt(plaintext, KEY).unwrap();

        match decrypt(&envelope, b"fedcba9876543210") {
            Ok(garbage) => assert_ne!(garbage, plaintext),
            Err(e) => assert_eq!(e, CryptoError::BadPadding),
        }
    }

    #[test]
    fn test_corrupted_last_block_fails() {
        let plaintext = b"grading payload";
        let mut envelope = encrypt(plaintext, KEY).unwrap();
        let last = envelope.len() - 1;
        // The byte before the final block XORs straight into its padding
        envelope[last - BLOCK_SIZE] ^= 0xff;

        match decrypt(&envelope, KEY) {
            Ok(garbage) => assert_ne!(garbage, plaintext),
            Err(e) => assert_eq!(e, CryptoError::BadPadding),
        }
    }
}
