//! Symmetric encryption and digest helpers.
//!
//! Encryption uses AES-GCM. Any key length is accepted: keys are zero padded
//! (or truncated) to the nearest of 16, 24 or 32 bytes, which also selects
//! AES-128, AES-192 or AES-256. The random 96-bit nonce is prepended to the
//! ciphertext.

use std::fmt;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use md5::Md5;
use sha2::{Digest, Sha256};

type Aes192Gcm = AesGcm<aes::Aes192, U12>;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext shorter than the nonce.
    Truncated,
    /// Authentication failed or the key is wrong.
    Open,
    Seal,
    /// Token was not valid base64.
    Encoding,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::Truncated => write!(f, "ciphertext is shorter than the nonce"),
            CryptoError::Open => write!(f, "decryption failed"),
            CryptoError::Seal => write!(f, "encryption failed"),
            CryptoError::Encoding => write!(f, "token is not valid base64"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Resize `key` to 16, 24 or 32 bytes.
#[must_use]
pub fn resize_key(key: &[u8]) -> Vec<u8> {
    let size = match key.len() {
        0..=16 => 16,
        17..=24 => 24,
        _ => 32,
    };
    let mut out = key[..key.len().min(size)].to_vec();
    out.resize(size, 0);
    out
}

enum Cipher {
    A128(Aes128Gcm),
    A192(Aes192Gcm),
    A256(Aes256Gcm),
}

impl Cipher {
    fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let key = resize_key(key);
        let cipher = match key.len() {
            16 => Aes128Gcm::new_from_slice(&key).map(Cipher::A128),
            24 => Aes192Gcm::new_from_slice(&key).map(Cipher::A192),
            _ => Aes256Gcm::new_from_slice(&key).map(Cipher::A256),
        };
        cipher.map_err(|_| CryptoError::Seal)
    }

    fn seal(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Cipher::A128(c) => seal(c, plain),
            Cipher::A192(c) => seal(c, plain),
            Cipher::A256(c) => seal(c, plain),
        }
    }

    fn open(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Cipher::A128(c) => open(c, data),
            Cipher::A192(c) => open(c, data),
            Cipher::A256(c) => open(c, data),
        }
    }
}

fn seal<C: Aead + AeadCore<NonceSize = U12>>(cipher: &C, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = C::generate_nonce(&mut OsRng);
    let sealed = cipher.encrypt(&nonce, plain).map_err(|_| CryptoError::Seal)?;
    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn open<C: Aead + AeadCore<NonceSize = U12>>(cipher: &C, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::Truncated);
    }
    let (nonce, body) = data.split_at(NONCE_LEN);
    cipher
        .decrypt(GenericArray::from_slice(nonce), body)
        .map_err(|_| CryptoError::Open)
}

/// Encrypt `plain` with `key`.
pub fn encrypt(plain: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Cipher::new(key)?.seal(plain)
}

/// Inverse of [`encrypt`].
pub fn decrypt(data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Cipher::new(key)?.open(data)
}

/// Encrypts short tokens (session ids, CSRF values) with one configured key.
///
/// The cipher is built once at construction; instances are passed around
/// explicitly instead of living in a process-wide slot.
pub struct TokenCipher {
    cipher: Cipher,
}

impl TokenCipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            cipher: Cipher::new(key)?,
        })
    }

    /// Encrypt and encode as URL-safe base64.
    pub fn seal(&self, token: &str) -> Result<String, CryptoError> {
        Ok(URL_SAFE_NO_PAD.encode(self.cipher.seal(token.as_bytes())?))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let raw = URL_SAFE_NO_PAD
            .decode(sealed)
            .map_err(|_| CryptoError::Encoding)?;
        let plain = self.cipher.open(&raw)?;
        String::from_utf8(plain).map_err(|_| CryptoError::Encoding)
    }
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_for_every_key_size() {
        let plain = b"attack at dawn";
        for key in [&b""[..], b"short", b"exactly-sixteen!", b"twenty-four-bytes-key!!!", b"a much longer key that exceeds thirty two bytes"] {
            let sealed = encrypt(plain, key).unwrap();
            assert_ne!(&sealed[NONCE_LEN..], plain);
            assert_eq!(decrypt(&sealed, key).unwrap(), plain);
        }
    }

    #[test]
    fn test_resize_key() {
        assert_eq!(resize_key(b"abc").len(), 16);
        assert_eq!(resize_key(&[1u8; 20]).len(), 24);
        assert_eq!(resize_key(&[1u8; 40]).len(), 32);
        assert_eq!(&resize_key(b"abc")[..4], b"abc\0");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(b"secret", b"key-one").unwrap();
        assert_eq!(decrypt(&sealed, b"key-two"), Err(CryptoError::Open));
        assert_eq!(decrypt(&sealed[..4], b"key-one"), Err(CryptoError::Truncated));
    }

    #[test]
    fn test_token_cipher() {
        let tokens = TokenCipher::new(b"session-key").unwrap();
        let sealed = tokens.seal("user:42").unwrap();
        assert_eq!(tokens.open(&sealed).unwrap(), "user:42");
        assert_eq!(tokens.open("!!"), Err(CryptoError::Encoding));
    }

    #[test]
    fn test_digests() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
