#![forbid(unsafe_code)]

//! Block cipher algorithm implementations (AES-CBC, AES-GCM, 3DES-CBC).
//!
//! Ciphertext layout follows XML Encryption: the IV (or GCM nonce) is
//! prepended to the cipher text inside `CipherValue`.

use rand::RngCore;
use wssec_core::{algorithm, Error};

/// Trait for cipher algorithms.
pub trait CipherAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;
    fn key_size(&self) -> usize;
}

/// Create a cipher algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn CipherAlgorithm>, Error> {
    match uri {
        algorithm::AES128_CBC => Ok(Box::new(AesCbc { key_size: 16, uri: algorithm::AES128_CBC })),
        algorithm::AES192_CBC => Ok(Box::new(AesCbc { key_size: 24, uri: algorithm::AES192_CBC })),
        algorithm::AES256_CBC => Ok(Box::new(AesCbc { key_size: 32, uri: algorithm::AES256_CBC })),
        algorithm::AES128_GCM => Ok(Box::new(AesGcm { key_size: 16, uri: algorithm::AES128_GCM })),
        algorithm::AES192_GCM => Ok(Box::new(AesGcm { key_size: 24, uri: algorithm::AES192_GCM })),
        algorithm::AES256_GCM => Ok(Box::new(AesGcm { key_size: 32, uri: algorithm::AES256_GCM })),
        algorithm::TRIPLEDES_CBC => Ok(Box::new(TripleDesCbc)),
        _ => Err(Error::UnsupportedAlgorithm(format!("cipher: {uri}"))),
    }
}

/// Key length in bytes for a data-encryption algorithm URI.
pub fn key_length(uri: &str) -> Option<usize> {
    from_uri(uri).ok().map(|c| c.key_size())
}

fn check_key(expected: usize, key: &[u8]) -> Result<(), Error> {
    if key.len() != expected {
        return Err(Error::Key(format!(
            "expected {expected} byte key, got {}",
            key.len()
        )));
    }
    Ok(())
}

// ── CBC mode (AES and 3DES) ──────────────────────────────────────────

macro_rules! cbc_encrypt {
    ($cipher:ty, $key:expr, $plaintext:expr, $block:expr) => {{
        use cbc::cipher::{BlockEncryptMut, KeyIvInit};
        let mut iv = [0u8; $block];
        rand::thread_rng().fill_bytes(&mut iv);
        let mut buf = pkcs7_pad($plaintext, $block);
        let len = buf.len();
        cbc::Encryptor::<$cipher>::new_from_slices($key, &iv)
            .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, len)
            .map_err(|e| Error::Crypto(format!("CBC encrypt: {e}")))?;
        let mut out = iv.to_vec();
        out.extend_from_slice(&buf);
        out
    }};
}

macro_rules! cbc_decrypt {
    ($cipher:ty, $key:expr, $data:expr, $block:expr) => {{
        use cbc::cipher::{BlockDecryptMut, KeyIvInit};
        let data: &[u8] = $data;
        if data.len() < 2 * $block || data.len() % $block != 0 {
            return Err(Error::Decryption(format!(
                "CBC cipher text length {} is not a whole number of blocks",
                data.len()
            )));
        }
        let (iv, body) = data.split_at($block);
        let mut buf = body.to_vec();
        cbc::Decryptor::<$cipher>::new_from_slices($key, iv)
            .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?
            .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
            .map_err(|e| Error::Decryption(format!("CBC decrypt: {e}")))?;
        xmlenc_unpad(&buf, $block)?
    }};
}

struct AesCbc {
    key_size: usize,
    uri: &'static str,
}

impl CipherAlgorithm for AesCbc {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_size(&self) -> usize {
        self.key_size
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(self.key_size, key)?;
        Ok(match self.key_size {
            16 => cbc_encrypt!(aes::Aes128, key, plaintext, 16),
            24 => cbc_encrypt!(aes::Aes192, key, plaintext, 16),
            _ => cbc_encrypt!(aes::Aes256, key, plaintext, 16),
        })
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(self.key_size, key)?;
        Ok(match self.key_size {
            16 => cbc_decrypt!(aes::Aes128, key, data, 16),
            24 => cbc_decrypt!(aes::Aes192, key, data, 16),
            _ => cbc_decrypt!(aes::Aes256, key, data, 16),
        })
    }
}

struct TripleDesCbc;

impl CipherAlgorithm for TripleDesCbc {
    fn uri(&self) -> &'static str {
        algorithm::TRIPLEDES_CBC
    }

    fn key_size(&self) -> usize {
        24
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(24, key)?;
        Ok(cbc_encrypt!(des::TdesEde3, key, plaintext, 8))
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(24, key)?;
        Ok(cbc_decrypt!(des::TdesEde3, key, data, 8))
    }
}

// ── AES-GCM ──────────────────────────────────────────────────────────

const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

struct AesGcm {
    key_size: usize,
    uri: &'static str,
}

macro_rules! with_gcm {
    ($key_size:expr, $key:expr, |$cipher:ident| $body:expr) => {{
        use aes_gcm::{aead::consts::U12, KeyInit};
        match $key_size {
            16 => {
                let $cipher = aes_gcm::Aes128Gcm::new_from_slice($key)
                    .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?;
                $body
            }
            24 => {
                let $cipher = aes_gcm::AesGcm::<aes::Aes192, U12>::new_from_slice($key)
                    .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?;
                $body
            }
            _ => {
                let $cipher = aes_gcm::Aes256Gcm::new_from_slice($key)
                    .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?;
                $body
            }
        }
    }};
}

impl CipherAlgorithm for AesGcm {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_size(&self) -> usize {
        self.key_size
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        use aes_gcm::{aead::Aead, Nonce};
        check_key(self.key_size, key)?;
        let mut nonce = [0u8; GCM_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ct = with_gcm!(self.key_size, key, |cipher| cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| Error::Crypto(format!("AES-GCM encrypt: {e}")))?);
        let mut out = nonce.to_vec();
        out.extend_from_slice(&ct);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        use aes_gcm::{aead::Aead, Nonce};
        check_key(self.key_size, key)?;
        if data.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
            return Err(Error::Decryption("AES-GCM cipher text too short".into()));
        }
        let (nonce, ct_and_tag) = data.split_at(GCM_NONCE_LEN);
        let pt = with_gcm!(self.key_size, key, |cipher| cipher
            .decrypt(Nonce::from_slice(nonce), ct_and_tag)
            .map_err(|_| Error::Decryption("AES-GCM authentication failed".into()))?);
        Ok(pt)
    }
}

// ── Padding ──────────────────────────────────────────────────────────

fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad_len = block_size - (data.len() % block_size);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    padded
}

/// Remove XML Encryption block padding.
///
/// Only the last byte is significant; it holds the padding length. This
/// accepts both PKCS#7 filler and the random filler of ISO 10126.
fn xmlenc_unpad(data: &[u8], block_size: usize) -> Result<Vec<u8>, Error> {
    let Some(&pad_byte) = data.last() else {
        return Ok(Vec::new());
    };
    let pad_len = pad_byte as usize;
    if pad_len == 0 || pad_len > block_size || pad_len > data.len() {
        return Err(Error::Decryption("invalid block padding".into()));
    }
    Ok(data[..data.len() - pad_len].to_vec())
}
