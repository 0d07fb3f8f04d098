//! AES-CBC helpers for the security handlers.

use crate::error::{PdfError, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;

fn cipher_error(msg: &str) -> PdfError {
    PdfError::EncryptionError(msg.into())
}

/// Decrypt data using AES-CBC with a 128 or 256 bit key.
///
/// No padding is removed; see [`unpad_aes`]. Trailing bytes that do not
/// fill a whole block are dropped.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != 16 {
        return Err(cipher_error("AES IV must be 16 bytes"));
    }
    let mut buf = data[..data.len() - data.len() % 16].to_vec();
    match key.len() {
        16 => {
            Aes128CbcDec::new(key.into(), iv.into())
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|_| cipher_error("AES-128 decrypt failed"))?;
        }
        32 => {
            Aes256CbcDec::new(key.into(), iv.into())
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|_| cipher_error("AES-256 decrypt failed"))?;
        }
        n => return Err(PdfError::EncryptionError(format!("bad AES key length {}", n))),
    }
    Ok(buf)
}

/// Encrypt data using AES-128-CBC without padding.
///
/// Data length must be a multiple of 16 bytes.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 16 || iv.len() != 16 {
        return Err(cipher_error("AES-128 key and IV must be 16 bytes"));
    }
    let mut buf = data.to_vec();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
        .map_err(|_| cipher_error("AES-128 encrypt needs whole blocks"))?;
    Ok(buf)
}

/// Remove PKCS#7 padding from AES-decrypted data.
///
/// Returns data unchanged if the padding is invalid.
pub fn unpad_aes(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > 16 || pad_len > data.len() {
        return data;
    }
    let start = data.len() - pad_len;
    if data[start..].iter().all(|&b| b == last) {
        &data[..start]
    } else {
        data
    }
}

/// Decrypt a PDF AES payload: 16-byte IV, ciphertext, PKCS#7 padding.
pub fn decrypt_with_iv(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 16 {
        return Ok(Vec::new());
    }
    let (iv, ciphertext) = data.split_at(16);
    let plain = aes_cbc_decrypt(key, iv, ciphertext)?;
    Ok(unpad_aes(&plain).to_vec())
}
