//! AES-CBC encrypt/decrypt helpers exposed as Lua globals (spec §4.A).
//!
//! Hex in, hex out. Key sizes 16/24/32 bytes (AES-128/192/256); IV
//! exactly 16 bytes; data length a multiple of the 16-byte block size.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// `aes_encrypt(keyHex, ivHex, dataHex) -> Result<hex, reason>`.
pub fn aes_encrypt(key_hex: &str, iv_hex: &str, data_hex: &str) -> Result<String, String> {
    let key = hex::decode(key_hex).map_err(|e| format!("invalid key hex: {e}"))?;
    let iv = hex::decode(iv_hex).map_err(|e| format!("invalid iv hex: {e}"))?;
    let mut data = hex::decode(data_hex).map_err(|e| format!("invalid data hex: {e}"))?;

    if iv.len() != 16 {
        return Err(format!("iv must be 16 bytes, got {}", iv.len()));
    }
    if data.len() % 16 != 0 {
        return Err(format!(
            "data length must be a multiple of 16, got {}",
            data.len()
        ));
    }

    let ciphertext_len = data.len();
    data.resize(ciphertext_len + 16, 0);

    let out = match key.len() {
        16 => Aes128CbcEnc::new(key.as_slice().into(), iv.as_slice().into())
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut data, ciphertext_len)
            .map_err(|e| format!("encrypt failed: {e}"))?
            .to_vec(),
        24 => Aes192CbcEnc::new(key.as_slice().into(), iv.as_slice().into())
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut data, ciphertext_len)
            .map_err(|e| format!("encrypt failed: {e}"))?
            .to_vec(),
        32 => Aes256CbcEnc::new(key.as_slice().into(), iv.as_slice().into())
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut data, ciphertext_len)
            .map_err(|e| format!("encrypt failed: {e}"))?
            .to_vec(),
        n => return Err(format!("key must be 16, 24, or 32 bytes, got {n}")),
    };

    Ok(hex::encode(out))
}

/// `aes_decrypt(keyHex, ivHex, dataHex) -> Result<hex, reason>`, the exact
/// inverse of [`aes_encrypt`].
pub fn aes_decrypt(key_hex: &str, iv_hex: &str, data_hex: &str) -> Result<String, String> {
    let key = hex::decode(key_hex).map_err(|e| format!("invalid key hex: {e}"))?;
    let iv = hex::decode(iv_hex).map_err(|e| format!("invalid iv hex: {e}"))?;
    let mut data = hex::decode(data_hex).map_err(|e| format!("invalid data hex: {e}"))?;

    if iv.len() != 16 {
        return Err(format!("iv must be 16 bytes, got {}", iv.len()));
    }
    if data.len() % 16 != 0 {
        return Err(format!(
            "data length must be a multiple of 16, got {}",
            data.len()
        ));
    }

    let out = match key.len() {
        16 => Aes128CbcDec::new(key.as_slice().into(), iv.as_slice().into())
            .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut data)
            .map_err(|e| format!("decrypt failed: {e}"))?
            .to_vec(),
        24 => Aes192CbcDec::new(key.as_slice().into(), iv.as_slice().into())
            .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut data)
            .map_err(|e| format!("decrypt failed: {e}"))?
            .to_vec(),
        32 => Aes256CbcDec::new(key.as_slice().into(), iv.as_slice().into())
            .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut data)
            .map_err(|e| format!("decrypt failed: {e}"))?
            .to_vec(),
        n => return Err(format!("key must be 16, 24, or 32 bytes, got {n}")),
    };

    Ok(hex::encode(out))
}
