//! AES-256-GCM によるフィールド暗号化
//!
//! ## 暗号文レイアウト
//! ```text
//! [12B: nonce][ciphertext + 16B: tag]
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::{CryptoError, EncryptionProvider};

/// 対称鍵（AES-256用、32バイト）
pub type SymmetricKey = [u8; 32];

const NONCE_LEN: usize = 12;

/// AES-256-GCMによる暗号化。
pub fn aes_gcm_encrypt(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptError)?;
    let nonce = Nonce::from_slice(nonce);
    cipher.encrypt(nonce, plaintext).map_err(|_| CryptoError::EncryptError)
}

/// AES-256-GCMによる復号。
pub fn aes_gcm_decrypt(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptError)?;
    let nonce = Nonce::from_slice(nonce);
    cipher.decrypt(nonce, ciphertext).map_err(|_| CryptoError::DecryptError)
}

/// AES-256-GCMの `EncryptionProvider`。暗号化のたびにランダムなnonceを使う。
pub struct AesGcmFieldCipher {
    key: SymmetricKey,
}

impl AesGcmFieldCipher {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }
}

impl std::fmt::Debug for AesGcmFieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmFieldCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl EncryptionProvider for AesGcmFieldCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = aes_gcm_encrypt(&self.key, &nonce, plaintext)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CryptoError::DecryptError);
        }
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| CryptoError::DecryptError)?;
        aes_gcm_decrypt(&self.key, &nonce, body)
    }
}
