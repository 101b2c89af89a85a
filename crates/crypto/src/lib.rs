//! # Apiseal 暗号処理
//!
//! エンベロープ署名とフィールド暗号化で使う外部協調者のインターフェースと、
//! その参照実装を提供する。コアは鍵の中身やアルゴリズムの詳細を知らず、
//! ここで定義するトレイト越しにバイト列を渡すだけである。
//!
//! ## 参照実装
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | 署名 | RSA PKCS#1 v1.5 (SHA-256 / SHA-384 / SHA-512) |
//! | フィールド暗号化 | AES-256-GCM |

mod field_cipher;
mod rsa_pkcs1;

pub use field_cipher::{aes_gcm_decrypt, aes_gcm_encrypt, AesGcmFieldCipher, SymmetricKey};
pub use rsa_pkcs1::{generate_rsa_keypair, RsaSignatureProvider, RsaSuite};

use apiseal_types::{PrivateKey, PublicKey, SignType};

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// 鍵のデコードに失敗（形式不一致・破損）
    #[error("鍵の読み込みに失敗しました: {0}")]
    InvalidKey(String),
    /// 秘密鍵を持たないプロバイダで署名しようとした
    #[error("署名用の秘密鍵がありません")]
    MissingPrivateKey,
    /// 署名生成エラー
    #[error("署名の生成に失敗しました: {0}")]
    SignError(String),
    /// 鍵生成エラー
    #[error("鍵の生成に失敗しました: {0}")]
    KeyGeneration(String),
    /// AES-GCM暗号化エラー
    #[error("AES-GCM暗号化に失敗しました")]
    EncryptError,
    /// AES-GCM復号エラー
    #[error("AES-GCM復号に失敗しました")]
    DecryptError,
}

/// 署名時のダイジェストアルゴリズム。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl From<SignType> for HashAlgorithm {
    fn from(sign_type: SignType) -> Self {
        match sign_type {
            SignType::Rs256 => HashAlgorithm::Sha256,
            SignType::Rs384 => HashAlgorithm::Sha384,
            SignType::Rs512 => HashAlgorithm::Sha512,
        }
    }
}

/// 任意のバイト列に対する署名・検証。
pub trait SignatureProvider: Send + Sync {
    /// `data` を `hash` でダイジェストして署名する。
    fn sign(&self, data: &[u8], hash: HashAlgorithm) -> Result<Vec<u8>, CryptoError>;

    /// 署名を検証する。署名が一致しない・形式が壊れている場合は `Ok(false)`。
    fn verify(&self, data: &[u8], signature: &[u8], hash: HashAlgorithm)
        -> Result<bool, CryptoError>;
}

/// 鍵素材から `SignatureProvider` を組み立てる。
///
/// サーバーはリクエストごとにパートナー公開鍵・プラットフォーム秘密鍵を
/// 取得するため、鍵ごとにプロバイダを作り直す。
pub trait SignatureSuite: Send + Sync {
    /// 署名用プロバイダ（秘密鍵）
    fn signer(&self, key: &PrivateKey) -> Result<Box<dyn SignatureProvider>, CryptoError>;

    /// 検証用プロバイダ（公開鍵）
    fn verifier(&self, key: &PublicKey) -> Result<Box<dyn SignatureProvider>, CryptoError>;
}

/// フィールド単位の暗号化・復号。
pub trait EncryptionProvider: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}
