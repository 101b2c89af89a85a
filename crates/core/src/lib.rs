//! # Apiseal Core
//!
//! クライアントとサーバーがビット単位で一致させる必要のある処理を実装する。
//!
//! ## 構成
//! 1. `canonical`: エンベロープの正規化文字列の構築と署名・検証
//! 2. `codec`: リクエストボディ（JSON / フォーム）とエンベロープの相互変換
//! 3. `field_crypto`: マーク付きフィールドだけを暗号化・復号するオブジェクト走査

pub mod canonical;
pub mod codec;
pub mod field_crypto;

pub use canonical::{
    canonical_bytes, canonical_string, resolve_charset, resolve_sign_type, sign_envelope,
    verify_envelope,
};
pub use codec::{
    encode_form, parse_envelope, parse_form, unwrap_biz_content, EnvelopeForm,
    BIZ_CONTENT_WRAPPER_KEY,
};
pub use field_crypto::{Encryptable, EncryptableField, SelectiveFieldCrypto};

use apiseal_crypto::CryptoError;

/// Coreモジュールのエラー型
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// 未対応のメディアタイプ
    #[error("未対応のメディアタイプです: {0}")]
    UnsupportedMediaType(String),
    /// ボディのパースに失敗
    #[error("ボディのパースに失敗しました: {0}")]
    MalformedBody(String),
    /// 未対応の文字セット
    #[error("未対応の文字セットです: {0}")]
    UnsupportedCharset(String),
    /// 未知の署名方式
    #[error("未知の署名方式です: {0}")]
    UnknownSignType(String),
    /// `sign` がない、または空
    #[error("署名がありません")]
    MissingSignature,
    /// `sign` のBase64デコードに失敗
    #[error("署名の形式が不正です")]
    MalformedSignature,
    /// 署名が一致しない
    #[error("署名の検証に失敗しました")]
    InvalidSignature,
    /// 暗号化フィールドのデコードに失敗
    #[error("暗号化フィールドのデコードに失敗しました: {0}")]
    FieldDecode(String),
    /// 暗号プロバイダのエラー
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
