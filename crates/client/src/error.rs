//! # クライアントエラー型
//!
//! ローカルの失敗（URL不正・通信失敗・署名検証失敗・結果の欠落）と、
//! 検証済みレスポンスが伝えるサーバー側の業務エラー（`Remote`）を区別する。

/// クライアントエラー型
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// URLの解決に失敗
    #[error("URLが不正です: {0}")]
    InvalidUrl(String),
    /// HTTP通信に失敗
    #[error("HTTP通信に失敗: {0}")]
    Transport(String),
    /// レスポンスに署名がない
    #[error("レスポンスに署名がありません")]
    MissingSignature,
    /// レスポンスの署名検証に失敗
    #[error("レスポンスの署名検証に失敗: {0}")]
    InvalidSignature(String),
    /// レスポンスに `bizContent` がない
    #[error("レスポンスに結果がありません")]
    MissingResult,
    /// レスポンスの結果を解釈できない
    #[error("レスポンスの結果を解釈できません: {0}")]
    InvalidResult(String),
    /// 業務ペイロードのシリアライズに失敗
    #[error("シリアライズに失敗: {0}")]
    Serialization(String),
    /// リクエストの署名に失敗
    #[error("リクエストの署名に失敗: {0}")]
    Signing(String),
    /// サーバーが返した業務エラー
    #[error("サーバーエラー (HTTP {status}, {code}): {message}")]
    Remote {
        status: u16,
        code: String,
        message: String,
    },
}

impl ClientError {
    /// サーバーが業務エラーとして拒否したか
    pub fn is_remote(&self) -> bool {
        matches!(self, ClientError::Remote { .. })
    }
}
