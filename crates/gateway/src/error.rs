//! # Gateway エラー型
//!
//! パイプラインの各段階が返すエラーと、HTTPステータス・エラーコード・
//! 固定メッセージへの対応。内部の詳細はログにのみ出し、レスポンスには載せない。

use axum::http::StatusCode;

use apiseal_types::ErrorBody;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// ボディの読み取り・パースに失敗
    #[error("リクエストのパースに失敗: {0}")]
    Parse(String),
    /// `appId` または `apiKey` がない
    #[error("appIdまたはapiKeyがありません")]
    MissingAppIdOrApiKey,
    /// `sign` がない
    #[error("署名がありません")]
    MissingSignature,
    /// `timestamp` がない・不正・許容幅外
    #[error("タイムスタンプが不正: {0}")]
    InvalidTimestamp(String),
    /// 公開鍵の取得に失敗
    #[error("公開鍵の取得に失敗: {0}")]
    KeyLookup(String),
    /// 署名検証に失敗、または鍵の形式が不正
    #[error("署名の検証に失敗: {0}")]
    InvalidSignature(String),
    /// 権限なし
    #[error("APIの呼び出し権限がありません")]
    AuthorizationDenied,
    /// 権限確認中のエラー
    #[error("権限の確認に失敗: {0}")]
    AuthorizationFailure(String),
    /// `bizContent` がない
    #[error("bizContentがありません")]
    BizContentMissing,
    /// 未対応のHTTPメソッド
    #[error("未対応のHTTPメソッド: {0}")]
    UnsupportedMethod(String),
    /// ハンドラまたはレスポンス署名の失敗
    #[error("下流処理に失敗: {0}")]
    Downstream(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Parse(_)
            | GatewayError::MissingAppIdOrApiKey
            | GatewayError::MissingSignature
            | GatewayError::InvalidTimestamp(_)
            | GatewayError::BizContentMissing
            | GatewayError::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
            GatewayError::KeyLookup(_) | GatewayError::InvalidSignature(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::AuthorizationDenied | GatewayError::AuthorizationFailure(_) => {
                StatusCode::FORBIDDEN
            }
            GatewayError::Downstream(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 機械判定用の安定したコード
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Parse(_) => "PARSE_ERROR",
            GatewayError::MissingAppIdOrApiKey => "MISSING_APP_ID_OR_API_KEY",
            GatewayError::MissingSignature => "MISSING_SIGNATURE",
            GatewayError::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            GatewayError::KeyLookup(_) => "KEY_LOOKUP_FAILED",
            GatewayError::InvalidSignature(_) => "INVALID_SIGNATURE",
            GatewayError::AuthorizationDenied => "AUTHORIZATION_DENIED",
            GatewayError::AuthorizationFailure(_) => "AUTHORIZATION_FAILED",
            GatewayError::BizContentMissing => "BIZ_CONTENT_MISSING",
            GatewayError::UnsupportedMethod(_) => "UNSUPPORTED_METHOD",
            GatewayError::Downstream(_) => "DOWNSTREAM_FAILURE",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 利用者向けの固定メッセージ。内部の詳細は含めない。
    pub fn message(&self) -> &'static str {
        match self {
            GatewayError::Parse(_) => "リクエストの形式が不正です",
            GatewayError::MissingAppIdOrApiKey => "appIdまたはapiKeyがありません",
            GatewayError::MissingSignature => "署名がありません (missing signature)",
            GatewayError::InvalidTimestamp(_) => "タイムスタンプが不正、または有効期間外です",
            GatewayError::KeyLookup(_) => "公開鍵を取得できません",
            GatewayError::InvalidSignature(_) => "署名の検証に失敗しました",
            GatewayError::AuthorizationDenied => "このAPIを呼び出す権限がありません",
            GatewayError::AuthorizationFailure(_) => "権限を確認できません",
            GatewayError::BizContentMissing => "bizContentがありません",
            GatewayError::UnsupportedMethod(_) => "未対応のHTTPメソッドです",
            GatewayError::Downstream(_) => "処理中にエラーが発生しました",
            GatewayError::Internal(_) => "内部エラーが発生しました",
        }
    }

    /// エラーエンベロープの `bizContent` に入れる本体
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.message().to_string(),
        }
    }
}

/// 署名なしのエラーエンベロープとして返す。
/// パイプライン外（エクストラクタ等）で発生したエラー用。
impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        crate::response::unsigned_error_response(&self)
    }
}
