//! # クライアント設定

use std::time::Duration;

use apiseal_types::{Charset, SignType};

/// POST/PUTでエンベロープを送る形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestFormat {
    #[default]
    Json,
    Form,
}

/// クライアント設定。
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// プラットフォームのベースURL（例: `https://api.example.com/`）
    pub base_url: String,
    pub app_id: String,
    pub api_key: String,
    /// 正規化文字列とボディのエンコーディング
    pub charset: Charset,
    /// `timestamp` を付与するか
    pub include_timestamp: bool,
    /// 指定時のみ `signType` を送る（未指定ならサーバー側はRS256）
    pub sign_type: Option<SignType>,
    pub request_format: RequestFormat,
    /// HTTPリクエストのタイムアウト
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: app_id.into(),
            api_key: api_key.into(),
            charset: Charset::Utf8,
            include_timestamp: true,
            sign_type: None,
            request_format: RequestFormat::Json,
            timeout: Duration::from_secs(30),
        }
    }
}
