//! # 呼び出し元コンテキスト
//!
//! 署名検証を通過した呼び出し元の識別情報。ミドルウェアがリクエスト拡張に
//! 設定し、ハンドラは `CallerContext` をエクストラクタとして受け取る。

use std::collections::BTreeMap;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::GatewayError;

/// 検証済みの呼び出し元。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub app_id: String,
    pub api_key: String,
    /// 設定された名前（`app_id_name`）をキーにした公開値
    pub values: BTreeMap<String, String>,
}

impl CallerContext {
    pub fn new(app_id_name: &str, app_id: &str, api_key: &str) -> Self {
        let mut values = BTreeMap::new();
        values.insert(app_id_name.to_string(), app_id.to_string());
        Self {
            app_id: app_id.to_string(),
            api_key: api_key.to_string(),
            values,
        }
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerContext {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerContext>()
            .cloned()
            .ok_or_else(|| GatewayError::Internal("呼び出し元コンテキストがありません".to_string()))
    }
}
