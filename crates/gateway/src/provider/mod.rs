//! # リソースプロバイダ
//!
//! パートナーの公開鍵、プラットフォームの秘密鍵、API呼び出し権限を提供する
//! 外部コラボレータの抽象インターフェース。
//! インメモリ実装は `memory` サブモジュールを参照。

pub mod memory;

pub use memory::MemoryResourceProvider;

use axum::http::Method;

use apiseal_types::{PrivateKey, PublicKey};

/// リソースプロバイダのエラー型
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// 該当するパートナー・鍵が存在しない
    #[error("見つかりません: {0}")]
    NotFound(String),
    /// バックエンド（DB等）の障害
    #[error("バックエンドエラー: {0}")]
    Backend(String),
}

/// リソースプロバイダの抽象インターフェース。
///
/// 運用者はDBや鍵管理サービスを実装として選択できる。
/// 呼び出しはリクエストごとに行われ、ミドルウェア側ではキャッシュしない。
#[async_trait::async_trait]
pub trait ResourceProvider: Send + Sync {
    /// `api_key` が `(path, method)` を呼び出せるか。
    async fn has_permission(
        &self,
        api_key: &str,
        path: &str,
        method: &Method,
    ) -> Result<bool, ProviderError>;

    /// パートナーアプリの公開鍵を取得する。
    async fn get_app_public_key(&self, app_id: &str, api_key: &str)
        -> Result<PublicKey, ProviderError>;

    /// レスポンス署名に使うプラットフォーム秘密鍵を取得する。
    async fn get_platform_private_key(&self) -> Result<PrivateKey, ProviderError>;
}
