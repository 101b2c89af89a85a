//! インメモリのリソースプロバイダ。デモバイナリとテストで使う。

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use axum::http::Method;

use apiseal_types::{PrivateKey, PublicKey};

use super::{ProviderError, ResourceProvider};

#[derive(Debug, Default)]
struct Grants {
    /// 全ルート許可
    all: bool,
    routes: HashSet<(Method, String)>,
}

#[derive(Debug, Default)]
struct Registry {
    /// (appId, apiKey) → 公開鍵
    partners: HashMap<(String, String), PublicKey>,
    /// apiKey → 許可されたルート
    grants: HashMap<String, Grants>,
    platform_key: Option<PrivateKey>,
}

/// パートナー登録・権限・プラットフォーム鍵をメモリ上に保持する。
#[derive(Debug, Default)]
pub struct MemoryResourceProvider {
    registry: RwLock<Registry>,
}

impl MemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_platform_key(self, key: PrivateKey) -> Self {
        self.set_platform_key(key);
        self
    }

    pub fn set_platform_key(&self, key: PrivateKey) {
        self.write().platform_key = Some(key);
    }

    /// パートナーを登録する。同じ (appId, apiKey) は上書き。
    pub fn register_partner(&self, app_id: &str, api_key: &str, public_key: PublicKey) {
        self.write()
            .partners
            .insert((app_id.to_string(), api_key.to_string()), public_key);
    }

    /// `api_key` に `(method, path)` の呼び出しを許可する。
    pub fn grant(&self, api_key: &str, method: Method, path: &str) {
        self.write()
            .grants
            .entry(api_key.to_string())
            .or_default()
            .routes
            .insert((method, path.to_string()));
    }

    /// `api_key` に全ルートの呼び出しを許可する。
    pub fn grant_all(&self, api_key: &str) {
        self.write().grants.entry(api_key.to_string()).or_default().all = true;
    }

    pub fn revoke_all(&self, api_key: &str) {
        self.write().grants.remove(api_key);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        // 書き込み中にパニックする経路はないので、ポイズニング後も中身は整合している
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Registry>, ProviderError> {
        self.registry
            .read()
            .map_err(|e| ProviderError::Backend(format!("レジストリのロック取得に失敗: {e}")))
    }
}

#[async_trait::async_trait]
impl ResourceProvider for MemoryResourceProvider {
    async fn has_permission(
        &self,
        api_key: &str,
        path: &str,
        method: &Method,
    ) -> Result<bool, ProviderError> {
        let registry = self.read()?;
        Ok(registry.grants.get(api_key).is_some_and(|grants| {
            grants.all || grants.routes.contains(&(method.clone(), path.to_string()))
        }))
    }

    async fn get_app_public_key(
        &self,
        app_id: &str,
        api_key: &str,
    ) -> Result<PublicKey, ProviderError> {
        self.read()?
            .partners
            .get(&(app_id.to_string(), api_key.to_string()))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("パートナー appId={app_id}")))
    }

    async fn get_platform_private_key(&self) -> Result<PrivateKey, ProviderError> {
        self.read()?
            .platform_key
            .clone()
            .ok_or_else(|| ProviderError::NotFound("プラットフォーム秘密鍵".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use apiseal_types::KeyFormat;

    use super::*;

    #[tokio::test]
    async fn test_partner_lookup() {
        let provider = MemoryResourceProvider::new();
        let key = PublicKey::new(vec![1, 2, 3], KeyFormat::X509);
        provider.register_partner("app-1", "key-1", key.clone());

        assert_eq!(provider.get_app_public_key("app-1", "key-1").await.unwrap(), key);
        assert!(matches!(
            provider.get_app_public_key("app-1", "key-2").await,
            Err(ProviderError::NotFound(_))
        ));
        assert!(matches!(
            provider.get_app_public_key("app-2", "key-1").await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_permissions() {
        let provider = MemoryResourceProvider::new();
        provider.grant("key-1", Method::POST, "/orders");
        provider.grant_all("key-admin");

        assert!(provider.has_permission("key-1", "/orders", &Method::POST).await.unwrap());
        assert!(!provider.has_permission("key-1", "/orders", &Method::GET).await.unwrap());
        assert!(!provider.has_permission("key-1", "/refunds", &Method::POST).await.unwrap());
        assert!(!provider.has_permission("unknown", "/orders", &Method::POST).await.unwrap());
        assert!(provider.has_permission("key-admin", "/anything", &Method::DELETE).await.unwrap());

        provider.revoke_all("key-1");
        assert!(!provider.has_permission("key-1", "/orders", &Method::POST).await.unwrap());
    }

    #[tokio::test]
    async fn test_platform_key() {
        let provider = MemoryResourceProvider::new();
        assert!(provider.get_platform_private_key().await.is_err());

        let provider = provider.with_platform_key(PrivateKey::new(vec![9], KeyFormat::Pkcs8));
        assert_eq!(provider.get_platform_private_key().await.unwrap().bytes(), &[9]);
    }
}
