//! # クライアントテスト用共通ヘルパー

use std::sync::{Arc, OnceLock};

use axum::http::Method;
use axum::Router;

use apiseal_crypto::{generate_rsa_keypair, RsaSuite};
use apiseal_gateway::{with_envelope_layer, GatewayConfig, GatewayState, MemoryResourceProvider, RoutePolicies};
use apiseal_types::{PrivateKey, PublicKey};

use crate::{ClientConfig, EnvelopeClient};

pub const APP_ID: &str = "app-001";
pub const API_KEY: &str = "key-001";

/// パートナーアプリの鍵ペア（テストバイナリごとに1回だけ生成）
pub fn partner_keys() -> &'static (PublicKey, PrivateKey) {
    static KEYS: OnceLock<(PublicKey, PrivateKey)> = OnceLock::new();
    KEYS.get_or_init(|| generate_rsa_keypair(1024).unwrap())
}

/// プラットフォームの鍵ペア
pub fn platform_keys() -> &'static (PublicKey, PrivateKey) {
    static KEYS: OnceLock<(PublicKey, PrivateKey)> = OnceLock::new();
    KEYS.get_or_init(|| generate_rsa_keypair(1024).unwrap())
}

/// 署名必須ルートを含むルーターにミドルウェアを適用し、テスト用Gatewayを起動する。
///
/// `APP_ID`/`API_KEY` は `permitted` のルートだけを呼び出せる。
pub async fn start_gateway(
    router: Router,
    routes: RoutePolicies,
    permitted: &[(Method, &str)],
) -> u16 {
    let provider = MemoryResourceProvider::new().with_platform_key(platform_keys().1.clone());
    provider.register_partner(APP_ID, API_KEY, partner_keys().0.clone());
    for (method, path) in permitted {
        provider.grant(API_KEY, method.clone(), path);
    }

    let state = Arc::new(GatewayState {
        config: GatewayConfig::default(),
        provider: Arc::new(provider),
        suite: Arc::new(RsaSuite),
        routes,
    });
    let app = with_envelope_layer(router, state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    port
}

pub fn client_config(port: u16) -> ClientConfig {
    ClientConfig::new(format!("http://127.0.0.1:{port}/"), APP_ID, API_KEY)
}

/// パートナー鍵とプラットフォーム公開鍵を設定したクライアント
pub fn signed_client(config: ClientConfig) -> EnvelopeClient {
    EnvelopeClient::new(config)
        .unwrap()
        .with_keys(&RsaSuite, &partner_keys().1, &platform_keys().0)
        .unwrap()
}
