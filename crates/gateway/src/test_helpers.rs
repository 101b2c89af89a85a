//! # ミドルウェアテスト用共通ヘルパー

use std::sync::{Arc, OnceLock};

use axum::http::StatusCode;
use axum::response::Response;
use http_body_util::BodyExt;

use apiseal_core::{sign_envelope, verify_envelope};
use apiseal_crypto::{generate_rsa_keypair, RsaSuite, SignatureSuite};
use apiseal_types::{keys, Charset, Envelope, PrivateKey, PublicKey};

use crate::config::{GatewayConfig, GatewayState};
use crate::provider::MemoryResourceProvider;
use crate::routes::RoutePolicies;

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

/// `APP_ID`/`API_KEY` を全ルート許可で登録し、プラットフォーム鍵を設定したプロバイダ
pub fn test_provider() -> MemoryResourceProvider {
    let provider = MemoryResourceProvider::new().with_platform_key(platform_keys().1.clone());
    provider.register_partner(APP_ID, API_KEY, partner_keys().0.clone());
    provider.grant_all(API_KEY);
    provider
}

pub fn test_state(
    config: GatewayConfig,
    provider: MemoryResourceProvider,
    routes: RoutePolicies,
) -> Arc<GatewayState> {
    Arc::new(GatewayState {
        config,
        provider: Arc::new(provider),
        suite: Arc::new(RsaSuite),
        routes,
    })
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// 署名前のリクエストエンベロープ
pub fn request_envelope(biz_content: &str) -> Envelope {
    let mut env = Envelope::new();
    env.insert(keys::APP_ID, APP_ID);
    env.insert(keys::API_KEY, API_KEY);
    env.insert(keys::CHARSET, "utf-8");
    env.insert(keys::BIZ_CONTENT, biz_content);
    env.insert(keys::TIMESTAMP, now_ms());
    env
}

/// パートナー鍵で署名する。
pub fn sign(path: &str, envelope: &mut Envelope) {
    let signer = RsaSuite.signer(&partner_keys().1).unwrap();
    sign_envelope(path, envelope, signer.as_ref(), Charset::Utf8).unwrap();
}

pub fn signed_envelope(path: &str, biz_content: &str) -> Envelope {
    let mut env = request_envelope(biz_content);
    sign(path, &mut env);
    env
}

/// レスポンスのステータスとJSONボディ
pub async fn read_json(response: Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

/// レスポンスエンベロープがプラットフォーム鍵で正しく署名されているか
pub fn response_signature_is_valid(path: &str, body: &serde_json::Value) -> bool {
    let envelope = Envelope::from_json_object(body.clone()).unwrap();
    let verifier = RsaSuite.verifier(&platform_keys().0).unwrap();
    verify_envelope(path, &envelope, verifier.as_ref(), Charset::Utf8).is_ok()
}

/// レスポンスエンベロープの `bizContent` をJSONとして取り出す。
pub fn biz_content(body: &serde_json::Value) -> serde_json::Value {
    serde_json::from_str(body[keys::BIZ_CONTENT].as_str().unwrap()).unwrap()
}
