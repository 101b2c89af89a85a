//! # Apiseal Gateway（デモサーバー）
//!
//! ## API エンドポイント
//! - `POST /echo`: 署名必須。展開された `bizContent` と呼び出し元をそのまま返す
//! - `GET /health`: 署名不要
//!
//! ## 環境変数
//! - `APISEAL_BIND`: 待受アドレス（デフォルト `0.0.0.0:3000`）
//! - `APISEAL_PLATFORM_KEY`: プラットフォーム秘密鍵（PKCS#8 DERの16進数）
//! - `APISEAL_DEMO_APP_ID` / `APISEAL_DEMO_API_KEY` / `APISEAL_DEMO_PUBLIC_KEY`:
//!   デモ用パートナー（公開鍵はX.509 DERの16進数）
//! - その他は `GatewayConfig::from_env` を参照

use std::sync::Arc;

use axum::http::{header, HeaderMap, Method};
use axum::routing::{get, post};
use axum::Json;
use serde::Serialize;

use apiseal_core::parse_envelope;
use apiseal_crypto::{generate_rsa_keypair, RsaSuite};
use apiseal_gateway::{
    with_envelope_layer, CallerContext, GatewayConfig, GatewayError, GatewayState,
    MemoryResourceProvider, RoutePolicies,
};
use apiseal_types::{ContentTypeHeader, KeyFormat, PrivateKey, PublicKey};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /health
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// POST /echo: 展開済みのボディと呼び出し元を返す。
async fn handle_echo(
    caller: CallerContext,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let content_type = ContentTypeHeader::parse(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );
    let fields = parse_envelope(&body, &content_type)
        .map_err(|e| GatewayError::Parse(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "caller": caller.values,
        "received": fields.to_json(),
    })))
}

fn env_hex(name: &str) -> anyhow::Result<Option<Vec<u8>>> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(
            hex::decode(value.trim())
                .map_err(|e| anyhow::anyhow!("{name}は16進数である必要があります: {e}"))?,
        )),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env();
    tracing::info!(
        validate_timestamp = config.validate_timestamp,
        app_id_name = %config.app_id_name,
        response_mode = ?config.response_mode,
        sign_type = %config.default_sign_type,
        "Gateway設定を読み込みました"
    );

    // プラットフォーム秘密鍵
    let platform_key = match env_hex("APISEAL_PLATFORM_KEY")? {
        Some(bytes) => PrivateKey::new(bytes, KeyFormat::Pkcs8),
        None => {
            // 開発環境用: ランダムキーを生成
            tracing::warn!("APISEAL_PLATFORM_KEYが未設定です。ランダムキーを生成します（開発環境用）");
            let (public_key, private_key) = generate_rsa_keypair(2048)?;
            tracing::info!(
                platform_public_key = %hex::encode(public_key.bytes()),
                "プラットフォーム公開鍵（X.509 DER）"
            );
            private_key
        }
    };
    let provider = MemoryResourceProvider::new().with_platform_key(platform_key);

    // デモ用パートナー（オプション）
    let demo_app_id = std::env::var("APISEAL_DEMO_APP_ID").ok();
    let demo_api_key = std::env::var("APISEAL_DEMO_API_KEY").ok();
    let demo_public_key = env_hex("APISEAL_DEMO_PUBLIC_KEY")?;
    match (demo_app_id, demo_api_key, demo_public_key) {
        (Some(app_id), Some(api_key), Some(key)) => {
            provider.register_partner(&app_id, &api_key, PublicKey::new(key, KeyFormat::X509));
            provider.grant(&api_key, Method::POST, "/echo");
            tracing::info!(app_id = %app_id, "デモ用パートナーを登録しました");
        }
        (None, None, None) => {
            tracing::info!("デモ用パートナーは未登録です");
        }
        _ => anyhow::bail!(
            "APISEAL_DEMO_APP_ID / APISEAL_DEMO_API_KEY / APISEAL_DEMO_PUBLIC_KEY は全て指定する必要があります"
        ),
    }

    let state = Arc::new(GatewayState {
        config,
        provider: Arc::new(provider),
        suite: Arc::new(RsaSuite),
        routes: RoutePolicies::new()
            .require(Method::POST, "/echo")
            .exempt(Method::GET, "/health"),
    });

    let signed = axum::Router::new().route("/echo", post(handle_echo));
    let app = with_envelope_layer(signed, state).route("/health", get(handle_health));

    let addr = std::env::var("APISEAL_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    tracing::info!("Gatewayを {} で起動します", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
