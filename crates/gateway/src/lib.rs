//! # Apiseal Gateway
//!
//! パートナーアプリから届く署名付きエンベロープを検証し、ハンドラの
//! レスポンスをプラットフォーム鍵で署名して返すaxumミドルウェア。
//!
//! ## 使い方
//! ```ignore
//! let app = Router::new().route("/orders", post(create_order));
//! let app = with_envelope_layer(app, state).route("/health", get(health));
//! ```
//!
//! ## HTTPステータス
//! - 400 パース・入力検証
//! - 401 公開鍵取得・署名検証
//! - 403 権限
//! - 500 内部エラー
//! - 200 成功

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod provider;
mod response;
pub mod routes;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use auth::{envelope_middleware, validate_timestamp, with_envelope_layer};
pub use config::{GatewayConfig, GatewayState, ResponseMode};
pub use context::CallerContext;
pub use error::GatewayError;
pub use provider::{MemoryResourceProvider, ProviderError, ResourceProvider};
pub use routes::RoutePolicies;
