//! # Apiseal Client
//!
//! 業務ペイロードを署名付きエンベロープに包んでプラットフォームAPIを呼び出し、
//! 署名付きレスポンスを検証して型付きの結果に変換する。
//!
//! ```ignore
//! let client = EnvelopeClient::new(ClientConfig::new("https://api.example.com/", app_id, api_key))?
//!     .with_keys(&RsaSuite, &app_private_key, &platform_public_key)?;
//! let order: Order = client.post("/orders", &NewOrder { .. }).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;

#[cfg(test)]
pub(crate) mod test_helpers;
#[cfg(test)]
mod tests;

pub use client::EnvelopeClient;
pub use config::{ClientConfig, RequestFormat};
pub use error::ClientError;
