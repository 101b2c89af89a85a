//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとミドルウェアが共有する状態の定義。

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use apiseal_crypto::SignatureSuite;
use apiseal_types::{Charset, SignType};

use crate::provider::ResourceProvider;
use crate::routes::RoutePolicies;

/// タイムスタンプの許容幅（前後10分）
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(10 * 60);

/// リクエストボディの最大サイズ（2 MiB）
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// ハンドラのレスポンスをどう返すか。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// エンベロープに包んで署名する
    #[default]
    WrapAndSign,
    /// 検証のみ行い、レスポンスはそのまま返す
    VerifyOnly,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wrap-and-sign" | "wrap_and_sign" | "wrap" => Ok(ResponseMode::WrapAndSign),
            "verify-only" | "verify_only" | "verify" => Ok(ResponseMode::VerifyOnly),
            other => Err(format!("不明なレスポンスモード: {other}")),
        }
    }
}

/// Gateway設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `timestamp` の検証を行うか
    pub validate_timestamp: bool,
    /// 検証済み `appId` をハンドラへ公開するときのキー名
    pub app_id_name: String,
    /// タイムスタンプの許容幅
    pub timestamp_tolerance: Duration,
    /// リクエストボディの最大サイズ（バイト）
    pub max_body_bytes: usize,
    pub response_mode: ResponseMode,
    /// レスポンス署名に使う署名方式
    pub default_sign_type: SignType,
    /// エンベロープが `charset` を宣言しない場合の文字セット
    pub default_charset: Charset,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            validate_timestamp: true,
            app_id_name: apiseal_types::keys::APP_ID.to_string(),
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            response_mode: ResponseMode::default(),
            default_sign_type: SignType::default(),
            default_charset: Charset::default(),
        }
    }
}

impl GatewayConfig {
    /// 環境変数から構築する。未設定・不正な値はデフォルトに戻す。
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の変数ソースから構築する。
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let validate_timestamp = parse_or(
            &lookup,
            "APISEAL_VALIDATE_TIMESTAMP",
            defaults.validate_timestamp,
            |v| match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(format!("真偽値ではありません: {other}")),
            },
        );
        let app_id_name = lookup("APISEAL_APP_ID_NAME")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.app_id_name);
        let max_body_bytes = parse_or(
            &lookup,
            "APISEAL_MAX_BODY_BYTES",
            defaults.max_body_bytes,
            |v| v.trim().parse::<usize>().map_err(|e| e.to_string()),
        );
        let response_mode = parse_or(
            &lookup,
            "APISEAL_RESPONSE_MODE",
            defaults.response_mode,
            ResponseMode::from_str,
        );
        let default_sign_type = parse_or(
            &lookup,
            "APISEAL_SIGN_TYPE",
            defaults.default_sign_type,
            |v| SignType::from_str(v.trim()).map_err(|e| e.to_string()),
        );

        Self {
            validate_timestamp,
            app_id_name,
            timestamp_tolerance: defaults.timestamp_tolerance,
            max_body_bytes,
            response_mode,
            default_sign_type,
            default_charset: defaults.default_charset,
        }
    }
}

fn parse_or<T, F, P>(lookup: &F, name: &str, default: T, parse: P) -> T
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, String>,
{
    match lookup(name) {
        None => default,
        Some(raw) => match parse(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(variable = name, error = %e, "環境変数が不正なためデフォルト値を使用します");
                default
            }
        },
    }
}

/// ミドルウェアの共有状態。リクエスト間で可変状態を持たない。
pub struct GatewayState {
    pub config: GatewayConfig,
    /// 公開鍵・秘密鍵・権限の提供元
    pub provider: Arc<dyn ResourceProvider>,
    /// 鍵素材から署名プロバイダを組み立てる
    pub suite: Arc<dyn SignatureSuite>,
    /// 署名必須ルートの表（起動時に構築）
    pub routes: RoutePolicies,
}
