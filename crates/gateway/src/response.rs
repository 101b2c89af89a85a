//! # レスポンスの包装と署名
//!
//! ## レスポンスエンベロープ
//! ```text
//! { charset, bizContent: <JSON文字列>, timestamp, signType, sign }
//! ```
//! エラー時は `bizContent` に `{code, message}` を入れる。
//! プラットフォーム秘密鍵を取得できない場合、エラーエンベロープは署名なしで返す。

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use apiseal_core::sign_envelope;
use apiseal_types::{keys, Envelope, APPLICATION_JSON};

use crate::config::{GatewayConfig, GatewayState};
use crate::error::GatewayError;

/// 現在時刻（UNIXミリ秒）
pub(crate) fn now_millis() -> Result<u64, GatewayError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| GatewayError::Internal(format!("時刻取得失敗: {e}")))?;
    u64::try_from(elapsed.as_millis())
        .map_err(|e| GatewayError::Internal(format!("時刻の変換に失敗: {e}")))
}

/// 署名前のレスポンスエンベロープを構築する。
fn response_envelope(config: &GatewayConfig, biz_content: String) -> Envelope {
    let mut envelope = Envelope::new();
    envelope.insert(keys::CHARSET, config.default_charset.label());
    envelope.insert(keys::BIZ_CONTENT, biz_content);
    envelope.insert(keys::SIGN_TYPE, config.default_sign_type.as_str());
    // 時刻が取れない環境ではtimestampを省略する
    if let Ok(now) = now_millis() {
        envelope.insert(keys::TIMESTAMP, now);
    }
    envelope
}

/// プラットフォーム秘密鍵でレスポンスエンベロープに署名する。
async fn sign_response(
    state: &GatewayState,
    path: &str,
    envelope: &mut Envelope,
) -> Result<(), GatewayError> {
    let key = state
        .provider
        .get_platform_private_key()
        .await
        .map_err(|e| GatewayError::Downstream(format!("プラットフォーム秘密鍵の取得に失敗: {e}")))?;
    let signer = state
        .suite
        .signer(&key)
        .map_err(|e| GatewayError::Downstream(format!("署名プロバイダの構築に失敗: {e}")))?;
    sign_envelope(path, envelope, signer.as_ref(), state.config.default_charset)
        .map_err(|e| GatewayError::Downstream(format!("レスポンスの署名に失敗: {e}")))
}

fn envelope_response(status: StatusCode, envelope: &Envelope) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))],
        envelope.to_json().to_string(),
    )
        .into_response()
}

fn error_biz_content(err: &GatewayError) -> String {
    serde_json::to_string(&err.body()).unwrap_or_else(|e| {
        tracing::error!(code = err.code(), error = %e, "エラー本体のシリアライズに失敗しました");
        serde_json::Value::Null.to_string()
    })
}

/// エラーエンベロープを返す。署名できる場合は署名する。
pub(crate) async fn error_response(state: &GatewayState, path: &str, err: &GatewayError) -> Response {
    let mut envelope = response_envelope(&state.config, error_biz_content(err));
    if let Err(sign_err) = sign_response(state, path, &mut envelope).await {
        tracing::warn!(path = %path, error = %sign_err, "エラーエンベロープを署名なしで返します");
    }
    envelope_response(err.status(), &envelope)
}

/// 共有状態なしで返す署名なしのエラーエンベロープ。
pub(crate) fn unsigned_error_response(err: &GatewayError) -> Response {
    let envelope = response_envelope(&GatewayConfig::default(), error_biz_content(err));
    envelope_response(err.status(), &envelope)
}

/// ハンドラのレスポンスを包んで署名する。
///
/// ハンドラのステータスに関わらず200で返す。
/// 途中で失敗した場合は500のエラーエンベロープにフォールバックする。
pub(crate) async fn wrap_response(state: &GatewayState, path: &str, response: Response) -> Response {
    match try_wrap(state, path, response).await {
        Ok(wrapped) => wrapped,
        Err(err) => {
            tracing::error!(path = %path, error = %err, "レスポンスの包装に失敗しました");
            error_response(state, path, &err).await
        }
    }
}

async fn try_wrap(state: &GatewayState, path: &str, response: Response) -> Result<Response, GatewayError> {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| GatewayError::Downstream(format!("ハンドラ出力の読み取りに失敗: {e}")))?;

    let value: serde_json::Value = if bytes.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::Downstream(format!("ハンドラ出力がJSONではありません: {e}")))?
    };

    let mut envelope = response_envelope(&state.config, value.to_string());
    sign_response(state, path, &mut envelope).await?;

    let mut wrapped = envelope_response(StatusCode::OK, &envelope);
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            wrapped.headers_mut().append(name.clone(), value.clone());
        }
    }
    Ok(wrapped)
}
