//! # エンベロープ検証ミドルウェア
//!
//! 署名必須ルートに対して、以下を順に実行する。どの段階で失敗しても
//! エラーエンベロープを返してそこで打ち切る。
//!
//! 1. スキップ判定（ルートポリシー）
//! 2. エンベロープ読み取り（クエリ + ボディ、ボディ優先）
//! 3. `appId`/`apiKey`/`sign`/`timestamp` の確認
//! 4. 公開鍵の取得
//! 5. 署名検証
//! 6. 権限確認
//! 7. `bizContent` の展開と下流リクエストへの再注入
//! 8. ハンドラ呼び出し
//! 9. レスポンスの包装と署名（`ResponseMode::WrapAndSign` のみ）

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::http::request::Parts;
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderValue, Method, Uri};
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;

use apiseal_core::{encode_form, parse_envelope, parse_form, unwrap_biz_content, verify_envelope, CoreError};
use apiseal_types::{keys, Charset, ContentTypeHeader, Envelope, EnvelopeValue, APPLICATION_JSON, FORM_URLENCODED};

use crate::config::{GatewayConfig, GatewayState, ResponseMode};
use crate::context::CallerContext;
use crate::error::GatewayError;
use crate::response::{error_response, now_millis, wrap_response};

/// ルーターにエンベロープ検証ミドルウェアを適用する。
///
/// `route_layer` で適用するため、この呼び出しより前に登録したルートだけが対象になる。
pub fn with_envelope_layer<S>(router: Router<S>, state: Arc<GatewayState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(axum::middleware::from_fn_with_state(state, envelope_middleware))
}

/// エンベロープ検証ミドルウェア本体。
pub async fn envelope_middleware(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let template = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    if !state.routes.requires_signature(&method, &template) {
        return next.run(request).await;
    }

    let request = match verify_request(&state, request).await {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(
                method = %method,
                path = %path,
                code = err.code(),
                error = %err,
                "リクエストを拒否しました"
            );
            return error_response(&state, &path, &err).await;
        }
    };

    let response = next.run(request).await;

    match state.config.response_mode {
        ResponseMode::VerifyOnly => response,
        ResponseMode::WrapAndSign => wrap_response(&state, &path, response).await,
    }
}

/// 段階2〜7。検証済みで `bizContent` を再注入したリクエストを返す。
async fn verify_request(state: &GatewayState, request: Request) -> Result<Request, GatewayError> {
    let (mut parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let content_type = ContentTypeHeader::parse(
        parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );

    let envelope = read_envelope(&state.config, &parts, body, &content_type).await?;
    let (app_id, api_key) = check_credentials(&envelope, &state.config)?;

    let public_key = state
        .provider
        .get_app_public_key(&app_id, &api_key)
        .await
        .map_err(|e| GatewayError::KeyLookup(e.to_string()))?;

    let verifier = state
        .suite
        .verifier(&public_key)
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
    verify_envelope(&path, &envelope, verifier.as_ref(), state.config.default_charset).map_err(
        |e| match e {
            CoreError::MissingSignature => GatewayError::MissingSignature,
            other => GatewayError::InvalidSignature(other.to_string()),
        },
    )?;

    match state
        .provider
        .has_permission(&api_key, &path, &parts.method)
        .await
    {
        Ok(true) => {}
        Ok(false) => return Err(GatewayError::AuthorizationDenied),
        Err(e) => return Err(GatewayError::AuthorizationFailure(e.to_string())),
    }

    let biz_content = envelope
        .get(keys::BIZ_CONTENT)
        .filter(|v| !matches!(v, EnvelopeValue::Null))
        .ok_or(GatewayError::BizContentMissing)?;
    let fields = unwrap_biz_content(biz_content).map_err(|e| GatewayError::Parse(e.to_string()))?;
    let body = inject_payload(&mut parts, &content_type, fields)?;

    tracing::debug!(app_id = %app_id, path = %path, "署名を検証しました");
    parts
        .extensions
        .insert(CallerContext::new(&state.config.app_id_name, &app_id, &api_key));

    Ok(Request::from_parts(parts, body))
}

/// クエリとボディからエンベロープを組み立てる。同じキーはボディが優先。
async fn read_envelope(
    config: &GatewayConfig,
    parts: &Parts,
    body: Body,
    content_type: &ContentTypeHeader,
) -> Result<Envelope, GatewayError> {
    let bytes = axum::body::to_bytes(body, config.max_body_bytes)
        .await
        .map_err(|e| GatewayError::Parse(format!("ボディの読み取りに失敗: {e}")))?;
    let charset = Charset::from_label(&content_type.charset)
        .ok_or_else(|| GatewayError::Parse(format!("未対応の文字セット: {}", content_type.charset)))?;
    let text = charset
        .decode(&bytes)
        .map_err(|e| GatewayError::Parse(format!("ボディのデコードに失敗: {e}")))?;

    let mut envelope = parts.uri.query().map(parse_form).unwrap_or_default();
    let from_body =
        parse_envelope(&text, content_type).map_err(|e| GatewayError::Parse(e.to_string()))?;
    envelope.merge(from_body);
    Ok(envelope)
}

fn non_blank(envelope: &Envelope, key: &str) -> Option<String> {
    envelope.get_text(key).filter(|v| !v.trim().is_empty())
}

/// 段階3。`(appId, apiKey)` を返す。
fn check_credentials(
    envelope: &Envelope,
    config: &GatewayConfig,
) -> Result<(String, String), GatewayError> {
    let (Some(app_id), Some(api_key)) = (
        non_blank(envelope, keys::APP_ID),
        non_blank(envelope, keys::API_KEY),
    ) else {
        return Err(GatewayError::MissingAppIdOrApiKey);
    };

    if non_blank(envelope, keys::SIGN).is_none() {
        return Err(GatewayError::MissingSignature);
    }

    if config.validate_timestamp {
        validate_timestamp(
            envelope.get(keys::TIMESTAMP),
            now_millis()?,
            config.timestamp_tolerance,
        )?;
    }

    Ok((app_id, api_key))
}

/// `timestamp`（UNIXミリ秒、数値または数字列）が `now_ms` の前後 `tolerance` 以内か。
pub fn validate_timestamp(
    value: Option<&EnvelopeValue>,
    now_ms: u64,
    tolerance: Duration,
) -> Result<(), GatewayError> {
    let text = value
        .and_then(EnvelopeValue::canonical_text)
        .ok_or_else(|| GatewayError::InvalidTimestamp("timestampがありません".to_string()))?;
    let timestamp: i64 = text
        .trim()
        .parse()
        .map_err(|_| GatewayError::InvalidTimestamp(format!("数値ではありません: {text}")))?;

    let skew = (i128::from(now_ms) - i128::from(timestamp)).abs();
    if skew > tolerance.as_millis() as i128 {
        return Err(GatewayError::InvalidTimestamp(format!(
            "許容幅外です: {skew}ms"
        )));
    }
    Ok(())
}

/// 段階7。展開した `bizContent` を下流リクエストに注入し、新しいボディを返す。
///
/// - GET/DELETE: クエリ文字列を置き換える
/// - POST/PUT: 元がフォームならフォーム、それ以外はJSONボディ
fn inject_payload(
    parts: &mut Parts,
    content_type: &ContentTypeHeader,
    fields: serde_json::Map<String, serde_json::Value>,
) -> Result<Body, GatewayError> {
    let method = parts.method.clone();
    parts.headers.remove(header::CONTENT_LENGTH);

    if method == Method::GET || method == Method::DELETE {
        let query = encode_form(fields.iter().map(|(k, v)| (k.as_str(), v)));
        let path = parts.uri.path();
        let path_and_query = if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query}")
        };

        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.path_and_query = Some(
            PathAndQuery::try_from(path_and_query)
                .map_err(|e| GatewayError::Internal(format!("URIの再構築に失敗: {e}")))?,
        );
        parts.uri = Uri::from_parts(uri_parts)
            .map_err(|e| GatewayError::Internal(format!("URIの再構築に失敗: {e}")))?;
        Ok(Body::empty())
    } else if method == Method::POST || method == Method::PUT {
        let (body, media_type) = if content_type.is_form() {
            (
                encode_form(fields.iter().map(|(k, v)| (k.as_str(), v))),
                FORM_URLENCODED,
            )
        } else {
            (serde_json::Value::Object(fields).to_string(), APPLICATION_JSON)
        };
        parts
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(media_type));
        Ok(Body::from(body))
    } else {
        Err(GatewayError::UnsupportedMethod(method.to_string()))
    }
}
