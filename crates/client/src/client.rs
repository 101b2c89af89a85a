//! # エンベロープクライアント
//!
//! ## 送信
//! `{appId, apiKey, charset, bizContent, timestamp?, signType?}` を組み立て、
//! 追加キーをマージしてから署名する。
//! - GET/DELETE: エンベロープをクエリパラメータとして送る
//! - POST/PUT: `RequestFormat` に従いJSONまたはフォームのボディで送る
//!
//! ## 受信
//! 2xxは `parse_response_envelope`、それ以外は `parse_response_error` で処理する。
//! 鍵が設定されている場合、どちらもレスポンス署名を先に検証する。

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use apiseal_core::{sign_envelope, verify_envelope, CoreError, EnvelopeForm};
use apiseal_crypto::{SignatureProvider, SignatureSuite};
use apiseal_types::{
    keys, Envelope, EnvelopeValue, ErrorBody, PrivateKey, PublicKey, APPLICATION_JSON,
    FORM_URLENCODED,
};

use crate::config::{ClientConfig, RequestFormat};
use crate::error::ClientError;

/// リクエスト署名とレスポンス検証に使う鍵の組
struct EnvelopeKeys {
    /// パートナー秘密鍵
    signer: Box<dyn SignatureProvider>,
    /// プラットフォーム公開鍵
    verifier: Box<dyn SignatureProvider>,
}

/// 署名付きエンベロープでプラットフォームAPIを呼び出すクライアント。
pub struct EnvelopeClient {
    config: ClientConfig,
    http: reqwest::Client,
    keys: Option<EnvelopeKeys>,
}

impl EnvelopeClient {
    /// 鍵なしのクライアントを構築する。署名も検証も行わない。
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        url::Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("HTTPクライアントの構築に失敗: {e}")))?;
        Ok(Self {
            config,
            http,
            keys: None,
        })
    }

    /// パートナー秘密鍵とプラットフォーム公開鍵を設定する。
    pub fn with_keys(
        mut self,
        suite: &dyn SignatureSuite,
        app_private_key: &PrivateKey,
        platform_public_key: &PublicKey,
    ) -> Result<Self, ClientError> {
        let signer = suite
            .signer(app_private_key)
            .map_err(|e| ClientError::Signing(e.to_string()))?;
        let verifier = suite
            .verifier(platform_public_key)
            .map_err(|e| ClientError::InvalidSignature(e.to_string()))?;
        self.keys = Some(EnvelopeKeys { signer, verifier });
        Ok(self)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// ベースURLに対してパスを解決する。
    fn resolve(&self, path: &str) -> Result<url::Url, ClientError> {
        url::Url::parse(&self.config.base_url)
            .and_then(|base| base.join(path))
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    /// 送信するエンベロープを構築し、鍵があれば署名する。
    ///
    /// `biz_content` は文字列・数値・真偽値ならそのまま、それ以外はJSON文字列にする。
    /// `extra` は後勝ちでマージされる。
    pub fn generate_envelope<B>(
        &self,
        path: &str,
        biz_content: &B,
        extra: Envelope,
    ) -> Result<Envelope, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let value = serde_json::to_value(biz_content)
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        let biz_content = match value {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                EnvelopeValue::String(value.to_string())
            }
            scalar => EnvelopeValue::from(scalar),
        };

        let mut envelope = Envelope::new();
        envelope.insert(keys::APP_ID, self.config.app_id.as_str());
        envelope.insert(keys::API_KEY, self.config.api_key.as_str());
        envelope.insert(keys::CHARSET, self.config.charset.label());
        envelope.insert(keys::BIZ_CONTENT, biz_content);
        if self.config.include_timestamp {
            envelope.insert(keys::TIMESTAMP, now_millis()?);
        }
        if let Some(sign_type) = self.config.sign_type {
            envelope.insert(keys::SIGN_TYPE, sign_type.as_str());
        }
        envelope.merge(extra);

        if let Some(keys) = &self.keys {
            sign_envelope(path, &mut envelope, keys.signer.as_ref(), self.config.charset)
                .map_err(|e| ClientError::Signing(e.to_string()))?;
        }
        Ok(envelope)
    }

    pub async fn get<T, B>(&self, path: &str, biz_content: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        self.execute(Method::GET, path, biz_content, Envelope::new()).await
    }

    pub async fn post<T, B>(&self, path: &str, biz_content: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        self.execute(Method::POST, path, biz_content, Envelope::new()).await
    }

    pub async fn put<T, B>(&self, path: &str, biz_content: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        self.execute(Method::PUT, path, biz_content, Envelope::new()).await
    }

    pub async fn delete<T, B>(&self, path: &str, biz_content: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        self.execute(Method::DELETE, path, biz_content, Envelope::new()).await
    }

    /// 任意のメソッドで呼び出す。`extra` はエンベロープに追加するキー。
    pub async fn execute<T, B>(
        &self,
        method: Method,
        path: &str,
        biz_content: &B,
        extra: Envelope,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        let mut url = self.resolve(path)?;
        let sign_path = url.path().to_string();
        let envelope = self.generate_envelope(&sign_path, biz_content, extra)?;

        let request = if method == Method::GET || method == Method::DELETE {
            url.set_query(Some(&envelope.to_form()));
            self.http.request(method.clone(), url)
        } else {
            let (text, media_type) = match self.config.request_format {
                RequestFormat::Json => (envelope.to_json().to_string(), APPLICATION_JSON),
                RequestFormat::Form => (envelope.to_form(), FORM_URLENCODED),
            };
            self.http
                .request(method.clone(), url)
                .header(
                    CONTENT_TYPE,
                    format!("{media_type}; charset={}", self.config.charset.label()),
                )
                .body(self.config.charset.encode(&text))
        };

        tracing::debug!(method = %method, path = %sign_path, "エンベロープを送信します");
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let content = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("レスポンス読み取り失敗: {e}")))?;

        if status.is_success() {
            self.parse_response_envelope(&sign_path, &content)
        } else {
            tracing::debug!(status = status.as_u16(), path = %sign_path, "エラーレスポンスを受信しました");
            Err(self.parse_response_error(&sign_path, status.as_u16(), &content))
        }
    }

    /// 成功レスポンスを検証し、`bizContent` を `T` として取り出す。
    /// `bizContent` がnullなら `T::default()`。
    pub fn parse_response_envelope<T>(&self, path: &str, content: &str) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Default,
    {
        let envelope = self.read_envelope(path, content)?;
        match envelope.get(keys::BIZ_CONTENT) {
            None => Err(ClientError::MissingResult),
            Some(EnvelopeValue::Null) => Ok(T::default()),
            Some(value) => decode_result::<Option<T>>(value).map(Option::unwrap_or_default),
        }
    }

    /// エラーレスポンスを検証し、サーバーの業務エラーに変換する。
    /// 検証や解釈に失敗した場合はローカルのエラーを返す。
    pub fn parse_response_error(&self, path: &str, status: u16, content: &str) -> ClientError {
        let envelope = match self.read_envelope(path, content) {
            Ok(envelope) => envelope,
            Err(e) => return e,
        };
        let Some(value) = envelope
            .get(keys::BIZ_CONTENT)
            .filter(|v| !matches!(v, EnvelopeValue::Null))
        else {
            return ClientError::MissingResult;
        };
        match decode_result::<ErrorBody>(value) {
            Ok(body) => ClientError::Remote {
                status,
                code: body.code,
                message: body.message,
            },
            Err(e) => e,
        }
    }

    /// レスポンスボディをエンベロープとして読み、鍵があれば署名を検証する。
    fn read_envelope(&self, path: &str, content: &str) -> Result<Envelope, ClientError> {
        let envelope = if content.trim().is_empty() {
            Envelope::new()
        } else {
            serde_json::from_str::<serde_json::Value>(content)
                .ok()
                .and_then(Envelope::from_json_object)
                .ok_or_else(|| {
                    ClientError::InvalidResult("レスポンスがJSONオブジェクトではありません".to_string())
                })?
        };

        if let Some(keys) = &self.keys {
            if envelope.is_empty() {
                return Err(ClientError::MissingSignature);
            }
            verify_envelope(path, &envelope, keys.verifier.as_ref(), self.config.charset).map_err(
                |e| match e {
                    CoreError::MissingSignature => ClientError::MissingSignature,
                    other => ClientError::InvalidSignature(other.to_string()),
                },
            )?;
        }
        Ok(envelope)
    }
}

/// `bizContent` を `T` に変換する。
///
/// 文字列はまずJSONとして解釈し、失敗したら文字列そのものとして扱う。
fn decode_result<T: DeserializeOwned>(value: &EnvelopeValue) -> Result<T, ClientError> {
    let EnvelopeValue::String(text) = value else {
        return T::deserialize(value.to_json())
            .map_err(|e| ClientError::InvalidResult(e.to_string()));
    };

    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(text) {
        if let Ok(result) = T::deserialize(parsed) {
            return Ok(result);
        }
    }
    T::deserialize(serde_json::Value::String(text.clone()))
        .map_err(|e| ClientError::InvalidResult(e.to_string()))
}

fn now_millis() -> Result<u64, ClientError> {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| ClientError::Serialization(format!("時刻取得失敗: {e}")))?;
    u64::try_from(elapsed.as_millis())
        .map_err(|e| ClientError::Serialization(format!("時刻の変換に失敗: {e}")))
}
