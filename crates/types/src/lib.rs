//! # Apiseal 共有型定義
//!
//! プラットフォームとパートナーアプリ間でやり取りされる署名付きエンベロープの
//! データ構造をRust型として提供する。
//!
//! ## エンコーディング規則
//! - Base64: 署名値（`sign`）、暗号化済みフィールド
//! - JSON文字列: `bizContent`（業務ペイロードはJSONとしてシリアライズした文字列で格納）

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// エンベロープのキー名
// ---------------------------------------------------------------------------

/// エンベロープで予約されたキー名。大文字小文字を区別する。
pub mod keys {
    /// パートナーアプリID
    pub const APP_ID: &str = "appId";
    /// パートナーAPIキー
    pub const API_KEY: &str = "apiKey";
    /// 正規化文字列のエンコーディングに使う文字セット
    pub const CHARSET: &str = "charset";
    /// 業務ペイロード（JSON文字列）
    pub const BIZ_CONTENT: &str = "bizContent";
    /// UNIXミリ秒タイムスタンプ
    pub const TIMESTAMP: &str = "timestamp";
    /// 署名方式 (RS256 / RS384 / RS512)
    pub const SIGN_TYPE: &str = "signType";
    /// Base64エンコードされた署名
    pub const SIGN: &str = "sign";
}

// ---------------------------------------------------------------------------
// エンベロープ値
// ---------------------------------------------------------------------------

/// エンベロープに格納できる値。
///
/// JSONボディ由来の値はそのまま型を保持し、フォームやクエリ由来の値は常に
/// `String` になる。正規化文字列ではどちらも同じテキストに落ちる。
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// オブジェクトまたは配列
    Nested(serde_json::Value),
}

impl EnvelopeValue {
    /// 正規化文字列に使うテキスト表現を返す。
    /// nullと空文字列は署名対象外のため `None`。
    pub fn canonical_text(&self) -> Option<String> {
        match self {
            EnvelopeValue::Null => None,
            EnvelopeValue::String(s) if s.is_empty() => None,
            EnvelopeValue::String(s) => Some(s.clone()),
            EnvelopeValue::Bool(b) => Some(b.to_string()),
            EnvelopeValue::Number(n) => Some(n.to_string()),
            EnvelopeValue::Nested(v) => Some(v.to_string()),
        }
    }

    /// 文字列値であれば参照を返す。
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EnvelopeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// nullまたは空白のみの文字列か。
    pub fn is_blank(&self) -> bool {
        match self {
            EnvelopeValue::Null => true,
            EnvelopeValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// JSON値へ変換する。
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            EnvelopeValue::Null => serde_json::Value::Null,
            EnvelopeValue::Bool(b) => serde_json::Value::Bool(*b),
            EnvelopeValue::Number(n) => serde_json::Value::Number(n.clone()),
            EnvelopeValue::String(s) => serde_json::Value::String(s.clone()),
            EnvelopeValue::Nested(v) => v.clone(),
        }
    }
}

impl From<serde_json::Value> for EnvelopeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => EnvelopeValue::Null,
            serde_json::Value::Bool(b) => EnvelopeValue::Bool(b),
            serde_json::Value::Number(n) => EnvelopeValue::Number(n),
            serde_json::Value::String(s) => EnvelopeValue::String(s),
            nested => EnvelopeValue::Nested(nested),
        }
    }
}

impl From<String> for EnvelopeValue {
    fn from(value: String) -> Self {
        EnvelopeValue::String(value)
    }
}

impl From<&str> for EnvelopeValue {
    fn from(value: &str) -> Self {
        EnvelopeValue::String(value.to_string())
    }
}

impl From<i64> for EnvelopeValue {
    fn from(value: i64) -> Self {
        EnvelopeValue::Number(value.into())
    }
}

impl From<u64> for EnvelopeValue {
    fn from(value: u64) -> Self {
        EnvelopeValue::Number(value.into())
    }
}

impl From<bool> for EnvelopeValue {
    fn from(value: bool) -> Self {
        EnvelopeValue::Bool(value)
    }
}

impl Serialize for EnvelopeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EnvelopeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(EnvelopeValue::from)
    }
}

// ---------------------------------------------------------------------------
// エンベロープ
// ---------------------------------------------------------------------------

/// 署名付きエンベロープ。キーは序数順（バイト順）に保持される。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope {
    entries: BTreeMap<String, EnvelopeValue>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// 値を設定する。既存キーは上書きされる。
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<EnvelopeValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&EnvelopeValue> {
        self.entries.get(key)
    }

    /// 文字列値を取得する。文字列以外の値はテキスト表現で返す。
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.entries.get(key).and_then(EnvelopeValue::canonical_text)
    }

    pub fn remove(&mut self, key: &str) -> Option<EnvelopeValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// キー昇順で走査する。
    pub fn iter(&self) -> impl Iterator<Item = (&String, &EnvelopeValue)> {
        self.entries.iter()
    }

    /// 別のエンベロープを後勝ちでマージする。
    pub fn merge(&mut self, other: Envelope) {
        self.entries.extend(other.entries);
    }

    /// JSONオブジェクトから構築する。オブジェクト以外は `None`。
    pub fn from_json_object(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(Self {
                entries: map
                    .into_iter()
                    .map(|(k, v)| (k, EnvelopeValue::from(v)))
                    .collect(),
            }),
            _ => None,
        }
    }

    /// JSONオブジェクトへ変換する。
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, EnvelopeValue)> for Envelope {
    fn from_iter<I: IntoIterator<Item = (String, EnvelopeValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// 署名方式
// ---------------------------------------------------------------------------

/// エンベロープの `signType`。省略時は RS256。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SignType {
    #[default]
    Rs256,
    Rs384,
    Rs512,
}

impl SignType {
    /// ワイヤ上のラベル
    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::Rs256 => "RS256",
            SignType::Rs384 => "RS384",
            SignType::Rs512 => "RS512",
        }
    }
}

impl fmt::Display for SignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知の署名方式ラベル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSignType(pub String);

impl fmt::Display for UnknownSignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "未知の署名方式です: {}", self.0)
    }
}

impl std::error::Error for UnknownSignType {}

impl FromStr for SignType {
    type Err = UnknownSignType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(SignType::Rs256),
            "RS384" => Ok(SignType::Rs384),
            "RS512" => Ok(SignType::Rs512),
            other => Err(UnknownSignType(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// 文字セット
// ---------------------------------------------------------------------------

/// 正規化文字列・暗号化フィールドのエンコーディングに使う文字セット。
///
/// 1バイト文字セットで表現できない文字は `?` に置換する。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    /// ラベルから文字セットを解決する（大文字小文字は区別しない）。
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Charset::Latin1),
            "us-ascii" | "ascii" => Some(Charset::Ascii),
            _ => None,
        }
    }

    /// 正式ラベル
    pub fn label(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Latin1 => "iso-8859-1",
            Charset::Ascii => "us-ascii",
        }
    }

    /// 文字列をバイト列にエンコードする。
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Charset::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }

    /// バイト列を文字列にデコードする。UTF-8として不正な場合のみ失敗する。
    pub fn decode(&self, bytes: &[u8]) -> Result<String, std::string::FromUtf8Error> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec()),
            Charset::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Charset::Ascii => Ok(bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { '?' })
                .collect()),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Content-Type
// ---------------------------------------------------------------------------

/// JSONのメディアタイプ
pub const APPLICATION_JSON: &str = "application/json";
/// フォームエンコードのメディアタイプ
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// `Content-Type` ヘッダから取り出した (メディアタイプ, 文字セット)。
/// ヘッダがない、または壊れている場合は `application/json` / `utf-8`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeHeader {
    /// 小文字化済みメディアタイプ
    pub media_type: String,
    /// 文字セットラベル（未検証）
    pub charset: String,
}

impl Default for ContentTypeHeader {
    fn default() -> Self {
        Self {
            media_type: APPLICATION_JSON.to_string(),
            charset: Charset::Utf8.label().to_string(),
        }
    }
}

impl ContentTypeHeader {
    pub fn parse(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Self::default();
        };

        let mut parts = header.split(';');
        let media_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let well_formed = media_type
            .split_once('/')
            .is_some_and(|(ty, sub)| !ty.is_empty() && !sub.is_empty());
        if !well_formed {
            return Self::default();
        }

        let charset = parts
            .filter_map(|p| p.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| Charset::Utf8.label().to_string());

        Self { media_type, charset }
    }

    pub fn is_json(&self) -> bool {
        self.media_type == APPLICATION_JSON
    }

    pub fn is_form(&self) -> bool {
        self.media_type == FORM_URLENCODED
    }
}

// ---------------------------------------------------------------------------
// 鍵素材
// ---------------------------------------------------------------------------

/// 鍵のDERエンコード形式。署名・暗号プロバイダにそのまま渡される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFormat {
    Pkcs1,
    Pkcs8,
    /// X.509 SubjectPublicKeyInfo
    X509,
}

/// パートナーアプリの公開鍵。生成後は変更されない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    bytes: Vec<u8>,
    format: KeyFormat,
}

impl PublicKey {
    pub fn new(bytes: Vec<u8>, format: KeyFormat) -> Self {
        Self { bytes, format }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> KeyFormat {
        self.format
    }
}

/// プラットフォーム秘密鍵。`Debug` 出力では中身を伏せる。
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    bytes: Vec<u8>,
    format: KeyFormat,
}

impl PrivateKey {
    pub fn new(bytes: Vec<u8>, format: KeyFormat) -> Self {
        Self { bytes, format }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> KeyFormat {
        self.format
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bytes", &"[REDACTED]")
            .field("format", &self.format)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// エラーペイロード
// ---------------------------------------------------------------------------

/// エラーレスポンスの `bizContent` に入る業務エラー。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// 機械判定用コード（例: `MISSING_SIGNATURE`）
    #[serde(default)]
    pub code: String,
    /// 利用者向けメッセージ
    pub message: String,
}
