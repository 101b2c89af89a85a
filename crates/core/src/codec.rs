//! # エンベロープコーデック
//!
//! ## 受信方向
//! - `application/json`: JSONオブジェクトをそのままエンベロープにする
//! - `application/x-www-form-urlencoded`: `&` で分割し、最初の `=` でキーと値に分ける
//! - 空・空白のみのボディ（GET/DELETE）は空のエンベロープ
//!
//! ## 再注入方向
//! `bizContent` がJSONオブジェクトならトップレベルのキーを展開し、
//! それ以外は `bizContent` という単一キーで包む。

use apiseal_types::{keys, ContentTypeHeader, Envelope, EnvelopeValue};

use crate::CoreError;

/// スカラーの業務ペイロードを包むキー
pub const BIZ_CONTENT_WRAPPER_KEY: &str = keys::BIZ_CONTENT;

/// ボディ文字列をメディアタイプに従ってエンベロープに変換する。
pub fn parse_envelope(body: &str, content_type: &ContentTypeHeader) -> Result<Envelope, CoreError> {
    if body.trim().is_empty() {
        return Ok(Envelope::new());
    }

    if content_type.is_json() {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| CoreError::MalformedBody(format!("JSONのパースに失敗: {e}")))?;
        Envelope::from_json_object(value)
            .ok_or_else(|| CoreError::MalformedBody("JSONオブジェクトではありません".to_string()))
    } else if content_type.is_form() {
        Ok(parse_form(body))
    } else {
        Err(CoreError::UnsupportedMediaType(content_type.media_type.clone()))
    }
}

/// フォームエンコード文字列（またはクエリ文字列）をエンベロープに変換する。
///
/// 空白のみのセグメントは無視し、`=` のないセグメントは空文字列の値になる。
/// 同じキーが複数ある場合は後勝ち。
pub fn parse_form(input: &str) -> Envelope {
    let mut envelope = Envelope::new();
    for segment in input.split('&') {
        if segment.trim().is_empty() {
            continue;
        }
        // 1セグメントには '&' が含まれないため、最初の '=' で分割された1組だけが返る
        if let Some((key, value)) = url::form_urlencoded::parse(segment.as_bytes()).next() {
            envelope.insert(key.into_owned(), value.into_owned());
        }
    }
    envelope
}

/// フォーム・クエリに載せるテキスト表現。nullは載せない。
fn form_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// キーと値の組をフォームエンコード文字列にする。
pub fn encode_form<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a serde_json::Value)>,
{
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        if let Some(text) = form_text(value) {
            serializer.append_pair(key, &text);
        }
    }
    serializer.finish()
}

/// エンベロープをフォームエンコード文字列にする拡張。
pub trait EnvelopeForm {
    fn to_form(&self) -> String;
}

impl EnvelopeForm for Envelope {
    fn to_form(&self) -> String {
        let json: Vec<(&str, serde_json::Value)> = self
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_json()))
            .collect();
        encode_form(json.iter().map(|(k, v)| (*k, v)))
    }
}

/// `bizContent` を下流ハンドラに渡すフィールド集合へ展開する。
///
/// - JSONオブジェクト（文字列で末尾が `}`、またはネストしたオブジェクト）→ トップレベルのキー
/// - それ以外 → `{"bizContent": 値}`
pub fn unwrap_biz_content(
    biz_content: &EnvelopeValue,
) -> Result<serde_json::Map<String, serde_json::Value>, CoreError> {
    match biz_content {
        EnvelopeValue::Nested(serde_json::Value::Object(map)) => Ok(map.clone()),
        EnvelopeValue::String(text) if text.trim_end().ends_with('}') => {
            match serde_json::from_str::<serde_json::Value>(text) {
                Ok(serde_json::Value::Object(map)) => Ok(map),
                Ok(_) => Err(CoreError::MalformedBody(
                    "bizContentがJSONオブジェクトではありません".to_string(),
                )),
                Err(e) => Err(CoreError::MalformedBody(format!(
                    "bizContentのパースに失敗: {e}"
                ))),
            }
        }
        scalar => {
            let mut map = serde_json::Map::new();
            map.insert(BIZ_CONTENT_WRAPPER_KEY.to_string(), scalar.to_json());
            Ok(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use apiseal_types::{FORM_URLENCODED, APPLICATION_JSON};

    use super::*;

    fn content_type(media_type: &str) -> ContentTypeHeader {
        ContentTypeHeader::parse(Some(media_type))
    }

    #[test]
    fn test_parse_json_body() {
        let env = parse_envelope(
            r#"{"appId":"a1","timestamp":1700000000000,"bizContent":"{\"x\":1}"}"#,
            &content_type(APPLICATION_JSON),
        )
        .unwrap();
        assert_eq!(env.get_text("appId").as_deref(), Some("a1"));
        assert_eq!(env.get_text("timestamp").as_deref(), Some("1700000000000"));
        assert_eq!(env.get_text("bizContent").as_deref(), Some(r#"{"x":1}"#));
    }

    #[test]
    fn test_parse_json_rejects_non_object_and_garbage() {
        let ct = content_type(APPLICATION_JSON);
        assert!(matches!(
            parse_envelope("[1,2]", &ct),
            Err(CoreError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_envelope("{not json", &ct),
            Err(CoreError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_parse_form_body() {
        let env = parse_envelope(
            "appId=a1&&bizContent=%7B%22name%22%3A%22allen%22%7D&sign=ab%2Bc%3D%3D&flag&eq=a=b=c& &space=x+y",
            &content_type(FORM_URLENCODED),
        )
        .unwrap();

        assert_eq!(env.get_text("appId").as_deref(), Some("a1"));
        assert_eq!(env.get_text("bizContent").as_deref(), Some(r#"{"name":"allen"}"#));
        assert_eq!(env.get_text("sign").as_deref(), Some("ab+c=="));
        assert_eq!(env.get("flag"), Some(&EnvelopeValue::from("")));
        assert_eq!(env.get_text("eq").as_deref(), Some("a=b=c"));
        assert_eq!(env.get_text("space").as_deref(), Some("x y"));
        assert_eq!(env.len(), 6);
    }

    #[test]
    fn test_empty_body_is_empty_envelope() {
        for ct in ["application/json", "application/x-www-form-urlencoded", "text/plain"] {
            let env = parse_envelope("  \n", &content_type(ct)).unwrap();
            assert!(env.is_empty());
        }
    }

    #[test]
    fn test_unsupported_media_type() {
        assert!(matches!(
            parse_envelope("a=1", &content_type("text/plain")),
            Err(CoreError::UnsupportedMediaType(m)) if m == "text/plain"
        ));
    }

    #[test]
    fn test_envelope_to_form_roundtrips_through_parse() {
        let mut env = Envelope::new();
        env.insert("appId", "a&b");
        env.insert("sign", "ab+c==");
        env.insert("timestamp", 1700000000000u64);
        env.insert("none", EnvelopeValue::Null);

        let form = env.to_form();
        let parsed = parse_form(&form);
        assert_eq!(parsed.get_text("appId").as_deref(), Some("a&b"));
        assert_eq!(parsed.get_text("sign").as_deref(), Some("ab+c=="));
        assert_eq!(parsed.get_text("timestamp").as_deref(), Some("1700000000000"));
        assert!(!parsed.contains_key("none"));
    }

    #[test]
    fn test_unwrap_object_biz_content() {
        let fields = unwrap_biz_content(&EnvelopeValue::from(r#"{"name":"allen","age":3}"#)).unwrap();
        assert_eq!(fields.get("name"), Some(&serde_json::json!("allen")));
        assert_eq!(fields.get("age"), Some(&serde_json::json!(3)));

        let nested = EnvelopeValue::from(serde_json::json!({"id": 7}));
        let fields = unwrap_biz_content(&nested).unwrap();
        assert_eq!(fields.get("id"), Some(&serde_json::json!(7)));
    }

    #[test]
    fn test_unwrap_scalar_biz_content_is_wrapped() {
        assert_eq!(BIZ_CONTENT_WRAPPER_KEY, keys::BIZ_CONTENT);

        let fields = unwrap_biz_content(&EnvelopeValue::from("hello")).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get(BIZ_CONTENT_WRAPPER_KEY), Some(&serde_json::json!("hello")));

        let fields = unwrap_biz_content(&EnvelopeValue::from(42i64)).unwrap();
        assert_eq!(fields.get(BIZ_CONTENT_WRAPPER_KEY), Some(&serde_json::json!(42)));
    }

    #[test]
    fn test_unwrap_broken_object_biz_content() {
        assert!(matches!(
            unwrap_biz_content(&EnvelopeValue::from("{broken}")),
            Err(CoreError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_encode_form_renders_non_strings_as_json() {
        let fields = unwrap_biz_content(&EnvelopeValue::from(r#"{"name":"allen","tags":["a"],"n":1,"x":null}"#)).unwrap();
        let encoded = encode_form(fields.iter().map(|(k, v)| (k.as_str(), v)));
        let parsed = parse_form(&encoded);
        assert_eq!(parsed.get_text("name").as_deref(), Some("allen"));
        assert_eq!(parsed.get_text("tags").as_deref(), Some(r#"["a"]"#));
        assert_eq!(parsed.get_text("n").as_deref(), Some("1"));
        assert!(!parsed.contains_key("x"));
    }
}
