//! # 正規化文字列と署名
//!
//! ## 正規化文字列
//! ```text
//! <path>?k1=v1&k2=v2&...
//! ```
//! - `sign` 自身と、null・空文字列の値は含めない
//! - キーは序数（バイト）順の昇順
//! - 署名対象キーが1つもない場合は `<path>?`
//!
//! バイト列へのエンコードにはエンベロープの `charset` を使い、
//! 省略時は呼び出し側が渡すデフォルト文字セットを使う。

use base64::Engine;

use apiseal_crypto::{HashAlgorithm, SignatureProvider};
use apiseal_types::{keys, Charset, Envelope, SignType};

use crate::CoreError;

/// Base64エンジン（Standard）
fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// 正規化文字列を構築する。
pub fn canonical_string(path: &str, envelope: &Envelope) -> String {
    // Envelopeはキー昇順で走査される
    let pairs: Vec<String> = envelope
        .iter()
        .filter(|(key, _)| key.as_str() != keys::SIGN)
        .filter_map(|(key, value)| value.canonical_text().map(|text| format!("{key}={text}")))
        .collect();

    let mut out = String::with_capacity(path.len() + 1 + pairs.iter().map(String::len).sum::<usize>());
    out.push_str(path);
    out.push('?');
    out.push_str(&pairs.join("&"));
    out
}

/// エンベロープが宣言する文字セットを解決する。未指定ならデフォルト。
pub fn resolve_charset(envelope: &Envelope, default: Charset) -> Result<Charset, CoreError> {
    match envelope.get_text(keys::CHARSET) {
        Some(label) if !label.trim().is_empty() => {
            Charset::from_label(&label).ok_or(CoreError::UnsupportedCharset(label))
        }
        _ => Ok(default),
    }
}

/// エンベロープが宣言する署名方式を解決する。未指定なら RS256。
pub fn resolve_sign_type(envelope: &Envelope) -> Result<SignType, CoreError> {
    match envelope.get_text(keys::SIGN_TYPE) {
        Some(label) if !label.trim().is_empty() => label
            .trim()
            .parse()
            .map_err(|_| CoreError::UnknownSignType(label)),
        _ => Ok(SignType::default()),
    }
}

/// 正規化文字列を文字セットでエンコードしたバイト列。
pub fn canonical_bytes(
    path: &str,
    envelope: &Envelope,
    default_charset: Charset,
) -> Result<Vec<u8>, CoreError> {
    let charset = resolve_charset(envelope, default_charset)?;
    Ok(charset.encode(&canonical_string(path, envelope)))
}

/// エンベロープに署名し、`sign` を設定する。既存の `sign` は上書きされる。
pub fn sign_envelope(
    path: &str,
    envelope: &mut Envelope,
    signer: &dyn SignatureProvider,
    default_charset: Charset,
) -> Result<(), CoreError> {
    let hash = HashAlgorithm::from(resolve_sign_type(envelope)?);
    let data = canonical_bytes(path, envelope, default_charset)?;
    let signature = signer.sign(&data, hash)?;
    envelope.insert(keys::SIGN, b64().encode(signature));
    Ok(())
}

/// 受信したエンベロープの署名を検証する。
pub fn verify_envelope(
    path: &str,
    envelope: &Envelope,
    verifier: &dyn SignatureProvider,
    default_charset: Charset,
) -> Result<(), CoreError> {
    let sign = envelope
        .get_text(keys::SIGN)
        .filter(|s| !s.trim().is_empty())
        .ok_or(CoreError::MissingSignature)?;
    let signature = b64()
        .decode(sign.trim())
        .map_err(|_| CoreError::MalformedSignature)?;

    let hash = HashAlgorithm::from(resolve_sign_type(envelope)?);
    let data = canonical_bytes(path, envelope, default_charset)?;

    if verifier.verify(&data, &signature, hash)? {
        Ok(())
    } else {
        Err(CoreError::InvalidSignature)
    }
}
