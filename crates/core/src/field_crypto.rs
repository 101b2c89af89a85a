//! # 選択的フィールド暗号化
//!
//! 型ごとに [`Encryptable`] を実装し、暗号化対象のフィールドだけを
//! [`EncryptableField`] として列挙する。列挙されないフィールドは一切走査しない
//! （その内側に暗号化対象を持つオブジェクトがあっても辿らない）。
//!
//! ## 変換規則
//! - 文字列（空でない）: 暗号化 `base64(Encrypt(bytes))` / 復号 `string(Decrypt(base64_decode))`
//! - 空文字列: どちらの方向でも変更しない
//! - シーケンス: 要素ごとに同じ規則を適用
//! - 複合オブジェクト: そのオブジェクト自身が列挙するフィールドへ再帰

use std::sync::Arc;

use base64::Engine;

use apiseal_crypto::EncryptionProvider;
use apiseal_types::Charset;

use crate::CoreError;

/// Base64エンジン（Standard）
fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// 暗号化対象としてマークされたフィールドへの可変参照。
pub enum EncryptableField<'a> {
    /// 文字列の葉
    Leaf(&'a mut String),
    /// 要素ごとに変換するシーケンス
    Sequence(Vec<EncryptableField<'a>>),
    /// 自身のマークに従って再帰する入れ子オブジェクト
    Composite(&'a mut dyn Encryptable),
}

impl<'a> EncryptableField<'a> {
    /// 文字列のシーケンス
    pub fn strings(values: &'a mut [String]) -> Self {
        EncryptableField::Sequence(values.iter_mut().map(EncryptableField::Leaf).collect())
    }

    /// 入れ子オブジェクトのシーケンス
    pub fn composites<T: Encryptable + 'a>(values: &'a mut [T]) -> Self {
        EncryptableField::Sequence(
            values
                .iter_mut()
                .map(|v| EncryptableField::Composite(v as &mut dyn Encryptable))
                .collect(),
        )
    }

    /// 省略可能な文字列。`None` なら何もしない。
    pub fn optional(value: &'a mut Option<String>) -> Self {
        EncryptableField::Sequence(value.iter_mut().map(EncryptableField::Leaf).collect())
    }
}

/// 暗号化対象フィールドを列挙できる型。
pub trait Encryptable {
    /// マーク付きフィールドを返す。マークのないフィールドは含めない。
    fn encryptable_fields(&mut self) -> Vec<EncryptableField<'_>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// マーク付きフィールドだけを暗号化・復号する。
///
/// プロバイダが設定されていない場合、どちらの操作も何もしない。
#[derive(Clone, Default)]
pub struct SelectiveFieldCrypto {
    provider: Option<Arc<dyn EncryptionProvider>>,
    charset: Charset,
}

impl SelectiveFieldCrypto {
    pub fn new(provider: Arc<dyn EncryptionProvider>, charset: Charset) -> Self {
        Self {
            provider: Some(provider),
            charset,
        }
    }

    /// プロバイダなし（何もしない）
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// マーク付きフィールドを暗号化する。
    pub fn encrypt<T: Encryptable + ?Sized>(&self, root: &mut T) -> Result<(), CoreError> {
        self.run(root, Direction::Encrypt)
    }

    /// マーク付きフィールドを復号する。
    pub fn decrypt<T: Encryptable + ?Sized>(&self, root: &mut T) -> Result<(), CoreError> {
        self.run(root, Direction::Decrypt)
    }

    fn run<T: Encryptable + ?Sized>(&self, root: &mut T, direction: Direction) -> Result<(), CoreError> {
        let Some(provider) = self.provider.as_deref() else {
            return Ok(());
        };
        walk(provider, self.charset, root.encryptable_fields(), direction)
    }
}

fn walk(
    provider: &dyn EncryptionProvider,
    charset: Charset,
    fields: Vec<EncryptableField<'_>>,
    direction: Direction,
) -> Result<(), CoreError> {
    for field in fields {
        match field {
            EncryptableField::Leaf(value) => transform_leaf(provider, charset, value, direction)?,
            EncryptableField::Sequence(items) => walk(provider, charset, items, direction)?,
            EncryptableField::Composite(inner) => {
                walk(provider, charset, inner.encryptable_fields(), direction)?
            }
        }
    }
    Ok(())
}

fn transform_leaf(
    provider: &dyn EncryptionProvider,
    charset: Charset,
    value: &mut String,
    direction: Direction,
) -> Result<(), CoreError> {
    if value.is_empty() {
        return Ok(());
    }
    *value = match direction {
        Direction::Encrypt => b64().encode(provider.encrypt(&charset.encode(value))?),
        Direction::Decrypt => {
            let sealed = b64()
                .decode(value.as_bytes())
                .map_err(|e| CoreError::FieldDecode(format!("Base64デコードに失敗: {e}")))?;
            let plain = provider.decrypt(&sealed)?;
            charset
                .decode(&plain)
                .map_err(|e| CoreError::FieldDecode(format!("文字列への変換に失敗: {e}")))?
        }
    };
    Ok(())
}
