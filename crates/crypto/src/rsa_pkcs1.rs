//! RSA PKCS#1 v1.5 署名プロバイダ
//!
//! 公開鍵は PKCS#1 または X.509 SubjectPublicKeyInfo のDER、
//! 秘密鍵は PKCS#1 または PKCS#8 のDERを受け付ける。

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};

use apiseal_types::{KeyFormat, PrivateKey, PublicKey};

use crate::{CryptoError, HashAlgorithm, SignatureProvider, SignatureSuite};

/// RSA鍵ペアを生成する（公開鍵: X.509 DER、秘密鍵: PKCS#8 DER）。
pub fn generate_rsa_keypair(bits: usize) -> Result<(PublicKey, PrivateKey), CryptoError> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let public_der = public_key
        .to_public_key_der()
        .map_err(|e| CryptoError::KeyGeneration(format!("公開鍵DERの出力に失敗: {e}")))?;
    let private_der = private_key
        .to_pkcs8_der()
        .map_err(|e| CryptoError::KeyGeneration(format!("秘密鍵DERの出力に失敗: {e}")))?;

    Ok((
        PublicKey::new(public_der.as_bytes().to_vec(), KeyFormat::X509),
        PrivateKey::new(private_der.as_bytes().to_vec(), KeyFormat::Pkcs8),
    ))
}

fn decode_public_key(key: &PublicKey) -> Result<RsaPublicKey, CryptoError> {
    match key.format() {
        KeyFormat::Pkcs1 => RsaPublicKey::from_pkcs1_der(key.bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("PKCS#1公開鍵: {e}"))),
        KeyFormat::X509 | KeyFormat::Pkcs8 => RsaPublicKey::from_public_key_der(key.bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("X.509公開鍵: {e}"))),
    }
}

fn decode_private_key(key: &PrivateKey) -> Result<RsaPrivateKey, CryptoError> {
    match key.format() {
        KeyFormat::Pkcs1 => RsaPrivateKey::from_pkcs1_der(key.bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("PKCS#1秘密鍵: {e}"))),
        KeyFormat::Pkcs8 => RsaPrivateKey::from_pkcs8_der(key.bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("PKCS#8秘密鍵: {e}"))),
        KeyFormat::X509 => Err(CryptoError::InvalidKey(
            "X.509形式は秘密鍵に使用できません".to_string(),
        )),
    }
}

/// RSA PKCS#1 v1.5 の `SignatureProvider`。
pub struct RsaSignatureProvider {
    private_key: Option<RsaPrivateKey>,
    public_key: RsaPublicKey,
}

impl RsaSignatureProvider {
    /// 署名・検証の両方ができるプロバイダ
    pub fn from_private_key(key: &PrivateKey) -> Result<Self, CryptoError> {
        let private_key = decode_private_key(key)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            private_key: Some(private_key),
            public_key,
        })
    }

    /// 検証専用プロバイダ
    pub fn from_public_key(key: &PublicKey) -> Result<Self, CryptoError> {
        Ok(Self {
            private_key: None,
            public_key: decode_public_key(key)?,
        })
    }
}

fn to_signature_bytes(
    result: Result<Signature, rsa::signature::Error>,
) -> Result<Vec<u8>, CryptoError> {
    result
        .map(|sig| sig.to_vec())
        .map_err(|e| CryptoError::SignError(e.to_string()))
}

impl SignatureProvider for RsaSignatureProvider {
    fn sign(&self, data: &[u8], hash: HashAlgorithm) -> Result<Vec<u8>, CryptoError> {
        let key = self
            .private_key
            .as_ref()
            .ok_or(CryptoError::MissingPrivateKey)?;
        to_signature_bytes(match hash {
            HashAlgorithm::Sha256 => SigningKey::<Sha256>::new(key.clone()).try_sign(data),
            HashAlgorithm::Sha384 => SigningKey::<Sha384>::new(key.clone()).try_sign(data),
            HashAlgorithm::Sha512 => SigningKey::<Sha512>::new(key.clone()).try_sign(data),
        })
    }

    fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        hash: HashAlgorithm,
    ) -> Result<bool, CryptoError> {
        let Ok(signature) = Signature::try_from(signature) else {
            return Ok(false);
        };
        let key = self.public_key.clone();
        let result = match hash {
            HashAlgorithm::Sha256 => VerifyingKey::<Sha256>::new(key).verify(data, &signature),
            HashAlgorithm::Sha384 => VerifyingKey::<Sha384>::new(key).verify(data, &signature),
            HashAlgorithm::Sha512 => VerifyingKey::<Sha512>::new(key).verify(data, &signature),
        };
        Ok(result.is_ok())
    }
}

/// RSA鍵素材から署名・検証プロバイダを組み立てる `SignatureSuite`。
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaSuite;

impl SignatureSuite for RsaSuite {
    fn signer(&self, key: &PrivateKey) -> Result<Box<dyn SignatureProvider>, CryptoError> {
        Ok(Box::new(RsaSignatureProvider::from_private_key(key)?))
    }

    fn verifier(&self, key: &PublicKey) -> Result<Box<dyn SignatureProvider>, CryptoError> {
        Ok(Box::new(RsaSignatureProvider::from_public_key(key)?))
    }
}
