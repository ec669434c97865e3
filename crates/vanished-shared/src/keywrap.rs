//! RSA-OAEP wrapping of room keys.
//!
//! Public keys travel as base64 of an SPKI PEM document so that they fit in
//! a single whitespace-free protocol token. Wrapped keys travel as base64 of
//! the raw OAEP ciphertext. The server only ever sees these encoded forms.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;

pub use rsa::{RsaPrivateKey as PrivateKey, RsaPublicKey as PublicKey};

pub fn generate_private_key(bits: usize) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

/// Parse a private key PEM, accepting both PKCS#8 (`PRIVATE KEY`) and
/// PKCS#1 (`RSA PRIVATE KEY`) blocks.
pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    if pem.contains("BEGIN RSA PRIVATE KEY") {
        return RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()));
    }
    if pem.contains("BEGIN PRIVATE KEY") {
        return RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()));
    }
    Err(CryptoError::InvalidPrivateKey(
        "unsupported PEM block type".to_string(),
    ))
}

pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, CryptoError> {
    let pem = std::fs::read_to_string(path)?;
    parse_private_key_pem(&pem)
}

/// Encode a public key as base64(SPKI PEM), the handshake form.
pub fn encode_public_key(key: &RsaPublicKey) -> Result<String, CryptoError> {
    let pem = key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    Ok(STANDARD.encode(pem.as_bytes()))
}

pub fn decode_public_key(encoded: &str) -> Result<RsaPublicKey, CryptoError> {
    let pem_bytes = STANDARD.decode(encoded.trim())?;
    let pem = String::from_utf8(pem_bytes)
        .map_err(|_| CryptoError::InvalidPublicKey("PEM is not UTF-8".to_string()))?;
    RsaPublicKey::from_public_key_pem(&pem).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

pub fn wrap_key(data: &[u8], public_key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    public_key
        .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), data)
        .map_err(|_| CryptoError::EncryptionFailed)
}

pub fn unwrap_key(ciphertext: &[u8], private_key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    private_key
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Wrap `data` for the holder of `encoded_public_key` and return the base64
/// blob carried by `/sendKey`.
pub fn wrap_for_transport(data: &[u8], encoded_public_key: &str) -> Result<String, CryptoError> {
    let public_key = decode_public_key(encoded_public_key)?;
    Ok(STANDARD.encode(wrap_key(data, &public_key)?))
}

pub fn unwrap_from_transport(
    blob_b64: &str,
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let ciphertext = STANDARD.decode(blob_b64.trim())?;
    unwrap_key(&ciphertext, private_key)
}
