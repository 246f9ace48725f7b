//! Ed25519 signature types and operations
//!
//! Wrappers hold exactly 32-byte keys and 64-byte signatures. Hex and
//! base64 helpers exist for API boundaries; the primitive always operates
//! on raw bytes.

use base64::Engine as _;
use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::errors::MirrorError;

/// Basic Ed25519 signature wrapper (bytes form for serialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519Signature(#[serde(with = "serde_bytes_64")] pub [u8; 64]);

impl Ed25519Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to fixed-size array.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0
    }

    /// Try to construct from a slice.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, MirrorError> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| MirrorError::crypto("Ed25519 signature must be exactly 64 bytes"))?;
        Ok(Self(arr))
    }

    /// Hex-encode the signature bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex.
    pub fn from_hex(s: &str) -> Result<Self, MirrorError> {
        Self::try_from_slice(&hex::decode(s)?)
    }

    /// Standard base64 encoding of the signature bytes.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decode from standard base64.
    pub fn from_base64(s: &str) -> Result<Self, MirrorError> {
        Self::try_from_slice(&base64::engine::general_purpose::STANDARD.decode(s)?)
    }
}

/// Basic Ed25519 signing key wrapper.
///
/// The inner bytes are zeroized on drop; the key is deliberately not
/// serializable so private material never rides along in stored records.
#[derive(Clone)]
pub struct Ed25519SigningKey(pub(crate) [u8; 32]);

impl Drop for Ed25519SigningKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Ed25519SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Ed25519SigningKey(..)")
    }
}

impl Ed25519SigningKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random signing key.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let key = ed25519_dalek::SigningKey::generate(&mut rng);
        Self(key.to_bytes())
    }

    /// Convert to fixed-size array.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, MirrorError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| MirrorError::crypto("Ed25519 signing key must be exactly 32 bytes"))?;
        Ok(Self(arr))
    }

    /// Decode from hex.
    pub fn from_hex(s: &str) -> Result<Self, MirrorError> {
        Self::try_from_slice(&hex::decode(s)?)
    }

    /// Hex-encode the private bytes. Callers own custody of the result.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn verifying_key(&self) -> Ed25519VerifyingKey {
        let key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        Ed25519VerifyingKey(key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        let sig = key.sign(message);
        Ed25519Signature(sig.to_bytes())
    }
}

/// Basic Ed25519 verifying key wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ed25519VerifyingKey(pub [u8; 32]);

impl Ed25519VerifyingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, MirrorError> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(|_| Ed25519VerifyingKey(bytes))
            .map_err(|e| MirrorError::crypto(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to fixed-size array.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, MirrorError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| MirrorError::crypto("invalid public key length"))?;
        Self::from_bytes(arr)
    }

    /// Hex-encode the key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex.
    pub fn from_hex(s: &str) -> Result<Self, MirrorError> {
        Self::try_from_slice(&hex::decode(s)?)
    }

    /// Standard base64 encoding of the key bytes.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decode from standard base64.
    pub fn from_base64(s: &str) -> Result<Self, MirrorError> {
        Self::try_from_slice(&base64::engine::general_purpose::STANDARD.decode(s)?)
    }

    /// Convenience verification helper.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), MirrorError> {
        if ed25519_verify(message, signature, self)? {
            Ok(())
        } else {
            Err(MirrorError::signature_invalid("signature verification failed"))
        }
    }
}

/// Verify an Ed25519 signature using dalek.
pub fn ed25519_verify(
    message: &[u8],
    signature: &Ed25519Signature,
    public_key: &Ed25519VerifyingKey,
) -> Result<bool, MirrorError> {
    let pk = ed25519_dalek::VerifyingKey::from_bytes(&public_key.0)
        .map_err(|e| MirrorError::crypto(e.to_string()))?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    Ok(pk.verify_strict(message, &sig).is_ok())
}

/// Serde support for 64-byte arrays (serde derives stop at 32).
mod serde_bytes_64 {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(&s).map_err(D::Error::custom)?;
        raw.try_into()
            .map_err(|_| D::Error::custom("expected 64 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lengths_rejected() {
        assert!(Ed25519Signature::try_from_slice(&[0u8; 63]).is_err());
        assert!(Ed25519SigningKey::try_from_slice(&[0u8; 31]).is_err());
        assert!(Ed25519VerifyingKey::try_from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn sign_verify_roundtrip() {
        let signing_key = Ed25519SigningKey::generate();
        let message = b"mirror-ed25519-test";
        let signature = signing_key.sign(message);
        let verifying_key = signing_key.verifying_key();

        assert!(ed25519_verify(message, &signature, &verifying_key).unwrap());
        verifying_key.verify(message, &signature).unwrap();
    }

    #[test]
    fn bit_flip_fails_verification() {
        let signing_key = Ed25519SigningKey::generate();
        let message = b"mirror-ed25519-test".to_vec();
        let signature = signing_key.sign(&message);
        let verifying_key = signing_key.verifying_key();

        let mut tampered_msg = message.clone();
        tampered_msg[0] ^= 0x01;
        assert!(!ed25519_verify(&tampered_msg, &signature, &verifying_key).unwrap());

        let mut tampered_sig = signature.to_bytes();
        tampered_sig[5] ^= 0x80;
        let tampered_sig = Ed25519Signature::from_bytes(tampered_sig);
        assert!(!ed25519_verify(&message, &tampered_sig, &verifying_key).unwrap());
    }

    #[test]
    fn hex_and_base64_boundaries() {
        let signing_key = Ed25519SigningKey::generate();
        let verifying_key = signing_key.verifying_key();
        let signature = signing_key.sign(b"boundary");

        let vk = Ed25519VerifyingKey::from_hex(&verifying_key.to_hex()).unwrap();
        assert_eq!(vk, verifying_key);
        let sig = Ed25519Signature::from_base64(&signature.to_base64()).unwrap();
        assert_eq!(sig, signature);
    }

    #[test]
    fn signature_serde_roundtrip() {
        let signature = Ed25519SigningKey::generate().sign(b"serde");
        let json = serde_json::to_string(&signature).unwrap();
        let decoded: Ed25519Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(signature, decoded);
    }
}
