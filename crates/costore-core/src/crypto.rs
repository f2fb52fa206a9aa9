//! Cryptographic primitives for costore.
//!
//! Wraps Blake3 hashing, Ed25519 signing and X25519 + ChaCha20-Poly1305
//! sealing with strong types, and exposes them through the
//! [`CryptoProvider`] trait so the rest of the workspace never touches the
//! algorithms directly.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CoreError;

/// Prefix of a signer id (an Ed25519 public key).
pub const SIGNER_PREFIX: &str = "signer_z";

/// Prefix of an encoded Ed25519 signature.
pub const SIGNATURE_PREFIX: &str = "signature_z";

/// Prefix of a sealer id (an X25519 public key).
pub const SEALER_PREFIX: &str = "sealer_z";

/// Decode `<prefix><hex>` into a fixed-size byte array.
pub(crate) fn decode_prefixed<const N: usize>(
    s: &str,
    prefix: &str,
    kind: &'static str,
) -> Result<[u8; N], CoreError> {
    let hex_part = s
        .strip_prefix(prefix)
        .ok_or_else(|| CoreError::invalid_id(kind, s))?;
    let bytes = hex::decode(hex_part).map_err(|_| CoreError::invalid_id(kind, s))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::invalid_id(kind, s))
}

/// A 32-byte Blake3 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..12])
    }
}

impl AsRef<[u8]> for Blake3Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Blake3Hash {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 32]>::try_from(slice).map(Self)
    }
}

/// A 32-byte Ed25519 public key. Rendered as `signer_z<hex>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check `signature` over `message` against this key.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CoreError::InvalidPublicKey)?
            .verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}..", SIGNER_PREFIX, &self.to_hex()[..12])
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SIGNER_PREFIX, self.to_hex())
    }
}

impl FromStr for Ed25519PublicKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed(s, SIGNER_PREFIX, "signer id").map(Self)
    }
}

/// Signer ids are Ed25519 public keys.
pub type SignerId = Ed25519PublicKey;

/// A 64-byte Ed25519 signature. Rendered as `signature_z<hex>`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}..", SIGNATURE_PREFIX, &self.to_hex()[..12])
    }
}

impl fmt::Display for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SIGNATURE_PREFIX, self.to_hex())
    }
}

impl FromStr for Ed25519Signature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed(s, SIGNATURE_PREFIX, "signature").map(Self)
    }
}

// Keys and signatures travel as their prefixed string forms so that JSON and
// CBOR encodings agree with what is stored in the sessions table.
macro_rules! string_serde {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use string_serde;

string_serde!(Ed25519PublicKey);
string_serde!(Ed25519Signature);

/// A keypair for signing session logs.
///
/// This wraps ed25519-dalek's SigningKey.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Get the public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let sig = self.signing_key.sign(message);
        Ed25519Signature(sig.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

/// An X25519 public key used as the recipient or sender id of sealed messages.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SealerId(pub [u8; 32]);

impl fmt::Debug for SealerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealerId({})", &hex::encode(self.0)[..16])
    }
}

impl fmt::Display for SealerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SEALER_PREFIX, hex::encode(self.0))
    }
}

impl FromStr for SealerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed(s, SEALER_PREFIX, "sealer id").map(Self)
    }
}

string_serde!(SealerId);

/// An X25519 static secret for sealing and unsealing.
pub struct SealerSecret(StaticSecret);

impl SealerSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the public sealer id.
    pub fn id(&self) -> SealerId {
        SealerId(*PublicKey::from(&self.0).as_bytes())
    }

    fn shared_key(&self, peer: &SealerId, nonce_material: &[u8]) -> ([u8; 32], [u8; 12]) {
        let shared = self.0.diffie_hellman(&PublicKey::from(peer.0));

        let mut hasher = blake3::Hasher::new_derive_key("costore-seal-v0 key");
        hasher.update(shared.as_bytes());
        hasher.update(nonce_material);
        let key = *hasher.finalize().as_bytes();

        let mut nonce = [0u8; 12];
        let mut hasher = blake3::Hasher::new_derive_key("costore-seal-v0 nonce");
        hasher.update(nonce_material);
        nonce.copy_from_slice(&hasher.finalize().as_bytes()[..12]);

        (key, nonce)
    }
}

impl fmt::Debug for SealerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealerSecret({:?})", self.id())
    }
}

/// The identity provider interface consumed by the rest of the workspace.
///
/// Content ids, session signatures and sealed payloads all go through this
/// trait; the only requirements are determinism and collision resistance.
pub trait CryptoProvider: Send + Sync {
    /// Hash canonical bytes into a digest.
    fn hash(&self, bytes: &[u8]) -> Blake3Hash;

    /// Sign a message.
    fn sign(&self, keypair: &Keypair, message: &[u8]) -> Ed25519Signature;

    /// Verify a signature made by `signer`.
    fn verify(
        &self,
        signer: &SignerId,
        message: &[u8],
        signature: &Ed25519Signature,
    ) -> Result<(), CoreError>;

    /// Encrypt `message` from `from` to `to`. Both sides must supply the same
    /// nonce material.
    fn seal(
        &self,
        message: &[u8],
        from: &SealerSecret,
        to: &SealerId,
        nonce_material: &[u8],
    ) -> Result<Vec<u8>, CoreError>;

    /// Decrypt a message sealed by `from` for the holder of `to`.
    fn unseal(
        &self,
        sealed: &[u8],
        to: &SealerSecret,
        from: &SealerId,
        nonce_material: &[u8],
    ) -> Result<Vec<u8>, CoreError>;
}

/// Default provider: Blake3, Ed25519, X25519 + ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Ed25519;

impl CryptoProvider for Blake3Ed25519 {
    fn hash(&self, bytes: &[u8]) -> Blake3Hash {
        Blake3Hash::hash(bytes)
    }

    fn sign(&self, keypair: &Keypair, message: &[u8]) -> Ed25519Signature {
        keypair.sign(message)
    }

    fn verify(
        &self,
        signer: &SignerId,
        message: &[u8],
        signature: &Ed25519Signature,
    ) -> Result<(), CoreError> {
        signer.verify(message, signature)
    }

    fn seal(
        &self,
        message: &[u8],
        from: &SealerSecret,
        to: &SealerId,
        nonce_material: &[u8],
    ) -> Result<Vec<u8>, CoreError> {
        let (key, nonce) = from.shared_key(to, nonce_material);
        let cipher =
            ChaCha20Poly1305::new_from_slice(&key).map_err(|e| CoreError::SealError(e.to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(&nonce), message)
            .map_err(|e| CoreError::SealError(e.to_string()))
    }

    fn unseal(
        &self,
        sealed: &[u8],
        to: &SealerSecret,
        from: &SealerId,
        nonce_material: &[u8],
    ) -> Result<Vec<u8>, CoreError> {
        let (key, nonce) = to.shared_key(from, nonce_material);
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| CoreError::UnsealError(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), sealed)
            .map_err(|e| CoreError::UnsealError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");

        let tampered = b"hello worlD";
        assert!(keypair.public_key().verify(tampered, &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let seed = [0x42u8; 32];
        let kp1 = Keypair::from_seed(&seed);
        let kp2 = Keypair::from_seed(&seed);
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_blake3_hash() {
        let h1 = Blake3Hash::hash(b"test data");
        let h2 = Blake3Hash::hash(b"test data");
        assert_eq!(h1, h2);
        assert_ne!(h1, Blake3Hash::hash(b"different data"));
    }

    #[test]
    fn test_signer_id_string_roundtrip() {
        let pk = Keypair::generate().public_key();
        let s = pk.to_string();
        assert!(s.starts_with(SIGNER_PREFIX));
        assert_eq!(s.parse::<Ed25519PublicKey>().unwrap(), pk);
        assert!("signer_zabc".parse::<Ed25519PublicKey>().is_err());
    }

    #[test]
    fn test_signature_serde_as_string() {
        let sig = Keypair::from_seed(&[7; 32]).sign(b"x");
        let json = serde_json::to_string(&sig).unwrap();
        assert!(json.starts_with("\"signature_z"));
        let back: Ed25519Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn test_seal_unseal() {
        let crypto = Blake3Ed25519;
        let alice = SealerSecret::generate();
        let bob = SealerSecret::generate();
        let nonce_material = b"co_z01:tx_0";

        let sealed = crypto
            .seal(b"secret payload", &alice, &bob.id(), nonce_material)
            .unwrap();
        let opened = crypto
            .unseal(&sealed, &bob, &alice.id(), nonce_material)
            .unwrap();
        assert_eq!(opened, b"secret payload");

        // Wrong nonce material must not open.
        assert!(crypto
            .unseal(&sealed, &bob, &alice.id(), b"other")
            .is_err());
    }
}
