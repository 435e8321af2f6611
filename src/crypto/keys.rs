//! # Key Types
//!
//! P-256 key-agreement keys and their JWK representation.
//!
//! Keys are exchanged and persisted as JSON Web Keys so identities created
//! by the browser build (WebCrypto `exportKey("jwk", ..)`) and by this crate
//! are interchangeable:
//!
//! ```text
//! public:  {"kty":"EC","crv":"P-256","x":"<b64url>","y":"<b64url>"}
//! private: {"kty":"EC","crv":"P-256","x":"<b64url>","y":"<b64url>","d":"<b64url>"}
//! ```
//!
//! `ext` and `key_ops` are carried through when present but never
//! interpreted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{EncodedPoint, FieldBytes};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};

/// JWK key type for elliptic-curve keys
pub const JWK_KTY_EC: &str = "EC";

/// JWK curve name for P-256
pub const JWK_CRV_P256: &str = "P-256";

/// Size of a P-256 field element / scalar in bytes
pub const COORDINATE_SIZE: usize = 32;

/// JSON Web Key for a P-256 key-agreement key
///
/// `d` is present only on private keys. Drop zeroizes it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcJwk {
    /// Key type, always `"EC"`
    pub kty: String,
    /// Curve, always `"P-256"`
    pub crv: String,
    /// Base64url X coordinate
    pub x: String,
    /// Base64url Y coordinate
    pub y: String,
    /// Base64url private scalar (private keys only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// WebCrypto extractable flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    /// WebCrypto key usages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
}

impl EcJwk {
    /// Whether this JWK carries a private scalar
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// The public half of this JWK (drops `d`, `ext` and `key_ops`)
    pub fn to_public(&self) -> Self {
        Self {
            kty: self.kty.clone(),
            crv: self.crv.clone(),
            x: self.x.clone(),
            y: self.y.clone(),
            d: None,
            ext: None,
            key_ops: None,
        }
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Human-comparable fingerprint of the public key
    ///
    /// SHA-256 over the uncompressed SEC1 point, first 16 bytes, hex in
    /// groups of four. Two users reading the same string aloud have the same
    /// key.
    pub fn fingerprint(&self) -> Result<String> {
        let public = EcdhPublicKey::from_jwk(self)?;
        Ok(public.fingerprint())
    }

    fn check_curve(&self) -> Result<()> {
        if self.kty != JWK_KTY_EC {
            return Err(Error::InvalidKey(format!(
                "Unsupported JWK key type: {}",
                self.kty
            )));
        }
        if self.crv != JWK_CRV_P256 {
            return Err(Error::InvalidKey(format!(
                "Unsupported JWK curve: {}",
                self.crv
            )));
        }
        Ok(())
    }
}

impl Drop for EcJwk {
    fn drop(&mut self) {
        if let Some(d) = self.d.as_mut() {
            d.zeroize();
        }
    }
}

impl std::fmt::Debug for EcJwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcJwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("d", &self.d.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A peer's P-256 public key, usable only for key agreement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EcdhPublicKey(p256::PublicKey);

impl EcdhPublicKey {
    /// Import from a JWK
    ///
    /// Rejects non-EC keys, curves other than P-256, malformed coordinates
    /// and points that are not on the curve.
    pub fn from_jwk(jwk: &EcJwk) -> Result<Self> {
        jwk.check_curve()?;

        let x = decode_coordinate(&jwk.x, "x")?;
        let y = decode_coordinate(&jwk.y, "y")?;

        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );

        Self::from_sec1_bytes(point.as_bytes())
    }

    /// Import from SEC1 bytes (compressed or uncompressed)
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        p256::PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidKey("Public key is not a valid P-256 point".into()))
    }

    /// Export as a public JWK
    pub fn to_jwk(&self) -> EcJwk {
        let point = self.0.to_encoded_point(false);
        // Uncompressed points of a valid public key always carry both coordinates
        let x = point.x().map(|x| URL_SAFE_NO_PAD.encode(x)).unwrap_or_default();
        let y = point.y().map(|y| URL_SAFE_NO_PAD.encode(y)).unwrap_or_default();

        EcJwk {
            kty: JWK_KTY_EC.into(),
            crv: JWK_CRV_P256.into(),
            x,
            y,
            d: None,
            ext: Some(true),
            key_ops: Some(Vec::new()),
        }
    }

    /// Uncompressed SEC1 encoding (65 bytes)
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(false).as_bytes().to_vec()
    }

    /// See [`EcJwk::fingerprint`]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.to_sec1_bytes());
        hex::encode(&digest[..16])
            .as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn as_inner(&self) -> &p256::PublicKey {
        &self.0
    }
}

/// The device's own P-256 private key
///
/// `p256::SecretKey` zeroizes its scalar on drop.
#[derive(Clone)]
pub struct EcdhPrivateKey(p256::SecretKey);

impl EcdhPrivateKey {
    /// Generate a fresh key from the OS CSPRNG
    pub fn generate() -> Self {
        Self(p256::SecretKey::random(&mut OsRng))
    }

    /// Import from a private JWK
    ///
    /// The `x`/`y` members must match the public key implied by `d`.
    pub fn from_jwk(jwk: &EcJwk) -> Result<Self> {
        jwk.check_curve()?;

        let d = jwk
            .d
            .as_deref()
            .ok_or_else(|| Error::InvalidKey("JWK has no private component".into()))?;
        let scalar = Zeroizing::new(decode_coordinate(d, "d")?);

        let secret = p256::SecretKey::from_slice(&scalar[..])
            .map_err(|_| Error::InvalidKey("Private scalar out of range".into()))?;
        let key = Self(secret);

        let declared = EcdhPublicKey::from_jwk(&jwk.to_public())?;
        if declared != key.public_key() {
            return Err(Error::InvalidKey(
                "JWK public coordinates do not match private scalar".into(),
            ));
        }

        Ok(key)
    }

    /// Export as a private JWK (includes the public coordinates)
    pub fn to_jwk(&self) -> EcJwk {
        let mut jwk = self.public_key().to_jwk();
        let mut scalar = Zeroizing::new([0u8; COORDINATE_SIZE]);
        scalar.copy_from_slice(&self.0.to_bytes());
        jwk.d = Some(URL_SAFE_NO_PAD.encode(&scalar[..]));
        jwk.key_ops = Some(vec!["deriveKey".into(), "deriveBits".into()]);
        jwk
    }

    /// The matching public key
    pub fn public_key(&self) -> EcdhPublicKey {
        EcdhPublicKey(self.0.public_key())
    }

    /// Raw P-256 ECDH: the 32-byte x-coordinate of the shared point
    ///
    /// Both parties compute the same value:
    /// - Alice: alice_secret × bob_public
    /// - Bob: bob_secret × alice_public
    pub fn diffie_hellman(&self, their_public: &EcdhPublicKey) -> Zeroizing<[u8; COORDINATE_SIZE]> {
        let shared = p256::ecdh::diffie_hellman(
            self.0.to_nonzero_scalar(),
            their_public.as_inner().as_affine(),
        );

        let mut out = Zeroizing::new([0u8; COORDINATE_SIZE]);
        out.copy_from_slice(shared.raw_secret_bytes());
        out
    }
}

impl std::fmt::Debug for EcdhPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EcdhPrivateKey")
            .field(&self.public_key().fingerprint())
            .finish()
    }
}

/// Decode one base64url JWK member into a 32-byte big-endian value
///
/// Accepts padded and unpadded input.
fn decode_coordinate(value: &str, name: &str) -> Result<Vec<u8>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| Error::InvalidKey(format!("Invalid base64url in JWK '{}': {}", name, e)))?;

    if bytes.len() != COORDINATE_SIZE {
        return Err(Error::InvalidKey(format!(
            "JWK '{}' must be {} bytes, got {}",
            name,
            COORDINATE_SIZE,
            bytes.len()
        )));
    }

    Ok(bytes)
}

// ============================================================================
// TESTS
// ============================================================================
