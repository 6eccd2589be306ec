//! HMAC-SHA256 signing engine for gate credentials.
//!
//! Pure functions over an explicitly injected key. There is no ambient or
//! global secret; whoever needs to sign holds a [`SigningKey`]. Rotating the
//! secret invalidates every outstanding unexpired pass.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq as _;
use uuid::Uuid;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

// ─── Canonical string ────────────────────────────────────────────────────────

/// Role discriminant baked into the canonical string, so a resident pass can
/// never be replayed as an invitation pass or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialRole {
  Resident,
  Invitation,
}

impl CredentialRole {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Resident => "resident",
      Self::Invitation => "invitation",
    }
  }
}

impl fmt::Display for CredentialRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The string both issuance and verification sign over. The `:` delimiter
/// cannot appear in a uuid, a role discriminant, or a decimal timestamp, so
/// the encoding is unambiguous.
pub fn canonical_string(
  subject_id: Uuid,
  role: CredentialRole,
  timestamp_ms: i64,
) -> String {
  format!("{subject_id}:{role}:{timestamp_ms}")
}

// ─── Signing key ─────────────────────────────────────────────────────────────

/// A keyed HMAC-SHA256 signer/verifier.
///
/// Construction fails on an empty secret; that is a startup configuration
/// error, never a per-request one. Signing itself cannot fail.
#[derive(Clone)]
pub struct SigningKey {
  mac: HmacSha256,
}

impl SigningKey {
  pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
    let secret = secret.as_ref();
    if secret.is_empty() {
      return Err(Error::EmptySecret);
    }
    // HMAC accepts keys of any non-zero length, so this cannot fail past
    // the emptiness check above.
    let mac =
      HmacSha256::new_from_slice(secret).map_err(|_| Error::EmptySecret)?;
    Ok(Self { mac })
  }

  /// Lowercase hex HMAC-SHA256 over `canonical`.
  pub fn sign(&self, canonical: &str) -> String {
    let mut mac = self.mac.clone();
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  /// Recompute and compare in constant time. Non-hex or wrong-length input
  /// is a plain mismatch, not an error.
  pub fn verify(&self, canonical: &str, signature_hex: &str) -> bool {
    let Ok(presented) = hex::decode(signature_hex) else {
      return false;
    };
    let mut mac = self.mac.clone();
    mac.update(canonical.as_bytes());
    let expected = mac.finalize().into_bytes();
    if presented.len() != expected.len() {
      return false;
    }
    expected.ct_eq(&presented).into()
  }
}

impl fmt::Debug for SigningKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SigningKey(..)")
  }
}

/// Constant-time equality for two hex signatures already in string form.
pub fn signatures_match(a: &str, b: &str) -> bool {
  a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
