//! Wire format for QR passes.
//!
//! A pass is a small JSON object, base64-encoded for embedding in a QR
//! image. The core only produces and consumes the encoded string; rendering
//! the image is an external concern. Passes are ephemeral and never
//! persisted.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  signature::{CredentialRole, canonical_string},
};

/// A resident's short-lived gate pass. Self-contained and self-authorizing:
/// issuing one writes nothing to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentPass {
  #[serde(rename = "id")]
  pub resident_id:   Uuid,
  /// Expiry, milliseconds since the Unix epoch.
  #[serde(rename = "exp")]
  pub expires_at_ms: i64,
  /// Lowercase hex HMAC over [`ResidentPass::canonical`].
  #[serde(rename = "sig")]
  pub signature:     String,
}

impl ResidentPass {
  pub fn canonical(&self) -> String {
    canonical_string(
      self.resident_id,
      CredentialRole::Resident,
      self.expires_at_ms,
    )
  }
}

/// A visitor's invitation pass, minted when the invitation is approved.
/// The invitation row, not the pass, is the source of truth for validity;
/// the visitor fields here only pre-populate the Visitor record on first
/// use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationPass {
  #[serde(rename = "inv")]
  pub invitation_id:    Uuid,
  #[serde(rename = "name")]
  pub visitor_name:     String,
  #[serde(rename = "doc")]
  pub visitor_document: String,
  /// Issuance time, milliseconds since the Unix epoch. Fixed at approval;
  /// this is the freshness field the signature covers.
  #[serde(rename = "iat")]
  pub issued_at_ms:     i64,
  /// Lowercase hex HMAC over [`InvitationPass::canonical`].
  #[serde(rename = "sig")]
  pub signature:        String,
}

impl InvitationPass {
  pub fn canonical(&self) -> String {
    canonical_string(
      self.invitation_id,
      CredentialRole::Invitation,
      self.issued_at_ms,
    )
  }
}

/// Either pass shape, as decoded from a scanned code. The two field sets are
/// disjoint, so untagged deserialization is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pass {
  Resident(ResidentPass),
  Invitation(InvitationPass),
}

impl Pass {
  pub fn role(&self) -> CredentialRole {
    match self {
      Self::Resident(_) => CredentialRole::Resident,
      Self::Invitation(_) => CredentialRole::Invitation,
    }
  }

  /// Encode for QR embedding: JSON wrapped in base64.
  pub fn encode(&self) -> Result<String> {
    let json = serde_json::to_string(self)?;
    Ok(BASE64.encode(json))
  }

  /// Decode a scanned code. Every failure mode is a
  /// [`Error::MalformedCredential`] with a short diagnostic; nothing here
  /// panics on hostile input.
  pub fn decode(code: &str) -> Result<Self> {
    let bytes = BASE64
      .decode(code.trim())
      .map_err(|e| Error::MalformedCredential(format!("invalid base64: {e}")))?;
    let json = String::from_utf8(bytes)
      .map_err(|_| Error::MalformedCredential("payload is not utf-8".into()))?;
    serde_json::from_str(&json).map_err(|_| {
      Error::MalformedCredential("unrecognized payload shape".into())
    })
  }
}

impl From<ResidentPass> for Pass {
  fn from(pass: ResidentPass) -> Self { Self::Resident(pass) }
}

impl From<InvitationPass> for Pass {
  fn from(pass: InvitationPass) -> Self { Self::Invitation(pass) }
}
