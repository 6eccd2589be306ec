//! The gate — issuance and verification flows over an [`AccessStore`] and
//! a [`Directory`].
//!
//! Every decision path here follows the same ordering: decide access first,
//! write the ledger second. A ledger anomaly (departure with no open
//! arrival) is recorded and logged, never turned into a denial; a failed
//! access decision never reaches the ledger at all.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  credential::{InvitationPass, Pass, ResidentPass},
  directory::{Directory, Party},
  entry::{
    DepartureOutcome, EntryLogEntry, EntryMethod, EntryRefs, EntrySubject,
    NewEntry,
  },
  invitation::{Invitation, InvitationStatus, NewInvitation},
  signature::{CredentialRole, SigningKey, canonical_string, signatures_match},
  store::AccessStore,
  visitor::Visitor,
};

/// Resident pass lifetime when configuration does not override it.
pub const DEFAULT_PASS_TTL_MINUTES: i64 = 5;

const MS_PER_MINUTE: i64 = 60_000;

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Operational context a guard console attaches to gate decisions.
#[derive(Debug, Clone, Default)]
pub struct GateContext {
  pub guard_id: Option<Uuid>,
  /// Gate or checkpoint name, recorded in entry metadata.
  pub gate:     Option<String>,
}

impl GateContext {
  fn metadata(&self) -> Option<serde_json::Value> {
    self
      .gate
      .as_ref()
      .map(|gate| serde_json::json!({ "gate": gate }))
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// A freshly minted pass plus its QR-ready encoding.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedPass {
  pub pass: Pass,
  /// The base64 code a QR image should carry.
  pub code: String,
}

/// Dry-run validation result for a resident pass.
#[derive(Debug, Clone, Serialize)]
pub struct ResidentCheck {
  pub resident_id:       Uuid,
  /// Directory record, when one exists; the pass stands on its own.
  pub resident:          Option<Party>,
  pub remaining_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResidentGrant {
  pub resident_id:       Uuid,
  pub resident:          Option<Party>,
  pub remaining_minutes: i64,
  pub entry_id:          Uuid,
}

/// Dry-run validation result for an invitation pass.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationCheck {
  pub invitation: Invitation,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvitationGrant {
  pub invitation: Invitation,
  pub visitor:    Visitor,
  pub entry_id:   Uuid,
}

/// What a check-out leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct DepartureReceipt {
  pub visitor:          Visitor,
  pub entry_id:         Uuid,
  /// Whole minutes on-site; absent when the departure had no matching
  /// arrival.
  pub duration_minutes: Option<i64>,
  pub anomalous:        bool,
}

/// Validation outcome for either pass shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validation {
  Resident(ResidentCheck),
  Invitation(InvitationCheck),
}

/// Admission outcome for either pass shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Admission {
  Resident(ResidentGrant),
  Invitation(InvitationGrant),
}

// ─── Gate ────────────────────────────────────────────────────────────────────

/// Issues passes, verifies them at the gate, and drives the state machine
/// and ledger around each decision.
pub struct Gate<S> {
  store:    Arc<S>,
  key:      SigningKey,
  pass_ttl: Duration,
}

impl<S> Gate<S>
where
  S: AccessStore + Directory,
{
  pub fn new(store: Arc<S>, key: SigningKey, pass_ttl: Duration) -> Self {
    Self { store, key, pass_ttl }
  }

  // ── Issuance ──────────────────────────────────────────────────────────

  /// Mint a short-lived resident pass. Pure construction; nothing is
  /// written anywhere.
  pub fn issue_resident_pass(
    &self,
    resident_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<IssuedPass> {
    let expires_at_ms = (now + self.pass_ttl).timestamp_millis();
    let signature = self.key.sign(&canonical_string(
      resident_id,
      CredentialRole::Resident,
      expires_at_ms,
    ));
    let pass =
      Pass::Resident(ResidentPass { resident_id, expires_at_ms, signature });
    let code = pass.encode()?;
    Ok(IssuedPass { pass, code })
  }

  /// Rebuild the encoded pass of an approved invitation from its stored
  /// signature and issuance time, for re-display.
  pub fn invitation_pass(
    &self,
    invitation: &Invitation,
    now: DateTime<Utc>,
  ) -> Result<IssuedPass> {
    match invitation.effective_status(now) {
      InvitationStatus::Approved => {}
      InvitationStatus::Pending => {
        return Err(Error::InvitationPending(invitation.invitation_id));
      }
      from => {
        return Err(Error::InvalidInvitationTransition {
          from,
          attempted: "issue a pass for",
        });
      }
    }
    let (Some(signature), Some(issued_at_ms)) =
      (invitation.qr_signature.clone(), invitation.qr_issued_at_ms)
    else {
      // Approved rows always carry both; a row that does not predates its
      // own approval and cannot be trusted.
      return Err(Error::InvalidSignature);
    };
    let pass = Pass::Invitation(InvitationPass {
      invitation_id: invitation.invitation_id,
      visitor_name: invitation.visitor.name.clone(),
      visitor_document: invitation.visitor.document_id.clone(),
      issued_at_ms,
      signature,
    });
    let code = pass.encode()?;
    Ok(IssuedPass { pass, code })
  }

  // ── Invitation lifecycle ──────────────────────────────────────────────

  /// Approve a pending invitation. This is the moment its pass comes to
  /// exist: the issuance time is fixed, the signature is computed and
  /// stored on the row, and the encoded pass is returned for delivery.
  pub async fn approve_invitation(
    &self,
    id: Uuid,
    notes: Option<String>,
    now: DateTime<Utc>,
  ) -> Result<(Invitation, IssuedPass)> {
    let issued_at_ms = now.timestamp_millis();
    let signature = self.key.sign(&canonical_string(
      id,
      CredentialRole::Invitation,
      issued_at_ms,
    ));
    let invitation = self
      .store
      .approve_invitation(id, issued_at_ms, signature, notes)
      .await
      .map_err(Into::into)?;
    let pass = self.invitation_pass(&invitation, now)?;
    tracing::info!(invitation = %id, "invitation approved");
    Ok((invitation, pass))
  }

  /// Mint a pre-approved invitation from a frequent-visitor roster entry
  /// and bump its visit counters.
  pub async fn invite_frequent_visitor(
    &self,
    frequent_id: Uuid,
    scheduled_date: DateTime<Utc>,
    expiration_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    now: DateTime<Utc>,
  ) -> Result<(Invitation, IssuedPass)> {
    let roster = self
      .store
      .get_frequent_visitor(frequent_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::FrequentVisitorNotFound(frequent_id))?;
    if !roster.active {
      return Err(Error::InactiveFrequentVisitor(frequent_id));
    }
    let created = self
      .store
      .create_invitation(NewInvitation {
        resident_id:     roster.resident_id,
        visitor:         roster.identity.clone(),
        scheduled_date,
        expiration_date: Some(
          expiration_date.unwrap_or(scheduled_date + Duration::days(1)),
        ),
        vehicle:         roster.vehicle.clone(),
        notes,
        visitor_id:      None,
      })
      .await
      .map_err(Into::into)?;
    let (invitation, pass) =
      self.approve_invitation(created.invitation_id, None, now).await?;
    self
      .store
      .record_frequent_visit(frequent_id, now)
      .await
      .map_err(Into::into)?;
    tracing::info!(
      frequent_visitor = %frequent_id,
      invitation = %invitation.invitation_id,
      "invitation minted from roster"
    );
    Ok((invitation, pass))
  }

  // ── Verification ──────────────────────────────────────────────────────

  /// Decode a scanned code and dry-run validate it: no state transition,
  /// no ledger write.
  pub async fn validate_code(
    &self,
    code: &str,
    presented_document: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<Validation> {
    match Pass::decode(code)? {
      Pass::Resident(pass) => {
        Ok(Validation::Resident(self.validate_resident(&pass, now).await?))
      }
      Pass::Invitation(pass) => Ok(Validation::Invitation(
        self.validate_invitation(&pass, presented_document, now).await?,
      )),
    }
  }

  /// Decode a scanned code and fully admit it: verification, state
  /// transition, ledger arrival.
  pub async fn admit_code(
    &self,
    code: &str,
    presented_document: Option<&str>,
    now: DateTime<Utc>,
    ctx: &GateContext,
  ) -> Result<Admission> {
    match Pass::decode(code)? {
      Pass::Resident(pass) => {
        Ok(Admission::Resident(self.verify_resident(&pass, now, ctx).await?))
      }
      Pass::Invitation(pass) => {
        // No identity presented means identity cannot be confirmed.
        let document = presented_document.ok_or(Error::IdentityMismatch)?;
        Ok(Admission::Invitation(
          self.verify_invitation(&pass, document, now, ctx).await?,
        ))
      }
    }
  }

  /// Steps shared by resident validation and admission. Expiry is checked
  /// before the signature so "too late" and "forged" stay distinguishable.
  fn check_resident_pass(
    &self,
    pass: &ResidentPass,
    now: DateTime<Utc>,
  ) -> Result<i64> {
    let now_ms = now.timestamp_millis();
    if now_ms > pass.expires_at_ms {
      return Err(Error::Expired {
        expired_minutes_ago: (now_ms - pass.expires_at_ms) / MS_PER_MINUTE,
      });
    }
    if !self.key.verify(&pass.canonical(), &pass.signature) {
      return Err(Error::InvalidSignature);
    }
    Ok((pass.expires_at_ms - now_ms) / MS_PER_MINUTE)
  }

  pub async fn validate_resident(
    &self,
    pass: &ResidentPass,
    now: DateTime<Utc>,
  ) -> Result<ResidentCheck> {
    let remaining_minutes = self.check_resident_pass(pass, now)?;
    let resident = self
      .store
      .resolve_resident(pass.resident_id)
      .await
      .map_err(Into::into)?;
    Ok(ResidentCheck {
      resident_id: pass.resident_id,
      resident,
      remaining_minutes,
    })
  }

  pub async fn verify_resident(
    &self,
    pass: &ResidentPass,
    now: DateTime<Utc>,
    ctx: &GateContext,
  ) -> Result<ResidentGrant> {
    let check = self.validate_resident(pass, now).await?;
    let entry = self
      .store
      .record_arrival(NewEntry {
        method:       EntryMethod::Qr,
        refs:         EntryRefs {
          resident_id: Some(pass.resident_id),
          guard_id: ctx.guard_id,
          ..Default::default()
        },
        arrival_time: now,
        payload:      Some(serde_json::to_value(pass)?),
        metadata:     ctx.metadata(),
      })
      .await
      .map_err(Into::into)?;
    tracing::info!(
      resident = %pass.resident_id,
      entry = %entry.entry_id,
      "resident admitted"
    );
    Ok(ResidentGrant {
      resident_id:       pass.resident_id,
      resident:          check.resident,
      remaining_minutes: check.remaining_minutes,
      entry_id:          entry.entry_id,
    })
  }

  /// Steps shared by invitation validation and admission: load, effective
  /// status (persisting a lazy expiry the first time it is observed),
  /// signature, identity.
  async fn check_invitation_pass(
    &self,
    pass: &InvitationPass,
    presented_document: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<Invitation> {
    let invitation = self
      .store
      .get_invitation(pass.invitation_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::InvitationNotFound(pass.invitation_id))?;
    match invitation.effective_status(now) {
      InvitationStatus::Approved => {}
      InvitationStatus::Expired => {
        if invitation.status == InvitationStatus::Approved {
          self
            .store
            .expire_invitation(invitation.invitation_id)
            .await
            .map_err(Into::into)?;
        }
        return Err(Error::InvitationExpired(invitation.invitation_id));
      }
      InvitationStatus::Pending => {
        return Err(Error::InvitationPending(invitation.invitation_id));
      }
      InvitationStatus::Used => {
        return Err(Error::AlreadyUsed(invitation.invitation_id));
      }
      InvitationStatus::Rejected => {
        return Err(Error::InvitationRejected(invitation.invitation_id));
      }
      InvitationStatus::Cancelled => {
        return Err(Error::InvitationCancelled(invitation.invitation_id));
      }
    }
    if !self.key.verify(&pass.canonical(), &pass.signature) {
      return Err(Error::InvalidSignature);
    }
    // The presented signature must be the exact one minted at approval.
    let stored = invitation.qr_signature.as_deref().unwrap_or("");
    if !signatures_match(stored, &pass.signature) {
      return Err(Error::InvalidSignature);
    }
    if let Some(document) = presented_document
      && document != invitation.visitor.document_id
    {
      return Err(Error::IdentityMismatch);
    }
    Ok(invitation)
  }

  pub async fn validate_invitation(
    &self,
    pass: &InvitationPass,
    presented_document: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<InvitationCheck> {
    let invitation =
      self.check_invitation_pass(pass, presented_document, now).await?;
    Ok(InvitationCheck { invitation })
  }

  pub async fn verify_invitation(
    &self,
    pass: &InvitationPass,
    presented_document: &str,
    now: DateTime<Utc>,
    ctx: &GateContext,
  ) -> Result<InvitationGrant> {
    self.check_invitation_pass(pass, Some(presented_document), now).await?;
    // The CAS inside the store decides the winner if two guards race past
    // the checks above; the loser comes back `AlreadyUsed`.
    let (invitation, visitor) = self
      .store
      .check_in_invitation(pass.invitation_id, now)
      .await
      .map_err(Into::into)?;
    let entry = self
      .store
      .record_arrival(NewEntry {
        method:       EntryMethod::Qr,
        refs:         EntryRefs {
          invitation_id: Some(invitation.invitation_id),
          visitor_id: Some(visitor.visitor_id),
          resident_id: Some(invitation.resident_id),
          guard_id: ctx.guard_id,
          ..Default::default()
        },
        arrival_time: now,
        payload:      Some(serde_json::to_value(pass)?),
        metadata:     ctx.metadata(),
      })
      .await
      .map_err(Into::into)?;
    tracing::info!(
      invitation = %invitation.invitation_id,
      visitor = %visitor.visitor_id,
      entry = %entry.entry_id,
      "invitation admitted"
    );
    Ok(InvitationGrant { invitation, visitor, entry_id: entry.entry_id })
  }

  // ── Departure ─────────────────────────────────────────────────────────

  /// Manual admission of an approved visitor at the guard station.
  pub async fn check_in_visitor(
    &self,
    visitor_id: Uuid,
    now: DateTime<Utc>,
    ctx: &GateContext,
  ) -> Result<(Visitor, EntryLogEntry)> {
    let visitor = self
      .store
      .check_in_visitor(visitor_id, now)
      .await
      .map_err(Into::into)?;
    let entry = self
      .store
      .record_arrival(NewEntry {
        method:       EntryMethod::Manual,
        refs:         EntryRefs {
          visitor_id: Some(visitor.visitor_id),
          resident_id: Some(visitor.resident_id),
          guard_id: ctx.guard_id,
          ..Default::default()
        },
        arrival_time: now,
        payload:      None,
        metadata:     ctx.metadata(),
      })
      .await
      .map_err(Into::into)?;
    tracing::info!(
      visitor = %visitor.visitor_id,
      entry = %entry.entry_id,
      "visitor admitted manually"
    );
    Ok((visitor, entry))
  }

  /// Close a visit: visitor goes `Completed`, the open ledger entry gets
  /// its departure time.
  pub async fn check_out_visitor(
    &self,
    visitor_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<DepartureReceipt> {
    let visitor = self
      .store
      .check_out_visitor(visitor_id, now)
      .await
      .map_err(Into::into)?;
    let outcome =
      self.record_departure(EntrySubject::Visitor(visitor_id), now).await?;
    tracing::info!(
      visitor = %visitor_id,
      entry = %outcome.entry.entry_id,
      "visitor checked out"
    );
    Ok(DepartureReceipt {
      visitor,
      entry_id: outcome.entry.entry_id,
      duration_minutes: outcome
        .matched
        .then(|| outcome.entry.duration_minutes())
        .flatten(),
      anomalous: !outcome.matched,
    })
  }

  /// Record a departure for any subject, warning when it closes nothing.
  pub async fn record_departure(
    &self,
    subject: EntrySubject,
    at: DateTime<Utc>,
  ) -> Result<DepartureOutcome> {
    let outcome = self
      .store
      .record_departure(subject, at)
      .await
      .map_err(Into::into)?;
    if !outcome.matched {
      tracing::warn!(
        entry = %outcome.entry.entry_id,
        ?subject,
        "departure recorded with no matching open arrival"
      );
    }
    Ok(outcome)
  }
}
