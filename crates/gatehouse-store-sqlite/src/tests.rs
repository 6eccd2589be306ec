//! Integration tests for `SqliteStore` against an in-memory database,
//! including the full gate flows layered on top of it.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gatehouse_core::{
  Error as CoreError,
  credential::{InvitationPass, Pass, ResidentPass},
  directory::{NewParty, Party, PartyRole},
  entry::{EntryMethod, EntryRefs, EntrySubject, NewEntry},
  frequent::NewFrequentVisitor,
  gate::{Admission, Gate, GateContext},
  identity::{Identity, VehicleInfo},
  invitation::{Invitation, InvitationStatus, NewInvitation},
  signature::{CredentialRole, SigningKey, canonical_string},
  store::{AccessStore, EntryQuery, InvitationQuery, VisitorQuery},
  visitor::{NewVisitor, VisitorStatus},
};
use uuid::Uuid;

use crate::SqliteStore;

const TEST_SECRET: &str = "gatehouse-test-secret";

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn signing_key() -> SigningKey {
  SigningKey::new(TEST_SECRET).expect("signing key")
}

fn gate(store: &SqliteStore) -> Gate<SqliteStore> {
  Gate::new(Arc::new(store.clone()), signing_key(), Duration::minutes(5))
}

fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

async fn resident(s: &SqliteStore) -> Party {
  s.add_party(NewParty {
    role:        PartyRole::Resident,
    name:        "Marta Vidal".into(),
    document_id: Some("11111111-1".into()),
    unit:        Some("A-12".into()),
  })
  .await
  .unwrap()
}

/// An invitation for Rosa Fuentes, scheduled for the morning of Jan 1 and
/// valid until midnight.
fn invite(resident_id: Uuid) -> NewInvitation {
  NewInvitation {
    resident_id,
    visitor: Identity {
      name:        "Rosa Fuentes".into(),
      document_id: "12345678-9".into(),
    },
    scheduled_date: dt(2025, 1, 1, 9, 0, 0),
    expiration_date: Some(dt(2025, 1, 2, 0, 0, 0)),
    vehicle: None,
    notes: None,
    visitor_id: None,
  }
}

async fn approved_invitation(
  s: &SqliteStore,
  g: &Gate<SqliteStore>,
  resident_id: Uuid,
) -> (Invitation, InvitationPass) {
  let created = s.create_invitation(invite(resident_id)).await.unwrap();
  let (invitation, issued) = g
    .approve_invitation(created.invitation_id, None, dt(2025, 1, 1, 10, 0, 0))
    .await
    .unwrap();
  let Pass::Invitation(pass) = issued.pass else {
    panic!("approval should mint an invitation pass");
  };
  (invitation, pass)
}

async fn ledger_total(s: &SqliteStore) -> u64 {
  s.query_entries(&EntryQuery { limit: 1, ..Default::default() })
    .await
    .unwrap()
    .total
}

fn flip_last_char(signature: &str) -> String {
  let mut chars: Vec<char> = signature.chars().collect();
  let last = chars.last_mut().unwrap();
  *last = if *last == '0' { '1' } else { '0' };
  chars.into_iter().collect()
}

// ─── Parties ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_party() {
  let s = store().await;

  let party = resident(&s).await;
  assert_eq!(party.role, PartyRole::Resident);
  assert!(party.active);

  let fetched = s.get_party(party.party_id).await.unwrap().unwrap();
  assert_eq!(fetched.party_id, party.party_id);
  assert_eq!(fetched.name, "Marta Vidal");
  assert_eq!(fetched.unit.as_deref(), Some("A-12"));
}

#[tokio::test]
async fn get_party_missing_returns_none() {
  let s = store().await;
  assert!(s.get_party(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_parties_filtered_by_role() {
  let s = store().await;
  resident(&s).await;
  s.add_party(NewParty {
    role:        PartyRole::Guard,
    name:        "Luis Ortega".into(),
    document_id: None,
    unit:        None,
  })
  .await
  .unwrap();

  let all = s.list_parties(None).await.unwrap();
  assert_eq!(all.len(), 2);

  let guards = s.list_parties(Some(PartyRole::Guard)).await.unwrap();
  assert_eq!(guards.len(), 1);
  assert_eq!(guards[0].name, "Luis Ortega");
}

// ─── Invitation lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn create_invitation_starts_pending() {
  let s = store().await;
  let party = resident(&s).await;

  let invitation = s.create_invitation(invite(party.party_id)).await.unwrap();
  assert_eq!(invitation.status, InvitationStatus::Pending);
  assert!(invitation.qr_signature.is_none());
  assert!(invitation.qr_issued_at_ms.is_none());

  let fetched = s
    .get_invitation(invitation.invitation_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched.visitor.document_id, "12345678-9");
  assert_eq!(fetched.expiration_date, dt(2025, 1, 2, 0, 0, 0));
}

#[tokio::test]
async fn expiration_defaults_to_scheduled_date() {
  let s = store().await;
  let party = resident(&s).await;

  let mut input = invite(party.party_id);
  input.expiration_date = None;
  let invitation = s.create_invitation(input).await.unwrap();
  assert_eq!(invitation.expiration_date, invitation.scheduled_date);
}

#[tokio::test]
async fn create_invitation_unknown_resident() {
  let s = store().await;
  let err = s.create_invitation(invite(Uuid::new_v4())).await.unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::ResidentNotFound(_))
  ));
}

#[tokio::test]
async fn approval_mints_the_pass() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (invitation, pass) = approved_invitation(&s, &g, party.party_id).await;
  assert_eq!(invitation.status, InvitationStatus::Approved);
  assert_eq!(
    invitation.qr_issued_at_ms,
    Some(dt(2025, 1, 1, 10, 0, 0).timestamp_millis())
  );
  assert_eq!(
    invitation.qr_signature.as_deref(),
    Some(pass.signature.as_str())
  );
  assert_eq!(pass.visitor_document, "12345678-9");

  // The encoded form decodes back to the same pass.
  let code = Pass::Invitation(pass.clone()).encode().unwrap();
  assert_eq!(Pass::decode(&code).unwrap(), Pass::Invitation(pass));
}

#[tokio::test]
async fn approving_twice_fails() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (invitation, _) = approved_invitation(&s, &g, party.party_id).await;
  let err = g
    .approve_invitation(invitation.invitation_id, None, dt(2025, 1, 1, 11, 0, 0))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidInvitationTransition {
      from: InvitationStatus::Approved,
      ..
    }
  ));
}

#[tokio::test]
async fn reject_only_from_pending() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let created = s.create_invitation(invite(party.party_id)).await.unwrap();
  let rejected = s
    .reject_invitation(created.invitation_id, "unknown visitor".into())
    .await
    .unwrap();
  assert_eq!(rejected.status, InvitationStatus::Rejected);
  assert_eq!(rejected.rejection_reason.as_deref(), Some("unknown visitor"));

  let (approved, _) = approved_invitation(&s, &g, party.party_id).await;
  let err = s
    .reject_invitation(approved.invitation_id, "too late".into())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::InvalidInvitationTransition { .. })
  ));
}

#[tokio::test]
async fn cancel_from_pending_and_approved() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let pending = s.create_invitation(invite(party.party_id)).await.unwrap();
  let cancelled = s
    .cancel_invitation(pending.invitation_id, "plans changed".into())
    .await
    .unwrap();
  assert_eq!(cancelled.status, InvitationStatus::Cancelled);
  assert_eq!(
    cancelled.cancellation_reason.as_deref(),
    Some("plans changed")
  );

  let (approved, _) = approved_invitation(&s, &g, party.party_id).await;
  let cancelled = s
    .cancel_invitation(approved.invitation_id, "plans changed".into())
    .await
    .unwrap();
  assert_eq!(cancelled.status, InvitationStatus::Cancelled);
}

#[tokio::test]
async fn cancel_after_use_fails() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (invitation, pass) = approved_invitation(&s, &g, party.party_id).await;
  g.verify_invitation(
    &pass,
    "12345678-9",
    dt(2025, 1, 1, 12, 0, 0),
    &GateContext::default(),
  )
  .await
  .unwrap();

  let err = s
    .cancel_invitation(invitation.invitation_id, "too late".into())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::InvalidInvitationTransition {
      from: InvitationStatus::Used,
      ..
    })
  ));
}

#[tokio::test]
async fn expire_never_fails_on_advanced_rows() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (invitation, _) = approved_invitation(&s, &g, party.party_id).await;
  let expired = s.expire_invitation(invitation.invitation_id).await.unwrap();
  assert_eq!(expired.status, InvitationStatus::Expired);

  // A second expire finds the row already advanced and just returns it.
  let again = s.expire_invitation(invitation.invitation_id).await.unwrap();
  assert_eq!(again.status, InvitationStatus::Expired);

  let err = s.expire_invitation(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::InvitationNotFound(_))
  ));
}

// ─── Gate: invitation verification ───────────────────────────────────────────

#[tokio::test]
async fn approved_invitation_admits_and_journals() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;
  let now = dt(2025, 1, 1, 12, 0, 0);

  let (invitation, pass) = approved_invitation(&s, &g, party.party_id).await;
  let grant = g
    .verify_invitation(&pass, "12345678-9", now, &GateContext::default())
    .await
    .unwrap();

  assert_eq!(grant.invitation.status, InvitationStatus::Used);
  assert_eq!(grant.invitation.check_in_time, Some(now));
  assert_eq!(grant.visitor.status, VisitorStatus::InProperty);
  assert_eq!(grant.visitor.identity.document_id, "12345678-9");
  assert_eq!(grant.visitor.check_in_time, Some(now));
  assert_eq!(grant.visitor.resident_id, party.party_id);

  let entries = s.latest_entries(vec![], 10).await.unwrap();
  assert_eq!(entries.len(), 1);
  let entry = &entries[0];
  assert_eq!(entry.entry_id, grant.entry_id);
  assert_eq!(entry.method, EntryMethod::Qr);
  assert_eq!(entry.refs.invitation_id, Some(invitation.invitation_id));
  assert_eq!(entry.refs.visitor_id, Some(grant.visitor.visitor_id));
  assert_eq!(entry.refs.resident_id, Some(party.party_id));
  assert_eq!(entry.arrival_time, now);
  assert!(entry.is_open());
}

#[tokio::test]
async fn second_scan_is_rejected_without_a_second_row() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;
  let ctx = GateContext::default();

  let (_, pass) = approved_invitation(&s, &g, party.party_id).await;
  g.verify_invitation(&pass, "12345678-9", dt(2025, 1, 1, 12, 0, 0), &ctx)
    .await
    .unwrap();

  let err = g
    .verify_invitation(&pass, "12345678-9", dt(2025, 1, 1, 12, 5, 0), &ctx)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::AlreadyUsed(_)));
  assert_eq!(ledger_total(&s).await, 1);
}

#[tokio::test]
async fn concurrent_scans_have_one_winner() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;
  let ctx = GateContext::default();
  let now = dt(2025, 1, 1, 12, 0, 0);

  let (_, pass) = approved_invitation(&s, &g, party.party_id).await;
  let (a, b) = tokio::join!(
    g.verify_invitation(&pass, "12345678-9", now, &ctx),
    g.verify_invitation(&pass, "12345678-9", now, &ctx),
  );

  let wins = usize::from(a.is_ok()) + usize::from(b.is_ok());
  assert_eq!(wins, 1);
  let err = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
  assert!(matches!(err, CoreError::AlreadyUsed(_)));
  assert_eq!(ledger_total(&s).await, 1);
}

#[tokio::test]
async fn expired_invitation_is_denied_and_flipped() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (invitation, pass) = approved_invitation(&s, &g, party.party_id).await;
  // Past the Jan 2 midnight expiration.
  let err = g
    .validate_invitation(&pass, None, dt(2025, 1, 3, 8, 0, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvitationExpired(_)));

  // The lazy flip was persisted on observation.
  let reloaded = s
    .get_invitation(invitation.invitation_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(reloaded.status, InvitationStatus::Expired);
  assert_eq!(ledger_total(&s).await, 0);
}

#[tokio::test]
async fn still_valid_at_the_exact_expiration_instant() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (_, pass) = approved_invitation(&s, &g, party.party_id).await;
  let check = g
    .validate_invitation(&pass, None, dt(2025, 1, 2, 0, 0, 0))
    .await
    .unwrap();
  assert_eq!(check.invitation.status, InvitationStatus::Approved);
}

#[tokio::test]
async fn wrong_document_is_denied_without_state_change() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (invitation, pass) = approved_invitation(&s, &g, party.party_id).await;
  let err = g
    .verify_invitation(
      &pass,
      "98765432-1",
      dt(2025, 1, 1, 12, 0, 0),
      &GateContext::default(),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::IdentityMismatch));

  let reloaded = s
    .get_invitation(invitation.invitation_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(reloaded.status, InvitationStatus::Approved);
  assert_eq!(ledger_total(&s).await, 0);
}

#[tokio::test]
async fn tampered_invitation_signature_is_denied() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (_, pass) = approved_invitation(&s, &g, party.party_id).await;
  let mut forged = pass.clone();
  forged.signature = flip_last_char(&forged.signature);

  let err = g
    .validate_invitation(&forged, None, dt(2025, 1, 1, 12, 0, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidSignature));
}

#[tokio::test]
async fn admission_requires_a_presented_document() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let (_, pass) = approved_invitation(&s, &g, party.party_id).await;
  let code = Pass::Invitation(pass).encode().unwrap();
  let err = g
    .admit_code(&code, None, dt(2025, 1, 1, 12, 0, 0), &GateContext::default())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::IdentityMismatch));
}

#[tokio::test]
async fn pending_invitation_has_no_pass() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let pending = s.create_invitation(invite(party.party_id)).await.unwrap();
  let err = g
    .invitation_pass(&pending, dt(2025, 1, 1, 10, 0, 0))
    .unwrap_err();
  assert!(matches!(err, CoreError::InvitationPending(_)));
}

// ─── Gate: resident passes ───────────────────────────────────────────────────

#[tokio::test]
async fn resident_pass_admits_and_journals() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;
  let issued_at = dt(2025, 1, 1, 12, 0, 0);

  let issued = g.issue_resident_pass(party.party_id, issued_at).unwrap();
  let admission = g
    .admit_code(
      &issued.code,
      None,
      issued_at + Duration::minutes(2),
      &GateContext::default(),
    )
    .await
    .unwrap();
  let Admission::Resident(grant) = admission else {
    panic!("expected a resident admission");
  };

  assert_eq!(grant.resident_id, party.party_id);
  assert_eq!(grant.remaining_minutes, 3);
  assert_eq!(
    grant.resident.as_ref().map(|p| p.name.as_str()),
    Some("Marta Vidal")
  );

  let entries = s.latest_entries(vec![], 10).await.unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].method, EntryMethod::Qr);
  assert_eq!(entries[0].refs.resident_id, Some(party.party_id));
  assert!(entries[0].refs.visitor_id.is_none());
}

#[tokio::test]
async fn expired_resident_pass_reports_minutes_ago() {
  let s = store().await;
  let g = gate(&s);
  let now = dt(2025, 1, 1, 12, 0, 0);
  let resident_id = Uuid::new_v4();

  // One millisecond too late still rounds to zero whole minutes.
  let expires_at_ms = now.timestamp_millis() - 1;
  let pass = ResidentPass {
    resident_id,
    expires_at_ms,
    signature: signing_key().sign(&canonical_string(
      resident_id,
      CredentialRole::Resident,
      expires_at_ms,
    )),
  };
  let err = g.validate_resident(&pass, now).await.unwrap_err();
  assert!(matches!(err, CoreError::Expired { expired_minutes_ago: 0 }));

  let expires_at_ms = (now - Duration::minutes(10)).timestamp_millis();
  let pass = ResidentPass {
    resident_id,
    expires_at_ms,
    signature: signing_key().sign(&canonical_string(
      resident_id,
      CredentialRole::Resident,
      expires_at_ms,
    )),
  };
  let err = g.validate_resident(&pass, now).await.unwrap_err();
  assert!(matches!(err, CoreError::Expired { expired_minutes_ago: 10 }));
}

#[tokio::test]
async fn tampered_resident_pass_is_denied() {
  let s = store().await;
  let g = gate(&s);
  let now = dt(2025, 1, 1, 12, 0, 0);

  let issued = g.issue_resident_pass(Uuid::new_v4(), now).unwrap();
  let Pass::Resident(pass) = issued.pass else {
    panic!("expected a resident pass");
  };

  let mut forged = pass.clone();
  forged.signature = flip_last_char(&forged.signature);
  let err = g.validate_resident(&forged, now).await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidSignature));

  // A valid signature over someone else's id is just as forged.
  let mut stolen = pass.clone();
  stolen.resident_id = Uuid::new_v4();
  let err = g.validate_resident(&stolen, now).await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidSignature));
}

#[tokio::test]
async fn unknown_resident_is_still_admitted() {
  let s = store().await;
  let g = gate(&s);
  let now = dt(2025, 1, 1, 12, 0, 0);

  // No directory record exists for this id; the signed pass stands alone.
  let issued = g.issue_resident_pass(Uuid::new_v4(), now).unwrap();
  let Pass::Resident(pass) = issued.pass else {
    panic!("expected a resident pass");
  };
  let grant = g
    .verify_resident(&pass, now, &GateContext::default())
    .await
    .unwrap();
  assert!(grant.resident.is_none());
  assert_eq!(ledger_total(&s).await, 1);
}

#[tokio::test]
async fn garbage_codes_are_malformed() {
  let s = store().await;
  let g = gate(&s);
  let ctx = GateContext::default();
  let now = dt(2025, 1, 1, 12, 0, 0);

  for code in ["not base64 at all!", "aGVsbG8gd29ybGQ=", ""] {
    let err = g.admit_code(code, None, now, &ctx).await.unwrap_err();
    assert!(matches!(err, CoreError::MalformedCredential(_)));
  }
  assert_eq!(ledger_total(&s).await, 0);
}

// ─── Visitors ────────────────────────────────────────────────────────────────

fn walk_in(resident_id: Uuid, auto_approve: bool) -> NewVisitor {
  NewVisitor {
    resident_id,
    identity: Identity {
      name:        "Carla Reyes".into(),
      document_id: "33333333-3".into(),
    },
    scheduled_date: dt(2025, 1, 1, 9, 0, 0),
    visit_purpose: Some("delivery".into()),
    auto_approve,
  }
}

#[tokio::test]
async fn visitor_lifecycle_round_trip() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;
  let ctx = GateContext::default();

  let visitor =
    s.create_visitor(walk_in(party.party_id, false)).await.unwrap();
  assert_eq!(visitor.status, VisitorStatus::Pending);

  let approved = s.approve_visitor(visitor.visitor_id).await.unwrap();
  assert_eq!(approved.status, VisitorStatus::Approved);

  let checked_in_at = dt(2025, 1, 1, 9, 30, 0);
  let (inside, entry) = g
    .check_in_visitor(visitor.visitor_id, checked_in_at, &ctx)
    .await
    .unwrap();
  assert_eq!(inside.status, VisitorStatus::InProperty);
  assert_eq!(inside.check_in_time, Some(checked_in_at));
  assert_eq!(entry.method, EntryMethod::Manual);
  assert_eq!(entry.refs.visitor_id, Some(visitor.visitor_id));

  let err = g
    .check_in_visitor(visitor.visitor_id, checked_in_at, &ctx)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::AlreadyCheckedIn(_)));

  let receipt = g
    .check_out_visitor(visitor.visitor_id, dt(2025, 1, 1, 9, 45, 0))
    .await
    .unwrap();
  assert_eq!(receipt.visitor.status, VisitorStatus::Completed);
  assert_eq!(receipt.duration_minutes, Some(15));
  assert!(!receipt.anomalous);

  let err = g
    .check_out_visitor(visitor.visitor_id, dt(2025, 1, 1, 10, 0, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotCheckedIn(_)));
}

#[tokio::test]
async fn auto_approve_skips_pending() {
  let s = store().await;
  let party = resident(&s).await;
  let visitor = s.create_visitor(walk_in(party.party_id, true)).await.unwrap();
  assert_eq!(visitor.status, VisitorStatus::Approved);
}

#[tokio::test]
async fn check_in_requires_approval() {
  let s = store().await;
  let party = resident(&s).await;
  let visitor =
    s.create_visitor(walk_in(party.party_id, false)).await.unwrap();

  let err = s
    .check_in_visitor(visitor.visitor_id, dt(2025, 1, 1, 9, 30, 0))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::InvalidVisitorTransition {
      from: VisitorStatus::Pending,
      ..
    })
  ));
}

#[tokio::test]
async fn rejected_visitor_is_terminal() {
  let s = store().await;
  let party = resident(&s).await;
  let visitor =
    s.create_visitor(walk_in(party.party_id, false)).await.unwrap();

  let rejected = s.reject_visitor(visitor.visitor_id).await.unwrap();
  assert_eq!(rejected.status, VisitorStatus::Rejected);

  let err = s.approve_visitor(visitor.visitor_id).await.unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::InvalidVisitorTransition {
      from: VisitorStatus::Rejected,
      ..
    })
  ));
}

#[tokio::test]
async fn linked_visitor_already_inside_rolls_the_check_in_back() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  // Rosa is pre-registered and already inside when her invitation is
  // scanned at the gate.
  let visitor = s
    .create_visitor(NewVisitor {
      resident_id: party.party_id,
      identity: Identity {
        name:        "Rosa Fuentes".into(),
        document_id: "12345678-9".into(),
      },
      scheduled_date: dt(2025, 1, 1, 9, 0, 0),
      visit_purpose: None,
      auto_approve: true,
    })
    .await
    .unwrap();
  s.check_in_visitor(visitor.visitor_id, dt(2025, 1, 1, 9, 30, 0))
    .await
    .unwrap();

  let mut input = invite(party.party_id);
  input.visitor_id = Some(visitor.visitor_id);
  let created = s.create_invitation(input).await.unwrap();
  let (_, issued) = g
    .approve_invitation(created.invitation_id, None, dt(2025, 1, 1, 10, 0, 0))
    .await
    .unwrap();
  let Pass::Invitation(pass) = issued.pass else {
    panic!("approval should mint an invitation pass");
  };

  let err = g
    .verify_invitation(
      &pass,
      "12345678-9",
      dt(2025, 1, 1, 12, 0, 0),
      &GateContext::default(),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::AlreadyCheckedIn(_)));

  // The invitation write rolled back along with the visitor refusal.
  let reloaded = s
    .get_invitation(created.invitation_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(reloaded.status, InvitationStatus::Approved);
  assert!(reloaded.check_in_time.is_none());
}

#[tokio::test]
async fn invitation_check_out_closes_the_invitation() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;
  let now = dt(2025, 1, 1, 12, 0, 0);

  let (invitation, pass) = approved_invitation(&s, &g, party.party_id).await;
  let grant = g
    .verify_invitation(&pass, "12345678-9", now, &GateContext::default())
    .await
    .unwrap();

  let receipt = g
    .check_out_visitor(grant.visitor.visitor_id, now + Duration::hours(2))
    .await
    .unwrap();
  assert_eq!(receipt.duration_minutes, Some(120));

  let reloaded = s
    .get_invitation(invitation.invitation_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(reloaded.check_out_time, Some(now + Duration::hours(2)));
}

#[tokio::test]
async fn list_visitors_searches_name_and_document() {
  let s = store().await;
  let party = resident(&s).await;

  s.create_visitor(walk_in(party.party_id, false)).await.unwrap();
  s.create_visitor(NewVisitor {
    resident_id: party.party_id,
    identity: Identity {
      name:        "Ana Soto".into(),
      document_id: "44444444-4".into(),
    },
    scheduled_date: dt(2025, 1, 2, 9, 0, 0),
    visit_purpose: None,
    auto_approve: false,
  })
  .await
  .unwrap();

  let by_name = s
    .list_visitors(&VisitorQuery {
      resident_id:     party.party_id,
      status:          None,
      scheduled_after: None,
      scheduled_until: None,
      search:          Some("carla".into()),
      page:            1,
      limit:           10,
    })
    .await
    .unwrap();
  assert_eq!(by_name.total, 1);
  assert_eq!(by_name.items[0].identity.name, "Carla Reyes");

  let by_document = s
    .list_visitors(&VisitorQuery {
      resident_id:     party.party_id,
      status:          None,
      scheduled_after: None,
      scheduled_until: None,
      search:          Some("4444".into()),
      page:            1,
      limit:           10,
    })
    .await
    .unwrap();
  assert_eq!(by_document.total, 1);
  assert_eq!(by_document.items[0].identity.name, "Ana Soto");
}

// ─── Frequent visitors ───────────────────────────────────────────────────────

fn roster_entry(resident_id: Uuid) -> NewFrequentVisitor {
  NewFrequentVisitor {
    resident_id,
    identity: Identity {
      name:        "Pedro Lamas".into(),
      document_id: "22222222-2".into(),
    },
    vehicle: Some(VehicleInfo {
      license_plate: "ABCD-12".into(),
      brand:         Some("Toyota".into()),
      model:         None,
      color:         None,
    }),
    notes: None,
  }
}

#[tokio::test]
async fn duplicate_roster_entries_are_refused_while_active() {
  let s = store().await;
  let party = resident(&s).await;

  let entry =
    s.add_frequent_visitor(roster_entry(party.party_id)).await.unwrap();
  let err = s
    .add_frequent_visitor(roster_entry(party.party_id))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::DuplicateFrequentVisitor(_))
  ));

  // Deactivation frees the document for re-registration.
  s.deactivate_frequent_visitor(entry.frequent_visitor_id)
    .await
    .unwrap();
  s.add_frequent_visitor(roster_entry(party.party_id)).await.unwrap();
}

#[tokio::test]
async fn roster_invitation_is_pre_approved() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;
  let now = dt(2025, 1, 20, 12, 0, 0);
  let scheduled = dt(2025, 2, 1, 9, 0, 0);

  let entry =
    s.add_frequent_visitor(roster_entry(party.party_id)).await.unwrap();
  let (invitation, issued) = g
    .invite_frequent_visitor(entry.frequent_visitor_id, scheduled, None, None, now)
    .await
    .unwrap();

  assert_eq!(invitation.status, InvitationStatus::Approved);
  assert_eq!(invitation.visitor.document_id, "22222222-2");
  assert_eq!(invitation.scheduled_date, scheduled);
  // Roster invitations default to a full day of validity.
  assert_eq!(invitation.expiration_date, scheduled + Duration::days(1));
  assert_eq!(
    invitation.vehicle.as_ref().map(|v| v.license_plate.as_str()),
    Some("ABCD-12")
  );
  assert!(!issued.code.is_empty());

  let roster = s
    .get_frequent_visitor(entry.frequent_visitor_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(roster.visit_count, 1);
  assert_eq!(roster.last_visit, Some(now));
}

#[tokio::test]
async fn deactivated_roster_entries_cannot_invite() {
  let s = store().await;
  let g = gate(&s);
  let party = resident(&s).await;

  let entry =
    s.add_frequent_visitor(roster_entry(party.party_id)).await.unwrap();
  s.deactivate_frequent_visitor(entry.frequent_visitor_id)
    .await
    .unwrap();

  let err = g
    .invite_frequent_visitor(
      entry.frequent_visitor_id,
      dt(2025, 2, 1, 9, 0, 0),
      None,
      None,
      dt(2025, 1, 20, 12, 0, 0),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InactiveFrequentVisitor(_)));

  let active = s.list_frequent_visitors(party.party_id).await.unwrap();
  assert!(active.is_empty());
}

// ─── Entry ledger ────────────────────────────────────────────────────────────

fn arrival(method: EntryMethod, refs: EntryRefs, at: DateTime<Utc>) -> NewEntry {
  NewEntry { method, refs, arrival_time: at, payload: None, metadata: None }
}

fn resident_refs(resident_id: Uuid) -> EntryRefs {
  EntryRefs { resident_id: Some(resident_id), ..Default::default() }
}

#[tokio::test]
async fn arrivals_require_a_subject() {
  let s = store().await;
  let err = s
    .record_arrival(arrival(
      EntryMethod::Manual,
      EntryRefs::default(),
      dt(2025, 1, 1, 9, 0, 0),
    ))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::EmptyEntryRefs)));
}

#[tokio::test]
async fn arrivals_validate_owned_refs() {
  let s = store().await;
  let refs =
    EntryRefs { visitor_id: Some(Uuid::new_v4()), ..Default::default() };
  let err = s
    .record_arrival(arrival(EntryMethod::Manual, refs, dt(2025, 1, 1, 9, 0, 0)))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::VisitorNotFound(_))));
}

#[tokio::test]
async fn unmatched_departure_is_recorded_as_an_anomaly() {
  let s = store().await;
  let at = dt(2025, 1, 1, 18, 0, 0);

  let outcome = s
    .record_departure(EntrySubject::Visitor(Uuid::new_v4()), at)
    .await
    .unwrap();
  assert!(!outcome.matched);
  assert!(outcome.entry.is_anomalous());
  assert_eq!(outcome.entry.arrival_time, at);
  assert_eq!(outcome.entry.departure_time, Some(at));
  assert_eq!(outcome.entry.duration_minutes(), Some(0));
}

#[tokio::test]
async fn departure_closes_the_most_recent_open_entry() {
  let s = store().await;
  let resident_id = Uuid::new_v4();

  let first = s
    .record_arrival(arrival(
      EntryMethod::Qr,
      resident_refs(resident_id),
      dt(2025, 1, 1, 9, 0, 0),
    ))
    .await
    .unwrap();
  let second = s
    .record_arrival(arrival(
      EntryMethod::Qr,
      resident_refs(resident_id),
      dt(2025, 1, 1, 14, 0, 0),
    ))
    .await
    .unwrap();

  let outcome = s
    .record_departure(
      EntrySubject::Resident(resident_id),
      dt(2025, 1, 1, 15, 0, 0),
    )
    .await
    .unwrap();
  assert!(outcome.matched);
  assert_eq!(outcome.entry.entry_id, second.entry_id);
  assert_eq!(outcome.entry.duration_minutes(), Some(60));

  // The earlier entry is still open.
  let open = s
    .query_entries(&EntryQuery { departed: Some(false), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(open.total, 1);
  assert_eq!(open.items[0].entry_id, first.entry_id);
}

#[tokio::test]
async fn latest_entries_filter_and_order() {
  let s = store().await;

  s.record_arrival(arrival(
    EntryMethod::Qr,
    resident_refs(Uuid::new_v4()),
    dt(2025, 1, 1, 9, 0, 0),
  ))
  .await
  .unwrap();
  let facial = s
    .record_arrival(arrival(
      EntryMethod::Facial,
      resident_refs(Uuid::new_v4()),
      dt(2025, 1, 1, 10, 0, 0),
    ))
    .await
    .unwrap();
  let manual = s
    .record_arrival(arrival(
      EntryMethod::Manual,
      resident_refs(Uuid::new_v4()),
      dt(2025, 1, 1, 11, 0, 0),
    ))
    .await
    .unwrap();

  let latest = s.latest_entries(vec![], 2).await.unwrap();
  assert_eq!(latest.len(), 2);
  assert_eq!(latest[0].entry_id, manual.entry_id);
  assert_eq!(latest[1].entry_id, facial.entry_id);

  let only_facial =
    s.latest_entries(vec![EntryMethod::Facial], 10).await.unwrap();
  assert_eq!(only_facial.len(), 1);
  assert_eq!(only_facial[0].entry_id, facial.entry_id);
}

#[tokio::test]
async fn query_entries_windows_methods_and_pages() {
  let s = store().await;
  for (method, day, hour) in [
    (EntryMethod::Qr, 8, 10),
    (EntryMethod::Manual, 8, 11),
    (EntryMethod::Facial, 9, 10),
    (EntryMethod::Qr, 9, 11),
    (EntryMethod::Lpr, 10, 9),
  ] {
    s.record_arrival(arrival(
      method,
      resident_refs(Uuid::new_v4()),
      dt(2025, 1, day, hour, 0, 0),
    ))
    .await
    .unwrap();
  }

  let jan_9 = s
    .query_entries(&EntryQuery {
      from: Some(dt(2025, 1, 9, 0, 0, 0)),
      until: Some(dt(2025, 1, 9, 23, 59, 59)),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(jan_9.total, 2);
  assert_eq!(jan_9.items[0].method, EntryMethod::Qr);
  assert_eq!(jan_9.items[1].method, EntryMethod::Facial);

  let qr_only = s
    .query_entries(&EntryQuery {
      methods: vec![EntryMethod::Qr],
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(qr_only.total, 2);

  let page_two = s
    .query_entries(&EntryQuery { page: 2, limit: 2, ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page_two.total, 5);
  assert_eq!(page_two.total_pages(), 3);
  assert_eq!(page_two.items.len(), 2);
  assert_eq!(page_two.items[0].method, EntryMethod::Facial);
  assert_eq!(page_two.items[1].method, EntryMethod::Manual);
}

#[tokio::test]
async fn active_entries_track_visitors_on_site() {
  let s = store().await;
  let party = resident(&s).await;

  let visitor = s.create_visitor(walk_in(party.party_id, true)).await.unwrap();
  let refs =
    EntryRefs { visitor_id: Some(visitor.visitor_id), ..Default::default() };
  s.record_arrival(arrival(EntryMethod::Manual, refs, dt(2025, 1, 1, 9, 0, 0)))
    .await
    .unwrap();
  // A resident driving in is not an on-site visitor.
  s.record_arrival(arrival(
    EntryMethod::Lpr,
    resident_refs(party.party_id),
    dt(2025, 1, 1, 9, 5, 0),
  ))
  .await
  .unwrap();

  let active = s.active_entries().await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].refs.visitor_id, Some(visitor.visitor_id));

  s.record_departure(
    EntrySubject::Visitor(visitor.visitor_id),
    dt(2025, 1, 1, 17, 0, 0),
  )
  .await
  .unwrap();
  assert!(s.active_entries().await.unwrap().is_empty());
}

// ─── Reporting ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn entry_stats_bucket_by_window() {
  let s = store().await;
  let party = resident(&s).await;
  let now = dt(2025, 1, 10, 12, 0, 0);

  let visitor = s.create_visitor(walk_in(party.party_id, true)).await.unwrap();
  let visitor_refs =
    EntryRefs { visitor_id: Some(visitor.visitor_id), ..Default::default() };

  s.record_arrival(arrival(
    EntryMethod::Qr,
    resident_refs(party.party_id),
    dt(2025, 1, 10, 9, 0, 0),
  ))
  .await
  .unwrap();
  s.record_arrival(arrival(
    EntryMethod::Manual,
    visitor_refs,
    dt(2025, 1, 10, 11, 0, 0),
  ))
  .await
  .unwrap();
  s.record_arrival(arrival(
    EntryMethod::Facial,
    resident_refs(party.party_id),
    dt(2025, 1, 7, 10, 0, 0),
  ))
  .await
  .unwrap();
  // Outside the trailing week entirely.
  s.record_arrival(arrival(
    EntryMethod::Lpr,
    resident_refs(party.party_id),
    dt(2024, 12, 30, 10, 0, 0),
  ))
  .await
  .unwrap();

  let stats = s.entry_stats(now).await.unwrap();
  assert_eq!(stats.today.qr, 1);
  assert_eq!(stats.today.manual, 1);
  assert_eq!(stats.today.total, 2);
  assert_eq!(stats.week.qr, 1);
  assert_eq!(stats.week.manual, 1);
  assert_eq!(stats.week.facial, 1);
  assert_eq!(stats.week.lpr, 0);
  assert_eq!(stats.week.total, 3);
  assert_eq!(stats.active_visitors, 1);
}

#[tokio::test]
async fn invitation_stats_apply_effective_status() {
  let s = store().await;
  let party = resident(&s).await;
  let now = dt(2025, 1, 10, 12, 0, 0);

  // Pending, scheduled today.
  let mut pending = invite(party.party_id);
  pending.scheduled_date = dt(2025, 1, 10, 9, 0, 0);
  pending.expiration_date = Some(dt(2025, 1, 11, 0, 0, 0));
  s.create_invitation(pending).await.unwrap();

  // Approved, upcoming.
  let mut upcoming = invite(party.party_id);
  upcoming.scheduled_date = dt(2025, 1, 12, 9, 0, 0);
  upcoming.expiration_date = Some(dt(2025, 1, 13, 0, 0, 0));
  let upcoming = s.create_invitation(upcoming).await.unwrap();
  s.approve_invitation(upcoming.invitation_id, 0, "sig-a".into(), None)
    .await
    .unwrap();

  // Approved but past expiration: reads as expired everywhere.
  let mut stale = invite(party.party_id);
  stale.scheduled_date = dt(2025, 1, 5, 9, 0, 0);
  stale.expiration_date = Some(dt(2025, 1, 6, 0, 0, 0));
  let stale = s.create_invitation(stale).await.unwrap();
  s.approve_invitation(stale.invitation_id, 0, "sig-b".into(), None)
    .await
    .unwrap();

  // Used.
  let mut used = invite(party.party_id);
  used.scheduled_date = dt(2025, 1, 9, 9, 0, 0);
  used.expiration_date = Some(dt(2025, 1, 11, 0, 0, 0));
  let used = s.create_invitation(used).await.unwrap();
  s.approve_invitation(used.invitation_id, 0, "sig-c".into(), None)
    .await
    .unwrap();
  s.check_in_invitation(used.invitation_id, now).await.unwrap();

  let stats = s.invitation_stats(party.party_id, now).await.unwrap();
  assert_eq!(stats.total, 4);
  assert_eq!(stats.pending, 1);
  assert_eq!(stats.approved, 1);
  assert_eq!(stats.expired, 1);
  assert_eq!(stats.used, 1);
  assert_eq!(stats.rejected, 0);
  assert_eq!(stats.cancelled, 0);
  assert_eq!(stats.today, 1);
  assert_eq!(stats.upcoming, 1);

  // The list filters agree with the stats buckets.
  let approved_page = s
    .list_invitations(
      &InvitationQuery {
        resident_id: party.party_id,
        status:      Some(InvitationStatus::Approved),
        page:        1,
        limit:       10,
      },
      now,
    )
    .await
    .unwrap();
  assert_eq!(approved_page.total, 1);
  assert_eq!(approved_page.items[0].invitation_id, upcoming.invitation_id);

  let expired_page = s
    .list_invitations(
      &InvitationQuery {
        resident_id: party.party_id,
        status:      Some(InvitationStatus::Expired),
        page:        1,
        limit:       10,
      },
      now,
    )
    .await
    .unwrap();
  assert_eq!(expired_page.total, 1);
  assert_eq!(expired_page.items[0].invitation_id, stale.invitation_id);
}
