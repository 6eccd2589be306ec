//! The `AccessStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `gatehouse-store-sqlite`). Higher layers (`gatehouse-api`,
//! `gatehouse-server`) depend on this abstraction, not on any concrete
//! backend.
//!
//! Every state-machine transition is a compare-and-swap: the expected source
//! state is part of the write, the write happens inside one consistency
//! boundary, and a miss is classified into the domain error for the state
//! actually found. Two guards scanning the same invitation concurrently get
//! exactly one winner.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  directory::{NewParty, Party, PartyRole},
  entry::{
    DepartureOutcome, EntryLogEntry, EntryMethod, EntryStats, EntrySubject,
    NewEntry,
  },
  frequent::{FrequentVisitor, NewFrequentVisitor},
  invitation::{Invitation, InvitationStats, InvitationStatus, NewInvitation},
  visitor::{NewVisitor, Visitor, VisitorStatus},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Hard caps on read sizes, matching the reporting endpoints' contracts.
pub const MAX_LATEST_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;
pub const MAX_ACTIVE_LIMIT: u64 = 200;

/// One page of results plus enough to render pagination controls.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: u64,
  /// 1-based.
  pub page:  u64,
  pub limit: u64,
}

impl<T> Page<T> {
  pub fn total_pages(&self) -> u64 {
    self.total.div_ceil(self.limit.max(1))
  }
}

/// Parameters for [`AccessStore::list_invitations`].
#[derive(Debug, Clone)]
pub struct InvitationQuery {
  pub resident_id: Uuid,
  /// Filter on effective status (lazy expiry applied before filtering).
  pub status:      Option<InvitationStatus>,
  pub page:        u64,
  pub limit:       u64,
}

impl InvitationQuery {
  pub fn capped_limit(&self) -> u64 { self.limit.clamp(1, MAX_PAGE_LIMIT) }
}

/// Parameters for [`AccessStore::list_visitors`].
#[derive(Debug, Clone)]
pub struct VisitorQuery {
  pub resident_id:     Uuid,
  pub status:          Option<VisitorStatus>,
  pub scheduled_after: Option<DateTime<Utc>>,
  pub scheduled_until: Option<DateTime<Utc>>,
  /// Substring match over name and document number.
  pub search:          Option<String>,
  pub page:            u64,
  pub limit:           u64,
}

impl VisitorQuery {
  pub fn capped_limit(&self) -> u64 { self.limit.clamp(1, MAX_PAGE_LIMIT) }
}

/// Parameters for [`AccessStore::query_entries`].
#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
  /// Empty means every method.
  pub methods:  Vec<EntryMethod>,
  pub from:     Option<DateTime<Utc>>,
  pub until:    Option<DateTime<Utc>>,
  /// `Some(true)` = departed only, `Some(false)` = still open only.
  pub departed: Option<bool>,
  /// 1-based; 0 is treated as 1.
  pub page:     u64,
  pub limit:    u64,
}

impl EntryQuery {
  pub fn capped_limit(&self) -> u64 { self.limit.clamp(1, MAX_PAGE_LIMIT) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the persistent state the gate operates on: directory
/// parties, invitations, visitors, the frequent-visitor roster, and the
/// entry ledger.
///
/// The associated error must surface domain failures losslessly via
/// `Into<crate::Error>`; backends wrap their infrastructure errors in
/// [`crate::Error::Storage`] through that conversion.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AccessStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  // ── Directory parties ─────────────────────────────────────────────────

  fn add_party(
    &self,
    input: NewParty,
  ) -> impl Future<Output = Result<Party, Self::Error>> + Send + '_;

  fn get_party(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Party>, Self::Error>> + Send + '_;

  fn list_parties(
    &self,
    role: Option<PartyRole>,
  ) -> impl Future<Output = Result<Vec<Party>, Self::Error>> + Send + '_;

  // ── Invitations ───────────────────────────────────────────────────────

  /// Create a `Pending` invitation. The resident must exist.
  fn create_invitation(
    &self,
    input: NewInvitation,
  ) -> impl Future<Output = Result<Invitation, Self::Error>> + Send + '_;

  fn get_invitation(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Invitation>, Self::Error>> + Send + '_;

  /// `Pending → Approved`. Stores the pass signature and issuance time
  /// computed by the caller (the gate holds the key, not the store).
  fn approve_invitation(
    &self,
    id: Uuid,
    issued_at_ms: i64,
    signature: String,
    notes: Option<String>,
  ) -> impl Future<Output = Result<Invitation, Self::Error>> + Send + '_;

  /// `Pending → Rejected`.
  fn reject_invitation(
    &self,
    id: Uuid,
    reason: String,
  ) -> impl Future<Output = Result<Invitation, Self::Error>> + Send + '_;

  /// `{Pending, Approved} → Cancelled`.
  fn cancel_invitation(
    &self,
    id: Uuid,
    reason: String,
  ) -> impl Future<Output = Result<Invitation, Self::Error>> + Send + '_;

  /// Persist the lazy `Approved → Expired` flip. Never an error if someone
  /// else advanced the row first; returns the row as it now stands.
  fn expire_invitation(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Invitation, Self::Error>> + Send + '_;

  /// `Approved → Used`, atomically: sets `check_in_time`, creates or links
  /// the visitor record in `InProperty`. At most one caller ever succeeds
  /// per invitation; losers get the status-specific error for the state
  /// they found.
  fn check_in_invitation(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<(Invitation, Visitor), Self::Error>>
  + Send
  + '_;

  fn list_invitations<'a>(
    &'a self,
    query: &'a InvitationQuery,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Page<Invitation>, Self::Error>> + Send + 'a;

  fn invitation_stats(
    &self,
    resident_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<InvitationStats, Self::Error>> + Send + '_;

  // ── Visitors ──────────────────────────────────────────────────────────

  fn create_visitor(
    &self,
    input: NewVisitor,
  ) -> impl Future<Output = Result<Visitor, Self::Error>> + Send + '_;

  fn get_visitor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Visitor>, Self::Error>> + Send + '_;

  /// `Pending → Approved`.
  fn approve_visitor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Visitor, Self::Error>> + Send + '_;

  /// `{Pending, Approved} → Rejected`.
  fn reject_visitor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Visitor, Self::Error>> + Send + '_;

  /// `Approved → InProperty`. A second call fails `AlreadyCheckedIn` and
  /// never overwrites `check_in_time`.
  fn check_in_visitor(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Visitor, Self::Error>> + Send + '_;

  /// `InProperty → Completed`; anything else fails `NotCheckedIn`. Also
  /// closes the linked invitation's `check_out_time`, if one points here.
  fn check_out_visitor(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Visitor, Self::Error>> + Send + '_;

  fn list_visitors<'a>(
    &'a self,
    query: &'a VisitorQuery,
  ) -> impl Future<Output = Result<Page<Visitor>, Self::Error>> + Send + 'a;

  // ── Frequent-visitor roster ───────────────────────────────────────────

  fn add_frequent_visitor(
    &self,
    input: NewFrequentVisitor,
  ) -> impl Future<Output = Result<FrequentVisitor, Self::Error>> + Send + '_;

  fn get_frequent_visitor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<FrequentVisitor>, Self::Error>>
  + Send
  + '_;

  /// Active entries for one resident, most recent visit first.
  fn list_frequent_visitors(
    &self,
    resident_id: Uuid,
  ) -> impl Future<Output = Result<Vec<FrequentVisitor>, Self::Error>>
  + Send
  + '_;

  /// Soft removal; history stays.
  fn deactivate_frequent_visitor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<FrequentVisitor, Self::Error>> + Send + '_;

  /// Bump `visit_count` and `last_visit` after minting an invitation.
  fn record_frequent_visit(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<FrequentVisitor, Self::Error>> + Send + '_;

  // ── Entry ledger ──────────────────────────────────────────────────────

  /// Pure append. The only validation is referential sanity: at least one
  /// subject ref must be present.
  fn record_arrival(
    &self,
    input: NewEntry,
  ) -> impl Future<Output = Result<EntryLogEntry, Self::Error>> + Send + '_;

  /// Close the subject's most recent open entry. When none exists, append
  /// a departure-only row flagged as an anomaly instead of failing: every
  /// departure leaves an audit trace.
  fn record_departure(
    &self,
    subject: EntrySubject,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<DepartureOutcome, Self::Error>> + Send + '_;

  /// Newest entries first, optionally restricted by method.
  /// `limit` is capped at [`MAX_LATEST_LIMIT`].
  fn latest_entries(
    &self,
    methods: Vec<EntryMethod>,
    limit: u64,
  ) -> impl Future<Output = Result<Vec<EntryLogEntry>, Self::Error>> + Send + '_;

  fn query_entries<'a>(
    &'a self,
    query: &'a EntryQuery,
  ) -> impl Future<Output = Result<Page<EntryLogEntry>, Self::Error>> + Send + 'a;

  /// Open visitor entries — who is on-site right now. Capped at
  /// [`MAX_ACTIVE_LIMIT`].
  fn active_entries(
    &self,
  ) -> impl Future<Output = Result<Vec<EntryLogEntry>, Self::Error>> + Send + '_;

  fn entry_stats(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<EntryStats, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn page_math() {
    let page = Page::<u8> { items: vec![], total: 101, page: 1, limit: 20 };
    assert_eq!(page.total_pages(), 6);
    let exact = Page::<u8> { items: vec![], total: 100, page: 1, limit: 20 };
    assert_eq!(exact.total_pages(), 5);
    let empty = Page::<u8> { items: vec![], total: 0, page: 1, limit: 20 };
    assert_eq!(empty.total_pages(), 0);
  }

  #[test]
  fn limits_are_capped() {
    let q = EntryQuery { limit: 10_000, ..Default::default() };
    assert_eq!(q.capped_limit(), MAX_PAGE_LIMIT);
    let q = EntryQuery { limit: 0, ..Default::default() };
    assert_eq!(q.capped_limit(), 1);
  }
}
