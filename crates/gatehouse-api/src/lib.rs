//! JSON REST API for Gatehouse.
//!
//! Exposes an axum [`Router`] backed by any
//! [`gatehouse_core::store::AccessStore`] that also implements
//! [`gatehouse_core::directory::Directory`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", gatehouse_api::api_router(ApiState::new(store, key, ttl)))
//! ```

pub mod entries;
pub mod error;
pub mod frequent;
pub mod invitations;
pub mod parties;
pub mod passes;
pub mod visitors;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use chrono::Duration;
use gatehouse_core::{
  directory::Directory,
  gate::Gate,
  signature::SigningKey,
  store::{AccessStore, Page},
};
use serde::Serialize;

pub use error::ApiError;

/// Shared handler state: the backing store plus the credential gate built
/// over it.
pub struct ApiState<S> {
  pub store: Arc<S>,
  pub gate:  Arc<Gate<S>>,
}

impl<S> ApiState<S>
where
  S: AccessStore + Directory,
{
  /// Builds the state for `store`, minting and verifying credentials with
  /// `key` and issuing resident passes valid for `pass_ttl`.
  pub fn new(store: Arc<S>, key: SigningKey, pass_ttl: Duration) -> Self {
    let gate = Arc::new(Gate::new(Arc::clone(&store), key, pass_ttl));
    ApiState { store, gate }
  }
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    ApiState {
      store: Arc::clone(&self.store),
      gate:  Arc::clone(&self.gate),
    }
  }
}

/// One page of response items plus pagination bookkeeping.
#[derive(Debug, Serialize)]
pub struct PageBody<T> {
  pub items:       Vec<T>,
  pub total:       u64,
  pub page:        u64,
  pub limit:       u64,
  pub total_pages: u64,
}

impl<T> From<Page<T>> for PageBody<T> {
  fn from(page: Page<T>) -> Self {
    let total_pages = page.total_pages();
    PageBody {
      items: page.items,
      total: page.total,
      page: page.page,
      limit: page.limit,
      total_pages,
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: AccessStore + Directory + Clone + Send + Sync + 'static,
{
  Router::new()
    // Passes
    .route("/passes/resident", post(passes::issue_resident::<S>))
    .route("/passes/validate", post(passes::validate::<S>))
    .route("/passes/check-in", post(passes::check_in::<S>))
    // Invitations
    .route(
      "/invitations",
      get(invitations::list::<S>).post(invitations::create::<S>),
    )
    .route("/invitations/stats", get(invitations::stats::<S>))
    .route("/invitations/{id}", get(invitations::get_one::<S>))
    .route("/invitations/{id}/approve", post(invitations::approve::<S>))
    .route("/invitations/{id}/reject", post(invitations::reject::<S>))
    .route("/invitations/{id}/cancel", post(invitations::cancel::<S>))
    // Visitors
    .route("/visitors", get(visitors::list::<S>).post(visitors::create::<S>))
    .route("/visitors/{id}", get(visitors::get_one::<S>))
    .route("/visitors/{id}/approve", post(visitors::approve::<S>))
    .route("/visitors/{id}/reject", post(visitors::reject::<S>))
    .route("/visitors/{id}/check-in", post(visitors::check_in::<S>))
    .route("/visitors/{id}/check-out", post(visitors::check_out::<S>))
    // Frequent-visitor roster
    .route(
      "/frequent-visitors",
      get(frequent::list::<S>).post(frequent::create::<S>),
    )
    .route("/frequent-visitors/{id}", delete(frequent::deactivate::<S>))
    .route("/frequent-visitors/{id}/invite", post(frequent::invite::<S>))
    // Entry ledger
    .route("/entry-logs", get(entries::list::<S>).post(entries::create::<S>))
    .route("/entry-logs/departure", post(entries::departure::<S>))
    .route("/entry-logs/latest", get(entries::latest::<S>))
    .route("/entry-logs/active", get(entries::active::<S>))
    .route("/entry-logs/stats", get(entries::stats::<S>))
    // Directory
    .route("/parties", get(parties::list::<S>).post(parties::create::<S>))
    .route("/parties/{id}", get(parties::get_one::<S>))
    .with_state(state)
}
