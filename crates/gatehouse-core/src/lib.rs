//! Core types and trait definitions for the Gatehouse access-control
//! system: pass signing and verification, the invitation/visitor state
//! machine, and the entry ledger contract.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod credential;
pub mod directory;
pub mod entry;
pub mod error;
pub mod frequent;
pub mod gate;
pub mod identity;
pub mod invitation;
pub mod signature;
pub mod store;
pub mod visitor;

pub use error::{Error, Result};
