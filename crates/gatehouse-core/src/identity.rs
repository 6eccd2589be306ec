//! The human identity a visitor presents at the gate.

use serde::{Deserialize, Serialize};

/// Name plus identity-document number. The document number is what a guard
/// compares against a physical ID; it is the authoritative identity field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub name:        String,
  pub document_id: String,
}

/// Vehicle details attached to an invitation or roster entry. Informational
/// only; plate recognition happens outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
  pub license_plate: String,
  pub brand:         Option<String>,
  pub model:         Option<String>,
  pub color:         Option<String>,
}
