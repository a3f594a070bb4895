//! `invledger-auth`: identity and access scoping for the inventory ledger.
//!
//! Pure policy: no IO, no storage, no HTTP. Identity is resolved upstream and
//! handed in as a [`Principal`]; scope relations are handed in as plain views.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod scope;

pub use authorize::{AuthzError, authorize};
pub use permissions::Permission;
pub use principal::{Actor, Principal};
pub use roles::Role;
pub use scope::{AccessDecision, AccessPolicy, DenialReason, ProductScope, StaffScope, StaffScopeMode};
