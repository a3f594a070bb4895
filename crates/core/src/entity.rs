//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Categories and staff members are entities: they are looked up by id and their
/// relations feed the access scoper, but they carry no ledger of their own.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
