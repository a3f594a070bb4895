use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invledger_auth::Actor;
use invledger_core::{DomainError, DomainResult, LogEntryId, ProductId};

use crate::product::StockAdjusted;

/// Kind of stock movement recorded in the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Increase,
    Decrease,
    Add,
    Remove,
    /// Stock moved out of this product's location.
    Transfer,
    /// Absolute stock level set by an admin/staff member.
    UpdateProductNumberOfStocks,
}

/// Direction implied by an action name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::Increase,
        ActionType::Decrease,
        ActionType::Add,
        ActionType::Remove,
        ActionType::Transfer,
        ActionType::UpdateProductNumberOfStocks,
    ];

    /// Direction carried by the action name; `None` for absolute sets, whose
    /// direction comes from the computed delta.
    pub fn direction(self) -> Option<Direction> {
        match self {
            ActionType::Increase | ActionType::Add => Some(Direction::Up),
            ActionType::Decrease | ActionType::Remove | ActionType::Transfer => Some(Direction::Down),
            ActionType::UpdateProductNumberOfStocks => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Increase => "INCREASE",
            ActionType::Decrease => "DECREASE",
            ActionType::Add => "ADD",
            ActionType::Remove => "REMOVE",
            ActionType::Transfer => "TRANSFER",
            ActionType::UpdateProductNumberOfStocks => "UPDATE_PRODUCT_NUMBER_OF_STOCKS",
        }
    }
}

impl core::fmt::Display for ActionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        ActionType::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown action type '{s}'")))
    }
}

/// Immutable ledger entry.
///
/// `quantity` is the signed delta applied to the product's stock. Entries are
/// never updated or deleted; `sequence` is assigned by the store at insert and
/// breaks ties between entries sharing a `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLogEntry {
    pub id: LogEntryId,
    pub product_id: ProductId,
    pub actor: Actor,
    pub action: ActionType,
    pub quantity: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl InventoryLogEntry {
    /// Display/legacy form of the signed delta (`"-15"`, `"5"`).
    pub fn quantity_display(&self) -> String {
        format_quantity(self.quantity)
    }

    /// Whether this entry added stock. Used to read the opening balance.
    pub fn denotes_increase(&self) -> bool {
        match self.action.direction() {
            Some(Direction::Up) => true,
            Some(Direction::Down) => false,
            None => self.quantity > 0,
        }
    }

    /// Replay ordering key.
    pub fn replay_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

/// An entry ready to be appended (not yet assigned a sequence number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub id: LogEntryId,
    pub product_id: ProductId,
    pub actor: Actor,
    pub action: ActionType,
    pub quantity: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl NewLogEntry {
    /// Describe a decided stock adjustment as a ledger entry.
    pub fn from_adjustment(event: &StockAdjusted) -> Self {
        Self {
            id: LogEntryId::new(),
            product_id: event.product_id,
            actor: event.actor,
            action: event.action,
            quantity: event.delta,
            note: event.note.clone(),
            created_at: event.occurred_at,
            old_value: Some(event.previous_level.to_string()),
            new_value: Some(event.new_level.to_string()),
        }
    }

    /// Materialize with a store-assigned sequence number.
    pub fn into_entry(self, sequence: u64) -> InventoryLogEntry {
        InventoryLogEntry {
            id: self.id,
            product_id: self.product_id,
            actor: self.actor,
            action: self.action,
            quantity: self.quantity,
            note: self.note,
            created_at: self.created_at,
            sequence,
            old_value: self.old_value,
            new_value: self.new_value,
        }
    }
}

pub fn format_quantity(delta: i64) -> String {
    delta.to_string()
}

/// Parse the legacy string quantity column (`"+5"`, `"-15"`, `"7"`) into the
/// signed integer representation.
pub fn parse_legacy_quantity(raw: &str) -> DomainResult<i64> {
    let trimmed = raw.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    unsigned
        .parse::<i64>()
        .map_err(|_| DomainError::invalid_quantity(format!("'{trimmed}' is not a signed integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use invledger_core::AdminId;

    fn entry(action: ActionType, quantity: i64) -> InventoryLogEntry {
        InventoryLogEntry {
            id: LogEntryId::new(),
            product_id: ProductId::new(),
            actor: Actor::Admin(AdminId::new()),
            action,
            quantity,
            note: None,
            created_at: Utc::now(),
            sequence: 1,
            old_value: None,
            new_value: None,
        }
    }

    #[test]
    fn legacy_quantities_parse_with_sign() {
        assert_eq!(parse_legacy_quantity("+5").unwrap(), 5);
        assert_eq!(parse_legacy_quantity("-15").unwrap(), -15);
        assert_eq!(parse_legacy_quantity(" 7 ").unwrap(), 7);
        assert!(matches!(
            parse_legacy_quantity("1.5"),
            Err(DomainError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn decrease_displays_negative_quantity() {
        assert_eq!(entry(ActionType::Decrease, -15).quantity_display(), "-15");
    }

    #[test]
    fn increase_detection_uses_action_then_sign() {
        assert!(entry(ActionType::Add, 3).denotes_increase());
        assert!(!entry(ActionType::Transfer, -3).denotes_increase());
        assert!(entry(ActionType::UpdateProductNumberOfStocks, 4).denotes_increase());
        assert!(!entry(ActionType::UpdateProductNumberOfStocks, -4).denotes_increase());
    }

    #[test]
    fn action_type_parses_wire_names() {
        assert_eq!("remove".parse::<ActionType>().unwrap(), ActionType::Remove);
        assert_eq!(
            "UPDATE_PRODUCT_NUMBER_OF_STOCKS".parse::<ActionType>().unwrap(),
            ActionType::UpdateProductNumberOfStocks
        );
        assert!("RESTOCK".parse::<ActionType>().is_err());
        assert_eq!(serde_json::to_value(ActionType::Transfer).unwrap(), "TRANSFER");
    }
}
