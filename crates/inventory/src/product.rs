use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invledger_auth::{Actor, ProductScope};
use invledger_core::{
    AdminId, Aggregate, AggregateRoot, CategoryId, DomainError, DomainResult, ProductId, Quantity,
    StaffId,
};
use invledger_events::Event;

use crate::log_entry::{ActionType, Direction};

/// Threshold applied when a product is created without one.
pub const DEFAULT_THRESHOLD: i64 = 10;

/// Derived stock status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    Good,
    Critical,
}

impl StockStatus {
    /// `Critical` iff stock is at or below the threshold.
    pub fn derive(stock: i64, threshold: i64) -> Self {
        if stock <= threshold {
            StockStatus::Critical
        } else {
            StockStatus::Good
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::Good => "GOOD",
            StockStatus::Critical => "CRITICAL",
        }
    }
}

/// Input for product creation (admin action).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category_id: CategoryId,
    pub admin_id: AdminId,
    pub initial_stock: i64,
    pub threshold: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Stored form of a product, as loaded by a store.
///
/// `status` is not part of the record; it is recomputed on load so a stale
/// column can never break the status invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    pub admin_id: AdminId,
    pub number_of_stocks: i64,
    pub threshold: i64,
    pub assignees: BTreeSet<StaffId>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate root: Product.
///
/// Holds the current stock level of one product. Every change of
/// `number_of_stocks` is decided here and described by a [`StockAdjusted`]
/// event, which the infrastructure layer turns into exactly one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    id: ProductId,
    name: String,
    category_id: CategoryId,
    /// Owner of the category, denormalized for scoping.
    admin_id: AdminId,
    number_of_stocks: i64,
    threshold: i64,
    status: StockStatus,
    assignees: BTreeSet<StaffId>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Product {
    /// Create a product. A positive opening stock is returned as an `ADD`
    /// adjustment authored by the admin so that replaying the ledger from zero
    /// matches the stored level.
    pub fn create(new: NewProduct) -> DomainResult<(Self, Option<StockAdjusted>)> {
        if new.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if new.initial_stock < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "initial stock must be non-negative, got {}",
                new.initial_stock
            )));
        }
        let threshold = new.threshold.unwrap_or(DEFAULT_THRESHOLD);
        if threshold < 0 {
            return Err(DomainError::validation(format!(
                "threshold must be non-negative, got {threshold}"
            )));
        }

        let id = ProductId::new();
        let product = Self {
            id,
            name: new.name.trim().to_string(),
            category_id: new.category_id,
            admin_id: new.admin_id,
            number_of_stocks: new.initial_stock,
            threshold,
            status: StockStatus::derive(new.initial_stock, threshold),
            assignees: BTreeSet::new(),
            version: 0,
            created_at: new.occurred_at,
            updated_at: new.occurred_at,
        };

        let opening = (new.initial_stock > 0).then(|| StockAdjusted {
            product_id: id,
            actor: Actor::Admin(new.admin_id),
            action: ActionType::Add,
            delta: new.initial_stock,
            previous_level: 0,
            new_level: new.initial_stock,
            previous_status: StockStatus::derive(0, threshold),
            new_status: product.status,
            note: Some("opening stock".to_string()),
            occurred_at: new.occurred_at,
        });

        Ok((product, opening))
    }

    pub fn from_record(record: ProductRecord) -> Self {
        Self {
            status: StockStatus::derive(record.number_of_stocks, record.threshold),
            id: record.id,
            name: record.name,
            category_id: record.category_id,
            admin_id: record.admin_id,
            number_of_stocks: record.number_of_stocks,
            threshold: record.threshold,
            assignees: record.assignees,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn to_record(&self) -> ProductRecord {
        ProductRecord {
            id: self.id,
            name: self.name.clone(),
            category_id: self.category_id,
            admin_id: self.admin_id,
            number_of_stocks: self.number_of_stocks,
            threshold: self.threshold,
            assignees: self.assignees.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    pub fn admin_id(&self) -> AdminId {
        self.admin_id
    }

    pub fn number_of_stocks(&self) -> i64 {
        self.number_of_stocks
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn status(&self) -> StockStatus {
        self.status
    }

    pub fn assignees(&self) -> &BTreeSet<StaffId> {
        &self.assignees
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_below_threshold(&self) -> bool {
        self.status == StockStatus::Critical
    }

    pub fn scope(&self) -> ProductScope<'_> {
        ProductScope {
            product_id: self.id,
            category_id: self.category_id,
            owner_admin: self.admin_id,
            assignees: &self.assignees,
        }
    }

    /// Returns `false` when the staff member was already assigned.
    ///
    /// A change bumps the version so a concurrent stock commit holding the old
    /// assignee set is rejected instead of overwriting it.
    pub fn assign(&mut self, staff: StaffId) -> bool {
        let changed = self.assignees.insert(staff);
        if changed {
            self.version += 1;
        }
        changed
    }

    /// Returns `false` when the staff member was not assigned.
    pub fn unassign(&mut self, staff: StaffId) -> bool {
        let changed = self.assignees.remove(&staff);
        if changed {
            self.version += 1;
        }
        changed
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: relative stock change whose direction is carried by the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub actor: Actor,
    pub action: ActionType,
    pub quantity: Quantity,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AdjustStock {
    /// Map a signed delta onto INCREASE/DECREASE. Zero is rejected.
    pub fn from_delta(
        actor: Actor,
        delta: i64,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let action = if delta > 0 {
            ActionType::Increase
        } else {
            ActionType::Decrease
        };
        let magnitude = delta
            .checked_abs()
            .ok_or_else(|| DomainError::invalid_quantity(format!("delta {delta} out of range")))?;
        Ok(Self {
            actor,
            action,
            quantity: Quantity::new(magnitude)?,
            note,
            occurred_at,
        })
    }
}

/// Command: absolute stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStockLevel {
    pub actor: Actor,
    pub new_level: i64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeThreshold {
    pub threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    Adjust(AdjustStock),
    SetLevel(SetStockLevel),
    ChangeThreshold(ChangeThreshold),
}

/// Event: the stock level changed. Maps 1:1 onto a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub product_id: ProductId,
    pub actor: Actor,
    pub action: ActionType,
    /// Signed change (never zero).
    pub delta: i64,
    pub previous_level: i64,
    pub new_level: i64,
    pub previous_status: StockStatus,
    pub new_status: StockStatus,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdChanged {
    pub product_id: ProductId,
    pub previous_threshold: i64,
    pub new_threshold: i64,
    pub previous_status: StockStatus,
    pub new_status: StockStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    StockAdjusted(StockAdjusted),
    ThresholdChanged(ThresholdChanged),
}

impl StockEvent {
    fn statuses(&self) -> (StockStatus, StockStatus) {
        match self {
            StockEvent::StockAdjusted(e) => (e.previous_status, e.new_status),
            StockEvent::ThresholdChanged(e) => (e.previous_status, e.new_status),
        }
    }

    /// GOOD → CRITICAL transition (the only one that notifies).
    pub fn crossed_threshold(&self) -> bool {
        self.statuses() == (StockStatus::Good, StockStatus::Critical)
    }

    pub fn as_adjustment(&self) -> Option<&StockAdjusted> {
        match self {
            StockEvent::StockAdjusted(e) => Some(e),
            StockEvent::ThresholdChanged(_) => None,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockAdjusted(_) => "inventory.product.stock_adjusted",
            StockEvent::ThresholdChanged(_) => "inventory.product.threshold_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockAdjusted(e) => e.occurred_at,
            StockEvent::ThresholdChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::StockAdjusted(e) => {
                self.number_of_stocks = e.new_level;
                self.updated_at = e.occurred_at;
            }
            StockEvent::ThresholdChanged(e) => {
                self.threshold = e.new_threshold;
                self.updated_at = e.occurred_at;
            }
        }
        self.status = StockStatus::derive(self.number_of_stocks, self.threshold);

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::Adjust(cmd) => self.handle_adjust(cmd),
            StockCommand::SetLevel(cmd) => self.handle_set_level(cmd),
            StockCommand::ChangeThreshold(cmd) => self.handle_change_threshold(cmd),
        }
    }
}

impl Product {
    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockEvent>, DomainError> {
        let quantity = cmd.quantity.get();
        let delta = match cmd.action.direction() {
            Some(Direction::Up) => quantity,
            Some(Direction::Down) => -quantity,
            None => {
                return Err(DomainError::validation(format!(
                    "{} is an absolute set, not an adjustment",
                    cmd.action
                )));
            }
        };
        let new_level = self.number_of_stocks.checked_add(delta).ok_or_else(|| {
            DomainError::invalid_quantity(format!("stock level overflow adding {delta}"))
        })?;
        if new_level < 0 {
            return Err(DomainError::InsufficientStock {
                available: self.number_of_stocks,
                requested: quantity,
            });
        }
        Ok(vec![self.adjusted(cmd.actor, cmd.action, delta, &cmd.note, cmd.occurred_at)])
    }

    fn handle_set_level(&self, cmd: &SetStockLevel) -> Result<Vec<StockEvent>, DomainError> {
        if cmd.new_level < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "stock level must be non-negative, got {}",
                cmd.new_level
            )));
        }
        let delta = cmd.new_level - self.number_of_stocks;
        if delta == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![self.adjusted(
            cmd.actor,
            ActionType::UpdateProductNumberOfStocks,
            delta,
            &cmd.note,
            cmd.occurred_at,
        )])
    }

    fn handle_change_threshold(&self, cmd: &ChangeThreshold) -> Result<Vec<StockEvent>, DomainError> {
        if cmd.threshold < 0 {
            return Err(DomainError::validation(format!(
                "threshold must be non-negative, got {}",
                cmd.threshold
            )));
        }
        if cmd.threshold == self.threshold {
            return Ok(Vec::new());
        }
        Ok(vec![StockEvent::ThresholdChanged(ThresholdChanged {
            product_id: self.id,
            previous_threshold: self.threshold,
            new_threshold: cmd.threshold,
            previous_status: self.status,
            new_status: StockStatus::derive(self.number_of_stocks, cmd.threshold),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn adjusted(
        &self,
        actor: Actor,
        action: ActionType,
        delta: i64,
        note: &Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> StockEvent {
        let new_level = self.number_of_stocks + delta;
        StockEvent::StockAdjusted(StockAdjusted {
            product_id: self.id,
            actor,
            action,
            delta,
            previous_level: self.number_of_stocks,
            new_level,
            previous_status: self.status,
            new_status: StockStatus::derive(new_level, self.threshold),
            note: note.clone(),
            occurred_at,
        })
    }
}
