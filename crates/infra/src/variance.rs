//! Variance Analyzer: compares a product's stock at a target date with a
//! reference value derived from its own ledger.

use core::str::FromStr;
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use invledger_auth::{Permission, Principal, authorize};
use invledger_core::{CategoryId, Clock, DomainError, ProductId};
use invledger_inventory::{Product, ProductFilter};

use crate::error::LedgerError;
use crate::ledger_store::LedgerStore;
use crate::reconstructor::LedgerReconstructor;
use crate::scoping::AccessScoper;

/// Days before the target where the `average` comparison window starts.
/// The window `[target - 7 days, target]` has one closing per calendar day.
pub const AVERAGE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonType {
    /// Stock one day before the target.
    #[default]
    Previous,
    /// Mean daily closing over the window ending at the target.
    Average,
    /// First recorded increase.
    Baseline,
}

impl ComparisonType {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonType::Previous => "previous",
            ComparisonType::Average => "average",
            ComparisonType::Baseline => "baseline",
        }
    }
}

impl FromStr for ComparisonType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "previous" => Ok(ComparisonType::Previous),
            "average" => Ok(ComparisonType::Average),
            "baseline" => Ok(ComparisonType::Baseline),
            other => Err(DomainError::validation(format!(
                "unknown comparison type '{other}' (expected previous, average or baseline)"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VarianceType {
    Increase,
    Decrease,
    NoChange,
}

impl VarianceType {
    fn of(variance: f64) -> Self {
        if variance > 0.0 {
            VarianceType::Increase
        } else if variance < 0.0 {
            VarianceType::Decrease
        } else {
            VarianceType::NoChange
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceReport {
    pub product_id: ProductId,
    pub product_name: String,
    pub category_id: CategoryId,
    pub current_stock: i64,
    pub target_date: DateTime<Utc>,
    pub comparison: ComparisonType,
    pub stock_at_target: i64,
    pub comparison_value: f64,
    /// Reference instant; `None` for a baseline on an empty ledger.
    pub comparison_date: Option<DateTime<Utc>>,
    pub variance: f64,
    /// Percent of the comparison value, two decimals; 0 when that value is 0.
    pub variance_percentage: f64,
    pub variance_type: VarianceType,
}

/// Batch request. Unset fields mean "every visible product", "now" and
/// `previous` respectively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceQuery {
    pub product_id: Option<ProductId>,
    pub category_id: Option<CategoryId>,
    pub target_date: Option<DateTime<Utc>>,
    pub comparison: Option<ComparisonType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceSummary {
    pub total_products: usize,
    pub increased_products: usize,
    pub decreased_products: usize,
    pub unchanged_products: usize,
    pub average_variance: f64,
}

impl VarianceSummary {
    fn of(reports: &[VarianceReport]) -> Self {
        let count = |t: VarianceType| reports.iter().filter(|r| r.variance_type == t).count();
        let average_variance = if reports.is_empty() {
            0.0
        } else {
            round2(reports.iter().map(|r| r.variance).sum::<f64>() / reports.len() as f64)
        };
        Self {
            total_products: reports.len(),
            increased_products: count(VarianceType::Increase),
            decreased_products: count(VarianceType::Decrease),
            unchanged_products: count(VarianceType::NoChange),
            average_variance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceBatch {
    pub results: Vec<VarianceReport>,
    pub summary: VarianceSummary,
}

#[derive(Debug, Clone)]
pub struct VarianceAnalyzer<S> {
    store: S,
    scoper: AccessScoper<S>,
    reconstructor: LedgerReconstructor<S>,
    clock: Arc<dyn Clock>,
}

impl<S> VarianceAnalyzer<S>
where
    S: LedgerStore + Clone,
{
    pub fn new(store: S, scoper: AccessScoper<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            reconstructor: LedgerReconstructor::new(store.clone(), clock.clone()),
            store,
            scoper,
            clock,
        }
    }

    /// Variance of one product the principal can see.
    #[instrument(skip(self, principal), fields(principal = %principal.principal_id), err)]
    pub async fn compute_variance(
        &self,
        principal: &Principal,
        product_id: ProductId,
        target_date: DateTime<Utc>,
        comparison: ComparisonType,
    ) -> Result<VarianceReport, LedgerError> {
        let product = self
            .scoper
            .ensure_access(principal, product_id, Permission::ReadLedger)
            .await?;
        self.report(&product, target_date, comparison).await
    }

    /// Variance of every visible product, optionally narrowed by product or
    /// category, plus summary counts.
    #[instrument(skip(self, principal), fields(principal = %principal.principal_id), err)]
    pub async fn compute_variance_batch(
        &self,
        principal: &Principal,
        query: VarianceQuery,
    ) -> Result<VarianceBatch, LedgerError> {
        authorize(principal, Permission::ReadLedger)?;
        let target = query.target_date.unwrap_or_else(|| self.clock.now());
        let comparison = query.comparison.unwrap_or_default();

        let visible = self.scoper.try_visible_product_ids(principal).await?;
        let ids = match query.product_id {
            Some(id) if visible.contains(&id) => BTreeSet::from([id]),
            Some(_) => BTreeSet::new(),
            None => visible,
        };
        let filter = ProductFilter {
            category_id: query.category_id,
            ..ProductFilter::with_ids(ids)
        };
        let products = self.store.list_products(&filter).await?;
        debug!(products = products.len(), comparison = comparison.as_str(), "computing variance batch");

        let mut results = Vec::with_capacity(products.len());
        for product in &products {
            results.push(self.report(product, target, comparison).await?);
        }
        Ok(VarianceBatch {
            summary: VarianceSummary::of(&results),
            results,
        })
    }

    async fn report(
        &self,
        product: &Product,
        target: DateTime<Utc>,
        comparison: ComparisonType,
    ) -> Result<VarianceReport, LedgerError> {
        let product_id = product.id_typed();
        let stock_at_target = self.reconstructor.fold_until(product_id, target).await?;

        let (comparison_value, comparison_date) = match comparison {
            ComparisonType::Previous => {
                let at = target - Duration::days(1);
                let stock = self.reconstructor.fold_until(product_id, at).await?;
                (stock as f64, Some(at))
            }
            ComparisonType::Average => {
                let from = target - Duration::days(AVERAGE_WINDOW_DAYS);
                let avg = self
                    .reconstructor
                    .average_stock(product_id, from, target)
                    .await?;
                (avg, Some(from))
            }
            ComparisonType::Baseline => {
                let (baseline, first_at) = self.reconstructor.baseline_of(product_id).await?;
                (baseline as f64, first_at)
            }
        };

        let variance = stock_at_target as f64 - comparison_value;
        let variance_percentage = if comparison_value == 0.0 {
            0.0
        } else {
            round2(variance / comparison_value * 100.0)
        };

        Ok(VarianceReport {
            product_id,
            product_name: product.name().to_string(),
            category_id: product.category_id(),
            current_stock: product.number_of_stocks(),
            target_date: target,
            comparison,
            stock_at_target,
            comparison_value,
            comparison_date,
            variance,
            variance_percentage,
            variance_type: VarianceType::of(variance),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_type_parses_known_names_only() {
        assert_eq!("Average".parse::<ComparisonType>().unwrap(), ComparisonType::Average);
        assert_eq!(" baseline ".parse::<ComparisonType>().unwrap(), ComparisonType::Baseline);
        assert!(matches!(
            "weekly".parse::<ComparisonType>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn summary_counts_each_direction() {
        let report = |variance: f64| VarianceReport {
            product_id: ProductId::new(),
            product_name: "x".to_string(),
            category_id: CategoryId::new(),
            current_stock: 0,
            target_date: Utc::now(),
            comparison: ComparisonType::Previous,
            stock_at_target: 0,
            comparison_value: 0.0,
            comparison_date: None,
            variance,
            variance_percentage: 0.0,
            variance_type: VarianceType::of(variance),
        };
        let summary = VarianceSummary::of(&[report(4.0), report(-1.0), report(0.0)]);
        assert_eq!(summary.total_products, 3);
        assert_eq!(summary.increased_products, 1);
        assert_eq!(summary.decreased_products, 1);
        assert_eq!(summary.unchanged_products, 1);
        assert_eq!(summary.average_variance, 1.0);
        assert_eq!(VarianceSummary::of(&[]).average_variance, 0.0);
    }
}
