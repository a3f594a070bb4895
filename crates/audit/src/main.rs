//! Replays every product's ledger and compares it with the stored stock level.
//!
//! Exits with status 1 when any product drifted; the drifted reports are
//! printed to stdout as JSON.

use std::process::ExitCode;

use anyhow::Context;
use invledger_infra::{LedgerConfig, LedgerServices, ReplayReport};

async fn audit(services: &LedgerServices) -> anyhow::Result<Vec<ReplayReport>> {
    let reports = services
        .reconstructor
        .verify_all()
        .await
        .context("replaying product ledgers")?;
    let drifted: Vec<ReplayReport> = reports.iter().filter(|r| !r.is_consistent()).cloned().collect();
    tracing::info!(
        products = reports.len(),
        drifted = drifted.len(),
        "replay audit finished"
    );
    Ok(drifted)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = LedgerConfig::from_env().context("loading configuration")?;
    invledger_observability::init_with(&config.observability());

    let services = LedgerServices::build(&config)
        .await
        .context("wiring ledger services")?;
    let drifted = audit(&services).await?;

    if drifted.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    println!("{}", serde_json::to_string_pretty(&drifted)?);
    Ok(ExitCode::FAILURE)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use invledger_auth::Principal;
    use invledger_core::{AdminId, ExpectedVersion, SystemClock};
    use invledger_events::NoopNotificationSink;
    use invledger_infra::{CreateProduct, LedgerStore};
    use invledger_inventory::Product;

    use super::*;

    #[tokio::test]
    async fn audit_reports_only_drifted_products() {
        let services = LedgerServices::in_memory(
            &LedgerConfig::default(),
            Arc::new(NoopNotificationSink),
            Arc::new(SystemClock),
        );
        let admin = Principal::admin(AdminId::new());
        let category = services.catalog.register_category(&admin, "Audit").await.unwrap();
        let create = |name: &str| CreateProduct {
            name: name.to_string(),
            category_id: category.id,
            initial_stock: 6,
            threshold: None,
        };
        let healthy = services.catalog.create_product(&admin, create("ok")).await.unwrap();
        let broken = services.catalog.create_product(&admin, create("bad")).await.unwrap();
        services
            .mutator
            .apply_delta(&admin, healthy.product.id_typed(), -2, None)
            .await
            .unwrap();
        assert!(audit(&services).await.unwrap().is_empty());

        // Write a stock level that bypasses the ledger.
        let mut record = broken.product.to_record();
        record.number_of_stocks = 9;
        services
            .store
            .commit_mutation(&Product::from_record(record), ExpectedVersion::Any, None)
            .await
            .unwrap();

        let drifted = audit(&services).await.unwrap();
        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].product_id, broken.product.id_typed());
        assert_eq!(drifted[0].drift(), 3);
    }
}
