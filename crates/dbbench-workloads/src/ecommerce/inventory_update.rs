use async_trait::async_trait;
use dbbench_core::{tx_fn, BackendKind, CoreError, CoreResult, Driver};
use dbbench_engine::{WorkerContext, Workload};
use tracing::debug;

use super::queries::{self, EcommerceQueries};
use crate::support::exec_in_tx;

pub const PRODUCT_ID: &str = "product1";
pub const DEFAULT_INVENTORY: i64 = 10_000;

/// Hot-row contention: every worker decrements the same product's stock
/// inside a transaction until it reaches zero.
///
/// The stock must end at exactly zero: never oversold, never lost.
pub struct InventoryUpdate {
    queries: Box<dyn EcommerceQueries>,
    inventory: i64,
}

impl InventoryUpdate {
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            queries: queries::for_backend(backend),
            inventory: DEFAULT_INVENTORY,
        }
    }

    /// Overrides the seeded stock.
    #[must_use]
    pub fn with_inventory(mut self, inventory: i64) -> Self {
        self.inventory = inventory;
        self
    }
}

#[async_trait]
impl Workload for InventoryUpdate {
    fn name(&self) -> &str {
        "inventory_update"
    }

    async fn setup(&self, driver: &dyn Driver) -> CoreResult<()> {
        let mut statements = self.queries.create_schema();
        statements.push(
            self.queries
                .insert_product(PRODUCT_ID, "test product", self.inventory, &[]),
        );
        exec_in_tx(driver, statements).await?;
        debug!(inventory = self.inventory, "Seeded product stock");
        Ok(())
    }

    async fn attempt(&self, driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        let decrement = self.queries.decrement_inventory(PRODUCT_ID);
        driver
            .execute_tx(tx_fn(move |tx| {
                Box::pin(async move {
                    let result = tx.exec(&decrement).await?;
                    if result.rows_affected == 0 {
                        return Err(CoreError::exhausted("inventory"));
                    }
                    Ok(())
                })
            }))
            .await
    }

    async fn verify(&self, driver: &dyn Driver) -> CoreResult<Option<bool>> {
        let row = driver
            .query_row(&self.queries.product_inventory(PRODUCT_ID))
            .await?
            .ok_or_else(|| CoreError::not_found("product", PRODUCT_ID))?;
        let remaining: i64 = row.scan_named("inventory")?;
        debug!(remaining, "Final product stock");
        Ok(Some(remaining == 0))
    }

    async fn teardown(&self, driver: &dyn Driver) -> CoreResult<()> {
        exec_in_tx(driver, self.queries.drop_schema()).await
    }
}
