use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dbbench_core::{tx_fn, BackendKind, CoreError, CoreResult, Driver, Row, Statement};
use dbbench_engine::{WorkerContext, Workload};
use tracing::{debug, warn};
use uuid::Uuid;

use super::queries::{self, EcommerceQueries};
use crate::support::exec_in_tx;

pub const PRODUCT_ID: &str = "product1";
pub const DEFAULT_INVENTORY: i64 = 100;
pub const PAYMENT_AMOUNT: f64 = 10.50;

/// Multi-statement transactions: each attempt records an order, its item
/// and its payment, then takes one unit of stock. Running out of stock
/// rolls the whole order back and ends the run.
pub struct OrderProcessing {
    queries: Box<dyn EcommerceQueries>,
    inventory: i64,
}

impl OrderProcessing {
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            queries: queries::for_backend(backend),
            inventory: DEFAULT_INVENTORY,
        }
    }

    #[must_use]
    pub fn with_inventory(mut self, inventory: i64) -> Self {
        self.inventory = inventory;
        self
    }

    fn order_statements(&self) -> Vec<Statement> {
        let order_id = Uuid::new_v4().to_string();
        let user_id = Uuid::new_v4().to_string();
        vec![
            self.queries.insert_order(&order_id, &user_id, Utc::now()),
            self.queries.insert_order_item(
                &Uuid::new_v4().to_string(),
                &order_id,
                PRODUCT_ID,
                1,
            ),
            self.queries
                .insert_payment(&Uuid::new_v4().to_string(), &order_id, PAYMENT_AMOUNT),
        ]
    }
}

/// Occurrences of each `order_id` across `rows`.
fn count_by_order(rows: &[Row]) -> CoreResult<HashMap<String, usize>> {
    let mut counts = HashMap::new();
    for row in rows {
        let order_id: String = row.scan_named("order_id")?;
        *counts.entry(order_id).or_insert(0) += 1;
    }
    Ok(counts)
}

#[async_trait]
impl Workload for OrderProcessing {
    fn name(&self) -> &str {
        "order_processing"
    }

    async fn setup(&self, driver: &dyn Driver) -> CoreResult<()> {
        let mut statements = self.queries.create_schema();
        statements.push(
            self.queries
                .insert_product(PRODUCT_ID, "test product", self.inventory, &[]),
        );
        exec_in_tx(driver, statements).await
    }

    async fn attempt(&self, driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        let inserts = self.order_statements();
        let decrement = self.queries.decrement_inventory(PRODUCT_ID);
        driver
            .execute_tx(tx_fn(move |tx| {
                Box::pin(async move {
                    for stmt in &inserts {
                        tx.exec(stmt).await?;
                    }
                    if tx.exec(&decrement).await?.rows_affected == 0 {
                        return Err(CoreError::exhausted("inventory"));
                    }
                    Ok(())
                })
            }))
            .await
    }

    async fn verify(&self, driver: &dyn Driver) -> CoreResult<Option<bool>> {
        let remaining: i64 = driver
            .query_row(&self.queries.product_inventory(PRODUCT_ID))
            .await?
            .ok_or_else(|| CoreError::not_found("product", PRODUCT_ID))?
            .scan_named("inventory")?;

        let orders = driver.query(&self.queries.list_orders()).await?;
        let items = count_by_order(&driver.query(&self.queries.list_order_items()).await?)?;
        let payments = count_by_order(&driver.query(&self.queries.list_payments()).await?)?;

        let sold = self.inventory - remaining;
        let mut consistent = i64::try_from(orders.len()).ok() == Some(sold);
        if !consistent {
            warn!(sold, orders = orders.len(), "Stock taken does not match orders");
        }
        for row in &orders {
            let order_id = self.queries.order_id(row)?;
            let item_count = items.get(&order_id).copied().unwrap_or(0);
            let payment_count = payments.get(&order_id).copied().unwrap_or(0);
            if item_count != 1 || payment_count != 1 {
                warn!(%order_id, item_count, payment_count, "Order is incomplete");
                consistent = false;
            }
        }
        if items.len() != orders.len() || payments.len() != orders.len() {
            warn!(
                orders = orders.len(),
                items = items.len(),
                payments = payments.len(),
                "Order items or payments reference unknown orders"
            );
            consistent = false;
        }
        debug!(sold, orders = orders.len(), "Order audit complete");
        Ok(Some(consistent))
    }

    async fn teardown(&self, driver: &dyn Driver) -> CoreResult<()> {
        exec_in_tx(driver, self.queries.drop_schema()).await
    }
}
