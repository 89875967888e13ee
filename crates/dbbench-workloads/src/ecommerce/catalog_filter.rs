use async_trait::async_trait;
use chrono::Utc;
use dbbench_core::{BackendKind, CoreResult, Driver, Statement};
use dbbench_engine::{WorkerContext, Workload};
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use super::queries::{self, EcommerceQueries};
use crate::support::exec_in_tx;

pub const DEFAULT_PRODUCTS: usize = 100;
/// Upper bound (exclusive) of order items seeded per product.
pub const MAX_ITEMS_PER_PRODUCT: usize = 10;
/// Products need more than this many order items to match.
pub const POPULAR_THRESHOLD: i64 = 5;

/// Read-heavy aggregate: repeatedly lists products with more than
/// [`POPULAR_THRESHOLD`] order items. Declares no invariant.
pub struct CatalogFilter {
    queries: Box<dyn EcommerceQueries>,
    products: usize,
}

impl CatalogFilter {
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            queries: queries::for_backend(backend),
            products: DEFAULT_PRODUCTS,
        }
    }

    #[must_use]
    pub fn with_products(mut self, products: usize) -> Self {
        self.products = products;
        self
    }

    fn seed_statements(&self) -> Vec<Statement> {
        let mut rng = rand::thread_rng();
        let mut statements = self.queries.create_schema();
        for i in 0..self.products {
            let product_id = Uuid::new_v4().to_string();
            let mut item_ids = Vec::new();
            for _ in 0..rng.gen_range(0..MAX_ITEMS_PER_PRODUCT) {
                let order_id = Uuid::new_v4().to_string();
                let item_id = Uuid::new_v4().to_string();
                statements.push(self.queries.insert_order(
                    &order_id,
                    &Uuid::new_v4().to_string(),
                    Utc::now(),
                ));
                statements.push(
                    self.queries
                        .insert_order_item(&item_id, &order_id, &product_id, 1),
                );
                item_ids.push(item_id);
            }
            statements.push(self.queries.insert_product(
                &product_id,
                &format!("product-{i}"),
                100,
                &item_ids,
            ));
        }
        statements
    }
}

#[async_trait]
impl Workload for CatalogFilter {
    fn name(&self) -> &str {
        "catalog_filter"
    }

    async fn setup(&self, driver: &dyn Driver) -> CoreResult<()> {
        let statements = self.seed_statements();
        debug!(statements = statements.len(), "Seeding catalog");
        exec_in_tx(driver, statements).await
    }

    async fn attempt(&self, driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        driver
            .query(&self.queries.popular_products(POPULAR_THRESHOLD))
            .await?;
        Ok(())
    }

    async fn teardown(&self, driver: &dyn Driver) -> CoreResult<()> {
        exec_in_tx(driver, self.queries.drop_schema()).await
    }
}
