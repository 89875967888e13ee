//! Online-store scenarios over products, orders, order items and payments.

pub mod catalog_filter;
pub mod inventory_update;
pub mod order_processing;
pub mod queries;

pub use catalog_filter::CatalogFilter;
pub use inventory_update::InventoryUpdate;
pub use order_processing::OrderProcessing;
pub use queries::{DocumentEcommerce, EcommerceQueries, SqlEcommerce};
