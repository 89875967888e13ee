//! Statements behind the e-commerce workloads, one provider per backend
//! family.

use chrono::{DateTime, Utc};
use dbbench_core::{
    BackendKind, CoreResult, DocumentCommand, Filter, Row, SqlStatement, Statement, Update,
};
use serde_json::json;

use crate::dialect::Dialect;
use crate::support::document_timestamp;

pub const PRODUCTS: &str = "products";
pub const ORDERS: &str = "orders";
pub const ORDER_ITEMS: &str = "order_items";
pub const PAYMENTS: &str = "payments";

/// Backend-specific statements for products, orders, order items and
/// payments.
pub trait EcommerceQueries: Send + Sync {
    /// Statements creating the tables, in dependency order.
    fn create_schema(&self) -> Vec<Statement>;

    /// Statements removing the tables.
    fn drop_schema(&self) -> Vec<Statement>;

    /// `item_ids` lists the order items already referencing the product;
    /// document stores embed it, SQL relies on the join.
    fn insert_product(&self, id: &str, name: &str, inventory: i64, item_ids: &[String])
        -> Statement;

    /// Decrements inventory by one only while it is positive. Zero affected
    /// rows means the stock is gone.
    fn decrement_inventory(&self, product_id: &str) -> Statement;

    /// Single row holding an `inventory` column.
    fn product_inventory(&self, product_id: &str) -> Statement;

    fn insert_order(&self, order_id: &str, user_id: &str, created_at: DateTime<Utc>) -> Statement;

    fn insert_order_item(
        &self,
        item_id: &str,
        order_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Statement;

    fn insert_payment(&self, payment_id: &str, order_id: &str, amount: f64) -> Statement;

    /// Every order.
    fn list_orders(&self) -> Statement;

    /// Order id of a row returned by [`list_orders`](Self::list_orders).
    fn order_id(&self, row: &Row) -> CoreResult<String>;

    /// Every order item; rows carry `order_id`.
    fn list_order_items(&self) -> Statement;

    /// Every payment; rows carry `order_id`.
    fn list_payments(&self) -> Statement;

    /// Products referenced by more than `min_items` order items.
    fn popular_products(&self, min_items: i64) -> Statement;
}

/// Picks the provider for `backend`.
#[must_use]
pub fn for_backend(backend: BackendKind) -> Box<dyn EcommerceQueries> {
    match Dialect::for_backend(backend) {
        Some(dialect) => Box::new(SqlEcommerce::new(dialect)),
        None => Box::new(DocumentEcommerce),
    }
}

/// SQL text rendered once for one dialect.
#[derive(Debug, Clone)]
pub struct SqlEcommerce {
    dialect: Dialect,
    insert_product: String,
    decrement: String,
    inventory: String,
    insert_order: String,
    insert_item: String,
    insert_payment: String,
    popular: String,
}

impl SqlEcommerce {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        let r = |template: &str| dialect.render(template);
        Self {
            dialect,
            insert_product: r("INSERT INTO products (id, name, inventory) VALUES ($1, $2, $3)"),
            decrement: r(
                "UPDATE products SET inventory = inventory - 1 WHERE id = $1 AND inventory > 0",
            ),
            inventory: r("SELECT inventory FROM products WHERE id = $1"),
            insert_order: r("INSERT INTO orders (id, user_id, created_at) VALUES ($1, $2, $3)"),
            insert_item: r(
                "INSERT INTO order_items (id, order_id, product_id, quantity) VALUES ($1, $2, $3, $4)",
            ),
            insert_payment: r("INSERT INTO payments (id, order_id, amount) VALUES ($1, $2, $3)"),
            popular: r("SELECT p.id FROM products p \
                 JOIN order_items oi ON p.id = oi.product_id \
                 GROUP BY p.id HAVING COUNT(oi.id) > $1"),
        }
    }
}

impl EcommerceQueries for SqlEcommerce {
    fn create_schema(&self) -> Vec<Statement> {
        let ts = self.dialect.timestamp_type();
        let double = self.dialect.double_type();
        vec![
            Statement::sql(
                "CREATE TABLE IF NOT EXISTS products (
                    id VARCHAR(255) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    inventory INT NOT NULL
                )",
            ),
            Statement::sql(format!(
                "CREATE TABLE IF NOT EXISTS orders (
                    id VARCHAR(255) PRIMARY KEY,
                    user_id VARCHAR(255) NOT NULL,
                    created_at {ts} NOT NULL
                )"
            )),
            Statement::sql(
                "CREATE TABLE IF NOT EXISTS order_items (
                    id VARCHAR(255) PRIMARY KEY,
                    order_id VARCHAR(255) NOT NULL,
                    product_id VARCHAR(255) NOT NULL,
                    quantity INT NOT NULL
                )",
            ),
            Statement::sql(format!(
                "CREATE TABLE IF NOT EXISTS payments (
                    id VARCHAR(255) PRIMARY KEY,
                    order_id VARCHAR(255) NOT NULL,
                    amount {double} NOT NULL
                )"
            )),
        ]
    }

    fn drop_schema(&self) -> Vec<Statement> {
        let cascade = self.dialect.drop_suffix();
        [ORDER_ITEMS, PAYMENTS, ORDERS, PRODUCTS]
            .iter()
            .map(|table| Statement::sql(format!("DROP TABLE IF EXISTS {table}{cascade}")))
            .collect()
    }

    fn insert_product(
        &self,
        id: &str,
        name: &str,
        inventory: i64,
        _item_ids: &[String],
    ) -> Statement {
        SqlStatement::new(self.insert_product.clone())
            .bind(id)
            .bind(name)
            .bind(inventory)
            .into()
    }

    fn decrement_inventory(&self, product_id: &str) -> Statement {
        SqlStatement::new(self.decrement.clone()).bind(product_id).into()
    }

    fn product_inventory(&self, product_id: &str) -> Statement {
        SqlStatement::new(self.inventory.clone()).bind(product_id).into()
    }

    fn insert_order(&self, order_id: &str, user_id: &str, created_at: DateTime<Utc>) -> Statement {
        SqlStatement::new(self.insert_order.clone())
            .bind(order_id)
            .bind(user_id)
            .bind(created_at)
            .into()
    }

    fn insert_order_item(
        &self,
        item_id: &str,
        order_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Statement {
        SqlStatement::new(self.insert_item.clone())
            .bind(item_id)
            .bind(order_id)
            .bind(product_id)
            .bind(quantity)
            .into()
    }

    fn insert_payment(&self, payment_id: &str, order_id: &str, amount: f64) -> Statement {
        SqlStatement::new(self.insert_payment.clone())
            .bind(payment_id)
            .bind(order_id)
            .bind(amount)
            .into()
    }

    fn list_orders(&self) -> Statement {
        Statement::sql("SELECT id FROM orders")
    }

    fn order_id(&self, row: &Row) -> CoreResult<String> {
        row.scan_named("id")
    }

    fn list_order_items(&self) -> Statement {
        Statement::sql("SELECT id, order_id FROM order_items")
    }

    fn list_payments(&self) -> Statement {
        Statement::sql("SELECT id, order_id FROM payments")
    }

    fn popular_products(&self, min_items: i64) -> Statement {
        SqlStatement::new(self.popular.clone()).bind(min_items).into()
    }
}

/// Commands for the document store. Products embed the ids of the order
/// items that reference them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentEcommerce;

impl EcommerceQueries for DocumentEcommerce {
    fn create_schema(&self) -> Vec<Statement> {
        Vec::new()
    }

    fn drop_schema(&self) -> Vec<Statement> {
        [ORDER_ITEMS, PAYMENTS, ORDERS, PRODUCTS]
            .iter()
            .map(|collection| {
                DocumentCommand::DropCollection {
                    collection: (*collection).to_string(),
                }
                .into()
            })
            .collect()
    }

    fn insert_product(
        &self,
        id: &str,
        name: &str,
        inventory: i64,
        item_ids: &[String],
    ) -> Statement {
        DocumentCommand::InsertOne {
            collection: PRODUCTS.into(),
            document: json!({
                "_id": id,
                "name": name,
                "inventory": inventory,
                "order_items": item_ids,
            }),
        }
        .into()
    }

    fn decrement_inventory(&self, product_id: &str) -> Statement {
        DocumentCommand::UpdateOne {
            collection: PRODUCTS.into(),
            filter: Filter::all().eq("_id", product_id).gt("inventory", 0),
            update: Update::new().inc("inventory", -1),
        }
        .into()
    }

    fn product_inventory(&self, product_id: &str) -> Statement {
        DocumentCommand::FindOne {
            collection: PRODUCTS.into(),
            filter: Filter::all().eq("_id", product_id),
        }
        .into()
    }

    fn insert_order(&self, order_id: &str, user_id: &str, created_at: DateTime<Utc>) -> Statement {
        DocumentCommand::InsertOne {
            collection: ORDERS.into(),
            document: json!({
                "_id": order_id,
                "user_id": user_id,
                "created_at": document_timestamp(created_at),
            }),
        }
        .into()
    }

    fn insert_order_item(
        &self,
        item_id: &str,
        order_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Statement {
        DocumentCommand::InsertOne {
            collection: ORDER_ITEMS.into(),
            document: json!({
                "_id": item_id,
                "order_id": order_id,
                "product_id": product_id,
                "quantity": quantity,
            }),
        }
        .into()
    }

    fn insert_payment(&self, payment_id: &str, order_id: &str, amount: f64) -> Statement {
        DocumentCommand::InsertOne {
            collection: PAYMENTS.into(),
            document: json!({
                "_id": payment_id,
                "order_id": order_id,
                "amount": amount,
            }),
        }
        .into()
    }

    fn list_orders(&self) -> Statement {
        DocumentCommand::Find {
            collection: ORDERS.into(),
            filter: Filter::all(),
        }
        .into()
    }

    fn order_id(&self, row: &Row) -> CoreResult<String> {
        row.scan_named("_id")
    }

    fn list_order_items(&self) -> Statement {
        DocumentCommand::Find {
            collection: ORDER_ITEMS.into(),
            filter: Filter::all(),
        }
        .into()
    }

    fn list_payments(&self) -> Statement {
        DocumentCommand::Find {
            collection: PAYMENTS.into(),
            filter: Filter::all(),
        }
        .into()
    }

    fn popular_products(&self, min_items: i64) -> Statement {
        DocumentCommand::Find {
            collection: PRODUCTS.into(),
            filter: Filter::all().size_gt("order_items", usize::try_from(min_items).unwrap_or(0)),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_statements_use_numbered_placeholders() {
        let queries = SqlEcommerce::new(Dialect::Sqlite);
        let Statement::Sql(sql) = queries.decrement_inventory("product1") else {
            panic!("expected SQL");
        };
        assert!(sql.text.contains("id = ?1 AND inventory > 0"));
        assert_eq!(sql.params.len(), 1);
    }

    #[test]
    fn test_postgres_schema_types() {
        let schema = SqlEcommerce::new(Dialect::Postgres).create_schema();
        let text: Vec<String> = schema.iter().map(Statement::describe).collect();
        assert!(text[1].contains("created_at TIMESTAMPTZ"));
        assert!(text[3].contains("amount DOUBLE PRECISION"));
    }

    #[test]
    fn test_memory_backend_gets_documents() {
        let queries = for_backend(BackendKind::Memory);
        assert!(queries.create_schema().is_empty());
        assert!(matches!(
            queries.popular_products(5),
            Statement::Document(DocumentCommand::Find { .. })
        ));
    }
}
