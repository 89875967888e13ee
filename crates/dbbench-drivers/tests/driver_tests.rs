//! Behaviour every adapter shares, checked against the memory store and an
//! on-disk SQLite database.

use std::sync::Arc;

use dbbench_core::{
    tx_fn, BackendKind, CoreError, DocumentCommand, Driver, Filter, SqlStatement, Statement,
    Update,
};
use dbbench_drivers::{open, InjectedFault, MemoryDriver};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn open_rejects_wrong_scheme_for_memory() {
    let err = open(BackendKind::Memory, "sqlite://x.db").await.err().unwrap();
    assert!(matches!(err, CoreError::Connection { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_conditional_decrement_is_never_oversold() {
    let driver = open(BackendKind::Memory, "memory://stock").await.unwrap();
    driver
        .exec(
            &DocumentCommand::InsertOne {
                collection: "products".into(),
                document: json!({"_id": "product1", "inventory": 50}),
            }
            .into(),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let driver = Arc::clone(&driver);
        handles.push(tokio::spawn(async move {
            let mut sold = 0_u64;
            loop {
                let result = driver
                    .execute_tx(tx_fn(|tx| {
                        Box::pin(async move {
                            let res = tx
                                .exec(
                                    &DocumentCommand::UpdateOne {
                                        collection: "products".into(),
                                        filter: Filter::all()
                                            .eq("_id", "product1")
                                            .gt("inventory", 0),
                                        update: Update::new().inc("inventory", -1),
                                    }
                                    .into(),
                                )
                                .await?;
                            if res.rows_affected == 0 {
                                return Err(CoreError::exhausted("inventory"));
                            }
                            Ok(())
                        })
                    }))
                    .await;
                match result {
                    Ok(()) => sold += 1,
                    Err(e) if e.is_transient() => continue,
                    Err(e) if e.is_exhausted() => break sold,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }
    assert_eq!(total, 50);
}

#[tokio::test]
async fn memory_faults_surface_through_transactions() {
    let driver = MemoryDriver::new_with_faults(vec![InjectedFault::Conflict]);
    driver.connect("memory://faults").await.unwrap();

    let insert = || {
        tx_fn(|tx| {
            Box::pin(async move {
                tx.exec(
                    &DocumentCommand::InsertOne {
                        collection: "events".into(),
                        document: json!({"region": "region1"}),
                    }
                    .into(),
                )
                .await?;
                Ok(())
            })
        })
    };

    let err = driver.execute_tx(insert()).await.unwrap_err();
    assert!(err.is_transient());
    driver.execute_tx(insert()).await.unwrap();
    assert_eq!(driver.document_count("events"), 1);
    assert_eq!(driver.stats().commits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_transactions_commit_on_success() {
    let dir = TempDir::new().unwrap();
    let dsn = format!("sqlite://{}", dir.path().join("tx.db").display());
    let driver = open(BackendKind::Sqlite, &dsn).await.unwrap();
    assert_eq!(driver.backend(), BackendKind::Sqlite);

    driver
        .exec(&Statement::sql(
            "CREATE TABLE products (id TEXT PRIMARY KEY, inventory INTEGER NOT NULL)",
        ))
        .await
        .unwrap();
    driver
        .exec(
            &SqlStatement::new("INSERT INTO products (id, inventory) VALUES (?1, ?2)")
                .bind("product1")
                .bind(3_i64)
                .into(),
        )
        .await
        .unwrap();

    for _ in 0..3 {
        driver
            .execute_tx(tx_fn(|tx| {
                Box::pin(async move {
                    tx.exec(
                        &SqlStatement::new(
                            "UPDATE products SET inventory = inventory - 1 WHERE id = ?1 AND inventory > 0",
                        )
                        .bind("product1")
                        .into(),
                    )
                    .await?;
                    Ok(())
                })
            }))
            .await
            .unwrap();
    }

    let remaining = driver
        .query_row(
            &SqlStatement::new("SELECT inventory FROM products WHERE id = ?1")
                .bind("product1")
                .into(),
        )
        .await
        .unwrap()
        .unwrap()
        .scan_named::<i64>("inventory")
        .unwrap();
    assert_eq!(remaining, 0);

    let doc: Statement = DocumentCommand::Count {
        collection: "products".into(),
        filter: Filter::all(),
    }
    .into();
    assert!(matches!(
        driver.query(&doc).await.unwrap_err(),
        CoreError::Unsupported(_)
    ));

    driver.close().await.unwrap();
}
