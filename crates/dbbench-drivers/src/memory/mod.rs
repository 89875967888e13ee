//! In-process document store.
//!
//! Speaks [`Statement::Document`] only. Transactions are optimistic: each
//! one works on private copies of the collections it reads and is validated
//! against the store clock at commit; a collection changed underneath a
//! reader fails the commit with a transient conflict. Collections a
//! transaction only inserted into are replayed onto the current state.
//!
//! Deterministic faults can be queued to exercise retry and error paths:
//!
//! ```rust
//! use dbbench_drivers::memory::{InjectedFault, MemoryDriver};
//!
//! let driver = MemoryDriver::new_with_faults(vec![
//!     InjectedFault::Conflict,
//!     InjectedFault::Ok,
//!     InjectedFault::Permanent("disk full"),
//! ]);
//! assert_eq!(driver.pending_faults(), 3);
//! ```

mod collection;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dbbench_core::{
    BackendKind, CoreError, CoreResult, DocumentCommand, Driver, ExecResult, Row, Statement,
    Transaction, TxFn,
};
use parking_lot::RwLock;
use tracing::debug;

use self::collection::{Collection, CommandOutput};

/// Accepted DSN scheme.
pub const MEMORY_SCHEME: &str = "memory://";

/// Fault consumed by the next commit or autocommit write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFault {
    /// Fails with a transient write conflict.
    Conflict,
    /// Fails with a non-retryable backend error.
    Permanent(&'static str),
    /// Succeeds.
    Ok,
}

impl InjectedFault {
    fn to_error(&self) -> Option<CoreError> {
        match self {
            Self::Conflict => Some(CoreError::conflict("MEM_CONFLICT", "injected write conflict")),
            Self::Permanent(message) => Some(CoreError::Backend((*message).to_string())),
            Self::Ok => None,
        }
    }
}

/// Memory driver configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    /// Simulated round trip added to every statement and commit.
    pub latency: Duration,
}

/// Commit / rollback / conflict counters, for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub commits: u64,
    pub rollbacks: u64,
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct Store {
    collections: HashMap<String, Collection>,
    clock: u64,
}

impl Store {
    fn version(&self, name: &str) -> u64 {
        self.collections.get(name).map_or(0, |c| c.version)
    }

    fn install(&mut self, name: String, mut collection: Collection) {
        self.clock += 1;
        collection.version = self.clock;
        self.collections.insert(name, collection);
    }
}

/// In-memory [`Driver`] with optimistic transactions and fault injection.
#[derive(Debug)]
pub struct MemoryDriver {
    store: RwLock<Store>,
    faults: RwLock<VecDeque<InjectedFault>>,
    connected: AtomicBool,
    config: MemoryConfig,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    conflicts: AtomicU64,
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_config(MemoryConfig::default())
    }

    #[must_use]
    pub fn new_with_config(config: MemoryConfig) -> Self {
        Self {
            store: RwLock::new(Store::default()),
            faults: RwLock::new(VecDeque::new()),
            connected: AtomicBool::new(false),
            config,
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Faults are consumed in order; once the queue is empty everything
    /// succeeds.
    #[must_use]
    pub fn new_with_faults(pattern: Vec<InjectedFault>) -> Self {
        let driver = Self::new();
        driver.inject(pattern);
        driver
    }

    /// Appends faults to the queue.
    pub fn inject(&self, faults: impl IntoIterator<Item = InjectedFault>) {
        self.faults.write().extend(faults);
    }

    #[must_use]
    pub fn pending_faults(&self) -> usize {
        self.faults.read().len()
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn document_count(&self, collection: &str) -> usize {
        self.store
            .read()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    fn ensure_connected(&self) -> CoreResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoreError::connection("memory driver is not connected"))
        }
    }

    fn check_fault(&self) -> Option<CoreError> {
        self.faults
            .write()
            .pop_front()
            .and_then(|fault| fault.to_error())
    }

    async fn delay(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }

    fn record_failure(&self, err: &CoreError) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        if err.is_transient() {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn autocommit(&self, cmd: &DocumentCommand) -> CoreResult<CommandOutput> {
        if cmd.is_read() {
            let store = self.store.read();
            let output = match store.collections.get(cmd.collection()) {
                Some(collection) => collection.read(cmd),
                None => Collection::default().read(cmd),
            };
            return Ok(output);
        }

        if let Some(err) = self.check_fault() {
            self.record_failure(&err);
            return Err(err);
        }
        let mut store = self.store.write();
        let name = cmd.collection();
        let output = if let DocumentCommand::InsertOne { document, .. } = cmd {
            let prepared = match store.collections.get(name) {
                Some(existing) => existing.prepare(name, vec![document.clone()])?,
                None => Collection::default().prepare(name, vec![document.clone()])?,
            };
            let mut collection = store.collections.remove(name).unwrap_or_default();
            collection.extend(prepared);
            store.install(name.to_string(), collection);
            CommandOutput {
                affected: 1,
                wrote: true,
                rows: Vec::new(),
            }
        } else {
            let mut collection = store.collections.get(name).cloned().unwrap_or_default();
            let output = collection.apply(cmd)?;
            if output.wrote {
                store.install(name.to_string(), collection);
            }
            output
        };
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(output)
    }

    fn commit(&self, tx: MemoryTransaction<'_>) -> CoreResult<()> {
        if let Some(err) = self.check_fault() {
            return Err(err);
        }

        let mut store = self.store.write();
        let mut staged = Vec::with_capacity(tx.touched.len());
        for (name, touched) in tx.touched {
            let current = store.version(&name);
            match touched.working {
                Some(working) => {
                    if current != touched.base_version {
                        return Err(CoreError::conflict(
                            "MEM_CONFLICT",
                            format!("collection `{name}` changed during transaction"),
                        ));
                    }
                    if touched.dirty {
                        staged.push(Staged::Replace(name, working));
                    }
                }
                None if touched.inserts.is_empty() => {}
                None => {
                    let prepared = match store.collections.get(&name) {
                        Some(existing) => existing.prepare(&name, touched.inserts)?,
                        None => Collection::default().prepare(&name, touched.inserts)?,
                    };
                    staged.push(Staged::Append(name, prepared));
                }
            }
        }

        for change in staged {
            match change {
                Staged::Replace(name, collection) => store.install(name, collection),
                Staged::Append(name, prepared) => {
                    let mut collection = store.collections.remove(&name).unwrap_or_default();
                    collection.extend(prepared);
                    store.install(name, collection);
                }
            }
        }
        Ok(())
    }
}

enum Staged {
    Replace(String, Collection),
    Append(String, Vec<(String, serde_json::Value)>),
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_document(stmt: &Statement) -> CoreResult<&DocumentCommand> {
    match stmt {
        Statement::Document(cmd) => Ok(cmd),
        Statement::Sql(sql) => {
            debug!(sql = %sql.text, "Rejected SQL statement");
            Err(CoreError::Unsupported(
                "memory driver does not execute SQL".to_string(),
            ))
        }
    }
}

/// Per-collection state of an open transaction.
#[derive(Debug, Default)]
struct Touched {
    /// Store clock when the collection was first read.
    base_version: u64,
    /// Private copy, present once the transaction read the collection.
    working: Option<Collection>,
    /// Blind inserts awaiting replay at commit.
    inserts: Vec<serde_json::Value>,
    dirty: bool,
}

struct MemoryTransaction<'a> {
    driver: &'a MemoryDriver,
    touched: HashMap<String, Touched>,
}

impl<'a> MemoryTransaction<'a> {
    fn new(driver: &'a MemoryDriver) -> Self {
        Self {
            driver,
            touched: HashMap::new(),
        }
    }

    /// Private copy of `name`, taken on first read. Blind inserts made
    /// earlier in the transaction are folded in.
    fn working(&mut self, name: &str) -> CoreResult<&mut Collection> {
        let driver = self.driver;
        let touched = self.touched.entry(name.to_string()).or_default();
        if touched.working.is_none() {
            let snapshot = driver
                .store
                .read()
                .collections
                .get(name)
                .cloned()
                .unwrap_or_default();
            touched.base_version = snapshot.version;
            let mut working = snapshot;
            for document in touched.inserts.drain(..) {
                working.insert(name, document)?;
            }
            touched.working = Some(working);
        }
        touched
            .working
            .as_mut()
            .ok_or_else(|| CoreError::internal("transaction snapshot missing"))
    }

    fn apply(&mut self, cmd: &DocumentCommand) -> CoreResult<CommandOutput> {
        let name = cmd.collection();

        if let DocumentCommand::InsertOne { document, .. } = cmd {
            let touched = self.touched.entry(name.to_string()).or_default();
            if touched.working.is_none() {
                touched.inserts.push(document.clone());
                touched.dirty = true;
                return Ok(CommandOutput {
                    affected: 1,
                    wrote: true,
                    rows: Vec::new(),
                });
            }
        }

        let output = self.working(name)?.apply(cmd)?;
        if output.wrote {
            if let Some(touched) = self.touched.get_mut(name) {
                touched.dirty = true;
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction<'_> {
    async fn exec(&mut self, stmt: &Statement) -> CoreResult<ExecResult> {
        let cmd = expect_document(stmt)?;
        self.driver.delay().await;
        let output = self.apply(cmd)?;
        Ok(ExecResult {
            rows_affected: output.affected,
        })
    }

    async fn query(&mut self, stmt: &Statement) -> CoreResult<Vec<Row>> {
        let cmd = expect_document(stmt)?;
        if !cmd.is_read() {
            return Err(CoreError::Unsupported(format!(
                "`{}` is not a read command",
                cmd.verb()
            )));
        }
        self.driver.delay().await;
        Ok(self.apply(cmd)?.rows)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn connect(&self, dsn: &str) -> CoreResult<()> {
        if !dsn.starts_with(MEMORY_SCHEME) {
            return Err(CoreError::connection(format!(
                "memory DSN must start with `{MEMORY_SCHEME}`, got `{dsn}`"
            )));
        }
        self.connected.store(true, Ordering::Release);
        debug!(dsn, "Memory driver connected");
        Ok(())
    }

    async fn close(&self) -> CoreResult<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn reset(&self) -> CoreResult<()> {
        self.ensure_connected()?;
        self.store.write().collections.clear();
        Ok(())
    }

    async fn execute_tx(&self, f: TxFn<'_>) -> CoreResult<()> {
        self.ensure_connected()?;
        let mut tx = MemoryTransaction::new(self);
        let result = f(&mut tx).await;

        match result {
            Ok(()) => {
                self.delay().await;
                match self.commit(tx) {
                    Ok(()) => {
                        self.commits.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(err) => {
                        self.record_failure(&err);
                        Err(err)
                    }
                }
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    async fn exec(&self, stmt: &Statement) -> CoreResult<ExecResult> {
        self.ensure_connected()?;
        let cmd = expect_document(stmt)?;
        self.delay().await;
        let output = self.autocommit(cmd)?;
        Ok(ExecResult {
            rows_affected: output.affected,
        })
    }

    async fn query(&self, stmt: &Statement) -> CoreResult<Vec<Row>> {
        self.ensure_connected()?;
        let cmd = expect_document(stmt)?;
        if !cmd.is_read() {
            return Err(CoreError::Unsupported(format!(
                "`{}` is not a read command",
                cmd.verb()
            )));
        }
        self.delay().await;
        Ok(self.autocommit(cmd)?.rows)
    }
}
