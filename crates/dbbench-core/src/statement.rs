//! Statements handed to a [`Driver`](crate::driver::Driver).
//!
//! SQL backends receive dialect-specific text with positional parameters;
//! document backends receive typed commands. Workloads pick the right shape
//! once, at construction, through their query providers.

use serde_json::Value as JsonValue;

use crate::row::Value;

/// A statement understood by exactly one family of drivers.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Sql(SqlStatement),
    Document(DocumentCommand),
}

impl Statement {
    /// Plain SQL text without parameters.
    #[must_use]
    pub fn sql(text: impl Into<String>) -> Self {
        Self::Sql(SqlStatement::new(text))
    }

    /// Short description for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Sql(sql) => sql.text.split_whitespace().collect::<Vec<_>>().join(" "),
            Self::Document(cmd) => format!("{} {}", cmd.verb(), cmd.collection()),
        }
    }
}

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub text: String,
    pub params: Vec<Value>,
}

impl SqlStatement {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Appends the next positional parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

impl From<SqlStatement> for Statement {
    fn from(sql: SqlStatement) -> Self {
        Self::Sql(sql)
    }
}

impl From<DocumentCommand> for Statement {
    fn from(cmd: DocumentCommand) -> Self {
        Self::Document(cmd)
    }
}

/// Condition on one document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(JsonValue),
    Gt(JsonValue),
    In(Vec<JsonValue>),
    /// Array field holds more than `n` elements.
    SizeGt(usize),
}

/// Conjunction of field predicates. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<(String, Predicate)>,
}

impl Filter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.clauses.push((field.into(), Predicate::Eq(value.into())));
        self
    }

    #[must_use]
    pub fn gt(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.clauses.push((field.into(), Predicate::Gt(value.into())));
        self
    }

    #[must_use]
    pub fn is_in(mut self, field: impl Into<String>, values: Vec<JsonValue>) -> Self {
        self.clauses.push((field.into(), Predicate::In(values)));
        self
    }

    #[must_use]
    pub fn size_gt(mut self, field: impl Into<String>, n: usize) -> Self {
        self.clauses.push((field.into(), Predicate::SizeGt(n)));
        self
    }
}

/// Field mutation applied by `UpdateOne`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Inc(String, i64),
    Push(String, JsonValue),
    Set(String, JsonValue),
}

/// Ordered list of field mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

impl Update {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn inc(mut self, field: impl Into<String>, by: i64) -> Self {
        self.ops.push(UpdateOp::Inc(field.into(), by));
        self
    }

    #[must_use]
    pub fn push(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.ops.push(UpdateOp::Push(field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.ops.push(UpdateOp::Set(field.into(), value.into()));
        self
    }
}

/// Typed command for document-store backends.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentCommand {
    /// Inserts one document; `_id` must be unique within the collection.
    InsertOne {
        collection: String,
        document: JsonValue,
    },
    /// Updates the first matching document.
    UpdateOne {
        collection: String,
        filter: Filter,
        update: Update,
    },
    /// Updates every matching document.
    UpdateMany {
        collection: String,
        filter: Filter,
        update: Update,
    },
    DeleteMany {
        collection: String,
        filter: Filter,
    },
    FindOne {
        collection: String,
        filter: Filter,
    },
    Find {
        collection: String,
        filter: Filter,
    },
    Count {
        collection: String,
        filter: Filter,
    },
    /// Groups matching documents by `group_by` and sums `sum_field`.
    /// Rows come back as `(_id, total)`.
    GroupSum {
        collection: String,
        filter: Filter,
        group_by: String,
        sum_field: String,
    },
    DropCollection {
        collection: String,
    },
}

impl DocumentCommand {
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::InsertOne { collection, .. }
            | Self::UpdateOne { collection, .. }
            | Self::UpdateMany { collection, .. }
            | Self::DeleteMany { collection, .. }
            | Self::FindOne { collection, .. }
            | Self::Find { collection, .. }
            | Self::Count { collection, .. }
            | Self::GroupSum { collection, .. }
            | Self::DropCollection { collection } => collection,
        }
    }

    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::InsertOne { .. } => "insert_one",
            Self::UpdateOne { .. } => "update_one",
            Self::UpdateMany { .. } => "update_many",
            Self::DeleteMany { .. } => "delete_many",
            Self::FindOne { .. } => "find_one",
            Self::Find { .. } => "find",
            Self::Count { .. } => "count",
            Self::GroupSum { .. } => "group_sum",
            Self::DropCollection { .. } => "drop_collection",
        }
    }

    /// True for commands that never mutate state.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::FindOne { .. } | Self::Find { .. } | Self::Count { .. } | Self::GroupSum { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_appends_in_order() {
        let stmt = SqlStatement::new("INSERT INTO t VALUES ($1, $2)")
            .bind("a")
            .bind(2_i64);
        assert_eq!(stmt.params, vec![Value::from("a"), Value::Int(2)]);
    }

    #[test]
    fn describe_collapses_whitespace() {
        let stmt = Statement::sql("SELECT 1\n        FROM   dual");
        assert_eq!(stmt.describe(), "SELECT 1 FROM dual");

        let doc: Statement = DocumentCommand::Count {
            collection: "orders".into(),
            filter: Filter::all(),
        }
        .into();
        assert_eq!(doc.describe(), "count orders");
    }
}
