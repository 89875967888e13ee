//! Document collections and command evaluation for the in-memory store.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use dbbench_core::{
    CoreError, CoreResult, DocumentCommand, Filter, Predicate, Row, Update, UpdateOp, Value,
};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Documents keyed by `_id`, plus the store clock at the last write.
#[derive(Debug, Clone, Default)]
pub(crate) struct Collection {
    pub(crate) docs: BTreeMap<String, JsonValue>,
    pub(crate) version: u64,
}

/// What one command produced.
#[derive(Debug, Default)]
pub(crate) struct CommandOutput {
    pub(crate) affected: u64,
    pub(crate) rows: Vec<Row>,
    pub(crate) wrote: bool,
}

impl Collection {
    /// Inserts `document`, assigning a UUID `_id` when absent.
    pub(crate) fn insert(&mut self, collection: &str, document: JsonValue) -> CoreResult<()> {
        let prepared = self.prepare(collection, vec![document])?;
        self.extend(prepared);
        Ok(())
    }

    /// Assigns ids and checks uniqueness without inserting anything, so a
    /// batch either lands whole or not at all.
    pub(crate) fn prepare(
        &self,
        collection: &str,
        documents: Vec<JsonValue>,
    ) -> CoreResult<Vec<(String, JsonValue)>> {
        let mut prepared: Vec<(String, JsonValue)> = Vec::with_capacity(documents.len());
        for document in documents {
            let JsonValue::Object(mut fields) = document else {
                return Err(CoreError::Backend(format!(
                    "{collection}: document must be an object"
                )));
            };
            let id = match fields.get("_id") {
                Some(JsonValue::String(id)) => id.clone(),
                Some(other) => other.to_string(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    fields.insert("_id".to_string(), JsonValue::String(id.clone()));
                    id
                }
            };
            if self.docs.contains_key(&id) || prepared.iter().any(|(seen, _)| *seen == id) {
                return Err(CoreError::Backend(format!(
                    "{collection}: duplicate key `{id}`"
                )));
            }
            prepared.push((id, JsonValue::Object(fields)));
        }
        Ok(prepared)
    }

    pub(crate) fn extend(&mut self, prepared: Vec<(String, JsonValue)>) {
        self.docs.extend(prepared);
    }

    /// Applies `cmd`, which must target this collection.
    pub(crate) fn apply(&mut self, cmd: &DocumentCommand) -> CoreResult<CommandOutput> {
        let name = cmd.collection();
        let output = match cmd {
            DocumentCommand::InsertOne { document, .. } => {
                self.insert(name, document.clone())?;
                CommandOutput {
                    affected: 1,
                    wrote: true,
                    ..Default::default()
                }
            }
            DocumentCommand::UpdateOne { filter, update, .. } => {
                self.update(filter, update, false)?
            }
            DocumentCommand::UpdateMany { filter, update, .. } => {
                self.update(filter, update, true)?
            }
            DocumentCommand::DeleteMany { filter, .. } => {
                let before = self.docs.len();
                self.docs.retain(|_, doc| !matches(doc, filter));
                let affected = (before - self.docs.len()) as u64;
                CommandOutput {
                    affected,
                    wrote: affected > 0,
                    ..Default::default()
                }
            }
            DocumentCommand::DropCollection { .. } => {
                let affected = self.docs.len() as u64;
                self.docs.clear();
                CommandOutput {
                    affected,
                    wrote: true,
                    ..Default::default()
                }
            }
            read => return Ok(self.read(read)),
        };
        Ok(output)
    }

    /// Evaluates a read command without mutating.
    pub(crate) fn read(&self, cmd: &DocumentCommand) -> CommandOutput {
        let rows = match cmd {
            DocumentCommand::FindOne { filter, .. } => self
                .matching(filter)
                .take(1)
                .map(document_row)
                .collect(),
            DocumentCommand::Find { filter, .. } => {
                self.matching(filter).map(document_row).collect()
            }
            DocumentCommand::Count { filter, .. } => {
                let count = self.matching(filter).count() as i64;
                vec![Row::new(vec!["count".to_string()], vec![Value::Int(count)])]
            }
            DocumentCommand::GroupSum {
                filter,
                group_by,
                sum_field,
                ..
            } => self.group_sum(filter, group_by, sum_field),
            _ => Vec::new(),
        };
        CommandOutput {
            affected: rows.len() as u64,
            rows,
            wrote: false,
        }
    }

    fn matching<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = &'a JsonValue> + 'a {
        self.docs.values().filter(move |doc| matches(doc, filter))
    }

    fn update(
        &mut self,
        filter: &Filter,
        update: &Update,
        many: bool,
    ) -> CoreResult<CommandOutput> {
        let mut affected = 0;
        for doc in self.docs.values_mut() {
            if !matches(doc, filter) {
                continue;
            }
            apply_update(doc, update)?;
            affected += 1;
            if !many {
                break;
            }
        }
        Ok(CommandOutput {
            affected,
            wrote: affected > 0,
            ..Default::default()
        })
    }

    fn group_sum(&self, filter: &Filter, group_by: &str, sum_field: &str) -> Vec<Row> {
        let mut groups: BTreeMap<String, (JsonValue, f64)> = BTreeMap::new();
        for doc in self.matching(filter) {
            let key = lookup(doc, group_by).cloned().unwrap_or(JsonValue::Null);
            let amount = lookup(doc, sum_field).and_then(JsonValue::as_f64).unwrap_or(0.0);
            let label = match &key {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            groups.entry(label).or_insert((key, 0.0)).1 += amount;
        }
        groups
            .into_values()
            .map(|(key, total)| {
                Row::new(
                    vec!["_id".to_string(), "total".to_string()],
                    vec![Value::from_json(&key), Value::Float(total)],
                )
            })
            .collect()
    }
}

fn document_row(doc: &JsonValue) -> Row {
    match doc {
        JsonValue::Object(fields) => {
            let (columns, values): (Vec<String>, Vec<Value>) = fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .unzip();
            Row::new(columns, values)
        }
        other => Row::new(vec!["value".to_string()], vec![Value::from_json(other)]),
    }
}

/// Resolves a dotted field path.
fn lookup<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn equals(field: &JsonValue, expected: &JsonValue) -> bool {
    match compare(field, expected) {
        Some(ordering) => ordering == Ordering::Equal,
        None => field == expected,
    }
}

fn predicate_holds(field: Option<&JsonValue>, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Eq(expected) => match field {
            // Scalar equality against an array field matches any element.
            Some(JsonValue::Array(items)) if !expected.is_array() => {
                items.iter().any(|item| equals(item, expected))
            }
            Some(value) => equals(value, expected),
            None => expected.is_null(),
        },
        Predicate::Gt(bound) => {
            field.and_then(|value| compare(value, bound)) == Some(Ordering::Greater)
        }
        Predicate::In(candidates) => {
            field.is_some_and(|value| candidates.iter().any(|c| equals(value, c)))
        }
        Predicate::SizeGt(n) => field
            .and_then(JsonValue::as_array)
            .is_some_and(|items| items.len() > *n),
    }
}

pub(crate) fn matches(doc: &JsonValue, filter: &Filter) -> bool {
    filter
        .clauses
        .iter()
        .all(|(path, predicate)| predicate_holds(lookup(doc, path), predicate))
}

fn apply_update(doc: &mut JsonValue, update: &Update) -> CoreResult<()> {
    let fields: &mut Map<String, JsonValue> = doc
        .as_object_mut()
        .ok_or_else(|| CoreError::Backend("cannot update a non-object document".into()))?;

    for op in &update.ops {
        match op {
            UpdateOp::Inc(field, by) => {
                let next = match fields.get(field) {
                    None | Some(JsonValue::Null) => JsonValue::from(*by),
                    Some(JsonValue::Number(n)) => match n.as_i64() {
                        Some(i) => JsonValue::from(i + by),
                        None => JsonValue::from(n.as_f64().unwrap_or_default() + *by as f64),
                    },
                    Some(other) => {
                        return Err(CoreError::Backend(format!(
                            "cannot increment non-numeric field `{field}` ({other})"
                        )))
                    }
                };
                fields.insert(field.clone(), next);
            }
            UpdateOp::Push(field, value) => match fields.get_mut(field) {
                Some(JsonValue::Array(items)) => items.push(value.clone()),
                None | Some(JsonValue::Null) => {
                    fields.insert(field.clone(), JsonValue::Array(vec![value.clone()]));
                }
                Some(_) => {
                    return Err(CoreError::Backend(format!(
                        "cannot push to non-array field `{field}`"
                    )))
                }
            },
            UpdateOp::Set(field, value) => {
                fields.insert(field.clone(), value.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn products() -> Collection {
        let mut c = Collection::default();
        c.insert("products", json!({"_id": "p1", "inventory": 2, "tags": ["a", "b"]}))
            .unwrap();
        c.insert("products", json!({"_id": "p2", "inventory": 0, "tags": []}))
            .unwrap();
        c
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut c = products();
        let err = c.insert("products", json!({"_id": "p1"})).unwrap_err();
        assert!(matches!(err, CoreError::Backend(_)));
    }

    #[test]
    fn test_insert_assigns_id() {
        let mut c = Collection::default();
        c.insert("events", json!({"region": "region0"})).unwrap();
        let doc = c.docs.values().next().unwrap();
        assert!(doc["_id"].is_string());
    }

    #[test]
    fn test_conditional_decrement() {
        let mut c = products();
        let cmd = DocumentCommand::UpdateOne {
            collection: "products".into(),
            filter: Filter::all().eq("_id", "p1").gt("inventory", 0),
            update: Update::new().inc("inventory", -1),
        };
        assert_eq!(c.apply(&cmd).unwrap().affected, 1);
        assert_eq!(c.apply(&cmd).unwrap().affected, 1);
        assert_eq!(c.apply(&cmd).unwrap().affected, 0);
        assert_eq!(c.docs["p1"]["inventory"], json!(0));
    }

    #[test]
    fn test_predicates() {
        let c = products();
        let doc = &c.docs["p1"];
        assert!(matches(doc, &Filter::all().size_gt("tags", 1)));
        assert!(!matches(doc, &Filter::all().size_gt("tags", 2)));
        assert!(matches(doc, &Filter::all().eq("tags", "b")));
        assert!(matches(doc, &Filter::all().is_in("_id", vec![json!("p0"), json!("p1")])));
        assert!(!matches(doc, &Filter::all().eq("missing", 1)));
    }

    #[test]
    fn test_push_and_group_sum() {
        let mut c = Collection::default();
        for (region, value) in [("r1", 1.0), ("r2", 2.5), ("r1", 3.0)] {
            c.insert("events", json!({"region": region, "metric_value": value}))
                .unwrap();
        }
        let out = c.read(&DocumentCommand::GroupSum {
            collection: "events".into(),
            filter: Filter::all(),
            group_by: "region".into(),
            sum_field: "metric_value".into(),
        });
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].scan::<String>(0).unwrap(), "r1");
        assert_eq!(out.rows[0].scan::<f64>(1).unwrap(), 4.0);

        let mut timelines = Collection::default();
        timelines
            .insert("timelines", json!({"_id": "user0", "post_ids": []}))
            .unwrap();
        timelines
            .apply(&DocumentCommand::UpdateOne {
                collection: "timelines".into(),
                filter: Filter::all().eq("_id", "user0"),
                update: Update::new().push("post_ids", "post-1"),
            })
            .unwrap();
        assert_eq!(timelines.docs["user0"]["post_ids"], json!(["post-1"]));
    }
}
