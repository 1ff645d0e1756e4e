//! Generic document operations the stores are written against.

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use uuid::Uuid;

/// A CRUD-capable store of JSON documents grouped into collections.
///
/// Every document carries its identifier in the `_id` field. Implementations
/// must be safe to share between concurrent callers and must apply each
/// [`Update`] to a single document atomically.
pub trait DocumentStore: Send + Sync {
    /// Inserts `document` and returns the identifier the store recorded for it.
    fn insert_one(&self, collection: &str, document: Value) -> Result<Uuid>;

    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// All matching documents, in insertion order.
    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>>;

    /// Applies `update` to the first matching document. Returns `false` when
    /// nothing matched.
    fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> Result<bool>;
}

/// Conjunction of field equality checks. Field names may be dotted paths
/// into nested objects; numeric segments index arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn id(id: Uuid) -> Self {
        Self::eq("_id", Value::String(id.to_string()))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| lookup(document, field) == Some(expected))
    }
}

/// A single write applied to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Replace the value at `path`, like `$set`.
    Set { path: String, value: Value },
    /// Append to the array at `path`, like `$push`.
    Push { path: String, value: Value },
}

/// An ordered list of writes applied together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn push(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Push {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every op to `document`. On error the document may be
    /// partially modified; callers discard it.
    pub fn apply(&self, document: &mut Value) -> Result<()> {
        for op in &self.ops {
            match op {
                UpdateOp::Set { path, value } => {
                    let (parent, last) = parent_mut(document, path)?;
                    match parent {
                        Value::Object(map) => {
                            map.insert(last.to_string(), value.clone());
                        }
                        Value::Array(items) => {
                            let slot = index_mut(items, last, path)?;
                            *slot = value.clone();
                        }
                        _ => bail!("cannot set {path}: parent is not a container"),
                    }
                }
                UpdateOp::Push { path, value } => {
                    let (parent, last) = parent_mut(document, path)?;
                    let target = match parent {
                        Value::Object(map) => map
                            .entry(last.to_string())
                            .or_insert_with(|| Value::Array(Vec::new())),
                        Value::Array(items) => index_mut(items, last, path)?,
                        _ => bail!("cannot push to {path}: parent is not a container"),
                    };
                    match target {
                        Value::Array(items) => items.push(value.clone()),
                        _ => bail!("cannot push to {path}: not an array"),
                    }
                }
            }
        }
        Ok(())
    }
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn parent_mut<'a, 'p>(document: &'a mut Value, path: &'p str) -> Result<(&'a mut Value, &'p str)> {
    let (head, last) = match path.rsplit_once('.') {
        Some((head, last)) => (Some(head), last),
        None => (None, path),
    };
    if last.is_empty() {
        bail!("empty path segment in {path}");
    }

    let mut current = document;
    if let Some(head) = head {
        for segment in head.split('.') {
            current = match current {
                Value::Object(map) => map
                    .get_mut(segment)
                    .ok_or_else(|| anyhow!("missing field {segment} in {path}"))?,
                Value::Array(items) => index_mut(items, segment, path)?,
                _ => bail!("cannot descend into {segment} in {path}"),
            };
        }
    }
    Ok((current, last))
}

fn index_mut<'a>(items: &'a mut [Value], segment: &str, path: &str) -> Result<&'a mut Value> {
    let index: usize = segment
        .parse()
        .map_err(|_| anyhow!("expected array index, got {segment} in {path}"))?;
    let len = items.len();
    items
        .get_mut(index)
        .ok_or_else(|| anyhow!("index {index} out of bounds ({len}) in {path}"))
}
