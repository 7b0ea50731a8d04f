//! The storage collaborator: a single table addressed by partition/sort key, written through
//! conditional puts, updates, deletes and transactions, and read by key, index query or scan
//! one page at a time.

pub mod memory;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// A stored record, attribute name to value.
pub type Item = crate::Record;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("The conditional request failed")]
    ConditionalCheckFailed,

    #[error("Transaction cancelled: {0}")]
    TransactionCanceled(String),

    #[error("storage backend failure: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend(message.into().into())
    }
}

/// Condition evaluated against the current version of an item; `None` stands for absence.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(String, Value),
    Exists(String),
    NotExists(String),
    BeginsWith(String, String),
    And(Vec<Condition>),
}

impl Condition {
    pub fn matches(&self, item: Option<&Item>) -> bool {
        let attribute = |name: &str| item.and_then(|item| item.get(name));
        match self {
            Condition::Equals(name, expected) => attribute(name) == Some(expected),
            Condition::Exists(name) => attribute(name).is_some(),
            Condition::NotExists(name) => attribute(name).is_none(),
            Condition::BeginsWith(name, prefix) => {
                attribute(name).and_then(Value::as_str).is_some_and(|value| value.starts_with(prefix.as_str()))
            }
            Condition::And(conditions) => conditions.iter().all(|condition| condition.matches(item)),
        }
    }
}

/// Structured SET / SET-if-not-exists / REMOVE update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpression {
    assignments: Item,
    defaults: Item,
    removals: Vec<String>,
}

impl UpdateExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: Value) -> Self {
        self.assignments.insert(name.into(), value);
        self
    }

    /// Assigns only when the attribute is not stored yet.
    pub fn set_if_not_exists(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(name.into(), value);
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.removals.push(name.into());
        self
    }

    pub fn assignments(&self) -> &Item {
        &self.assignments
    }

    pub fn defaults(&self) -> &Item {
        &self.defaults
    }

    pub fn removals(&self) -> &[String] {
        &self.removals
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.defaults.is_empty() && self.removals.is_empty()
    }

    pub fn apply(&self, item: &mut Item) {
        for (name, value) in &self.assignments {
            item.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.defaults {
            if !item.contains_key(name) {
                item.insert(name.clone(), value.clone());
            }
        }
        for name in &self.removals {
            item.shift_remove(name);
        }
    }
}

/// One element of an all-or-nothing transactional write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { item: Item, condition: Option<Condition> },
    Update { key: Item, expression: UpdateExpression, condition: Option<Condition> },
    Delete { key: Item, condition: Option<Condition> },
}

/// Equality on the index partition attribute, optionally narrowed on the sort attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub attribute: String,
    pub value: Value,
    pub sort: Option<Condition>,
}

impl KeyCondition {
    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        KeyCondition { attribute: attribute.into(), value: value.into(), sort: None }
    }

    pub fn and_sort(mut self, condition: Condition) -> Self {
        self.sort = Some(condition);
        self
    }

    pub(crate) fn matches(&self, item: &Item) -> bool {
        item.get(&self.attribute) == Some(&self.value) && self.sort.as_ref().map_or(true, |sort| sort.matches(Some(item)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub index: Option<String>,
    pub key: KeyCondition,
    pub filter: Option<Condition>,
    pub limit: Option<usize>,
    pub exclusive_start: Option<Item>,
    pub forward: bool,
}

impl QueryRequest {
    pub fn new(key: KeyCondition) -> Self {
        QueryRequest { index: None, key, filter: None, limit: None, exclusive_start: None, forward: true }
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn backward(mut self) -> Self {
        self.forward = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    pub index: Option<String>,
    pub filter: Option<Condition>,
    pub limit: Option<usize>,
    pub exclusive_start: Option<Item>,
}

impl ScanRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One result page; `continuation` is present while more items remain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub continuation: Option<Item>,
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn get(&self, table: &str, key: &Item) -> Result<Option<Item>, StorageError>;

    /// Returns the replaced item, if any.
    async fn put(&self, table: &str, item: Item, condition: Option<Condition>) -> Result<Option<Item>, StorageError>;

    /// Creates the item when absent; returns the item as stored after the update.
    async fn update(
        &self,
        table: &str,
        key: &Item,
        expression: UpdateExpression,
        condition: Option<Condition>,
    ) -> Result<Item, StorageError>;

    /// Returns the deleted item, if any.
    async fn delete(&self, table: &str, key: &Item, condition: Option<Condition>) -> Result<Option<Item>, StorageError>;

    async fn transact_write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StorageError>;

    async fn query(&self, table: &str, request: &QueryRequest) -> Result<Page, StorageError>;

    async fn scan(&self, table: &str, request: &ScanRequest) -> Result<Page, StorageError>;
}

static DEFAULT_CLIENT: OnceCell<Arc<dyn StorageClient>> = OnceCell::new();

/// Installs the process-wide client used by registries built with `use_default_client`.
/// Returns false when a default was already installed.
pub fn install_default_client(client: Arc<dyn StorageClient>) -> bool {
    DEFAULT_CLIENT.set(client).is_ok()
}

pub fn default_client() -> Option<Arc<dyn StorageClient>> {
    DEFAULT_CLIENT.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn conditions_treat_absence_explicitly() {
        let stored = item(json!({"entity": "User", "pk": "User-1"}));
        assert!(Condition::Equals("entity".into(), json!("User")).matches(Some(&stored)));
        assert!(!Condition::Equals("entity".into(), json!("User")).matches(None));
        assert!(Condition::NotExists("pk".into()).matches(None));
        assert!(Condition::And(vec![Condition::Exists("pk".into()), Condition::BeginsWith("pk".into(), "User-".into())])
            .matches(Some(&stored)));
    }

    #[test]
    fn set_if_not_exists_keeps_stored_values() {
        let mut stored = item(json!({"createdAt": "a", "name": "x"}));
        UpdateExpression::new()
            .set("name", json!("y"))
            .set_if_not_exists("createdAt", json!("b"))
            .set_if_not_exists("updatedAt", json!("c"))
            .remove("gone")
            .apply(&mut stored);
        assert_eq!(Value::Object(stored), json!({"createdAt": "a", "name": "y", "updatedAt": "c"}));
    }
}
