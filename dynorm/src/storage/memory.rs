use super::{Condition, Item, Page, QueryRequest, ScanRequest, StorageClient, StorageError, UpdateExpression, WriteOp};
use crate::config::TableConfig;
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

type RowKey = (String, String);
type Rows = BTreeMap<RowKey, Item>;

/// In-process table store keyed like the configured table, ordered by (partition, sort) key.
///
/// Queries and scans walk rows in key order; `limit` counts evaluated rows before the filter is
/// applied and a continuation is returned only when rows remain past the page.
#[derive(Debug)]
pub struct MemoryStore {
    partition_key: String,
    sort_key: Option<String>,
    tables: Mutex<HashMap<String, Rows>>,
}

impl MemoryStore {
    pub fn for_table(config: &TableConfig) -> Self {
        MemoryStore { partition_key: config.partition_key.clone(), sort_key: config.sort_key.clone(), tables: Mutex::new(HashMap::new()) }
    }

    /// Every stored item of `table` in key order.
    pub fn items(&self, table: &str) -> Result<Vec<Item>, StorageError> {
        Ok(self.lock()?.get(table).map(|rows| rows.values().cloned().collect()).unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Rows>>, StorageError> {
        self.tables.lock().map_err(|_| StorageError::backend("memory store lock poisoned"))
    }

    fn row_key(&self, item: &Item) -> Result<RowKey, StorageError> {
        let part = |name: &str| {
            item.get(name)
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .ok_or_else(|| StorageError::backend(format!("key attribute '{name}' must be a string")))
        };
        let partition = part(&self.partition_key)?;
        let sort = match &self.sort_key {
            Some(name) => part(name)?,
            None => String::new(),
        };
        Ok((partition, sort))
    }

    fn key_only(&self, item: &Item) -> Item {
        let mut key = Item::new();
        for name in std::iter::once(&self.partition_key).chain(self.sort_key.iter()) {
            if let Some(value) = item.get(name) {
                key.insert(name.clone(), value.clone());
            }
        }
        key
    }

    fn check(condition: Option<&Condition>, current: Option<&Item>) -> Result<(), StorageError> {
        match condition {
            Some(condition) if !condition.matches(current) => Err(StorageError::ConditionalCheckFailed),
            _ => Ok(()),
        }
    }

    fn updated(&self, key: &Item, current: Option<&Item>, expression: &UpdateExpression) -> Item {
        let mut item = current.cloned().unwrap_or_else(|| self.key_only(key));
        expression.apply(&mut item);
        item
    }

    fn page(&self, rows: Vec<&Item>, matches: impl Fn(&Item) -> bool, filter: Option<&Condition>, limit: Option<usize>) -> Page {
        let mut candidates = rows.into_iter().filter(|item| matches(*item)).peekable();
        let mut items = Vec::new();
        let mut evaluated = 0;
        let mut last: Option<&Item> = None;
        while let Some(item) = candidates.next() {
            evaluated += 1;
            last = Some(item);
            if filter.map_or(true, |filter| filter.matches(Some(item))) {
                items.push(item.clone());
            }
            if limit.is_some_and(|limit| evaluated >= limit) {
                break;
            }
        }
        let continuation = match (last, candidates.peek()) {
            (Some(last), Some(_)) => Some(self.key_only(last)),
            _ => None,
        };
        Page { items, continuation }
    }

    /// Rows strictly after `start` in walking order.
    fn rows_from<'a>(&self, rows: &'a Rows, start: Option<&Item>, forward: bool) -> Result<Vec<&'a Item>, StorageError> {
        let start = start.map(|start| self.row_key(start)).transpose()?;
        Ok(match (start, forward) {
            (Some(row), true) => rows.range((Bound::Excluded(row), Bound::Unbounded)).map(|(_, item)| item).collect(),
            (Some(row), false) => rows.range(..row).rev().map(|(_, item)| item).collect(),
            (None, true) => rows.values().collect(),
            (None, false) => rows.values().rev().collect(),
        })
    }
}

#[async_trait]
impl StorageClient for MemoryStore {
    async fn get(&self, table: &str, key: &Item) -> Result<Option<Item>, StorageError> {
        let row = self.row_key(key)?;
        Ok(self.lock()?.get(table).and_then(|rows| rows.get(&row)).cloned())
    }

    async fn put(&self, table: &str, item: Item, condition: Option<Condition>) -> Result<Option<Item>, StorageError> {
        let row = self.row_key(&item)?;
        let mut tables = self.lock()?;
        let rows = tables.entry(table.to_string()).or_default();
        Self::check(condition.as_ref(), rows.get(&row))?;
        Ok(rows.insert(row, item))
    }

    async fn update(
        &self,
        table: &str,
        key: &Item,
        expression: UpdateExpression,
        condition: Option<Condition>,
    ) -> Result<Item, StorageError> {
        let row = self.row_key(key)?;
        let mut tables = self.lock()?;
        let rows = tables.entry(table.to_string()).or_default();
        Self::check(condition.as_ref(), rows.get(&row))?;
        let item = self.updated(key, rows.get(&row), &expression);
        rows.insert(row, item.clone());
        Ok(item)
    }

    async fn delete(&self, table: &str, key: &Item, condition: Option<Condition>) -> Result<Option<Item>, StorageError> {
        let row = self.row_key(key)?;
        let mut tables = self.lock()?;
        let rows = tables.entry(table.to_string()).or_default();
        Self::check(condition.as_ref(), rows.get(&row))?;
        Ok(rows.remove(&row))
    }

    async fn transact_write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        let rows = tables.entry(table.to_string()).or_default();

        let mut keyed = Vec::with_capacity(ops.len());
        for op in &ops {
            let (key, condition) = match op {
                WriteOp::Put { item, condition } => (item, condition),
                WriteOp::Update { key, condition, .. } => (key, condition),
                WriteOp::Delete { key, condition } => (key, condition),
            };
            let row = self.row_key(key)?;
            if keyed.contains(&row) {
                return Err(StorageError::TransactionCanceled(format!("multiple operations on item {row:?}")));
            }
            if !condition.as_ref().map_or(true, |condition| condition.matches(rows.get(&row))) {
                return Err(StorageError::TransactionCanceled(format!("ConditionalCheckFailed on item {row:?}")));
            }
            keyed.push(row);
        }

        debug!("memory store: applying {} transactional writes to {}", ops.len(), table);
        for (op, row) in ops.into_iter().zip(keyed) {
            match op {
                WriteOp::Put { item, .. } => {
                    rows.insert(row, item);
                }
                WriteOp::Update { key, expression, .. } => {
                    let item = self.updated(&key, rows.get(&row), &expression);
                    rows.insert(row, item);
                }
                WriteOp::Delete { .. } => {
                    rows.remove(&row);
                }
            }
        }
        Ok(())
    }

    async fn query(&self, table: &str, request: &QueryRequest) -> Result<Page, StorageError> {
        let tables = self.lock()?;
        let Some(rows) = tables.get(table) else {
            return Ok(Page::default());
        };
        let candidates = self.rows_from(rows, request.exclusive_start.as_ref(), request.forward)?;
        let page = self.page(candidates, |item| request.key.matches(item), request.filter.as_ref(), request.limit);
        debug!("memory store: query on {:?} returned {} items", request.index, page.items.len());
        Ok(page)
    }

    /// Scans ignore `index`: every row of the table is visited.
    async fn scan(&self, table: &str, request: &ScanRequest) -> Result<Page, StorageError> {
        let tables = self.lock()?;
        let Some(rows) = tables.get(table) else {
            return Ok(Page::default());
        };
        let candidates = self.rows_from(rows, request.exclusive_start.as_ref(), true)?;
        Ok(self.page(candidates, |_| true, request.filter.as_ref(), request.limit))
    }
}
