#![allow(dead_code)]

use async_trait::async_trait;
use dynorm::{
    Item, MemoryStore, ModelBuilder, Page, Property, QueryRequest, Registry, RegistryBuilder, Relation, ScanRequest, Schema,
    StorageClient, StorageError, TableConfig, UpdateExpression, WriteOp, Condition,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TABLE: &str = "blog";

/// Memory store that counts the queries and transactions it serves.
pub struct CountingStore {
    inner: MemoryStore,
    queries: AtomicUsize,
    transactions: AtomicUsize,
}

impl CountingStore {
    pub fn new(table: &TableConfig) -> Self {
        CountingStore { inner: MemoryStore::for_table(table), queries: AtomicUsize::new(0), transactions: AtomicUsize::new(0) }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    pub fn items(&self) -> Vec<Item> {
        self.inner.items(TABLE).unwrap()
    }

    pub fn find(&self, pk: &str) -> Option<Item> {
        self.items().into_iter().find(|item| item["pk"] == pk)
    }
}

#[async_trait]
impl StorageClient for CountingStore {
    async fn get(&self, table: &str, key: &Item) -> Result<Option<Item>, StorageError> {
        self.inner.get(table, key).await
    }

    async fn put(&self, table: &str, item: Item, condition: Option<Condition>) -> Result<Option<Item>, StorageError> {
        self.inner.put(table, item, condition).await
    }

    async fn update(
        &self,
        table: &str,
        key: &Item,
        expression: UpdateExpression,
        condition: Option<Condition>,
    ) -> Result<Item, StorageError> {
        self.inner.update(table, key, expression, condition).await
    }

    async fn delete(&self, table: &str, key: &Item, condition: Option<Condition>) -> Result<Option<Item>, StorageError> {
        self.inner.delete(table, key, condition).await
    }

    async fn transact_write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        self.inner.transact_write(table, ops).await
    }

    async fn query(&self, table: &str, request: &QueryRequest) -> Result<Page, StorageError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(table, request).await
    }

    async fn scan(&self, table: &str, request: &ScanRequest) -> Result<Page, StorageError> {
        self.inner.scan(table, request).await
    }
}

/// Authors own articles and drafts through the same foreign key and index, and embed a profile.
/// Editors are authors with a desk.
pub fn blog() -> (Arc<Registry>, Arc<CountingStore>) {
    let table = TableConfig::new(TABLE);
    let store = Arc::new(CountingStore::new(&table));
    let registry = RegistryBuilder::new(table)
        .client(store.clone())
        .model(
            ModelBuilder::new("Author")
                .define("id", Property::new().primary_key())
                .define("name", Property::new().schema(Schema::string().trim().required()))
                .define("createdAt", Property::new().created_at())
                .define("updatedAt", Property::new().updated_at())
                .define("profile", Property::new().relation(Relation::has_one("Bio").nested()))
                .define("articles", Property::new().relation(Relation::has_many("Article").foreign_key("authorId").index("byAuthor")))
                .define("drafts", Property::new().relation(Relation::has_many("Draft").foreign_key("authorId").index("byAuthor"))),
        )
        .model(ModelBuilder::new("Editor").extends("Author").define("desk", Property::new().schema(Schema::string())))
        .model(ModelBuilder::new("Bio").define("text", Property::new().schema(Schema::string().required())))
        .model(
            ModelBuilder::new("Article")
                .define("id", Property::new().primary_key())
                .define("title", Property::new().schema(Schema::string().required()))
                .define("createdAt", Property::new().created_at())
                .define("updatedAt", Property::new().updated_at()),
        )
        .model(
            ModelBuilder::new("Draft")
                .define("id", Property::new().primary_key())
                .define("title", Property::new().schema(Schema::string())),
        )
        .build()
        .unwrap();
    (registry, store)
}
