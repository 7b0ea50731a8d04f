use crate::model::{Composite, ModelBuilder, Property, Registry, RegistryBuilder, Relation};
use crate::schema::Schema;
use crate::storage::memory::MemoryStore;
use crate::storage::StorageClient;
use crate::TableConfig;
use serde_json::Value;
use std::sync::Arc;

pub(crate) const TABLE: &str = "entities";

fn models() -> Vec<ModelBuilder> {
    vec![
        ModelBuilder::new("User")
            .define("id", Property::new().primary_key().alias("key"))
            .define("name", Property::new().schema(Schema::string().trim().required()))
            .define("email", Property::new().alias("mail").schema(Schema::string()))
            .define("age", Property::new().schema(Schema::integer().min(0.0)))
            .define("createdAt", Property::new().created_at())
            .define("updatedAt", Property::new().updated_at())
            .define("profile", Property::new().relation(Relation::has_one("Profile").nested()))
            .define("posts", Property::new().relation(Relation::has_many("Post").foreign_key("userId").index("byUser")))
            .define("addresses", Property::new().relation(Relation::has_many("Address").nested().tolerate_invalid())),
        ModelBuilder::new("Admin").extends("User").define("level", Property::new().schema(Schema::integer())),
        ModelBuilder::new("Profile").define("bio", Property::new().schema(Schema::string().required())),
        ModelBuilder::new("Post")
            .define("id", Property::new().primary_key())
            .define("title", Property::new().schema(Schema::string().required()))
            .define("userId", Property::new()),
        ModelBuilder::new("Address")
            .define("city", Property::new().schema(Schema::string().required()))
            .define("zip", Property::new().schema(Schema::string())),
        ModelBuilder::new("Comment")
            .define("thread", Property::new().primary_key())
            .define("at", Property::new().secondary_key().schema(Schema::date()))
            .define("text", Property::new().schema(Schema::string())),
        ModelBuilder::new("Order")
            .define("id", Property::new().primary_key().composite(Composite::of(["tenant", "number"])))
            .define("tenant", Property::new())
            .define("number", Property::new()),
        ModelBuilder::new("Invoice")
            .define("id", Property::new().primary_key())
            .define("lines", Property::new().relation(Relation::has_many("Line").nested().required()))
            .define("billing", Property::new().relation(Relation::has_one("Billing").nested().required())),
        ModelBuilder::new("Line").define("sku", Property::new().schema(Schema::string().required())),
        ModelBuilder::new("Billing").define("name", Property::new().schema(Schema::string())),
    ]
}

pub(crate) fn registry_with_store() -> (Arc<Registry>, Arc<MemoryStore>) {
    let table = TableConfig::new(TABLE);
    let store = Arc::new(MemoryStore::for_table(&table));
    let registry = models()
        .into_iter()
        .fold(RegistryBuilder::new(table).client(store.clone()), |builder, model| builder.model(model))
        .build()
        .unwrap();
    (registry, store)
}

pub(crate) fn registry() -> Arc<Registry> {
    registry_with_store().0
}

pub(crate) async fn seed(store: &MemoryStore, items: &[Value]) {
    for item in items {
        store.put(TABLE, item.as_object().cloned().unwrap(), None).await.unwrap();
    }
}
