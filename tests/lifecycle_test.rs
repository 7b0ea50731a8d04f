mod common;

use common::TABLE;
use dynorm::{json, EntityState, ModelError, StorageClient};

#[tokio::test]
async fn create_stores_the_owner_and_its_children_in_one_transaction() {
    let (registry, store) = common::blog();
    let author = registry.model("Author").unwrap();
    let mut alice = author.from_value(json!({"id": "1", "name": " Alice ", "profile": {"text": "hi"}})).unwrap();
    alice.set("articles", json!([{"id": "10", "title": "First"}])).unwrap();

    alice.create().await.unwrap();
    assert_eq!(alice.state(), EntityState::Persisted);
    assert_eq!(store.transactions(), 1);
    assert!(alice.get("createdAt").is_some());

    let stored = store.find("Author-1").unwrap();
    assert_eq!(stored["id"], json!("Author-1"));
    assert_eq!(stored["sk"], json!("Author-1"));
    assert_eq!(stored["entity"], json!("Author"));
    assert_eq!(stored["name"], json!("Alice"));
    assert_eq!(stored["profile"], json!({"text": "hi"}));
    assert_eq!(stored["authorId"], json!("Author-1"));

    let article = store.find("Article-10").unwrap();
    assert_eq!(article["entity"], json!("Article"));
    assert_eq!(article["authorId"], json!("Author-1"));
    assert!(article["createdAt"].is_string());
    assert!(store.find("Bio-1").is_none());
}

#[tokio::test]
async fn invalid_entities_are_not_written() {
    let (registry, store) = common::blog();
    let author = registry.model("Author").unwrap();

    let mut nameless = author.from_value(json!({"id": "1"})).unwrap();
    let err = nameless.create().await.unwrap_err();
    assert!(matches!(err, ModelError::Validation(_)));
    assert_eq!(err.to_string(), "\"name\" is required");

    let mut bob = author.from_value(json!({"id": "2", "name": "Bob"})).unwrap();
    bob.set("articles", json!([{"id": "20"}])).unwrap();
    assert!(matches!(bob.create().await, Err(ModelError::Validation(_))));

    let mut empty = registry.model("Draft").unwrap().entity();
    assert!(matches!(empty.create().await, Err(ModelError::EmptyInstance)));

    assert_eq!(store.transactions(), 0);
    assert!(store.items().is_empty());
}

#[tokio::test]
async fn update_keeps_the_creation_time() {
    let (registry, store) = common::blog();
    let author = registry.model("Author").unwrap();
    let mut alice = author.from_value(json!({"id": "1", "name": "Alice"})).unwrap();
    alice.create().await.unwrap();
    let created = store.find("Author-1").unwrap()["createdAt"].clone();

    let mut loaded = author.get_item(json!({"id": "1"})).await.unwrap();
    assert_eq!(loaded.get("name"), Some(&json!("Alice")));
    assert_eq!(loaded.get("id"), Some(&json!("1")));
    loaded.set("name", "Alicia").unwrap();
    loaded.update().await.unwrap();

    assert_eq!(loaded.get("name"), Some(&json!("Alicia")));
    assert_eq!(loaded.get("createdAt"), Some(&created));
    let stored = store.find("Author-1").unwrap();
    assert_eq!(stored["createdAt"], created);
    assert!(stored["updatedAt"].is_string());
    assert_eq!(stored["pk"], json!("Author-1"));
}

#[tokio::test]
async fn missing_records_are_not_found() {
    let (registry, _) = common::blog();
    let author = registry.model("Author").unwrap();
    assert!(matches!(author.get_item(json!({"id": "404"})).await, Err(ModelError::NotFound)));

    let err = author.delete_item(json!({"id": "404"})).await.unwrap_err();
    assert!(matches!(err, ModelError::NotFound));
    assert_eq!(err.to_string(), "Record not found");
}

#[tokio::test]
async fn delete_refuses_records_of_another_model() {
    let (registry, store) = common::blog();
    let foreign = json!({"pk": "Author-9", "sk": "Author-9", "entity": "Article", "id": "9", "title": "x"});
    store.put(TABLE, foreign.as_object().cloned().unwrap(), None).await.unwrap();

    let author = registry.model("Author").unwrap();
    assert!(matches!(author.delete_item(json!({"id": "9"})).await, Err(ModelError::NotFound)));
    assert!(store.find("Author-9").is_some());
}

#[tokio::test]
async fn deleted_entities_leave_the_table() {
    let (registry, store) = common::blog();
    let author = registry.model("Author").unwrap();
    for (id, name) in [("1", "Alice"), ("2", "Bob")] {
        author.from_value(json!({"id": id, "name": name})).unwrap().create().await.unwrap();
    }

    let mut alice = author.from_value(json!({"id": "1"})).unwrap();
    alice.delete().await.unwrap();
    assert_eq!(alice.state(), EntityState::Deleted);
    assert!(store.find("Author-1").is_none());

    let bob = author.delete_item(json!({"id": "Author-2"})).await.unwrap();
    assert_eq!(bob.get("name"), Some(&json!("Bob")));
    assert_eq!(bob.state(), EntityState::Deleted);
    assert!(store.items().is_empty());
}
