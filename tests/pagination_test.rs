mod common;

use dynorm::{json, Condition, KeyCondition, ModelError, QueryRequest, ScanRequest};

async fn seed(registry: &std::sync::Arc<dynorm::Registry>) {
    let author = registry.model("Author").unwrap();
    let mut alice = author.from_value(json!({"id": "1", "name": "Alice"})).unwrap();
    alice
        .set("articles", json!([{"id": "10", "title": "a"}, {"id": "11", "title": "b"}, {"id": "12", "title": "c"}]))
        .unwrap();
    alice.create().await.unwrap();
}

#[tokio::test]
async fn scan_fetches_one_page_per_call() {
    let (registry, _) = common::blog();
    seed(&registry).await;
    let article = registry.model("Article").unwrap();

    let mut cursor = article.scan(ScanRequest::new().limit(1)).await.unwrap();
    assert_eq!(cursor.items().len(), 1);
    let mut pages = 1;
    while cursor.more_pages() {
        cursor.next().await.unwrap();
        pages += 1;
    }
    assert_eq!(pages, 4);
    assert_eq!(cursor.items().len(), 4);
    assert!(matches!(cursor.next().await, Err(ModelError::PagesExhausted)));

    let names: Vec<_> = cursor.items().iter().map(|e| e.model().name().to_string()).collect();
    assert_eq!(names, vec!["Article", "Article", "Article", "Author"]);
}

#[tokio::test]
async fn scan_all_applies_the_filter_after_the_limit() {
    let (registry, _) = common::blog();
    seed(&registry).await;
    let author = registry.model("Author").unwrap();

    let filter = Condition::Equals("entity".into(), json!("Article"));
    let cursor = author.scan_all(ScanRequest::new().filter(filter).limit(2)).await.unwrap();
    let items = cursor.into_items();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item.model().name() == "Article"));
    assert_eq!(items[0].get("authorId"), Some(&json!("1")));
}

#[tokio::test]
async fn query_walks_an_index_in_both_directions() {
    let (registry, store) = common::blog();
    seed(&registry).await;
    let article = registry.model("Article").unwrap();

    let by_author = QueryRequest::new(KeyCondition::equals("authorId", "Author-1"))
        .index("byAuthor")
        .filter(Condition::BeginsWith("pk".into(), "Article-".into()));
    let forward = article.query_all(by_author.clone()).await.unwrap();
    let ids: Vec<_> = forward.items().iter().map(|e| e.get("id").cloned().unwrap()).collect();
    assert_eq!(ids, vec![json!("10"), json!("11"), json!("12")]);

    let mut backward = article.query(by_author.backward().limit(1)).await.unwrap();
    assert!(backward.last_page_items().is_empty());
    assert!(backward.more_pages());
    backward.next().await.unwrap();
    assert_eq!(backward.last_page_items()[0].get("id"), Some(&json!("12")));
    assert_eq!(store.queries(), 3);
}

#[tokio::test]
async fn query_by_key_prefixes_the_partition_value() {
    let (registry, _) = common::blog();
    seed(&registry).await;
    let article = registry.model("Article").unwrap();

    let cursor = article.query_all(article.query_by_key("11")).await.unwrap();
    assert_eq!(cursor.items().len(), 1);
    assert_eq!(cursor.items()[0].get("title"), Some(&json!("b")));
}
