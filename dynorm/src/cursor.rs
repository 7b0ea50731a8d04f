//! Page-by-page cursor over query and scan results.

use crate::entity::Entity;
use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::storage::{Item, QueryRequest, ScanRequest};
use log::debug;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum PageRequest {
    Scan(ScanRequest),
    Query(QueryRequest),
}

/// Accumulates entities page by page.
///
/// A cursor starts with no page fetched. Each [`Cursor::next`] fetches exactly one page, after
/// which `more_pages` follows the page's continuation token. Records are materialized as the
/// model their discriminator names when that model is a relation target or subclass of the
/// querying model, and as the querying model otherwise.
#[derive(Debug)]
pub struct Cursor {
    model: Model,
    request: PageRequest,
    fetched: bool,
    continuation: Option<Item>,
    items: Vec<Entity>,
    last_page_start: usize,
}

impl Cursor {
    /// A start key already set on `request` is where the first page begins.
    pub fn new(model: Model, request: PageRequest) -> Self {
        let continuation = match &request {
            PageRequest::Scan(scan) => scan.exclusive_start.clone(),
            PageRequest::Query(query) => query.exclusive_start.clone(),
        };
        Cursor { model, request, fetched: false, continuation, items: Vec::new(), last_page_start: 0 }
    }

    pub fn more_pages(&self) -> bool {
        !self.fetched || self.continuation.is_some()
    }

    /// Every entity fetched so far.
    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    pub fn last_page_items(&self) -> &[Entity] {
        &self.items[self.last_page_start..]
    }

    pub fn into_items(self) -> Vec<Entity> {
        self.items
    }

    /// Fetches one more page; fails with [`ModelError::PagesExhausted`] once the last page was
    /// fetched.
    pub async fn next(&mut self) -> Result<&mut Self> {
        if !self.more_pages() {
            return Err(ModelError::PagesExhausted);
        }
        let client = self.model.client();
        let table = self.model.table().table_name.clone();
        let page = match &mut self.request {
            PageRequest::Scan(request) => {
                request.exclusive_start = self.continuation.clone();
                client.scan(&table, request).await?
            }
            PageRequest::Query(request) => {
                request.exclusive_start = self.continuation.clone();
                client.query(&table, request).await?
            }
        };
        let entities = page.items.into_iter().map(|item| materialize(&self.model, item)).collect::<Result<Vec<_>>>()?;
        debug!("cursor on {}: fetched {} items", self.model.name(), entities.len());

        self.last_page_start = self.items.len();
        self.items.extend(entities);
        self.fetched = true;
        self.continuation = page.continuation;
        Ok(self)
    }

    /// Fetches every remaining page.
    pub async fn get_all(&mut self) -> Result<&mut Self> {
        while self.more_pages() {
            self.next().await?;
        }
        Ok(self)
    }
}

fn materialize(model: &Model, item: Item) -> Result<Entity> {
    let discriminator = item.get(&model.table().entity_column).and_then(Value::as_str);
    let target = match discriminator {
        Some(name) if name != model.name() => model.dispatch(name).unwrap_or_else(|| model.clone()),
        _ => model.clone(),
    };
    target.from_item(item)
}
