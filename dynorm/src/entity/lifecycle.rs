use super::keys::prefixed;
use super::{Entity, EntityState, PhysicalKey, RelationSlot};
use crate::cursor::{Cursor, PageRequest};
use crate::error::{ModelError, Result};
use crate::model::{Model, Relation, RelationKind};
use crate::storage::{Condition, Item, KeyCondition, QueryRequest, ScanRequest, StorageClient, StorageError, UpdateExpression, WriteOp};
use chrono::{SecondsFormat, Utc};
use futures::future::try_join_all;
use log::{debug, warn};
use serde_json::Value;

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// One index query issued by a relation-aware load.
#[derive(Debug, Clone, PartialEq)]
struct QueryShape {
    index: String,
    attribute: String,
    value: String,
}

impl Entity {
    /// Reads the stored record for this entity's key and replaces the attributes with it.
    pub async fn load(&mut self) -> Result<()> {
        let key = self.physical_key()?;
        let model = self.model.clone();
        let table = model.table();
        let item = model.client().get(&table.table_name, &key.to_item(table)).await?.ok_or(ModelError::NotFound)?;
        self.replace_from_item(item)?;
        self.state = EntityState::Persisted;
        Ok(())
    }

    /// Puts this entity and upserts its populated not-nested relations in one transaction.
    pub async fn create(&mut self) -> Result<()> {
        self.stamp_foreign_keys()?;
        let mut attributes = self.validate_strict()?;
        if attributes.is_empty() {
            return Err(ModelError::EmptyInstance);
        }
        let model = self.model.clone();
        let stamp = now();
        for timestamp in [model.created_at(), model.updated_at()].into_iter().flatten() {
            attributes.insert(timestamp.to_string(), stamp.clone());
        }

        let key = self.physical_key()?;
        let item = self.to_item(&attributes)?;
        let mut writes = WriteSet::new(key);
        writes.push_put(item);
        self.related_writes(&mut writes, &stamp)?;

        let ops = writes.into_ops();
        debug!("create {}: {} writes", model.name(), ops.len());
        model.client().transact_write(&model.table().table_name, ops).await?;

        for timestamp in [model.created_at(), model.updated_at()].into_iter().flatten() {
            self.set(timestamp, stamp.clone())?;
        }
        self.state = EntityState::Persisted;
        Ok(())
    }

    /// Updates every validated attribute except keys and created-at, which is only set when
    /// absent, then re-reads the entity.
    pub async fn update(&mut self) -> Result<()> {
        self.stamp_foreign_keys()?;
        let attributes = self.validate_strict()?;
        if attributes.is_empty() {
            return Err(ModelError::EmptyInstance);
        }
        let model = self.model.clone();
        let table = model.table();
        let key = self.physical_key()?;
        let item = self.to_item(&attributes)?;
        let stamp = now();

        let mut expression = UpdateExpression::new();
        for (name, value) in item {
            let skipped = table.partition_key == name
                || table.sort_key.as_deref() == Some(name.as_str())
                || model.def().is_key(&name)
                || model.created_at() == Some(name.as_str());
            if !skipped {
                expression = expression.set(name, value);
            }
        }
        if let Some(created_at) = model.created_at() {
            expression = expression.set_if_not_exists(created_at, stamp.clone());
        }
        if let Some(updated_at) = model.updated_at() {
            expression = expression.set(updated_at, stamp.clone());
        }

        let key_item = key.to_item(table);
        let mut writes = WriteSet::new(key.clone());
        writes.push(key, WriteOp::Update { key: key_item, expression, condition: None });
        self.related_writes(&mut writes, &stamp)?;

        let ops = writes.into_ops();
        debug!("update {}: {} writes", model.name(), ops.len());
        model.client().transact_write(&table.table_name, ops).await?;
        self.load().await
    }

    /// Deletes the stored record, provided it belongs to this entity's model.
    pub async fn delete(&mut self) -> Result<()> {
        let key = self.physical_key()?;
        delete_stored(&self.model, &key).await?;
        self.state = EntityState::Deleted;
        Ok(())
    }

    /// Loads every queryable not-nested relation with one index query per distinct shape.
    ///
    /// Records are partitioned by discriminator into the relation slots; a record carrying this
    /// entity's own discriminator and key refreshes its attributes. Loaded children record this
    /// entity on their back reference.
    pub async fn load_with_related(&mut self) -> Result<()> {
        let model = self.model.clone();
        let table = model.table();
        let key = self.physical_key()?;

        let mut shapes: Vec<QueryShape> = Vec::new();
        let mut planned: Vec<(Relation, usize)> = Vec::new();
        for relation in model.relations().iter().filter(|r| r.is_queryable()) {
            let (Some(foreign_key), Some(index)) = (relation.get_foreign_key(), relation.get_index()) else { continue };
            let value = if relation.kind().is_child() {
                Some(key.primary.clone())
            } else {
                self.stored_attribute(foreign_key).as_ref().and_then(crate::model::composite::scalar_string)
            };
            let Some(value) = value else { continue };
            let shape = QueryShape { index: index.to_string(), attribute: foreign_key.to_string(), value };
            let position = match shapes.iter().position(|known| *known == shape) {
                Some(position) => position,
                None => {
                    shapes.push(shape);
                    shapes.len() - 1
                }
            };
            planned.push((relation.clone(), position));
        }
        debug!("load_with_related {}: {} relations over {} queries", model.name(), planned.len(), shapes.len());

        let client = model.client();
        let results = try_join_all(shapes.iter().map(|shape| query_shape(client.as_ref(), &table.table_name, shape))).await?;

        let own_name = Value::String(model.name().to_string());
        let own_key = key.to_item(table);
        let own_record = results.iter().flatten().find(|item| {
            item.get(&table.entity_column) == Some(&own_name) && own_key.iter().all(|(column, value)| item.get(column) == Some(value))
        });
        if let Some(own_record) = own_record {
            self.replace_from_item(own_record.clone())?;
            self.state = EntityState::Persisted;
        }

        let snapshot = self.detached();
        for (relation, position) in planned {
            let target = model.target_of(&relation)?;
            let mut related = Vec::new();
            for item in &results[position] {
                let Some(discriminator) = item.get(&table.entity_column).and_then(Value::as_str) else { continue };
                let Some(found) = model.sibling(discriminator).filter(|found| found.is_a(&target)) else { continue };
                if found == model && own_key.iter().all(|(column, value)| item.get(column) == Some(value)) {
                    continue;
                }
                let mut entity = found.from_item(item.clone())?;
                if relation.kind().is_child() {
                    if let Some(back) = back_reference(&target, &relation) {
                        entity.relations.insert(back, RelationSlot::Parents(vec![snapshot.clone()]));
                    }
                    entity.dirty.attach(&self.dirty);
                }
                related.push(entity);
            }
            let slot = match relation.kind() {
                RelationKind::HasOne => related.into_iter().next().map(|child| RelationSlot::One(Box::new(child))),
                RelationKind::HasMany => Some(RelationSlot::Many(related)),
                RelationKind::BelongsTo => Some(RelationSlot::Parents(related)),
            };
            match slot {
                Some(slot) => self.relations.insert(relation.property().to_string(), slot),
                None => self.relations.remove(relation.property()),
            };
        }
        Ok(())
    }

    /// Upserts for populated not-nested relations, skipping tolerated invalid entities.
    fn related_writes(&mut self, writes: &mut WriteSet, stamp: &Value) -> Result<()> {
        let model = self.model.clone();
        for relation in model.relations().iter().filter(|r| !r.is_nested()) {
            let entities: Vec<&mut Entity> = match self.relations.get_mut(relation.property()) {
                Some(RelationSlot::One(child)) => vec![child.as_mut()],
                Some(RelationSlot::Many(children)) | Some(RelationSlot::Parents(children)) => children.iter_mut().collect(),
                None => continue,
            };
            for entity in entities {
                if entity.is_empty() {
                    continue;
                }
                let mut attributes = match entity.validate_strict() {
                    Ok(attributes) => attributes,
                    Err(err) if relation.tolerates_invalid() => {
                        warn!("{}: skipping invalid '{}' entry: {}", model.name(), relation.property(), err);
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                let related = entity.model.clone();
                if let Some(created_at) = related.created_at() {
                    if !attributes.contains_key(created_at) {
                        attributes.insert(created_at.to_string(), stamp.clone());
                    }
                }
                if let Some(updated_at) = related.updated_at() {
                    attributes.insert(updated_at.to_string(), stamp.clone());
                }
                let key = entity.physical_key()?;
                let item = entity.to_item(&attributes)?;
                writes.push(key, WriteOp::Put { item, condition: None });
            }
        }
        Ok(())
    }
}

/// Transactional write set with at most one operation per physical key; the owner's own write
/// always comes first.
struct WriteSet {
    owner: PhysicalKey,
    keys: Vec<PhysicalKey>,
    ops: Vec<WriteOp>,
}

impl WriteSet {
    fn new(owner: PhysicalKey) -> Self {
        WriteSet { owner, keys: Vec::new(), ops: Vec::new() }
    }

    fn push_put(&mut self, item: Item) {
        let owner = self.owner.clone();
        self.push(owner, WriteOp::Put { item, condition: None });
    }

    fn push(&mut self, key: PhysicalKey, op: WriteOp) {
        if self.keys.contains(&key) {
            debug!("skipping duplicate write for {:?}", key);
            return;
        }
        self.keys.push(key);
        self.ops.push(op);
    }

    fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Name of the belongsTo property on `target` that points back through `relation`.
fn back_reference(target: &Model, relation: &Relation) -> Option<String> {
    target
        .relations()
        .iter()
        .find(|candidate| {
            candidate.kind() == RelationKind::BelongsTo && candidate.get_back_reference() == Some(relation.property())
        })
        .map(|candidate| candidate.property().to_string())
}

async fn query_shape(client: &dyn StorageClient, table: &str, shape: &QueryShape) -> Result<Vec<Item>> {
    let mut request =
        QueryRequest::new(KeyCondition::equals(shape.attribute.clone(), shape.value.clone())).index(shape.index.clone());
    let mut items = Vec::new();
    loop {
        let page = client.query(table, &request).await?;
        items.extend(page.items);
        match page.continuation {
            Some(continuation) => request.exclusive_start = Some(continuation),
            None => return Ok(items),
        }
    }
}

async fn delete_stored(model: &Model, key: &PhysicalKey) -> Result<Item> {
    let table = model.table();
    let condition = Condition::Equals(table.entity_column.clone(), Value::String(model.name().to_string()));
    match model.client().delete(&table.table_name, &key.to_item(table), Some(condition)).await {
        Ok(Some(item)) => Ok(item),
        Ok(None) | Err(StorageError::ConditionalCheckFailed) => Err(ModelError::NotFound),
        Err(err) => Err(err.into()),
    }
}

impl Model {
    /// Loads the entity addressed by the logical key attributes in `key`.
    pub async fn get_item(&self, key: Value) -> Result<Entity> {
        let mut entity = self.from_value(key)?;
        entity.load().await?;
        Ok(entity)
    }

    /// Deletes the record addressed by the logical key attributes in `key`; returns the removed
    /// record as an entity.
    pub async fn delete_item(&self, key: Value) -> Result<Entity> {
        let entity = self.from_value(key)?;
        let item = delete_stored(self, &entity.physical_key()?).await?;
        let mut deleted = self.from_item(item)?;
        deleted.state = EntityState::Deleted;
        Ok(deleted)
    }

    /// Cursor over a scan with its first page fetched.
    pub async fn scan(&self, request: ScanRequest) -> Result<Cursor> {
        let mut cursor = Cursor::new(self.clone(), PageRequest::Scan(request));
        cursor.next().await?;
        Ok(cursor)
    }

    pub async fn scan_all(&self, request: ScanRequest) -> Result<Cursor> {
        let mut cursor = Cursor::new(self.clone(), PageRequest::Scan(request));
        cursor.get_all().await?;
        Ok(cursor)
    }

    /// Cursor over an index query with its first page fetched.
    pub async fn query(&self, request: QueryRequest) -> Result<Cursor> {
        let mut cursor = Cursor::new(self.clone(), PageRequest::Query(request));
        cursor.next().await?;
        Ok(cursor)
    }

    pub async fn query_all(&self, request: QueryRequest) -> Result<Cursor> {
        let mut cursor = Cursor::new(self.clone(), PageRequest::Query(request));
        cursor.get_all().await?;
        Ok(cursor)
    }

    /// Query for every record stored under the prefixed partition key `value`.
    pub fn query_by_key(&self, value: &str) -> QueryRequest {
        let table = self.table();
        QueryRequest::new(KeyCondition::equals(table.partition_key.clone(), prefixed(self.name(), value)))
    }
}
