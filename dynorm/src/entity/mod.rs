//! Entity instances: the attribute bag of one model plus its relation slots, dirty tracking
//! and cached validation outcome.

mod attributes;
mod dirty;
mod keys;
mod lifecycle;
mod relations;

pub use keys::PhysicalKey;
pub use relations::Related;

pub(crate) use dirty::DirtyFlag;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::schema::ValidationError;
use crate::storage::Item;
use crate::Record;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityState {
    /// Constructed, not stored yet.
    Transient,
    Persisted,
    Deleted,
}

/// Backing storage of one relation property.
#[derive(Debug)]
pub(crate) enum RelationSlot {
    One(Box<Entity>),
    Many(Vec<Entity>),
    /// Parents recorded on a belongsTo property.
    Parents(Vec<Entity>),
}

#[derive(Debug)]
pub struct Entity {
    pub(crate) model: Model,
    /// Declared properties under their canonical names.
    pub(crate) values: Record,
    /// Undeclared attributes.
    pub(crate) extras: Record,
    pub(crate) relations: BTreeMap<String, RelationSlot>,
    pub(crate) dirty: Arc<DirtyFlag>,
    pub(crate) error: Option<ValidationError>,
    pub(crate) validated: Option<Record>,
    pub(crate) state: EntityState,
}

impl Entity {
    pub(crate) fn new(model: Model) -> Self {
        Entity {
            model,
            values: Record::new(),
            extras: Record::new(),
            relations: BTreeMap::new(),
            dirty: DirtyFlag::new(true),
            error: None,
            validated: None,
            state: EntityState::Transient,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Error of the last validation run.
    pub fn error(&self) -> Option<&ValidationError> {
        self.error.as_ref()
    }

    /// Attributes produced by the last validation run.
    pub fn validated_attributes(&self) -> Option<&Record> {
        self.validated.as_ref()
    }

    pub(crate) fn touch(&self) {
        self.dirty.mark();
    }

    /// Copy of the attributes without relations, used as a back reference.
    pub(crate) fn detached(&self) -> Entity {
        Entity {
            model: self.model.clone(),
            values: self.values.clone(),
            extras: self.extras.clone(),
            relations: BTreeMap::new(),
            dirty: DirtyFlag::new(self.is_dirty()),
            error: self.error.clone(),
            validated: self.validated.clone(),
            state: self.state,
        }
    }

    /// Serializable view: physical key, attributes, last validated attributes, dirty flag and
    /// last error message.
    pub fn to_json(&self) -> EntitySnapshot {
        EntitySnapshot {
            key: self.physical_key().ok(),
            attributes: self.attributes(),
            validated_attributes: self.validated.clone(),
            dirty: self.is_dirty(),
            error: self.error.as_ref().map(ValidationError::message),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.to_json())?)
    }
}

impl Clone for Entity {
    fn clone(&self) -> Self {
        let mut copy = self.detached();
        for (name, slot) in &self.relations {
            let slot = match slot {
                RelationSlot::One(child) => {
                    let child = child.as_ref().clone();
                    child.dirty.attach(&copy.dirty);
                    RelationSlot::One(Box::new(child))
                }
                RelationSlot::Many(children) => {
                    let children: Vec<Entity> = children.iter().cloned().collect();
                    children.iter().for_each(|child| child.dirty.attach(&copy.dirty));
                    RelationSlot::Many(children)
                }
                RelationSlot::Parents(parents) => RelationSlot::Parents(parents.clone()),
            };
            copy.relations.insert(name.clone(), slot);
        }
        copy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub key: Option<PhysicalKey>,
    pub attributes: Record,
    pub validated_attributes: Option<Record>,
    pub dirty: bool,
    pub error: Option<String>,
}

impl Model {
    /// A new, empty entity of this model.
    pub fn entity(&self) -> Entity {
        Entity::new(self.clone())
    }

    /// Entity built by setting every attribute of `record` in order.
    pub fn from_record(&self, record: Record) -> Result<Entity> {
        let mut entity = self.entity();
        entity.assign(record)?;
        Ok(entity)
    }

    pub fn from_value(&self, value: Value) -> Result<Entity> {
        match value {
            Value::Object(record) => self.from_record(record),
            other => Err(ModelError::bad_argument(format!("{} expects an object, got {}", self.name(), other))),
        }
    }

    /// Entity for a stored item; table key columns and the discriminator are dropped unless
    /// declared.
    pub(crate) fn from_item(&self, item: Item) -> Result<Entity> {
        let mut entity = self.entity();
        entity.replace_from_item(item)?;
        entity.state = EntityState::Persisted;
        Ok(entity)
    }
}
