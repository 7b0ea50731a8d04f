//! dynorm maps declaratively described models onto a single key-value table.
//!
//! Models are registered once through a [`RegistryBuilder`]: each property carries its facts
//! (primary/secondary key, timestamps, aliases, composite keys, validation schema and
//! hasOne/hasMany/belongsTo relations). From that metadata the crate derives attribute access,
//! physical key prefixing, composite fields, schema validation, transactional CRUD and
//! page-by-page cursors over query and scan results.
//!
//! All entities share one table and are told apart by a discriminator column holding the
//! model name; key values are stored as `"<Model>-<value>"`.
//!

pub mod config;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod model;
pub mod schema;
pub mod storage;
mod validation;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::TableConfig;
pub use cursor::{Cursor, PageRequest};
pub use entity::{Entity, EntitySnapshot, EntityState, PhysicalKey, Related};
pub use error::{ModelError, Result};
pub use model::{Composite, Model, ModelBuilder, Property, Registry, RegistryBuilder, Relation, RelationKind};
pub use schema::{PathSegment, Schema, ValidationDetail, ValidationError, ValidationOptions, Validated};
pub use storage::memory::MemoryStore;
pub use storage::{
    Condition, Item, KeyCondition, Page, QueryRequest, ScanRequest, StorageClient, StorageError, UpdateExpression,
    WriteOp,
};

pub use serde_json::{json, Map, Value};

/// An ordered attribute bag, attribute name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;
