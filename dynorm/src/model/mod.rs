//! Model metadata: declared properties, their facts and the registry they are resolved in.
//!
//! Models are described with [`ModelBuilder`]s and resolved once by [`RegistryBuilder::build`],
//! which flattens inheritance, registers reciprocal belongsTo relations, orders composite keys
//! and merges validation schemas. The resulting [`Registry`] is immutable; a [`Model`] is a
//! cheap handle into it.

mod builder;
pub(crate) mod composite;
mod property;
mod registry;

pub use builder::ModelBuilder;
pub use property::{Composite, Property, Relation, RelationKind};
pub use registry::{Registry, RegistryBuilder};

pub(crate) use registry::ModelDef;

use crate::config::TableConfig;
use crate::error::{ModelError, Result};
use crate::schema::Schema;
use crate::storage::StorageClient;
use std::fmt;
use std::sync::Arc;

/// Handle to one registered model.
#[derive(Clone)]
pub struct Model {
    registry: Arc<Registry>,
    index: usize,
}

impl Model {
    pub(crate) fn new(registry: Arc<Registry>, index: usize) -> Self {
        Model { registry, index }
    }

    pub(crate) fn def(&self) -> &ModelDef {
        self.registry.def(self.index)
    }

    pub fn name(&self) -> &str {
        &self.def().name
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn table(&self) -> &TableConfig {
        self.registry.table()
    }

    pub(crate) fn client(&self) -> Arc<dyn StorageClient> {
        Arc::clone(self.registry.client())
    }

    /// Canonical property name for an alias, the name itself otherwise.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.def().resolve(name)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.def().property(self.resolve(name))
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.def().relation(self.resolve(name))
    }

    /// Every relation of the model, reciprocal belongsTo relations included.
    pub fn relations(&self) -> &[Relation] {
        &self.def().relations
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.def().primary_key.as_deref()
    }

    pub fn secondary_key(&self) -> Option<&str> {
        self.def().secondary_key.as_deref()
    }

    pub fn created_at(&self) -> Option<&str> {
        self.def().created_at.as_deref()
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.def().updated_at.as_deref()
    }

    /// Declared properties and aliases across the inheritance chain, without duplicates.
    pub fn attribute_list(&self) -> Vec<String> {
        let def = self.def();
        let mut names: Vec<String> = Vec::new();
        for name in self.registry.all_properties(self) {
            let aliases = def.property(name).map(Property::aliases).unwrap_or_default();
            for candidate in std::iter::once(name).chain(aliases.iter().map(String::as_str)) {
                if !names.iter().any(|known| known == candidate) {
                    names.push(candidate.to_string());
                }
            }
        }
        names
    }

    /// Validation schema with nested relation schemas folded in.
    pub fn schema(&self) -> &Schema {
        &self.def().schema
    }

    pub fn parent(&self) -> Option<Model> {
        self.def().parent.map(|index| Model::new(Arc::clone(&self.registry), index))
    }

    /// True when `self` is `other` or inherits from it.
    pub fn is_a(&self, other: &Model) -> bool {
        if !Arc::ptr_eq(&self.registry, &other.registry) {
            return false;
        }
        let mut current = Some(self.index);
        while let Some(index) = current {
            if index == other.index {
                return true;
            }
            current = self.registry.def(index).parent;
        }
        false
    }

    /// This model's name, or a subclass name, when `value` already starts with that `"<Name>-"`
    /// prefix.
    pub(crate) fn lineage_prefix(&self, value: &str) -> Option<&str> {
        std::iter::once(self.index)
            .chain(self.def().subclasses.iter().copied())
            .map(|index| self.registry.def(index).name.as_str())
            .find(|name| value.strip_prefix(name).is_some_and(|rest| rest.starts_with('-')))
    }

    pub fn sibling(&self, name: &str) -> Option<Model> {
        self.registry.model(name)
    }

    pub(crate) fn target_of(&self, relation: &Relation) -> Result<Model> {
        self.sibling(relation.target())
            .ok_or_else(|| ModelError::config(format!("unknown relation target '{}'", relation.target())))
    }

    /// Model for a record whose discriminator differs from this model's name: a relation target
    /// or a subclass carrying that name.
    pub(crate) fn dispatch(&self, discriminator: &str) -> Option<Model> {
        let def = self.def();
        let by_relation = def.relations.iter().any(|relation| relation.target() == discriminator);
        let by_subclass = def.subclasses.iter().any(|index| self.registry.def(*index).name == discriminator);
        if by_relation || by_subclass {
            self.sibling(discriminator)
        } else {
            None
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry) && self.index == other.index
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model").field("name", &self.name()).finish()
    }
}
