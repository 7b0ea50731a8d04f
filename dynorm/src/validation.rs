//! Validation of entities against their model's merged schema, with the recovery pass for
//! nested relations that tolerate invalid children.

use crate::entity::Entity;
use crate::error::{ModelError, Result};
use crate::model::{ModelDef, RelationKind};
use crate::schema::{PathSegment, Validated, ValidationError, ValidationOptions};
use crate::Record;
use log::warn;
use serde_json::Value;

impl Entity {
    /// Validates the transformed attributes and caches the outcome; the dirty flag is cleared
    /// only when the run succeeds.
    pub fn validate(&mut self) -> Validated<Record> {
        let model = self.model.clone();
        let attributes = self.transformed_attributes();
        let options = ValidationOptions::default();
        let mut outcome = model.schema().validate(&Value::Object(attributes.clone()), &options);
        if let Some(error) = &outcome.error {
            if let Some(stripped) = strip_tolerated(model.def(), &attributes, error) {
                outcome = model.schema().validate(&Value::Object(stripped), &options);
            }
        }
        let value = match outcome.value {
            Value::Object(record) => record,
            _ => attributes,
        };
        self.error = outcome.error.clone();
        self.validated = Some(value.clone());
        if outcome.error.is_none() {
            self.dirty.clear();
        }
        Validated { value, error: outcome.error }
    }

    /// Validated attributes, or the validation error.
    pub fn validate_strict(&mut self) -> Result<Record> {
        self.validate().into_result().map_err(ModelError::from)
    }

    /// Re-validates only when something changed since the last run.
    pub fn is_valid(&mut self) -> bool {
        if self.is_dirty() || self.validated.is_none() {
            self.validate();
        }
        self.error.is_none()
    }
}

/// Removes the subtrees of tolerant nested relations named by the error, `None` when the error
/// touches none of them.
fn strip_tolerated(def: &ModelDef, attributes: &Record, error: &ValidationError) -> Option<Record> {
    let mut removals: Vec<(String, Option<usize>)> = Vec::new();
    for detail in error.details() {
        let Some(PathSegment::Key(field)) = detail.path.first() else { continue };
        let Some(relation) = def.relation(field) else { continue };
        if !(relation.is_nested() && relation.tolerates_invalid()) {
            continue;
        }
        match (relation.kind(), detail.path.get(1)) {
            (RelationKind::HasOne, _) => removals.push((field.clone(), None)),
            (RelationKind::HasMany, Some(PathSegment::Index(index))) => removals.push((field.clone(), Some(*index))),
            _ => {}
        }
    }
    if removals.is_empty() {
        return None;
    }
    removals.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    removals.dedup();

    warn!("{}: dropping {} invalid nested entries", def.name, removals.len());
    let mut stripped = attributes.clone();
    for (field, index) in removals {
        match index {
            None => {
                stripped.shift_remove(&field);
            }
            Some(index) => {
                if let Some(Value::Array(items)) = stripped.get_mut(&field) {
                    if index < items.len() {
                        items.remove(index);
                    }
                }
            }
        }
    }
    Some(stripped)
}
