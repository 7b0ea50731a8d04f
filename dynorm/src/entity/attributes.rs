use super::keys::strip_prefix;
use super::{Entity, RelationSlot};
use crate::error::Result;
use crate::model::composite;
use crate::storage::Item;
use crate::Record;
use serde_json::Value;

impl Entity {
    /// Stored value of a declared or extra attribute; aliases resolve to their property.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let canonical = self.model.resolve(name);
        self.values.get(canonical).or_else(|| self.extras.get(canonical))
    }

    /// Assigns an attribute.
    ///
    /// Relation properties are delegated to the relation setters. Key values lose one
    /// `"<Entity>-"` prefix, foreign keys lose their owner's or parent's prefix (a subclass
    /// prefix names the concrete record and stays), and a field schema converts the value when
    /// it can; values it cannot convert are kept as given and reported by the next validation.
    /// Marks the entity and its ancestors dirty.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let model = self.model.clone();
        let canonical = model.resolve(name);
        let def = model.def();

        if let Some(relation) = def.relation(canonical) {
            return self.set_relation_value(relation, value);
        }

        let value = match self.prefix_owner(canonical) {
            Some(owner) => strip_prefix(value, owner),
            None => value,
        };
        let value = match def.field_schema(canonical) {
            Some(schema) => schema.coerce(&value).unwrap_or(value),
            None => value,
        };
        if def.property(canonical).is_some() {
            self.values.insert(canonical.to_string(), value);
        } else {
            self.extras.insert(canonical.to_string(), value);
        }
        self.touch();
        Ok(())
    }

    pub fn unset(&mut self, name: &str) -> Option<Value> {
        let model = self.model.clone();
        let canonical = model.resolve(name);
        let removed = self
            .values
            .shift_remove(canonical)
            .or_else(|| self.extras.shift_remove(canonical))
            .or_else(|| self.relations.remove(canonical).map(|_| Value::Null));
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Sets every attribute of `record` in order.
    pub fn assign(&mut self, record: Record) -> Result<()> {
        for (name, value) in record {
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// Declared values in declaration order, then extras, then nested relations.
    pub fn attributes(&self) -> Record {
        self.collect(false)
    }

    /// Attributes with composite fields derived and nested children transformed as well.
    pub fn transformed_attributes(&self) -> Record {
        let mut record = self.collect(true);
        composite::apply(&self.model.def().composites, &mut record);
        record
    }

    fn collect(&self, transformed: bool) -> Record {
        let def = self.model.def();
        let mut record = Record::new();
        for (name, _) in &def.properties {
            if let Some(value) = self.values.get(name) {
                record.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in &self.extras {
            record.insert(name.clone(), value.clone());
        }
        let embed = |child: &Entity| {
            Value::Object(if transformed { child.transformed_attributes() } else { child.attributes() })
        };
        for relation in def.relations.iter().filter(|r| r.is_nested() && r.kind().is_child()) {
            match self.relations.get(relation.property()) {
                Some(RelationSlot::One(child)) if !child.is_empty() => {
                    record.insert(relation.property().to_string(), embed(child.as_ref()));
                }
                Some(RelationSlot::Many(children)) => {
                    record.insert(relation.property().to_string(), Value::Array(children.iter().map(&embed).collect()));
                }
                _ => {}
            }
        }
        record
    }

    /// No attributes and no populated nested relations.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
            && self.extras.is_empty()
            && self.relations.values().all(|slot| match slot {
                RelationSlot::One(child) => child.is_empty(),
                RelationSlot::Many(children) | RelationSlot::Parents(children) => children.is_empty(),
            })
    }

    /// Replaces the attributes with a stored item's, dropping physical-only columns.
    pub(crate) fn replace_from_item(&mut self, item: Item) -> Result<()> {
        let model = self.model.clone();
        let table = model.table();
        self.values.clear();
        self.extras.clear();
        for (name, value) in item {
            if table.is_reserved(&name) && model.def().property(&name).is_none() {
                continue;
            }
            self.set(&name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures;
    use serde_json::json;

    #[test]
    fn aliases_and_canonical_names_share_one_value() {
        let registry = fixtures::registry();
        let user = registry.model("User").unwrap();
        let mut entity = user.entity();
        entity.set("mail", "a@b.c").unwrap();
        assert_eq!(entity.get("email"), Some(&json!("a@b.c")));
        entity.set("email", "x@y.z").unwrap();
        assert_eq!(entity.get("mail"), Some(&json!("x@y.z")));
        assert_eq!(entity.attributes().len(), 1);
    }

    #[test]
    fn key_and_foreign_key_prefixes_are_stripped_once() {
        let registry = fixtures::registry();
        let mut post = registry.model("Post").unwrap().entity();
        post.set("id", "Post-Post-7").unwrap();
        post.set("userId", "User-3").unwrap();
        assert_eq!(post.get("id"), Some(&json!("Post-7")));
        assert_eq!(post.get("userId"), Some(&json!("3")));

        let mut user = registry.model("User").unwrap().entity();
        user.set("userId", "User-3").unwrap();
        assert_eq!(user.get("userId"), Some(&json!("3")));
    }

    #[test]
    fn schema_coercion_is_deferred_on_failure() {
        let registry = fixtures::registry();
        let mut user = registry.model("User").unwrap().entity();
        user.set("name", "  Ann ").unwrap();
        user.set("age", "41").unwrap();
        assert_eq!(user.get("name"), Some(&json!("Ann")));
        assert_eq!(user.get("age"), Some(&json!(41)));

        user.set("age", "old").unwrap();
        assert_eq!(user.get("age"), Some(&json!("old")));
        assert!(!user.is_valid());
    }

    #[test]
    fn extras_are_kept_after_declared_values() {
        let registry = fixtures::registry();
        let user = registry.model("User").unwrap();
        let entity = user.from_value(json!({"nickname": "z", "id": "1", "name": "A"})).unwrap();
        let keys: Vec<_> = entity.attributes().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name", "nickname"]);
    }

    #[test]
    fn attributes_round_trip_through_a_new_entity() {
        let registry = fixtures::registry();
        let user = registry.model("User").unwrap();
        let original = user.from_value(json!({"id": "9", "name": "Bo", "age": 3, "extra": [1, 2]})).unwrap();
        let copy = user.from_record(original.attributes()).unwrap();
        assert_eq!(copy.attributes(), original.attributes());
    }

    #[test]
    fn setters_mark_the_entity_dirty() {
        let registry = fixtures::registry();
        let mut user = registry.model("User").unwrap().from_value(json!({"id": "1", "name": "A"})).unwrap();
        assert!(user.is_valid());
        assert!(!user.is_dirty());
        user.set("name", "B").unwrap();
        assert!(user.is_dirty());
        assert!(user.unset("name").is_some());
        assert!(user.get("name").is_none());
    }
}
