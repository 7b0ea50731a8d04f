use super::Entity;
use crate::config::TableConfig;
use crate::error::{ModelError, Result};
use crate::model::composite::scalar_string;
use crate::storage::Item;
use crate::Record;
use serde::Serialize;
use serde_json::Value;

/// Primary and secondary key as stored, both carrying the `"<Entity>-"` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PhysicalKey {
    pub primary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

impl PhysicalKey {
    /// The key columns of the table for this key.
    pub fn to_item(&self, table: &TableConfig) -> Item {
        let mut item = Item::new();
        item.insert(table.partition_key.clone(), Value::String(self.primary.clone()));
        if let Some(sort_key) = &table.sort_key {
            let secondary = self.secondary.clone().unwrap_or_else(|| self.primary.clone());
            item.insert(sort_key.clone(), Value::String(secondary));
        }
        item
    }
}

pub(crate) fn prefixed(entity: &str, value: &str) -> String {
    if value.starts_with(entity) && value[entity.len()..].starts_with('-') {
        value.to_string()
    } else {
        format!("{entity}-{value}")
    }
}

/// Removes exactly one `"<entity>-"` prefix from a string value.
pub(crate) fn strip_prefix(value: Value, entity: &str) -> Value {
    match value {
        Value::String(text) => match text.strip_prefix(entity).and_then(|rest| rest.strip_prefix('-')) {
            Some(rest) => Value::String(rest.to_string()),
            None => Value::String(text),
        },
        other => other,
    }
}

fn key_part(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Object(_)) | Some(Value::Array(_)) => None,
        Some(value) => scalar_string(value),
        None => None,
    }
}

impl Entity {
    /// Entity name whose prefix an attribute carries when stored: the own name for key
    /// properties and child foreign keys, the parent's for belongsTo foreign keys.
    pub(crate) fn prefix_owner(&self, canonical: &str) -> Option<&str> {
        let def = self.model.def();
        if def.is_key(canonical) || def.is_child_foreign_key(canonical) {
            Some(self.model.name())
        } else {
            def.parent_of_foreign_key(canonical)
        }
    }

    /// Value as written to storage: prefixed when the attribute carries an entity prefix.
    ///
    /// A foreign key already prefixed by its owner model or one of the owner's subclasses is
    /// written as is, so children of a subclass instance point at that instance's record.
    pub(crate) fn stored_value(&self, canonical: &str, value: &Value) -> Value {
        let (Some(owner), Some(text)) = (self.prefix_owner(canonical), key_part(Some(value))) else {
            return value.clone();
        };
        if self.model.def().is_key(canonical) {
            return Value::String(prefixed(owner, &text));
        }
        match self.model.sibling(owner) {
            Some(owner_model) if owner_model.lineage_prefix(&text).is_some() => Value::String(text),
            _ => Value::String(prefixed(owner, &text)),
        }
    }

    pub(crate) fn stored_attribute(&self, name: &str) -> Option<Value> {
        let canonical = self.model.resolve(name);
        self.get(canonical).map(|value| self.stored_value(canonical, value))
    }

    /// Prefixed primary key value, `None` while the primary key is unset.
    pub(crate) fn prefixed_primary(&self) -> Option<String> {
        self.physical_key().ok().map(|key| key.primary)
    }

    /// Computes the stored key from the transformed attributes.
    ///
    /// An unset secondary key, or a table sort key the model does not declare, takes the
    /// prefixed primary value.
    pub fn physical_key(&self) -> Result<PhysicalKey> {
        let def = self.model.def();
        let name = self.model.name();
        let transformed = self.transformed_attributes();
        let primary_name =
            def.primary_key.as_deref().ok_or_else(|| ModelError::BadKey(format!("{name} declares no primary key")))?;
        let primary = key_part(transformed.get(primary_name))
            .ok_or_else(|| ModelError::BadKey(format!("{name}: primary key '{primary_name}' is not a set scalar value")))?;
        let primary = prefixed(name, &primary);

        let secondary = match def.secondary_key.as_deref() {
            Some(secondary_name) => Some(
                key_part(transformed.get(secondary_name)).map(|value| prefixed(name, &value)).unwrap_or_else(|| primary.clone()),
            ),
            None => self.model.table().sort_key.as_ref().map(|_| primary.clone()),
        };
        Ok(PhysicalKey { primary, secondary })
    }

    /// The stored item for already validated attributes: prefixed keys and foreign keys, the
    /// table key columns and the discriminator.
    pub fn to_item(&self, validated: &Record) -> Result<Item> {
        let key = self.physical_key()?;
        let table = self.model.table();
        let mut item = Item::new();
        for (name, value) in validated {
            item.insert(name.clone(), self.stored_value(name, value));
        }
        item.extend(key.to_item(table));
        item.insert(table.entity_column.clone(), Value::String(self.model.name().to_string()));
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use serde_json::json;

    #[test]
    fn prefixes_are_never_doubled() {
        assert_eq!(prefixed("User", "1"), "User-1");
        assert_eq!(prefixed("User", "User-1"), "User-1");
        assert_eq!(prefixed("User", "Users-1"), "User-Users-1");
        assert_eq!(strip_prefix(json!("User-User-1"), "User"), json!("User-1"));
        assert_eq!(strip_prefix(json!(5), "User"), json!(5));
    }

    #[test]
    fn secondary_defaults_to_the_prefixed_primary() {
        let registry = fixtures::registry();
        let comment = registry.model("Comment").unwrap();
        let mut entity = comment.from_value(json!({"thread": "p1", "text": "hi"})).unwrap();
        assert_eq!(
            entity.physical_key().unwrap(),
            PhysicalKey { primary: "Comment-p1".to_string(), secondary: Some("Comment-p1".to_string()) }
        );
        entity.set("at", "2024-01-01").unwrap();
        assert_eq!(entity.physical_key().unwrap().secondary.as_deref(), Some("Comment-2024-01-01T00:00:00.000Z"));
    }

    #[test]
    fn composite_primary_keys_are_derived_before_prefixing() {
        let registry = fixtures::registry();
        let order = registry.model("Order").unwrap();
        let entity = order.from_value(json!({"tenant": "acme", "number": 12})).unwrap();
        assert_eq!(entity.physical_key().unwrap().primary, "Order-acme#12");
    }

    #[test]
    fn missing_primary_key_is_a_bad_key() {
        let registry = fixtures::registry();
        let entity = registry.model("User").unwrap().entity();
        assert!(matches!(entity.physical_key(), Err(ModelError::BadKey(_))));
    }

    #[test]
    fn items_carry_prefixes_and_the_discriminator() {
        let registry = fixtures::registry();
        let mut post = registry.model("Post").unwrap().from_value(json!({"id": "1", "title": "T", "userId": "7"})).unwrap();
        let validated = post.validate_strict().unwrap();
        let item = post.to_item(&validated).unwrap();
        assert_eq!(
            Value::Object(item),
            json!({"id": "Post-1", "title": "T", "userId": "User-7", "pk": "Post-1", "sk": "Post-1", "entity": "Post"})
        );
    }

    #[test]
    fn foreign_keys_naming_a_subclass_keep_its_prefix() {
        let registry = fixtures::registry();
        let post = registry.model("Post").unwrap();
        let mut entity = post.from_value(json!({"id": "1", "title": "T", "userId": "Admin-4"})).unwrap();
        assert_eq!(entity.get("userId"), Some(&json!("Admin-4")));
        assert_eq!(entity.stored_attribute("userId"), Some(json!("Admin-4")));

        entity.set("userId", "User-4").unwrap();
        assert_eq!(entity.get("userId"), Some(&json!("4")));
        assert_eq!(entity.stored_attribute("userId"), Some(json!("User-4")));

        let admin = registry.model("Admin").unwrap().from_value(json!({"id": "Admin-4", "userId": "Admin-4"})).unwrap();
        assert_eq!(admin.get("id"), Some(&json!("4")));
        assert_eq!(admin.stored_attribute("userId"), Some(json!("Admin-4")));
    }
}
