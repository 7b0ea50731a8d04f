use super::property::Property;
use crate::schema::Schema;

/// Declares one model: its parent, its properties and an optional model-level schema.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    pub(crate) name: String,
    pub(crate) parent: Option<String>,
    pub(crate) properties: Vec<(String, Property)>,
    pub(crate) schema: Option<Schema>,
    pub(crate) errors: Vec<String>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ModelBuilder { name: name.into(), parent: None, properties: Vec::new(), schema: None, errors: Vec::new() }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Whole-model schema; must be an object schema.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Merges `property` into the facts already declared under `name`.
    pub fn define(mut self, name: impl Into<String>, mut property: Property) -> Self {
        let name = name.into();
        if let Some(relation) = property.relation.as_mut() {
            relation.property = name.clone();
        }
        for (role, claims) in roles(&property) {
            if !claims {
                continue;
            }
            let holder = self
                .properties
                .iter()
                .find(|(other, facts)| *other != name && roles(facts).iter().any(|(r, held)| *r == role && *held));
            if let Some((holder, _)) = holder {
                self.errors.push(format!("{} declares more than one {} property: '{}' and '{}'", self.name, role, holder, name));
            }
        }
        match self.properties.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => existing.merge(property),
            None => self.properties.push((name, property)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Roles a model may assign to at most one property.
pub(crate) fn roles(property: &Property) -> [(&'static str, bool); 4] {
    [
        ("primary key", property.primary_key),
        ("secondary key", property.secondary_key),
        ("created-at", property.created_at),
        ("updated-at", property.updated_at),
    ]
}
