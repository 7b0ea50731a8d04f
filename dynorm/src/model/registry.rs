use super::builder::{roles, ModelBuilder};
use super::composite::{self, CompositeField};
use super::property::{Property, Relation, RelationKind};
use super::Model;
use crate::config::TableConfig;
use crate::error::{ModelError, Result};
use crate::schema::Schema;
use crate::storage::{self, StorageClient};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Flattened, immutable metadata of one model: inherited facts first, own facts win.
#[derive(Debug, Clone)]
pub(crate) struct ModelDef {
    pub name: String,
    pub parent: Option<usize>,
    /// Names declared on this model itself, in declaration order.
    pub own: Vec<String>,
    pub properties: Vec<(String, Property)>,
    pub aliases: HashMap<String, String>,
    pub primary_key: Option<String>,
    pub secondary_key: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub composites: Vec<CompositeField>,
    pub relations: Vec<Relation>,
    pub model_schema: Option<Schema>,
    pub schema: Schema,
    pub subclasses: Vec<usize>,
}

impl ModelDef {
    fn flatten(builder: &ModelBuilder, parent_index: Option<usize>, parent: Option<&ModelDef>) -> Result<ModelDef> {
        let mut properties: Vec<(String, Property)> = parent.map(|p| p.properties.clone()).unwrap_or_default();
        for (name, property) in &builder.properties {
            // a role claimed here replaces the inherited holder
            for (role, claims) in roles(property) {
                if claims {
                    for (other, inherited) in properties.iter_mut().filter(|(other, _)| other != name) {
                        if roles(inherited).iter().any(|(held, set)| *held == role && *set) {
                            clear_role(inherited, role);
                            debug!("{}: '{}' overrides the inherited {} '{}'", builder.name, name, role, other);
                        }
                    }
                }
            }
            match properties.iter_mut().find(|(existing, _)| existing == name) {
                Some((_, existing)) => existing.merge(property.clone()),
                None => properties.push((name.clone(), property.clone())),
            }
        }

        let holder = |pick: fn(&Property) -> bool| properties.iter().find(|(_, p)| pick(p)).map(|(n, _)| n.clone());
        let primary_key = holder(Property::is_primary_key);
        let secondary_key = holder(Property::is_secondary_key);
        let created_at = holder(Property::is_created_at);
        let updated_at = holder(Property::is_updated_at);

        let mut aliases: HashMap<String, String> = HashMap::new();
        for (name, property) in &properties {
            for alias in property.aliases() {
                if properties.iter().any(|(other, _)| other == alias) {
                    return Err(ModelError::config(format!("{}: alias '{}' of '{}' collides with a property", builder.name, alias, name)));
                }
                if let Some(previous) = aliases.insert(alias.clone(), name.clone()) {
                    if previous != *name {
                        return Err(ModelError::config(format!(
                            "{}: alias '{}' is claimed by both '{}' and '{}'",
                            builder.name, alias, previous, name
                        )));
                    }
                }
            }
        }

        let mut composites = Vec::new();
        for (name, property) in &properties {
            if let Some(definition) = property.get_composite() {
                let field = CompositeField {
                    field: name.clone(),
                    sources: definition.sources().iter().map(|s| aliases.get(s).cloned().unwrap_or_else(|| s.clone())).collect(),
                    delimiter: definition.get_delimiter().to_string(),
                };
                composite::insert_ordered(&mut composites, field).map_err(|e| ModelError::config(format!("{}: {}", builder.name, e)))?;
            }
        }

        let model_schema = match (&builder.schema, parent.and_then(|p| p.model_schema.as_ref())) {
            (Some(own), inherited) => {
                if !own.is_object() {
                    return Err(ModelError::config(format!("{}: model schema must be an object schema", builder.name)));
                }
                let mut merged = inherited.cloned().unwrap_or_else(Schema::object);
                for (field, schema) in own.fields() {
                    merged.set_field(field.clone(), schema.clone());
                }
                Some(merged)
            }
            (None, inherited) => inherited.cloned(),
        };

        let relations = properties.iter().filter_map(|(_, p)| p.get_relation().cloned()).collect();

        Ok(ModelDef {
            name: builder.name.clone(),
            parent: parent_index,
            own: builder.properties.iter().map(|(name, _)| name.clone()).collect(),
            properties,
            aliases,
            primary_key,
            secondary_key,
            created_at,
            updated_at,
            composites,
            relations,
            model_schema,
            schema: Schema::object(),
            subclasses: Vec::new(),
        })
    }

    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn property(&self, canonical: &str) -> Option<&Property> {
        self.properties.iter().find(|(name, _)| name == canonical).map(|(_, p)| p)
    }

    pub fn position(&self, canonical: &str) -> Option<usize> {
        self.properties.iter().position(|(name, _)| name == canonical)
    }

    pub fn relation(&self, canonical: &str) -> Option<&Relation> {
        self.property(canonical).and_then(Property::get_relation)
    }

    pub fn is_key(&self, canonical: &str) -> bool {
        self.primary_key.as_deref() == Some(canonical) || self.secondary_key.as_deref() == Some(canonical)
    }

    /// Foreign key of one of this model's hasOne/hasMany relations.
    pub fn is_child_foreign_key(&self, canonical: &str) -> bool {
        self.relations.iter().any(|r| r.kind.is_child() && r.foreign_key.as_deref() == Some(canonical))
    }

    /// Target model of the belongsTo relation whose foreign key is `canonical`.
    pub fn parent_of_foreign_key(&self, canonical: &str) -> Option<&str> {
        self.relations
            .iter()
            .find(|r| r.kind == RelationKind::BelongsTo && r.foreign_key.as_deref() == Some(canonical))
            .map(|r| r.target.as_str())
    }

    /// Field schema, falling back to the model-level schema's entry for the field.
    pub fn field_schema(&self, canonical: &str) -> Option<&Schema> {
        self.property(canonical)
            .and_then(Property::get_schema)
            .or_else(|| self.model_schema.as_ref().and_then(|schema| schema.field_schema(canonical)))
    }
}

fn clear_role(property: &mut Property, role: &str) {
    match role {
        "primary key" => property.primary_key = false,
        "secondary key" => property.secondary_key = false,
        "created-at" => property.created_at = false,
        _ => property.updated_at = false,
    }
}

/// Collects model declarations and resolves them into a [`Registry`].
pub struct RegistryBuilder {
    table: TableConfig,
    models: Vec<ModelBuilder>,
    client: Option<Arc<dyn StorageClient>>,
    use_default: bool,
}

impl RegistryBuilder {
    pub fn new(table: TableConfig) -> Self {
        RegistryBuilder { table, models: Vec::new(), client: None, use_default: false }
    }

    pub fn model(mut self, model: ModelBuilder) -> Self {
        self.models.push(model);
        self
    }

    pub fn client(mut self, client: Arc<dyn StorageClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Falls back to the process-wide client installed with [`storage::install_default_client`].
    pub fn use_default_client(mut self) -> Self {
        self.use_default = true;
        self
    }

    pub fn build(self) -> Result<Arc<Registry>> {
        self.table.validate()?;
        let client = match (self.client, self.use_default) {
            (Some(client), _) => client,
            (None, true) => storage::default_client().ok_or_else(|| ModelError::config("no default storage client installed"))?,
            (None, false) => return Err(ModelError::config("no storage client configured")),
        };

        let mut builders = self.models;
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (index, builder) in builders.iter().enumerate() {
            if let Some(error) = builder.errors.first() {
                return Err(ModelError::config(error.clone()));
            }
            if by_name.insert(builder.name.clone(), index).is_some() {
                return Err(ModelError::config(format!("model '{}' is registered twice", builder.name)));
            }
        }

        register_reciprocals(&mut builders, &by_name)?;
        let parents = resolve_parents(&builders, &by_name)?;

        let mut flattened: Vec<Option<ModelDef>> = vec![None; builders.len()];
        for index in 0..builders.len() {
            flatten_into(index, &builders, &parents, &mut flattened)?;
        }
        let mut models: Vec<ModelDef> =
            flattened.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| ModelError::config("unresolved model"))?;

        let mut schemas = Vec::with_capacity(models.len());
        for index in 0..models.len() {
            schemas.push(merged_schema(&models, &by_name, index, &mut Vec::new())?);
        }
        for (def, schema) in models.iter_mut().zip(schemas) {
            def.schema = schema;
        }
        for index in 0..models.len() {
            let mut ancestor = models[index].parent;
            while let Some(parent) = ancestor {
                models[parent].subclasses.push(index);
                ancestor = models[parent].parent;
            }
        }

        debug!("registered {} models on table {}", models.len(), self.table.table_name);
        Ok(Arc::new(Registry { models, by_name, table: self.table, client }))
    }
}

/// Stores the belongsTo counterpart of every hasOne/hasMany on its target.
fn register_reciprocals(builders: &mut [ModelBuilder], by_name: &HashMap<String, usize>) -> Result<()> {
    let mut reciprocals: Vec<(usize, Relation)> = Vec::new();
    for builder in builders.iter() {
        for (_, property) in &builder.properties {
            let Some(relation) = property.get_relation() else { continue };
            let Some(&target) = by_name.get(relation.target()) else {
                return Err(ModelError::config(format!("{}: unknown relation target '{}'", builder.name, relation.target())));
            };
            if relation.kind.is_child() {
                reciprocals.push((target, relation.reciprocal(&builder.name)));
            }
        }
    }
    for (target, back) in reciprocals {
        let model = &mut builders[target];
        match model.properties.iter_mut().find(|(name, _)| *name == back.property) {
            None => model.properties.push((back.property.clone(), Property::new().relation(back))),
            Some((_, existing)) => match existing.get_relation() {
                Some(declared) if declared.kind == RelationKind::BelongsTo && declared.target == back.target => {}
                Some(_) => {
                    return Err(ModelError::config(format!(
                        "{}: back reference '{}' collides with another relation",
                        model.name, back.property
                    )))
                }
                None => existing.relation = Some(back),
            },
        }
    }
    Ok(())
}

fn resolve_parents(builders: &[ModelBuilder], by_name: &HashMap<String, usize>) -> Result<Vec<Option<usize>>> {
    let mut parents = Vec::with_capacity(builders.len());
    for builder in builders {
        let parent = match &builder.parent {
            Some(name) => Some(
                *by_name.get(name).ok_or_else(|| ModelError::config(format!("{}: unknown parent model '{}'", builder.name, name)))?,
            ),
            None => None,
        };
        parents.push(parent);
    }
    for start in 0..parents.len() {
        let mut steps = 0;
        let mut current = parents[start];
        while let Some(index) = current {
            steps += 1;
            if steps > parents.len() {
                return Err(ModelError::config(format!("{}: inheritance cycle", builders[start].name)));
            }
            current = parents[index];
        }
    }
    Ok(parents)
}

fn flatten_into(
    index: usize,
    builders: &[ModelBuilder],
    parents: &[Option<usize>],
    flattened: &mut Vec<Option<ModelDef>>,
) -> Result<()> {
    if flattened[index].is_some() {
        return Ok(());
    }
    if let Some(parent) = parents[index] {
        flatten_into(parent, builders, parents, flattened)?;
    }
    let parent_def = parents[index].and_then(|parent| flattened[parent].as_ref());
    let def = ModelDef::flatten(&builders[index], parents[index], parent_def)?;
    flattened[index] = Some(def);
    Ok(())
}

/// Model schema, field schemas and nested relation schemas folded into one object schema.
fn merged_schema(models: &[ModelDef], by_name: &HashMap<String, usize>, index: usize, visiting: &mut Vec<usize>) -> Result<Schema> {
    let def = &models[index];
    if visiting.contains(&index) {
        return Err(ModelError::config(format!("nested relations form a cycle through {}", def.name)));
    }
    visiting.push(index);

    let mut schema = def.model_schema.clone().unwrap_or_else(Schema::object);
    for (name, property) in &def.properties {
        if let (Some(field), None) = (property.get_schema(), property.get_relation()) {
            schema.set_field(name.clone(), field.clone());
        }
    }
    for relation in def.relations.iter().filter(|r| r.nested && r.kind.is_child()) {
        let target = *by_name
            .get(&relation.target)
            .ok_or_else(|| ModelError::config(format!("{}: unknown relation target '{}'", def.name, relation.target)))?;
        let inner = merged_schema(models, by_name, target, visiting)?;
        let wrapped = match (relation.kind, relation.required) {
            (RelationKind::HasMany, true) => Schema::array(inner.optional()).min_items(1).required(),
            (RelationKind::HasMany, false) => Schema::array(inner.optional()).optional(),
            (_, true) => inner.required(),
            (_, false) => inner.optional(),
        };
        schema.set_field(relation.property.clone(), wrapped);
    }

    visiting.pop();
    Ok(schema)
}

/// Every registered model of one table, resolved once and shared.
pub struct Registry {
    models: Vec<ModelDef>,
    by_name: HashMap<String, usize>,
    table: TableConfig,
    client: Arc<dyn StorageClient>,
}

impl Registry {
    pub fn builder(table: TableConfig) -> RegistryBuilder {
        RegistryBuilder::new(table)
    }

    pub fn model(self: &Arc<Self>, name: &str) -> Option<Model> {
        self.by_name.get(name).map(|index| Model::new(Arc::clone(self), *index))
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|def| def.name.as_str()).collect()
    }

    pub fn table(&self) -> &TableConfig {
        &self.table
    }

    pub fn client(&self) -> &Arc<dyn StorageClient> {
        &self.client
    }

    pub(crate) fn def(&self, index: usize) -> &ModelDef {
        &self.models[index]
    }

    /// Own declared names of `model` and each ancestor, most-derived first; names re-declared
    /// along the chain appear once per declaration.
    pub fn all_properties(&self, model: &Model) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = self.by_name.get(model.name()).copied();
        while let Some(index) = current {
            let def = &self.models[index];
            names.extend(def.own.iter().map(String::as_str));
            current = def.parent;
        }
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("table", &self.table).field("models", &self.model_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures;
    use crate::model::{Composite, ModelBuilder, Property, Relation, RegistryBuilder, RelationKind};
    use crate::schema::Schema;
    use crate::storage::memory::MemoryStore;
    use crate::{ModelError, TableConfig};
    use std::sync::Arc;

    fn build(models: Vec<ModelBuilder>) -> Result<Arc<crate::Registry>, ModelError> {
        let table = TableConfig::new("test");
        let store = Arc::new(MemoryStore::for_table(&table));
        models.into_iter().fold(RegistryBuilder::new(table).client(store), |b, m| b.model(m)).build()
    }

    #[test]
    fn duplicate_role_is_a_config_error() {
        let err = build(vec![ModelBuilder::new("A")
            .define("id", Property::new().primary_key())
            .define("other", Property::new().primary_key())])
        .unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn non_object_model_schema_is_rejected() {
        let err = build(vec![ModelBuilder::new("A").schema(Schema::string())]).unwrap_err();
        assert!(err.to_string().contains("object schema"));
    }

    #[test]
    fn missing_table_name_and_client_are_rejected() {
        assert!(RegistryBuilder::new(TableConfig::new("")).build().is_err());
        assert!(RegistryBuilder::new(TableConfig::new("t")).build().is_err());
    }

    #[test]
    fn alias_collisions_are_rejected() {
        let err = build(vec![ModelBuilder::new("A")
            .define("name", Property::new().alias("title"))
            .define("title", Property::new())])
        .unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn composite_cycles_are_rejected() {
        let err = build(vec![ModelBuilder::new("A")
            .define("x", Property::new().composite(Composite::of(["y"])))
            .define("y", Property::new().composite(Composite::of(["x"])))])
        .unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn reciprocal_belongs_to_is_registered_on_the_target() {
        let registry = fixtures::registry();
        let post = registry.model("Post").unwrap();
        let back = post.relation("user").unwrap();
        assert_eq!(back.kind(), RelationKind::BelongsTo);
        assert_eq!(back.target(), "User");
        assert_eq!(back.get_foreign_key(), Some("userId"));
        assert_eq!(post.def().parent_of_foreign_key("userId"), Some("User"));
    }

    #[test]
    fn inheritance_flattens_parent_first_and_derived_roles_win() {
        let registry = build(vec![
            ModelBuilder::new("Base").define("id", Property::new().primary_key()).define("name", Property::new().alias("label")),
            ModelBuilder::new("Derived").extends("Base").define("code", Property::new().primary_key()),
        ])
        .unwrap();
        let derived = registry.model("Derived").unwrap();
        assert_eq!(derived.primary_key(), Some("code"));
        assert_eq!(registry.all_properties(&derived), vec!["code", "id", "name"]);
        assert_eq!(derived.attribute_list(), vec!["code", "id", "name", "label"]);
        assert!(derived.is_a(&registry.model("Base").unwrap()));
        assert_eq!(registry.model("Base").unwrap().primary_key(), Some("id"));
    }

    #[test]
    fn nested_relations_fold_into_the_schema() {
        let registry = build(vec![
            ModelBuilder::new("Order")
                .define("id", Property::new().primary_key())
                .define("lines", Property::new().relation(Relation::has_many("Line").nested().required()))
                .define("address", Property::new().relation(Relation::has_one("Address").nested())),
            ModelBuilder::new("Line").define("sku", Property::new().schema(Schema::string().required())),
            ModelBuilder::new("Address").define("city", Property::new().schema(Schema::string())),
        ])
        .unwrap();
        let schema = registry.model("Order").unwrap().schema().clone();
        let lines = schema.field_schema("lines").unwrap();
        assert!(lines.is_required());
        assert_eq!(lines, &Schema::array(Schema::object().field("sku", Schema::string().required())).min_items(1).required());
        assert!(!schema.field_schema("address").unwrap().is_required());
    }

    #[test]
    fn nested_cycles_are_rejected() {
        let err = build(vec![
            ModelBuilder::new("A").define("b", Property::new().relation(Relation::has_one("B").nested().back_reference("owner"))),
            ModelBuilder::new("B").define("a", Property::new().relation(Relation::has_one("A").nested().back_reference("holder"))),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }
}
