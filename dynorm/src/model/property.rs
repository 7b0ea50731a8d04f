use crate::schema::Schema;

/// Declarative facts attached to one logical property of a model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Property {
    pub(crate) primary_key: bool,
    pub(crate) secondary_key: bool,
    pub(crate) created_at: bool,
    pub(crate) updated_at: bool,
    pub(crate) aliases: Vec<String>,
    pub(crate) composite: Option<Composite>,
    pub(crate) relation: Option<Relation>,
    pub(crate) schema: Option<Schema>,
}

impl Property {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn secondary_key(mut self) -> Self {
        self.secondary_key = true;
        self
    }

    pub fn created_at(mut self) -> Self {
        self.created_at = true;
        self
    }

    pub fn updated_at(mut self) -> Self {
        self.updated_at = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
        self
    }

    pub fn composite(mut self, composite: Composite) -> Self {
        self.composite = Some(composite);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_secondary_key(&self) -> bool {
        self.secondary_key
    }

    pub fn is_created_at(&self) -> bool {
        self.created_at
    }

    pub fn is_updated_at(&self) -> bool {
        self.updated_at
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn get_composite(&self) -> Option<&Composite> {
        self.composite.as_ref()
    }

    pub fn get_relation(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }

    pub fn get_schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Folds `other` into `self`; flags accumulate, single-valued facts are replaced.
    pub(crate) fn merge(&mut self, other: Property) {
        self.primary_key |= other.primary_key;
        self.secondary_key |= other.secondary_key;
        self.created_at |= other.created_at;
        self.updated_at |= other.updated_at;
        for alias in other.aliases {
            if !self.aliases.contains(&alias) {
                self.aliases.push(alias);
            }
        }
        if other.composite.is_some() {
            self.composite = other.composite;
        }
        if other.relation.is_some() {
            self.relation = other.relation;
        }
        if other.schema.is_some() {
            self.schema = other.schema;
        }
    }
}

/// A derived property joining other properties with a delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    pub(crate) sources: Vec<String>,
    pub(crate) delimiter: String,
}

impl Composite {
    pub const DEFAULT_DELIMITER: &'static str = "#";

    pub fn of<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Composite { sources: sources.into_iter().map(Into::into).collect(), delimiter: Self::DEFAULT_DELIMITER.to_string() }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn get_delimiter(&self) -> &str {
        &self.delimiter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
}

impl RelationKind {
    /// hasOne and hasMany point from the owner to its children.
    pub fn is_child(self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::HasMany)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub(crate) kind: RelationKind,
    pub(crate) target: String,
    pub(crate) property: String,
    pub(crate) foreign_key: Option<String>,
    pub(crate) index: Option<String>,
    pub(crate) nested: bool,
    pub(crate) required: bool,
    pub(crate) tolerate_invalid: bool,
    pub(crate) back_reference: Option<String>,
}

impl Relation {
    fn new(kind: RelationKind, target: impl Into<String>) -> Self {
        Relation {
            kind,
            target: target.into(),
            property: String::new(),
            foreign_key: None,
            index: None,
            nested: false,
            required: false,
            tolerate_invalid: false,
            back_reference: None,
        }
    }

    pub fn has_one(target: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, target)
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, target)
    }

    pub fn belongs_to(target: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, target)
    }

    pub fn foreign_key(mut self, attribute: impl Into<String>) -> Self {
        self.foreign_key = Some(attribute.into());
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Children are embedded in the owner's record instead of stored on their own.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Invalid children are dropped from validation and writes instead of failing the owner.
    pub fn tolerate_invalid(mut self) -> Self {
        self.tolerate_invalid = true;
        self
    }

    /// Name of the belongsTo property generated on the target, defaults to the owner's name in lower camel case.
    pub fn back_reference(mut self, property: impl Into<String>) -> Self {
        self.back_reference = Some(property.into());
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn get_foreign_key(&self) -> Option<&str> {
        self.foreign_key.as_deref()
    }

    pub fn get_index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn tolerates_invalid(&self) -> bool {
        self.tolerate_invalid
    }

    pub fn get_back_reference(&self) -> Option<&str> {
        self.back_reference.as_deref()
    }

    /// Both a foreign key and an index are needed to find related records with one query.
    pub fn is_queryable(&self) -> bool {
        !self.nested && self.foreign_key.is_some() && self.index.is_some()
    }

    /// The reciprocal belongsTo registered on the target of a hasOne/hasMany.
    pub(crate) fn reciprocal(&self, owner: &str) -> Relation {
        Relation {
            kind: RelationKind::BelongsTo,
            target: owner.to_string(),
            property: self.back_reference.clone().unwrap_or_else(|| lower_camel(owner)),
            foreign_key: self.foreign_key.clone(),
            index: self.index.clone(),
            nested: self.nested,
            required: false,
            tolerate_invalid: false,
            back_reference: Some(self.property.clone()),
        }
    }
}

fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
