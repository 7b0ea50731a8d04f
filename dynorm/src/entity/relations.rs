use super::{Entity, RelationSlot};
use crate::error::{ModelError, Result};
use crate::model::{Relation, RelationKind};
use crate::Record;
use serde_json::Value;

/// A related value handed to a relation setter: an entity of the target model or a plain
/// record that is upgraded to one.
#[derive(Debug, Clone)]
pub enum Related {
    Entity(Entity),
    Record(Record),
}

impl From<Entity> for Related {
    fn from(entity: Entity) -> Self {
        Related::Entity(entity)
    }
}

impl From<Record> for Related {
    fn from(record: Record) -> Self {
        Related::Record(record)
    }
}

impl TryFrom<Value> for Related {
    type Error = ModelError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(record) => Ok(Related::Record(record)),
            other => Err(ModelError::bad_argument(format!("expected an entity or an object, got {other}"))),
        }
    }
}

impl Entity {
    fn relation_of(&self, name: &str, kinds: &[RelationKind]) -> Result<Relation> {
        match self.model.relation(name) {
            Some(relation) if kinds.contains(&relation.kind()) => Ok(relation.clone()),
            Some(relation) => Err(ModelError::bad_argument(format!(
                "'{}' of {} is a {:?} relation",
                name,
                self.model.name(),
                relation.kind()
            ))),
            None => Err(ModelError::bad_argument(format!("'{}' is not a relation of {}", name, self.model.name()))),
        }
    }

    /// The hasOne child, materialized empty on first access.
    pub fn has_one(&mut self, name: &str) -> Result<&mut Entity> {
        let relation = self.relation_of(name, &[RelationKind::HasOne])?;
        let property = relation.property().to_string();
        if !matches!(self.relations.get(&property), Some(RelationSlot::One(_))) {
            let child = self.model.target_of(&relation)?.entity();
            child.dirty.attach(&self.dirty);
            self.relations.insert(property.clone(), RelationSlot::One(Box::new(child)));
        }
        match self.relations.get_mut(&property) {
            Some(RelationSlot::One(child)) => Ok(child.as_mut()),
            _ => Err(ModelError::bad_argument(format!("'{property}' holds no child"))),
        }
    }

    /// The hasMany children, empty while unset.
    pub fn has_many(&self, name: &str) -> Result<&[Entity]> {
        let relation = self.relation_of(name, &[RelationKind::HasMany])?;
        Ok(match self.relations.get(relation.property()) {
            Some(RelationSlot::Many(children)) => children.as_slice(),
            _ => &[],
        })
    }

    pub fn has_many_mut(&mut self, name: &str) -> Result<&mut [Entity]> {
        let relation = self.relation_of(name, &[RelationKind::HasMany])?;
        Ok(match self.relations.get_mut(relation.property()) {
            Some(RelationSlot::Many(children)) => children.as_mut_slice(),
            _ => Default::default(),
        })
    }

    /// Parents recorded on a belongsTo property by a relation-aware load or an assignment.
    pub fn belongs_to(&self, name: &str) -> Result<&[Entity]> {
        let relation = self.relation_of(name, &[RelationKind::BelongsTo])?;
        Ok(match self.relations.get(relation.property()) {
            Some(RelationSlot::Parents(parents)) => parents.as_slice(),
            _ => &[],
        })
    }

    pub fn set_has_one(&mut self, name: &str, child: impl Into<Related>) -> Result<()> {
        let relation = self.relation_of(name, &[RelationKind::HasOne])?;
        let child = self.upgrade(&relation, child.into())?;
        self.replace_slot(&relation, RelationSlot::One(Box::new(child)))
    }

    /// Replaces every child; nothing changes when one of them is rejected.
    pub fn set_has_many<I, R>(&mut self, name: &str, children: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<Related>,
    {
        let relation = self.relation_of(name, &[RelationKind::HasMany])?;
        let children = children.into_iter().map(|child| self.upgrade(&relation, child.into())).collect::<Result<Vec<_>>>()?;
        self.replace_slot(&relation, RelationSlot::Many(children))
    }

    /// Appends one child to a hasMany relation.
    pub fn add_related(&mut self, name: &str, child: impl Into<Related>) -> Result<()> {
        let relation = self.relation_of(name, &[RelationKind::HasMany])?;
        let child = self.upgrade(&relation, child.into())?;
        match self.relations.get_mut(relation.property()) {
            Some(RelationSlot::Many(children)) => children.push(child),
            _ => {
                self.relations.insert(relation.property().to_string(), RelationSlot::Many(vec![child]));
            }
        }
        self.stamp_relation(&relation)?;
        self.touch();
        Ok(())
    }

    /// Records parents on a belongsTo property.
    pub fn set_belongs_to<I, R>(&mut self, name: &str, parents: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<Related>,
    {
        let relation = self.relation_of(name, &[RelationKind::BelongsTo])?;
        let parents = parents.into_iter().map(|parent| self.upgrade(&relation, parent.into())).collect::<Result<Vec<_>>>()?;
        for parent in &parents {
            parent.dirty.detach(&self.dirty);
        }
        self.replace_slot(&relation, RelationSlot::Parents(parents))
    }

    /// `set` on a relation property: an object, an array of objects, or null to clear.
    pub(crate) fn set_relation_value(&mut self, relation: &Relation, value: Value) -> Result<()> {
        let name = relation.property();
        match (relation.kind(), value) {
            (_, Value::Null) => {
                if self.relations.remove(name).is_some() {
                    self.touch();
                }
                Ok(())
            }
            (RelationKind::HasOne, Value::Object(record)) => self.set_has_one(name, record),
            (RelationKind::HasMany, Value::Array(elements)) => {
                let children = elements.into_iter().map(Related::try_from).collect::<Result<Vec<_>>>()?;
                self.set_has_many(name, children)
            }
            (RelationKind::BelongsTo, Value::Object(record)) => self.set_belongs_to(name, [record]),
            (RelationKind::BelongsTo, Value::Array(elements)) => {
                let parents = elements.into_iter().map(Related::try_from).collect::<Result<Vec<_>>>()?;
                self.set_belongs_to(name, parents)
            }
            (kind, other) => Err(ModelError::bad_argument(format!(
                "cannot assign {} to {:?} relation '{}' of {}",
                other,
                kind,
                name,
                self.model.name()
            ))),
        }
    }

    /// Checks the target model and attaches the child to this entity's dirty flag.
    fn upgrade(&self, relation: &Relation, related: Related) -> Result<Entity> {
        let target = self.model.target_of(relation)?;
        let entity = match related {
            Related::Entity(entity) if entity.model.is_a(&target) => entity,
            Related::Entity(entity) => {
                return Err(ModelError::bad_argument(format!(
                    "'{}' expects {} entities, got {}",
                    relation.property(),
                    target.name(),
                    entity.model.name()
                )))
            }
            Related::Record(record) => target.from_record(record)?,
        };
        entity.dirty.attach(&self.dirty);
        Ok(entity)
    }

    fn replace_slot(&mut self, relation: &Relation, slot: RelationSlot) -> Result<()> {
        if let Some(previous) = self.relations.insert(relation.property().to_string(), slot) {
            detach_slot(&previous, self);
        }
        self.stamp_relation(relation)?;
        self.touch();
        Ok(())
    }

    /// Writes the prefixed primary key into the foreign key of every child and mirrors it onto
    /// this entity; attributes already holding the value are left alone.
    pub(crate) fn stamp_relation(&mut self, relation: &Relation) -> Result<()> {
        let (Some(foreign_key), true) = (relation.get_foreign_key(), relation.kind().is_child()) else {
            return Ok(());
        };
        let Some(primary) = self.prefixed_primary() else {
            return Ok(());
        };
        let stamped = Value::String(primary.clone());
        match self.relations.get_mut(relation.property()) {
            Some(RelationSlot::One(child)) => stamp(child, foreign_key, &stamped)?,
            Some(RelationSlot::Many(children)) => {
                for child in children.iter_mut() {
                    stamp(child, foreign_key, &stamped)?;
                }
            }
            _ => return Ok(()),
        }
        stamp(self, foreign_key, &stamped)
    }

    pub(crate) fn stamp_foreign_keys(&mut self) -> Result<()> {
        let relations: Vec<Relation> = self.model.relations().to_vec();
        for relation in &relations {
            self.stamp_relation(relation)?;
        }
        Ok(())
    }
}

fn stamp(entity: &mut Entity, attribute: &str, value: &Value) -> Result<()> {
    if entity.stored_attribute(attribute).as_ref() != Some(value) {
        entity.set(attribute, value.clone())?;
    }
    Ok(())
}

fn detach_slot(slot: &RelationSlot, owner: &Entity) {
    match slot {
        RelationSlot::One(child) => child.dirty.detach(&owner.dirty),
        RelationSlot::Many(children) => children.iter().for_each(|child| child.dirty.detach(&owner.dirty)),
        RelationSlot::Parents(_) => {}
    }
}
