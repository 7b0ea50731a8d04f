use crate::Record;
use serde_json::Value;

/// A composite definition bound to the property it derives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompositeField {
    pub field: String,
    pub sources: Vec<String>,
    pub delimiter: String,
}

impl CompositeField {
    fn depends_on(&self, field: &str) -> bool {
        self.sources.iter().any(|source| source == field)
    }
}

/// Inserts `field` after every composite it reads and before every composite reading it.
///
/// When the existing order leaves no such slot the whole list is re-sorted; only a real
/// dependency cycle is an error.
pub(crate) fn insert_ordered(ordered: &mut Vec<CompositeField>, field: CompositeField) -> Result<(), String> {
    if field.depends_on(&field.field) {
        return Err(format!("composite key '{}' depends on itself", field.field));
    }
    ordered.retain(|existing| existing.field != field.field);
    let after = ordered.iter().rposition(|existing| field.depends_on(&existing.field)).map_or(0, |i| i + 1);
    let before = ordered.iter().position(|existing| existing.depends_on(&field.field)).unwrap_or(ordered.len());
    if after <= before {
        ordered.insert(before, field);
        return Ok(());
    }
    ordered.push(field);
    let sorted = topological(ordered)?;
    *ordered = sorted;
    Ok(())
}

fn topological(fields: &[CompositeField]) -> Result<Vec<CompositeField>, String> {
    let mut pending: Vec<&CompositeField> = fields.iter().collect();
    let mut sorted: Vec<CompositeField> = Vec::with_capacity(fields.len());
    while !pending.is_empty() {
        let ready = pending.iter().position(|candidate| {
            !pending.iter().any(|other| other.field != candidate.field && candidate.depends_on(&other.field))
        });
        match ready {
            Some(index) => sorted.push(pending.remove(index).clone()),
            None => {
                let names: Vec<&str> = pending.iter().map(|c| c.field.as_str()).collect();
                return Err(format!("composite keys form a dependency cycle: {}", names.join(", ")));
            }
        }
    }
    Ok(sorted)
}

/// Writes each derived field, or removes it when any source is absent or null.
pub(crate) fn apply(composites: &[CompositeField], record: &mut Record) {
    for composite in composites {
        let parts: Option<Vec<String>> = composite.sources.iter().map(|source| record.get(source).and_then(scalar_string)).collect();
        match parts {
            Some(parts) => {
                record.insert(composite.field.clone(), Value::String(parts.join(&composite.delimiter)));
            }
            None => {
                record.shift_remove(&composite.field);
            }
        }
    }
}

/// String form of a stored value, `None` for null.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn composite(field: &str, sources: &[&str]) -> CompositeField {
        CompositeField {
            field: field.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            delimiter: "#".to_string(),
        }
    }

    fn names(ordered: &[CompositeField]) -> Vec<&str> {
        ordered.iter().map(|c| c.field.as_str()).collect()
    }

    #[test]
    fn dependents_are_placed_after_their_sources() {
        let mut ordered = Vec::new();
        insert_ordered(&mut ordered, composite("full", &["prefix", "b"])).unwrap();
        insert_ordered(&mut ordered, composite("prefix", &["a", "c"])).unwrap();
        insert_ordered(&mut ordered, composite("other", &["full"])).unwrap();
        assert_eq!(names(&ordered), vec!["prefix", "full", "other"]);
    }

    #[test]
    fn resorts_when_insertion_slot_is_missing() {
        let mut ordered = Vec::new();
        insert_ordered(&mut ordered, composite("e", &["n"])).unwrap();
        insert_ordered(&mut ordered, composite("d", &["x"])).unwrap();
        insert_ordered(&mut ordered, composite("n", &["d"])).unwrap();
        assert_eq!(names(&ordered), vec!["d", "n", "e"]);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut ordered = Vec::new();
        insert_ordered(&mut ordered, composite("a", &["b"])).unwrap();
        assert!(insert_ordered(&mut ordered, composite("b", &["a"])).is_err());
        assert!(insert_ordered(&mut Vec::new(), composite("a", &["a"])).is_err());
    }

    #[test]
    fn apply_joins_sources_and_drops_partial_values() {
        let ordered = vec![composite("prefix", &["a", "b"]), composite("full", &["prefix", "c"])];
        let mut record = json!({"a": "x", "b": 2, "c": true}).as_object().cloned().unwrap();
        apply(&ordered, &mut record);
        assert_eq!(record["full"], json!("x#2#true"));

        let once = record.clone();
        apply(&ordered, &mut record);
        assert_eq!(record, once);

        record.insert("b".to_string(), json!(null));
        apply(&ordered, &mut record);
        assert!(!record.contains_key("prefix"));
        assert!(!record.contains_key("full"));
    }
}
