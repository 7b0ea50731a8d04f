//! A small schema description and validation engine for attribute records.
//!
//! A [`Schema`] validates a `serde_json::Value`, returning the converted value together with an
//! aggregate [`ValidationError`] listing every failing path. Conversion covers string trimming,
//! numeric and boolean strings, and ISO-8601 dates normalised to RFC 3339.

mod check;

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Any,
    String {
        trim: bool,
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    Number {
        integer: bool,
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    Date,
    Object {
        fields: Vec<(String, Schema)>,
        allow_unknown: bool,
    },
    Array {
        items: Box<Schema>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    kind: SchemaKind,
    required: bool,
    nullable: bool,
    allowed: Vec<Value>,
    default: Option<Value>,
}

impl Schema {
    fn of(kind: SchemaKind) -> Self {
        Schema { kind, required: false, nullable: false, allowed: Vec::new(), default: None }
    }

    pub fn any() -> Self {
        Self::of(SchemaKind::Any)
    }

    pub fn string() -> Self {
        Self::of(SchemaKind::String { trim: false, min_len: None, max_len: None })
    }

    pub fn number() -> Self {
        Self::of(SchemaKind::Number { integer: false, min: None, max: None })
    }

    pub fn integer() -> Self {
        Self::of(SchemaKind::Number { integer: true, min: None, max: None })
    }

    pub fn boolean() -> Self {
        Self::of(SchemaKind::Boolean)
    }

    pub fn date() -> Self {
        Self::of(SchemaKind::Date)
    }

    /// Object schemas accept unknown keys unless [`Schema::strict`] is applied.
    pub fn object() -> Self {
        Self::of(SchemaKind::Object { fields: Vec::new(), allow_unknown: true })
    }

    pub fn array(items: Schema) -> Self {
        Self::of(SchemaKind::Array { items: Box::new(items), min_items: None, max_items: None })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn valid<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn trim(mut self) -> Self {
        if let SchemaKind::String { trim, .. } = &mut self.kind {
            *trim = true;
        }
        self
    }

    pub fn min_len(mut self, len: usize) -> Self {
        if let SchemaKind::String { min_len, .. } = &mut self.kind {
            *min_len = Some(len);
        }
        self
    }

    pub fn max_len(mut self, len: usize) -> Self {
        if let SchemaKind::String { max_len, .. } = &mut self.kind {
            *max_len = Some(len);
        }
        self
    }

    pub fn min(mut self, bound: f64) -> Self {
        if let SchemaKind::Number { min, .. } = &mut self.kind {
            *min = Some(bound);
        }
        self
    }

    pub fn max(mut self, bound: f64) -> Self {
        if let SchemaKind::Number { max, .. } = &mut self.kind {
            *max = Some(bound);
        }
        self
    }

    pub fn min_items(mut self, count: usize) -> Self {
        if let SchemaKind::Array { min_items, .. } = &mut self.kind {
            *min_items = Some(count);
        }
        self
    }

    pub fn max_items(mut self, count: usize) -> Self {
        if let SchemaKind::Array { max_items, .. } = &mut self.kind {
            *max_items = Some(count);
        }
        self
    }

    /// Adds or replaces a field of an object schema.
    pub fn field(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.set_field(name.into(), schema);
        self
    }

    pub fn strict(mut self) -> Self {
        if let SchemaKind::Object { allow_unknown, .. } = &mut self.kind {
            *allow_unknown = false;
        }
        self
    }

    pub(crate) fn set_field(&mut self, name: String, schema: Schema) {
        if let SchemaKind::Object { fields, .. } = &mut self.kind {
            match fields.iter_mut().find(|(field, _)| *field == name) {
                Some((_, existing)) => *existing = schema,
                None => fields.push((name, schema)),
            }
        }
    }

    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, SchemaKind::Object { .. })
    }

    pub fn fields(&self) -> &[(String, Schema)] {
        match &self.kind {
            SchemaKind::Object { fields, .. } => fields,
            _ => &[],
        }
    }

    pub fn field_schema(&self, name: &str) -> Option<&Schema> {
        self.fields().iter().find(|(field, _)| field == name).map(|(_, schema)| schema)
    }

    /// Runs the full rule set and reports every failure unless `abort_early` is set.
    pub fn validate(&self, value: &Value, options: &ValidationOptions) -> Validated {
        check::Checker::new(options, false).run(self, value)
    }

    /// Type conversion only: no presence, length or range rules.
    pub fn coerce(&self, value: &Value) -> Result<Value, ValidationError> {
        let Validated { value, error } = check::Checker::new(&ValidationOptions::default(), true).run(self, value);
        match error {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    pub abort_early: bool,
    pub convert: bool,
    pub iso_dates: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        ValidationOptions { abort_early: false, convert: true, iso_dates: true }
    }
}

/// Outcome of a validation run: the converted value and the failures, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T = Value> {
    pub value: T,
    pub error: Option<ValidationError>,
}

impl<T> Validated<T> {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<T, ValidationError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationDetail {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl ValidationDetail {
    pub fn label(&self) -> String {
        label(&self.path)
    }
}

pub(crate) fn label(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "\"value\"".to_string();
    }
    let joined = path.iter().map(ToString::to_string).collect::<Vec<_>>().join(".");
    format!("\"{joined}\"")
}

/// Aggregate validation failure, one detail per failing path.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{}", joined(.details))]
pub struct ValidationError {
    details: Vec<ValidationDetail>,
}

impl ValidationError {
    pub fn new(details: Vec<ValidationDetail>) -> Self {
        ValidationError { details }
    }

    pub fn details(&self) -> &[ValidationDetail] {
        &self.details
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

fn joined(details: &[ValidationDetail]) -> String {
    details.iter().map(|detail| detail.message.as_str()).collect::<Vec<_>>().join(". ")
}
