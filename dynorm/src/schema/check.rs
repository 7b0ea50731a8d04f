use super::{label, PathSegment, Schema, SchemaKind, Validated, ValidationDetail, ValidationError, ValidationOptions};
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde_json::{Number, Value};

/// Walks a value against a schema, collecting one detail per failing path.
pub(super) struct Checker<'a> {
    options: &'a ValidationOptions,
    coerce_only: bool,
    path: Vec<PathSegment>,
    details: Vec<ValidationDetail>,
}

impl<'a> Checker<'a> {
    pub(super) fn new(options: &'a ValidationOptions, coerce_only: bool) -> Self {
        Checker { options, coerce_only, path: Vec::new(), details: Vec::new() }
    }

    pub(super) fn run(mut self, schema: &Schema, value: &Value) -> Validated {
        let checked = self.check(schema, Some(value)).unwrap_or_else(|| value.clone());
        let error = if self.details.is_empty() { None } else { Some(ValidationError::new(self.details)) };
        Validated { value: checked, error }
    }

    fn halted(&self) -> bool {
        self.options.abort_early && !self.details.is_empty()
    }

    fn fail(&mut self, rule: &str) {
        let message = format!("{} {}", label(&self.path), rule);
        self.details.push(ValidationDetail { path: self.path.clone(), message });
    }

    fn check(&mut self, schema: &Schema, value: Option<&Value>) -> Option<Value> {
        if self.halted() {
            return value.cloned();
        }
        let value = match value {
            Some(value) => value,
            None => {
                if let Some(default) = &schema.default {
                    return Some(default.clone());
                }
                if schema.required && !self.coerce_only {
                    self.fail("is required");
                }
                return None;
            }
        };
        if value.is_null() {
            if !(schema.nullable || self.coerce_only || matches!(schema.kind, SchemaKind::Any)) {
                self.fail("must not be null");
            }
            return Some(Value::Null);
        }

        let converted = match &schema.kind {
            SchemaKind::Any => value.clone(),
            SchemaKind::String { trim, min_len, max_len } => self.check_string(value, *trim, *min_len, *max_len),
            SchemaKind::Number { integer, min, max } => self.check_number(value, *integer, *min, *max),
            SchemaKind::Boolean => self.check_boolean(value),
            SchemaKind::Date => self.check_date(value),
            SchemaKind::Object { fields, allow_unknown } => self.check_object(value, fields, *allow_unknown),
            SchemaKind::Array { items, min_items, max_items } => self.check_array(value, items, *min_items, *max_items),
        };

        if !self.coerce_only && !schema.allowed.is_empty() && !schema.allowed.contains(&converted) {
            let allowed: Vec<String> = schema.allowed.iter().map(ToString::to_string).collect();
            self.fail(&format!("must be one of [{}]", allowed.join(", ")));
        }
        Some(converted)
    }

    fn check_string(&mut self, value: &Value, trim: bool, min_len: Option<usize>, max_len: Option<usize>) -> Value {
        let Value::String(text) = value else {
            self.fail("must be a string");
            return value.clone();
        };
        let text = if trim && self.options.convert { text.trim().to_string() } else { text.clone() };
        if !self.coerce_only {
            let len = text.chars().count();
            if let Some(min) = min_len.filter(|min| len < *min) {
                self.fail(&format!("length must be at least {min} characters long"));
            }
            if let Some(max) = max_len.filter(|max| len > *max) {
                self.fail(&format!("length must be less than or equal to {max} characters long"));
            }
        }
        Value::String(text)
    }

    fn check_number(&mut self, value: &Value, integer: bool, min: Option<f64>, max: Option<f64>) -> Value {
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) if self.options.convert => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        };
        let Some(number) = number else {
            self.fail("must be a number");
            return value.clone();
        };
        if !self.coerce_only {
            if integer && number.fract() != 0.0 {
                self.fail("must be an integer");
            }
            if let Some(min) = min.filter(|min| number < *min) {
                self.fail(&format!("must be greater than or equal to {min}"));
            }
            if let Some(max) = max.filter(|max| number > *max) {
                self.fail(&format!("must be less than or equal to {max}"));
            }
        }
        match value {
            Value::Number(_) => value.clone(),
            _ => number_value(number),
        }
    }

    fn check_boolean(&mut self, value: &Value) -> Value {
        match value {
            Value::Bool(_) => value.clone(),
            Value::String(text) if self.options.convert && text.eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::String(text) if self.options.convert && text.eq_ignore_ascii_case("false") => Value::Bool(false),
            _ => {
                self.fail("must be a boolean");
                value.clone()
            }
        }
    }

    fn check_date(&mut self, value: &Value) -> Value {
        match parse_date(value, self.options) {
            Some(date) => Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => {
                self.fail("must be a valid date");
                value.clone()
            }
        }
    }

    fn check_object(&mut self, value: &Value, fields: &[(String, Schema)], allow_unknown: bool) -> Value {
        let Value::Object(map) = value else {
            self.fail("must be of type object");
            return value.clone();
        };
        let mut out = map.clone();
        for (name, schema) in fields {
            self.path.push(PathSegment::Key(name.clone()));
            let checked = self.check(schema, map.get(name));
            self.path.pop();
            match checked {
                Some(field_value) => {
                    out.insert(name.clone(), field_value);
                }
                None => {
                    out.shift_remove(name);
                }
            }
        }
        if !allow_unknown && !self.coerce_only {
            for key in map.keys() {
                if !fields.iter().any(|(name, _)| name == key) && !self.halted() {
                    self.path.push(PathSegment::Key(key.clone()));
                    self.fail("is not allowed");
                    self.path.pop();
                }
            }
        }
        Value::Object(out)
    }

    fn check_array(&mut self, value: &Value, items: &Schema, min_items: Option<usize>, max_items: Option<usize>) -> Value {
        let Value::Array(elements) = value else {
            self.fail("must be an array");
            return value.clone();
        };
        let mut out = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            self.path.push(PathSegment::Index(index));
            let checked = self.check(items, Some(element));
            self.path.pop();
            out.push(checked.unwrap_or_else(|| element.clone()));
        }
        if !self.coerce_only && !self.halted() {
            if let Some(min) = min_items.filter(|min| elements.len() < *min) {
                self.fail(&format!("must contain at least {min} items"));
            }
            if let Some(max) = max_items.filter(|max| elements.len() > *max) {
                self.fail(&format!("must contain less than or equal to {max} items"));
            }
        }
        Value::Array(out)
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        Value::from(number as i64)
    } else {
        Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn parse_date(value: &Value, options: &ValidationOptions) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) if options.iso_dates => DateTime::parse_from_rfc3339(text.trim())
            .map(|date| date.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        Value::Number(number) if options.convert => number.as_i64().and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
