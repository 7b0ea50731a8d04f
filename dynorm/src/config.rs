use crate::error::ModelError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

fn default_partition_key() -> String {
    "pk".to_string()
}

fn default_sort_key() -> Option<String> {
    Some("sk".to_string())
}

fn default_entity_column() -> String {
    "entity".to_string()
}

/// Physical layout of the shared table every registered model is stored in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub table_name: String,
    /// Attribute holding the prefixed primary key.
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    /// Attribute holding the prefixed secondary key, `None` for hash-only tables.
    #[serde(default = "default_sort_key")]
    pub sort_key: Option<String>,
    /// Discriminator column naming the model a record belongs to.
    #[serde(default = "default_entity_column")]
    pub entity_column: String,
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        TableConfig {
            table_name: table_name.into(),
            partition_key: default_partition_key(),
            sort_key: default_sort_key(),
            entity_column: default_entity_column(),
        }
    }

    pub fn with_partition_key(mut self, name: impl Into<String>) -> Self {
        self.partition_key = name.into();
        self
    }

    pub fn with_sort_key(mut self, name: impl Into<String>) -> Self {
        self.sort_key = Some(name.into());
        self
    }

    pub fn without_sort_key(mut self) -> Self {
        self.sort_key = None;
        self
    }

    pub fn with_entity_column(mut self, name: impl Into<String>) -> Self {
        self.entity_column = name.into();
        self
    }

    /// Reads the table layout from an optional file, overridden by `DYNORM__*` variables.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix("DYNORM").try_parsing(true).separator("__"))
            .build()?
            .try_deserialize()
    }

    /// True for attributes that belong to the physical layout rather than to a model.
    pub fn is_reserved(&self, attribute: &str) -> bool {
        attribute == self.partition_key
            || attribute == self.entity_column
            || self.sort_key.as_deref() == Some(attribute)
    }

    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        if self.table_name.trim().is_empty() {
            return Err(ModelError::config("missing table name"));
        }
        if self.partition_key.is_empty() || self.entity_column.is_empty() {
            return Err(ModelError::config("key and discriminator columns must be named"));
        }
        if self.sort_key.as_deref() == Some(self.partition_key.as_str()) {
            return Err(ModelError::config("partition and sort key must be different attributes"));
        }
        Ok(())
    }
}
