//! Store configuration
//!
//! What the store holds at boot: a database name, seed files to insert and
//! indexes to declare. Seed files are JSON arrays of documents.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{validate_collection_name, Document};
use super::errors::{StoreError, StoreResult};
use super::index::{IndexOptions, IndexSpec};

/// Store section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database name (default: "indexgate")
    #[serde(default = "default_database")]
    pub database: String,

    /// Files inserted at connect time, in order
    #[serde(default)]
    pub seed: Vec<SeedSource>,

    /// Indexes declared at connect time, after seeding
    #[serde(default)]
    pub indexes: Vec<IndexDeclaration>,
}

fn default_database() -> String {
    "indexgate".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            seed: Vec::new(),
            indexes: Vec::new(),
        }
    }
}

/// A JSON array of documents to insert into one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSource {
    pub collection: String,
    pub path: PathBuf,
}

/// An index to declare at boot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDeclaration {
    pub collection: String,
    /// Ordered key pattern, e.g. `{"id_usuario": 1, "estado": 1}`
    pub keys: Document,
    #[serde(default)]
    pub options: IndexOptions,
}

impl StoreConfig {
    /// Checks names and index definitions without touching seed files
    pub fn validate(&self) -> Result<(), String> {
        if self.database.is_empty() {
            return Err("store.database must not be empty".into());
        }

        for seed in &self.seed {
            validate_collection_name(&seed.collection)
                .map_err(|e| format!("store.seed: {}", e))?;
        }

        for declaration in &self.indexes {
            validate_collection_name(&declaration.collection)
                .map_err(|e| format!("store.indexes: {}", e))?;
            IndexSpec::new(&declaration.keys, declaration.options.clone())
                .map_err(|e| format!("store.indexes on '{}': {}", declaration.collection, e))?;
        }

        Ok(())
    }
}

impl SeedSource {
    /// Reads the seed file
    pub fn load(&self) -> StoreResult<Vec<Document>> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            StoreError::Internal(format!(
                "failed to read seed file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let parsed: Value = serde_json::from_str(&content).map_err(|e| {
            StoreError::InvalidDocument(format!(
                "seed file {} is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })?;

        let Value::Array(items) = parsed else {
            return Err(StoreError::InvalidDocument(format!(
                "seed file {} must contain a JSON array",
                self.path.display()
            )));
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Object(document) => Ok(document),
                other => Err(StoreError::InvalidDocument(format!(
                    "seed file {} contains a non-object entry: {}",
                    self.path.display(),
                    other
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config: StoreConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_index_declarations_are_checked() {
        let config: StoreConfig = serde_json::from_value(json!({
            "indexes": [{"collection": "resenas", "keys": {"rating": "desc"}}]
        }))
        .unwrap();
        assert!(config.validate().is_err());

        let config: StoreConfig = serde_json::from_value(json!({
            "indexes": [{"collection": "system.x", "keys": {"rating": 1}}]
        }))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_load() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{"nombre": "a"}}, {{"nombre": "b"}}]"#).unwrap();

        let seed = SeedSource {
            collection: "restaurantes".into(),
            path: file.path().to_path_buf(),
        };
        let documents = seed.load().unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1]["nombre"], json!("b"));
    }

    #[test]
    fn test_seed_must_be_array_of_objects() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{"a": 1}}, 5]"#).unwrap();
        let seed = SeedSource {
            collection: "c".into(),
            path: file.path().to_path_buf(),
        };
        assert!(matches!(seed.load(), Err(StoreError::InvalidDocument(_))));

        let missing = SeedSource {
            collection: "c".into(),
            path: PathBuf::from("/nonexistent/indexgate-seed.json"),
        };
        assert!(matches!(missing.load(), Err(StoreError::Internal(_))));
    }
}
