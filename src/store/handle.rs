//! Store handle
//!
//! The handle is created explicitly at boot and passed to whatever needs
//! the store. Using it before `connect` (or after `close`) is a typed
//! `NotConnected` error, never a panic.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::config::StoreConfig;
use super::errors::{StoreError, StoreResult};
use super::memory::MemoryStore;
use super::DocumentStore;
use crate::observability::{log_event_with_fields, Event};

enum Connection {
    Disconnected,
    Connected(Arc<dyn DocumentStore>),
}

/// Shared, cloneable reference to the current store connection
#[derive(Clone)]
pub struct StoreHandle {
    state: Arc<RwLock<Connection>>,
}

impl StoreHandle {
    /// A handle with no store behind it yet
    pub fn disconnected() -> Self {
        Self {
            state: Arc::new(RwLock::new(Connection::Disconnected)),
        }
    }

    /// A handle already connected to the given store
    pub fn connected(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            state: Arc::new(RwLock::new(Connection::Connected(store))),
        }
    }

    /// Builds a memory store from config, seeds it, declares its indexes and
    /// connects the handle to it.
    ///
    /// Seeding happens before index declaration, so a unique index over
    /// duplicate seed data fails the connect. On failure the handle is left
    /// as it was.
    pub fn connect(&self, config: &StoreConfig) -> StoreResult<()> {
        let store = MemoryStore::new(config.database.clone());

        for seed in &config.seed {
            let documents = seed.load()?;
            let count = documents.len().to_string();
            store.insert_many(&seed.collection, documents)?;
            log_event_with_fields(
                Event::SeedLoaded,
                &[
                    ("collection", seed.collection.as_str()),
                    ("documents", count.as_str()),
                ],
            );
        }

        for declaration in &config.indexes {
            let name = store.create_index(
                &declaration.collection,
                &declaration.keys,
                declaration.options.clone(),
            )?;
            log_event_with_fields(
                Event::IndexCreated,
                &[
                    ("collection", declaration.collection.as_str()),
                    ("index", name.as_str()),
                ],
            );
        }

        *self.state.write() = Connection::Connected(Arc::new(store));
        log_event_with_fields(Event::StoreConnected, &[("database", config.database.as_str())]);
        Ok(())
    }

    /// Drops the connection; later calls see `NotConnected`
    pub fn close(&self) {
        let mut state = self.state.write();
        if matches!(*state, Connection::Connected(_)) {
            *state = Connection::Disconnected;
            log_event_with_fields(Event::StoreClosed, &[]);
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.read(), Connection::Connected(_))
    }

    /// The connected store
    pub fn store(&self) -> StoreResult<Arc<dyn DocumentStore>> {
        match &*self.state.read() {
            Connection::Connected(store) => Ok(Arc::clone(store)),
            Connection::Disconnected => Err(StoreError::NotConnected),
        }
    }
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::config::{IndexDeclaration, SeedSource};
    use crate::store::index::IndexOptions;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disconnected_handle_errors() {
        let handle = StoreHandle::disconnected();
        assert!(!handle.is_connected());
        assert!(matches!(handle.store(), Err(StoreError::NotConnected)));
    }

    #[test]
    fn test_connect_seeds_and_indexes() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{"nombre": "a", "rating": 4}}, {{"nombre": "b", "rating": 2}}]"#).unwrap();

        let config = StoreConfig {
            database: "Proyecto2".into(),
            seed: vec![SeedSource {
                collection: "restaurantes".into(),
                path: file.path().to_path_buf(),
            }],
            indexes: vec![IndexDeclaration {
                collection: "restaurantes".into(),
                keys: json!({"rating": 1}).as_object().cloned().unwrap(),
                options: IndexOptions::default(),
            }],
        };

        let handle = StoreHandle::default();
        handle.connect(&config).unwrap();

        let store = handle.store().unwrap();
        assert_eq!(store.database(), "Proyecto2");
        assert_eq!(store.count("restaurantes", &Default::default()).unwrap(), 2);
        assert_eq!(store.list_indexes("restaurantes").unwrap().len(), 2);
    }

    #[test]
    fn test_failed_connect_leaves_handle_disconnected() {
        let config = StoreConfig {
            seed: vec![SeedSource {
                collection: "c".into(),
                path: "/nonexistent/seed.json".into(),
            }],
            ..Default::default()
        };
        let handle = StoreHandle::disconnected();
        assert!(handle.connect(&config).is_err());
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_close_is_visible_to_clones() {
        let handle = StoreHandle::connected(Arc::new(MemoryStore::new("db")));
        let clone = handle.clone();
        handle.close();
        assert!(matches!(clone.store(), Err(StoreError::NotConnected)));
    }
}
