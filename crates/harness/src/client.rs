use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use techpack_core::{BomItem, Colorway, Measurement, Record};
use techpack_engine::{EditorSession, EngineConfig, EngineError};
use techpack_storage::{SqliteStore, StorageError};

use crate::server::FakeServer;

pub type Session = EditorSession<SqliteStore, FakeServer>;

/// An editor session wired to a shared [`FakeServer`].
pub struct TestClient {
    pub session: Session,
    pub server: Arc<FakeServer>,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        autosave_idle: Duration::from_millis(1000),
        ..EngineConfig::default()
    }
}

impl TestClient {
    pub fn new(server: &Arc<FakeServer>) -> Result<Self, StorageError> {
        let store = SqliteStore::open_in_memory()?;
        Ok(Self {
            session: EditorSession::new(store, Arc::clone(server), &test_config()),
            server: Arc::clone(server),
        })
    }

    /// Session backed by a database file, for reload scenarios.
    pub fn at(path: &Path, server: &Arc<FakeServer>) -> Result<Self, StorageError> {
        let store = SqliteStore::open(path)?;
        Ok(Self {
            session: EditorSession::new(store, Arc::clone(server), &test_config()),
            server: Arc::clone(server),
        })
    }

    /// Create and save a record with the given article code and name.
    pub async fn create_record(&mut self, code: &str, name: &str) -> Result<Record, EngineError> {
        self.session.open_new();
        self.session.edit(|r| {
            r.article_info.article_code = code.to_string();
            r.article_info.product_name = name.to_string();
        });
        self.session.save().await
    }
}

pub fn bom_line(part: &str, quantity: f64) -> BomItem {
    BomItem {
        part: part.to_string(),
        material_name: format!("{part} fabric"),
        quantity,
        uom: "m".to_string(),
        ..Default::default()
    }
}

pub fn measurement(pom_code: &str) -> Measurement {
    Measurement {
        pom_code: pom_code.to_string(),
        point_of_measure: format!("{pom_code} width"),
        tolerance: 0.5,
        ..Default::default()
    }
}

/// A colorway with every required field filled.
pub fn colorway(name: &str) -> Colorway {
    Colorway {
        name: name.to_string(),
        placement: "Body".to_string(),
        material_type: "Jersey".to_string(),
        hex_color: "#1A2B3C".to_string(),
        ..Default::default()
    }
}
