//! Durable key-value records per named entity. Each record is read and
//! written only by its owning component; the scheduler garbage-collects
//! agent records once the environment reports the agent gone.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use contracts::{AgentRecord, ColonyRecord};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Storage surface for durable records.
pub trait RecordStore {
    fn load_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError>;
    fn save_agent(&mut self, agent_id: &str, record: &AgentRecord) -> Result<(), StoreError>;
    fn remove_agent(&mut self, agent_id: &str) -> Result<(), StoreError>;
    /// Ids of all stored agent records belonging to a colony.
    fn agent_ids(&self, colony_id: &str) -> Result<Vec<String>, StoreError>;
    fn load_colony(&self, colony_id: &str) -> Result<Option<ColonyRecord>, StoreError>;
    fn save_colony(&mut self, colony_id: &str, record: &ColonyRecord) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Map-backed store for tests and in-process runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    agents: BTreeMap<String, AgentRecord>,
    colonies: BTreeMap<String, ColonyRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

impl RecordStore for MemoryStore {
    fn load_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError> {
        Ok(self.agents.get(agent_id).cloned())
    }

    fn save_agent(&mut self, agent_id: &str, record: &AgentRecord) -> Result<(), StoreError> {
        self.agents.insert(agent_id.to_string(), record.clone());
        Ok(())
    }

    fn remove_agent(&mut self, agent_id: &str) -> Result<(), StoreError> {
        self.agents.remove(agent_id);
        Ok(())
    }

    fn agent_ids(&self, colony_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .agents
            .iter()
            .filter(|(_, record)| record.colony_id == colony_id)
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn load_colony(&self, colony_id: &str) -> Result<Option<ColonyRecord>, StoreError> {
        Ok(self.colonies.get(colony_id).cloned())
    }

    fn save_colony(&mut self, colony_id: &str, record: &ColonyRecord) -> Result<(), StoreError> {
        self.colonies.insert(colony_id.to_string(), record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

/// SQLite-backed store; records are JSON payload columns keyed by
/// entity id.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agent_records (
                agent_id TEXT PRIMARY KEY,
                colony_id TEXT NOT NULL,
                payload_json TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_agent_records_colony
                 ON agent_records (colony_id);
             CREATE TABLE IF NOT EXISTS colony_records (
                colony_id TEXT PRIMARY KEY,
                payload_json TEXT NOT NULL
             );",
        )?;
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn load_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM agent_records WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    fn save_agent(&mut self, agent_id: &str, record: &AgentRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO agent_records (agent_id, colony_id, payload_json)
             VALUES (?1, ?2, ?3)",
            params![agent_id, record.colony_id.as_str(), payload],
        )?;
        Ok(())
    }

    fn remove_agent(&mut self, agent_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM agent_records WHERE agent_id = ?1",
            params![agent_id],
        )?;
        Ok(())
    }

    fn agent_ids(&self, colony_id: &str) -> Result<Vec<String>, StoreError> {
        let mut statement = self
            .conn
            .prepare("SELECT agent_id FROM agent_records WHERE colony_id = ?1 ORDER BY agent_id")?;
        let rows = statement.query_map(params![colony_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn load_colony(&self, colony_id: &str) -> Result<Option<ColonyRecord>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM colony_records WHERE colony_id = ?1",
                params![colony_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    fn save_colony(&mut self, colony_id: &str, record: &ColonyRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO colony_records (colony_id, payload_json)
             VALUES (?1, ?2)",
            params![colony_id, payload],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AgentState, Role};

    fn sample_record() -> AgentRecord {
        let mut record = AgentRecord::new("colony:1", Role::Builder);
        record.state = Some(AgentState::Collect);
        record.target = Some("container:7".to_string());
        record
    }

    fn stores() -> Vec<Box<dyn RecordStore>> {
        vec![
            Box::new(MemoryStore::new()),
            Box::new(SqliteStore::open_in_memory().expect("sqlite")),
        ]
    }

    #[test]
    fn agent_records_round_trip() {
        for mut store in stores() {
            let record = sample_record();
            store.save_agent("agent:1", &record).expect("save");
            let loaded = store.load_agent("agent:1").expect("load").expect("present");
            assert_eq!(loaded, record);
        }
    }

    #[test]
    fn missing_agent_is_none() {
        for store in stores() {
            assert_eq!(store.load_agent("agent:absent").expect("load"), None);
        }
    }

    #[test]
    fn remove_then_load_is_none() {
        for mut store in stores() {
            store.save_agent("agent:1", &sample_record()).expect("save");
            store.remove_agent("agent:1").expect("remove");
            assert_eq!(store.load_agent("agent:1").expect("load"), None);
        }
    }

    #[test]
    fn agent_ids_filters_by_colony() {
        for mut store in stores() {
            store.save_agent("agent:1", &sample_record()).expect("save");
            let other = AgentRecord::new("colony:2", Role::Harvester);
            store.save_agent("agent:2", &other).expect("save");

            assert_eq!(
                store.agent_ids("colony:1").expect("ids"),
                vec!["agent:1".to_string()]
            );
            assert_eq!(
                store.agent_ids("colony:2").expect("ids"),
                vec!["agent:2".to_string()]
            );
        }
    }

    #[test]
    fn colony_record_round_trips_history() {
        for mut store in stores() {
            let mut record = ColonyRecord::new();
            record
                .turret_fullness_permille
                .insert("turret:1".to_string(), vec![500, 600, 700]);
            store.save_colony("colony:1", &record).expect("save");
            let loaded = store
                .load_colony("colony:1")
                .expect("load")
                .expect("present");
            assert_eq!(loaded, record);
        }
    }
}
