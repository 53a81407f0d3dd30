use crate::analyzer::Baseline;
use crate::model::StorageError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::collections::HashMap;
use tracing::debug;

/// Per-vehicle parameter baselines kept across sessions.
pub struct BaselineStore {
    conn: Connection,
}

impl BaselineStore {
    /// Opens the database file and creates the schema if needed.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS pid_baselines (
                vehicle_id TEXT NOT NULL,
                pid TEXT NOT NULL,
                mean REAL NOT NULL,
                std_dev REAL NOT NULL,
                min REAL NOT NULL,
                max REAL NOT NULL,
                median REAL NOT NULL,
                sample_count INTEGER NOT NULL,
                last_updated TEXT NOT NULL,
                PRIMARY KEY (vehicle_id, pid)
            );
            ",
        )?;
        debug!("Baseline schema ready");

        Ok(Self { conn })
    }

    /// Inserts or replaces the baselines of every listed parameter.
    pub fn save_baselines(
        &mut self,
        vehicle_id: &str,
        baselines: &HashMap<String, Baseline>,
    ) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO pid_baselines
                    (vehicle_id, pid, mean, std_dev, min, max, median, sample_count, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (pid, b) in baselines {
                stmt.execute(params![
                    vehicle_id,
                    pid,
                    b.mean,
                    b.std,
                    b.min,
                    b.max,
                    b.median,
                    b.sample_count as i64,
                    &now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_baselines(&self, vehicle_id: &str) -> Result<HashMap<String, Baseline>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT pid, mean, std_dev, min, max, median, sample_count
             FROM pid_baselines WHERE vehicle_id = ?1",
        )?;

        let rows = stmt.query_map(params![vehicle_id], |row| {
            let sample_count: i64 = row.get(6)?;
            Ok((
                row.get::<_, String>(0)?,
                Baseline {
                    mean: row.get(1)?,
                    std: row.get(2)?,
                    min: row.get(3)?,
                    max: row.get(4)?,
                    median: row.get(5)?,
                    sample_count: sample_count.max(0) as usize,
                },
            ))
        })?;

        let mut result = HashMap::new();
        for row in rows {
            let (pid, baseline) = row?;
            result.insert(pid, baseline);
        }
        Ok(result)
    }

    /// Most recent baseline update for the vehicle, if any.
    pub fn last_updated(&self, vehicle_id: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT MAX(last_updated) FROM pid_baselines WHERE vehicle_id = ?1",
        )?;
        let value: Option<String> = stmt.query_row(params![vehicle_id], |row| row.get(0))?;
        match value {
            Some(s) => Ok(Some(s.parse()?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(mean: f64, std: f64) -> Baseline {
        Baseline {
            mean,
            std,
            min: mean - 2.0 * std,
            max: mean + 2.0 * std,
            median: mean,
            sample_count: 40,
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut store = BaselineStore::open_in_memory().unwrap();
        assert!(store.load_baselines("car").unwrap().is_empty());
        assert_eq!(store.last_updated("car").unwrap(), None);

        let mut baselines = HashMap::new();
        baselines.insert("RPM".to_string(), baseline(800.0, 25.0));
        baselines.insert("MAF".to_string(), baseline(3.5, 0.4));
        store.save_baselines("car", &baselines).unwrap();

        let loaded = store.load_baselines("car").unwrap();
        assert_eq!(loaded, baselines);
        assert!(store.last_updated("car").unwrap().is_some());
        assert!(store.load_baselines("other").unwrap().is_empty());
    }

    #[test]
    fn schema_has_every_baseline_column() {
        let store = BaselineStore::open_in_memory().unwrap();
        let mut stmt = store.conn.prepare("PRAGMA table_info(pid_baselines)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            columns,
            vec![
                "vehicle_id",
                "pid",
                "mean",
                "std_dev",
                "min",
                "max",
                "median",
                "sample_count",
                "last_updated"
            ]
        );
    }

    #[test]
    fn saving_replaces_existing_rows() {
        let mut store = BaselineStore::open_in_memory().unwrap();
        let mut baselines = HashMap::new();
        baselines.insert("RPM".to_string(), baseline(800.0, 25.0));
        store.save_baselines("car", &baselines).unwrap();

        baselines.insert("RPM".to_string(), baseline(850.0, 30.0));
        store.save_baselines("car", &baselines).unwrap();

        let loaded = store.load_baselines("car").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["RPM"].mean, 850.0);
    }

    #[test]
    fn reopening_a_file_keeps_baselines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baselines.db");
        let path = path.to_str().unwrap();

        let mut baselines = HashMap::new();
        baselines.insert("COOLANT_TEMP".to_string(), baseline(90.0, 2.0));
        BaselineStore::new(path).unwrap().save_baselines("van", &baselines).unwrap();

        let reopened = BaselineStore::new(path).unwrap();
        assert_eq!(reopened.load_baselines("van").unwrap(), baselines);
    }
}
