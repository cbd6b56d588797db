use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Train/validation partition, fixed when the sample is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Val];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            other => Err(anyhow!("unknown split '{}'", other)),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted sample. Paths are relative to the dataset root.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetRecord {
    pub id: String,
    pub camera_id: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub split: Split,
    pub image_path: String,
    pub label_path: String,
    pub objects_count: u32,
    pub classes: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SplitCounts {
    pub train: u64,
    pub val: u64,
}

impl SplitCounts {
    pub fn total(&self) -> u64 {
        self.train + self.val
    }

    fn bump(&mut self, split: Split, by: u64) {
        match split {
            Split::Train => self.train += by,
            Split::Val => self.val += by,
        }
    }
}

/// Index of persisted samples.
///
/// Implementations reject a second record with an existing id.
pub trait Catalog: Send {
    fn insert(&mut self, record: &DatasetRecord) -> Result<()>;

    /// All records ordered by timestamp, then id.
    fn records(&self) -> Result<Vec<DatasetRecord>>;

    fn split_counts(&self) -> Result<SplitCounts>;
}

// ----------------------------------------------------------------------------
// SQLite
// ----------------------------------------------------------------------------

pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("open catalog {}", db_path.display()))?;
        let mut catalog = Self { conn };
        catalog.ensure_schema()?;
        Ok(catalog)
    }

    /// In-memory SQLite database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let mut catalog = Self {
            conn: Connection::open_in_memory()?,
        };
        catalog.ensure_schema()?;
        Ok(catalog)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS frames (
              id TEXT PRIMARY KEY,
              camera_id TEXT NOT NULL,
              timestamp REAL NOT NULL,
              split TEXT NOT NULL,
              image_path TEXT NOT NULL,
              label_path TEXT NOT NULL,
              objects_count INTEGER NOT NULL,
              classes TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_frames_camera ON frames(camera_id);
            CREATE INDEX IF NOT EXISTS idx_frames_split ON frames(split);
            "#,
        )?;
        Ok(())
    }
}

impl Catalog for SqliteCatalog {
    fn insert(&mut self, record: &DatasetRecord) -> Result<()> {
        let classes = serde_json::to_string(&record.classes)?;
        self.conn
            .execute(
                r#"
                INSERT INTO frames(id, camera_id, timestamp, split, image_path, label_path, objects_count, classes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.id,
                    record.camera_id,
                    record.timestamp,
                    record.split.as_str(),
                    record.image_path,
                    record.label_path,
                    record.objects_count as i64,
                    classes
                ],
            )
            .with_context(|| format!("insert catalog row {}", record.id))?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<DatasetRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, camera_id, timestamp, split, image_path, label_path, objects_count, classes \
             FROM frames ORDER BY timestamp ASC, id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let split: String = row.get(3)?;
            let objects_count: i64 = row.get(6)?;
            let classes: String = row.get(7)?;
            out.push(DatasetRecord {
                camera_id: row.get(1)?,
                timestamp: row.get(2)?,
                split: Split::parse(&split)?,
                image_path: row.get(4)?,
                label_path: row.get(5)?,
                objects_count: u32::try_from(objects_count)
                    .map_err(|_| anyhow!("corrupt catalog: objects_count for {}", id))?,
                classes: serde_json::from_str(&classes)
                    .with_context(|| format!("corrupt catalog: classes for {}", id))?,
                id,
            });
        }
        Ok(out)
    }

    fn split_counts(&self) -> Result<SplitCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT split, COUNT(*) FROM frames GROUP BY split")?;
        let mut rows = stmt.query([])?;
        let mut counts = SplitCounts::default();
        while let Some(row) = rows.next()? {
            let split: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.bump(Split::parse(&split)?, count as u64);
        }
        Ok(counts)
    }
}

// ----------------------------------------------------------------------------
// In memory
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    records: Vec<DatasetRecord>,
}

impl Catalog for InMemoryCatalog {
    fn insert(&mut self, record: &DatasetRecord) -> Result<()> {
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(anyhow!("duplicate catalog id {}", record.id));
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<DatasetRecord>> {
        let mut out = self.records.clone();
        out.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    fn split_counts(&self) -> Result<SplitCounts> {
        let mut counts = SplitCounts::default();
        for record in &self.records {
            counts.bump(record.split, 1);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, timestamp: f64, split: Split) -> DatasetRecord {
        DatasetRecord {
            id: id.to_string(),
            camera_id: "cam0".to_string(),
            timestamp,
            split,
            image_path: format!("images/{}/{}.jpg", split, id),
            label_path: format!("labels/{}/{}.txt", split, id),
            objects_count: 2,
            classes: vec!["helmet".to_string(), "person".to_string()],
        }
    }

    fn exercise(catalog: &mut dyn Catalog) {
        catalog.insert(&record("b", 2.0, Split::Val)).unwrap();
        catalog.insert(&record("a", 1.0, Split::Train)).unwrap();
        catalog.insert(&record("c", 2.0, Split::Train)).unwrap();
        assert!(catalog.insert(&record("a", 3.0, Split::Val)).is_err());

        let ids: Vec<String> = catalog.records().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            catalog.split_counts().unwrap(),
            SplitCounts { train: 2, val: 1 }
        );
        assert_eq!(catalog.records().unwrap()[0], record("a", 1.0, Split::Train));
    }

    #[test]
    fn sqlite_catalog_round_trips_records() {
        exercise(&mut SqliteCatalog::open_in_memory().unwrap());
    }

    #[test]
    fn in_memory_catalog_matches_sqlite() {
        exercise(&mut InMemoryCatalog::default());
    }

    #[test]
    fn sqlite_catalog_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let mut catalog = SqliteCatalog::open(&path).unwrap();
            catalog.insert(&record("x", 5.0, Split::Val)).unwrap();
        }
        let catalog = SqliteCatalog::open(&path).unwrap();
        assert_eq!(catalog.split_counts().unwrap().val, 1);
        assert_eq!(catalog.records().unwrap()[0].classes, vec!["helmet", "person"]);
    }
}
