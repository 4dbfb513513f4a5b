//! Where snapshot data comes from

use std::path::PathBuf;

use ahara_core::catalog::SkippedRow;
use async_trait::async_trait;
use tracing::info;

use crate::dataset::KnowledgeData;
use crate::error::{KbError, Result};
use crate::store::KnowledgeDb;

/// Raw data for one load, with rows already rejected by the source
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub data: KnowledgeData,
    pub skipped: Vec<SkippedRow>,
}

/// Supplies the data a snapshot is built from
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Read a full dataset
    async fn load(&self) -> Result<SourceData>;

    /// Name for logs
    fn describe(&self) -> String;
}

/// The bulk-loaded SQLite knowledge database, opened read-only per load
#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
}

impl SqliteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for SqliteSource {
    async fn load(&self) -> Result<SourceData> {
        let path = self.path.clone();
        let (data, skipped) = tokio::task::spawn_blocking(move || {
            let db = KnowledgeDb::open_existing(&path)?;
            db.read_dataset()
        })
        .await
        .map_err(|e| KbError::Pool(format!("sqlite read failed: {}", e)))??;

        info!(
            path = %self.path.display(),
            foods = data.food.foods.len(),
            entries = data.knowledge.len(),
            skipped = skipped.len(),
            "Read knowledge database"
        );
        Ok(SourceData { data, skipped })
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

/// A dataset already in memory
#[derive(Debug, Clone)]
pub struct StaticSource {
    data: KnowledgeData,
}

impl StaticSource {
    pub fn new(data: KnowledgeData) -> Self {
        Self { data }
    }
}

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn load(&self) -> Result<SourceData> {
        Ok(SourceData {
            data: self.data.clone(),
            skipped: Vec::new(),
        })
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahara_core::knowledge::KnowledgeEntry;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sqlite_source_reads_import() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kb.db");
        let data = KnowledgeData {
            knowledge: vec![KnowledgeEntry {
                entry_id: 1,
                category: "Renal".to_string(),
                disorder_name: "Kidney Stones".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        KnowledgeDb::open(&path).unwrap().import(&data).unwrap();

        let loaded = SqliteSource::new(&path).load().await.unwrap();
        assert_eq!(loaded.data.knowledge.len(), 1);
        assert!(loaded.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let dir = tempdir().unwrap();
        let err = SqliteSource::new(dir.path().join("absent.db"))
            .load()
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
