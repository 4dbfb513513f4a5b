//! Raw bulk-load dataset
//!
//! Everything one load brings in, before validation and indexing.

use std::collections::BTreeSet;
use std::path::Path;

use ahara_core::catalog::{FoodTables, SkippedRow};
use ahara_core::knowledge::KnowledgeEntry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Food tables plus the disorder knowledge corpus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeData {
    /// Food master table and side-tables
    pub food: FoodTables,
    /// Disorder knowledge entries
    pub knowledge: Vec<KnowledgeEntry>,
}

impl KnowledgeData {
    /// Read a JSON export
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// SHA-256 over the canonical JSON form
    ///
    /// Identical source data always yields the same fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Drop invalid entries and repeated (category, disorder) keys, ordered by id
pub fn clean_knowledge(entries: Vec<KnowledgeEntry>) -> (Vec<KnowledgeEntry>, Vec<SkippedRow>) {
    let mut skipped = Vec::new();
    let mut seen_keys = BTreeSet::new();
    let mut seen_ids = BTreeSet::new();
    let mut kept = Vec::new();

    let mut entries = entries;
    entries.sort_by_key(|e| e.entry_id);

    for entry in entries {
        let key = format!("id={} disorder={}", entry.entry_id, entry.disorder_name);
        if let Err(e) = entry.validate() {
            skipped.push(SkippedRow::new("nutrition_knowledge", key, e.to_string()));
            continue;
        }
        if !seen_ids.insert(entry.entry_id) {
            skipped.push(SkippedRow::new("nutrition_knowledge", key, "duplicate id"));
            continue;
        }
        let unique = (
            entry.category.trim().to_lowercase(),
            entry.disorder_name.trim().to_lowercase(),
        );
        if !seen_keys.insert(unique) {
            skipped.push(SkippedRow::new(
                "nutrition_knowledge",
                key,
                "duplicate (category, disorder)",
            ));
            continue;
        }
        kept.push(entry);
    }
    (kept, skipped)
}
