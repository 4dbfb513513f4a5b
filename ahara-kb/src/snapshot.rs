//! Immutable knowledge snapshot and its atomic handle
//!
//! A snapshot is everything one bulk load produced: food records, the
//! knowledge corpus, its vectors and its keyword index. It is built off to
//! the side and published with a single pointer swap.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahara_core::catalog::{FoodCatalog, InMemoryCatalog, SkippedRow};
use ahara_core::knowledge::{EntryId, KnowledgeEntry};
use ahara_core::model::{FoodCategory, FoodRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{clean_knowledge, KnowledgeData};
use crate::embedder::{embed_entry, Embedder};
use crate::error::{KbError, Result};
use crate::fulltext::FullTextIndex;
use crate::vector_store::{VectorIndex, VectorIndexConfig};

/// How a snapshot is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Vector index tuning
    pub index: VectorIndexConfig,
    /// Extra weight of disorder name and category in entry vectors
    pub name_weight: f32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            index: VectorIndexConfig::default(),
            name_weight: 1.0,
        }
    }
}

/// Corpus statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    /// Knowledge entries
    pub total_entries: usize,
    /// Distinct corpus categories
    pub total_categories: usize,
    /// Corpus categories, sorted
    pub categories: Vec<String>,
    /// Entries per corpus category
    pub category_distribution: BTreeMap<String, usize>,
    /// Distinct dosha dominance values, sorted
    pub doshas: Vec<String>,
    /// Searchable vectors
    pub vector_embeddings: usize,
    /// Foods per food category
    pub foods_by_category: BTreeMap<FoodCategory, usize>,
    /// Rows dropped during load
    pub skipped_rows: usize,
    /// Source data fingerprint
    pub fingerprint: String,
    /// When the snapshot was built
    pub loaded_at: DateTime<Utc>,
}

/// One immutable, fingerprinted view of a bulk load
pub struct KnowledgeSnapshot {
    catalog: InMemoryCatalog,
    entries: Vec<KnowledgeEntry>,
    slots: BTreeMap<EntryId, usize>,
    vectors: VectorIndex,
    fulltext: FullTextIndex,
    embedder: Arc<dyn Embedder>,
    fingerprint: String,
    loaded_at: DateTime<Utc>,
    skipped: Vec<SkippedRow>,
}

impl std::fmt::Debug for KnowledgeSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeSnapshot")
            .field("foods", &self.catalog.len())
            .field("entries", &self.entries.len())
            .field("fingerprint", &self.fingerprint)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

impl KnowledgeSnapshot {
    /// Validate, index and embed a dataset
    ///
    /// CPU heavy; run it on a blocking thread.
    pub fn build(
        data: KnowledgeData,
        embedder: Arc<dyn Embedder>,
        config: &SnapshotConfig,
    ) -> Result<Self> {
        Self::build_with_skipped(data, Vec::new(), embedder, config)
    }

    /// Build, carrying rows already skipped while reading the source
    pub fn build_with_skipped(
        data: KnowledgeData,
        mut skipped: Vec<SkippedRow>,
        embedder: Arc<dyn Embedder>,
        config: &SnapshotConfig,
    ) -> Result<Self> {
        let fingerprint = data.fingerprint()?;

        // 1. Food records
        let (catalog, food_skipped) = InMemoryCatalog::from_tables(data.food);
        skipped.extend(food_skipped);

        // 2. Knowledge corpus
        let (entries, entry_skipped) = clean_knowledge(data.knowledge);
        for row in &entry_skipped {
            tracing::warn!(table = %row.table, key = %row.key, reason = %row.reason, "Skipped row");
        }
        skipped.extend(entry_skipped);

        // 3. Embed in parallel; collect keeps slot order
        let name_weight = config.name_weight;
        let vectors: Vec<Vec<f32>> = entries
            .par_iter()
            .map(|entry| embed_entry(embedder.as_ref(), entry, name_weight))
            .collect();
        let vectors = VectorIndex::build(vectors, embedder.dimension(), &config.index)?;

        // 4. Keyword index
        let fulltext = FullTextIndex::build(&entries)?;

        let slots = entries
            .iter()
            .enumerate()
            .map(|(slot, e)| (e.entry_id, slot))
            .collect();

        let snapshot = Self {
            catalog,
            entries,
            slots,
            vectors,
            fulltext,
            embedder,
            fingerprint,
            loaded_at: Utc::now(),
            skipped,
        };
        info!(
            foods = snapshot.catalog.len(),
            entries = snapshot.entries.len(),
            vectors = snapshot.vectors.len(),
            skipped = snapshot.skipped.len(),
            fingerprint = %snapshot.fingerprint,
            "Knowledge snapshot built"
        );
        Ok(snapshot)
    }

    /// Food catalog
    pub fn catalog(&self) -> &InMemoryCatalog {
        &self.catalog
    }

    /// Knowledge entries, ordered by id
    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    /// Entry at a vector slot
    pub fn entry_at(&self, slot: usize) -> Option<&KnowledgeEntry> {
        self.entries.get(slot)
    }

    /// Entry by id
    pub fn entry(&self, id: EntryId) -> Option<&KnowledgeEntry> {
        self.slot_of(id).and_then(|slot| self.entries.get(slot))
    }

    /// Vector slot of an entry
    pub fn slot_of(&self, id: EntryId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    /// Vector index
    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// Keyword index
    pub fn fulltext(&self) -> &FullTextIndex {
        &self.fulltext
    }

    /// Embedder the vectors were built with
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// SHA-256 of the source data
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Build time
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Rows dropped during load
    pub fn skipped_rows(&self) -> &[SkippedRow] {
        &self.skipped
    }

    /// Exact disorder-name lookup, case-insensitive
    pub fn get_by_disorder(&self, name: &str) -> Option<&KnowledgeEntry> {
        let needle = name.trim();
        self.entries
            .iter()
            .find(|e| e.disorder_name.trim().eq_ignore_ascii_case(needle))
    }

    /// Partial disorder-name lookup, case-insensitive, ordered by id
    pub fn search_by_disorder_name(&self, term: &str, limit: usize) -> Vec<&KnowledgeEntry> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| e.disorder_name.to_lowercase().contains(&needle))
            .take(limit)
            .collect()
    }

    /// Entries in a corpus category
    pub fn filter_by_category(&self, category: &str, limit: usize) -> Vec<&KnowledgeEntry> {
        let needle = category.trim();
        self.entries
            .iter()
            .filter(|e| e.category.trim().eq_ignore_ascii_case(needle))
            .take(limit)
            .collect()
    }

    /// Entries whose dosha dominance mentions a dosha
    pub fn filter_by_dosha(&self, dosha: &str, limit: usize) -> Vec<&KnowledgeEntry> {
        self.entries
            .iter()
            .filter(|e| e.mentions_dosha(dosha))
            .take(limit)
            .collect()
    }

    /// Corpus statistics
    pub fn stats(&self) -> KnowledgeStats {
        let mut category_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for e in &self.entries {
            *category_distribution.entry(e.category.clone()).or_default() += 1;
        }
        let mut doshas: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.dosha_dominance.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        doshas.sort();
        doshas.dedup();

        KnowledgeStats {
            total_entries: self.entries.len(),
            total_categories: category_distribution.len(),
            categories: category_distribution.keys().cloned().collect(),
            category_distribution,
            doshas,
            vector_embeddings: self.vectors.len(),
            foods_by_category: self.catalog.counts(),
            skipped_rows: self.skipped.len(),
            fingerprint: self.fingerprint.clone(),
            loaded_at: self.loaded_at,
        }
    }
}

impl FoodCatalog for KnowledgeSnapshot {
    fn foods_in_category(
        &self,
        category: FoodCategory,
    ) -> ahara_core::Result<Vec<Arc<FoodRecord>>> {
        self.catalog.foods_in_category(category)
    }
}

/// Shared pointer to the current snapshot
///
/// Readers clone the `Arc` and keep using it even if a reload swaps in a
/// newer one meanwhile.
#[derive(Clone, Default)]
pub struct SnapshotHandle {
    current: Arc<RwLock<Option<Arc<KnowledgeSnapshot>>>>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, or `NotLoaded`
    pub fn get(&self) -> Result<Arc<KnowledgeSnapshot>> {
        self.current.read().clone().ok_or(KbError::NotLoaded)
    }

    /// Whether a snapshot has been published
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Publish a snapshot, returning the previous one
    pub fn swap(&self, next: Arc<KnowledgeSnapshot>) -> Option<Arc<KnowledgeSnapshot>> {
        self.current.write().replace(next)
    }
}
