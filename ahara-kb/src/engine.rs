//! Nutrition engine service object
//!
//! Owns the current snapshot, the worker pool and both retrievers. Built
//! once and shared; every query reads one immutable snapshot.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ahara_core::catalog::BalancingFood;
use ahara_core::knowledge::KnowledgeEntry;
use ahara_core::model::{Dosha, FoodCategory, FoodRecord};
use ahara_core::policy::RetrievalPolicy;
use ahara_core::resilience::{retry_with_backoff, with_timeout, RetryPolicy};
use ahara_core::retriever::{CategoryRequest, CategoryRetrieval, CategoryRetriever};
use ahara_core::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::KnowledgeData;
use crate::embedder::{Embedder, HashingEmbedder};
use crate::error::KbError;
use crate::pool::WorkerPool;
use crate::semantic::{
    DietPlanContext, DietPlanRequest, KnowledgeHit, SemanticConfig, SemanticQuery,
    SemanticRetriever,
};
use crate::snapshot::{KnowledgeSnapshot, KnowledgeStats, SnapshotConfig, SnapshotHandle};
use crate::source::{SnapshotSource, SqliteSource, StaticSource};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Filter, scoring and category policy plus rule tables
    pub policy: RetrievalPolicy,
    /// Semantic retrieval tuning
    pub semantic: SemanticConfig,
    /// Snapshot build tuning
    pub snapshot: SnapshotConfig,
    /// Retry schedule for loading from the source
    pub retry: RetryPolicy,
    /// Concurrent CPU jobs; 0 means one per core
    pub worker_threads: usize,
    /// Embedding dimension
    pub embedding_dimension: usize,
    /// Bound on one semantic or keyword search
    pub search_timeout_ms: u64,
    /// Bound on one category's filter and score pass
    pub category_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: RetrievalPolicy::default(),
            semantic: SemanticConfig::default(),
            snapshot: SnapshotConfig::default(),
            retry: RetryPolicy::default(),
            worker_threads: 0,
            embedding_dimension: HashingEmbedder::DEFAULT_DIMENSION,
            search_timeout_ms: 2_000,
            category_timeout_ms: 2_000,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        self.semantic.validate()?;
        if self.embedding_dimension == 0 {
            return Err(Error::Config("embedding_dimension must be positive".to_string()));
        }
        if self.search_timeout_ms == 0 || self.category_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    fn category_timeout(&self) -> Duration {
        Duration::from_millis(self.category_timeout_ms)
    }
}

/// Outcome of a reload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadReport {
    /// Fingerprint of the snapshot now being served
    pub fingerprint: String,
    /// False when the source data was identical to the current snapshot
    pub changed: bool,
    pub foods: usize,
    pub entries: usize,
    pub skipped_rows: usize,
    pub loaded_at: DateTime<Utc>,
}

impl ReloadReport {
    fn of(snapshot: &KnowledgeSnapshot, changed: bool) -> Self {
        Self {
            fingerprint: snapshot.fingerprint().to_string(),
            changed,
            foods: snapshot.catalog().len(),
            entries: snapshot.entries().len(),
            skipped_rows: snapshot.skipped_rows().len(),
            loaded_at: snapshot.loaded_at(),
        }
    }
}

/// Category and semantic retrieval over a reloadable snapshot
pub struct NutritionEngine {
    config: EngineConfig,
    source: Arc<dyn SnapshotSource>,
    embedder: Arc<dyn Embedder>,
    handle: SnapshotHandle,
    pool: WorkerPool,
    categories: Arc<CategoryRetriever>,
    semantic: Arc<SemanticRetriever>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for NutritionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NutritionEngine")
            .field("source", &self.source.describe())
            .field("embedder", &self.embedder.name())
            .field("loaded", &self.handle.is_loaded())
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl NutritionEngine {
    /// Engine over a source; nothing is served until [`reload`](Self::reload)
    pub fn new(config: EngineConfig, source: Arc<dyn SnapshotSource>) -> Result<Self> {
        let embedder = Arc::new(HashingEmbedder::new(config.embedding_dimension));
        Self::with_embedder(config, source, embedder)
    }

    /// Engine with a custom embedder
    pub fn with_embedder(
        config: EngineConfig,
        source: Arc<dyn SnapshotSource>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = match config.worker_threads {
            0 => WorkerPool::default(),
            n => WorkerPool::new(n),
        };
        Ok(Self {
            categories: Arc::new(CategoryRetriever::new(config.policy.clone())),
            semantic: Arc::new(SemanticRetriever::new(config.semantic.clone())),
            config,
            source,
            embedder,
            handle: SnapshotHandle::new(),
            pool,
            reload_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Load the bulk SQLite database and serve it
    pub async fn open_sqlite(config: EngineConfig, path: impl AsRef<Path>) -> Result<Self> {
        let engine = Self::new(config, Arc::new(SqliteSource::new(path.as_ref())))?;
        engine.reload().await?;
        Ok(engine)
    }

    /// Serve an in-memory dataset
    pub async fn from_data(config: EngineConfig, data: KnowledgeData) -> Result<Self> {
        let engine = Self::new(config, Arc::new(StaticSource::new(data)))?;
        engine.reload().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Snapshot currently being served
    pub fn snapshot(&self) -> Result<Arc<KnowledgeSnapshot>> {
        Ok(self.handle.get()?)
    }

    /// Rebuild the snapshot from the source and swap it in
    ///
    /// Readers keep the snapshot they started with. Identical source data
    /// leaves the current snapshot in place.
    pub async fn reload(&self) -> Result<ReloadReport> {
        let _guard = self.reload_lock.lock().await;

        let source = self.source.clone();
        let loaded = retry_with_backoff(&self.config.retry, "load_snapshot", || {
            let source = source.clone();
            async move { source.load().await.map_err(Error::from) }
        })
        .await?;

        let current = self.handle.get().ok();
        let current_fingerprint = current.as_ref().map(|s| s.fingerprint().to_string());
        let embedder = self.embedder.clone();
        let snapshot_config = self.config.snapshot.clone();

        let built = self
            .pool
            .run("build_snapshot", move || {
                let fingerprint = loaded.data.fingerprint()?;
                if current_fingerprint.as_deref() == Some(fingerprint.as_str()) {
                    return Ok(None);
                }
                KnowledgeSnapshot::build_with_skipped(
                    loaded.data,
                    loaded.skipped,
                    embedder,
                    &snapshot_config,
                )
                .map(Some)
            })
            .await?;

        let report = match (built, current) {
            (Some(snapshot), _) => {
                let snapshot = Arc::new(snapshot);
                let report = ReloadReport::of(&snapshot, true);
                self.handle.swap(snapshot);
                report
            }
            (None, Some(current)) => ReloadReport::of(&current, false),
            (None, None) => {
                return Err(Error::Internal("snapshot build produced nothing".to_string()))
            }
        };

        info!(
            source = %self.source.describe(),
            fingerprint = %report.fingerprint,
            changed = report.changed,
            foods = report.foods,
            entries = report.entries,
            skipped = report.skipped_rows,
            "Snapshot reloaded"
        );
        Ok(report)
    }

    /// Run a job against the current snapshot on the pool, bounded by `timeout`
    async fn on_pool<T, F>(&self, operation: &'static str, timeout: Duration, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&KnowledgeSnapshot) -> crate::error::Result<T> + Send + 'static,
    {
        let snapshot = self.snapshot()?;
        let pool = self.pool.clone();
        with_timeout(timeout, operation, async move {
            pool.run(operation, move || job(&snapshot))
                .await
                .map_err(Error::from)
        })
        .await
    }

    /// Ranked, filtered foods per category
    ///
    /// Categories run concurrently on the pool; each has its own timeout.
    pub async fn foods_by_category(&self, request: &CategoryRequest) -> Result<CategoryRetrieval> {
        request.validate()?;
        let snapshot = self.snapshot()?;
        let ctx = Arc::new(self.categories.context(&request.profile));
        let top_k = self.categories.top_k_for(request);
        let timeout = self.config.category_timeout();

        let jobs = self.categories.categories_for(request).into_iter().map(|category| {
            let snapshot = snapshot.clone();
            let retriever = self.categories.clone();
            let ctx = ctx.clone();
            let pool = self.pool.clone();
            async move {
                let outcome = with_timeout(timeout, "category_filter", async move {
                    pool.run("category_filter", move || {
                        retriever
                            .retrieve_category(&*snapshot, category, &ctx, top_k)
                            .map_err(KbError::from)
                    })
                    .await
                    .map_err(Error::from)
                })
                .await?;
                Ok::<_, Error>((category, outcome))
            }
        });
        let outcomes = try_join_all(jobs).await?;

        let response = self.categories.assemble(&ctx, outcomes);
        info!(
            total_foods = response.total_foods,
            total_categories = response.total_categories,
            fingerprint = %snapshot.fingerprint(),
            "Category retrieval complete"
        );
        Ok(response)
    }

    /// Hybrid semantic search
    pub async fn semantic_search(&self, query: SemanticQuery) -> Result<Vec<KnowledgeHit>> {
        if query.query.trim().is_empty() || query.top_k <= 0 {
            debug!(top_k = query.top_k, "Empty semantic query");
            return Ok(Vec::new());
        }
        let retriever = self.semantic.clone();
        self.on_pool("semantic_search", self.config.search_timeout(), move |snap| {
            retriever.search(snap, &query)
        })
        .await
    }

    /// Keyword search, optionally within a corpus category
    pub async fn fulltext_search(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>> {
        let retriever = self.semantic.clone();
        let query = query.to_string();
        let category = category.map(str::to_string);
        self.on_pool("fulltext_search", self.config.search_timeout(), move |snap| {
            retriever.fulltext_search(snap, &query, category.as_deref(), limit)
        })
        .await
    }

    /// Semantic search phrased from conditions
    pub async fn search_by_conditions(
        &self,
        conditions: Vec<String>,
        top_k: i64,
    ) -> Result<Vec<KnowledgeHit>> {
        let retriever = self.semantic.clone();
        self.on_pool("search_by_conditions", self.config.search_timeout(), move |snap| {
            retriever.search_by_conditions(snap, &conditions, top_k)
        })
        .await
    }

    /// Knowledge context for diet-plan generation
    pub async fn retrieve_for_diet_plan(&self, request: DietPlanRequest) -> Result<DietPlanContext> {
        let retriever = self.semantic.clone();
        self.on_pool("retrieve_for_diet_plan", self.config.search_timeout(), move |snap| {
            retriever.retrieve_for_diet_plan(snap, &request)
        })
        .await
    }

    /// Exact disorder lookup
    pub fn get_by_disorder(&self, name: &str) -> Result<Option<KnowledgeEntry>> {
        Ok(self.snapshot()?.get_by_disorder(name).cloned())
    }

    /// Partial disorder-name lookup
    pub fn search_by_disorder_name(&self, term: &str, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        Ok(self
            .snapshot()?
            .search_by_disorder_name(term, limit)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Entries in one corpus category
    pub fn filter_by_category(&self, category: &str, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        Ok(self
            .snapshot()?
            .filter_by_category(category, limit)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Entries mentioning a dosha
    pub fn filter_by_dosha(&self, dosha: &str, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        Ok(self
            .snapshot()?
            .filter_by_dosha(dosha, limit)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Foods that pacify a dosha, strongest first
    pub fn dosha_balancing_foods(
        &self,
        dosha: Dosha,
        category: Option<FoodCategory>,
        top_k: usize,
    ) -> Result<Vec<BalancingFood>> {
        Ok(self
            .snapshot()?
            .catalog()
            .dosha_balancing_foods(dosha, category, top_k))
    }

    /// Foods supported for a disease and never marked `avoid` for it
    pub fn disease_safe_foods(
        &self,
        disease: &str,
        category: Option<FoodCategory>,
    ) -> Result<Vec<Arc<FoodRecord>>> {
        Ok(self.snapshot()?.catalog().disease_safe_foods(disease, category))
    }

    /// Statistics of the served snapshot
    pub fn stats(&self) -> Result<KnowledgeStats> {
        Ok(self.snapshot()?.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml_overrides() {
        let config = EngineConfig::from_yaml(
            r#"
worker_threads: 2
search_timeout_ms: 250
semantic:
  min_similarity: 0.2
  fulltext_fallback: false
retry:
  max_retries: 1
"#,
        )
        .unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.search_timeout_ms, 250);
        assert_eq!(config.category_timeout_ms, 2_000);
        assert!(!config.semantic.fulltext_fallback);
        assert_eq!(config.semantic.over_fetch_factor, 3);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.policy.category.top_k_per_category, 8);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_yaml("embedding_dimension: 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml("semantic:\n  over_fetch_factor: 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml("search_timeout_ms: [1]"),
            Err(Error::Yaml(_))
        ));
    }

    #[tokio::test]
    async fn test_unloaded_engine_is_unavailable() {
        let engine = NutritionEngine::new(
            EngineConfig::default(),
            Arc::new(StaticSource::new(KnowledgeData::default())),
        )
        .unwrap();
        let err = engine
            .semantic_search(SemanticQuery::new("diabetes"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(engine.stats().is_err());
    }
}
