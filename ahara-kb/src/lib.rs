//! # ahara-kb: knowledge store and hybrid semantic retrieval
//!
//! - **Knowledge store**: the bulk-loaded SQLite database ([`KnowledgeDb`])
//!   read into an immutable, fingerprinted [`KnowledgeSnapshot`]
//! - **Vector index**: deterministic feature-hashing embeddings searched by
//!   exact scan or HNSW ([`VectorIndex`])
//! - **Full-text index**: SQLite FTS5 with BM25 ranking ([`FullTextIndex`])
//! - **Hybrid retrieval**: vector similarity plus structured filters, keyword
//!   fallback ([`SemanticRetriever`])
//! - **Engine**: [`NutritionEngine`] ties snapshot reloads, a bounded worker
//!   pool and both retrievers together
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ahara_core::profile::ClientProfile;
//! use ahara_core::retriever::CategoryRequest;
//! use ahara_kb::{EngineConfig, NutritionEngine, SemanticQuery};
//!
//! # async fn run() -> ahara_core::Result<()> {
//! let engine = NutritionEngine::open_sqlite(EngineConfig::default(), "kb_data/ahara.db").await?;
//!
//! let hits = engine
//!     .semantic_search(SemanticQuery::new("diabetes diet").with_top_k(3))
//!     .await?;
//! for hit in &hits {
//!     println!("{} ({:.2})", hit.entry.disorder_name, hit.relevance_score);
//! }
//!
//! let foods = engine
//!     .foods_by_category(&CategoryRequest::new(ClientProfile::default()))
//!     .await?;
//! println!("{} foods", foods.total_foods);
//! # Ok(())
//! # }
//! ```

pub mod dataset;
pub mod embedder;
pub mod engine;
pub mod error;
pub mod fulltext;
pub mod pool;
pub mod semantic;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod vector_store;

pub use dataset::KnowledgeData;
pub use embedder::{Embedder, HashingEmbedder};
pub use engine::{EngineConfig, NutritionEngine, ReloadReport};
pub use error::{KbError, Result};
pub use fulltext::{FullTextIndex, TextHit};
pub use pool::WorkerPool;
pub use semantic::{
    DietPlanContext, DietPlanRequest, KnowledgeHit, MatchSource, SemanticConfig, SemanticQuery,
    SemanticRetriever,
};
pub use snapshot::{KnowledgeSnapshot, KnowledgeStats, SnapshotConfig, SnapshotHandle};
pub use source::{SnapshotSource, SourceData, SqliteSource, StaticSource};
pub use store::KnowledgeDb;
pub use vector_store::{Neighbor, VectorIndex, VectorIndexConfig};
