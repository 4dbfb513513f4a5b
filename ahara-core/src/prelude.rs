//! Prelude: Re-exports common types for convenience
//!
//! # Usage
//! ```
//! use ahara_core::prelude::*;
//! ```

pub use crate::error::{Error, Result};

// Domain
pub use crate::knowledge::{EntryId, KnowledgeEntry};
pub use crate::model::{
    Allergen, AllergenSeverity, DiseaseRelation, Dosha, DoshaEffect, DoshaEffectKind,
    FoodCategory, FoodFlags, FoodId, FoodItem, FoodRecord, GoalScore, Nutrition, RelationStatus,
    Relationship,
};
pub use crate::profile::{ClientProfile, DietType, ProfileInput};

// Policy
pub use crate::policy::{CategoryPolicy, FilterPolicy, RetrievalPolicy, RuleTables, ScoringPolicy};

// Retrieval
pub use crate::catalog::{BalancingFood, FoodCatalog, FoodTables, InMemoryCatalog, SkippedRow};
pub use crate::filter::{
    ExclusionCheck, FilterContext, FilterEngine, FilterEngineBuilder, FilterTier, FilterVerdict,
    FiltersApplied,
};
pub use crate::retriever::{
    CategoryOutcome, CategoryRequest, CategoryRetrieval, CategoryRetriever, ScoredFood,
};
pub use crate::scorer::{CompositeScorer, ScoreBreakdown};

// Infra
pub use crate::resilience::{retry_with_backoff, with_timeout, RetryPolicy};
