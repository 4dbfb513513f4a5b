//! Category retriever
//!
//! Per category: fetch, filter, score, sort, truncate. Categories never
//! borrow candidates from one another; an empty category stays empty.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::FoodCatalog;
use crate::error::{Error, Result};
use crate::filter::{FilterContext, FilterEngine, FiltersApplied};
use crate::model::{Dosha, FoodCategory, FoodId, FoodRecord};
use crate::policy::RetrievalPolicy;
use crate::profile::ClientProfile;
use crate::scorer::{CompositeScorer, ScoreBreakdown};

/// Category retrieval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRequest {
    /// Client profile
    pub profile: ClientProfile,
    /// Foods kept per category; the policy's value when absent
    #[serde(default)]
    pub top_k_per_category: Option<usize>,
    /// Categories to process; the policy's list when absent
    #[serde(default)]
    pub categories: Option<Vec<FoodCategory>>,
}

impl CategoryRequest {
    /// Request using the policy's top-K
    pub fn new(profile: ClientProfile) -> Self {
        Self {
            profile,
            top_k_per_category: None,
            categories: None,
        }
    }

    /// Override top-K
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k_per_category = Some(top_k);
        self
    }

    /// Restrict to a subset of categories
    pub fn with_categories(mut self, categories: Vec<FoodCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    /// Check request-level invariants
    pub fn validate(&self) -> Result<()> {
        if self.top_k_per_category == Some(0) {
            return Err(Error::validation(
                "top_k_per_category",
                "must be at least 1",
            ));
        }
        if matches!(&self.categories, Some(c) if c.is_empty()) {
            return Err(Error::validation("categories", "empty category list"));
        }
        self.profile.validate()
    }
}

/// One ranked food in a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFood {
    /// Food id
    pub food_id: FoodId,
    /// Food name
    pub name: String,
    /// Category
    pub category: FoodCategory,
    /// Macro line
    pub nutrition_summary: String,
    /// Readable dosha effects
    pub dosha_effects: BTreeMap<Dosha, String>,
    /// Composite score in [0, 100]
    pub score: f64,
    /// Terms of the score
    pub score_breakdown: ScoreBreakdown,
}

impl ScoredFood {
    fn new(record: &FoodRecord, breakdown: ScoreBreakdown) -> Self {
        Self {
            food_id: record.id(),
            name: record.item.name.clone(),
            category: record.item.category,
            nutrition_summary: record.item.nutrition.summary(),
            dosha_effects: record.dosha_summary(),
            score: breakdown.total,
            score_breakdown: breakdown,
        }
    }
}

/// Ranked result for a single category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryOutcome {
    /// Top-K survivors, best first
    pub foods: Vec<ScoredFood>,
    /// Foods dropped by the filter engine
    pub excluded: usize,
}

/// Full category retrieval response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRetrieval {
    /// Ranked foods for every processed category
    pub foods_by_category: BTreeMap<FoodCategory, Vec<ScoredFood>>,
    /// Filters active for the profile
    pub filters_applied: FiltersApplied,
    /// Foods across all categories
    pub total_foods: usize,
    /// Categories with at least one food
    pub total_categories: usize,
    /// Foods the filter engine dropped, per category
    pub excluded_by_category: BTreeMap<FoodCategory, usize>,
}

/// Fetch, filter, score and truncate per category
#[derive(Debug, Clone)]
pub struct CategoryRetriever {
    filter: FilterEngine,
    scorer: CompositeScorer,
    policy: Arc<RetrievalPolicy>,
}

impl CategoryRetriever {
    /// Retriever with the standard filter set for a policy
    pub fn new(policy: RetrievalPolicy) -> Self {
        Self {
            filter: FilterEngine::from_policy(&policy),
            scorer: CompositeScorer::new(policy.scoring.clone()),
            policy: Arc::new(policy),
        }
    }

    /// Retriever with a custom filter engine
    pub fn with_filter(policy: RetrievalPolicy, filter: FilterEngine) -> Self {
        Self {
            filter,
            scorer: CompositeScorer::new(policy.scoring.clone()),
            policy: Arc::new(policy),
        }
    }

    /// Policy in use
    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Filter engine in use
    pub fn filter_engine(&self) -> &FilterEngine {
        &self.filter
    }

    /// Scorer in use
    pub fn scorer(&self) -> &CompositeScorer {
        &self.scorer
    }

    /// Precompute the per-request filter context
    pub fn context(&self, profile: &ClientProfile) -> FilterContext {
        FilterContext::new(profile, &self.policy.filter, &self.policy.rules)
    }

    /// Foods kept per category for a request
    pub fn top_k_for(&self, request: &CategoryRequest) -> usize {
        request
            .top_k_per_category
            .unwrap_or(self.policy.category.top_k_per_category)
    }

    /// Categories a request covers, in response order
    pub fn categories_for(&self, request: &CategoryRequest) -> Vec<FoodCategory> {
        let mut categories = request
            .categories
            .clone()
            .unwrap_or_else(|| self.policy.category.categories.clone());
        categories.sort();
        categories.dedup();
        categories
    }

    /// Rank one category
    pub fn retrieve_category(
        &self,
        catalog: &dyn FoodCatalog,
        category: FoodCategory,
        ctx: &FilterContext,
        top_k: usize,
    ) -> Result<CategoryOutcome> {
        let candidates = catalog.foods_in_category(category)?;
        let mut excluded = 0;
        let mut ranked = Vec::new();

        for record in candidates.iter().filter(|r| r.item.active) {
            if let Err(e) = record.validate() {
                warn!(food_id = record.id(), error = %e, "Skipping invalid food record");
                continue;
            }
            if !self.filter.evaluate(record, ctx).pass {
                excluded += 1;
                continue;
            }
            ranked.push(ScoredFood::new(record, self.scorer.breakdown(record, ctx)));
        }

        rank(&mut ranked);
        ranked.truncate(top_k);

        debug!(
            category = %category,
            candidates = candidates.len(),
            excluded,
            kept = ranked.len(),
            "Category ranked"
        );
        Ok(CategoryOutcome {
            foods: ranked,
            excluded,
        })
    }

    /// Assemble per-category outcomes into a response
    pub fn assemble(
        &self,
        ctx: &FilterContext,
        outcomes: Vec<(FoodCategory, CategoryOutcome)>,
    ) -> CategoryRetrieval {
        let mut response = CategoryRetrieval {
            filters_applied: self.filter.filters_applied(ctx),
            ..Default::default()
        };
        for (category, outcome) in outcomes {
            response.total_foods += outcome.foods.len();
            if !outcome.foods.is_empty() {
                response.total_categories += 1;
            }
            response
                .excluded_by_category
                .insert(category, outcome.excluded);
            response.foods_by_category.insert(category, outcome.foods);
        }
        response
    }

    /// Run a full retrieval against a catalog
    pub fn retrieve(
        &self,
        catalog: &dyn FoodCatalog,
        request: &CategoryRequest,
    ) -> Result<CategoryRetrieval> {
        request.validate()?;
        let ctx = self.context(&request.profile);
        let top_k = self.top_k_for(request);
        let mut outcomes = Vec::new();
        for category in self.categories_for(request) {
            let outcome = self.retrieve_category(catalog, category, &ctx, top_k)?;
            outcomes.push((category, outcome));
        }
        let response = self.assemble(&ctx, outcomes);
        info!(
            total_foods = response.total_foods,
            total_categories = response.total_categories,
            "Category retrieval complete"
        );
        Ok(response)
    }
}

impl Default for CategoryRetriever {
    fn default() -> Self {
        Self::new(RetrievalPolicy::default())
    }
}

/// Score descending, food id ascending on ties
pub fn rank(foods: &mut [ScoredFood]) {
    foods.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.food_id.cmp(&b.food_id))
    });
}
