//! Hybrid semantic retrieval over the knowledge corpus
//!
//! Vector similarity first, structured filters on top, and the FTS5
//! keyword index as a fallback when nothing clears the similarity floor.

use std::collections::{BTreeMap, BTreeSet};

use ahara_core::knowledge::{EntryId, KnowledgeEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embedder::{cosine_similarity, tokenize};
use crate::error::Result;
use crate::snapshot::KnowledgeSnapshot;

/// Words that carry no signal when matching a condition to a disorder
const CONDITION_STOPWORDS: &[&str] = &[
    "type", "disease", "disorder", "syndrome", "chronic", "stage", "and", "of", "the",
];

/// Semantic retrieval tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Neighbours fetched per requested result, before filtering
    pub over_fetch_factor: usize,
    /// Hits below this similarity are dropped
    pub min_similarity: f32,
    /// Fall back to keyword search when no semantic hit survives
    pub fulltext_fallback: bool,
    /// Conditions that get an extra disorder-name lookup in diet-plan retrieval
    pub diet_plan_name_conditions: usize,
    /// Name matches taken per condition in diet-plan retrieval
    pub diet_plan_name_matches: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            over_fetch_factor: 3,
            min_similarity: 0.05,
            fulltext_fallback: true,
            diet_plan_name_conditions: 2,
            diet_plan_name_matches: 2,
        }
    }
}

impl SemanticConfig {
    pub fn validate(&self) -> ahara_core::Result<()> {
        if self.over_fetch_factor == 0 {
            return Err(ahara_core::Error::Config(
                "semantic.over_fetch_factor must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(ahara_core::Error::Config(format!(
                "semantic.min_similarity must be within [0, 1], got {}",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

fn default_top_k() -> i64 {
    5
}

/// Free-text query with optional structured filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticQuery {
    pub query: String,
    /// Results wanted; zero or negative yields nothing
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    /// Corpus category, exact (case-insensitive)
    #[serde(default)]
    pub category: Option<String>,
    /// Dosha mentioned in the entry's dominance
    #[serde(default)]
    pub dosha: Option<String>,
    /// One pass per condition, merged by best similarity
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Disorder-name substring
    #[serde(default)]
    pub disorder_name: Option<String>,
}

impl SemanticQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: default_top_k(),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_dosha(mut self, dosha: impl Into<String>) -> Self {
        self.dosha = Some(dosha.into());
        self
    }

    pub fn with_conditions<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions = conditions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disorder_name(mut self, name: impl Into<String>) -> Self {
        self.disorder_name = Some(name.into());
        self
    }
}

/// Where a hit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Semantic,
    FullText,
    NameMatch,
}

/// A knowledge entry with its relevance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeHit {
    #[serde(flatten)]
    pub entry: KnowledgeEntry,
    /// Relevance in [0, 1]
    pub relevance_score: f32,
    pub match_source: MatchSource,
}

/// Diet-plan retrieval request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DietPlanRequest {
    pub query: String,
    #[serde(default)]
    pub health_conditions: Vec<String>,
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
    #[serde(default)]
    pub dosha: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

/// Filters echoed back with a diet-plan context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DietPlanMetadata {
    pub health_conditions: Vec<String>,
    pub dietary_preferences: Vec<String>,
    pub dosha: Option<String>,
    pub category: Option<String>,
}

/// Knowledge gathered for a diet plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietPlanContext {
    pub query: String,
    pub enhanced_query: String,
    pub total_results: usize,
    pub results: Vec<KnowledgeHit>,
    pub metadata: DietPlanMetadata,
}

/// Structured filters resolved once per pass
struct EntryFilter<'a> {
    category: Option<&'a str>,
    dosha: Option<&'a str>,
    disorder_name: Option<String>,
    condition_keywords: Vec<String>,
}

impl<'a> EntryFilter<'a> {
    fn new(query: &'a SemanticQuery, condition: Option<&str>) -> Self {
        Self {
            category: non_blank(query.category.as_deref()),
            dosha: non_blank(query.dosha.as_deref()),
            disorder_name: non_blank(query.disorder_name.as_deref()).map(str::to_lowercase),
            condition_keywords: condition.map(condition_keywords).unwrap_or_default(),
        }
    }

    fn matches(&self, entry: &KnowledgeEntry) -> bool {
        if let Some(category) = self.category {
            if !entry.category.trim().eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(dosha) = self.dosha {
            if !entry.mentions_dosha(dosha) {
                return false;
            }
        }
        if let Some(name) = &self.disorder_name {
            if !entry.disorder_name.to_lowercase().contains(name.as_str()) {
                return false;
            }
        }
        if !self.condition_keywords.is_empty() {
            let haystack = format!(
                "{} {}",
                entry.disorder_name.to_lowercase(),
                entry.definition_etiology.to_lowercase()
            );
            if !self.condition_keywords.iter().any(|k| haystack.contains(k.as_str())) {
                return false;
            }
        }
        true
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Significant words of a condition, e.g. `type_2_diabetes` -> `diabetes`
fn condition_keywords(condition: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokenize(condition)
        .into_iter()
        .filter(|t| !CONDITION_STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn sort_hits(hits: &mut [KnowledgeHit]) {
    hits.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.entry.entry_id.cmp(&b.entry.entry_id))
    });
}

/// Hybrid retriever; stateless apart from its tuning
#[derive(Debug, Clone, Default)]
pub struct SemanticRetriever {
    config: SemanticConfig,
}

impl SemanticRetriever {
    pub fn new(config: SemanticConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    /// Ranked hits for a free-text query
    pub fn search(&self, snap: &KnowledgeSnapshot, query: &SemanticQuery) -> Result<Vec<KnowledgeHit>> {
        let text = query.query.trim();
        if text.is_empty() || query.top_k <= 0 {
            return Ok(Vec::new());
        }
        let top_k = query.top_k as usize;

        let conditions: Vec<&str> = query
            .conditions
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();

        // Best similarity per entry across all passes
        let mut best: BTreeMap<EntryId, f32> = BTreeMap::new();
        if conditions.is_empty() {
            self.semantic_pass(snap, text, &EntryFilter::new(query, None), top_k, &mut best)?;
        } else {
            for condition in &conditions {
                let pass_text = format!("{} {}", text, condition);
                let filter = EntryFilter::new(query, Some(condition));
                self.semantic_pass(snap, &pass_text, &filter, top_k, &mut best)?;
            }
        }

        let mut hits: Vec<KnowledgeHit> = best
            .into_iter()
            .filter_map(|(id, similarity)| {
                snap.entry(id).map(|entry| KnowledgeHit {
                    entry: entry.clone(),
                    relevance_score: similarity,
                    match_source: MatchSource::Semantic,
                })
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(top_k);

        if hits.is_empty() && self.config.fulltext_fallback {
            let filter = EntryFilter::new(query, None);
            hits = self.keyword_hits(snap, text, &filter, top_k)?;
            debug!(query = text, hits = hits.len(), "Semantic search fell back to full text");
        }

        info!(
            query = text,
            top_k,
            conditions = conditions.len(),
            results = hits.len(),
            "Semantic search"
        );
        Ok(hits)
    }

    /// One embed + nearest-neighbour pass, folded into `best`
    fn semantic_pass(
        &self,
        snap: &KnowledgeSnapshot,
        text: &str,
        filter: &EntryFilter<'_>,
        top_k: usize,
        best: &mut BTreeMap<EntryId, f32>,
    ) -> Result<()> {
        let vector = snap.embedder().embed(text);
        let fetch = top_k
            .saturating_mul(self.config.over_fetch_factor.max(1))
            .min(snap.vectors().len());
        let neighbors = snap.vectors().search(&vector, fetch)?;

        let mut kept = 0usize;
        for n in neighbors {
            if n.similarity < self.config.min_similarity {
                continue;
            }
            let Some(entry) = snap.entry_at(n.slot) else {
                continue;
            };
            if !filter.matches(entry) {
                continue;
            }
            let slot = best.entry(entry.entry_id).or_insert(n.similarity);
            if n.similarity > *slot {
                *slot = n.similarity;
            }
            kept += 1;
        }
        debug!(text, fetched = fetch, kept, "Semantic pass");
        Ok(())
    }

    fn keyword_hits(
        &self,
        snap: &KnowledgeSnapshot,
        text: &str,
        filter: &EntryFilter<'_>,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>> {
        let fetch = if filter.category.is_some()
            || filter.dosha.is_some()
            || filter.disorder_name.is_some()
        {
            snap.entries().len()
        } else {
            limit
        };

        let mut seen = BTreeSet::new();
        let hits = snap
            .fulltext()
            .search(text, fetch)?
            .into_iter()
            .filter_map(|hit| snap.entry(hit.entry_id).map(|e| (e, hit.relevance)))
            .filter(|(entry, _)| filter.matches(entry) && seen.insert(entry.entry_id))
            .take(limit)
            .map(|(entry, relevance)| KnowledgeHit {
                entry: entry.clone(),
                relevance_score: relevance.clamp(0.0, 1.0),
                match_source: MatchSource::FullText,
            })
            .collect();
        Ok(hits)
    }

    /// Keyword search (BM25), optionally within one corpus category
    pub fn fulltext_search(
        &self,
        snap: &KnowledgeSnapshot,
        query: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>> {
        let filter = EntryFilter {
            category: non_blank(category),
            dosha: None,
            disorder_name: None,
            condition_keywords: Vec::new(),
        };
        self.keyword_hits(snap, query, &filter, limit)
    }

    /// Semantic search phrased from a list of conditions
    pub fn search_by_conditions(
        &self,
        snap: &KnowledgeSnapshot,
        conditions: &[String],
        top_k: i64,
    ) -> Result<Vec<KnowledgeHit>> {
        let named: Vec<&str> = conditions
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if named.is_empty() {
            return Ok(Vec::new());
        }
        let query = SemanticQuery::new(format!("Nutritional guidance for: {}", named.join(", ")))
            .with_top_k(top_k);
        self.search(snap, &query)
    }

    /// Semantic hits plus disorder-name matches for the leading conditions
    pub fn retrieve_for_diet_plan(
        &self,
        snap: &KnowledgeSnapshot,
        request: &DietPlanRequest,
    ) -> Result<DietPlanContext> {
        let mut parts = vec![request.query.trim().to_string()];
        if !request.health_conditions.is_empty() {
            parts.push(format!(
                "Health conditions: {}",
                request.health_conditions.join(", ")
            ));
        }
        if !request.dietary_preferences.is_empty() {
            parts.push(format!(
                "Dietary preferences: {}",
                request.dietary_preferences.join(", ")
            ));
        }
        if let Some(dosha) = non_blank(request.dosha.as_deref()) {
            parts.push(format!("Dosha: {}", dosha));
        }
        let enhanced_query = parts.join(" | ");

        let mut results = if request.query.trim().is_empty() {
            Vec::new()
        } else {
            let mut query = SemanticQuery::new(enhanced_query.clone()).with_top_k(request.top_k);
            query.category = request.category.clone();
            query.dosha = request.dosha.clone();
            self.search(snap, &query)?
        };

        if request.top_k > 0 {
            let query_vector = snap.embedder().embed(&enhanced_query);
            for condition in request
                .health_conditions
                .iter()
                .take(self.config.diet_plan_name_conditions)
            {
                for entry in snap.search_by_disorder_name(condition, self.config.diet_plan_name_matches) {
                    let relevance = snap
                        .slot_of(entry.entry_id)
                        .and_then(|slot| snap.vectors().vector(slot))
                        .map(|v| cosine_similarity(&query_vector, v).clamp(0.0, 1.0))
                        .unwrap_or(0.0);
                    results.push(KnowledgeHit {
                        entry: entry.clone(),
                        relevance_score: relevance,
                        match_source: MatchSource::NameMatch,
                    });
                }
            }
        }

        // First occurrence wins: semantic hits before name matches
        let mut seen = BTreeSet::new();
        results.retain(|hit| seen.insert(hit.entry.entry_id));
        results.truncate(request.top_k.max(0) as usize);

        info!(
            query = %request.query,
            conditions = request.health_conditions.len(),
            results = results.len(),
            "Diet plan retrieval"
        );

        Ok(DietPlanContext {
            query: request.query.clone(),
            enhanced_query,
            total_results: results.len(),
            results,
            metadata: DietPlanMetadata {
                health_conditions: request.health_conditions.clone(),
                dietary_preferences: request.dietary_preferences.clone(),
                dosha: request.dosha.clone(),
                category: request.category.clone(),
            },
        })
    }
}
