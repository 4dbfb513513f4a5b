//! Food catalog: record assembly and category lookup

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{
    Allergen, DiseaseRelation, Dosha, DoshaEffect, DoshaEffectKind, FoodCategory, FoodId, FoodItem,
    FoodRecord, GoalScore, RelationStatus, Relationship,
};
use crate::policy::snake_case;

/// Most foods a disease-safe lookup returns
pub const DISEASE_SAFE_LIMIT: usize = 20;

/// Source of food records for the category retriever
pub trait FoodCatalog: Send + Sync {
    /// Every food in a category, ordered by id
    fn foods_in_category(&self, category: FoodCategory) -> Result<Vec<Arc<FoodRecord>>>;
}

/// A row dropped during load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// Source table
    pub table: String,
    /// Row key, e.g. `food=12 dosha=Kapha`
    pub key: String,
    /// Why it was dropped
    pub reason: String,
}

impl SkippedRow {
    pub fn new(table: &str, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SkippedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.table, self.key, self.reason)
    }
}

/// Raw rows from the food master table and its side-tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FoodTables {
    pub foods: Vec<FoodItem>,
    pub dosha_effects: Vec<DoshaEffect>,
    pub disease_relations: Vec<DiseaseRelation>,
    pub allergens: Vec<Allergen>,
    pub goal_scores: Vec<GoalScore>,
}

/// Join side-tables onto their foods
///
/// Invalid, orphaned and duplicate rows are skipped and reported; the rest
/// of the load proceeds.
pub fn assemble_records(tables: FoodTables) -> (Vec<FoodRecord>, Vec<SkippedRow>) {
    let mut skipped = Vec::new();
    let mut records: BTreeMap<FoodId, FoodRecord> = BTreeMap::new();

    for item in tables.foods {
        let key = format!("food={}", item.id);
        if let Err(e) = item.validate() {
            skipped.push(SkippedRow::new("food_items", key, e.to_string()));
            continue;
        }
        if records.contains_key(&item.id) {
            skipped.push(SkippedRow::new("food_items", key, "duplicate id"));
            continue;
        }
        records.insert(item.id, FoodRecord::new(item));
    }

    let mut seen_dosha = BTreeSet::new();
    for row in tables.dosha_effects {
        let key = format!("food={} dosha={}", row.food_id, row.dosha);
        if let Err(e) = row.validate() {
            skipped.push(SkippedRow::new("dosha_effects", key, e.to_string()));
            continue;
        }
        let Some(record) = records.get_mut(&row.food_id) else {
            skipped.push(SkippedRow::new("dosha_effects", key, "unknown food"));
            continue;
        };
        if !seen_dosha.insert((row.food_id, row.dosha)) {
            skipped.push(SkippedRow::new("dosha_effects", key, "duplicate (food, dosha)"));
            continue;
        }
        record.dosha_effects.push(row);
    }

    for mut row in tables.disease_relations {
        row.condition = snake_case(&row.condition);
        let key = format!("food={} condition={}", row.food_id, row.condition);
        if let Err(e) = row.validate() {
            skipped.push(SkippedRow::new("disease_relations", key, e.to_string()));
            continue;
        }
        match records.get_mut(&row.food_id) {
            Some(record) => record.disease_relations.push(row),
            None => skipped.push(SkippedRow::new("disease_relations", key, "unknown food")),
        }
    }

    for row in tables.allergens {
        let key = format!("food={} allergen={}", row.food_id, row.allergen);
        if let Err(e) = row.validate() {
            skipped.push(SkippedRow::new("allergens", key, e.to_string()));
            continue;
        }
        match records.get_mut(&row.food_id) {
            Some(record) => record.allergens.push(row),
            None => skipped.push(SkippedRow::new("allergens", key, "unknown food")),
        }
    }

    for row in tables.goal_scores {
        let key = format!("food={} goal={}", row.food_id, row.goal);
        if let Err(e) = row.validate() {
            skipped.push(SkippedRow::new("goal_scores", key, e.to_string()));
            continue;
        }
        let Some(record) = records.get_mut(&row.food_id) else {
            skipped.push(SkippedRow::new("goal_scores", key, "unknown food"));
            continue;
        };
        let goal = row.goal.trim().to_lowercase();
        if record.goal_scores.contains_key(&goal) {
            skipped.push(SkippedRow::new("goal_scores", key, "duplicate (food, goal)"));
            continue;
        }
        record.goal_scores.insert(goal, row.score);
    }

    for row in &skipped {
        warn!(table = %row.table, key = %row.key, reason = %row.reason, "Skipped row");
    }

    (records.into_values().collect(), skipped)
}

/// A food that pacifies a dosha
#[derive(Debug, Clone, PartialEq)]
pub struct BalancingFood {
    /// The food
    pub food: Arc<FoodRecord>,
    /// Strength of the `decrease` effect, 1 to 5
    pub intensity: u8,
}

/// Food records bucketed by category, held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    by_category: BTreeMap<FoodCategory, Vec<Arc<FoodRecord>>>,
    len: usize,
}

impl InMemoryCatalog {
    /// Bucket records by category, each bucket ordered by id
    pub fn new(records: Vec<FoodRecord>) -> Self {
        let len = records.len();
        let mut by_category: BTreeMap<FoodCategory, Vec<Arc<FoodRecord>>> = BTreeMap::new();
        for record in records {
            by_category
                .entry(record.item.category)
                .or_default()
                .push(Arc::new(record));
        }
        for bucket in by_category.values_mut() {
            bucket.sort_by_key(|r| r.id());
        }
        info!(foods = len, categories = by_category.len(), "Food catalog built");
        Self { by_category, len }
    }

    /// Assemble raw tables and bucket the result
    pub fn from_tables(tables: FoodTables) -> (Self, Vec<SkippedRow>) {
        let (records, skipped) = assemble_records(tables);
        (Self::new(records), skipped)
    }

    /// Total number of foods
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the catalog holds no foods
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Food counts per category
    pub fn counts(&self) -> BTreeMap<FoodCategory, usize> {
        self.by_category
            .iter()
            .map(|(c, foods)| (*c, foods.len()))
            .collect()
    }

    /// Look a food up by id
    pub fn get(&self, id: FoodId) -> Option<Arc<FoodRecord>> {
        self.by_category
            .values()
            .flat_map(|bucket| bucket.iter())
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Foods carrying an allergen tag, matched case-insensitively by substring
    pub fn foods_with_allergen(&self, allergen: &str) -> Vec<Arc<FoodRecord>> {
        let needle = allergen.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<Arc<FoodRecord>> = self
            .by_category
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|r| {
                r.allergens
                    .iter()
                    .any(|a| a.allergen.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by_key(|r| r.id());
        hits
    }

    fn active_foods(
        &self,
        category: Option<FoodCategory>,
    ) -> impl Iterator<Item = &Arc<FoodRecord>> + '_ {
        self.by_category
            .iter()
            .filter(move |(c, _)| category.map_or(true, |want| **c == want))
            .flat_map(|(_, bucket)| bucket.iter())
            .filter(|r| r.item.active)
    }

    /// Active foods that decrease a dosha, strongest effect first, then by id
    pub fn dosha_balancing_foods(
        &self,
        dosha: Dosha,
        category: Option<FoodCategory>,
        top_k: usize,
    ) -> Vec<BalancingFood> {
        let mut hits: Vec<BalancingFood> = self
            .active_foods(category)
            .filter_map(|record| {
                record
                    .dosha_effects
                    .iter()
                    .find(|e| e.dosha == dosha && e.effect == DoshaEffectKind::Decrease)
                    .map(|e| BalancingFood {
                        food: record.clone(),
                        intensity: e.intensity,
                    })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.intensity
                .cmp(&a.intensity)
                .then_with(|| a.food.id().cmp(&b.food.id()))
        });
        hits.truncate(top_k);
        hits
    }

    /// Active foods with a beneficial or neutral row for a disease and no
    /// active `avoid` row for it, ordered by id
    ///
    /// The disease matches any relation whose condition id contains it, so
    /// `diabetes` covers `type_2_diabetes`.
    pub fn disease_safe_foods(
        &self,
        disease: &str,
        category: Option<FoodCategory>,
    ) -> Vec<Arc<FoodRecord>> {
        let needle = snake_case(disease);
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<Arc<FoodRecord>> = self
            .active_foods(category)
            .filter(|record| {
                let matching = record
                    .disease_relations
                    .iter()
                    .filter(|r| r.status == RelationStatus::Active)
                    .filter(|r| r.condition_id().contains(&needle));
                let mut supported = false;
                for relation in matching {
                    match relation.relationship {
                        Relationship::Avoid => return false,
                        Relationship::Beneficial | Relationship::Neutral => supported = true,
                        Relationship::Caution => {}
                    }
                }
                supported
            })
            .cloned()
            .collect();
        hits.sort_by_key(|r| r.id());
        hits.truncate(DISEASE_SAFE_LIMIT);
        hits
    }
}

impl FoodCatalog for InMemoryCatalog {
    fn foods_in_category(&self, category: FoodCategory) -> Result<Vec<Arc<FoodRecord>>> {
        Ok(self.by_category.get(&category).cloned().unwrap_or_default())
    }
}
