//! Food domain model
//!
//! Named records for the food master table and its relational side-tables.
//! Every enumerated field is a closed set; free strings only appear where the
//! upstream data is genuinely open (condition names, goals, allergen tags).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::snake_case;

/// Food identifier from the master table
pub type FoodId = i64;

/// Fixed set of retrieval categories
///
/// Declaration order is the order categories appear in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FoodCategory {
    /// Cereals and grains
    #[serde(rename = "Grains", alias = "Cereal", alias = "Cereals")]
    Grains,
    /// Pulses and legumes
    #[serde(rename = "Pulses & Legumes", alias = "Pulse/Legume", alias = "Pulses")]
    Pulses,
    /// Vegetables
    #[serde(rename = "Vegetables", alias = "Vegetable")]
    Vegetables,
    /// Fruits
    #[serde(rename = "Fruits", alias = "Fruit")]
    Fruits,
    /// Nuts and seeds
    #[serde(rename = "Nuts & Seeds")]
    NutsSeeds,
    /// Milk and milk products
    #[serde(rename = "Dairy", alias = "Milk")]
    Dairy,
    /// Herbs and spices
    #[serde(rename = "Herbs & Spices")]
    HerbsSpices,
    /// Beverages
    #[serde(rename = "Beverages", alias = "Beverage")]
    Beverages,
    /// Cooking fats and oils
    #[serde(rename = "Fats & Oils", alias = "Fat & Oil")]
    FatsOils,
}

impl FoodCategory {
    /// Every category, in response order
    pub const ALL: [FoodCategory; 9] = [
        FoodCategory::Grains,
        FoodCategory::Pulses,
        FoodCategory::Vegetables,
        FoodCategory::Fruits,
        FoodCategory::NutsSeeds,
        FoodCategory::Dairy,
        FoodCategory::HerbsSpices,
        FoodCategory::Beverages,
        FoodCategory::FatsOils,
    ];

    /// Display name used in responses and in the knowledge database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grains => "Grains",
            Self::Pulses => "Pulses & Legumes",
            Self::Vegetables => "Vegetables",
            Self::Fruits => "Fruits",
            Self::NutsSeeds => "Nuts & Seeds",
            Self::Dairy => "Dairy",
            Self::HerbsSpices => "Herbs & Spices",
            Self::Beverages => "Beverages",
            Self::FatsOils => "Fats & Oils",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Grains => &["grains", "grain", "cereal", "cereals"],
            Self::Pulses => &["pulses & legumes", "pulse/legume", "pulses", "pulse", "legumes"],
            Self::Vegetables => &["vegetables", "vegetable"],
            Self::Fruits => &["fruits", "fruit"],
            Self::NutsSeeds => &["nuts & seeds", "nuts", "seeds"],
            Self::Dairy => &["dairy", "milk"],
            Self::HerbsSpices => &["herbs & spices", "herbs", "spices"],
            Self::Beverages => &["beverages", "beverage"],
            Self::FatsOils => &["fats & oils", "fat & oil", "oils", "fats"],
        }
    }
}

impl fmt::Display for FoodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FoodCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|c| c.aliases().contains(&needle.as_str()))
            .copied()
            .ok_or_else(|| Error::validation("category", format!("unknown food category '{}'", s)))
    }
}

/// Ayurvedic constitutional type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dosha {
    /// Air and space
    Vata,
    /// Fire and water
    Pitta,
    /// Earth and water
    Kapha,
}

impl Dosha {
    /// All doshas
    pub const ALL: [Dosha; 3] = [Dosha::Vata, Dosha::Pitta, Dosha::Kapha];

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vata => "Vata",
            Self::Pitta => "Pitta",
            Self::Kapha => "Kapha",
        }
    }
}

impl fmt::Display for Dosha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dosha {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "vata" => Ok(Self::Vata),
            "pitta" => Ok(Self::Pitta),
            "kapha" => Ok(Self::Kapha),
            other => Err(Error::validation("dosha", format!("unknown dosha '{}'", other))),
        }
    }
}

/// Direction a food pushes a dosha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoshaEffectKind {
    /// Aggravates the dosha
    Increase,
    /// Pacifies the dosha
    Decrease,
    /// No effect
    Neutral,
}

impl DoshaEffectKind {
    /// Arrow notation used in the food master sheet
    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Increase => "↑",
            Self::Decrease => "↓",
            Self::Neutral => "=",
        }
    }
}

impl FromStr for DoshaEffectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "increase" | "↑" => Ok(Self::Increase),
            "decrease" | "↓" => Ok(Self::Decrease),
            "neutral" | "=" => Ok(Self::Neutral),
            other => Err(Error::validation(
                "effect",
                format!("unknown dosha effect '{}'", other),
            )),
        }
    }
}

/// How a food relates to a medical condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    /// Helps manage the condition
    Beneficial,
    /// Must not be served
    Avoid,
    /// Allowed with care
    Caution,
    /// No known interaction
    Neutral,
}

impl FromStr for Relationship {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "beneficial" => Ok(Self::Beneficial),
            "avoid" => Ok(Self::Avoid),
            "caution" => Ok(Self::Caution),
            "neutral" => Ok(Self::Neutral),
            other => Err(Error::validation(
                "relationship",
                format!("unknown relationship '{}'", other),
            )),
        }
    }
}

/// Lifecycle status of a disease relation row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationStatus {
    /// In force
    #[default]
    Active,
    /// Retired by the curation team
    Inactive,
}

impl FromStr for RelationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" | "retired" => Ok(Self::Inactive),
            other => Err(Error::validation(
                "status",
                format!("unknown relation status '{}'", other),
            )),
        }
    }
}

/// Allergen severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllergenSeverity {
    /// Primary ingredient
    #[default]
    Major,
    /// Secondary ingredient
    Minor,
    /// Cross-contamination only
    Trace,
}

impl FromStr for AllergenSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "trace" => Ok(Self::Trace),
            other => Err(Error::validation(
                "severity",
                format!("unknown allergen severity '{}'", other),
            )),
        }
    }
}

/// Nutrition facts per 100 g
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    /// Energy
    pub calories_kcal: Option<f64>,
    /// Protein
    pub protein_g: Option<f64>,
    /// Carbohydrates
    pub carbs_g: Option<f64>,
    /// Fat
    pub fat_g: Option<f64>,
    /// Dietary fiber
    pub fiber_g: Option<f64>,
    /// Sodium
    pub sodium_mg: Option<f64>,
}

impl Nutrition {
    /// Share of calories that come from carbohydrate (4 kcal/g)
    ///
    /// `None` when energy is missing or zero.
    pub fn carb_calorie_fraction(&self) -> Option<f64> {
        let calories = self.calories_kcal.filter(|c| *c > 0.0)?;
        Some(self.carbs_g.unwrap_or(0.0) * 4.0 / calories)
    }

    /// Short macro line, e.g. `P:12.0g, F:7.0g, C:66.0g, E:389kcal`
    pub fn summary(&self) -> String {
        fn grams(v: Option<f64>) -> String {
            v.map(|g| format!("{:.1}g", g)).unwrap_or_else(|| "-".to_string())
        }
        let energy = self
            .calories_kcal
            .map(|k| format!("{:.0}kcal", k))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "P:{}, F:{}, C:{}, E:{}",
            grams(self.protein_g),
            grams(self.fat_g),
            grams(self.carbs_g),
            energy
        )
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("nutrition.calories_kcal", self.calories_kcal),
            ("nutrition.protein_g", self.protein_g),
            ("nutrition.carbs_g", self.carbs_g),
            ("nutrition.fat_g", self.fat_g),
            ("nutrition.fiber_g", self.fiber_g),
            ("nutrition.sodium_mg", self.sodium_mg),
        ];
        for (field, value) in fields {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::validation(field, format!("invalid value {}", v)));
                }
            }
        }
        Ok(())
    }
}

/// Processing and health flags from the food master sheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoodFlags {
    /// Deep or shallow fried
    pub fried: bool,
    /// Canned or tinned
    pub canned: bool,
    /// Industrially processed
    pub processed: bool,
    /// Meat, fish or egg
    pub non_veg: bool,
    /// Milk or milk derivative
    pub dairy: bool,
}

fn default_true() -> bool {
    true
}

/// A food from the master table. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    /// Identifier
    pub id: FoodId,
    /// Display name
    pub name: String,
    /// Retrieval category
    pub category: FoodCategory,
    /// Nutrition per 100 g
    #[serde(default)]
    pub nutrition: Nutrition,
    /// Processing flags
    #[serde(default)]
    pub flags: FoodFlags,
    /// Curated exclusion tags (`fried_foods`, `canned_foods`, ...)
    #[serde(default)]
    pub exclusion_tags: Vec<String>,
    /// Conditions this food is contraindicated for
    #[serde(default)]
    pub contraindications: Vec<String>,
    /// Medical safety tags, e.g. `diabetic_safe: false`
    #[serde(default)]
    pub medical_tags: BTreeMap<String, bool>,
    /// Precomputed generic healthiness in [0, 100]
    #[serde(default)]
    pub health_score: Option<u8>,
    /// Inactive foods are never retrieved
    #[serde(default = "default_true")]
    pub active: bool,
}

impl FoodItem {
    /// Lowercased exclusion tags, including those implied by the flags
    pub fn effective_exclusion_tags(&self) -> BTreeSet<String> {
        let mut tags: BTreeSet<String> = self
            .exclusion_tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if self.flags.fried {
            tags.insert("fried_foods".to_string());
        }
        if self.flags.canned {
            tags.insert("canned_foods".to_string());
        }
        if self.flags.processed {
            tags.insert("processed_foods".to_string());
        }
        tags
    }

    /// Check range invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", format!("food {} has no name", self.id)));
        }
        if let Some(score) = self.health_score {
            if score > 100 {
                return Err(Error::validation(
                    "health_score",
                    format!("food {} health score {} outside [0,100]", self.id, score),
                ));
            }
        }
        self.nutrition.validate()
    }
}

/// Effect of a food on one dosha
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoshaEffect {
    /// Food
    pub food_id: FoodId,
    /// Dosha affected
    pub dosha: Dosha,
    /// Direction
    pub effect: DoshaEffectKind,
    /// Strength in [1, 5]
    pub intensity: u8,
}

impl DoshaEffect {
    /// Check range invariants
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.intensity) {
            return Err(Error::validation(
                "intensity",
                format!("dosha intensity {} outside [1,5]", self.intensity),
            ));
        }
        Ok(())
    }
}

/// Relation between a food and a medical condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseRelation {
    /// Food
    pub food_id: FoodId,
    /// Condition identifier, e.g. `type_2_diabetes`
    pub condition: String,
    /// Kind of relation
    pub relationship: Relationship,
    /// Importance in [1, 5]
    pub severity: u8,
    /// Curation status
    #[serde(default)]
    pub status: RelationStatus,
}

impl DiseaseRelation {
    /// Check range invariants
    pub fn validate(&self) -> Result<()> {
        if self.condition.trim().is_empty() {
            return Err(Error::validation("condition", "empty condition name"));
        }
        if !(1..=5).contains(&self.severity) {
            return Err(Error::validation(
                "severity",
                format!("relation severity {} outside [1,5]", self.severity),
            ));
        }
        Ok(())
    }

    /// Condition as a snake_case id, e.g. `Type 2 Diabetes` -> `type_2_diabetes`
    pub fn condition_id(&self) -> String {
        snake_case(&self.condition)
    }

    /// Active row whose condition is in the given snake_case id set
    pub fn applies_to(&self, conditions: &BTreeSet<String>) -> bool {
        self.status == RelationStatus::Active && conditions.contains(&self.condition_id())
    }
}

/// Allergen tag on a food
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allergen {
    /// Food
    pub food_id: FoodId,
    /// Tag, e.g. `dairy`, `gluten`
    pub allergen: String,
    /// Severity
    #[serde(default)]
    pub severity: AllergenSeverity,
}

impl Allergen {
    /// Check invariants
    pub fn validate(&self) -> Result<()> {
        if self.allergen.trim().is_empty() {
            return Err(Error::validation("allergen", "empty allergen tag"));
        }
        Ok(())
    }
}

/// How well a food supports a health goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalScore {
    /// Food
    pub food_id: FoodId,
    /// Goal identifier, e.g. `weight_loss`
    pub goal: String,
    /// Fit in [0, 100]
    pub score: u8,
}

impl GoalScore {
    /// Check range invariants
    pub fn validate(&self) -> Result<()> {
        if self.goal.trim().is_empty() {
            return Err(Error::validation("goal", "empty goal name"));
        }
        if self.score > 100 {
            return Err(Error::validation(
                "score",
                format!("goal score {} outside [0,100]", self.score),
            ));
        }
        Ok(())
    }
}

/// A food together with every side-table row that references it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecord {
    /// Master row
    pub item: FoodItem,
    /// At most one per dosha
    #[serde(default)]
    pub dosha_effects: Vec<DoshaEffect>,
    /// Condition relations
    #[serde(default)]
    pub disease_relations: Vec<DiseaseRelation>,
    /// Allergen tags
    #[serde(default)]
    pub allergens: Vec<Allergen>,
    /// Goal (lowercase) to score
    #[serde(default)]
    pub goal_scores: BTreeMap<String, u8>,
}

impl FoodRecord {
    /// Record with no side-table rows
    pub fn new(item: FoodItem) -> Self {
        Self {
            item,
            dosha_effects: Vec::new(),
            disease_relations: Vec::new(),
            allergens: Vec::new(),
            goal_scores: BTreeMap::new(),
        }
    }

    /// Food id
    pub fn id(&self) -> FoodId {
        self.item.id
    }

    /// Effect row for one dosha
    pub fn dosha_effect(&self, dosha: Dosha) -> Option<&DoshaEffect> {
        self.dosha_effects.iter().find(|e| e.dosha == dosha)
    }

    /// Score for a goal, matched case-insensitively
    pub fn goal_score(&self, goal: &str) -> Option<u8> {
        self.goal_scores.get(&goal.trim().to_lowercase()).copied()
    }

    /// Readable dosha effects, e.g. `Kapha -> "↓ (intensity: 3)"`
    pub fn dosha_summary(&self) -> BTreeMap<Dosha, String> {
        self.dosha_effects
            .iter()
            .map(|e| {
                (
                    e.dosha,
                    format!("{} (intensity: {})", e.effect.arrow(), e.intensity),
                )
            })
            .collect()
    }

    /// Check every invariant of the aggregate
    pub fn validate(&self) -> Result<()> {
        self.item.validate()?;
        let mut seen = BTreeSet::new();
        for effect in &self.dosha_effects {
            effect.validate()?;
            if !seen.insert(effect.dosha) {
                return Err(Error::validation(
                    "dosha_effects",
                    format!("food {} has two {} rows", self.id(), effect.dosha),
                ));
            }
        }
        for relation in &self.disease_relations {
            relation.validate()?;
        }
        for allergen in &self.allergens {
            allergen.validate()?;
        }
        if let Some((goal, score)) = self.goal_scores.iter().find(|(_, s)| **s > 100) {
            return Err(Error::validation(
                "goal_scores",
                format!("food {} goal '{}' score {} outside [0,100]", self.id(), goal, score),
            ));
        }
        Ok(())
    }
}
