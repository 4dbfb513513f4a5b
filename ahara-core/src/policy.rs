//! Retrieval policy and rule tables
//!
//! Every threshold, weight and keyword table the filter engine and scorer
//! consult lives here as data. Load a tuned policy from YAML with
//! [`RetrievalPolicy::from_yaml`] or start from [`RetrievalPolicy::default`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::FoodCategory;

/// Complete policy for one engine instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalPolicy {
    /// Exclusion thresholds and toggles
    pub filter: FilterPolicy,
    /// Composite score weights and defaults
    pub scoring: ScoringPolicy,
    /// Category iteration and truncation
    pub category: CategoryPolicy,
    /// Keyword and alias tables
    pub rules: RuleTables,
}

impl RetrievalPolicy {
    /// Parse and validate a YAML policy document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let policy: Self = serde_yaml_ng::from_str(text)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Read a YAML policy file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        self.scoring.validate()?;
        self.category.validate()
    }
}

/// Filter engine thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Exclude foods carrying a disallowed tag
    pub exclude_tagged_foods: bool,
    /// Tags that trigger Tier 1 exclusion
    pub disallowed_tags: Vec<String>,
    /// A `true` medical safety tag for one of the client's conditions lifts
    /// the tag exclusion
    pub medical_safety_override: bool,
    /// Tier 2: sodium per 100 g above this multiple of the daily limit
    pub sodium_limit_multiplier: f64,
    /// Tier 2: carbohydrate share of calories above this fraction
    pub max_carb_calorie_fraction: f64,
    /// Daily sodium limit when the profile gives none
    pub default_daily_sodium_mg: f64,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            exclude_tagged_foods: true,
            disallowed_tags: vec!["fried_foods".to_string(), "canned_foods".to_string()],
            medical_safety_override: true,
            sodium_limit_multiplier: 5.0,
            max_carb_calorie_fraction: 0.95,
            default_daily_sodium_mg: 2300.0,
        }
    }
}

impl FilterPolicy {
    fn validate(&self) -> Result<()> {
        if !(self.sodium_limit_multiplier.is_finite() && self.sodium_limit_multiplier > 0.0) {
            return Err(Error::Config(format!(
                "filter.sodium_limit_multiplier must be positive, got {}",
                self.sodium_limit_multiplier
            )));
        }
        if !(self.max_carb_calorie_fraction > 0.0 && self.max_carb_calorie_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "filter.max_carb_calorie_fraction must be in (0, 1], got {}",
                self.max_carb_calorie_fraction
            )));
        }
        if !(self.default_daily_sodium_mg.is_finite() && self.default_daily_sodium_mg > 0.0) {
            return Err(Error::Config(format!(
                "filter.default_daily_sodium_mg must be positive, got {}",
                self.default_daily_sodium_mg
            )));
        }
        Ok(())
    }
}

/// Composite score weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Weight of the goal score
    pub goal_weight: f64,
    /// Weight of the scaled dosha term
    pub dosha_weight: f64,
    /// Weight of the precomputed health score
    pub health_weight: f64,
    /// Weight of the disease benefit
    pub disease_weight: f64,
    /// Multiplier applied to the signed dosha intensity
    pub dosha_scale: f64,
    /// Goal score when the food has no row for the goal
    pub neutral_goal_score: f64,
    /// Health score when the food has none
    pub neutral_health_score: f64,
    /// Benefit added per severity point of a beneficial relation
    pub benefit_per_severity: f64,
    /// Upper bound on the disease benefit
    pub benefit_cap: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            goal_weight: 0.40,
            dosha_weight: 0.25,
            health_weight: 0.20,
            disease_weight: 0.15,
            dosha_scale: 20.0,
            neutral_goal_score: 50.0,
            neutral_health_score: 50.0,
            benefit_per_severity: 20.0,
            benefit_cap: 100.0,
        }
    }
}

impl ScoringPolicy {
    fn validate(&self) -> Result<()> {
        let weights = [
            ("goal_weight", self.goal_weight),
            ("dosha_weight", self.dosha_weight),
            ("health_weight", self.health_weight),
            ("disease_weight", self.disease_weight),
        ];
        for (name, w) in weights {
            if !(w.is_finite() && w >= 0.0) {
                return Err(Error::Config(format!(
                    "scoring.{} must be a non-negative number, got {}",
                    name, w
                )));
            }
        }
        for (name, v) in [
            ("neutral_goal_score", self.neutral_goal_score),
            ("neutral_health_score", self.neutral_health_score),
            ("benefit_cap", self.benefit_cap),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(Error::Config(format!(
                    "scoring.{} must be in [0, 100], got {}",
                    name, v
                )));
            }
        }
        if !(self.dosha_scale.is_finite() && self.benefit_per_severity.is_finite()) {
            return Err(Error::Config("scoring scales must be finite".to_string()));
        }
        Ok(())
    }
}

/// Category iteration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryPolicy {
    /// Categories processed, in order
    pub categories: Vec<FoodCategory>,
    /// Default number of foods kept per category
    pub top_k_per_category: usize,
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        Self {
            categories: FoodCategory::ALL.to_vec(),
            top_k_per_category: 8,
        }
    }
}

impl CategoryPolicy {
    fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(Error::Config("category.categories must not be empty".to_string()));
        }
        if self.top_k_per_category == 0 {
            return Err(Error::Config(
                "category.top_k_per_category must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Keyword and alias tables
///
/// All keys and values are matched lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTables {
    /// Condition to the medical safety tag that covers it
    pub condition_tags: BTreeMap<String, String>,
    /// Allergy token to the allergen tags it also covers
    pub allergen_aliases: BTreeMap<String, Vec<String>>,
    /// Name fragments that mark a food as non-vegetarian
    pub non_veg_keywords: Vec<String>,
    /// Name fragments and allergen tags that mark a food as an egg food
    pub egg_keywords: Vec<String>,
    /// Allergen tags a vegan diet excludes
    pub vegan_excluded_allergens: Vec<String>,
    /// Free-text goal phrase to canonical goal id
    pub goal_aliases: BTreeMap<String, String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RuleTables {
    fn default() -> Self {
        let condition_tags = [
            ("type_2_diabetes", "diabetic_safe"),
            ("diabetes", "diabetic_safe"),
            ("prediabetes", "prediabetic_safe"),
            ("hypertension", "hypertension_safe"),
            ("obesity", "obesity_safe"),
            ("ckd", "renal_safe_stage_1_2"),
            ("cardiovascular_disease", "cardiac_safe"),
            ("cardiac", "cardiac_safe"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let allergen_aliases = [
            ("dairy", &["milk", "lactose", "ghee", "butter", "cheese", "paneer", "curd"][..]),
            ("milk", &["dairy", "lactose"][..]),
            ("lactose", &["dairy", "milk"][..]),
            ("gluten", &["wheat", "barley", "rye"][..]),
            ("wheat", &["gluten"][..]),
            ("nuts", &["tree_nuts", "peanut", "almond", "cashew", "walnut"][..]),
            ("peanut", &["peanuts", "groundnut"][..]),
            ("shellfish", &["prawn", "shrimp", "crab", "lobster"][..]),
            ("soy", &["soya", "soybean"][..]),
            ("egg", &["eggs"][..]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), owned(v)))
        .collect();

        let goal_aliases = [
            ("lose weight", "weight_loss"),
            ("weight loss", "weight_loss"),
            ("fat loss", "weight_loss"),
            ("gain weight", "weight_gain"),
            ("weight gain", "weight_gain"),
            ("muscle", "muscle_gain"),
            ("build muscle", "muscle_gain"),
            ("diabetes", "diabetes_management"),
            ("blood sugar", "diabetes_management"),
            ("digestion", "digestive_health"),
            ("gut health", "digestive_health"),
            ("energy", "energy_boost"),
            ("heart", "heart_health"),
            ("immunity", "immunity_boost"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            condition_tags,
            allergen_aliases,
            non_veg_keywords: owned(&["chicken", "fish", "meat", "mutton", "egg"]),
            egg_keywords: owned(&["egg", "omelette"]),
            vegan_excluded_allergens: owned(&["dairy", "milk", "ghee", "honey"]),
            goal_aliases,
        }
    }
}

impl RuleTables {
    /// Medical safety tag for a condition; unmapped conditions use their own name
    pub fn safety_tag_for(&self, condition: &str) -> String {
        let key = condition.trim().to_lowercase();
        self.condition_tags
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("{}_safe", key))
    }

    /// Allergy token plus every alias it covers, lowercase
    pub fn expand_allergy(&self, token: &str) -> Vec<String> {
        let key = token.trim().to_lowercase();
        let mut out = vec![key.clone()];
        if let Some(aliases) = self.allergen_aliases.get(&key) {
            out.extend(aliases.iter().map(|a| a.to_lowercase()));
        }
        out
    }

    /// Whether a food name contains a non-vegetarian keyword
    pub fn name_is_non_veg(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.non_veg_keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
    }

    /// Whether a food name contains a non-vegetarian keyword other than an egg one
    pub fn name_is_meat(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.non_veg_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !self.egg_keywords.iter().any(|e| e.eq_ignore_ascii_case(k)))
            .any(|k| lower.contains(&k))
    }

    /// Whether a name or allergen tag mentions an egg keyword
    pub fn mentions_egg(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.egg_keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
    }

    /// Whether an allergen tag is excluded under a vegan diet
    pub fn allergen_is_animal(&self, tag: &str) -> bool {
        let lower = tag.trim().to_lowercase();
        self.vegan_excluded_allergens
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&lower))
    }

    /// Canonical goals mentioned in a free-text goal line, in order of mention
    ///
    /// Falls back to the snake-cased text when no alias matches.
    pub fn normalize_goals(&self, text: &str) -> Vec<String> {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<(usize, &String)> = self
            .goal_aliases
            .iter()
            .filter_map(|(phrase, goal)| lower.find(phrase.as_str()).map(|pos| (pos, goal)))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        let mut goals: Vec<String> = Vec::new();
        for (_, goal) in hits {
            if !goals.contains(goal) {
                goals.push(goal.clone());
            }
        }
        if goals.is_empty() {
            goals.push(snake_case(&lower));
        }
        goals
    }
}

/// Lowercase, collapse separators to single underscores
pub fn snake_case(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = RetrievalPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.category.categories.len(), 9);
        assert_eq!(policy.category.top_k_per_category, 8);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
filter:
  sodium_limit_multiplier: 3.0
scoring:
  neutral_goal_score: 40
category:
  top_k_per_category: 5
  categories: ["Grains", "Dairy"]
"#;
        let policy = RetrievalPolicy::from_yaml(yaml).unwrap();
        assert_eq!(policy.filter.sodium_limit_multiplier, 3.0);
        assert_eq!(policy.filter.max_carb_calorie_fraction, 0.95);
        assert_eq!(policy.scoring.neutral_goal_score, 40.0);
        assert_eq!(policy.scoring.goal_weight, 0.40);
        assert_eq!(
            policy.category.categories,
            vec![FoodCategory::Grains, FoodCategory::Dairy]
        );
        assert!(policy.rules.condition_tags.contains_key("ckd"));
    }

    #[test]
    fn test_invalid_yaml_policy_rejected() {
        let yaml = "category:\n  top_k_per_category: 0\n";
        assert!(matches!(
            RetrievalPolicy::from_yaml(yaml),
            Err(Error::Config(_))
        ));
        let yaml = "filter:\n  max_carb_calorie_fraction: 1.5\n";
        assert!(RetrievalPolicy::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_policy_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        let text = serde_yaml_ng::to_string(&RetrievalPolicy::default()).unwrap();
        std::fs::write(&path, text).unwrap();
        let loaded = RetrievalPolicy::from_file(&path).unwrap();
        assert_eq!(loaded, RetrievalPolicy::default());
    }

    #[test]
    fn test_safety_tag_lookup() {
        let rules = RuleTables::default();
        assert_eq!(rules.safety_tag_for("Type_2_Diabetes"), "diabetic_safe");
        assert_eq!(rules.safety_tag_for("ckd"), "renal_safe_stage_1_2");
        assert_eq!(rules.safety_tag_for("gout"), "gout_safe");
    }

    #[test]
    fn test_allergy_expansion() {
        let rules = RuleTables::default();
        let dairy = rules.expand_allergy("Dairy");
        assert!(dairy.contains(&"dairy".to_string()));
        assert!(dairy.contains(&"ghee".to_string()));
        assert_eq!(rules.expand_allergy("sesame"), vec!["sesame".to_string()]);
    }

    #[test]
    fn test_goal_normalization() {
        let rules = RuleTables::default();
        assert_eq!(
            rules.normalize_goals("Lose weight and more energy"),
            vec!["weight_loss".to_string(), "energy_boost".to_string()]
        );
        assert_eq!(
            rules.normalize_goals("Better Sleep"),
            vec!["better_sleep".to_string()]
        );
        assert!(rules.normalize_goals("  ").is_empty());
    }

    #[test]
    fn test_non_veg_keywords() {
        let rules = RuleTables::default();
        assert!(rules.name_is_non_veg("Chicken Curry"));
        assert!(rules.name_is_non_veg("Boiled Egg"));
        assert!(!rules.name_is_non_veg("Moong Dal"));
        assert!(rules.allergen_is_animal("Honey"));
    }
}
