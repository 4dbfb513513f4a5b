//! Structured filter engine
//!
//! Hard exclusions evaluated before any scoring. Checks are grouped in three
//! tiers:
//!
//! - **Absolute**: medical safety. Every absolute check runs, then a
//!   failure ends evaluation before the later tiers.
//! - **Physiological**: extreme sodium or carbohydrate load.
//! - **Soft**: allergies and diet type.
//!
//! Any single failing check excludes the food. The verdict carries every
//! reason collected from the tiers that were evaluated.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::FoodRecord;
use crate::policy::{snake_case, FilterPolicy, RetrievalPolicy, RuleTables};
use crate::profile::ClientProfile;

/// Evaluation tier of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterTier {
    /// Tier 1, medical safety
    Absolute,
    /// Tier 2, extreme physiological values
    Physiological,
    /// Allergies and diet type
    Soft,
}

impl fmt::Display for FilterTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => f.write_str("tier1"),
            Self::Physiological => f.write_str("tier2"),
            Self::Soft => f.write_str("soft"),
        }
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Food may be served
    Passed,
    /// Food must be dropped
    Excluded {
        /// Human-readable reasons
        reasons: Vec<String>,
    },
}

impl CheckResult {
    /// Check if the food passed
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    fn from_reasons(reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Self::Passed
        } else {
            Self::Excluded { reasons }
        }
    }
}

/// Per-request view of the profile, precomputed once for every food
#[derive(Debug, Clone)]
pub struct FilterContext {
    /// Lowercased condition ids
    pub conditions: BTreeSet<String>,
    /// Allergy tokens expanded through the alias table
    pub allergy_tags: BTreeSet<String>,
    /// Effective daily sodium limit
    pub daily_sodium_limit_mg: f64,
    /// The profile itself
    pub profile: ClientProfile,
}

impl FilterContext {
    /// Build the context for one profile
    pub fn new(profile: &ClientProfile, policy: &FilterPolicy, rules: &RuleTables) -> Self {
        let allergy_tags = profile
            .allergy_set()
            .iter()
            .flat_map(|token| rules.expand_allergy(token))
            .collect();
        Self {
            conditions: profile.condition_set(),
            allergy_tags,
            daily_sodium_limit_mg: profile
                .daily_sodium_limit_mg
                .unwrap_or(policy.default_daily_sodium_mg),
            profile: profile.clone(),
        }
    }
}

/// A single exclusion rule
pub trait ExclusionCheck: Send + Sync {
    /// Stable identifier
    fn name(&self) -> &str;

    /// Tier the check belongs to
    fn tier(&self) -> FilterTier;

    /// Description for the audit trail; `None` when inactive for this profile
    fn describe(&self, ctx: &FilterContext) -> Option<String>;

    /// Evaluate one food
    fn check(&self, food: &FoodRecord, ctx: &FilterContext) -> CheckResult;
}

/// Disallowed exclusion tags, lifted by a positive medical safety tag
pub struct DisallowedTagCheck {
    tags: BTreeSet<String>,
    medical_override: bool,
    rules: Arc<RuleTables>,
}

impl DisallowedTagCheck {
    pub fn new(tags: &[String], medical_override: bool, rules: Arc<RuleTables>) -> Self {
        Self {
            tags: tags.iter().map(|t| t.trim().to_lowercase()).collect(),
            medical_override,
            rules,
        }
    }

    fn medically_cleared(&self, food: &FoodRecord, ctx: &FilterContext) -> bool {
        ctx.conditions.iter().any(|condition| {
            let tag = self.rules.safety_tag_for(condition);
            food.item.medical_tags.get(&tag) == Some(&true)
        })
    }
}

impl ExclusionCheck for DisallowedTagCheck {
    fn name(&self) -> &str {
        "disallowed_tags"
    }

    fn tier(&self) -> FilterTier {
        FilterTier::Absolute
    }

    fn describe(&self, _ctx: &FilterContext) -> Option<String> {
        if self.tags.is_empty() {
            return None;
        }
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        Some(format!("exclude tags: {}", tags.join(", ")))
    }

    fn check(&self, food: &FoodRecord, ctx: &FilterContext) -> CheckResult {
        let hits: Vec<String> = food
            .item
            .effective_exclusion_tags()
            .intersection(&self.tags)
            .cloned()
            .collect();
        if hits.is_empty() {
            return CheckResult::Passed;
        }
        if self.medical_override && self.medically_cleared(food, ctx) {
            debug!(food = %food.item.name, "Tag exclusion lifted by medical safety tag");
            return CheckResult::Passed;
        }
        CheckResult::from_reasons(
            hits.into_iter()
                .map(|t| format!("Excluded tag '{}'", t))
                .collect(),
        )
    }
}

/// Active `avoid` relations for a client condition
pub struct AvoidRelationCheck;

impl ExclusionCheck for AvoidRelationCheck {
    fn name(&self) -> &str {
        "avoid_relations"
    }

    fn tier(&self) -> FilterTier {
        FilterTier::Absolute
    }

    fn describe(&self, ctx: &FilterContext) -> Option<String> {
        (!ctx.conditions.is_empty()).then(|| {
            let c: Vec<&str> = ctx.conditions.iter().map(String::as_str).collect();
            format!("avoid foods for: {}", c.join(", "))
        })
    }

    fn check(&self, food: &FoodRecord, ctx: &FilterContext) -> CheckResult {
        let reasons = food
            .disease_relations
            .iter()
            .filter(|r| r.relationship == crate::model::Relationship::Avoid)
            .filter(|r| r.applies_to(&ctx.conditions))
            .map(|r| {
format!("Avoid for {} (severity {})", r.condition_id(), r.severity)
            })
            .collect();
        CheckResult::from_reasons(reasons)
    }
}

/// Medical safety tag explicitly `false` for a client condition
pub struct MedicalSafetyTagCheck {
    rules: Arc<RuleTables>,
}

impl MedicalSafetyTagCheck {
    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }
}

impl ExclusionCheck for MedicalSafetyTagCheck {
    fn name(&self) -> &str {
        "medical_safety_tags"
    }

    fn tier(&self) -> FilterTier {
        FilterTier::Absolute
    }

    fn describe(&self, ctx: &FilterContext) -> Option<String> {
        if ctx.conditions.is_empty() {
            return None;
        }
        let tags: BTreeSet<String> = ctx
            .conditions
            .iter()
            .map(|c| self.rules.safety_tag_for(c))
            .collect();
        let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
        Some(format!("require safety tags: {}", tags.join(", ")))
    }

    fn check(&self, food: &FoodRecord, ctx: &FilterContext) -> CheckResult {
        let reasons = ctx
            .conditions
            .iter()
            .filter_map(|condition| {
                let tag = self.rules.safety_tag_for(condition);
                (food.item.medical_tags.get(&tag) == Some(&false))
                    .then(|| format!("Not {} ({})", tag, condition))
            })
            .collect();
        CheckResult::from_reasons(reasons)
    }
}

/// Contraindication list intersects client conditions
pub struct ContraindicationCheck;

impl ExclusionCheck for ContraindicationCheck {
    fn name(&self) -> &str {
        "contraindications"
    }

    fn tier(&self) -> FilterTier {
        FilterTier::Absolute
    }

    fn describe(&self, ctx: &FilterContext) -> Option<String> {
        (!ctx.conditions.is_empty()).then(|| "contraindications".to_string())
    }

    fn check(&self, food: &FoodRecord, ctx: &FilterContext) -> CheckResult {
        let reasons = food
            .item
            .contraindications
            .iter()
            .map(|c| snake_case(c))
            .filter(|c| ctx.conditions.contains(c))
            .map(|c| format!("Contraindicated for {}", c))
            .collect();
        CheckResult::from_reasons(reasons)
    }
}

/// Sodium per 100 g above a multiple of the daily limit
pub struct SodiumLimitCheck {
    multiplier: f64,
}

impl SodiumLimitCheck {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl ExclusionCheck for SodiumLimitCheck {
    fn name(&self) -> &str {
        "sodium_limit"
    }

    fn tier(&self) -> FilterTier {
        FilterTier::Physiological
    }

    fn describe(&self, ctx: &FilterContext) -> Option<String> {
        Some(format!(
            "sodium <= {:.0}mg/100g",
            self.multiplier * ctx.daily_sodium_limit_mg
        ))
    }

    fn check(&self, food: &FoodRecord, ctx: &FilterContext) -> CheckResult {
        let limit = self.multiplier * ctx.daily_sodium_limit_mg;
        match food.item.nutrition.sodium_mg {
            Some(sodium) if sodium > limit => CheckResult::Excluded {
                reasons: vec![format!(
                    "Sodium {:.0}mg/100g exceeds {:.0}mg",
                    sodium, limit
                )],
            },
            _ => CheckResult::Passed,
        }
    }
}

/// Carbohydrate share of calories above a fraction
pub struct CarbFractionCheck {
    max_fraction: f64,
}

impl CarbFractionCheck {
    pub fn new(max_fraction: f64) -> Self {
        Self { max_fraction }
    }
}

impl ExclusionCheck for CarbFractionCheck {
    fn name(&self) -> &str {
        "carb_fraction"
    }

    fn tier(&self) -> FilterTier {
        FilterTier::Physiological
    }

    fn describe(&self, _ctx: &FilterContext) -> Option<String> {
        Some(format!("carb calories <= {:.0}%", self.max_fraction * 100.0))
    }

    fn check(&self, food: &FoodRecord, _ctx: &FilterContext) -> CheckResult {
        match food.item.nutrition.carb_calorie_fraction() {
            Some(fraction) if fraction > self.max_fraction => CheckResult::Excluded {
                reasons: vec![format!(
                    "Carbohydrate {:.1}% of calories exceeds {:.0}%",
                    fraction * 100.0,
                    self.max_fraction * 100.0
                )],
            },
            _ => CheckResult::Passed,
        }
    }
}

/// Allergen rows matching the client's allergies
pub struct AllergenCheck;

fn allergen_matches(tag: &str, allergies: &BTreeSet<String>) -> bool {
    let tag = tag.trim().to_lowercase();
    if allergies.contains(&tag) {
        return true;
    }
    // "tree_nuts" is covered by a "nuts" allergy
    tag.split(|c: char| c == '_' || c == ' ' || c == '-')
        .any(|part| allergies.contains(part))
}

impl ExclusionCheck for AllergenCheck {
    fn name(&self) -> &str {
        "allergens"
    }

    fn tier(&self) -> FilterTier {
        FilterTier::Soft
    }

    fn describe(&self, ctx: &FilterContext) -> Option<String> {
        let allergies = ctx.profile.allergy_set();
        (!allergies.is_empty()).then(|| {
            let a: Vec<&str> = allergies.iter().map(String::as_str).collect();
            format!("allergies: {}", a.join(", "))
        })
    }

    fn check(&self, food: &FoodRecord, ctx: &FilterContext) -> CheckResult {
        if ctx.allergy_tags.is_empty() {
            return CheckResult::Passed;
        }
        let reasons = food
            .allergens
            .iter()
            .filter(|a| allergen_matches(&a.allergen, &ctx.allergy_tags))
            .map(|a| format!("Contains allergen {}", a.allergen.trim().to_lowercase()))
            .collect();
        CheckResult::from_reasons(reasons)
    }
}

/// Diet type compatibility
pub struct DietTypeCheck {
    rules: Arc<RuleTables>,
}

impl DietTypeCheck {
    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }
}

impl ExclusionCheck for DietTypeCheck {
    fn name(&self) -> &str {
        "diet_type"
    }

    fn tier(&self) -> FilterTier {
        FilterTier::Soft
    }

    fn describe(&self, ctx: &FilterContext) -> Option<String> {
        ctx.profile
            .diet_type
            .is_restricted()
            .then(|| format!("diet: {}", ctx.profile.diet_type))
    }

    fn check(&self, food: &FoodRecord, ctx: &FilterContext) -> CheckResult {
        let diet = ctx.profile.diet_type;
        let mut reasons = Vec::new();
        if diet.excludes_non_veg()
            && (food.item.flags.non_veg || self.rules.name_is_non_veg(&food.item.name))
        {
            reasons.push(format!("Non-vegetarian food under {} diet", diet));
        }
        if diet.allows_only_eggs() {
            // a non_veg flag is fine when the food is an egg food
            let egg = self.rules.mentions_egg(&food.item.name)
                || food.allergens.iter().any(|a| self.rules.mentions_egg(&a.allergen));
            if self.rules.name_is_meat(&food.item.name) || (food.item.flags.non_veg && !egg) {
                reasons.push(format!("Meat or fish under {} diet", diet));
            }
        }
        if diet == crate::profile::DietType::Vegan {
            let animal = food.item.flags.dairy
                || food
                    .allergens
                    .iter()
                    .any(|a| self.rules.allergen_is_animal(&a.allergen));
            if animal {
                reasons.push("Animal product under vegan diet".to_string());
            }
        }
        CheckResult::from_reasons(reasons)
    }
}

/// Result of evaluating one food
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterVerdict {
    /// Food may be scored
    pub pass: bool,
    /// Every reason collected
    pub reasons: Vec<String>,
    /// Tier of the first failing check
    pub tier: Option<FilterTier>,
}

/// Audit description of the active filters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiltersApplied {
    /// Tier 1 filters
    pub tier1: Vec<String>,
    /// Tier 2 filters
    pub tier2: Vec<String>,
    /// Soft filters
    pub soft: Vec<String>,
}

impl FiltersApplied {
    /// Flattened `tier: description` map
    pub fn by_tier(&self) -> BTreeMap<FilterTier, Vec<String>> {
        BTreeMap::from([
            (FilterTier::Absolute, self.tier1.clone()),
            (FilterTier::Physiological, self.tier2.clone()),
            (FilterTier::Soft, self.soft.clone()),
        ])
    }
}

/// Tiered exclusion evaluator
#[derive(Clone)]
pub struct FilterEngine {
    checks: Vec<Arc<dyn ExclusionCheck>>,
}

impl fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.checks.iter().map(|c| c.name()).collect();
        f.debug_struct("FilterEngine").field("checks", &names).finish()
    }
}

impl FilterEngine {
    /// Engine with exactly these checks
    pub fn new(checks: Vec<Arc<dyn ExclusionCheck>>) -> Self {
        Self { checks }
    }

    /// Start an empty builder
    pub fn builder() -> FilterEngineBuilder {
        FilterEngineBuilder::new()
    }

    /// Standard check set for a policy
    pub fn from_policy(policy: &RetrievalPolicy) -> Self {
        let rules = Arc::new(policy.rules.clone());
        let mut builder = FilterEngineBuilder::new();
        if policy.filter.exclude_tagged_foods {
            builder = builder.disallowed_tags(
                &policy.filter.disallowed_tags,
                policy.filter.medical_safety_override,
                rules.clone(),
            );
        }
        builder
            .avoid_relations()
            .medical_safety_tags(rules.clone())
            .contraindications()
            .sodium_limit(policy.filter.sodium_limit_multiplier)
            .carb_fraction(policy.filter.max_carb_calorie_fraction)
            .allergens()
            .diet_type(rules)
            .build()
    }

    /// Names of the configured checks
    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Evaluate one food against a profile context
    ///
    /// Reasons from every failing Tier 1 check are reported; Tier 2 and the
    /// soft tier are skipped once Tier 1 fails.
    pub fn evaluate(&self, food: &FoodRecord, ctx: &FilterContext) -> FilterVerdict {
        let mut reasons = Vec::new();
        let mut first_tier = None;

        for tier in [FilterTier::Absolute, FilterTier::Physiological, FilterTier::Soft] {
            for check in self.checks.iter().filter(|c| c.tier() == tier) {
                if let CheckResult::Excluded { reasons: r } = check.check(food, ctx) {
                    first_tier.get_or_insert(tier);
                    reasons.extend(r);
                }
            }
            if tier == FilterTier::Absolute && first_tier.is_some() {
                break;
            }
        }

        let pass = reasons.is_empty();
        if !pass {
            debug!(
                food_id = food.id(),
                food = %food.item.name,
                tier = ?first_tier,
                reasons = ?reasons,
                "Food excluded"
            );
        }
        FilterVerdict {
            pass,
            reasons,
            tier: first_tier,
        }
    }

    /// Describe the filters active for a profile context
    pub fn filters_applied(&self, ctx: &FilterContext) -> FiltersApplied {
        let mut applied = FiltersApplied::default();
        for check in &self.checks {
            if let Some(description) = check.describe(ctx) {
                match check.tier() {
                    FilterTier::Absolute => applied.tier1.push(description),
                    FilterTier::Physiological => applied.tier2.push(description),
                    FilterTier::Soft => applied.soft.push(description),
                }
            }
        }
        applied
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::from_policy(&RetrievalPolicy::default())
    }
}

/// Builder for filter engines
pub struct FilterEngineBuilder {
    checks: Vec<Arc<dyn ExclusionCheck>>,
}

impl FilterEngineBuilder {
    /// Builder with no checks
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Add a custom check
    pub fn add_check(mut self, check: Arc<dyn ExclusionCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Exclude foods carrying a disallowed tag
    pub fn disallowed_tags(self, tags: &[String], medical_override: bool, rules: Arc<RuleTables>) -> Self {
        self.add_check(Arc::new(DisallowedTagCheck::new(tags, medical_override, rules)))
    }

    /// Exclude foods with an active `avoid` row for a client condition
    pub fn avoid_relations(self) -> Self {
        self.add_check(Arc::new(AvoidRelationCheck))
    }

    /// Exclude foods tagged unsafe for a client condition
    pub fn medical_safety_tags(self, rules: Arc<RuleTables>) -> Self {
        self.add_check(Arc::new(MedicalSafetyTagCheck::new(rules)))
    }

    /// Exclude foods contraindicated for a client condition
    pub fn contraindications(self) -> Self {
        self.add_check(Arc::new(ContraindicationCheck))
    }

    /// Exclude foods above `multiplier` times the daily sodium limit
    pub fn sodium_limit(self, multiplier: f64) -> Self {
        self.add_check(Arc::new(SodiumLimitCheck::new(multiplier)))
    }

    /// Exclude foods whose carbohydrate calorie share exceeds `max_fraction`
    pub fn carb_fraction(self, max_fraction: f64) -> Self {
        self.add_check(Arc::new(CarbFractionCheck::new(max_fraction)))
    }

    /// Exclude foods matching a client allergy
    pub fn allergens(self) -> Self {
        self.add_check(Arc::new(AllergenCheck))
    }

    /// Exclude foods the client's diet type rules out
    pub fn diet_type(self, rules: Arc<RuleTables>) -> Self {
        self.add_check(Arc::new(DietTypeCheck::new(rules)))
    }

    /// Finish the engine
    pub fn build(self) -> FilterEngine {
        FilterEngine::new(self.checks)
    }
}

impl Default for FilterEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::profile::DietType;

    fn food(id: FoodId, name: &str, category: FoodCategory) -> FoodRecord {
        FoodRecord::new(FoodItem {
            id,
            name: name.to_string(),
            category,
            nutrition: Nutrition {
                calories_kcal: Some(100.0),
                carbs_g: Some(10.0),
                sodium_mg: Some(50.0),
                ..Default::default()
            },
            flags: FoodFlags::default(),
            exclusion_tags: vec![],
            contraindications: vec![],
            medical_tags: BTreeMap::new(),
            health_score: None,
            active: true,
        })
    }

    fn ctx(profile: ClientProfile) -> FilterContext {
        let policy = RetrievalPolicy::default();
        FilterContext::new(&profile, &policy.filter, &policy.rules)
    }

    fn diabetic() -> ClientProfile {
        ClientProfile {
            conditions: vec!["type_2_diabetes".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_avoid_relation_excludes() {
        let mut jalebi = food(1, "Jalebi", FoodCategory::Grains);
        jalebi.disease_relations.push(DiseaseRelation {
            food_id: 1,
            condition: "Type_2_Diabetes".to_string(),
            relationship: Relationship::Avoid,
            severity: 5,
            status: RelationStatus::Active,
        });
        let verdict = FilterEngine::default().evaluate(&jalebi, &ctx(diabetic()));
        assert!(!verdict.pass);
        assert_eq!(verdict.tier, Some(FilterTier::Absolute));
        assert!(verdict.reasons[0].contains("type_2_diabetes"));
    }

    #[test]
    fn test_inactive_relation_ignored() {
        let mut item = food(1, "Jaggery", FoodCategory::Grains);
        item.disease_relations.push(DiseaseRelation {
            food_id: 1,
            condition: "type_2_diabetes".to_string(),
            relationship: Relationship::Avoid,
            severity: 3,
            status: RelationStatus::Inactive,
        });
        assert!(FilterEngine::default().evaluate(&item, &ctx(diabetic())).pass);
    }

    #[test]
    fn test_tier1_short_circuits_soft_reasons() {
        let mut item = food(1, "Fried Paneer", FoodCategory::Dairy);
        item.item.flags.fried = true;
        item.allergens.push(Allergen {
            food_id: 1,
            allergen: "dairy".to_string(),
            severity: AllergenSeverity::Major,
        });
        let profile = ClientProfile {
            allergies: vec!["dairy".to_string()],
            ..Default::default()
        };
        let verdict = FilterEngine::default().evaluate(&item, &ctx(profile));
        assert!(!verdict.pass);
        assert_eq!(verdict.reasons, vec!["Excluded tag 'fried_foods'".to_string()]);
    }

    #[test]
    fn test_tier1_reports_every_absolute_reason() {
        let mut item = food(1, "Sweet Pickle", FoodCategory::Vegetables);
        item.item.flags.fried = true;
        item.item.contraindications = vec!["Type 2 Diabetes".to_string()];
        item.item.nutrition.sodium_mg = Some(20_000.0);
        item.item
            .medical_tags
            .insert("diabetic_safe".to_string(), false);
        item.disease_relations.push(DiseaseRelation {
            food_id: 1,
            condition: "type_2_diabetes".to_string(),
            relationship: Relationship::Avoid,
            severity: 4,
            status: RelationStatus::Active,
        });
        let verdict = FilterEngine::default().evaluate(&item, &ctx(diabetic()));
        assert_eq!(verdict.tier, Some(FilterTier::Absolute));
        assert_eq!(
            verdict.reasons,
            vec![
                "Excluded tag 'fried_foods'".to_string(),
                "Avoid for type_2_diabetes (severity 4)".to_string(),
                "Not diabetic_safe (type_2_diabetes)".to_string(),
                "Contraindicated for type_2_diabetes".to_string(),
            ]
        );
    }

    #[test]
    fn test_tier2_and_soft_reasons_collected() {
        let mut item = food(1, "Salted Cheese", FoodCategory::Dairy);
        item.item.nutrition.sodium_mg = Some(20_000.0);
        item.allergens.push(Allergen {
            food_id: 1,
            allergen: "milk".to_string(),
            severity: AllergenSeverity::Major,
        });
        let profile = ClientProfile {
            allergies: vec!["dairy".to_string()],
            ..Default::default()
        };
        let verdict = FilterEngine::default().evaluate(&item, &ctx(profile));
        assert!(!verdict.pass);
        assert_eq!(verdict.tier, Some(FilterTier::Physiological));
        assert_eq!(verdict.reasons.len(), 2);
    }

    #[test]
    fn test_medical_override_lifts_tag_exclusion() {
        let mut item = food(1, "Canned Chickpeas", FoodCategory::Pulses);
        item.item.flags.canned = true;
        item.item
            .medical_tags
            .insert("diabetic_safe".to_string(), true);
        let engine = FilterEngine::default();
        assert!(engine.evaluate(&item, &ctx(diabetic())).pass);
        assert!(!engine.evaluate(&item, &ctx(ClientProfile::default())).pass);
    }

    #[test]
    fn test_unsafe_tag_excludes() {
        let mut item = food(1, "White Bread", FoodCategory::Grains);
        item.item
            .medical_tags
            .insert("diabetic_safe".to_string(), false);
        let verdict = FilterEngine::default().evaluate(&item, &ctx(diabetic()));
        assert!(!verdict.pass);
        assert!(verdict.reasons[0].starts_with("Not diabetic_safe"));
    }

    #[test]
    fn test_contraindication_excludes() {
        let mut item = food(1, "Licorice", FoodCategory::HerbsSpices);
        item.item.contraindications = vec!["Hypertension".to_string()];
        let profile = ClientProfile {
            conditions: vec!["hypertension".to_string()],
            ..Default::default()
        };
        assert!(!FilterEngine::default().evaluate(&item, &ctx(profile)).pass);
    }

    #[test]
    fn test_carb_fraction_limit() {
        let mut sugar = food(1, "Sugar", FoodCategory::Grains);
        sugar.item.nutrition.calories_kcal = Some(387.0);
        sugar.item.nutrition.carbs_g = Some(99.98);
        let verdict = FilterEngine::default().evaluate(&sugar, &ctx(ClientProfile::default()));
        assert_eq!(verdict.tier, Some(FilterTier::Physiological));
    }

    #[test]
    fn test_sodium_uses_profile_limit() {
        let mut pickle = food(1, "Lime Pickle", FoodCategory::Vegetables);
        pickle.item.nutrition.sodium_mg = Some(3000.0);
        let engine = FilterEngine::default();
        assert!(engine.evaluate(&pickle, &ctx(ClientProfile::default())).pass);
        let strict = ClientProfile {
            daily_sodium_limit_mg: Some(500.0),
            ..Default::default()
        };
        assert!(!engine.evaluate(&pickle, &ctx(strict)).pass);
    }

    #[test]
    fn test_diet_type_by_name_and_flag() {
        let engine = FilterEngine::default();
        let veg = ctx(ClientProfile {
            diet_type: DietType::Veg,
            ..Default::default()
        });
        let curry = food(1, "Chicken Curry", FoodCategory::Vegetables);
        assert!(!engine.evaluate(&curry, &veg).pass);

        let mut ghee = food(2, "Ghee", FoodCategory::FatsOils);
        ghee.allergens.push(Allergen {
            food_id: 2,
            allergen: "ghee".to_string(),
            severity: AllergenSeverity::Major,
        });
        assert!(engine.evaluate(&ghee, &veg).pass);
        let vegan = ctx(ClientProfile {
            diet_type: DietType::Vegan,
            ..Default::default()
        });
        assert!(!engine.evaluate(&ghee, &vegan).pass);
    }

    #[test]
    fn test_eggetarian_allows_eggs_not_meat() {
        let engine = FilterEngine::default();
        let egg_diet = ctx(ClientProfile {
            diet_type: DietType::Eggetarian,
            ..Default::default()
        });

        let mut omelette = food(1, "Masala Omelette", FoodCategory::Vegetables);
        omelette.item.flags.non_veg = true;
        let mut boiled = food(2, "Boiled Protein", FoodCategory::Pulses);
        boiled.item.flags.non_veg = true;
        boiled.allergens.push(Allergen {
            food_id: 2,
            allergen: "eggs".to_string(),
            severity: AllergenSeverity::Major,
        });
        let curry = food(3, "Fish Curry", FoodCategory::Vegetables);
        let mut mystery = food(4, "Keema Pav", FoodCategory::Grains);
        mystery.item.flags.non_veg = true;

        assert!(engine.evaluate(&omelette, &egg_diet).pass);
        assert!(engine.evaluate(&boiled, &egg_diet).pass);
        assert!(engine.evaluate(&food(5, "Egg Bhurji", FoodCategory::Vegetables), &egg_diet).pass);
        let verdict = engine.evaluate(&curry, &egg_diet);
        assert_eq!(verdict.reasons, vec!["Meat or fish under eggetarian diet".to_string()]);
        assert!(!engine.evaluate(&mystery, &egg_diet).pass);

        let veg = ctx(ClientProfile {
            diet_type: DietType::Veg,
            ..Default::default()
        });
        assert!(!engine.evaluate(&omelette, &veg).pass);

        let applied = engine.filters_applied(&egg_diet);
        assert_eq!(applied.soft, vec!["diet: eggetarian".to_string()]);
    }

    #[test]
    fn test_allergen_compound_tag() {
        let mut mix = food(1, "Trail Mix", FoodCategory::NutsSeeds);
        mix.allergens.push(Allergen {
            food_id: 1,
            allergen: "Tree_Nuts".to_string(),
            severity: AllergenSeverity::Trace,
        });
        let profile = ClientProfile {
            allergies: vec!["nuts".to_string()],
            ..Default::default()
        };
        assert!(!FilterEngine::default().evaluate(&mix, &ctx(profile)).pass);
    }

    #[test]
    fn test_filters_applied_reflects_profile() {
        let profile = ClientProfile {
            diet_type: DietType::Veg,
            allergies: vec!["dairy".to_string()],
            conditions: vec!["ckd".to_string()],
            ..Default::default()
        };
        let applied = FilterEngine::default().filters_applied(&ctx(profile));
        assert!(applied.tier1.iter().any(|d| d.contains("renal_safe_stage_1_2")));
        assert_eq!(applied.tier2.len(), 2);
        assert_eq!(applied.soft.len(), 2);

        let empty = FilterEngine::default().filters_applied(&ctx(ClientProfile::default()));
        assert!(empty.soft.is_empty());
        assert_eq!(empty.tier1.len(), 1);
    }

    #[test]
    fn test_builder_custom_checks() {
        let engine = FilterEngine::builder().allergens().sodium_limit(1.0).build();
        assert_eq!(engine.check_names(), vec!["allergens", "sodium_limit"]);
    }
}
