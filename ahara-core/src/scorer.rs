//! Composite scorer
//!
//! ```text
//! score = w_goal * goal + w_dosha * (dosha_term * scale) + w_health * health + w_disease * benefit
//! ```
//!
//! With the default policy the weights are 0.40 / 0.25 / 0.20 / 0.15 and the
//! dosha scale is 20. The result is clamped to `[0, 100]`.

use serde::{Deserialize, Serialize};

use crate::filter::FilterContext;
use crate::model::{DoshaEffectKind, FoodRecord, Relationship};
use crate::policy::ScoringPolicy;
use crate::profile::ClientProfile;

/// Every term of a composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Goal score used (after defaulting)
    pub goal_score: f64,
    /// Signed dosha intensity, in [-5, 5]
    pub dosha_term: f64,
    /// Health score used (after defaulting)
    pub health_score: f64,
    /// Capped disease benefit
    pub disease_benefit: f64,
    /// Weighted total before clamping
    pub raw_total: f64,
    /// Final score in [0, 100]
    pub total: f64,
}

/// Deterministic weighted scorer
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    policy: ScoringPolicy,
}

impl CompositeScorer {
    /// Scorer for a policy
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    /// Policy in use
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score in `[0, 100]`
    pub fn score(&self, food: &FoodRecord, ctx: &FilterContext) -> f64 {
        self.breakdown(food, ctx).total
    }

    /// Score with every term exposed
    pub fn breakdown(&self, food: &FoodRecord, ctx: &FilterContext) -> ScoreBreakdown {
        let p = &self.policy;

        let goal_score = ctx
            .profile
            .primary_goal
            .as_deref()
            .and_then(|goal| food.goal_score(goal))
            .map(f64::from)
            .unwrap_or(p.neutral_goal_score);

        let dosha_term = dosha_term(food, &ctx.profile);

        let health_score = food
            .item
            .health_score
            .map(f64::from)
            .unwrap_or(p.neutral_health_score);

        let disease_benefit = food
            .disease_relations
            .iter()
            .filter(|r| r.relationship == Relationship::Beneficial)
            .filter(|r| r.applies_to(&ctx.conditions))
            .map(|r| f64::from(r.severity) * p.benefit_per_severity)
            .sum::<f64>()
            .min(p.benefit_cap);

        let raw_total = p.goal_weight * goal_score
            + p.dosha_weight * (dosha_term * p.dosha_scale)
            + p.health_weight * health_score
            + p.disease_weight * disease_benefit;

        ScoreBreakdown {
            goal_score,
            dosha_term,
            health_score,
            disease_benefit,
            raw_total,
            total: raw_total.clamp(0.0, 100.0),
        }
    }
}

fn dosha_term(food: &FoodRecord, profile: &ClientProfile) -> f64 {
    let Some(dosha) = profile.dominant_dosha else {
        return 0.0;
    };
    match food.dosha_effect(dosha) {
        Some(e) if e.effect == DoshaEffectKind::Decrease => f64::from(e.intensity),
        Some(e) if e.effect == DoshaEffectKind::Increase => -f64::from(e.intensity),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::policy::RetrievalPolicy;
    use std::collections::BTreeMap;

    fn grain(id: FoodId, name: &str, goal: u8, effect: DoshaEffectKind, intensity: u8) -> FoodRecord {
        let mut record = FoodRecord::new(FoodItem {
            id,
            name: name.to_string(),
            category: FoodCategory::Grains,
            nutrition: Nutrition::default(),
            flags: FoodFlags::default(),
            exclusion_tags: vec![],
            contraindications: vec![],
            medical_tags: BTreeMap::new(),
            health_score: None,
            active: true,
        });
        record.goal_scores.insert("weight_loss".to_string(), goal);
        record.dosha_effects.push(DoshaEffect {
            food_id: id,
            dosha: Dosha::Kapha,
            effect,
            intensity,
        });
        record
    }

    fn kapha_ctx(conditions: &[&str]) -> FilterContext {
        let policy = RetrievalPolicy::default();
        let profile = ClientProfile {
            primary_goal: Some("weight_loss".to_string()),
            dominant_dosha: Some(Dosha::Kapha),
            conditions: conditions.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        };
        FilterContext::new(&profile, &policy.filter, &policy.rules)
    }

    #[test]
    fn test_oats_beat_white_rice() {
        let scorer = CompositeScorer::default();
        let ctx = kapha_ctx(&[]);
        let oats = scorer.breakdown(&grain(1, "Oats", 85, DoshaEffectKind::Decrease, 3), &ctx);
        let rice = scorer.breakdown(
            &grain(2, "White Rice", 45, DoshaEffectKind::Increase, 2),
            &ctx,
        );
        assert!((oats.total - 59.0).abs() < 1e-9);
        assert!((rice.total - 18.0).abs() < 1e-9);
        assert_eq!(rice.dosha_term, -2.0);
        assert!(oats.total > rice.total);
    }

    #[test]
    fn test_neutral_defaults() {
        let scorer = CompositeScorer::default();
        let mut food = grain(1, "Millet", 0, DoshaEffectKind::Neutral, 1);
        food.goal_scores.clear();
        let b = scorer.breakdown(&food, &kapha_ctx(&[]));
        assert_eq!(b.goal_score, 50.0);
        assert_eq!(b.health_score, 50.0);
        assert_eq!(b.dosha_term, 0.0);
        assert!((b.total - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_disease_benefit_capped() {
        let scorer = CompositeScorer::default();
        let mut food = grain(1, "Barley", 60, DoshaEffectKind::Decrease, 1);
        for condition in ["type_2_diabetes", "obesity"] {
            food.disease_relations.push(DiseaseRelation {
                food_id: 1,
                condition: condition.to_string(),
                relationship: Relationship::Beneficial,
                severity: 4,
                status: RelationStatus::Active,
            });
        }
        let b = scorer.breakdown(&food, &kapha_ctx(&["type_2_diabetes", "obesity"]));
        assert_eq!(b.disease_benefit, 100.0);

        let only_one = scorer.breakdown(&food, &kapha_ctx(&["obesity"]));
        assert_eq!(only_one.disease_benefit, 80.0);
    }

    #[test]
    fn test_total_clamped_at_zero() {
        let policy = ScoringPolicy {
            dosha_weight: 2.0,
            ..Default::default()
        };
        let scorer = CompositeScorer::new(policy);
        let food = grain(1, "Fried Rice", 0, DoshaEffectKind::Increase, 5);
        let b = scorer.breakdown(&food, &kapha_ctx(&[]));
        assert!(b.raw_total < 0.0);
        assert_eq!(b.total, 0.0);
    }
}
