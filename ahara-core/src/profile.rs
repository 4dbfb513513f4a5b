//! Client health profiles

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Dosha;
use crate::policy::{snake_case, RuleTables};

/// Dietary pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietType {
    /// Vegetarian; dairy allowed
    #[serde(alias = "vegetarian")]
    Veg,
    /// Vegetarian plus eggs
    #[serde(alias = "ovo_vegetarian")]
    Eggetarian,
    /// No animal products
    Vegan,
    /// No restriction
    #[default]
    #[serde(alias = "non-veg", alias = "nonveg", alias = "omnivore")]
    NonVeg,
}

impl DietType {
    /// Snake-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Veg => "veg",
            Self::Eggetarian => "eggetarian",
            Self::Vegan => "vegan",
            Self::NonVeg => "non_veg",
        }
    }

    /// Whether meat, fish and eggs are excluded
    pub fn excludes_non_veg(&self) -> bool {
        matches!(self, Self::Veg | Self::Vegan)
    }

    /// Whether meat and fish are excluded but eggs are allowed
    pub fn allows_only_eggs(&self) -> bool {
        matches!(self, Self::Eggetarian)
    }

    /// Whether any food is excluded on diet grounds
    pub fn is_restricted(&self) -> bool {
        !matches!(self, Self::NonVeg)
    }
}

impl fmt::Display for DietType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DietType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match snake_case(s).as_str() {
            "veg" | "vegetarian" => Ok(Self::Veg),
            "eggetarian" | "ovo_vegetarian" => Ok(Self::Eggetarian),
            "vegan" => Ok(Self::Vegan),
            "non_veg" | "nonveg" | "non_vegetarian" | "omnivore" => Ok(Self::NonVeg),
            other => Err(Error::validation(
                "diet_type",
                format!("unknown diet type '{}'", other),
            )),
        }
    }
}

/// A validated client profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProfile {
    /// Canonical goal id, e.g. `weight_loss`
    pub primary_goal: Option<String>,
    /// Dominant dosha, if assessed
    pub dominant_dosha: Option<Dosha>,
    /// Dietary pattern
    pub diet_type: DietType,
    /// Allergy tokens
    pub allergies: Vec<String>,
    /// Condition ids, e.g. `type_2_diabetes`
    pub conditions: Vec<String>,
    /// Daily sodium limit; the policy default applies when absent
    pub daily_sodium_limit_mg: Option<f64>,
}

impl ClientProfile {
    /// Condition ids in snake_case, however the caller spelled them
    pub fn condition_set(&self) -> BTreeSet<String> {
        self.conditions
            .iter()
            .map(|c| snake_case(c))
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Lowercased allergy tokens
    pub fn allergy_set(&self) -> BTreeSet<String> {
        self.allergies
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect()
    }

    /// Reject malformed profiles before any retrieval work
    pub fn validate(&self) -> Result<()> {
        if let Some(goal) = &self.primary_goal {
            if goal.trim().is_empty() {
                return Err(Error::validation("profile.primary_goal", "blank goal"));
            }
        }
        if self.allergies.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::validation("profile.allergies", "blank token"));
        }
        if self.conditions.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::validation("profile.conditions", "blank token"));
        }
        if let Some(limit) = self.daily_sodium_limit_mg {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(Error::validation(
                    "profile.daily_sodium_limit_mg",
                    format!("must be positive, got {}", limit),
                ));
            }
        }
        Ok(())
    }
}

/// Loosely formatted profile as upstream forms submit it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileInput {
    /// Free-text goals, e.g. "Lose weight, better digestion"
    pub goals: String,
    /// Dosha name
    pub dosha: Option<String>,
    /// Diet type name
    pub diet_type: Option<String>,
    /// Comma-separated allergies
    pub allergies: String,
    /// Comma-separated conditions
    pub conditions: String,
    /// Daily sodium limit
    pub daily_sodium_limit_mg: Option<f64>,
}

/// Tokens that mean "nothing to report" on intake forms
const NONE_TOKENS: &[&str] = &["none", "nil", "no", "n/a", "na", "-"];

fn split_list(text: &str) -> Vec<String> {
    text.split([',', ';', '\n'])
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && !NONE_TOKENS.contains(&t.as_str()))
        .collect()
}

impl ProfileInput {
    /// Normalize into a [`ClientProfile`] using the goal alias table
    pub fn normalize(&self, rules: &RuleTables) -> Result<ClientProfile> {
        let goals = rules.normalize_goals(&self.goals);
        let dominant_dosha = match self.dosha.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) => Some(name.parse::<Dosha>()?),
        };
        let diet_type = match self.diet_type.as_deref().map(str::trim) {
            None | Some("") => DietType::default(),
            Some(name) => name.parse::<DietType>()?,
        };

        let mut allergies = Vec::new();
        for token in split_list(&self.allergies) {
            if !allergies.contains(&token) {
                allergies.push(token);
            }
        }
        let mut conditions = Vec::new();
        for token in split_list(&self.conditions).iter().map(|c| snake_case(c)) {
            if !conditions.contains(&token) {
                conditions.push(token);
            }
        }

        let profile = ClientProfile {
            primary_goal: goals.into_iter().next(),
            dominant_dosha,
            diet_type,
            allergies,
            conditions,
            daily_sodium_limit_mg: self.daily_sodium_limit_mg,
        };
        profile.validate()?;
        Ok(profile)
    }
}
