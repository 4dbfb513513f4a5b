//! Disorder knowledge corpus entries

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a knowledge entry
pub type EntryId = i64;

/// A structured disorder / nutrition-guidance record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeEntry {
    /// Row id
    pub entry_id: EntryId,
    /// Corpus category, e.g. "Metabolic & Endocrine"
    pub category: String,
    /// Disorder name, unique within its category
    pub disorder_name: String,
    /// Definition and etiology
    pub definition_etiology: String,
    /// Clinical nutrition goals
    pub clinical_goals: String,
    /// Macronutrient guidance
    pub mnt_macronutrients: String,
    /// Micronutrient guidance
    pub mnt_micronutrients: String,
    /// Fluid and electrolyte guidance
    pub mnt_fluids_electrolytes: String,
    /// Anything else the dietitian should know
    pub mnt_special_notes: String,
    /// Ayurvedic interpretation
    pub ayurvedic_view: String,
    /// Free text naming the dominant doshas, e.g. "Kapha-Pitta"
    pub dosha_dominance: String,
    /// Lifestyle and yoga recommendations
    pub lifestyle_yogic_guidance: String,
    /// Closing affirmation
    pub healing_affirmation: String,
}

impl KnowledgeEntry {
    /// Enriched text the vector index embeds
    ///
    /// Disorder name and category lead so that name-like queries land close.
    pub fn indexed_text(&self) -> String {
        let sections = [
            ("Disorder", &self.disorder_name),
            ("Category", &self.category),
            ("Definition", &self.definition_etiology),
            ("Clinical goals", &self.clinical_goals),
            ("Macronutrients", &self.mnt_macronutrients),
            ("Micronutrients", &self.mnt_micronutrients),
            ("Fluids", &self.mnt_fluids_electrolytes),
            ("Notes", &self.mnt_special_notes),
            ("Ayurveda", &self.ayurvedic_view),
            ("Dosha", &self.dosha_dominance),
            ("Lifestyle", &self.lifestyle_yogic_guidance),
        ];
        sections
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(label, v)| format!("{}: {}", label, v.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.disorder_name.trim().is_empty() {
            return Err(Error::validation(
                "disorder_name",
                format!("entry {} has no disorder name", self.entry_id),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(Error::validation(
                "category",
                format!("entry {} has no category", self.entry_id),
            ));
        }
        Ok(())
    }

    /// Case-insensitive check against the dosha dominance text
    pub fn mentions_dosha(&self, dosha: &str) -> bool {
        let needle = dosha.trim().to_lowercase();
        !needle.is_empty() && self.dosha_dominance.to_lowercase().contains(&needle)
    }
}
