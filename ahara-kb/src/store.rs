//! SQLite knowledge database
//!
//! Holds the bulk-loaded food tables and the disorder knowledge corpus.
//! Query-time code never touches it; a load reads everything once into a
//! [`KnowledgeData`] that becomes the next snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahara_core::catalog::{FoodTables, SkippedRow};
use ahara_core::knowledge::KnowledgeEntry;
use ahara_core::model::{
    Allergen, DiseaseRelation, DoshaEffect, FoodFlags, FoodItem, GoalScore, Nutrition,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, Row};
use tracing::{debug, info, warn};

use crate::dataset::KnowledgeData;
use crate::error::{KbError, Result};

/// SQLite-backed knowledge database
pub struct KnowledgeDb {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl KnowledgeDb {
    /// Create or open a database at the given path
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        info!("Opening knowledge database at: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an existing database without creating anything
    ///
    /// A missing file is reported as unavailable rather than created empty.
    pub fn open_existing(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| KbError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        })
    }

    /// In-memory database, for tests and one-shot loads
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Path on disk, if any
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        debug!("Initializing knowledge schema");
        let conn = self.conn.lock();

        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS food_items (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                calories_kcal REAL,
                protein_g REAL,
                carbs_g REAL,
                fat_g REAL,
                fiber_g REAL,
                sodium_mg REAL,
                fried INTEGER NOT NULL DEFAULT 0,
                canned INTEGER NOT NULL DEFAULT 0,
                processed INTEGER NOT NULL DEFAULT 0,
                non_veg INTEGER NOT NULL DEFAULT 0,
                dairy INTEGER NOT NULL DEFAULT 0,
                exclusion_tags TEXT NOT NULL DEFAULT '[]',
                contraindications TEXT NOT NULL DEFAULT '[]',
                medical_tags TEXT NOT NULL DEFAULT '{}',
                health_score INTEGER,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS food_dosha_effects (
                food_id INTEGER NOT NULL,
                dosha TEXT NOT NULL,
                effect TEXT NOT NULL,
                intensity INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS food_disease_relations (
                food_id INTEGER NOT NULL,
                condition TEXT NOT NULL,
                relationship TEXT NOT NULL,
                severity INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'active'
            );

            CREATE TABLE IF NOT EXISTS food_allergens (
                food_id INTEGER NOT NULL,
                allergen TEXT NOT NULL,
                severity TEXT NOT NULL DEFAULT 'major'
            );

            CREATE TABLE IF NOT EXISTS food_goal_scores (
                food_id INTEGER NOT NULL,
                goal TEXT NOT NULL,
                score INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nutrition_knowledge (
                id INTEGER PRIMARY KEY,
                category TEXT NOT NULL,
                disorder_name TEXT NOT NULL,
                definition_etiology TEXT NOT NULL DEFAULT '',
                clinical_goals TEXT NOT NULL DEFAULT '',
                mnt_macronutrients TEXT NOT NULL DEFAULT '',
                mnt_micronutrients TEXT NOT NULL DEFAULT '',
                mnt_fluids_electrolytes TEXT NOT NULL DEFAULT '',
                mnt_special_notes TEXT NOT NULL DEFAULT '',
                ayurvedic_view TEXT NOT NULL DEFAULT '',
                dosha_dominance TEXT NOT NULL DEFAULT '',
                lifestyle_yogic_guidance TEXT NOT NULL DEFAULT '',
                healing_affirmation TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_food_items_category ON food_items(category, active);
            CREATE INDEX IF NOT EXISTS idx_dosha_food ON food_dosha_effects(food_id);
            CREATE INDEX IF NOT EXISTS idx_relations_food ON food_disease_relations(food_id);
            CREATE INDEX IF NOT EXISTS idx_allergens_food ON food_allergens(food_id);
            CREATE INDEX IF NOT EXISTS idx_goals_food ON food_goal_scores(food_id);",
        )?;

        Ok(())
    }

    /// Replace every table with the given dataset in one transaction
    pub fn import(&self, data: &KnowledgeData) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute_batch(
            "DELETE FROM food_dosha_effects;
             DELETE FROM food_disease_relations;
             DELETE FROM food_allergens;
             DELETE FROM food_goal_scores;
             DELETE FROM food_items;
             DELETE FROM nutrition_knowledge;",
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO food_items (
                    id, name, category, calories_kcal, protein_g, carbs_g, fat_g, fiber_g,
                    sodium_mg, fried, canned, processed, non_veg, dairy, exclusion_tags,
                    contraindications, medical_tags, health_score, active
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            )?;
            for f in &data.food.foods {
                stmt.execute(params![
                    f.id,
                    f.name,
                    f.category.as_str(),
                    f.nutrition.calories_kcal,
                    f.nutrition.protein_g,
                    f.nutrition.carbs_g,
                    f.nutrition.fat_g,
                    f.nutrition.fiber_g,
                    f.nutrition.sodium_mg,
                    f.flags.fried,
                    f.flags.canned,
                    f.flags.processed,
                    f.flags.non_veg,
                    f.flags.dairy,
                    serde_json::to_string(&f.exclusion_tags)?,
                    serde_json::to_string(&f.contraindications)?,
                    serde_json::to_string(&f.medical_tags)?,
                    f.health_score,
                    f.active,
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO food_dosha_effects (food_id, dosha, effect, intensity)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for d in &data.food.dosha_effects {
                stmt.execute(params![
                    d.food_id,
                    d.dosha.as_str(),
                    serde_plain(&d.effect)?,
                    d.intensity
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO food_disease_relations (food_id, condition, relationship, severity, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in &data.food.disease_relations {
                stmt.execute(params![
                    r.food_id,
                    r.condition,
                    serde_plain(&r.relationship)?,
                    r.severity,
                    serde_plain(&r.status)?
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO food_allergens (food_id, allergen, severity) VALUES (?1, ?2, ?3)",
            )?;
            for a in &data.food.allergens {
                stmt.execute(params![a.food_id, a.allergen, serde_plain(&a.severity)?])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO food_goal_scores (food_id, goal, score) VALUES (?1, ?2, ?3)",
            )?;
            for g in &data.food.goal_scores {
                stmt.execute(params![g.food_id, g.goal, g.score])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO nutrition_knowledge (
                    id, category, disorder_name, definition_etiology, clinical_goals,
                    mnt_macronutrients, mnt_micronutrients, mnt_fluids_electrolytes,
                    mnt_special_notes, ayurvedic_view, dosha_dominance,
                    lifestyle_yogic_guidance, healing_affirmation
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for k in &data.knowledge {
                stmt.execute(params![
                    k.entry_id,
                    k.category,
                    k.disorder_name,
                    k.definition_etiology,
                    k.clinical_goals,
                    k.mnt_macronutrients,
                    k.mnt_micronutrients,
                    k.mnt_fluids_electrolytes,
                    k.mnt_special_notes,
                    k.ayurvedic_view,
                    k.dosha_dominance,
                    k.lifestyle_yogic_guidance,
                    k.healing_affirmation,
                ])?;
            }
        }

        tx.commit()?;
        info!(
            foods = data.food.foods.len(),
            knowledge = data.knowledge.len(),
            "Imported knowledge dataset"
        );
        Ok(())
    }

    /// Read every table
    ///
    /// Rows that fail to decode are skipped and reported, never fatal.
    pub fn read_dataset(&self) -> Result<(KnowledgeData, Vec<SkippedRow>)> {
        let conn = self.conn.lock();
        let mut skipped = Vec::new();

        let foods = read_rows(&conn, "food_items", FOOD_SQL, food_from_row, &mut skipped)?;
        let dosha_effects =
            read_rows(&conn, "food_dosha_effects", DOSHA_SQL, dosha_from_row, &mut skipped)?;
        let disease_relations = read_rows(
            &conn,
            "food_disease_relations",
            RELATION_SQL,
            relation_from_row,
            &mut skipped,
        )?;
        let allergens =
            read_rows(&conn, "food_allergens", ALLERGEN_SQL, allergen_from_row, &mut skipped)?;
        let goal_scores =
            read_rows(&conn, "food_goal_scores", GOAL_SQL, goal_from_row, &mut skipped)?;
        let knowledge = read_rows(
            &conn,
            "nutrition_knowledge",
            KNOWLEDGE_SQL,
            knowledge_from_row,
            &mut skipped,
        )?;

        for row in &skipped {
            warn!(table = %row.table, key = %row.key, reason = %row.reason, "Skipped row");
        }
        info!(
            foods = foods.len(),
            knowledge = knowledge.len(),
            skipped = skipped.len(),
            "Read knowledge dataset"
        );

        Ok((
            KnowledgeData {
                food: FoodTables {
                    foods,
                    dosha_effects,
                    disease_relations,
                    allergens,
                    goal_scores,
                },
                knowledge,
            },
            skipped,
        ))
    }
}

/// Lowercase serde name of a closed enum, e.g. `Relationship::Avoid` -> "avoid"
fn serde_plain<T: serde::Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(KbError::Custom(format!("expected string enum, got {}", other))),
    }
}

/// A decoded row or the reason it was rejected, keyed for diagnostics
type Decoded<T> = std::result::Result<T, (String, String)>;

fn read_rows<T>(
    conn: &Connection,
    table: &str,
    sql: &str,
    decode: fn(&Row<'_>) -> rusqlite::Result<Decoded<T>>,
    skipped: &mut Vec<SkippedRow>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], decode)?;

    let mut out = Vec::new();
    for (n, row) in rows.enumerate() {
        match row {
            Ok(Ok(value)) => out.push(value),
            Ok(Err((key, reason))) => skipped.push(SkippedRow::new(table, key, reason)),
            Err(e) => skipped.push(SkippedRow::new(table, format!("row={}", n), e.to_string())),
        }
    }
    Ok(out)
}

fn to_u8(value: i64, field: &str) -> std::result::Result<u8, String> {
    u8::try_from(value).map_err(|_| format!("{} {} out of range", field, value))
}

const FOOD_SQL: &str = "SELECT id, name, category, calories_kcal, protein_g, carbs_g, fat_g,
        fiber_g, sodium_mg, fried, canned, processed, non_veg, dairy, exclusion_tags,
        contraindications, medical_tags, health_score, active
     FROM food_items ORDER BY id";

fn food_from_row(row: &Row<'_>) -> rusqlite::Result<Decoded<FoodItem>> {
    let id: i64 = row.get(0)?;
    let category: String = row.get(2)?;
    let exclusion_tags: String = row.get(14)?;
    let contraindications: String = row.get(15)?;
    let medical_tags: String = row.get(16)?;
    let health_score: Option<i64> = row.get(17)?;

    let key = format!("food={}", id);
    let decoded = (|| -> std::result::Result<FoodItem, String> {
        Ok(FoodItem {
            id,
            name: row.get(1).map_err(|e| e.to_string())?,
            category: category.parse().map_err(|e: ahara_core::Error| e.to_string())?,
            nutrition: Nutrition {
                calories_kcal: row.get(3).map_err(|e| e.to_string())?,
                protein_g: row.get(4).map_err(|e| e.to_string())?,
                carbs_g: row.get(5).map_err(|e| e.to_string())?,
                fat_g: row.get(6).map_err(|e| e.to_string())?,
                fiber_g: row.get(7).map_err(|e| e.to_string())?,
                sodium_mg: row.get(8).map_err(|e| e.to_string())?,
            },
            flags: FoodFlags {
                fried: row.get(9).map_err(|e| e.to_string())?,
                canned: row.get(10).map_err(|e| e.to_string())?,
                processed: row.get(11).map_err(|e| e.to_string())?,
                non_veg: row.get(12).map_err(|e| e.to_string())?,
                dairy: row.get(13).map_err(|e| e.to_string())?,
            },
            exclusion_tags: serde_json::from_str(&exclusion_tags).map_err(|e| e.to_string())?,
            contraindications: serde_json::from_str(&contraindications)
                .map_err(|e| e.to_string())?,
            medical_tags: serde_json::from_str::<BTreeMap<String, bool>>(&medical_tags)
                .map_err(|e| e.to_string())?,
            health_score: health_score
                .map(|s| to_u8(s, "health_score"))
                .transpose()?,
            active: row.get(18).map_err(|e| e.to_string())?,
        })
    })();
    Ok(decoded.map_err(|reason| (key, reason)))
}

const DOSHA_SQL: &str =
    "SELECT food_id, dosha, effect, intensity FROM food_dosha_effects ORDER BY rowid";

fn dosha_from_row(row: &Row<'_>) -> rusqlite::Result<Decoded<DoshaEffect>> {
    let food_id: i64 = row.get(0)?;
    let dosha: String = row.get(1)?;
    let effect: String = row.get(2)?;
    let intensity: i64 = row.get(3)?;

    let key = format!("food={} dosha={}", food_id, dosha);
    let decoded = (|| -> std::result::Result<DoshaEffect, String> {
        Ok(DoshaEffect {
            food_id,
            dosha: dosha.parse().map_err(|e: ahara_core::Error| e.to_string())?,
            effect: effect.parse().map_err(|e: ahara_core::Error| e.to_string())?,
            intensity: to_u8(intensity, "intensity")?,
        })
    })();
    Ok(decoded.map_err(|reason| (key, reason)))
}

const RELATION_SQL: &str = "SELECT food_id, condition, relationship, severity, status
     FROM food_disease_relations ORDER BY rowid";

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<Decoded<DiseaseRelation>> {
    let food_id: i64 = row.get(0)?;
    let condition: String = row.get(1)?;
    let relationship: String = row.get(2)?;
    let severity: i64 = row.get(3)?;
    let status: String = row.get(4)?;

    let key = format!("food={} condition={}", food_id, condition);
    let decoded = (|| -> std::result::Result<DiseaseRelation, String> {
        Ok(DiseaseRelation {
            food_id,
            condition: condition.clone(),
            relationship: relationship
                .parse()
                .map_err(|e: ahara_core::Error| e.to_string())?,
            severity: to_u8(severity, "severity")?,
            status: status.parse().map_err(|e: ahara_core::Error| e.to_string())?,
        })
    })();
    Ok(decoded.map_err(|reason| (key, reason)))
}

const ALLERGEN_SQL: &str =
    "SELECT food_id, allergen, severity FROM food_allergens ORDER BY rowid";

fn allergen_from_row(row: &Row<'_>) -> rusqlite::Result<Decoded<Allergen>> {
    let food_id: i64 = row.get(0)?;
    let allergen: String = row.get(1)?;
    let severity: String = row.get(2)?;

    let key = format!("food={} allergen={}", food_id, allergen);
    Ok(severity
        .parse()
        .map(|severity| Allergen {
            food_id,
            allergen,
            severity,
        })
        .map_err(|e: ahara_core::Error| (key, e.to_string())))
}

const GOAL_SQL: &str = "SELECT food_id, goal, score FROM food_goal_scores ORDER BY rowid";

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<Decoded<GoalScore>> {
    let food_id: i64 = row.get(0)?;
    let goal: String = row.get(1)?;
    let score: i64 = row.get(2)?;

    let key = format!("food={} goal={}", food_id, goal);
    Ok(to_u8(score, "score")
        .map(|score| GoalScore {
            food_id,
            goal,
            score,
        })
        .map_err(|reason| (key, reason)))
}

const KNOWLEDGE_SQL: &str = "SELECT id, category, disorder_name, definition_etiology,
        clinical_goals, mnt_macronutrients, mnt_micronutrients, mnt_fluids_electrolytes,
        mnt_special_notes, ayurvedic_view, dosha_dominance, lifestyle_yogic_guidance,
        healing_affirmation
     FROM nutrition_knowledge ORDER BY id";

fn knowledge_from_row(row: &Row<'_>) -> rusqlite::Result<Decoded<KnowledgeEntry>> {
    Ok(Ok(KnowledgeEntry {
        entry_id: row.get(0)?,
        category: row.get(1)?,
        disorder_name: row.get(2)?,
        definition_etiology: row.get(3)?,
        clinical_goals: row.get(4)?,
        mnt_macronutrients: row.get(5)?,
        mnt_micronutrients: row.get(6)?,
        mnt_fluids_electrolytes: row.get(7)?,
        mnt_special_notes: row.get(8)?,
        ayurvedic_view: row.get(9)?,
        dosha_dominance: row.get(10)?,
        lifestyle_yogic_guidance: row.get(11)?,
        healing_affirmation: row.get(12)?,
    }))
}
