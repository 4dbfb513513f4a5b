//! Keyword search over the knowledge corpus (SQLite FTS5, BM25)

use ahara_core::knowledge::{EntryId, KnowledgeEntry};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::embedder::tokenize;
use crate::error::Result;

/// Full-text hit
#[derive(Debug, Clone, PartialEq)]
pub struct TextHit {
    /// Matching entry
    pub entry_id: EntryId,
    /// Relevance in [0, 1), higher is better
    pub relevance: f32,
    /// Highlighted excerpt
    pub snippet: String,
}

/// In-memory FTS5 index, built once per snapshot
pub struct FullTextIndex {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for FullTextIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullTextIndex").finish_non_exhaustive()
    }
}

impl FullTextIndex {
    /// Index entries by disorder name, category and body text
    pub fn build(entries: &[KnowledgeEntry]) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE VIRTUAL TABLE knowledge_fts USING fts5(
                disorder_name, category, body,
                tokenize='porter unicode61'
            )",
        )?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO knowledge_fts (rowid, disorder_name, category, body)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for e in entries {
                stmt.execute(params![
                    e.entry_id,
                    e.disorder_name,
                    e.category,
                    e.indexed_text()
                ])?;
            }
        }
        tx.commit()?;
        debug!(entries = entries.len(), "Built full-text index");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// BM25 search; any query term may match
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<TextHit>> {
        let Some(expr) = match_expression(query) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        // Name matches weigh most, then category, then body
        let mut stmt = conn.prepare(
            "SELECT rowid, bm25(knowledge_fts, 10.0, 2.0, 1.0) AS score,
                    snippet(knowledge_fts, 2, '<mark>', '</mark>', '...', 16)
             FROM knowledge_fts
             WHERE knowledge_fts MATCH ?1
             ORDER BY score, rowid
             LIMIT ?2",
        )?;

        let hits = stmt
            .query_map(params![expr, limit as i64], |row| {
                let raw: f64 = row.get(1)?;
                let s = raw.abs();
                Ok(TextHit {
                    entry_id: row.get(0)?,
                    relevance: (s / (1.0 + s)) as f32,
                    snippet: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hits)
    }
}

/// Quote every token so user text can never inject FTS5 syntax
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = tokenize(query)
        .into_iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}
