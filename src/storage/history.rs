// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! History storage using SQLite.

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{MemoryScoreRecord, ReactionRecord, Recorder, MEMORY_RECORD_KIND};

/// A stored reaction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEntry {
    pub id: i64,
    pub reaction_time_ms: u32,
    pub timestamp_ms: i64,
    pub device_id: String,
}

impl ReactionEntry {
    pub fn recorded_at(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

/// A stored memory score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryScoreEntry {
    pub id: i64,
    pub score: u32,
    pub timestamp_ms: i64,
}

/// Summary over the most recent reaction times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionStats {
    pub best_ms: u32,
    /// Integer mean, rounded down.
    pub average_ms: u32,
    pub count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryExport {
    reactions: Vec<ReactionRecord>,
    memory_scores: Vec<MemoryScoreRecord>,
}

/// History database manager.
#[derive(Clone)]
pub struct History {
    conn: Arc<Mutex<Connection>>,
    max_entries: u32,
}

impl History {
    /// Create or open history database.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("history.db");
        info!("Opening history database: {:?}", db_path);

        let conn = Connection::open(&db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reaction_times (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reaction_time_ms INTEGER NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                device_id TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS memory_scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                score INTEGER NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                kind TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reaction_timestamp ON reaction_times(timestamp_ms DESC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_entries: 10000,
        })
    }

    /// Set maximum number of rows kept per table.
    pub fn set_max_entries(&mut self, max: u32) {
        self.max_entries = max;
    }

    /// Most recent reaction times, newest first.
    pub fn recent_reactions(&self, limit: u32) -> Result<Vec<ReactionEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, reaction_time_ms, timestamp_ms, device_id
             FROM reaction_times
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT ?1",
        )?;

        let entries = stmt
            .query_map([limit], |row| {
                Ok(ReactionEntry {
                    id: row.get(0)?,
                    reaction_time_ms: row.get(1)?,
                    timestamp_ms: row.get(2)?,
                    device_id: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Best, average and count over the `limit` most recent reaction times.
    ///
    /// `None` when nothing has been recorded.
    pub fn reaction_stats(&self, limit: u32) -> Result<Option<ReactionStats>> {
        let conn = self.conn.lock();
        let (best, sum, count): (Option<u32>, Option<i64>, i64) = conn.query_row(
            "SELECT MIN(reaction_time_ms), SUM(reaction_time_ms), COUNT(*) FROM (
                SELECT reaction_time_ms FROM reaction_times
                ORDER BY timestamp_ms DESC, id DESC
                LIMIT ?1
            )",
            [limit],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let (Some(best_ms), Some(sum)) = (best, sum) else {
            return Ok(None);
        };
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(ReactionStats {
            best_ms,
            average_ms: u32::try_from(sum / count).unwrap_or(u32::MAX),
            count: u32::try_from(count).unwrap_or(u32::MAX),
        }))
    }

    /// Most recent memory scores, newest first.
    pub fn recent_memory_scores(&self, limit: u32) -> Result<Vec<MemoryScoreEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, score, timestamp_ms
             FROM memory_scores
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT ?1",
        )?;

        let entries = stmt
            .query_map([limit], |row| {
                Ok(MemoryScoreEntry {
                    id: row.get(0)?,
                    score: row.get(1)?,
                    timestamp_ms: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Highest memory score ever stored.
    pub fn best_memory_score(&self) -> Result<Option<u32>> {
        let conn = self.conn.lock();
        let best: Option<u32> =
            conn.query_row("SELECT MAX(score) FROM memory_scores", [], |row| row.get(0))?;
        Ok(best)
    }

    /// Export all stored records as JSON.
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let reactions: Vec<ReactionRecord> = self
            .recent_reactions(self.max_entries)?
            .into_iter()
            .rev()
            .map(|entry| ReactionRecord {
                reaction_time_ms: entry.reaction_time_ms,
                timestamp_ms: entry.timestamp_ms.max(0) as u64,
                device_id: entry.device_id,
            })
            .collect();
        let memory_scores: Vec<MemoryScoreRecord> = self
            .recent_memory_scores(self.max_entries)?
            .into_iter()
            .rev()
            .map(|entry| MemoryScoreRecord::new(entry.score, entry.timestamp_ms.max(0) as u64))
            .collect();

        let count = reactions.len() + memory_scores.len();
        let export = HistoryExport {
            reactions,
            memory_scores,
        };
        std::fs::write(path, serde_json::to_string_pretty(&export)?)?;
        info!("Exported {} records to {:?}", count, path);
        Ok(())
    }

    /// Clear all history.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM reaction_times", [])?;
        conn.execute("DELETE FROM memory_scores", [])?;
        info!("History cleared");
        Ok(())
    }

    /// Remove rows beyond max_entries.
    fn cleanup_old_entries(&self, conn: &Connection, table: &str) -> Result<()> {
        let removed = conn.execute(
            &format!(
                "DELETE FROM {table} WHERE id NOT IN (
                    SELECT id FROM {table} ORDER BY timestamp_ms DESC, id DESC LIMIT ?1
                )"
            ),
            [self.max_entries],
        )?;
        if removed > 0 {
            debug!("Trimmed {} old rows from {}", removed, table);
        }
        Ok(())
    }
}

fn to_sql_millis(timestamp_ms: u64) -> i64 {
    i64::try_from(timestamp_ms).unwrap_or(i64::MAX)
}

impl Recorder for History {
    fn record_reaction(&self, record: &ReactionRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reaction_times (reaction_time_ms, timestamp_ms, device_id) VALUES (?1, ?2, ?3)",
            params![
                record.reaction_time_ms,
                to_sql_millis(record.timestamp_ms),
                record.device_id
            ],
        )?;
        self.cleanup_old_entries(&conn, "reaction_times")?;
        Ok(())
    }

    fn record_memory_score(&self, record: &MemoryScoreRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memory_scores (score, timestamp_ms, kind) VALUES (?1, ?2, ?3)",
            params![
                record.score,
                to_sql_millis(record.timestamp_ms),
                MEMORY_RECORD_KIND
            ],
        )?;
        self.cleanup_old_entries(&conn, "memory_scores")?;
        Ok(())
    }
}
