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

//! Storage module for game results.

mod history;

pub use history::{History, MemoryScoreEntry, ReactionEntry, ReactionStats};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Kind tag carried by every memory-score record.
pub const MEMORY_RECORD_KIND: &str = "memory";

/// A persisted solo reaction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRecord {
    pub reaction_time_ms: u32,
    pub timestamp_ms: u64,
    pub device_id: String,
}

/// Final score of a lost memory game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryScoreRecord {
    pub score: u32,
    pub timestamp_ms: u64,
    pub kind: String,
}

impl MemoryScoreRecord {
    pub fn new(score: u32, timestamp_ms: u64) -> Self {
        Self {
            score,
            timestamp_ms,
            kind: MEMORY_RECORD_KIND.to_string(),
        }
    }
}

/// Write-only persistence capability used by the core.
pub trait Recorder: Send {
    fn record_reaction(&self, record: &ReactionRecord) -> Result<()>;
    fn record_memory_score(&self, record: &MemoryScoreRecord) -> Result<()>;
}

/// Recorder used when history is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record_reaction(&self, _record: &ReactionRecord) -> Result<()> {
        Ok(())
    }

    fn record_memory_score(&self, _record: &MemoryScoreRecord) -> Result<()> {
        Ok(())
    }
}
