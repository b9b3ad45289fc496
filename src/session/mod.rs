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

//! Game session state machines.
//!
//! Sessions are pure: every handler returns the [`SessionOutput`]s it
//! wants performed (commands for the peripheral, records for the history
//! store, updates for the presenter) and never touches I/O itself.
//! Handlers are total over (state, event); an event that does not fit the
//! current state yields no output.

pub mod battle;
pub mod memory;
pub mod solo;

use std::fmt;
use std::str::FromStr;

use crate::bluetooth::Command;

pub use battle::{
    BattleResult, BattleSession, BattleState, BattleUpdate, Player, TurnTime,
    EARLY_PRESS_PENALTY_MS,
};
pub use memory::{MemorySession, MemoryState, MemoryUpdate};
pub use solo::{SoloSession, SoloState, SoloUpdate};

/// Active game mode. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameMode {
    #[default]
    Solo,
    Battle,
    Memory,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Solo => "solo",
            GameMode::Battle => "battle",
            GameMode::Memory => "memory",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "solo" | "test" => Ok(GameMode::Solo),
            "battle" => Ok(GameMode::Battle),
            "memory" => Ok(GameMode::Memory),
            other => Err(format!("unknown game mode: {}", other)),
        }
    }
}

/// Something a session wants persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// A solo reaction time.
    Reaction { reaction_time_ms: u32 },
    /// Final score of a lost memory game.
    MemoryScore { score: u32 },
}

/// Presentation update from one of the sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Solo(SoloUpdate),
    Battle(BattleUpdate),
    Memory(MemoryUpdate),
}

/// Side effects requested by a session handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    Send(Command),
    Record(Record),
    Update(SessionUpdate),
}

impl From<SoloUpdate> for SessionOutput {
    fn from(update: SoloUpdate) -> Self {
        SessionOutput::Update(SessionUpdate::Solo(update))
    }
}

impl From<BattleUpdate> for SessionOutput {
    fn from(update: BattleUpdate) -> Self {
        SessionOutput::Update(SessionUpdate::Battle(update))
    }
}

impl From<MemoryUpdate> for SessionOutput {
    fn from(update: MemoryUpdate) -> Self {
        SessionOutput::Update(SessionUpdate::Memory(update))
    }
}
