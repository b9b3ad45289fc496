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

//! Memory game: the micro:bit flashes `level` digits, the player types them back.

use tracing::{debug, info, warn};

use super::{Record, SessionOutput};
use crate::bluetooth::ble_constants::MAX_PERIPHERAL_MEMORY_LEVEL;
use crate::bluetooth::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryState {
    Idle,
    Showing,
    Input,
    Result,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryUpdate {
    /// Digits are being shown on the LED matrix.
    Watching { level: u32 },
    /// Display finished, answer may be typed.
    EnterDigits,
    Correct {
        sequence: String,
        next_level: u32,
        best_level: u32,
    },
    GameOver {
        expected: String,
        score: u32,
        best_level: u32,
    },
    Reset { best_level: u32 },
}

#[derive(Debug, Clone)]
pub struct MemorySession {
    state: MemoryState,
    level: u32,
    expected: String,
    best_level: u32,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    pub fn new() -> Self {
        Self {
            state: MemoryState::Idle,
            level: 1,
            expected: String::new(),
            best_level: 0,
        }
    }

    pub fn state(&self) -> MemoryState {
        self.state
    }

    /// Level the next round will request.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn best_level(&self) -> u32 {
        self.best_level
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn control_enabled(&self) -> bool {
        matches!(
            self.state,
            MemoryState::Idle | MemoryState::Input | MemoryState::Result
        )
    }

    pub fn in_flight(&self) -> bool {
        matches!(self.state, MemoryState::Showing | MemoryState::Input)
    }

    /// Ask the peripheral for a new sequence at the current level.
    pub fn start(&mut self) -> Vec<SessionOutput> {
        if !matches!(self.state, MemoryState::Idle | MemoryState::Result) {
            debug!("Memory start ignored in {:?}", self.state);
            return Vec::new();
        }
        if self.level > MAX_PERIPHERAL_MEMORY_LEVEL {
            warn!(
                "Memory level {} exceeds what the peripheral can generate ({})",
                self.level, MAX_PERIPHERAL_MEMORY_LEVEL
            );
        }
        self.expected.clear();
        self.state = MemoryState::Showing;
        vec![
            MemoryUpdate::Watching { level: self.level }.into(),
            SessionOutput::Send(Command::Memory(self.level)),
        ]
    }

    /// Stores the sequence regardless of state.
    pub fn on_memory_digits(&mut self, sequence: &str) -> Vec<SessionOutput> {
        let sequence = sequence.trim();
        if sequence.chars().count() != self.level as usize {
            warn!(
                "Memory sequence has {} digits, expected {}",
                sequence.chars().count(),
                self.level
            );
        }
        self.expected = sequence.to_string();
        Vec::new()
    }

    pub fn on_display_done(&mut self) -> Vec<SessionOutput> {
        if self.state != MemoryState::Showing {
            return Vec::new();
        }
        self.state = MemoryState::Input;
        vec![MemoryUpdate::EnterDigits.into()]
    }

    /// Exact digit-for-digit comparison; `007` and `7` differ.
    pub fn submit(&mut self, answer: &str) -> Vec<SessionOutput> {
        if self.state != MemoryState::Input {
            debug!("Memory submit ignored in {:?}", self.state);
            return Vec::new();
        }
        let answer = answer.trim();
        self.state = MemoryState::Result;

        if answer == self.expected {
            self.best_level = self.best_level.max(self.level);
            self.level += 1;
            info!(
                "Memory level passed, next {} (best {})",
                self.level, self.best_level
            );
            return vec![MemoryUpdate::Correct {
                sequence: self.expected.clone(),
                next_level: self.level,
                best_level: self.best_level,
            }
            .into()];
        }

        let score = self.level - 1;
        self.level = 1;
        info!("Memory game over with score {}", score);

        let mut outputs = Vec::new();
        if score > 0 {
            outputs.push(SessionOutput::Record(Record::MemoryScore { score }));
        }
        outputs.push(
            MemoryUpdate::GameOver {
                expected: self.expected.clone(),
                score,
                best_level: self.best_level,
            }
            .into(),
        );
        outputs
    }

    /// Drop a round whose `MEMORY` command never reached the device.
    pub fn abort_round(&mut self) -> Vec<SessionOutput> {
        if self.state != MemoryState::Showing {
            return Vec::new();
        }
        self.state = MemoryState::Idle;
        self.expected.clear();
        vec![MemoryUpdate::Reset {
            best_level: self.best_level,
        }
        .into()]
    }

    /// Back to level 1. The best level survives.
    pub fn reset(&mut self) -> Vec<SessionOutput> {
        self.state = MemoryState::Idle;
        self.level = 1;
        self.expected.clear();
        vec![MemoryUpdate::Reset {
            best_level: self.best_level,
        }
        .into()]
    }
}
