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

//! Application state management.
//!
//! Read-only snapshot of what the event processor has committed. Only the
//! processor writes here; the notification reader and the terminal read it.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::bluetooth::LinkState;
use crate::session::GameMode;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Current link state.
    pub link_state: RwLock<LinkState>,

    /// Active game mode, used to tag frames at decode time.
    pub mode: RwLock<GameMode>,

    /// Whether the active mode's control is usable.
    pub control_enabled: RwLock<bool>,

    /// Address of the connected micro:bit.
    pub connected_device: RwLock<Option<String>>,

    /// Last solo reaction time shown.
    pub last_reaction: RwLock<Option<u32>>,

    /// Best memory level this run.
    pub best_memory_level: RwLock<u32>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            link_state: RwLock::new(LinkState::Disconnected),
            mode: RwLock::new(GameMode::default()),
            control_enabled: RwLock::new(false),
            connected_device: RwLock::new(None),
            last_reaction: RwLock::new(None),
            best_memory_level: RwLock::new(0),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_link_state(&self, state: LinkState, device: Option<String>) {
        *self.link_state.write() = state;
        *self.connected_device.write() = device;
    }

    pub fn get_link_state(&self) -> LinkState {
        *self.link_state.read()
    }

    pub fn set_mode(&self, mode: GameMode) {
        *self.mode.write() = mode;
    }

    pub fn get_mode(&self) -> GameMode {
        *self.mode.read()
    }

    pub fn set_control_enabled(&self, enabled: bool) {
        *self.control_enabled.write() = enabled;
    }

    pub fn is_control_enabled(&self) -> bool {
        *self.control_enabled.read()
    }

    pub fn get_device_name(&self) -> Option<String> {
        self.connected_device.read().clone()
    }

    pub fn set_last_reaction(&self, reaction_time_ms: u32) {
        *self.last_reaction.write() = Some(reaction_time_ms);
    }

    pub fn get_last_reaction(&self) -> Option<u32> {
        *self.last_reaction.read()
    }

    pub fn set_best_memory_level(&self, level: u32) {
        *self.best_memory_level.write() = level;
    }

    pub fn get_best_memory_level(&self) -> u32 {
        *self.best_memory_level.read()
    }

    /// One-line summary for the `status` command.
    pub fn summary(&self) -> String {
        let device = self
            .get_device_name()
            .unwrap_or_else(|| "no device".to_string());
        format!(
            "{} ({}) | mode: {} | control: {}",
            self.get_link_state().as_str(),
            device,
            self.get_mode(),
            if self.is_control_enabled() { "enabled" } else { "disabled" }
        )
    }
}
