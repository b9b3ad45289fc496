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

//! Dispatch of protocol events and user intents to the active session.

use tracing::{debug, info};

use crate::bluetooth::{Command, ProtocolEvent, TaggedEvent};
use crate::session::{BattleSession, GameMode, MemorySession, SessionOutput, SoloSession};

/// Owns the three sessions and the current game mode.
///
/// Events carry the mode that was active when their frame was decoded.
/// An event tagged with any other mode is dropped, so a frame decoded just
/// before a mode switch never lands in the newly selected session.
#[derive(Debug, Default)]
pub struct ProtocolRouter {
    mode: GameMode,
    solo: SoloSession,
    battle: BattleSession,
    memory: MemorySession,
}

impl ProtocolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn solo(&self) -> &SoloSession {
        &self.solo
    }

    pub fn battle(&self) -> &BattleSession {
        &self.battle
    }

    pub fn memory(&self) -> &MemorySession {
        &self.memory
    }

    /// Activate `mode` and reset its session, even if it was already active.
    pub fn switch_mode(&mut self, mode: GameMode) -> Vec<SessionOutput> {
        if self.mode != mode {
            info!("Game mode: {} -> {}", self.mode, mode);
        }
        self.mode = mode;
        match mode {
            GameMode::Solo => self.solo.reset(),
            GameMode::Battle => self.battle.reset(),
            GameMode::Memory => self.memory.reset(),
        }
    }

    /// Hand one decoded event to the session it belongs to.
    pub fn route(&mut self, tagged: TaggedEvent, control_enabled: bool) -> Vec<SessionOutput> {
        let TaggedEvent { mode, event } = tagged;
        if event.is_diagnostic() {
            debug!("Diagnostic frame: {:?}", event);
            return Vec::new();
        }
        if mode != self.mode {
            debug!(
                "Dropping {:?} decoded in {} mode, now in {}",
                event, mode, self.mode
            );
            return Vec::new();
        }

        match (self.mode, event) {
            (GameMode::Solo, ProtocolEvent::ReactionTime(ms)) => self.solo.on_reaction_time(ms),
            (GameMode::Solo, ProtocolEvent::EarlyPress) => self.solo.on_early_press(),
            (GameMode::Solo, ProtocolEvent::WaitForFlash) => self.solo.on_wait_for_flash(),
            (GameMode::Solo, ProtocolEvent::ShakeDetected) => {
                self.solo.on_shake_detected(control_enabled)
            }
            (GameMode::Battle, ProtocolEvent::ReactionTime(ms)) => {
                self.battle.on_reaction_time(ms)
            }
            (GameMode::Battle, ProtocolEvent::EarlyPress) => self.battle.on_early_press(),
            (GameMode::Battle, ProtocolEvent::WaitForFlash) => self.battle.on_wait_for_flash(),
            (GameMode::Memory, ProtocolEvent::MemoryDigits(digits)) => {
                self.memory.on_memory_digits(&digits)
            }
            (GameMode::Memory, ProtocolEvent::MemoryDisplayDone) => self.memory.on_display_done(),
            (mode, event) => {
                debug!("{:?} has no meaning in {} mode", event, mode);
                Vec::new()
            }
        }
    }

    /// The mode's main control: start a round, advance a battle, or start
    /// the next memory level.
    pub fn primary_action(&mut self) -> Vec<SessionOutput> {
        match self.mode {
            GameMode::Solo => self.solo.start(),
            GameMode::Battle => self.battle.advance(),
            GameMode::Memory => self.memory.start(),
        }
    }

    pub fn submit_memory(&mut self, answer: &str) -> Vec<SessionOutput> {
        if self.mode != GameMode::Memory {
            debug!("Memory answer outside memory mode ignored");
            return Vec::new();
        }
        self.memory.submit(answer)
    }

    /// A command failed to reach the peripheral. Only round-starting
    /// commands affect session state.
    pub fn on_write_failed(&mut self, command: Command) -> Vec<SessionOutput> {
        if !command.starts_round() {
            return Vec::new();
        }
        match self.mode {
            GameMode::Solo => self.solo.abort_round(),
            GameMode::Battle => self.battle.abort_round(),
            GameMode::Memory => self.memory.abort_round(),
        }
    }

    /// The link went away; a round waiting on the peripheral can never end.
    pub fn invalidate_in_flight(&mut self) -> Vec<SessionOutput> {
        match self.mode {
            GameMode::Solo if self.solo.in_flight() => self.solo.reset(),
            GameMode::Battle if self.battle.in_flight() => self.battle.reset(),
            GameMode::Memory if self.memory.in_flight() => self.memory.reset(),
            _ => Vec::new(),
        }
    }

    /// Whether the active session's control would do anything right now.
    pub fn active_control_enabled(&self) -> bool {
        match self.mode {
            GameMode::Solo => self.solo.control_enabled(),
            GameMode::Battle => self.battle.control_enabled(),
            GameMode::Memory => self.memory.control_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{BattleState, MemoryState, Record, SoloState};

    fn tagged(mode: GameMode, event: ProtocolEvent) -> TaggedEvent {
        TaggedEvent::new(mode, event)
    }

    #[test]
    fn test_reaction_time_routes_to_solo() {
        let mut router = ProtocolRouter::new();
        router.primary_action();
        let outputs = router.route(tagged(GameMode::Solo, ProtocolEvent::ReactionTime(250)), false);
        assert!(outputs.contains(&SessionOutput::Record(Record::Reaction {
            reaction_time_ms: 250
        })));
        assert_eq!(router.solo().state(), SoloState::Idle);
    }

    #[test]
    fn test_reaction_time_routes_to_battle() {
        let mut router = ProtocolRouter::new();
        router.switch_mode(GameMode::Battle);
        router.primary_action();
        router.route(tagged(GameMode::Battle, ProtocolEvent::ReactionTime(180)), false);
        assert_eq!(router.battle().state(), BattleState::Player2Turn);
        assert_eq!(router.battle().player1_time(), Some(180));
    }

    #[test]
    fn test_memory_ignores_reaction_events() {
        let mut router = ProtocolRouter::new();
        router.switch_mode(GameMode::Memory);
        router.primary_action();
        assert!(router
            .route(tagged(GameMode::Memory, ProtocolEvent::ReactionTime(100)), false)
            .is_empty());
        assert!(router
            .route(tagged(GameMode::Memory, ProtocolEvent::EarlyPress), false)
            .is_empty());
        assert_eq!(router.memory().state(), MemoryState::Showing);
    }

    #[test]
    fn test_memory_events_only_reach_memory() {
        let mut router = ProtocolRouter::new();
        router.primary_action();
        router.route(
            tagged(GameMode::Solo, ProtocolEvent::MemoryDigits("12".to_string())),
            false,
        );
        router.route(tagged(GameMode::Solo, ProtocolEvent::MemoryDisplayDone), false);
        assert_eq!(router.memory().expected(), "");
        assert_eq!(router.solo().state(), SoloState::AwaitingResult);
    }

    #[test]
    fn test_event_tagged_with_previous_mode_is_dropped() {
        let mut router = ProtocolRouter::new();
        router.switch_mode(GameMode::Battle);
        router.primary_action();

        // RT decoded while Solo was active, routed after the switch to Battle.
        let outputs = router.route(tagged(GameMode::Solo, ProtocolEvent::ReactionTime(300)), false);
        assert!(outputs.is_empty());
        assert_eq!(router.battle().state(), BattleState::Player1Waiting);
    }

    #[test]
    fn test_diagnostics_never_mutate() {
        let mut router = ProtocolRouter::new();
        router.primary_action();
        assert!(router.route(tagged(GameMode::Solo, ProtocolEvent::Pong), true).is_empty());
        assert!(router
            .route(
                tagged(GameMode::Solo, ProtocolEvent::Unrecognized("HELLO".to_string())),
                true
            )
            .is_empty());
        assert_eq!(router.solo().state(), SoloState::AwaitingResult);
    }

    #[test]
    fn test_switch_mode_resets_even_same_mode() {
        let mut router = ProtocolRouter::new();
        router.primary_action();
        assert!(router.solo().in_flight());
        router.switch_mode(GameMode::Solo);
        assert_eq!(router.solo().state(), SoloState::Idle);
    }

    #[test]
    fn test_shake_uses_control_flag() {
        let mut router = ProtocolRouter::new();
        assert!(router
            .route(tagged(GameMode::Solo, ProtocolEvent::ShakeDetected), false)
            .is_empty());
        let outputs = router.route(tagged(GameMode::Solo, ProtocolEvent::ShakeDetected), true);
        assert!(outputs.contains(&SessionOutput::Send(Command::Start)));
    }

    #[test]
    fn test_write_failure_of_ping_is_ignored() {
        let mut router = ProtocolRouter::new();
        router.primary_action();
        assert!(router.on_write_failed(Command::Ping).is_empty());
        assert!(router.solo().in_flight());

        router.on_write_failed(Command::Start);
        assert!(!router.solo().in_flight());
        assert!(router.active_control_enabled());
    }

    #[test]
    fn test_invalidate_only_touches_rounds_in_flight() {
        let mut router = ProtocolRouter::new();
        router.switch_mode(GameMode::Memory);
        assert!(router.invalidate_in_flight().is_empty());

        router.primary_action();
        assert!(!router.invalidate_in_flight().is_empty());
        assert_eq!(router.memory().state(), MemoryState::Idle);
    }

    #[test]
    fn test_submit_outside_memory_mode_ignored() {
        let mut router = ProtocolRouter::new();
        assert!(router.submit_memory("1").is_empty());
    }
}
