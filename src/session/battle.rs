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

//! Two-player battle: each player takes one reaction round, lower time wins.
//!
//! ```text
//! Idle -> Player1Turn -> Player1Waiting -> Player2Turn -> Player2Waiting -> Finished
//!   ^                                                                          |
//!   +------------------------------- advance / reset --------------------------+
//! ```

use tracing::debug;

use super::SessionOutput;
use crate::bluetooth::Command;

/// Time scored for a press before the flash.
///
/// An early press counts as an extremely slow reaction so the opponent wins
/// by default; two early presses tie. Downstream comparisons rely on this
/// exact value.
pub const EARLY_PRESS_PENALTY_MS: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleState {
    Idle,
    Player1Turn,
    Player1Waiting,
    Player2Turn,
    Player2Waiting,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub fn number(&self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }
}

/// What a player's turn produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnTime {
    Reaction(u32),
    Early,
}

impl TurnTime {
    /// Scored value of the turn.
    pub fn as_millis(&self) -> u32 {
        match self {
            TurnTime::Reaction(ms) => *ms,
            TurnTime::Early => EARLY_PRESS_PENALTY_MS,
        }
    }
}

/// Outcome of a finished battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleResult {
    /// `None` on a tie.
    pub winner: Option<Player>,
    pub player1_ms: u32,
    pub player2_ms: u32,
    pub margin_ms: u32,
}

impl BattleResult {
    pub fn decide(player1_ms: u32, player2_ms: u32) -> Self {
        let winner = if player1_ms < player2_ms {
            Some(Player::One)
        } else if player2_ms < player1_ms {
            Some(Player::Two)
        } else {
            None
        };
        Self {
            winner,
            player1_ms,
            player2_ms,
            margin_ms: player1_ms.abs_diff(player2_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleUpdate {
    GetReady(Player),
    WaitForFlash,
    TurnRecorded { player: Player, time: TurnTime },
    Finished(BattleResult),
    Reset,
}

/// Turn-taking reaction battle.
#[derive(Debug, Clone)]
pub struct BattleSession {
    state: BattleState,
    player1_time: Option<u32>,
    player2_time: Option<u32>,
}

impl Default for BattleSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BattleSession {
    pub fn new() -> Self {
        Self {
            state: BattleState::Idle,
            player1_time: None,
            player2_time: None,
        }
    }

    pub fn state(&self) -> BattleState {
        self.state
    }

    pub fn player1_time(&self) -> Option<u32> {
        self.player1_time
    }

    pub fn player2_time(&self) -> Option<u32> {
        self.player2_time
    }

    /// The "go" control works whenever it would do something.
    pub fn control_enabled(&self) -> bool {
        matches!(
            self.state,
            BattleState::Idle | BattleState::Player2Turn | BattleState::Finished
        )
    }

    pub fn in_flight(&self) -> bool {
        matches!(
            self.state,
            BattleState::Player1Waiting | BattleState::Player2Waiting
        )
    }

    /// Result of the battle once both turns are in.
    pub fn result(&self) -> Option<BattleResult> {
        match (self.state, self.player1_time, self.player2_time) {
            (BattleState::Finished, Some(p1), Some(p2)) => Some(BattleResult::decide(p1, p2)),
            _ => None,
        }
    }

    /// The single "go" control.
    pub fn advance(&mut self) -> Vec<SessionOutput> {
        match self.state {
            BattleState::Idle => {
                // Player1Turn is passed through: the first go both arms and fires.
                self.state = BattleState::Player1Waiting;
                vec![
                    BattleUpdate::GetReady(Player::One).into(),
                    SessionOutput::Send(Command::Start),
                ]
            }
            BattleState::Player1Turn => {
                self.state = BattleState::Player1Waiting;
                vec![
                    BattleUpdate::GetReady(Player::One).into(),
                    SessionOutput::Send(Command::Start),
                ]
            }
            BattleState::Player2Turn => {
                self.state = BattleState::Player2Waiting;
                vec![
                    BattleUpdate::GetReady(Player::Two).into(),
                    SessionOutput::Send(Command::Start),
                ]
            }
            BattleState::Finished => self.reset(),
            other => {
                debug!("Battle advance ignored in {:?}", other);
                Vec::new()
            }
        }
    }

    pub fn on_wait_for_flash(&mut self) -> Vec<SessionOutput> {
        if !self.in_flight() {
            return Vec::new();
        }
        vec![BattleUpdate::WaitForFlash.into()]
    }

    pub fn on_reaction_time(&mut self, reaction_time_ms: u32) -> Vec<SessionOutput> {
        self.record(TurnTime::Reaction(reaction_time_ms))
    }

    pub fn on_early_press(&mut self) -> Vec<SessionOutput> {
        self.record(TurnTime::Early)
    }

    /// Give up the in-flight turn so the control can retry it.
    pub fn abort_round(&mut self) -> Vec<SessionOutput> {
        match self.state {
            BattleState::Player1Waiting => self.reset(),
            BattleState::Player2Waiting => {
                self.state = BattleState::Player2Turn;
                vec![BattleUpdate::TurnRecorded {
                    player: Player::One,
                    time: self.player1_turn(),
                }
                .into()]
            }
            _ => Vec::new(),
        }
    }

    pub fn reset(&mut self) -> Vec<SessionOutput> {
        self.state = BattleState::Idle;
        self.player1_time = None;
        self.player2_time = None;
        vec![BattleUpdate::Reset.into()]
    }

    fn record(&mut self, time: TurnTime) -> Vec<SessionOutput> {
        match self.state {
            BattleState::Player1Waiting => {
                self.player1_time = Some(time.as_millis());
                self.state = BattleState::Player2Turn;
                vec![BattleUpdate::TurnRecorded {
                    player: Player::One,
                    time,
                }
                .into()]
            }
            BattleState::Player2Waiting => {
                let player1_ms = self.player1_time.unwrap_or(EARLY_PRESS_PENALTY_MS);
                let player2_ms = time.as_millis();
                self.player2_time = Some(player2_ms);
                self.state = BattleState::Finished;
                vec![
                    BattleUpdate::TurnRecorded {
                        player: Player::Two,
                        time,
                    }
                    .into(),
                    BattleUpdate::Finished(BattleResult::decide(player1_ms, player2_ms)).into(),
                ]
            }
            other => {
                debug!("Battle: {:?} ignored in {:?}", time, other);
                Vec::new()
            }
        }
    }

    fn player1_turn(&self) -> TurnTime {
        match self.player1_time {
            Some(EARLY_PRESS_PENALTY_MS) | None => TurnTime::Early,
            Some(ms) => TurnTime::Reaction(ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_result(outputs: &[SessionOutput]) -> Option<BattleResult> {
        outputs.iter().find_map(|o| match o {
            SessionOutput::Update(super::super::SessionUpdate::Battle(BattleUpdate::Finished(
                result,
            ))) => Some(*result),
            _ => None,
        })
    }

    #[test]
    fn test_sentinel_value_is_pinned() {
        assert_eq!(EARLY_PRESS_PENALTY_MS, 9999);
        assert_eq!(TurnTime::Early.as_millis(), 9999);
    }

    #[test]
    fn test_full_battle_player1_wins() {
        let mut battle = BattleSession::new();

        let outputs = battle.advance();
        assert!(outputs.contains(&SessionOutput::Send(Command::Start)));
        assert_eq!(battle.state(), BattleState::Player1Waiting);
        assert!(!battle.control_enabled());

        battle.on_reaction_time(250);
        assert_eq!(battle.state(), BattleState::Player2Turn);
        assert_eq!(battle.player1_time(), Some(250));
        assert!(battle.control_enabled());

        let outputs = battle.advance();
        assert!(outputs.contains(&SessionOutput::Send(Command::Start)));
        assert_eq!(battle.state(), BattleState::Player2Waiting);

        let outputs = battle.on_reaction_time(300);
        assert_eq!(battle.state(), BattleState::Finished);
        let result = finished_result(&outputs).unwrap();
        assert_eq!(result.winner, Some(Player::One));
        assert_eq!(result.margin_ms, 50);
        assert_eq!(battle.result(), Some(result));
    }

    #[test]
    fn test_decide_rules() {
        let pairs = [
            (100, 200, Some(Player::One), 100),
            (300, 120, Some(Player::Two), 180),
            (150, 150, None, 0),
            (9999, 400, Some(Player::Two), 9599),
            (400, 9999, Some(Player::One), 9599),
            (9999, 9999, None, 0),
            (0, u32::MAX, Some(Player::One), u32::MAX),
        ];
        for (p1, p2, winner, margin) in pairs {
            let result = BattleResult::decide(p1, p2);
            assert_eq!(result.winner, winner, "{} vs {}", p1, p2);
            assert_eq!(result.margin_ms, margin, "{} vs {}", p1, p2);
        }
    }

    #[test]
    fn test_double_early_press_is_tie() {
        let mut battle = BattleSession::new();
        battle.advance();
        battle.on_early_press();
        assert_eq!(battle.player1_time(), Some(EARLY_PRESS_PENALTY_MS));
        battle.advance();
        let outputs = battle.on_early_press();

        let result = finished_result(&outputs).unwrap();
        assert_eq!(result.winner, None);
        assert_eq!(result.player1_ms, 9999);
        assert_eq!(result.player2_ms, 9999);
        assert_eq!(result.margin_ms, 0);
    }

    #[test]
    fn test_duplicate_reaction_time_is_noop() {
        let mut battle = BattleSession::new();
        battle.advance();
        battle.on_reaction_time(210);
        assert_eq!(battle.state(), BattleState::Player2Turn);

        assert!(battle.on_reaction_time(210).is_empty());
        assert_eq!(battle.state(), BattleState::Player2Turn);
        assert_eq!(battle.player1_time(), Some(210));
        assert_eq!(battle.player2_time(), None);
    }

    #[test]
    fn test_events_ignored_when_not_waiting() {
        let mut battle = BattleSession::new();
        assert!(battle.on_reaction_time(100).is_empty());
        assert!(battle.on_early_press().is_empty());
        assert!(battle.on_wait_for_flash().is_empty());
        assert_eq!(battle.state(), BattleState::Idle);
        assert_eq!(battle.player1_time(), None);
    }

    #[test]
    fn test_advance_from_finished_resets() {
        let mut battle = BattleSession::new();
        battle.advance();
        battle.on_reaction_time(200);
        battle.advance();
        battle.on_reaction_time(180);
        assert_eq!(battle.state(), BattleState::Finished);

        assert_eq!(battle.advance(), vec![SessionOutput::from(BattleUpdate::Reset)]);
        assert_eq!(battle.state(), BattleState::Idle);
        assert_eq!(battle.player1_time(), None);
        assert_eq!(battle.player2_time(), None);
        assert_eq!(battle.result(), None);
    }

    #[test]
    fn test_advance_ignored_while_waiting() {
        let mut battle = BattleSession::new();
        battle.advance();
        assert!(battle.advance().is_empty());
        assert_eq!(battle.state(), BattleState::Player1Waiting);
    }

    #[test]
    fn test_abort_round() {
        let mut battle = BattleSession::new();
        battle.advance();
        battle.abort_round();
        assert_eq!(battle.state(), BattleState::Idle);

        battle.advance();
        battle.on_early_press();
        battle.advance();
        battle.abort_round();
        assert_eq!(battle.state(), BattleState::Player2Turn);
        assert_eq!(battle.player1_time(), Some(EARLY_PRESS_PENALTY_MS));
        assert_eq!(battle.player2_time(), None);
    }
}
