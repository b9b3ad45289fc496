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

//! Solo reaction test: one round, one time.

use tracing::debug;

use super::{Record, SessionOutput};
use crate::bluetooth::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoloState {
    Idle,
    AwaitingResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoloUpdate {
    GetReady,
    WaitForFlash,
    Result { reaction_time_ms: u32 },
    TooEarly,
    Reset,
}

/// Single-player reaction round.
#[derive(Debug, Clone)]
pub struct SoloSession {
    state: SoloState,
    last_result: Option<u32>,
}

impl Default for SoloSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SoloSession {
    pub fn new() -> Self {
        Self {
            state: SoloState::Idle,
            last_result: None,
        }
    }

    pub fn state(&self) -> SoloState {
        self.state
    }

    pub fn last_result(&self) -> Option<u32> {
        self.last_result
    }

    /// The start control is usable only between rounds.
    pub fn control_enabled(&self) -> bool {
        self.state == SoloState::Idle
    }

    pub fn in_flight(&self) -> bool {
        self.state == SoloState::AwaitingResult
    }

    pub fn start(&mut self) -> Vec<SessionOutput> {
        if self.state != SoloState::Idle {
            debug!("Solo start ignored, round in flight");
            return Vec::new();
        }
        self.state = SoloState::AwaitingResult;
        vec![SoloUpdate::GetReady.into(), SessionOutput::Send(Command::Start)]
    }

    pub fn on_wait_for_flash(&mut self) -> Vec<SessionOutput> {
        if self.state != SoloState::AwaitingResult {
            return Vec::new();
        }
        vec![SoloUpdate::WaitForFlash.into()]
    }

    /// A zero reading is shown but not persisted.
    ///
    /// The codec decodes an unparsable `RT:` payload to zero, so a literal
    /// `RT:0` from the micro:bit cannot be told apart from a garbled frame
    /// and is dropped from the history as well.
    pub fn on_reaction_time(&mut self, reaction_time_ms: u32) -> Vec<SessionOutput> {
        if self.state != SoloState::AwaitingResult {
            debug!("Solo: stray reaction time {}ms ignored", reaction_time_ms);
            return Vec::new();
        }
        self.state = SoloState::Idle;
        self.last_result = Some(reaction_time_ms);

        let mut outputs: Vec<SessionOutput> = vec![SoloUpdate::Result { reaction_time_ms }.into()];
        if reaction_time_ms > 0 {
            outputs.push(SessionOutput::Record(Record::Reaction { reaction_time_ms }));
        }
        outputs
    }

    pub fn on_early_press(&mut self) -> Vec<SessionOutput> {
        if self.state != SoloState::AwaitingResult {
            return Vec::new();
        }
        self.state = SoloState::Idle;
        vec![SoloUpdate::TooEarly.into()]
    }

    /// Shaking the micro:bit restarts a finished round.
    pub fn on_shake_detected(&mut self, control_enabled: bool) -> Vec<SessionOutput> {
        if self.state == SoloState::Idle && control_enabled {
            debug!("Shake restart");
            self.start()
        } else {
            Vec::new()
        }
    }

    /// Give up the in-flight round, e.g. because `START` never left.
    pub fn abort_round(&mut self) -> Vec<SessionOutput> {
        if self.state != SoloState::AwaitingResult {
            return Vec::new();
        }
        self.state = SoloState::Idle;
        vec![SoloUpdate::Reset.into()]
    }

    pub fn reset(&mut self) -> Vec<SessionOutput> {
        self.state = SoloState::Idle;
        vec![SoloUpdate::Reset.into()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{decode, ProtocolEvent};

    #[test]
    fn test_round_records_result() {
        let mut solo = SoloSession::new();
        assert_eq!(
            solo.start(),
            vec![SessionOutput::from(SoloUpdate::GetReady), SessionOutput::Send(Command::Start)]
        );
        assert_eq!(solo.state(), SoloState::AwaitingResult);
        assert!(!solo.control_enabled());

        assert_eq!(solo.on_wait_for_flash(), vec![SessionOutput::from(SoloUpdate::WaitForFlash)]);
        assert_eq!(solo.state(), SoloState::AwaitingResult);

        assert_eq!(
            solo.on_reaction_time(312),
            vec![
                SessionOutput::from(SoloUpdate::Result {
                    reaction_time_ms: 312
                }),
                SessionOutput::Record(Record::Reaction {
                    reaction_time_ms: 312
                }),
            ]
        );
        assert_eq!(solo.state(), SoloState::Idle);
        assert_eq!(solo.last_result(), Some(312));

        // Duplicate delivery of the same frame.
        assert!(solo.on_reaction_time(312).is_empty());
        assert_eq!(solo.state(), SoloState::Idle);
    }

    #[test]
    fn test_start_only_from_idle() {
        let mut solo = SoloSession::new();
        solo.start();
        assert!(solo.start().is_empty());
    }

    #[test]
    fn test_early_press_ends_round() {
        let mut solo = SoloSession::new();
        assert!(solo.on_early_press().is_empty());

        solo.start();
        assert_eq!(solo.on_early_press(), vec![SessionOutput::from(SoloUpdate::TooEarly)]);
        assert_eq!(solo.state(), SoloState::Idle);
        assert_eq!(solo.last_result(), None);
    }

    #[test]
    fn test_zero_reading_not_recorded() {
        let mut solo = SoloSession::new();
        solo.start();
        let outputs = solo.on_reaction_time(0);
        assert_eq!(
            outputs,
            vec![SessionOutput::from(SoloUpdate::Result {
                reaction_time_ms: 0
            })]
        );
    }

    #[test]
    fn test_literal_zero_frame_skips_history() {
        let mut solo = SoloSession::new();
        for frame in [&b"RT:0"[..], &b"RT:"[..], &b"RT:x1"[..]] {
            solo.start();
            let ProtocolEvent::ReactionTime(ms) = decode(frame) else {
                panic!("{:?} should decode to a reaction time", frame);
            };
            let outputs = solo.on_reaction_time(ms);
            assert!(
                !outputs
                    .iter()
                    .any(|output| matches!(output, SessionOutput::Record(_))),
                "{:?} must not be recorded",
                frame
            );
            assert_eq!(solo.state(), SoloState::Idle);
        }
    }

    #[test]
    fn test_shake_restarts_only_when_enabled_and_idle() {
        let mut solo = SoloSession::new();
        assert!(solo.on_shake_detected(false).is_empty());
        assert_eq!(solo.state(), SoloState::Idle);

        let outputs = solo.on_shake_detected(true);
        assert!(outputs.contains(&SessionOutput::Send(Command::Start)));
        assert_eq!(solo.state(), SoloState::AwaitingResult);

        assert!(solo.on_shake_detected(true).is_empty());
    }

    #[test]
    fn test_abort_round_returns_to_idle() {
        let mut solo = SoloSession::new();
        assert!(solo.abort_round().is_empty());
        solo.start();
        assert!(solo.in_flight());
        assert_eq!(solo.abort_round(), vec![SessionOutput::from(SoloUpdate::Reset)]);
        assert!(solo.control_enabled());
    }
}
