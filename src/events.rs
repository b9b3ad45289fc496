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

//! Event processing and message dispatch.
//!
//! The [`EventProcessor`] is the single owner of the link state machine and
//! the game sessions. Adapter callbacks and user intents are queued on
//! channels and applied here one at a time.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bluetooth::{Command, LinkDriver, LinkEffect, LinkInput, LinkManager, LinkState};
use crate::router::ProtocolRouter;
use crate::session::{
    GameMode, MemoryState, MemoryUpdate, Record, SessionOutput, SessionUpdate, SoloUpdate,
};
use crate::state::AppState;
use crate::storage::{MemoryScoreRecord, ReactionRecord, Recorder};
use crate::ui::{Notification, Presenter, UserIntent};

/// Everything the processor reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    Link(LinkInput),
    Intent(UserIntent),
    Shutdown,
}

/// Process events from the link and the user.
pub struct EventProcessor {
    link: LinkManager,
    router: ProtocolRouter,
    driver: Box<dyn LinkDriver>,
    recorder: Box<dyn Recorder>,
    presenter: Box<dyn Presenter>,
    state: Arc<AppState>,
    control_enabled: bool,
    running: bool,
}

impl EventProcessor {
    /// Create a new event processor.
    pub fn new(
        link: LinkManager,
        driver: Box<dyn LinkDriver>,
        recorder: Box<dyn Recorder>,
        presenter: Box<dyn Presenter>,
        state: Arc<AppState>,
    ) -> Self {
        let router = ProtocolRouter::new();
        state.set_mode(router.mode());
        state.set_control_enabled(false);
        Self {
            link,
            router,
            driver,
            recorder,
            presenter,
            state,
            control_enabled: false,
            running: true,
        }
    }

    pub fn link(&self) -> &LinkManager {
        &self.link
    }

    pub fn router(&self) -> &ProtocolRouter {
        &self.router
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the active mode's control is currently usable.
    pub fn control_enabled(&self) -> bool {
        self.control_enabled
    }

    /// Apply events until shutdown or until both channels close.
    pub async fn run(
        mut self,
        mut link_rx: mpsc::Receiver<LinkInput>,
        intent_rx: async_channel::Receiver<UserIntent>,
    ) -> Result<()> {
        info!("Event processor started");

        while self.running {
            let event = tokio::select! {
                input = link_rx.recv() => match input {
                    Some(input) => CoreEvent::Link(input),
                    None => {
                        warn!("Link input channel closed");
                        CoreEvent::Shutdown
                    }
                },
                intent = intent_rx.recv() => match intent {
                    Ok(intent) => CoreEvent::Intent(intent),
                    Err(_) => {
                        debug!("Intent channel closed");
                        CoreEvent::Shutdown
                    }
                },
            };
            self.handle(event);
        }

        info!("Event processor stopped");
        Ok(())
    }

    /// Process a single event.
    pub fn handle(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::Link(input) => {
                self.link.handle(input);
                self.apply_link_effects();
            }
            CoreEvent::Intent(intent) => self.handle_intent(intent),
            CoreEvent::Shutdown => {
                if !self.running {
                    return;
                }
                info!("Shutting down");
                self.running = false;
                self.link.disconnect();
                self.apply_link_effects();
                self.driver.shutdown();
            }
        }
        // Session outputs may have queued writes.
        self.apply_link_effects();
        self.refresh_control();
    }

    fn handle_intent(&mut self, intent: UserIntent) {
        debug!("Intent: {:?}", intent);
        match intent {
            UserIntent::Connect => {
                if self.link.state() != LinkState::Disconnected {
                    self.advise(format!("Already {}", self.link.state().as_str()));
                    return;
                }
                self.link.start_discovery();
                self.apply_link_effects();
            }
            UserIntent::Disconnect => {
                self.link.disconnect();
                self.apply_link_effects();
            }
            UserIntent::SwitchMode(mode) => {
                // Published first: frames decoded from now on carry the new mode.
                self.state.set_mode(mode);
                let outputs = self.router.switch_mode(mode);
                self.presenter.notify(&Notification::ModeChanged(mode));
                self.apply_outputs(outputs);
            }
            UserIntent::PrimaryAction => {
                if !self.link.is_ready() {
                    self.advise("Device not ready".to_string());
                    return;
                }
                if self.router.mode() == GameMode::Memory
                    && self.router.memory().state() == MemoryState::Input
                {
                    self.advise("Type your answer: answer <digits>".to_string());
                    return;
                }
                let outputs = self.router.primary_action();
                self.apply_outputs(outputs);
            }
            UserIntent::SubmitMemory(answer) => {
                let outputs = self.router.submit_memory(&answer);
                self.apply_outputs(outputs);
            }
            UserIntent::Quit => self.handle(CoreEvent::Shutdown),
        }
    }

    /// Drain the link manager until it has nothing left to say.
    fn apply_link_effects(&mut self) {
        loop {
            let effects = self.link.drain_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                self.apply_link_effect(effect);
            }
        }
    }

    fn apply_link_effect(&mut self, effect: LinkEffect) {
        match effect {
            LinkEffect::Action(action) => self.driver.execute(action),
            LinkEffect::StateChanged(link_state) => {
                let was_ready = self.state.get_link_state() == LinkState::Ready;
                let device = self.link.peripheral().map(|p| p.address.to_string());
                self.state.set_link_state(link_state, device);
                self.presenter
                    .notify(&Notification::LinkStateChanged(link_state));

                if was_ready && link_state != LinkState::Ready {
                    let outputs = self.router.invalidate_in_flight();
                    self.apply_outputs(outputs);
                }
            }
            LinkEffect::Event(tagged) => {
                let enabled = self.current_control_enabled();
                let outputs = self.router.route(tagged, enabled);
                self.apply_outputs(outputs);
            }
            LinkEffect::WriteFailed { command, reason } => {
                self.advise(format!("Could not send {}: {}", command, reason));
                let outputs = self.router.on_write_failed(command);
                self.apply_outputs(outputs);
            }
            LinkEffect::Failed(e) => self.advise(e.to_string()),
        }
    }

    fn apply_outputs(&mut self, outputs: Vec<SessionOutput>) {
        for output in outputs {
            match output {
                SessionOutput::Send(command) => self.send(command),
                SessionOutput::Record(record) => self.persist(record),
                SessionOutput::Update(update) => {
                    self.publish(&update);
                    self.presenter.notify(&Notification::Session(update));
                }
            }
        }
    }

    fn send(&mut self, command: Command) {
        if self.link.send(command) {
            return;
        }
        self.advise(format!("Device not ready, {} not sent", command));
        let outputs = self.router.on_write_failed(command);
        self.apply_outputs(outputs);
    }

    fn persist(&mut self, record: Record) {
        let timestamp_ms = Utc::now().timestamp_millis().max(0) as u64;
        let result = match record {
            Record::Reaction { reaction_time_ms } => {
                let device_id = self
                    .link
                    .peripheral()
                    .map(|p| p.address.to_string())
                    .unwrap_or_default();
                self.recorder.record_reaction(&ReactionRecord {
                    reaction_time_ms,
                    timestamp_ms,
                    device_id,
                })
            }
            Record::MemoryScore { score } => self
                .recorder
                .record_memory_score(&MemoryScoreRecord::new(score, timestamp_ms)),
        };
        if let Err(e) = result {
            warn!("Failed to record {:?}: {}", record, e);
        }
    }

    fn publish(&self, update: &SessionUpdate) {
        match update {
            SessionUpdate::Solo(SoloUpdate::Result { reaction_time_ms }) => {
                self.state.set_last_reaction(*reaction_time_ms);
            }
            SessionUpdate::Memory(MemoryUpdate::Correct { best_level, .. }) => {
                self.state.set_best_memory_level(*best_level);
            }
            _ => {}
        }
    }

    fn advise(&mut self, message: String) {
        info!("{}", message);
        self.presenter.notify(&Notification::Advisory(message));
    }

    fn current_control_enabled(&self) -> bool {
        self.link.is_ready() && self.router.active_control_enabled()
    }

    fn refresh_control(&mut self) {
        let enabled = self.current_control_enabled();
        if enabled == self.control_enabled {
            return;
        }
        self.control_enabled = enabled;
        self.state.set_control_enabled(enabled);
        self.presenter.notify(&Notification::ControlEnabled(enabled));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::ble_constants::{UART_NOTIFY_UUID, UART_WRITE_UUID};
    use crate::bluetooth::{
        AttemptId, Candidate, DiscoveryError, LinkAction, NotifyChannel, ProtocolEvent,
        TaggedEvent, TargetFilter, UartProfile, WriteChannel,
    };
    use crate::session::SoloState;
    use bluer::Address;
    use parking_lot::Mutex;
    use std::time::Duration;

    const TARGET: Address = Address::new([0xC1, 0xE8, 0x3B, 0xB1, 0xF1, 0x9B]);

    #[derive(Clone, Default)]
    struct FakeDriver(Arc<Mutex<Vec<LinkAction>>>);

    impl LinkDriver for FakeDriver {
        fn execute(&mut self, action: LinkAction) {
            self.0.lock().push(action);
        }
    }

    #[derive(Clone, Default)]
    struct FakeRecorder {
        reactions: Arc<Mutex<Vec<ReactionRecord>>>,
        scores: Arc<Mutex<Vec<MemoryScoreRecord>>>,
    }

    impl Recorder for FakeRecorder {
        fn record_reaction(&self, record: &ReactionRecord) -> Result<()> {
            self.reactions.lock().push(record.clone());
            Ok(())
        }

        fn record_memory_score(&self, record: &MemoryScoreRecord) -> Result<()> {
            self.scores.lock().push(record.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakePresenter(Arc<Mutex<Vec<Notification>>>);

    impl Presenter for FakePresenter {
        fn notify(&mut self, notification: &Notification) {
            self.0.lock().push(notification.clone());
        }
    }

    struct Harness {
        processor: EventProcessor,
        driver: FakeDriver,
        recorder: FakeRecorder,
        presenter: FakePresenter,
        state: Arc<AppState>,
    }

    impl Harness {
        fn new() -> Self {
            let driver = FakeDriver::default();
            let recorder = FakeRecorder::default();
            let presenter = FakePresenter::default();
            let state = AppState::new();
            let link = LinkManager::new(
                TargetFilter {
                    address: Some(TARGET),
                    name_fragment: "micro:bit".to_string(),
                },
                true,
                Duration::from_millis(10),
            );
            let processor = EventProcessor::new(
                link,
                Box::new(driver.clone()),
                Box::new(recorder.clone()),
                Box::new(presenter.clone()),
                state.clone(),
            );
            Self {
                processor,
                driver,
                recorder,
                presenter,
                state,
            }
        }

        fn intent(&mut self, intent: UserIntent) {
            self.processor.handle(CoreEvent::Intent(intent));
        }

        fn link(&mut self, input: LinkInput) {
            self.processor.handle(CoreEvent::Link(input));
        }

        fn attempt(&self) -> AttemptId {
            self.processor.link().peripheral().map(|p| p.attempt).unwrap()
        }

        fn connect(&mut self) -> AttemptId {
            self.intent(UserIntent::Connect);
            self.link(LinkInput::CandidateFound(Candidate {
                address: TARGET,
                name: Some("BBC micro:bit".to_string()),
            }));
            let attempt = self.attempt();
            self.link(LinkInput::Connected { attempt });
            self.link(LinkInput::ServicesResolved {
                attempt,
                result: Ok(UartProfile {
                    write: WriteChannel {
                        uuid: UART_WRITE_UUID,
                        write: true,
                        write_without_response: true,
                    },
                    notify: NotifyChannel {
                        uuid: UART_NOTIFY_UUID,
                        notify: true,
                        indicate: true,
                    },
                }),
            });
            self.link(LinkInput::Subscribed {
                attempt,
                result: Ok(()),
            });
            attempt
        }

        fn frame(&mut self, event: ProtocolEvent) {
            let attempt = self.attempt();
            let mode = self.state.get_mode();
            self.link(LinkInput::Notification {
                attempt,
                event: TaggedEvent::new(mode, event),
            });
        }

        fn written(&self) -> Vec<Command> {
            self.driver
                .0
                .lock()
                .iter()
                .filter_map(|a| match a {
                    LinkAction::Write { command, .. } => Some(*command),
                    _ => None,
                })
                .collect()
        }

        fn advisories(&self) -> Vec<String> {
            self.presenter
                .0
                .lock()
                .iter()
                .filter_map(|n| match n {
                    Notification::Advisory(text) => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn test_connect_pings_and_enables_control() {
        let mut h = Harness::new();
        h.connect();
        assert_eq!(h.written(), vec![Command::Ping]);
        assert_eq!(h.state.get_link_state(), LinkState::Ready);
        assert_eq!(
            h.state.get_device_name().as_deref(),
            Some("C1:E8:3B:B1:F1:9B")
        );
        assert!(h.processor.control_enabled());
        assert!(h.state.is_control_enabled());
        assert!(h
            .presenter
            .0
            .lock()
            .contains(&Notification::ControlEnabled(true)));
    }

    #[test]
    fn test_primary_action_requires_ready_link() {
        let mut h = Harness::new();
        h.intent(UserIntent::PrimaryAction);
        assert!(h.written().is_empty());
        assert_eq!(h.processor.router().solo().state(), SoloState::Idle);
        assert_eq!(h.advisories(), vec!["Device not ready".to_string()]);
    }

    #[test]
    fn test_solo_round_is_recorded_with_device() {
        let mut h = Harness::new();
        h.connect();
        h.intent(UserIntent::PrimaryAction);
        assert_eq!(h.written(), vec![Command::Ping, Command::Start]);
        assert!(!h.processor.control_enabled());

        h.frame(ProtocolEvent::WaitForFlash);
        h.frame(ProtocolEvent::ReactionTime(312));
        h.frame(ProtocolEvent::ReactionTime(312));

        let reactions = h.recorder.reactions.lock().clone();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].reaction_time_ms, 312);
        assert_eq!(reactions[0].device_id, "C1:E8:3B:B1:F1:9B");
        assert!(reactions[0].timestamp_ms > 0);
        assert_eq!(h.state.get_last_reaction(), Some(312));
        assert!(h.processor.control_enabled());
    }

    #[test]
    fn test_shake_restarts_solo_round() {
        let mut h = Harness::new();
        h.connect();
        h.frame(ProtocolEvent::ShakeDetected);
        assert_eq!(h.written(), vec![Command::Ping, Command::Start]);

        // Round in flight, control disabled: a second shake does nothing.
        h.frame(ProtocolEvent::ShakeDetected);
        assert_eq!(h.written(), vec![Command::Ping, Command::Start]);
    }

    #[test]
    fn test_failed_start_reenables_control() {
        let mut h = Harness::new();
        let attempt = h.connect();
        h.intent(UserIntent::PrimaryAction);
        assert!(!h.processor.control_enabled());

        h.link(LinkInput::WriteFailed {
            attempt,
            command: Command::Start,
            reason: "le-connection-abort-by-local".to_string(),
        });
        assert_eq!(h.processor.router().solo().state(), SoloState::Idle);
        assert!(h.processor.control_enabled());
        assert_eq!(h.advisories().len(), 1);
    }

    #[test]
    fn test_disconnect_resets_round_in_flight() {
        let mut h = Harness::new();
        let attempt = h.connect();
        h.intent(UserIntent::PrimaryAction);
        h.link(LinkInput::PeerDisconnected { attempt });

        assert_eq!(h.processor.router().solo().state(), SoloState::Idle);
        assert_eq!(h.state.get_link_state(), LinkState::Scanning);
        assert!(!h.processor.control_enabled());
    }

    #[test]
    fn test_mode_switch_drops_frames_from_previous_mode() {
        let mut h = Harness::new();
        let attempt = h.connect();
        h.intent(UserIntent::SwitchMode(GameMode::Battle));
        assert_eq!(h.state.get_mode(), GameMode::Battle);
        h.intent(UserIntent::PrimaryAction);

        h.link(LinkInput::Notification {
            attempt,
            event: TaggedEvent::new(GameMode::Solo, ProtocolEvent::ReactionTime(90)),
        });
        assert_eq!(h.processor.router().battle().player1_time(), None);
        assert!(h.recorder.reactions.lock().is_empty());
    }

    #[test]
    fn test_memory_game_over_recorded() {
        let mut h = Harness::new();
        h.connect();
        h.intent(UserIntent::SwitchMode(GameMode::Memory));

        for (digits, answer) in [("7", "7"), ("41", "41"), ("418", "99")] {
            h.intent(UserIntent::PrimaryAction);
            h.frame(ProtocolEvent::MemoryDigits(digits.to_string()));
            h.frame(ProtocolEvent::MemoryDisplayDone);
            h.intent(UserIntent::SubmitMemory(answer.to_string()));
        }

        let scores = h.recorder.scores.lock().clone();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 2);
        assert_eq!(scores[0].kind, "memory");
        assert_eq!(h.state.get_best_memory_level(), 2);
        assert_eq!(
            h.written(),
            vec![
                Command::Ping,
                Command::Memory(1),
                Command::Memory(2),
                Command::Memory(3)
            ]
        );
    }

    #[test]
    fn test_go_while_entering_digits_asks_for_answer() {
        let mut h = Harness::new();
        h.connect();
        h.intent(UserIntent::SwitchMode(GameMode::Memory));
        h.intent(UserIntent::PrimaryAction);
        h.frame(ProtocolEvent::MemoryDisplayDone);
        h.intent(UserIntent::PrimaryAction);
        assert_eq!(h.written(), vec![Command::Ping, Command::Memory(1)]);
        assert_eq!(h.advisories().len(), 1);
    }

    #[test]
    fn test_discovery_failure_is_advisory() {
        let mut h = Harness::new();
        h.intent(UserIntent::Connect);
        h.link(LinkInput::CandidateFound(Candidate {
            address: TARGET,
            name: None,
        }));
        let attempt = h.attempt();
        h.link(LinkInput::Connected { attempt });
        h.link(LinkInput::ServicesResolved {
            attempt,
            result: Err(DiscoveryError::ServiceNotFound),
        });
        assert_eq!(
            h.advisories(),
            vec!["service discovery failed: UART service not found".to_string()]
        );
        assert_eq!(h.state.get_link_state(), LinkState::Scanning);
    }

    #[test]
    fn test_quit_disconnects_and_stops() {
        let mut h = Harness::new();
        h.connect();
        h.intent(UserIntent::Quit);
        assert!(!h.processor.is_running());
        assert_eq!(h.state.get_link_state(), LinkState::Disconnected);
        assert!(h
            .driver
            .0
            .lock()
            .iter()
            .any(|a| matches!(a, LinkAction::Disconnect { .. })));
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_quit() {
        let h = Harness::new();
        let (link_tx, link_rx) = mpsc::channel(8);
        let (intent_tx, intent_rx) = async_channel::unbounded();
        intent_tx.send(UserIntent::Connect).await.unwrap();
        intent_tx.send(UserIntent::Quit).await.unwrap();

        h.processor.run(link_rx, intent_rx).await.unwrap();
        drop(link_tx);

        assert_eq!(h.state.get_link_state(), LinkState::Disconnected);
        let actions = h.driver.0.lock().clone();
        assert_eq!(
            actions,
            vec![
                LinkAction::StartScan {
                    delay: Duration::ZERO
                },
                LinkAction::StopScan,
            ]
        );
    }
}
