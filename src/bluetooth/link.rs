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

//! Link lifecycle state machine.
//!
//! The [`LinkManager`] owns the connection to the single target peripheral:
//! scan, connect, service discovery, notification subscription, ready.
//! It performs no I/O. Adapter callbacks arrive as [`LinkInput`]s and the
//! manager answers with [`LinkEffect`]s: actions for the driver, state
//! changes and decoded events for the rest of the core.
//!
//! Every connection attempt gets a fresh [`AttemptId`]. Completions carry
//! the id of the attempt that issued them, so anything arriving from an
//! earlier connection is dropped instead of being applied to the new one.

use bluer::Address;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{DiscoveryError, LinkError};
use super::protocol::{Command, TaggedEvent};

/// Identifies one physical connection attempt.
pub type AttemptId = u64;

/// Link lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    ServicesDiscovered,
    Ready,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "Disconnected",
            LinkState::Scanning => "Scanning...",
            LinkState::Connecting => "Connecting...",
            LinkState::Connected => "Connected",
            LinkState::ServicesDiscovered => "Subscribing...",
            LinkState::Ready => "Ready",
        }
    }
}

/// A device seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: Address,
    pub name: Option<String>,
}

/// Matches the single known peripheral by address or advertised name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFilter {
    pub address: Option<Address>,
    pub name_fragment: String,
}

impl TargetFilter {
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if self.address == Some(candidate.address) {
            return true;
        }
        if self.name_fragment.is_empty() {
            return false;
        }
        candidate
            .name
            .as_deref()
            .map(|name| name.contains(&self.name_fragment))
            .unwrap_or(false)
    }
}

/// How outbound frames are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// ATT Write Command; no acknowledgment.
    WithoutResponse,
    /// ATT Write Request; acknowledged by the peripheral.
    WithResponse,
}

/// Value written to the inbound characteristic's CCCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMode {
    Indication,
    Notification,
}

/// Capabilities of the outbound characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteChannel {
    pub uuid: Uuid,
    pub write: bool,
    pub write_without_response: bool,
}

impl WriteChannel {
    /// Unacknowledged writes keep reaction-round latency down, so they win
    /// whenever the characteristic offers them.
    pub fn write_mode(&self) -> WriteMode {
        if self.write_without_response {
            WriteMode::WithoutResponse
        } else {
            WriteMode::WithResponse
        }
    }
}

/// Capabilities of the inbound characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyChannel {
    pub uuid: Uuid,
    pub notify: bool,
    pub indicate: bool,
}

impl NotifyChannel {
    pub fn subscribe_mode(&self) -> SubscribeMode {
        if self.indicate {
            SubscribeMode::Indication
        } else {
            SubscribeMode::Notification
        }
    }
}

/// Both UART characteristics, resolved by service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartProfile {
    pub write: WriteChannel,
    pub notify: NotifyChannel,
}

/// The peripheral of the current connection attempt.
///
/// Exists from `Connecting` until the link drops; a reconnect always
/// creates a new handle with a new attempt id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralHandle {
    pub address: Address,
    pub name: Option<String>,
    pub attempt: AttemptId,
    pub profile: Option<UartProfile>,
}

/// Inputs produced by adapter callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkInput {
    CandidateFound(Candidate),
    Connected {
        attempt: AttemptId,
    },
    ConnectFailed {
        attempt: AttemptId,
        reason: String,
    },
    ServicesResolved {
        attempt: AttemptId,
        result: Result<UartProfile, DiscoveryError>,
    },
    Subscribed {
        attempt: AttemptId,
        result: Result<(), String>,
    },
    Notification {
        attempt: AttemptId,
        event: TaggedEvent,
    },
    WriteFailed {
        attempt: AttemptId,
        command: Command,
        reason: String,
    },
    PeerDisconnected {
        attempt: AttemptId,
    },
    AdapterUnavailable(String),
}

/// Work for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    StartScan {
        delay: Duration,
    },
    StopScan,
    Connect {
        attempt: AttemptId,
        candidate: Candidate,
    },
    DiscoverServices {
        attempt: AttemptId,
    },
    Subscribe {
        attempt: AttemptId,
        mode: SubscribeMode,
    },
    Write {
        attempt: AttemptId,
        command: Command,
        payload: Vec<u8>,
        mode: WriteMode,
    },
    Disconnect {
        attempt: AttemptId,
    },
}

/// Everything the link manager asks the rest of the core to do.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEffect {
    Action(LinkAction),
    StateChanged(LinkState),
    Event(TaggedEvent),
    WriteFailed { command: Command, reason: String },
    Failed(LinkError),
}

/// Link lifecycle owner.
#[derive(Debug)]
pub struct LinkManager {
    filter: TargetFilter,
    auto_reconnect: bool,
    rescan_delay: Duration,
    state: LinkState,
    is_connecting: bool,
    peripheral: Option<PeripheralHandle>,
    next_attempt: AttemptId,
    unavailable_reported: bool,
    effects: Vec<LinkEffect>,
}

impl LinkManager {
    /// Create a link manager for the given target.
    pub fn new(filter: TargetFilter, auto_reconnect: bool, rescan_delay: Duration) -> Self {
        Self {
            filter,
            auto_reconnect,
            rescan_delay,
            state: LinkState::Disconnected,
            is_connecting: false,
            peripheral: None,
            next_attempt: 1,
            unavailable_reported: false,
            effects: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    pub fn is_connecting(&self) -> bool {
        self.is_connecting
    }

    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.peripheral.as_ref()
    }

    /// Take the effects accumulated since the last call.
    pub fn drain_effects(&mut self) -> Vec<LinkEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Begin scanning for the target.
    ///
    /// No-op while a scan, connection attempt or connection is active.
    pub fn start_discovery(&mut self) {
        if self.is_connecting || self.state != LinkState::Disconnected {
            debug!("start_discovery ignored in state {:?}", self.state);
            return;
        }
        self.unavailable_reported = false;
        self.begin_scan(Duration::ZERO);
    }

    /// Tear down whatever is active. Never triggers an automatic rescan.
    pub fn disconnect(&mut self) {
        info!("Disconnect requested");
        self.teardown(false);
    }

    /// Queue a command for the peripheral.
    ///
    /// Returns `false` without side effects unless the link is `Ready`.
    pub fn send(&mut self, command: Command) -> bool {
        if self.state != LinkState::Ready {
            debug!("Not ready, dropping {}", command);
            return false;
        }
        let Some((attempt, mode)) = self.peripheral.as_ref().and_then(|p| {
            p.profile
                .as_ref()
                .map(|profile| (p.attempt, profile.write.write_mode()))
        }) else {
            warn!("Ready without a resolved profile, dropping {}", command);
            return false;
        };

        debug!("Sending {} ({:?})", command, mode);
        self.push_action(LinkAction::Write {
            attempt,
            command,
            payload: command.encode(),
            mode,
        });
        true
    }

    /// Apply one adapter callback.
    pub fn handle(&mut self, input: LinkInput) {
        match input {
            LinkInput::CandidateFound(candidate) => self.on_candidate(candidate),
            LinkInput::Connected { attempt } => {
                if self.is_stale(attempt, LinkState::Connecting) {
                    return;
                }
                self.set_state(LinkState::Connected);
                self.push_action(LinkAction::DiscoverServices { attempt });
            }
            LinkInput::ConnectFailed { attempt, reason } => {
                if !self.is_current(attempt) {
                    debug!("Ignoring connect failure of stale attempt {}", attempt);
                    return;
                }
                warn!("Connection attempt {} failed: {}", attempt, reason);
                self.effects
                    .push(LinkEffect::Failed(LinkError::ConnectFailed(reason)));
                self.teardown(true);
            }
            LinkInput::ServicesResolved { attempt, result } => {
                if self.is_stale(attempt, LinkState::Connected) {
                    return;
                }
                match result {
                    Ok(profile) => self.on_profile(profile),
                    Err(e) => {
                        warn!("Service discovery failed: {}", e);
                        self.effects.push(LinkEffect::Failed(LinkError::Discovery(e)));
                        self.teardown(true);
                    }
                }
            }
            LinkInput::Subscribed { attempt, result } => {
                if self.is_stale(attempt, LinkState::ServicesDiscovered) {
                    return;
                }
                match result {
                    Ok(()) => {
                        self.set_state(LinkState::Ready);
                        self.send(Command::Ping);
                    }
                    Err(reason) => {
                        warn!("Subscription failed: {}", reason);
                        self.effects
                            .push(LinkEffect::Failed(LinkError::SubscribeFailed(reason)));
                        self.teardown(true);
                    }
                }
            }
            LinkInput::Notification { attempt, event } => {
                let subscribed = matches!(
                    self.state,
                    LinkState::ServicesDiscovered | LinkState::Ready
                );
                if !self.is_current(attempt) || !subscribed {
                    debug!("Dropping notification from attempt {}", attempt);
                    return;
                }
                self.effects.push(LinkEffect::Event(event));
            }
            LinkInput::WriteFailed {
                attempt,
                command,
                reason,
            } => {
                if !self.is_current(attempt) {
                    debug!("Ignoring write failure of stale attempt {}", attempt);
                    return;
                }
                warn!("Write of {} failed: {}", command, reason);
                self.effects.push(LinkEffect::WriteFailed { command, reason });
            }
            LinkInput::PeerDisconnected { attempt } => {
                if !self.is_current(attempt) {
                    debug!("Ignoring disconnect of stale attempt {}", attempt);
                    return;
                }
                info!("Peripheral disconnected");
                self.teardown(true);
            }
            LinkInput::AdapterUnavailable(reason) => {
                if let Some(peripheral) = self.peripheral.take() {
                    self.push_action(LinkAction::Disconnect {
                        attempt: peripheral.attempt,
                    });
                }
                self.is_connecting = false;
                self.set_state(LinkState::Disconnected);
                if !self.unavailable_reported {
                    self.unavailable_reported = true;
                    self.effects
                        .push(LinkEffect::Failed(LinkError::AdapterUnavailable(reason)));
                }
            }
        }
    }

    fn on_candidate(&mut self, candidate: Candidate) {
        if self.state != LinkState::Scanning || self.is_connecting {
            return;
        }
        if !self.filter.matches(&candidate) {
            debug!("Skipping {} ({:?})", candidate.address, candidate.name);
            return;
        }

        info!(
            "Found target {} ({})",
            candidate.address,
            candidate.name.as_deref().unwrap_or("unnamed")
        );
        self.is_connecting = true;
        self.push_action(LinkAction::StopScan);

        let attempt = self.next_attempt;
        self.next_attempt += 1;
        self.peripheral = Some(PeripheralHandle {
            address: candidate.address,
            name: candidate.name.clone(),
            attempt,
            profile: None,
        });
        self.set_state(LinkState::Connecting);
        self.push_action(LinkAction::Connect { attempt, candidate });
    }

    fn on_profile(&mut self, profile: UartProfile) {
        let mode = profile.notify.subscribe_mode();
        let Some(peripheral) = self.peripheral.as_mut() else {
            return;
        };
        let attempt = peripheral.attempt;
        peripheral.profile = Some(profile);

        self.set_state(LinkState::ServicesDiscovered);
        self.push_action(LinkAction::Subscribe { attempt, mode });
    }

    fn begin_scan(&mut self, delay: Duration) {
        self.set_state(LinkState::Scanning);
        self.push_action(LinkAction::StartScan { delay });
    }

    fn teardown(&mut self, rescan: bool) {
        if self.state == LinkState::Scanning {
            self.push_action(LinkAction::StopScan);
        }
        if let Some(peripheral) = self.peripheral.take() {
            self.push_action(LinkAction::Disconnect {
                attempt: peripheral.attempt,
            });
        }
        self.is_connecting = false;
        self.set_state(LinkState::Disconnected);

        if rescan && self.auto_reconnect {
            info!("Rescanning in {:?}", self.rescan_delay);
            self.begin_scan(self.rescan_delay);
        }
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        self.peripheral
            .as_ref()
            .map(|p| p.attempt == attempt)
            .unwrap_or(false)
    }

    fn is_stale(&self, attempt: AttemptId, expected: LinkState) -> bool {
        let stale = !self.is_current(attempt) || self.state != expected;
        if stale {
            debug!(
                "Ignoring completion of attempt {} in state {:?}",
                attempt, self.state
            );
        }
        stale
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state == state {
            return;
        }
        info!("Link state: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.effects.push(LinkEffect::StateChanged(state));
    }

    fn push_action(&mut self, action: LinkAction) {
        self.effects.push(LinkEffect::Action(action));
    }
}
