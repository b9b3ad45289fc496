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

//! Text protocol spoken over the UART characteristics.
//!
//! Every frame is one UTF-8 line. Outbound frames are commands
//! (`PING`, `START`, `MEMORY:<level>`); inbound frames are decoded into
//! [`ProtocolEvent`]s. Decoding never fails: anything unknown becomes
//! [`ProtocolEvent::Unrecognized`].

use std::fmt;

use crate::session::GameMode;

/// Frame terminator appended to every outbound command.
pub const FRAME_DELIMITER: char = '\n';

/// Commands sent to the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe, answered with `PONG`.
    Ping,
    /// Begin a reaction round.
    Start,
    /// Begin a memory round showing `level` digits.
    Memory(u32),
}

impl Command {
    /// Whether this command begins a round on the peripheral.
    pub fn starts_round(&self) -> bool {
        matches!(self, Self::Start | Self::Memory(_))
    }

    /// Encode as a complete frame.
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("PING"),
            Self::Start => f.write_str("START"),
            Self::Memory(level) => write!(f, "MEMORY:{}", level),
        }
    }
}

/// Events decoded from inbound frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// `RT:<ms>`; an unparsable value decodes to 0.
    ReactionTime(u32),
    /// `WAIT`: the flash is imminent.
    WaitForFlash,
    /// `EARLY`: button pressed before the flash.
    EarlyPress,
    /// `MEM:<digits>`: the sequence being shown.
    MemoryDigits(String),
    /// `MEMDONE`: the sequence has finished displaying.
    MemoryDisplayDone,
    /// `SHAKE`: the accelerometer detected a shake.
    ShakeDetected,
    /// `PONG`: answer to `PING`.
    Pong,
    /// Anything else, kept verbatim for diagnostics.
    Unrecognized(String),
}

impl ProtocolEvent {
    /// Diagnostic-only events never reach a session.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Pong | Self::Unrecognized(_))
    }
}

/// An event together with the game mode that was active when it was decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub mode: GameMode,
    pub event: ProtocolEvent,
}

impl TaggedEvent {
    pub fn new(mode: GameMode, event: ProtocolEvent) -> Self {
        Self { mode, event }
    }
}

/// Frame a command: UTF-8 bytes followed by a single newline.
pub fn encode(command: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(command.len() + 1);
    frame.extend_from_slice(command.as_bytes());
    frame.push(FRAME_DELIMITER as u8);
    frame
}

/// Decode one inbound notification payload.
pub fn decode(bytes: &[u8]) -> ProtocolEvent {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.trim(),
        Err(_) => {
            let lossy = String::from_utf8_lossy(bytes);
            return ProtocolEvent::Unrecognized(lossy.trim().to_string());
        }
    };

    if let Some(value) = text.strip_prefix("RT:") {
        return ProtocolEvent::ReactionTime(value.parse().unwrap_or(0));
    }
    if let Some(digits) = text.strip_prefix("MEM:") {
        return ProtocolEvent::MemoryDigits(digits.trim().to_string());
    }

    match text {
        "WAIT" => ProtocolEvent::WaitForFlash,
        "EARLY" => ProtocolEvent::EarlyPress,
        "MEMDONE" => ProtocolEvent::MemoryDisplayDone,
        "SHAKE" => ProtocolEvent::ShakeDetected,
        "PONG" => ProtocolEvent::Pong,
        other => ProtocolEvent::Unrecognized(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frames() {
        assert_eq!(Command::Ping.encode(), b"PING\n");
        assert_eq!(Command::Start.encode(), b"START\n");
        assert_eq!(Command::Memory(7).encode(), b"MEMORY:7\n");
        assert!(Command::Start.starts_round());
        assert!(Command::Memory(1).starts_round());
        assert!(!Command::Ping.starts_round());
    }

    #[test]
    fn test_decode_token_table() {
        assert_eq!(decode(b"RT:312"), ProtocolEvent::ReactionTime(312));
        assert_eq!(decode(b"WAIT"), ProtocolEvent::WaitForFlash);
        assert_eq!(decode(b"EARLY"), ProtocolEvent::EarlyPress);
        assert_eq!(
            decode(b"MEM:418"),
            ProtocolEvent::MemoryDigits("418".to_string())
        );
        assert_eq!(decode(b"MEMDONE"), ProtocolEvent::MemoryDisplayDone);
        assert_eq!(decode(b"SHAKE"), ProtocolEvent::ShakeDetected);
        assert_eq!(decode(b"PONG"), ProtocolEvent::Pong);
    }

    #[test]
    fn test_decode_trims_surrounding_whitespace() {
        assert_eq!(decode(b"  RT:250\r\n"), ProtocolEvent::ReactionTime(250));
        assert_eq!(decode(b"WAIT\n"), ProtocolEvent::WaitForFlash);
        assert_eq!(
            decode(b"MEM: 0071 \n"),
            ProtocolEvent::MemoryDigits("0071".to_string())
        );
    }

    #[test]
    fn test_unparsable_reaction_time_is_zero() {
        assert_eq!(decode(b"RT:"), ProtocolEvent::ReactionTime(0));
        assert_eq!(decode(b"RT:abc"), ProtocolEvent::ReactionTime(0));
        assert_eq!(decode(b"RT:99999999999"), ProtocolEvent::ReactionTime(0));
    }

    #[test]
    fn test_tokens_are_case_sensitive() {
        assert_eq!(
            decode(b"wait"),
            ProtocolEvent::Unrecognized("wait".to_string())
        );
        assert_eq!(
            decode(b"rt:12"),
            ProtocolEvent::Unrecognized("rt:12".to_string())
        );
        assert_eq!(
            decode(b"PONGS"),
            ProtocolEvent::Unrecognized("PONGS".to_string())
        );
    }

    #[test]
    fn test_invalid_utf8_is_unrecognized() {
        let event = decode(&[0x52, 0x54, 0x3a, 0xff, 0x31]);
        assert_eq!(event, ProtocolEvent::Unrecognized("RT:\u{fffd}1".to_string()));
        assert!(event.is_diagnostic());
    }

    #[test]
    fn test_encode_then_decode_preserves_payload() {
        for command in ["PING", "START", "MEMORY:3", "hello world", ""] {
            let frame = encode(command);
            assert_eq!(frame.last(), Some(&b'\n'));
            match decode(&frame) {
                ProtocolEvent::Unrecognized(payload) => assert_eq!(payload, command),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(decode(&encode("RT:42")), ProtocolEvent::ReactionTime(42));
    }
}
