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

//! Bluetooth communication module.
//!
//! Connects as a GATT central to the micro:bit's UART service and speaks
//! the line-based game protocol over it.

pub mod ble_constants;
mod connection;
mod driver;
mod error;
mod link;
mod protocol;

pub use connection::BluerCentral;
pub use driver::LinkDriver;
pub use error::{DiscoveryError, LinkError};
pub use link::{
    AttemptId, Candidate, LinkAction, LinkEffect, LinkInput, LinkManager, LinkState,
    NotifyChannel, PeripheralHandle, SubscribeMode, TargetFilter, UartProfile, WriteChannel,
    WriteMode,
};
pub use protocol::{decode, encode, Command, ProtocolEvent, TaggedEvent, FRAME_DELIMITER};
