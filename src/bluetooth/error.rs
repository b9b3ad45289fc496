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

//! Transport error types.

use thiserror::Error;

/// Why service discovery could not produce a usable UART profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("UART service not found")]
    ServiceNotFound,
    #[error("UART write characteristic not found")]
    WriteCharacteristicNotFound,
    #[error("UART notify characteristic not found")]
    NotifyCharacteristicNotFound,
    #[error("services were not resolved in time")]
    Timeout,
    #[error("GATT error: {0}")]
    Gatt(String),
}

/// Advisory failures surfaced by the link manager.
///
/// Write failures are not listed: they travel as `LinkEffect::WriteFailed`
/// so the router can revert the round the command started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Bluetooth unavailable: {0}")]
    AdapterUnavailable(String),
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    #[error("service discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("enabling notifications failed: {0}")]
    SubscribeFailed(String),
}
