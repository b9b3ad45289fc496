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

//! BLE service and characteristic UUIDs for the micro:bit UART service.

use uuid::Uuid;

/// Nordic UART service UUID exposed by the micro:bit Bluetooth UART.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Outbound characteristic (we write commands here).
/// The micro:bit calls this one RX, the reverse of the Nordic naming.
/// Properties: Write, Write Without Response
pub const UART_WRITE_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Inbound characteristic (the micro:bit sends events here).
/// Properties: Indicate and/or Notify
pub const UART_NOTIFY_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Client Characteristic Configuration Descriptor.
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Address of the paired micro:bit.
pub const DEFAULT_TARGET_ADDRESS: &str = "C1:E8:3B:B1:F1:9B";

/// Advertised-name fragment accepted when the address does not match.
pub const DEFAULT_NAME_FILTER: &str = "micro:bit";

/// Highest `MEMORY:<n>` level the micro:bit program answers.
pub const MAX_PERIPHERAL_MEMORY_LEVEL: u32 = 12;
