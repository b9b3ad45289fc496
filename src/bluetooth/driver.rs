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

//! Seam between the link state machine and the Bluetooth stack.

use super::link::LinkAction;

/// Carries out [`LinkAction`]s against real (or simulated) hardware.
///
/// `execute` must return without waiting for the operation. Completions
/// are reported later as `LinkInput`s tagged with the action's attempt id,
/// on whatever channel the implementation was built with.
pub trait LinkDriver: Send {
    fn execute(&mut self, action: LinkAction);

    /// Release every resource held by the driver.
    fn shutdown(&mut self) {}
}
