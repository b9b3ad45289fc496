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

//! Presentation boundary.
//!
//! The core pushes [`Notification`]s out through a [`Presenter`] and takes
//! [`UserIntent`]s in. It never reads anything back from the presenter.

mod console;

pub use console::{parse_command, render, spawn_stdin_reader, ConsoleCommand, ConsolePresenter};

use crate::bluetooth::LinkState;
use crate::session::{GameMode, SessionUpdate};

/// One-way update for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    LinkStateChanged(LinkState),
    /// Transport or availability problem worth telling the user about.
    Advisory(String),
    ModeChanged(GameMode),
    Session(SessionUpdate),
    /// The active mode's action control became usable or unusable.
    ControlEnabled(bool),
}

/// Presentation capability used by the core.
pub trait Presenter: Send {
    fn notify(&mut self, notification: &Notification);
}

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    Connect,
    Disconnect,
    SwitchMode(GameMode),
    /// Start a round, advance the battle, or start the next memory level.
    PrimaryAction,
    SubmitMemory(String),
    Quit,
}
