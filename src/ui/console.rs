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

//! Terminal front end.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

use super::{Notification, Presenter, UserIntent};
use crate::session::{
    BattleUpdate, MemoryUpdate, Player, SessionUpdate, SoloUpdate, TurnTime,
};
use crate::state::AppState;
use crate::storage::History;

const HELP: &str = "commands: connect | disconnect | mode <solo|battle|memory> | go | \
answer <digits> | history | export <file.json> | clear | status | help | quit";

/// A parsed terminal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Intent(UserIntent),
    History,
    Export(PathBuf),
    Clear,
    Status,
    Help,
}

/// Parse one line typed by the user.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let intent = match word.to_lowercase().as_str() {
        "connect" => UserIntent::Connect,
        "disconnect" => UserIntent::Disconnect,
        "mode" => UserIntent::SwitchMode(rest.parse()?),
        "go" | "start" => UserIntent::PrimaryAction,
        "answer" => {
            if rest.is_empty() {
                return Err("usage: answer <digits>".to_string());
            }
            UserIntent::SubmitMemory(rest.to_string())
        }
        "quit" | "exit" => UserIntent::Quit,
        "history" => return Ok(ConsoleCommand::History),
        "export" => {
            if rest.is_empty() {
                return Err("usage: export <file.json>".to_string());
            }
            return Ok(ConsoleCommand::Export(PathBuf::from(rest)));
        }
        "clear" => return Ok(ConsoleCommand::Clear),
        "status" => return Ok(ConsoleCommand::Status),
        "help" | "?" => return Ok(ConsoleCommand::Help),
        "" => return Err(String::new()),
        other => return Err(format!("unknown command: {} ({})", other, HELP)),
    };
    Ok(ConsoleCommand::Intent(intent))
}

/// Text shown for a notification, if any.
pub fn render(notification: &Notification) -> Option<String> {
    let text = match notification {
        Notification::LinkStateChanged(state) => format!("[link] {}", state.as_str()),
        Notification::Advisory(message) => format!("[!] {}", message),
        Notification::ModeChanged(mode) => format!("[mode] {}", mode),
        Notification::ControlEnabled(_) => return None,
        Notification::Session(SessionUpdate::Solo(update)) => render_solo(update),
        Notification::Session(SessionUpdate::Battle(update)) => render_battle(update),
        Notification::Session(SessionUpdate::Memory(update)) => render_memory(update),
    };
    Some(text)
}

fn render_solo(update: &SoloUpdate) -> String {
    match update {
        SoloUpdate::GetReady => "Get ready...".to_string(),
        SoloUpdate::WaitForFlash => "Wait for it...".to_string(),
        SoloUpdate::Result {
            reaction_time_ms: 0,
        } => "Reaction time unreadable".to_string(),
        SoloUpdate::Result { reaction_time_ms } => {
            format!("Reaction time: {} ms", reaction_time_ms)
        }
        SoloUpdate::TooEarly => "Too early!".to_string(),
        SoloUpdate::Reset => "Type go to start".to_string(),
    }
}

fn render_battle(update: &BattleUpdate) -> String {
    match update {
        BattleUpdate::GetReady(player) => format!("Player {}: get ready", player.number()),
        BattleUpdate::WaitForFlash => "Wait for it...".to_string(),
        BattleUpdate::TurnRecorded { player, time } => {
            let time = match time {
                TurnTime::Reaction(ms) => format!("{} ms", ms),
                TurnTime::Early => "too early".to_string(),
            };
            match player {
                Player::One => format!("Player 1: {}. Player 2, type go", time),
                Player::Two => format!("Player 2: {}", time),
            }
        }
        BattleUpdate::Finished(result) => match result.winner {
            Some(player) => format!(
                "Player {} wins by {} ms ({} vs {})",
                player.number(),
                result.margin_ms,
                result.player1_ms,
                result.player2_ms
            ),
            None => format!("Tie at {} ms", result.player1_ms),
        },
        BattleUpdate::Reset => "Player 1, type go".to_string(),
    }
}

fn render_memory(update: &MemoryUpdate) -> String {
    match update {
        MemoryUpdate::Watching { level } => format!("Level {}: watch the micro:bit", level),
        MemoryUpdate::EnterDigits => "Enter the digits: answer <digits>".to_string(),
        MemoryUpdate::Correct {
            next_level,
            best_level,
            ..
        } => format!(
            "Correct! Type go for level {} (best {})",
            next_level, best_level
        ),
        MemoryUpdate::GameOver {
            expected,
            score,
            best_level,
        } => format!(
            "Wrong, it was {}. Score {} (best {})",
            expected, score, best_level
        ),
        MemoryUpdate::Reset { best_level } => {
            format!("Type go to start (best level {})", best_level)
        }
    }
}

/// Prints notifications to stdout.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn new() -> Self {
        Self
    }
}

impl Presenter for ConsolePresenter {
    fn notify(&mut self, notification: &Notification) {
        if let Some(text) = render(notification) {
            println!("{}", text);
        }
    }
}

fn print_history(history: Option<&History>, limit: u32) {
    let Some(history) = history else {
        println!("History is disabled");
        return;
    };

    match history.recent_reactions(limit) {
        Ok(entries) if entries.is_empty() => println!("No reaction times yet"),
        Ok(entries) => {
            for entry in entries {
                let when = entry
                    .recorded_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!("  {}  {:>5} ms", when, entry.reaction_time_ms);
            }
        }
        Err(e) => error!("Failed to read history: {}", e),
    }

    match history.reaction_stats(limit) {
        Ok(Some(stats)) => println!(
            "Best {} ms, average {} ms over {} rounds",
            stats.best_ms, stats.average_ms, stats.count
        ),
        Ok(None) => {}
        Err(e) => error!("Failed to compute statistics: {}", e),
    }

    match history.best_memory_score() {
        Ok(Some(score)) => println!("Best memory score: {}", score),
        Ok(None) => {}
        Err(e) => error!("Failed to read memory scores: {}", e),
    }
}

/// Run `export` or `clear` against the history store.
fn manage_history(history: Option<&History>, command: &ConsoleCommand) -> String {
    let Some(history) = history else {
        return "History is disabled".to_string();
    };

    match command {
        ConsoleCommand::Export(path) => match history.export_json(path) {
            Ok(()) => format!("History exported to {}", path.display()),
            Err(e) => {
                error!("Failed to export history: {}", e);
                format!("Export failed: {}", e)
            }
        },
        ConsoleCommand::Clear => match history.clear() {
            Ok(()) => "History cleared".to_string(),
            Err(e) => {
                error!("Failed to clear history: {}", e);
                format!("Clear failed: {}", e)
            }
        },
        _ => String::new(),
    }
}

/// Read commands from stdin on a plain thread and forward intents.
///
/// The thread ends on EOF, on `quit`, or once the receiving side is gone.
pub fn spawn_stdin_reader(
    intent_tx: async_channel::Sender<UserIntent>,
    state: Arc<AppState>,
    history: Option<History>,
    recent_limit: u32,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            println!("{}", HELP);
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                };

                let intent = match parse_command(&line) {
                    Ok(ConsoleCommand::Intent(intent)) => intent,
                    Ok(ConsoleCommand::History) => {
                        print_history(history.as_ref(), recent_limit);
                        continue;
                    }
                    Ok(command @ (ConsoleCommand::Export(_) | ConsoleCommand::Clear)) => {
                        println!("{}", manage_history(history.as_ref(), &command));
                        continue;
                    }
                    Ok(ConsoleCommand::Status) => {
                        println!("{}", state.summary());
                        continue;
                    }
                    Ok(ConsoleCommand::Help) => {
                        println!("{}", HELP);
                        continue;
                    }
                    Err(message) => {
                        if !message.is_empty() {
                            println!("{}", message);
                        }
                        continue;
                    }
                };

                let quit = intent == UserIntent::Quit;
                if intent_tx.send_blocking(intent).is_err() {
                    debug!("Intent channel closed");
                    break;
                }
                if quit {
                    break;
                }
            }
            // EOF behaves like quit.
            let _ = intent_tx.send_blocking(UserIntent::Quit);
        })
}
