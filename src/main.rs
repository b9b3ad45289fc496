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

//! Reflex Link terminal application

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reflex_link::bluetooth::{BluerCentral, LinkInput, LinkManager};
use reflex_link::config::Config;
use reflex_link::events::EventProcessor;
use reflex_link::state::AppState;
use reflex_link::storage::{History, NullRecorder, Recorder};
use reflex_link::ui::{self, ConsolePresenter, UserIntent};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with game output.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reflex_link=info".parse()?),
        )
        .init();

    info!("Starting Reflex Link v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Initialize storage
    let history = if config.history.enabled {
        let mut history = History::new(&config.data_dir)?;
        history.set_max_entries(config.history.max_entries);
        info!("History storage initialized");
        Some(history)
    } else {
        info!("History disabled");
        None
    };
    let recorder: Box<dyn Recorder> = match &history {
        Some(history) => Box::new(history.clone()),
        None => Box::new(NullRecorder),
    };

    // Create application state
    let state = AppState::new();

    // Link inputs from bluer tasks, intents from the terminal.
    let (link_tx, link_rx) = tokio::sync::mpsc::channel::<LinkInput>(64);
    let (intent_tx, intent_rx) = async_channel::unbounded::<UserIntent>();

    let central = BluerCentral::open(
        &config.bluetooth.adapter,
        config.bluetooth.services_timeout(),
        link_tx,
        state.clone(),
    )
    .await;

    let link = LinkManager::new(
        config.bluetooth.target_filter()?,
        config.bluetooth.auto_reconnect,
        config.bluetooth.rescan_delay(),
    );
    let processor = EventProcessor::new(
        link,
        Box::new(central),
        recorder,
        Box::new(ConsolePresenter::new()),
        state.clone(),
    );

    ui::spawn_stdin_reader(
        intent_tx.clone(),
        state.clone(),
        history,
        config.history.recent_limit,
    )?;

    let ctrl_c_tx = intent_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(UserIntent::Quit).await;
        }
    });

    // Start scanning right away.
    if intent_tx.send(UserIntent::Connect).await.is_err() {
        warn!("Intent channel closed before startup");
    }

    info!("Ready. Type 'help' for commands.");
    processor.run(link_rx, intent_rx).await?;

    // Give the spawned BlueZ disconnect a moment before the runtime goes away.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    info!("Shutting down...");
    Ok(())
}
