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

//! BlueZ GATT central driving the micro:bit connection.

use anyhow::{bail, Result};
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{Adapter, AdapterEvent, Device, DeviceEvent, DeviceProperty};
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ble_constants::{CCCD_UUID, UART_NOTIFY_UUID, UART_SERVICE_UUID, UART_WRITE_UUID};
use super::driver::LinkDriver;
use super::error::DiscoveryError;
use super::link::{
    AttemptId, Candidate, LinkAction, LinkInput, NotifyChannel, SubscribeMode, UartProfile,
    WriteChannel, WriteMode,
};
use super::protocol::{decode, Command, TaggedEvent};
use crate::state::AppState;

/// Poll interval while waiting for BlueZ to resolve services.
const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Characteristics of the current connection.
#[derive(Clone)]
struct UartCharacteristics {
    attempt: AttemptId,
    write: Characteristic,
    notify: Characteristic,
}

/// One queued write.
#[derive(Debug)]
struct OutboundFrame {
    command: Command,
    payload: Vec<u8>,
    mode: WriteMode,
}

/// Which connection attempt the driver currently owns.
///
/// A connect that completes after its attempt was released has no owner
/// and must be torn down by the task that finished it.
#[derive(Debug, Clone, Default)]
struct ConnectionOwner(Arc<Mutex<Option<AttemptId>>>);

impl ConnectionOwner {
    fn claim(&self, attempt: AttemptId) {
        *self.0.lock() = Some(attempt);
    }

    fn release(&self) {
        *self.0.lock() = None;
    }

    fn owns(&self, attempt: AttemptId) -> bool {
        *self.0.lock() == Some(attempt)
    }
}

/// [`LinkDriver`] backed by bluer.
///
/// Actions run on tokio tasks and report back through the link input
/// channel. Writes go through one writer task per connection so frames
/// reach BlueZ in the order they were issued.
pub struct BluerCentral {
    adapter: Option<Adapter>,
    unavailable_reason: String,
    services_timeout: Duration,
    input_tx: mpsc::Sender<LinkInput>,
    state: Arc<AppState>,
    device: Option<(AttemptId, Device)>,
    owner: ConnectionOwner,
    characteristics: Arc<Mutex<Option<UartCharacteristics>>>,
    scan_task: Option<JoinHandle<()>>,
    watch_task: Option<JoinHandle<()>>,
    notify_task: Option<JoinHandle<()>>,
    writer: Option<(AttemptId, mpsc::UnboundedSender<OutboundFrame>)>,
    writer_task: Option<JoinHandle<()>>,
}

impl BluerCentral {
    /// Open the adapter. Failure is not fatal: scanning reports the adapter
    /// as unavailable instead.
    pub async fn open(
        adapter_name: &str,
        services_timeout: Duration,
        input_tx: mpsc::Sender<LinkInput>,
        state: Arc<AppState>,
    ) -> Self {
        let (adapter, unavailable_reason) = match open_adapter(adapter_name).await {
            Ok(adapter) => (Some(adapter), String::new()),
            Err(e) => {
                error!("Bluetooth adapter unavailable: {}", e);
                (None, e.to_string())
            }
        };

        Self {
            adapter,
            unavailable_reason,
            services_timeout,
            input_tx,
            state,
            device: None,
            owner: ConnectionOwner::default(),
            characteristics: Arc::new(Mutex::new(None)),
            scan_task: None,
            watch_task: None,
            notify_task: None,
            writer: None,
            writer_task: None,
        }
    }

    fn report(&self, input: LinkInput) {
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(input).await;
        });
    }

    fn start_scan(&mut self, delay: Duration) {
        stop(&mut self.scan_task);

        let Some(adapter) = self.adapter.clone() else {
            self.report(LinkInput::AdapterUnavailable(self.unavailable_reason.clone()));
            return;
        };
        let tx = self.input_tx.clone();

        self.scan_task = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = scan(&adapter, &tx).await {
                warn!("Scan failed: {}", e);
                let _ = tx.send(LinkInput::AdapterUnavailable(e.to_string())).await;
            }
        }));
    }

    fn connect(&mut self, attempt: AttemptId, candidate: Candidate) {
        let Some(adapter) = self.adapter.as_ref() else {
            self.report(LinkInput::AdapterUnavailable(self.unavailable_reason.clone()));
            return;
        };
        let device = match adapter.device(candidate.address) {
            Ok(device) => device,
            Err(e) => {
                self.report(LinkInput::ConnectFailed {
                    attempt,
                    reason: e.to_string(),
                });
                return;
            }
        };

        self.release_connection();
        self.device = Some((attempt, device.clone()));
        self.owner.claim(attempt);

        let tx = self.input_tx.clone();
        self.watch_task = Some(tokio::spawn(watch_device(device.clone(), attempt, tx.clone())));

        let owner = self.owner.clone();
        tokio::spawn(async move {
            info!("Connecting to {}", candidate.address);
            let result = device.connect().await.map_err(|e| e.to_string());
            match settle_connect(&owner, attempt, result) {
                Some(input) => {
                    let _ = tx.send(input).await;
                }
                None => {
                    info!(
                        "Attempt {} was abandoned, dropping connection to {}",
                        attempt, candidate.address
                    );
                    if let Err(e) = device.disconnect().await {
                        debug!("Disconnect: {}", e);
                    }
                }
            }
        });
    }

    fn discover_services(&mut self, attempt: AttemptId) {
        let Some(device) = self.device_for(attempt) else {
            return;
        };
        let slot = self.characteristics.clone();
        let timeout = self.services_timeout;
        let tx = self.input_tx.clone();

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, resolve_uart(&device)).await {
                Ok(Ok((profile, write, notify))) => {
                    *slot.lock() = Some(UartCharacteristics {
                        attempt,
                        write,
                        notify,
                    });
                    Ok(profile)
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(DiscoveryError::Timeout),
            };
            let _ = tx.send(LinkInput::ServicesResolved { attempt, result }).await;
        });
    }

    fn subscribe(&mut self, attempt: AttemptId, mode: SubscribeMode) {
        let Some(uart) = self.characteristics_for(attempt) else {
            return;
        };
        stop(&mut self.notify_task);
        self.start_writer(attempt, uart.write.clone());

        let tx = self.input_tx.clone();
        let state = self.state.clone();

        self.notify_task = Some(tokio::spawn(async move {
            // BlueZ writes the CCCD itself and picks indication when that is
            // the only capability offered.
            debug!("Enabling {:?} via CCCD {}", mode, CCCD_UUID);
            let stream = match uart.notify.notify().await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx
                        .send(LinkInput::Subscribed {
                            attempt,
                            result: Err(e.to_string()),
                        })
                        .await;
                    return;
                }
            };
            if tx
                .send(LinkInput::Subscribed {
                    attempt,
                    result: Ok(()),
                })
                .await
                .is_err()
            {
                return;
            }

            pin_mut!(stream);
            while let Some(value) = stream.next().await {
                let event = TaggedEvent::new(state.get_mode(), decode(&value));
                debug!("Received {:?}", event.event);
                if tx
                    .send(LinkInput::Notification { attempt, event })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            debug!("Notification stream of attempt {} ended", attempt);
        }));
    }

    fn start_writer(&mut self, attempt: AttemptId, characteristic: Characteristic) {
        stop(&mut self.writer_task);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        self.writer = Some((attempt, frame_tx));
        self.writer_task = Some(tokio::spawn(write_frames(
            attempt,
            frame_rx,
            self.input_tx.clone(),
            move |payload, mode| {
                let characteristic = characteristic.clone();
                async move {
                    let mut request = CharacteristicWriteRequest::default();
                    request.op_type = match mode {
                        WriteMode::WithoutResponse => WriteOp::Command,
                        WriteMode::WithResponse => WriteOp::Request,
                    };
                    characteristic
                        .write_ext(&payload, &request)
                        .await
                        .map_err(|e| e.to_string())
                }
            },
        )));
    }

    fn write(&mut self, attempt: AttemptId, command: Command, payload: Vec<u8>, mode: WriteMode) {
        let frame = OutboundFrame {
            command,
            payload,
            mode,
        };
        let queued = match &self.writer {
            Some((current, frame_tx)) if *current == attempt => frame_tx.send(frame).is_ok(),
            _ => false,
        };
        if !queued {
            self.report(LinkInput::WriteFailed {
                attempt,
                command,
                reason: "no write characteristic".to_string(),
            });
        }
    }

    fn disconnect(&mut self, attempt: AttemptId) {
        let device = self.device_for(attempt);
        self.release_connection();
        if let Some(device) = device {
            tokio::spawn(async move {
                if let Err(e) = device.disconnect().await {
                    debug!("Disconnect: {}", e);
                }
            });
        }
    }

    fn release_connection(&mut self) {
        self.owner.release();
        stop(&mut self.watch_task);
        stop(&mut self.notify_task);
        stop(&mut self.writer_task);
        self.writer = None;
        *self.characteristics.lock() = None;
        self.device = None;
    }

    fn device_for(&self, attempt: AttemptId) -> Option<Device> {
        match &self.device {
            Some((current, device)) if *current == attempt => Some(device.clone()),
            _ => {
                debug!("No device for attempt {}", attempt);
                None
            }
        }
    }

    fn characteristics_for(&self, attempt: AttemptId) -> Option<UartCharacteristics> {
        self.characteristics
            .lock()
            .as_ref()
            .filter(|uart| uart.attempt == attempt)
            .cloned()
    }
}

impl LinkDriver for BluerCentral {
    fn execute(&mut self, action: LinkAction) {
        match action {
            LinkAction::StartScan { delay } => self.start_scan(delay),
            LinkAction::StopScan => stop(&mut self.scan_task),
            LinkAction::Connect { attempt, candidate } => self.connect(attempt, candidate),
            LinkAction::DiscoverServices { attempt } => self.discover_services(attempt),
            LinkAction::Subscribe { attempt, mode } => self.subscribe(attempt, mode),
            LinkAction::Write {
                attempt,
                command,
                payload,
                mode,
            } => self.write(attempt, command, payload, mode),
            LinkAction::Disconnect { attempt } => self.disconnect(attempt),
        }
    }

    fn shutdown(&mut self) {
        stop(&mut self.scan_task);
        self.release_connection();
    }
}

/// Input to report for a finished connect, or `None` when the attempt was
/// released meanwhile and the connection must be dropped.
fn settle_connect(
    owner: &ConnectionOwner,
    attempt: AttemptId,
    result: std::result::Result<(), String>,
) -> Option<LinkInput> {
    match result {
        Ok(()) if owner.owns(attempt) => Some(LinkInput::Connected { attempt }),
        Ok(()) => None,
        Err(reason) => Some(LinkInput::ConnectFailed { attempt, reason }),
    }
}

/// Write queued frames one at a time, reporting failures.
async fn write_frames<F, Fut>(
    attempt: AttemptId,
    mut frames: mpsc::UnboundedReceiver<OutboundFrame>,
    tx: mpsc::Sender<LinkInput>,
    mut write: F,
) where
    F: FnMut(Vec<u8>, WriteMode) -> Fut,
    Fut: Future<Output = std::result::Result<(), String>>,
{
    while let Some(frame) = frames.recv().await {
        debug!("Writing {} ({:?})", frame.command, frame.mode);
        if let Err(reason) = write(frame.payload, frame.mode).await {
            let failed = LinkInput::WriteFailed {
                attempt,
                command: frame.command,
                reason,
            };
            if tx.send(failed).await.is_err() {
                break;
            }
        }
    }
    debug!("Writer of attempt {} stopped", attempt);
}

fn stop(task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = task.take() {
        task.abort();
    }
}

async fn open_adapter(name: &str) -> Result<Adapter> {
    let session = bluer::Session::new().await?;
    let adapter = if name.is_empty() {
        session.default_adapter().await?
    } else {
        session.adapter(name)?
    };
    info!("Using Bluetooth adapter: {}", adapter.name());

    if !adapter.is_powered().await? {
        info!("Powering on Bluetooth adapter...");
        adapter.set_powered(true).await?;
    }
    Ok(adapter)
}

async fn scan(adapter: &Adapter, tx: &mpsc::Sender<LinkInput>) -> Result<()> {
    if !adapter.is_powered().await? {
        bail!("adapter {} is powered off", adapter.name());
    }

    info!("Scanning on {}", adapter.name());
    let events = adapter.discover_devices().await?;
    pin_mut!(events);

    while let Some(event) = events.next().await {
        let AdapterEvent::DeviceAdded(address) = event else {
            continue;
        };
        let name = match adapter.device(address) {
            Ok(device) => device.name().await.ok().flatten(),
            Err(_) => None,
        };
        if tx
            .send(LinkInput::CandidateFound(Candidate { address, name }))
            .await
            .is_err()
        {
            break;
        }
    }
    Ok(())
}

async fn watch_device(device: Device, attempt: AttemptId, tx: mpsc::Sender<LinkInput>) {
    let events = match device.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Cannot watch {}: {}", device.address(), e);
            return;
        }
    };
    pin_mut!(events);

    while let Some(DeviceEvent::PropertyChanged(property)) = events.next().await {
        if let DeviceProperty::Connected(false) = property {
            info!("{} dropped the connection", device.address());
            let _ = tx.send(LinkInput::PeerDisconnected { attempt }).await;
            break;
        }
    }
}

fn gatt_error(e: bluer::Error) -> DiscoveryError {
    DiscoveryError::Gatt(e.to_string())
}

async fn resolve_uart(
    device: &Device,
) -> Result<(UartProfile, Characteristic, Characteristic), DiscoveryError> {
    while !device.is_services_resolved().await.map_err(gatt_error)? {
        tokio::time::sleep(SERVICES_POLL_INTERVAL).await;
    }

    for service in device.services().await.map_err(gatt_error)? {
        if service.uuid().await.map_err(gatt_error)? != UART_SERVICE_UUID {
            continue;
        }

        let mut write = None;
        let mut notify = None;
        for characteristic in service.characteristics().await.map_err(gatt_error)? {
            let uuid = characteristic.uuid().await.map_err(gatt_error)?;
            if uuid != UART_WRITE_UUID && uuid != UART_NOTIFY_UUID {
                continue;
            }
            let flags = characteristic.flags().await.map_err(gatt_error)?;
            if uuid == UART_WRITE_UUID {
                let channel = WriteChannel {
                    uuid,
                    write: flags.write,
                    write_without_response: flags.write_without_response,
                };
                write = Some((channel, characteristic));
            } else {
                let channel = NotifyChannel {
                    uuid,
                    notify: flags.notify,
                    indicate: flags.indicate,
                };
                notify = Some((channel, characteristic));
            }
        }

        let (write_channel, write) = write.ok_or(DiscoveryError::WriteCharacteristicNotFound)?;
        let (notify_channel, notify) =
            notify.ok_or(DiscoveryError::NotifyCharacteristicNotFound)?;
        debug!(
            "UART resolved: write {:?}, subscribe {:?}",
            write_channel.write_mode(),
            notify_channel.subscribe_mode()
        );
        let profile = UartProfile {
            write: write_channel,
            notify: notify_channel,
        };
        return Ok((profile, write, notify));
    }

    Err(DiscoveryError::ServiceNotFound)
}
