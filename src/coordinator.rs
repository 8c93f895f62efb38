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

//! Connection coordinator.
//!
//! Owns the single link to one bed: connect with retry and backoff, the
//! command serialization lock, cancellation, the idle-disconnect timer and
//! auto-reconnect after unexpected link loss. Every outbound write goes
//! through [`BedCoordinator::execute`].

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bluetooth::{ConnectionParams, Link, LinkService};
use crate::commands::{Command, Direction, LightAction, MassageZone, Motor, Preset, Side};
use crate::config::TimingConfig;
use crate::controller::{BedController, PacketSink, Response};
use crate::diagnostics::{DiagnosticsCapture, FrameDirection};
use crate::error::{BedError, Result};
use crate::events::BedEvent;
use crate::protocol::{Codec, Decoded, Packet, PositionReading};
use crate::state::{ConnectionSession, LinkState};

/// Buffered events per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 64;

type DiagnosticsSlot = Arc<RwLock<Option<Arc<DiagnosticsCapture>>>>;

/// Coordinates all traffic to one bed.
pub struct BedCoordinator {
    service: Arc<dyn LinkService>,
    controller: Arc<BedController>,
    session: Arc<ConnectionSession>,
    link: Mutex<Option<Arc<dyn Link>>>,
    connect_lock: tokio::sync::Mutex<()>,
    /// FIFO; held for the whole of each command.
    command_lock: tokio::sync::Mutex<()>,
    cancel: Mutex<CancellationToken>,
    idle_timer: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<BedEvent>,
    diagnostics: DiagnosticsSlot,
    this: Weak<Self>,
}

/// Held while a command runs. The idle timer stays off until it drops.
struct CommandGuard<'a> {
    coordinator: &'a BedCoordinator,
    _lock: tokio::sync::MutexGuard<'a, ()>,
}

impl Drop for CommandGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.session.touch();
        self.coordinator.arm_idle_timer();
    }
}

/// Writes packets over the current link with timeout and retry.
struct LinkSink<'a> {
    link: Arc<dyn Link>,
    timing: &'a TimingConfig,
    codec: &'a Codec,
    session: &'a ConnectionSession,
    diagnostics: Option<Arc<DiagnosticsCapture>>,
}

#[async_trait]
impl PacketSink for LinkSink<'_> {
    async fn send(&self, packet: &Packet, token: &CancellationToken) -> Result<()> {
        let attempts = self.timing.write_attempts.max(1);
        let characteristic = packet.characteristic();
        let mut last_error = BedError::WriteTimeout { characteristic };

        for attempt in 1..=attempts {
            let write = self.link.write(characteristic, packet.bytes());
            match tokio::time::timeout(self.timing.write_timeout(), write).await {
                Ok(Ok(())) => {
                    debug!("TX {} -> {}", packet.hex(), characteristic);
                    if let Some(capture) = &self.diagnostics {
                        let label = self.codec.recognize(packet.bytes()).map(|c| c.to_string());
                        capture.record(FrameDirection::Outbound, characteristic, packet.bytes(), label);
                    }
                    self.session.touch();
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("Write to {} failed (attempt {}/{}): {}", characteristic, attempt, attempts, e);
                    last_error = e;
                }
                Err(_) => {
                    warn!("Write to {} timed out (attempt {}/{})", characteristic, attempt, attempts);
                    last_error = BedError::WriteTimeout { characteristic };
                }
            }
            if token.is_cancelled() {
                break;
            }
        }
        Err(last_error)
    }
}

impl BedCoordinator {
    pub fn new(service: Arc<dyn LinkService>, controller: Arc<BedController>) -> Arc<Self> {
        let session = ConnectionSession::new(controller.config().address.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|this| Self {
            service,
            controller,
            session,
            link: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            command_lock: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancellationToken::new()),
            idle_timer: Mutex::new(None),
            events,
            diagnostics: Arc::new(RwLock::new(None)),
            this: this.clone(),
        })
    }

    pub fn address(&self) -> &str {
        self.session.address()
    }

    pub fn controller(&self) -> &Arc<BedController> {
        &self.controller
    }

    pub fn session(&self) -> &Arc<ConnectionSession> {
        &self.session
    }

    pub fn state(&self) -> LinkState {
        self.session.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.session.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BedEvent> {
        self.events.subscribe()
    }

    /// Tap every raw frame in and out. Pass `None` to detach.
    pub fn attach_diagnostics(&self, capture: Option<Arc<DiagnosticsCapture>>) {
        *self.diagnostics.write() = capture;
    }

    pub fn diagnostics(&self) -> Option<Arc<DiagnosticsCapture>> {
        self.diagnostics.read().clone()
    }

    fn timing(&self) -> &TimingConfig {
        &self.controller.config().timing
    }

    fn set_state(&self, next: LinkState) {
        self.session.set_state(next);
        let _ = self.events.send(BedEvent::LinkStateChanged { state: next });
    }

    fn current_link(&self) -> Option<Arc<dyn Link>> {
        self.link.lock().clone()
    }

    /// Open the link if it is not already up.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.current_link().is_some() {
            return Ok(());
        }
        // A PIN-gated bed without a PIN is a configuration problem, not a radio one.
        let pin = self.controller.pin_packet()?;

        let timing = self.timing();
        let max_attempts = timing.max_connect_attempts.max(1);
        let address = self.address().to_string();
        let mut last_error = String::new();

        self.session.reset_retries();
        self.set_state(LinkState::Connecting);

        for attempt in 1..=max_attempts {
            self.session.record_attempt();
            info!("Connecting to {} (attempt {}/{})", address, attempt, max_attempts);

            match tokio::time::timeout(timing.connect_timeout(), self.service.connect(&address))
                .await
            {
                Ok(Ok(link)) => return self.on_link_up(link, pin).await,
                Ok(Err(e)) => {
                    warn!("Connection to {} failed: {}", address, e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!("Connection to {} timed out", address);
                    last_error = format!("timed out after {:?}", timing.connect_timeout());
                }
            }

            if attempt < max_attempts {
                let delay = timing.retry_delay(attempt);
                debug!("Retrying {} in {:?}", address, delay);
                tokio::time::sleep(delay).await;
            }
        }

        self.set_state(LinkState::Disconnected);
        error!("Giving up on {} after {} attempts", address, max_attempts);
        Err(BedError::ConnectionFailure {
            address,
            attempts: max_attempts,
            reason: last_error,
        })
    }

    async fn on_link_up(&self, link: Arc<dyn Link>, pin: Option<Packet>) -> Result<()> {
        if let Err(e) = link.set_connection_params(ConnectionParams::conservative()).await {
            warn!("Could not apply connection parameters: {}", e);
        }

        let generation = self.session.bump_generation();
        *self.link.lock() = Some(link.clone());
        self.session.reset_retries();
        self.session.set_rssi(link.rssi().await);
        self.session.touch();
        self.controller.on_connected();
        self.set_state(LinkState::Connected);
        info!("Connected to {} ({})", self.address(), self.controller.id());

        self.start_notification_pumps(&link).await;
        self.watch_link(link.clone(), generation);

        if let Some(pin) = pin {
            debug!("Sending PIN");
            let sink = self.sink(link);
            if let Err(e) = sink.send(&pin, &CancellationToken::new()).await {
                warn!("PIN write failed, dropping link: {}", e);
                let _ = self.teardown().await;
                return Err(e);
            }
        }

        // A running command re-arms the timer when it releases the lock.
        if self.command_lock.try_lock().is_ok() {
            self.arm_idle_timer();
        }
        Ok(())
    }

    async fn start_notification_pumps(&self, link: &Arc<dyn Link>) {
        for characteristic in self.controller.notify_characteristics() {
            match link.subscribe(*characteristic).await {
                Ok(rx) => {
                    tokio::spawn(pump_notifications(
                        *characteristic,
                        rx,
                        self.controller.clone(),
                        self.events.clone(),
                        self.diagnostics.clone(),
                    ));
                }
                Err(e) => warn!("Subscribe to {} failed: {}", characteristic, e),
            }
        }
    }

    /// React to the link going away underneath us.
    fn watch_link(&self, link: Arc<dyn Link>, generation: u64) {
        let this = self.this.clone();
        tokio::spawn(async move {
            link.closed().await;
            let Some(this) = this.upgrade() else {
                return;
            };
            if this.session.is_intentional() || this.session.generation() != generation {
                debug!("Link to {} closed on request", this.address());
                return;
            }

            warn!("Link to {} lost", this.address());
            this.link.lock().take();
            this.abort_idle_timer();
            this.set_state(LinkState::Disconnected);

            if this.controller.config().auto_reconnect {
                info!("Reconnecting to {}", this.address());
                if let Err(e) = this.connect().await {
                    error!("Reconnect to {} failed: {}", this.address(), e);
                }
            }
        });
    }

    fn sink(&self, link: Arc<dyn Link>) -> LinkSink<'_> {
        LinkSink {
            link,
            timing: self.timing(),
            codec: self.controller.codec(),
            session: &self.session,
            diagnostics: self.diagnostics(),
        }
    }

    async fn acquire(&self) -> CommandGuard<'_> {
        let lock = self.command_lock.lock().await;
        self.abort_idle_timer();
        CommandGuard {
            coordinator: self,
            _lock: lock,
        }
    }

    async fn ensure_connected(&self) -> Result<Arc<dyn Link>> {
        if let Some(link) = self.current_link() {
            return Ok(link);
        }
        self.connect().await?;
        self.current_link().ok_or(BedError::NotConnected)
    }

    fn arm_idle_timer(&self) {
        let timeout = self.timing().idle_timeout();
        let mut slot = self.idle_timer.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        if timeout.is_zero() || self.link.lock().is_none() {
            return;
        }

        let this = self.this.clone();
        let generation = self.session.generation();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(this) = this.upgrade() {
                this.idle_disconnect(generation).await;
            }
        }));
    }

    fn abort_idle_timer(&self) {
        if let Some(handle) = self.idle_timer.lock().take() {
            handle.abort();
        }
    }

    async fn idle_disconnect(&self, generation: u64) {
        // Detach our own handle so teardown cannot abort this task.
        self.idle_timer.lock().take();

        let Ok(_lock) = self.command_lock.try_lock() else {
            debug!("Command in flight, idle timer ignored");
            return;
        };
        if self.session.generation() != generation || self.current_link().is_none() {
            return;
        }

        info!(
            "{} idle for {:?}, disconnecting",
            self.address(),
            self.session.idle_for()
        );
        self.set_state(LinkState::Idle);
        if let Err(e) = self.teardown().await {
            warn!("Idle disconnect of {} failed: {}", self.address(), e);
        }
    }

    /// Intentional disconnect. The flag keeps the link watcher from
    /// reconnecting and is cleared whether or not the watcher fired.
    async fn teardown(&self) -> Result<()> {
        let Some(link) = self.link.lock().take() else {
            self.set_state(LinkState::Disconnected);
            return Ok(());
        };
        self.abort_idle_timer();
        self.session.set_intentional(true);
        self.session.bump_generation();
        self.set_state(LinkState::Disconnecting);

        let result = link.disconnect().await;

        self.set_state(LinkState::Disconnected);
        self.session.set_intentional(false);
        result
    }

    /// Wait for any running command, then drop the link.
    pub async fn disconnect(&self) -> Result<()> {
        let _lock = self.command_lock.lock().await;
        info!("Disconnecting from {}", self.address());
        self.teardown().await
    }

    /// Cancel the running command and everything already queued.
    pub fn cancel_current(&self) {
        let mut token = self.cancel.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Run one command with the link held exclusively.
    pub async fn execute(&self, command: Command) -> Result<Response> {
        let token = self.cancel.lock().clone();
        self.controller.check(&command)?;

        let _guard = self.acquire().await;
        // Toggles read state committed by the commands queued ahead of this one.
        let plan = self.controller.plan(&command)?;
        let link = self.ensure_connected().await?;
        let sink = self.sink(link);

        for packet in self.controller.take_init_packets() {
            sink.send(&packet, &CancellationToken::new()).await?;
        }

        // Subscribe before the query goes out so the answer cannot slip past.
        let mut events = self.events.subscribe();
        debug!(
            "Executing {} ({} packet(s) x{})",
            command,
            plan.packets.len(),
            plan.repeat.count
        );
        let response = self.controller.run_plan(&plan, &sink, &token).await?;

        match command {
            Command::PositionQuery => {
                let expected = plan.packets.len().max(1);
                self.await_positions(&mut events, expected).await;
                Ok(Response::Positions(self.controller.positions()))
            }
            Command::CapabilityQuery => {
                self.await_features(&mut events).await;
                self.controller
                    .features()
                    .map(Response::Features)
                    .ok_or_else(|| BedError::decode("no capability report received"))
            }
            _ => Ok(response),
        }
    }

    async fn await_positions(&self, events: &mut broadcast::Receiver<BedEvent>, expected: usize) {
        let wait = async {
            let mut seen = 0;
            while seen < expected {
                match events.recv().await {
                    Ok(BedEvent::Positions { .. }) => seen += 1,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        if tokio::time::timeout(self.timing().position_timeout(), wait)
            .await
            .is_err()
        {
            debug!("Position query timed out, returning cached readings");
        }
    }

    async fn await_features(&self, events: &mut broadcast::Receiver<BedEvent>) {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(BedEvent::Features { .. }) | Err(broadcast::error::RecvError::Closed) => {
                        break
                    }
                    _ => {}
                }
            }
        };
        let _ = tokio::time::timeout(self.timing().position_timeout(), wait).await;
    }

    pub async fn move_motor(&self, motor: Motor, direction: Direction) -> Result<Response> {
        self.execute(Command::motor(motor, direction)).await
    }

    /// Cancel whatever is running, then send Stop as soon as the lock frees.
    pub async fn stop_all(&self) -> Result<Response> {
        self.cancel_current();
        self.execute(Command::Stop).await
    }

    pub async fn goto_preset(&self, preset: Preset) -> Result<Response> {
        self.execute(Command::preset(preset)).await
    }

    pub async fn save_preset(&self, slot: u8) -> Result<Response> {
        self.execute(Command::SavePreset { slot }).await
    }

    pub async fn toggle_massage(&self, zone: MassageZone) -> Result<Response> {
        self.execute(Command::MassageToggle { zone }).await
    }

    pub async fn set_light(&self, action: LightAction) -> Result<Response> {
        self.execute(Command::Light { action }).await
    }

    pub async fn cycle_fan(&self, side: Side) -> Result<Response> {
        self.execute(Command::FanCycle { side }).await
    }

    pub async fn query_position(&self) -> Result<Vec<PositionReading>> {
        match self.execute(Command::PositionQuery).await? {
            Response::Positions(readings) => Ok(readings),
            _ => Ok(self.controller.positions()),
        }
    }
}

impl Drop for BedCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.idle_timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Feed one characteristic's notifications through the decoder until the
/// link closes the channel.
async fn pump_notifications(
    characteristic: Uuid,
    rx: async_channel::Receiver<Vec<u8>>,
    controller: Arc<BedController>,
    events: broadcast::Sender<BedEvent>,
    diagnostics: DiagnosticsSlot,
) {
    while let Ok(data) = rx.recv().await {
        debug!("RX {} <- {}", hex::encode(&data), characteristic);
        let capture = diagnostics.read().clone();
        if let Some(capture) = capture {
            capture.record(FrameDirection::Inbound, characteristic, &data, None);
        }

        match controller.decode(characteristic, &data) {
            Ok(Decoded::Positions(readings)) => {
                let _ = events.send(BedEvent::Positions { readings });
            }
            Ok(Decoded::Features(features)) => {
                let _ = events.send(BedEvent::Features { features });
            }
            Ok(Decoded::Ignored) => {}
            Err(e) => {
                warn!("Dropping notification on {}: {}", characteristic, e);
                let _ = events.send(BedEvent::DecodeFailed {
                    characteristic,
                    error: e.to_string(),
                });
            }
        }
    }
    debug!("Notifications on {} ended", characteristic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::ble_constants::{FFE4_NOTIFY_UUID, LINAK_POSITION_LEG_UUID};
    use crate::bluetooth::MockLinkService;
    use crate::config::BedConfig;
    use crate::protocol::ProtocolId;
    use std::time::Duration;

    fn coordinator(
        protocol: ProtocolId,
        tweak: impl FnOnce(&mut BedConfig),
    ) -> (Arc<MockLinkService>, Arc<BedCoordinator>) {
        let mut config = BedConfig::new("AA:BB:CC:DD:EE:01", protocol);
        tweak(&mut config);
        let mock = MockLinkService::new();
        let controller = Arc::new(BedController::new(protocol, Arc::new(config)));
        let coordinator = BedCoordinator::new(mock.clone(), controller);
        (mock, coordinator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_command_connects() {
        let (mock, bed) = coordinator(ProtocolId::Keeson, |_| {});
        assert_eq!(bed.state(), LinkState::Disconnected);

        let response = bed.goto_preset(Preset::Flat).await.unwrap();
        assert_eq!(response, Response::Done);
        assert_eq!(bed.state(), LinkState::Connected);
        assert_eq!(mock.connect_attempts(), 1);
        assert_eq!(
            mock.connection_params(),
            Some(ConnectionParams::conservative())
        );
        assert_eq!(mock.written_bytes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_command_never_connects() {
        let (mock, bed) = coordinator(ProtocolId::LeggettGen2, |_| {});
        let err = bed.move_motor(Motor::Head, Direction::Up).await.unwrap_err();
        assert!(matches!(err, BedError::UnsupportedCapability { .. }));
        assert_eq!(mock.connect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_toggles_build_on_each_other() {
        let (mock, bed) = coordinator(ProtocolId::Jensen, |_| {});
        let mover = bed.clone();
        let running =
            tokio::spawn(async move { mover.move_motor(Motor::Head, Direction::Up).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut presses = Vec::new();
        for _ in 0..2 {
            let bed = bed.clone();
            presses.push(tokio::spawn(async move { bed.cycle_fan(Side::Left).await }));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        running.await.unwrap().unwrap();
        for press in presses {
            press.await.unwrap().unwrap();
        }

        let fan_writes: Vec<Vec<u8>> = mock
            .written_bytes()
            .into_iter()
            .filter(|bytes| bytes[0] == 0x14)
            .collect();
        assert_eq!(
            fan_writes,
            vec![vec![0x14, 1, 0, 0, 0, 0], vec![0x14, 2, 0, 0, 0, 0]]
        );
        assert_eq!(bed.controller().fan_levels(), (2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pin_fails_before_connecting() {
        let (mock, bed) = coordinator(ProtocolId::Octo, |_| {});
        assert!(matches!(
            bed.connect().await,
            Err(BedError::AuthenticationRequired { .. })
        ));
        assert_eq!(mock.connect_attempts(), 0);

        let (mock, bed) = coordinator(ProtocolId::Octo, |c| c.pin = Some("1234".into()));
        bed.connect().await.unwrap();
        let writes = mock.written_bytes();
        assert_eq!(writes.len(), 1);
        assert_eq!(&writes[0][1..3], &[0x20, 0x43]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_sequence_once_per_connection() {
        let (mock, bed) = coordinator(ProtocolId::OkinNordic, |_| {});
        bed.goto_preset(Preset::Flat).await.unwrap();
        bed.goto_preset(Preset::Flat).await.unwrap();
        assert_eq!(mock.written_bytes().len(), 4);

        bed.disconnect().await.unwrap();
        mock.clear_writes();
        bed.goto_preset(Preset::Flat).await.unwrap();
        assert_eq!(mock.written_bytes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_position_query() {
        let (mock, bed) = coordinator(ProtocolId::Linak, |_| {});
        bed.connect().await.unwrap();

        let notifier = mock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            notifier.notify(LINAK_POSITION_LEG_UUID, &274u16.to_le_bytes());
        });

        let readings = bed.query_position().await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].motor, Motor::Legs);
        assert!((readings[0].angle - 22.5).abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_notification_keeps_session() {
        let (mock, bed) = coordinator(ProtocolId::Ergomotion, |_| {});
        let mut events = bed.subscribe_events();
        bed.connect().await.unwrap();

        assert!(mock.notify(FFE4_NOTIFY_UUID, &[0xED, 0x01]));
        let failure = loop {
            match events.recv().await.unwrap() {
                BedEvent::DecodeFailed { characteristic, .. } => break characteristic,
                _ => continue,
            }
        };
        assert_eq!(failure, FFE4_NOTIFY_UUID);
        assert_eq!(bed.state(), LinkState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagnostics_capture_labels_frames() {
        let (_mock, bed) = coordinator(ProtocolId::Keeson, |_| {});
        let capture = DiagnosticsCapture::new(16);
        bed.attach_diagnostics(Some(capture.clone()));

        bed.goto_preset(Preset::Flat).await.unwrap();
        let frames = capture.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].direction, FrameDirection::Outbound);
        assert!(frames[0].label.is_some());
    }
}
