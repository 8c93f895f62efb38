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

//! Bed controller.
//!
//! Turns capability requests into execution plans and runs them against a
//! [`PacketSink`]. The controller knows nothing about connection lifecycle;
//! the coordinator hands it a sink only while a link is up.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::commands::{Command, LightAction, MassageZone, Motor, RepeatPolicy, Side};
use crate::config::BedConfig;
use crate::error::{BedError, Result};
use crate::protocol::{
    Capabilities, Codec, Decoded, DeviceFeatures, MassageMap, Packet, PositionReading, ProtocolId,
};

/// Where planned packets go.
#[async_trait]
pub trait PacketSink: Send + Sync {
    /// Write one packet. `token` is checked between retries, never mid-write.
    async fn send(&self, packet: &Packet, token: &CancellationToken) -> Result<()>;
}

/// Controller-side state to commit once a plan has gone out in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Massage(Vec<MassageZone>),
    Fan { left: u8, right: u8 },
    Light(bool),
}

/// Packets for one command plus how to send them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub packets: Vec<Packet>,
    pub repeat: RepeatPolicy,
    /// Sent after the repeat loop under an independent token.
    pub stop: Option<Vec<Packet>>,
    pub effect: Option<Effect>,
    /// Re-encoded for every repeat after the first, and the stop re-encoded
    /// too, so counter-bearing frames never reuse a value.
    pub reframe: Option<Command>,
}

impl ExecutionPlan {
    fn single(packets: Vec<Packet>) -> Self {
        Self {
            packets,
            repeat: RepeatPolicy::SINGLE,
            stop: None,
            effect: None,
            reframe: None,
        }
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Done,
    /// The repeat loop stopped early; the stop packet still went out.
    Cancelled,
    Positions(Vec<PositionReading>),
    Features(DeviceFeatures),
}

/// Generic controller for any registered protocol.
pub struct BedController {
    codec: Codec,
    config: Arc<BedConfig>,
    massage: Mutex<Vec<MassageZone>>,
    fan: Mutex<(u8, u8)>,
    light_on: Mutex<bool>,
    init_pending: RwLock<bool>,
    positions: RwLock<BTreeMap<Motor, PositionReading>>,
    features: RwLock<Option<DeviceFeatures>>,
}

impl BedController {
    pub fn new(protocol: ProtocolId, config: Arc<BedConfig>) -> Self {
        Self {
            codec: Codec::new(protocol),
            config,
            massage: Mutex::new(Vec::new()),
            fan: Mutex::new((0, 0)),
            light_on: Mutex::new(false),
            init_pending: RwLock::new(false),
            positions: RwLock::new(BTreeMap::new()),
            features: RwLock::new(None),
        }
    }

    /// Build from a config that names its protocol.
    pub fn from_config(config: Arc<BedConfig>) -> Result<Self> {
        let protocol = config.protocol.ok_or_else(|| {
            BedError::UnknownProtocol(format!("no protocol configured for {}", config.address))
        })?;
        Ok(Self::new(protocol, config))
    }

    pub fn id(&self) -> ProtocolId {
        self.codec.id()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn config(&self) -> &BedConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.codec.descriptor().capabilities()
    }

    fn side(&self) -> Side {
        self.config.side
    }

    /// Characteristics to subscribe to after connecting.
    pub fn notify_characteristics(&self) -> &'static [Uuid] {
        self.codec.descriptor().notify
    }

    /// PIN frame to send right after connecting, if the protocol wants one.
    pub fn pin_packet(&self) -> Result<Option<Packet>> {
        if !self.codec.descriptor().requires_pin() {
            return Ok(None);
        }
        let pin = self
            .config
            .pin
            .as_deref()
            .ok_or(BedError::AuthenticationRequired {
                protocol: self.id(),
            })?;
        self.codec.pin_packet(pin)
    }

    /// A fresh link needs the init sequence again.
    pub fn on_connected(&self) {
        *self.init_pending.write() = true;
    }

    /// Init packets still owed on this connection; empty after the first call.
    pub fn take_init_packets(&self) -> Vec<Packet> {
        let mut pending = self.init_pending.write();
        if !*pending {
            return Vec::new();
        }
        *pending = false;
        self.codec.init_packets()
    }

    /// Discrete-only light families turn a toggle into on/off from tracked state.
    fn toggles_from_state(&self) -> bool {
        let lights = self.codec.descriptor().commands.lights;
        lights.toggle.is_none() && lights.on.is_some()
    }

    fn reframe(&self, command: &Command) -> Option<Command> {
        self.codec.is_counted().then(|| command.clone())
    }

    /// Reject what the bound protocol cannot do without encoding anything.
    ///
    /// Stateful toggles are only planned once earlier commands have
    /// committed; this is the check that may run before that.
    pub fn check(&self, command: &Command) -> Result<()> {
        match command {
            Command::Light {
                action: LightAction::Toggle,
            } if self.toggles_from_state() => self.codec.check(&Command::Light {
                action: LightAction::On,
            }),
            command => self.codec.check(command),
        }
    }

    pub fn stop_plan(&self) -> Result<ExecutionPlan> {
        Ok(ExecutionPlan::single(self.codec.stop_packets(self.side())?))
    }

    /// Resolve `command` into packets without touching the link.
    ///
    /// Fails fast on anything the bound protocol cannot do.
    pub fn plan(&self, command: &Command) -> Result<ExecutionPlan> {
        let side = self.side();
        let desc = self.codec.descriptor();

        match command {
            Command::Stop => self.stop_plan(),
            command if command.is_held() => Ok(ExecutionPlan {
                packets: self.codec.encode(command, side)?,
                repeat: desc
                    .motor_repeat
                    .unwrap_or_else(|| self.config.timing.motor_repeat()),
                stop: Some(self.codec.stop_packets(side)?),
                effect: None,
                reframe: self.reframe(command),
            }),
            Command::Preset { .. } => {
                let repeat = desc.preset_repeat.unwrap_or(RepeatPolicy::SINGLE);
                let stop = if repeat.is_multi_shot() {
                    Some(self.codec.stop_packets(side)?)
                } else {
                    None
                };
                Ok(ExecutionPlan {
                    packets: self.codec.encode(command, side)?,
                    repeat,
                    stop,
                    effect: None,
                    reframe: repeat.is_multi_shot().then(|| self.reframe(command)).flatten(),
                })
            }
            Command::SavePreset { .. } => {
                let packets = self.codec.encode(command, side)?;
                // Multi-step store sequences leave the controller in program mode.
                let stop = if packets.len() > 1 {
                    Some(self.codec.stop_packets(side)?)
                } else {
                    None
                };
                Ok(ExecutionPlan {
                    packets,
                    repeat: RepeatPolicy::SINGLE,
                    stop,
                    effect: None,
                    reframe: None,
                })
            }
            Command::MassageToggle { zone } => self.plan_massage(Some(*zone)),
            Command::MassageOff => self.plan_massage(None),
            Command::Light { action } => self.plan_light(*action),
            Command::FanCycle { side: fan_side } => self.plan_fan(*fan_side),
            Command::PositionQuery => {
                let packets = self.codec.position_query()?;
                let per_motor = !desc.commands.position_query.is_empty();
                let packets = if per_motor {
                    packets
                        .into_iter()
                        .take(self.config.motor_count.max(1) as usize)
                        .collect()
                } else {
                    packets
                };
                Ok(ExecutionPlan::single(packets))
            }
            _ => Ok(ExecutionPlan::single(self.codec.encode(command, side)?)),
        }
    }

    fn plan_massage(&self, zone: Option<MassageZone>) -> Result<ExecutionPlan> {
        let side = self.side();
        let MassageMap::Switched { zones, .. } = self.codec.descriptor().commands.massage else {
            let command = match zone {
                Some(zone) => Command::MassageToggle { zone },
                None => Command::MassageOff,
            };
            return Ok(ExecutionPlan::single(self.codec.encode(&command, side)?));
        };

        let current = self.massage.lock().clone();
        let next: Vec<MassageZone> = match zone {
            None => Vec::new(),
            Some(MassageZone::All) if current.is_empty() => {
                zones.iter().map(|(zone, _)| *zone).collect()
            }
            Some(MassageZone::All) => Vec::new(),
            Some(zone) if current.contains(&zone) => {
                current.into_iter().filter(|z| *z != zone).collect()
            }
            Some(zone) => {
                let mut next = current;
                next.push(zone);
                next
            }
        };
        let packet = self.codec.massage_packet(&next)?;
        Ok(ExecutionPlan::single(vec![packet]).with_effect(Effect::Massage(next)))
    }

    fn plan_light(&self, action: LightAction) -> Result<ExecutionPlan> {
        let side = self.side();
        let on = *self.light_on.lock();
        let (action, state) = match action {
            LightAction::On => (LightAction::On, true),
            LightAction::Off => (LightAction::Off, false),
            LightAction::Toggle if self.toggles_from_state() => {
                if on {
                    (LightAction::Off, false)
                } else {
                    (LightAction::On, true)
                }
            }
            LightAction::Toggle => (LightAction::Toggle, !on),
        };
        let packets = self.codec.encode(&Command::Light { action }, side)?;
        Ok(ExecutionPlan::single(packets).with_effect(Effect::Light(state)))
    }

    fn plan_fan(&self, fan_side: Side) -> Result<ExecutionPlan> {
        let max = self
            .codec
            .descriptor()
            .commands
            .fan
            .map(|fan| fan.max_level)
            .ok_or(BedError::UnsupportedCapability {
                protocol: self.id(),
                capability: "fan control",
            })?;
        let step = |level: u8| if level >= max { 0 } else { level + 1 };
        let (left, right) = *self.fan.lock();
        let (left, right) = match fan_side {
            Side::Left => (step(left), right),
            Side::Right => (left, step(right)),
            Side::Both => {
                let level = step(left.max(right));
                (level, level)
            }
        };
        let packet = self.codec.fan_packet(left, right)?;
        Ok(ExecutionPlan::single(vec![packet]).with_effect(Effect::Fan { left, right }))
    }

    fn apply(&self, effect: &Effect) {
        match effect {
            Effect::Massage(zones) => *self.massage.lock() = zones.clone(),
            Effect::Fan { left, right } => *self.fan.lock() = (*left, *right),
            Effect::Light(on) => *self.light_on.lock() = *on,
        }
    }

    /// Send a plan, honouring its repeat policy.
    ///
    /// The stop packet, when the plan has one, is sent whatever happened in
    /// the repeat loop and under its own token.
    pub async fn run_plan(
        &self,
        plan: &ExecutionPlan,
        sink: &dyn PacketSink,
        token: &CancellationToken,
    ) -> Result<Response> {
        let outcome = self.run_repeats(plan, sink, token).await;

        if let Some(planned) = &plan.stop {
            let stop: Cow<[Packet]> = match plan.reframe {
                Some(_) => self
                    .codec
                    .stop_packets(self.side())
                    .map(Cow::Owned)
                    .unwrap_or(Cow::Borrowed(planned.as_slice())),
                None => Cow::Borrowed(planned.as_slice()),
            };
            let stop_token = CancellationToken::new();
            for packet in stop.iter() {
                if let Err(e) = sink.send(packet, &stop_token).await {
                    warn!("{}: stop failed: {}", self.id(), e);
                    if outcome.is_ok() {
                        return Err(e);
                    }
                }
            }
        }

        let cancelled = outcome?;
        if cancelled {
            return Ok(Response::Cancelled);
        }
        if let Some(effect) = &plan.effect {
            self.apply(effect);
        }
        Ok(Response::Done)
    }

    /// Returns true when cancelled before the loop finished.
    async fn run_repeats(
        &self,
        plan: &ExecutionPlan,
        sink: &dyn PacketSink,
        token: &CancellationToken,
    ) -> Result<bool> {
        let RepeatPolicy { count, interval } = plan.repeat;
        for i in 0..count {
            if token.is_cancelled() {
                info!("{}: cancelled after {} of {} repeats", self.id(), i, count);
                return Ok(true);
            }
            let packets: Cow<[Packet]> = match &plan.reframe {
                Some(command) if i > 0 => Cow::Owned(self.codec.encode(command, self.side())?),
                _ => Cow::Borrowed(plan.packets.as_slice()),
            };
            for packet in packets.iter() {
                sink.send(packet, token).await?;
            }
            if i + 1 < count && !interval.is_zero() {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("{}: cancelled after {} of {} repeats", self.id(), i + 1, count);
                        return Ok(true);
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }
        Ok(false)
    }

    /// Decode a notification and update the cached readings.
    pub fn decode(&self, characteristic: Uuid, data: &[u8]) -> Result<Decoded> {
        let decoded = self.codec.decode(characteristic, data)?;
        match &decoded {
            Decoded::Positions(readings) => {
                let mut cache = self.positions.write();
                for reading in readings {
                    cache.insert(reading.motor, *reading);
                }
                debug!("{}: {} position reading(s)", self.id(), readings.len());
            }
            Decoded::Features(features) => {
                info!("{}: device reports {:?}", self.id(), features);
                *self.features.write() = Some(*features);
            }
            Decoded::Ignored => {}
        }
        Ok(decoded)
    }

    /// Last known reading per motor.
    pub fn positions(&self) -> Vec<PositionReading> {
        self.positions.read().values().copied().collect()
    }

    pub fn features(&self) -> Option<DeviceFeatures> {
        *self.features.read()
    }

    pub fn active_massage(&self) -> Vec<MassageZone> {
        self.massage.lock().clone()
    }

    pub fn fan_levels(&self) -> (u8, u8) {
        *self.fan.lock()
    }

    pub fn light_on(&self) -> bool {
        *self.light_on.lock()
    }
}
