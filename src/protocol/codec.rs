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

//! Packet encoding and notification decoding.
//!
//! A [`Codec`] is bound to one [`ProtocolDescriptor`] and owns the only piece
//! of mutable protocol state: the outbound sequence counter.

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::checksum::Checksum;
use super::cipher::BlockCipher;
use super::descriptor::{
    Code, FeatureReport, Framing, LightMap, MassageMap, MotorCode, PositionLayout, ProtocolDescriptor,
    SequenceRule, SideRule, Target,
};
use super::registry::descriptor;
use super::ProtocolId;
use crate::commands::{Command, Direction, LightAction, MassageZone, Motor, Preset, Side};
use crate::error::{BedError, Result};

/// Owned form of a [`Code`], ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Word(u64),
    Op(u16, Vec<u8>),
    Seq { pid: u8, cmd: u16, param: u32 },
    Text(String),
    Raw(Vec<u8>),
}

impl From<Code> for Payload {
    fn from(code: Code) -> Self {
        match code {
            Code::Word(value) => Payload::Word(value),
            Code::Op(op, params) => Payload::Op(op, params.to_vec()),
            Code::Seq { pid, cmd } => Payload::Seq { pid, cmd, param: 0 },
            Code::Text(text) => Payload::Text(text.to_string()),
            Code::Raw(bytes) => Payload::Raw(bytes.to_vec()),
        }
    }
}

/// A framed byte sequence and the characteristic it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    characteristic: Uuid,
    bytes: Vec<u8>,
}

impl Packet {
    pub fn new(characteristic: Uuid, bytes: Vec<u8>) -> Self {
        Self {
            characteristic,
            bytes,
        }
    }

    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// One decoded motor position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionReading {
    pub motor: Motor,
    pub raw: u32,
    pub angle: f32,
}

/// Features a device reported about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceFeatures {
    pub motor_count: u8,
    pub memory_slots: u8,
    pub massage: bool,
    pub lights: bool,
    pub fan: bool,
}

/// Result of decoding one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Positions(Vec<PositionReading>),
    Features(DeviceFeatures),
    /// Valid payload that carries nothing this codec tracks.
    Ignored,
}

/// Encoder/decoder for one protocol variant.
#[derive(Debug)]
pub struct Codec {
    descriptor: &'static ProtocolDescriptor,
    sequence: AtomicU8,
}

impl Codec {
    pub fn new(id: ProtocolId) -> Self {
        let descriptor = descriptor(id);
        let first = descriptor.sequence.map(|rule| rule.first).unwrap_or(0);
        Self {
            descriptor,
            sequence: AtomicU8::new(first),
        }
    }

    /// Build a codec from a protocol identifier string such as `okin-cb24`.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(Self::new(name.parse()?))
    }

    pub fn id(&self) -> ProtocolId {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &'static ProtocolDescriptor {
        self.descriptor
    }

    /// Next counter value; wraps at the byte width.
    fn next_sequence(&self) -> u8 {
        let rule = self.descriptor.sequence.unwrap_or(SequenceRule {
            first: 0,
            skip_zero: false,
        });
        let advance = |current: u8| {
            let next = current.wrapping_add(1);
            if rule.skip_zero && next == 0 {
                rule.first.max(1)
            } else {
                next
            }
        };
        match self
            .sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(advance(c)))
        {
            Ok(previous) | Err(previous) => previous,
        }
    }

    fn unsupported(&self, capability: &'static str) -> BedError {
        BedError::UnsupportedCapability {
            protocol: self.descriptor.id,
            capability,
        }
    }

    /// Frame a payload for `target`.
    pub fn frame(&self, target: Target, payload: &Payload, side: Side) -> Result<Packet> {
        let desc = self.descriptor;
        let characteristic = desc.characteristic(target).ok_or_else(|| {
            BedError::invalid(format!("{} has no characteristic for {:?}", desc.id, target))
        })?;

        let bytes = match (&desc.framing, payload) {
            (_, Payload::Raw(bytes)) => bytes.clone(),
            (
                Framing::Word {
                    header,
                    width,
                    endian,
                    trailer,
                    side: rule,
                },
                Payload::Word(value),
            ) => {
                let mut out = header.to_vec();
                if let (SideRule::Insert { header0, .. }, false) = (rule, side == Side::Both) {
                    if let Some(first) = out.first_mut() {
                        *first = *header0;
                    }
                }
                out.extend(width.encode(*value, *endian));
                out.extend_from_slice(trailer);
                match (rule, side) {
                    (SideRule::Insert { left, .. }, Side::Left)
                    | (SideRule::Append { left, .. }, Side::Left) => out.push(*left),
                    (SideRule::Insert { right, .. }, Side::Right)
                    | (SideRule::Append { right, .. }, Side::Right) => out.push(*right),
                    (SideRule::Append { both, .. }, Side::Both) => out.push(*both),
                    _ => {}
                }
                if !desc.checksum.is_none() {
                    out.push(desc.checksum.compute(&out));
                }
                out
            }
            (Framing::Delimited { lead, tail }, Payload::Op(op, params)) => {
                let mut body = vec![*op as u8, params.len() as u8];
                body.extend_from_slice(params);
                let mut out = lead.to_vec();
                out.extend_from_slice(&body);
                out.push(desc.checksum.compute(&body));
                out.push(*tail);
                out
            }
            (Framing::Fixed { len }, Payload::Op(op, params)) => {
                let mut out = vec![*op as u8];
                out.extend_from_slice(params);
                if out.len() > *len {
                    return Err(BedError::invalid(format!(
                        "{} params exceed the {}-byte frame",
                        params.len(),
                        len
                    )));
                }
                out.resize(*len, 0);
                out
            }
            (Framing::Enveloped { delimiter }, Payload::Op(op, data)) => {
                let mut summed = op.to_be_bytes().to_vec();
                summed.extend((data.len() as u16).to_be_bytes());
                summed.extend_from_slice(data);
                let checksum = desc.checksum.compute(&summed);

                let mut out = vec![*delimiter];
                out.extend_from_slice(&summed[..4]);
                out.push(checksum);
                out.extend_from_slice(data);
                out.push(*delimiter);
                out
            }
            (Framing::Sequenced, Payload::Seq { pid, cmd, param }) => {
                let mut out = vec![self.next_sequence(), *pid];
                out.extend(cmd.to_le_bytes());
                out.extend(param.to_le_bytes());
                out
            }
            (Framing::Encrypted { outer, inner, key }, Payload::Op(op, params)) => {
                if params.len() > 4 {
                    return Err(BedError::invalid("encrypted frames carry at most 4 params"));
                }
                let mut plain = [0u8; 8];
                plain[0] = *inner;
                plain[1] = *op as u8;
                plain[2..2 + params.len()].copy_from_slice(params);
                plain[6] = self.next_sequence();
                plain[7] = Checksum::NotSum.compute(&plain[..7]);

                let mut out = vec![*outer];
                out.extend(BlockCipher::new(*key).encrypt(plain));
                out.push(desc.checksum.compute(&out));
                out
            }
            (Framing::Text, Payload::Text(text)) => text.as_bytes().to_vec(),
            (framing, payload) => {
                return Err(BedError::invalid(format!(
                    "{:?} cannot be framed as {:?}",
                    payload, framing
                )))
            }
        };

        Ok(Packet::new(characteristic, bytes))
    }

    fn frame_code(&self, target: Target, code: Code, side: Side) -> Result<Packet> {
        self.frame(target, &Payload::from(code), side)
    }

    /// Motor entry for `motor`; head/back and legs/feet stand in for each other.
    fn motor_code(&self, motor: Motor) -> Option<&'static MotorCode> {
        let motors = self.descriptor.commands.motors;
        motors.iter().find(|m| m.motor == motor).or_else(|| {
            let alias = match motor {
                Motor::Head => Motor::Back,
                Motor::Back => Motor::Head,
                Motor::Legs => Motor::Feet,
                Motor::Feet => Motor::Legs,
                _ => return None,
            };
            motors.iter().find(|m| m.motor == alias)
        })
    }

    fn memory_index(&self, slot: u8, available: usize) -> Result<usize> {
        if slot == 0 || slot as usize > available {
            return Err(BedError::invalid(format!(
                "memory slot {} out of range 1..={} for {}",
                slot, available, self.descriptor.id
            )));
        }
        Ok(slot as usize - 1)
    }

    /// Resolve a command to `(target, payload)` steps without framing.
    fn resolve(&self, command: &Command) -> Result<Vec<(Target, Payload)>> {
        let map = &self.descriptor.commands;
        let step = |target: Target, code: Code| vec![(target, Payload::from(code))];

        match command {
            Command::MotorMove { motor, direction } => {
                if map.motors.is_empty() {
                    return Err(self.unsupported("motor control"));
                }
                let entry = self
                    .motor_code(*motor)
                    .ok_or_else(|| self.unsupported("motor"))?;
                let code = match direction {
                    Direction::Up => entry.up,
                    Direction::Down => entry.down,
                };
                Ok(step(entry.target, code))
            }
            Command::Stop => Ok(self.stop_steps()),
            Command::Preset {
                preset: Preset::Memory(slot),
            } => {
                if map.memory.is_empty() {
                    return Err(self.unsupported("memory presets"));
                }
                let index = self.memory_index(*slot, map.memory.len())?;
                Ok(step(Target::Control, map.memory[index]))
            }
            Command::Preset { preset } => map
                .presets
                .iter()
                .find(|(p, _)| p == preset)
                .map(|(_, code)| step(Target::Control, *code))
                .ok_or_else(|| self.unsupported("presets")),
            Command::SavePreset { slot } => {
                if map.memory_save.is_empty() {
                    return Err(self.unsupported("memory programming"));
                }
                let index = self.memory_index(*slot, map.memory_save.len())?;
                Ok(map.memory_save[index]
                    .iter()
                    .map(|s| (s.target, Payload::from(s.code)))
                    .collect())
            }
            Command::MassageToggle { zone } => match map.massage {
                MassageMap::None => Err(self.unsupported("massage")),
                MassageMap::Toggle { zones, .. } => zones
                    .iter()
                    .find(|(z, _)| z == zone)
                    .map(|(_, code)| step(Target::Control, *code))
                    .ok_or_else(|| self.unsupported("massage zone")),
                MassageMap::Switched { .. } => {
                    // Without tracked state a toggle starts from all-off.
                    Ok(vec![(Target::Control, self.switched_payload(&[*zone])?)])
                }
            },
            Command::MassageOff => match map.massage {
                MassageMap::None => Err(self.unsupported("massage")),
                MassageMap::Toggle { off: Some(code), .. } => Ok(step(Target::Control, code)),
                MassageMap::Toggle { off: None, .. } => Err(self.unsupported("massage off")),
                MassageMap::Switched { .. } => {
                    Ok(vec![(Target::Control, self.switched_payload(&[])?)])
                }
            },
            Command::Light { action } => {
                let lights = map.lights;
                let code = match action {
                    LightAction::On => lights.on,
                    LightAction::Off => lights.off,
                    LightAction::Toggle => lights.toggle,
                };
                match code {
                    Some(code) => Ok(step(lights.target, code)),
                    None if lights == LightMap::NONE => Err(self.unsupported("lights")),
                    None if *action == LightAction::Toggle => {
                        Err(self.unsupported("light toggle"))
                    }
                    None => Err(self.unsupported("discrete lights")),
                }
            }
            Command::FanCycle { side } => {
                let (left, right) = match side {
                    Side::Both => (1, 1),
                    Side::Left => (1, 0),
                    Side::Right => (0, 1),
                };
                Ok(vec![(Target::Control, self.fan_payload(left, right)?)])
            }
            Command::PositionQuery => {
                if !map.position_query.is_empty() {
                    Ok(map
                        .position_query
                        .iter()
                        .map(|code| (Target::Control, Payload::from(*code)))
                        .collect())
                } else if self.descriptor.position.is_some() {
                    // Positions arrive unsolicited.
                    Ok(Vec::new())
                } else {
                    Err(self.unsupported("position feedback"))
                }
            }
            Command::CapabilityQuery => map
                .capability_query
                .map(|code| step(Target::Control, code))
                .ok_or_else(|| self.unsupported("capability query")),
            Command::Combined { commands } => self.resolve_combined(commands),
        }
    }

    fn resolve_combined(&self, commands: &[Command]) -> Result<Vec<(Target, Payload)>> {
        if !matches!(self.descriptor.framing, Framing::Word { .. }) {
            return Err(BedError::invalid(format!(
                "{} does not combine commands",
                self.descriptor.id
            )));
        }
        if commands.is_empty() {
            return Err(BedError::invalid("empty combined command"));
        }
        let mut word = 0u64;
        for command in commands {
            match self.resolve(command)?.as_slice() {
                [(Target::Control, Payload::Word(value))] => word |= value,
                _ => {
                    return Err(BedError::invalid(format!(
                        "{} cannot be combined",
                        command
                    )))
                }
            }
        }
        Ok(vec![(Target::Control, Payload::Word(word))])
    }

    fn stop_steps(&self) -> Vec<(Target, Payload)> {
        let desc = self.descriptor;
        let stop = Payload::from(desc.commands.stop);
        if desc.motor_chars.is_empty() {
            vec![(Target::Control, stop)]
        } else {
            (0..desc.motor_chars.len())
                .map(|i| (Target::Motor(i), stop.clone()))
                .collect()
        }
    }

    /// Frames carry a per-packet counter and must be built fresh for every write.
    pub fn is_counted(&self) -> bool {
        matches!(
            self.descriptor.framing,
            Framing::Sequenced | Framing::Encrypted { .. }
        )
    }

    /// Whether `command` resolves for this protocol. Leaves the counter alone.
    pub fn check(&self, command: &Command) -> Result<()> {
        self.resolve(command).map(|_| ())
    }

    /// Encode one press of `command`.
    pub fn encode(&self, command: &Command, side: Side) -> Result<Vec<Packet>> {
        let packets = self
            .resolve(command)?
            .into_iter()
            .map(|(target, payload)| self.frame(target, &payload, side))
            .collect::<Result<Vec<_>>>()?;
        for packet in &packets {
            debug!("{} {} -> {}", self.descriptor.id, command, packet.hex());
        }
        Ok(packets)
    }

    /// Stop packets; one per motor characteristic where motors are addressed separately.
    pub fn stop_packets(&self, side: Side) -> Result<Vec<Packet>> {
        self.stop_steps()
            .into_iter()
            .map(|(target, payload)| self.frame(target, &payload, side))
            .collect()
    }

    pub fn position_query(&self) -> Result<Vec<Packet>> {
        self.encode(&Command::PositionQuery, Side::Both)
    }

    /// Packets sent once per connection before the first command.
    pub fn init_packets(&self) -> Vec<Packet> {
        self.descriptor
            .init
            .iter()
            .map(|bytes| Packet::new(self.descriptor.control, bytes.to_vec()))
            .collect()
    }

    /// PIN frame for PIN-gated variants; `None` when the protocol has no PIN.
    pub fn pin_packet(&self, pin: &str) -> Result<Option<Packet>> {
        let Some(opcode) = self.descriptor.pin_opcode else {
            return Ok(None);
        };
        let digits = pin
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| BedError::invalid("PIN must be decimal digits"))?;
        self.frame(Target::Control, &Payload::Op(opcode, digits), Side::Both)
            .map(Some)
    }

    fn switched_payload(&self, active: &[MassageZone]) -> Result<Payload> {
        let MassageMap::Switched {
            opcode,
            zones,
            params,
            level,
        } = self.descriptor.commands.massage
        else {
            return Err(self.unsupported("massage levels"));
        };
        if let Some(zone) = active
            .iter()
            .find(|z| **z != MassageZone::All && !zones.iter().any(|(known, _)| known == *z))
        {
            debug!("{} has no massage zone {:?}", self.descriptor.id, zone);
            return Err(self.unsupported("massage zone"));
        }
        let mut bytes = vec![0u8; params];
        for (zone, index) in zones {
            if active.contains(zone) || active.contains(&MassageZone::All) {
                bytes[*index] = level;
            }
        }
        Ok(Payload::Op(opcode, bytes))
    }

    /// Absolute massage state for families that take per-zone levels.
    pub fn massage_packet(&self, active: &[MassageZone]) -> Result<Packet> {
        let payload = self.switched_payload(active)?;
        self.frame(Target::Control, &payload, Side::Both)
    }

    fn fan_payload(&self, left: u8, right: u8) -> Result<Payload> {
        let fan = self
            .descriptor
            .commands
            .fan
            .ok_or_else(|| self.unsupported("fan control"))?;
        if left > fan.max_level || right > fan.max_level {
            return Err(BedError::invalid(format!(
                "fan level above maximum {}",
                fan.max_level
            )));
        }
        Ok(Payload::Op(fan.opcode, vec![left, right]))
    }

    /// Absolute per-side fan levels.
    pub fn fan_packet(&self, left: u8, right: u8) -> Result<Packet> {
        let payload = self.fan_payload(left, right)?;
        self.frame(Target::Control, &payload, Side::Both)
    }

    /// Strip envelopes, verify checksums and return the meaningful body.
    fn unwrap<'a>(&self, data: &'a [u8]) -> Result<std::borrow::Cow<'a, [u8]>> {
        use std::borrow::Cow;

        let desc = self.descriptor;
        match desc.framing {
            Framing::Encrypted { outer, inner, key } => {
                if data.len() != 10 || data[0] != outer {
                    return Err(BedError::decode(format!(
                        "expected 10-byte frame starting {:#04x}, got {}",
                        outer,
                        hex::encode(data)
                    )));
                }
                check(desc.checksum, &data[..9], data[9])?;
                let mut block = [0u8; 8];
                block.copy_from_slice(&data[1..9]);
                let plain = BlockCipher::new(key).decrypt(block);
                if plain[0] != inner {
                    return Err(BedError::decode(format!(
                        "inner header {:#04x} != {:#04x}",
                        plain[0], inner
                    )));
                }
                check(Checksum::NotSum, &plain[..7], plain[7])?;
                Ok(Cow::Owned(plain[1..6].to_vec()))
            }
            Framing::Enveloped { delimiter } => {
                if data.len() < 7 || data[0] != delimiter || data[data.len() - 1] != delimiter {
                    return Err(BedError::decode(format!(
                        "bad envelope: {}",
                        hex::encode(data)
                    )));
                }
                let len = u16::from_be_bytes([data[3], data[4]]) as usize;
                let body = data
                    .get(6..6 + len)
                    .ok_or_else(|| BedError::decode(format!("envelope declares {} bytes", len)))?;
                let mut summed = data[1..5].to_vec();
                summed.extend_from_slice(body);
                check(desc.checksum, &summed, data[5])?;
                let mut out = data[1..3].to_vec();
                out.extend_from_slice(body);
                Ok(Cow::Owned(out))
            }
            _ => Ok(Cow::Borrowed(data)),
        }
    }

    /// Decode a notification received on `characteristic`.
    pub fn decode(&self, characteristic: Uuid, data: &[u8]) -> Result<Decoded> {
        let body = self.unwrap(data)?;

        if let Some(features) = self.decode_features(&body) {
            return Ok(Decoded::Features(features));
        }

        match self.descriptor.position {
            Some(layout) => self.decode_positions(&layout, characteristic, &body),
            None => Ok(Decoded::Ignored),
        }
    }

    fn decode_features(&self, body: &[u8]) -> Option<DeviceFeatures> {
        let map = &self.descriptor.commands;
        match self.descriptor.features? {
            FeatureReport::SystemType { opcode } if body.len() >= 5 && body[0] == opcode => {
                Some(DeviceFeatures {
                    motor_count: body[2] & 0x0F,
                    memory_slots: body[4],
                    massage: body[3] != 0,
                    lights: false,
                    fan: false,
                })
            }
            FeatureReport::Flags { opcode, offset } if body.len() > offset && body[0] == opcode => {
                let flags = body[offset];
                Some(DeviceFeatures {
                    motor_count: map.motors.len() as u8,
                    memory_slots: map.memory.len() as u8,
                    massage: flags & 0x03 != 0,
                    lights: flags & 0x04 != 0,
                    fan: flags & 0x10 != 0,
                })
            }
            _ => None,
        }
    }

    fn decode_positions(
        &self,
        layout: &PositionLayout,
        characteristic: Uuid,
        body: &[u8],
    ) -> Result<Decoded> {
        let dedicated = self.descriptor.has_position_characteristics();
        let body = match (layout.lead, body.first()) {
            (Some(lead), Some(first)) if !dedicated && *first == lead => &body[1..],
            _ => body,
        };
        if !dedicated && body.len() < layout.min_len {
            return Err(BedError::decode(format!(
                "{} notification of {} bytes, need {}",
                self.descriptor.id,
                body.len(),
                layout.min_len
            )));
        }

        let mut readings = Vec::new();
        for field in layout.fields {
            if dedicated && field.characteristic != Some(characteristic) {
                continue;
            }
            if let Some((index, value)) = field.tag {
                if body.get(index) != Some(&value) {
                    continue;
                }
            }
            let raw = body
                .get(field.offset..)
                .and_then(|rest| field.width.read(rest, field.endian))
                .ok_or_else(|| {
                    BedError::decode(format!(
                        "{:?} field at {} past end of {} bytes",
                        field.motor,
                        field.offset,
                        body.len()
                    ))
                })? as u32;
            readings.push(PositionReading {
                motor: field.motor,
                raw,
                angle: field.calibration.angle(raw),
            });
        }

        if readings.is_empty() {
            Ok(Decoded::Ignored)
        } else {
            Ok(Decoded::Positions(readings))
        }
    }

    /// Every stateless single-packet command this protocol can express.
    fn vocabulary(&self) -> Vec<(Command, Target, Code)> {
        let map = &self.descriptor.commands;
        let mut out = vec![(Command::Stop, Target::Control, map.stop)];
        for entry in map.motors {
            out.push((Command::motor(entry.motor, Direction::Up), entry.target, entry.up));
            out.push((Command::motor(entry.motor, Direction::Down), entry.target, entry.down));
        }
        for (preset, code) in map.presets {
            out.push((Command::preset(*preset), Target::Control, *code));
        }
        for (i, code) in map.memory.iter().enumerate() {
            out.push((Command::preset(Preset::Memory(i as u8 + 1)), Target::Control, *code));
        }
        if let MassageMap::Toggle { zones, off } = map.massage {
            for (zone, code) in zones {
                out.push((Command::MassageToggle { zone: *zone }, Target::Control, *code));
            }
            if let Some(code) = off {
                out.push((Command::MassageOff, Target::Control, code));
            }
        }
        let lights = [
            (LightAction::On, map.lights.on),
            (LightAction::Off, map.lights.off),
            (LightAction::Toggle, map.lights.toggle),
        ];
        for (action, code) in lights {
            if let Some(code) = code {
                out.push((Command::Light { action }, map.lights.target, code));
            }
        }
        out
    }

    /// Map an outbound packet back to the command that produced it.
    ///
    /// Only counter-free framings can be recognized; sequenced and
    /// encrypted frames differ on every send.
    pub fn recognize(&self, bytes: &[u8]) -> Option<Command> {
        if matches!(
            self.descriptor.framing,
            Framing::Sequenced | Framing::Encrypted { .. }
        ) {
            return None;
        }
        self.vocabulary().into_iter().find_map(|(command, target, code)| {
            let packet = self.frame_code(target, code, Side::Both).ok()?;
            (packet.bytes() == bytes).then_some(command)
        })
    }

    /// Verify the checksum of an outbound packet.
    pub fn verify_checksum(&self, bytes: &[u8]) -> bool {
        let desc = self.descriptor;
        match desc.framing {
            Framing::Word { .. } => desc.checksum.verify_trailing(bytes),
            Framing::Delimited { lead, .. } => {
                if bytes.len() < lead.len() + 2 {
                    return false;
                }
                let end = bytes.len() - 2;
                desc.checksum.compute(&bytes[lead.len()..end]) == bytes[end]
            }
            Framing::Enveloped { .. } | Framing::Encrypted { .. } => self.unwrap(bytes).is_ok(),
            Framing::Fixed { .. } | Framing::Sequenced | Framing::Text => true,
        }
    }
}

fn check(rule: Checksum, body: &[u8], actual: u8) -> Result<()> {
    let expected = rule.compute(body);
    if expected != actual {
        return Err(BedError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::ble_constants::*;
    use crate::protocol::{all_descriptors, angle_for_pulse, byte_sum, ERGO_FOOT, ERGO_HEAD};

    fn encode_one(id: ProtocolId, command: Command) -> Vec<u8> {
        let packets = Codec::new(id).encode(&command, Side::Both).unwrap();
        assert_eq!(packets.len(), 1, "{} {}", id, command);
        packets[0].bytes().to_vec()
    }

    #[test]
    fn test_head_up_sum_checksum_frame() {
        let bytes = encode_one(ProtocolId::Rondure, Command::motor(Motor::Head, Direction::Up));
        let sum: u32 = [0xE5u32, 0xFE, 0x16, 0x01, 0x00, 0x00, 0x00].iter().sum();
        let checksum = (!sum & 0xFF) as u8;
        assert_eq!(bytes, vec![0xE5, 0xFE, 0x16, 0x01, 0x00, 0x00, 0x00, checksum]);
        assert_eq!(checksum, 0x05);
    }

    #[test]
    fn test_single_side_frame_swaps_header_and_inserts_selector() {
        let codec = Codec::new(ProtocolId::Rondure);
        let packets = codec
            .encode(&Command::motor(Motor::Head, Direction::Up), Side::Left)
            .unwrap();
        assert_eq!(
            packets[0].bytes(),
            &[0xE6, 0xFE, 0x16, 0x01, 0x00, 0x00, 0x00, 0x01, 0x03]
        );
    }

    #[test]
    fn test_okin_frames() {
        let codec = Codec::new(ProtocolId::OkinCb24);
        let packets = codec
            .encode(&Command::motor(Motor::Head, Direction::Up), Side::Right)
            .unwrap();
        assert_eq!(
            packets[0].bytes(),
            &[0x05, 0x02, 0x00, 0x00, 0x00, 0x01, 0xBB]
        );
        assert_eq!(packets[0].characteristic(), OKIN_WRITE_UUID);

        assert_eq!(
            encode_one(ProtocolId::Okin64, Command::preset(Preset::Flat)),
            vec![0x08, 0x02, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            encode_one(ProtocolId::Okin7Byte, Command::preset(Preset::Flat)),
            vec![0x5A, 0x01, 0x03, 0x10, 0x30, 0x10, 0xA5]
        );
        assert_eq!(
            encode_one(ProtocolId::OkinUuid, Command::Stop),
            vec![0x04, 0x02, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_sleepys_flat_lands_in_byte_six() {
        assert_eq!(
            encode_one(ProtocolId::SleepysBox15, Command::preset(Preset::Flat)),
            vec![0xE6, 0xFE, 0x2C, 0x00, 0x00, 0x00, 0x10, 0x00, 0xDF]
        );
        assert_eq!(
            encode_one(ProtocolId::SleepysBox24, Command::preset(Preset::Flat)),
            vec![0xA5, 0x5A, 0x00, 0x00, 0x00, 0x40, 0xCC]
        );
    }

    #[test]
    fn test_wilinke_and_delimited_frames() {
        assert_eq!(
            encode_one(
                ProtocolId::RichmatWilinke,
                Command::motor(Motor::Head, Direction::Up)
            ),
            vec![0x6E, 0x01, 0x00, 0x24, 0x93]
        );
        assert_eq!(
            encode_one(ProtocolId::Jiecang, Command::preset(Preset::Memory(1))),
            vec![0xF1, 0xF1, 0x0B, 0x01, 0x01, 0x0D, 0x7E]
        );
    }

    #[test]
    fn test_enveloped_frames_and_pin() {
        assert_eq!(
            encode_one(ProtocolId::Octo, Command::motor(Motor::Head, Direction::Up)),
            vec![0x40, 0x02, 0x70, 0x00, 0x01, 0x8A, 0x02, 0x40]
        );

        let codec = Codec::new(ProtocolId::Octo);
        let pin = codec.pin_packet("1234").unwrap().unwrap();
        assert_eq!(
            pin.bytes(),
            &[0x40, 0x20, 0x43, 0x00, 0x04, 0x8E, 0x01, 0x02, 0x03, 0x04, 0x40]
        );
        assert!(codec.verify_checksum(pin.bytes()));
        assert!(codec.pin_packet("12a4").is_err());
        assert!(Codec::new(ProtocolId::Keeson)
            .pin_packet("1234")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_fixed_frames_pad_to_length() {
        let codec = Codec::new(ProtocolId::Jensen);
        assert_eq!(
            encode_one(ProtocolId::Jensen, Command::preset(Preset::Flat)),
            vec![0x10, 0x81, 0x00, 0x00, 0x00, 0x00]
        );
        let packet = codec
            .massage_packet(&[MassageZone::Head, MassageZone::Foot])
            .unwrap();
        assert_eq!(packet.bytes(), &[0x12, 0x05, 0x05, 0x00, 0x00, 0x00]);
        assert_eq!(
            codec.fan_packet(2, 0).unwrap().bytes(),
            &[0x14, 0x02, 0x00, 0x00, 0x00, 0x00]
        );
        assert!(matches!(
            codec.fan_packet(4, 0),
            Err(BedError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_check_does_not_advance_counter() {
        let codec = Codec::new(ProtocolId::Remacro);
        assert!(codec.is_counted());
        assert!(!Codec::new(ProtocolId::Keeson).is_counted());

        let head_up = Command::motor(Motor::Head, Direction::Up);
        codec.check(&head_up).unwrap();
        codec.check(&head_up).unwrap();
        assert_eq!(codec.encode(&head_up, Side::Both).unwrap()[0].bytes()[0], 0x01);
        assert!(matches!(
            codec.check(&Command::FanCycle { side: Side::Left }),
            Err(BedError::UnsupportedCapability { .. })
        ));
    }

    #[test]
    fn test_sequence_counter_skips_zero_on_wrap() {
        let codec = Codec::new(ProtocolId::Remacro);
        let head_up = Command::motor(Motor::Head, Direction::Up);
        let first = codec.encode(&head_up, Side::Both).unwrap();
        assert_eq!(
            first[0].bytes(),
            &[0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00]
        );

        let mut serials = vec![first[0].bytes()[0]];
        for _ in 0..300 {
            serials.push(codec.encode(&Command::Stop, Side::Both).unwrap()[0].bytes()[0]);
        }
        assert!(!serials.contains(&0));
        assert_eq!(serials[254], 255);
        assert_eq!(serials[255], 1);
    }

    fn limoss_key() -> [u32; 4] {
        match descriptor(ProtocolId::Limoss).framing {
            Framing::Encrypted { key, .. } => key,
            _ => unreachable!(),
        }
    }

    fn limoss_notification(inner: [u8; 7]) -> Vec<u8> {
        let mut plain = [0u8; 8];
        plain[..7].copy_from_slice(&inner);
        plain[7] = Checksum::NotSum.compute(&inner);
        let mut out = vec![0xDD];
        out.extend(BlockCipher::new(limoss_key()).encrypt(plain));
        out.push(Checksum::Sum.compute(&out));
        out
    }

    #[test]
    fn test_encrypted_frame_structure() {
        let codec = Codec::new(ProtocolId::Limoss);
        let packets = codec.encode(&Command::Stop, Side::Both).unwrap();
        let bytes = packets[0].bytes();
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[0], 0xDD);
        assert_eq!(bytes[9], byte_sum(&bytes[..9]));

        let mut block = [0u8; 8];
        block.copy_from_slice(&bytes[1..9]);
        let plain = BlockCipher::new(limoss_key()).decrypt(block);
        assert_eq!(&plain[..7], &[0xAA, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(plain[7], Checksum::NotSum.compute(&plain[..7]));

        // Counter advances on the next frame
        let next = codec.encode(&Command::Stop, Side::Both).unwrap();
        let mut block = [0u8; 8];
        block.copy_from_slice(&next[0].bytes()[1..9]);
        assert_eq!(BlockCipher::new(limoss_key()).decrypt(block)[6], 0x01);
    }

    #[test]
    fn test_encrypted_notifications_decode() {
        let codec = Codec::new(ProtocolId::Limoss);
        let report = limoss_notification([0xAA, 0x02, 0x08, 0x12, 0x01, 0x05, 0x00]);
        assert_eq!(
            codec.decode(FFE1_CHAR_UUID, &report).unwrap(),
            Decoded::Features(DeviceFeatures {
                motor_count: 2,
                memory_slots: 5,
                massage: true,
                lights: false,
                fan: false,
            })
        );

        // 8000 of 16000 on the back motor
        let position = limoss_notification([0xAA, 0x21, 0x00, 0x00, 0x1F, 0x40, 0x03]);
        match codec.decode(FFE1_CHAR_UUID, &position).unwrap() {
            Decoded::Positions(readings) => {
                assert_eq!(readings.len(), 1);
                assert_eq!(readings[0].motor, Motor::Back);
                assert_eq!(readings[0].raw, 8000);
                assert!((readings[0].angle - 30.0).abs() < 1e-3);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut corrupt = position.clone();
        corrupt[9] ^= 0x01;
        assert!(matches!(
            codec.decode(FFE1_CHAR_UUID, &corrupt),
            Err(BedError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_pulse_notifications_decode_through_tables() {
        let codec = Codec::new(ProtocolId::Ergomotion);
        let mut data = vec![0u8; 16];
        data[3..5].copy_from_slice(&165u16.to_le_bytes());
        data[5..7].copy_from_slice(&40000u16.to_le_bytes());

        match codec.decode(FFE4_NOTIFY_UUID, &data).unwrap() {
            Decoded::Positions(readings) => {
                assert_eq!(readings[0].motor, Motor::Head);
                assert!((readings[0].angle - angle_for_pulse(&ERGO_HEAD, 165)).abs() < 1e-4);
                assert_eq!(readings[1].raw, 40000);
                assert_eq!(readings[1].angle, angle_for_pulse(&ERGO_FOOT, 25535));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(codec
            .decode(FFE4_NOTIFY_UUID, &data[..12])
            .unwrap_err()
            .is_decode_failure());
    }

    #[test]
    fn test_big_endian_positions_with_optional_lead() {
        let codec = Codec::new(ProtocolId::Vibradorm);
        let plain = [0x3F, 0x00, 0x1B, 0x58, 0x36, 0xB0];
        let mut led = vec![0x20];
        led.extend_from_slice(&plain);

        for data in [&plain[..], &led[..]] {
            match codec.decode(VIBRADORM_CBI_UUID, data).unwrap() {
                Decoded::Positions(readings) => {
                    assert_eq!(readings[0].motor, Motor::Back);
                    assert_eq!(readings[0].raw, 7000);
                    assert_eq!(readings[0].angle, 68.0);
                    assert_eq!(readings[1].raw, 14000);
                    assert_eq!(readings[1].angle, 45.0);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        // Other status frames carry no position tag
        assert_eq!(
            codec
                .decode(VIBRADORM_CBI_UUID, &[0x01, 0, 0, 0, 0, 0])
                .unwrap(),
            Decoded::Ignored
        );
    }

    #[test]
    fn test_dedicated_position_characteristics() {
        let codec = Codec::new(ProtocolId::Linak);
        match codec
            .decode(LINAK_POSITION_BACK_UUID, &820u16.to_le_bytes())
            .unwrap()
        {
            Decoded::Positions(readings) => {
                assert_eq!(readings.len(), 1);
                assert_eq!(readings[0].motor, Motor::Back);
                assert_eq!(readings[0].angle, 68.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            codec.decode(LINAK_CONTROL_CHAR_UUID, &[0x01, 0x02]).unwrap(),
            Decoded::Ignored
        );
    }

    #[test]
    fn test_feature_flags_report() {
        let codec = Codec::new(ProtocolId::Jensen);
        let decoded = codec
            .decode(JENSEN_CHAR_UUID, &[0x0A, 0x00, 0x15, 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(
            decoded,
            Decoded::Features(DeviceFeatures {
                motor_count: 2,
                memory_slots: 1,
                massage: true,
                lights: true,
                fan: true,
            })
        );
    }

    #[test]
    fn test_combined_commands_or_into_one_word() {
        let combined = Command::Combined {
            commands: vec![
                Command::motor(Motor::Head, Direction::Up),
                Command::motor(Motor::Feet, Direction::Up),
            ],
        };
        assert_eq!(
            encode_one(ProtocolId::Keeson, combined.clone()),
            vec![0xE5, 0xFE, 0x16, 0x05, 0x00, 0x00, 0x00, 0x01]
        );
        assert!(matches!(
            Codec::new(ProtocolId::Jiecang).encode(&combined, Side::Both),
            Err(BedError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_capability_and_slot_errors() {
        let gen2 = Codec::new(ProtocolId::LeggettGen2);
        assert!(matches!(
            gen2.encode(&Command::motor(Motor::Head, Direction::Up), Side::Both),
            Err(BedError::UnsupportedCapability {
                protocol: ProtocolId::LeggettGen2,
                ..
            })
        ));
        assert!(matches!(
            gen2.encode(&Command::preset(Preset::Memory(5)), Side::Both),
            Err(BedError::InvalidCommand(_))
        ));
        assert!(matches!(
            gen2.encode(&Command::preset(Preset::Memory(0)), Side::Both),
            Err(BedError::InvalidCommand(_))
        ));
        assert_eq!(
            encode_one(ProtocolId::LeggettGen2, Command::SavePreset { slot: 2 }),
            b"SMEM 2".to_vec()
        );
    }

    #[test]
    fn test_motor_aliases() {
        // Linak names its motors back/legs
        assert_eq!(
            encode_one(ProtocolId::Linak, Command::motor(Motor::Head, Direction::Up)),
            vec![0x0B, 0x00]
        );
        assert!(Codec::new(ProtocolId::Linak)
            .encode(&Command::motor(Motor::Tilt, Direction::Up), Side::Both)
            .is_err());
    }

    #[test]
    fn test_per_motor_stop_and_store_sequence() {
        let reverie = Codec::new(ProtocolId::ReverieNightstand);
        let stops = reverie.stop_packets(Side::Both).unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].characteristic(), REVERIE_HEAD_UUID);
        assert_eq!(stops[1].characteristic(), REVERIE_FEET_UUID);
        assert!(stops.iter().all(|p| p.bytes() == [0x00]));

        let vibradorm = Codec::new(ProtocolId::Vibradorm);
        let store = vibradorm
            .encode(&Command::SavePreset { slot: 1 }, Side::Both)
            .unwrap();
        assert_eq!(store.len(), 5);
        assert!(store
            .iter()
            .all(|p| p.characteristic() == VIBRADORM_CBI_UUID));
        assert_eq!(store[1].bytes(), &[0x80, 0x0D]);
        assert_eq!(store[4].bytes(), &[0x00, 0x0E]);
    }

    #[test]
    fn test_recognize_maps_packets_back() {
        let codec = Codec::new(ProtocolId::Keeson);
        let flat = codec
            .encode(&Command::preset(Preset::Flat), Side::Both)
            .unwrap();
        assert_eq!(
            codec.recognize(flat[0].bytes()),
            Some(Command::preset(Preset::Flat))
        );
        assert_eq!(codec.recognize(&[0xE5, 0xFE]), None);
        assert_eq!(
            Codec::new(ProtocolId::Remacro).recognize(&[1, 1, 1, 1, 0, 0, 0, 0]),
            None
        );
    }

    #[test]
    fn test_every_vocabulary_packet_verifies() {
        for desc in all_descriptors() {
            let codec = Codec::new(desc.id);
            for (command, _, _) in codec.vocabulary() {
                for packet in codec.encode(&command, Side::Both).unwrap() {
                    assert!(
                        codec.verify_checksum(packet.bytes()),
                        "{} {} -> {}",
                        desc.id,
                        command,
                        packet.hex()
                    );
                }
                let counter_free =
                    !matches!(desc.framing, Framing::Sequenced | Framing::Encrypted { .. });
                if counter_free && desc.motor_chars.is_empty() {
                    let bytes = codec.encode(&command, Side::Both).unwrap();
                    assert!(codec.recognize(bytes[0].bytes()).is_some());
                }
            }
        }
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        assert_eq!(
            Codec::from_name("okin-cb24").unwrap().id(),
            ProtocolId::OkinCb24
        );
        assert!(matches!(
            Codec::from_name("acme-9000"),
            Err(BedError::UnknownProtocol(_))
        ));
    }
}
