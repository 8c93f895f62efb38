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

//! Static protocol descriptors.
//!
//! One descriptor per protocol variant. Everything here is plain data,
//! constructed at compile time and never mutated.

use uuid::Uuid;

use super::checksum::Checksum;
use super::lookup::Calibration;
use super::ProtocolId;
use crate::commands::{MassageZone, Motor, Preset, RepeatPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Width of a command word or position field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordWidth {
    U8,
    U16,
    U32,
    U64,
}

impl WordWidth {
    pub fn bytes(&self) -> usize {
        match self {
            WordWidth::U8 => 1,
            WordWidth::U16 => 2,
            WordWidth::U32 => 4,
            WordWidth::U64 => 8,
        }
    }

    /// Serialize the low bytes of `value`.
    pub fn encode(&self, value: u64, endian: Endian) -> Vec<u8> {
        let n = self.bytes();
        let be = value.to_be_bytes();
        let mut out = be[8 - n..].to_vec();
        if endian == Endian::Little {
            out.reverse();
        }
        out
    }

    /// Read a value of this width; `None` if `data` is too short.
    pub fn read(&self, data: &[u8], endian: Endian) -> Option<u64> {
        let n = self.bytes();
        let slice = data.get(..n)?;
        let fold = |acc: u64, b: &u8| (acc << 8) | *b as u64;
        Some(match endian {
            Endian::Big => slice.iter().fold(0, fold),
            Endian::Little => slice.iter().rev().fold(0, fold),
        })
    }
}

/// Side selector placement for split-bed families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideRule {
    None,
    /// Single-side packets swap the first header byte and insert the
    /// selector before the checksum; both-sides packets are unchanged.
    Insert { header0: u8, left: u8, right: u8 },
    /// The selector byte is always appended after the word.
    Append { both: u8, left: u8, right: u8 },
}

/// Frame layout of a protocol variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Framing {
    /// `header | word | trailer | [side] | [checksum]`
    Word {
        header: &'static [u8],
        width: WordWidth,
        endian: Endian,
        trailer: &'static [u8],
        side: SideRule,
    },
    /// `lead | opcode | len | params | checksum | tail`, checksum over
    /// opcode, len and params.
    Delimited { lead: &'static [u8], tail: u8 },
    /// `opcode | params`, zero padded to `len`, no checksum.
    Fixed { len: usize },
    /// `delim | cmd(2) | len BE16 | checksum | data | delim`
    Enveloped { delimiter: u8 },
    /// `serial | pid | cmd LE16 | param LE32`
    Sequenced,
    /// `outer | encrypt(inner | cmd | p1..p4 | counter | ~sum) | sum`
    Encrypted { outer: u8, inner: u8, key: [u32; 4] },
    /// ASCII command strings.
    Text,
}

/// A static command encoding as it appears in the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// Command word for [`Framing::Word`].
    Word(u64),
    /// Opcode plus parameters for delimited, fixed, enveloped and encrypted frames.
    Op(u16, &'static [u8]),
    /// Packet id and command for [`Framing::Sequenced`].
    Seq { pid: u8, cmd: u16 },
    Text(&'static str),
    /// Literal bytes sent as-is, bypassing framing.
    Raw(&'static [u8]),
}

/// Which characteristic a packet is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Control,
    Aux,
    /// Index into [`ProtocolDescriptor::motor_chars`].
    Motor(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub target: Target,
    pub code: Code,
}

impl Step {
    pub const fn control(code: Code) -> Self {
        Self {
            target: Target::Control,
            code,
        }
    }

    pub const fn aux(code: Code) -> Self {
        Self {
            target: Target::Aux,
            code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCode {
    pub motor: Motor,
    pub up: Code,
    pub down: Code,
    pub target: Target,
}

impl MotorCode {
    pub const fn new(motor: Motor, up: Code, down: Code) -> Self {
        Self {
            motor,
            up,
            down,
            target: Target::Control,
        }
    }

    pub const fn on(motor: Motor, up: Code, down: Code, target: Target) -> Self {
        Self {
            motor,
            up,
            down,
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MassageMap {
    None,
    /// The device toggles a zone on each press.
    Toggle {
        zones: &'static [(MassageZone, Code)],
        off: Option<Code>,
    },
    /// The device takes absolute on/off per zone; the controller tracks state.
    /// Each zone owns one parameter byte of the `opcode` payload.
    Switched {
        opcode: u16,
        zones: &'static [(MassageZone, usize)],
        params: usize,
        level: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightMap {
    pub on: Option<Code>,
    pub off: Option<Code>,
    pub toggle: Option<Code>,
    pub target: Target,
}

impl LightMap {
    pub const NONE: LightMap = LightMap {
        on: None,
        off: None,
        toggle: None,
        target: Target::Control,
    };

    pub const fn toggle(code: Code) -> Self {
        Self {
            on: None,
            off: None,
            toggle: Some(code),
            target: Target::Control,
        }
    }

    pub const fn discrete(on: Code, off: Code) -> Self {
        Self {
            on: Some(on),
            off: Some(off),
            toggle: None,
            target: Target::Control,
        }
    }
}

/// Fan levels written as `opcode [left, right]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanMap {
    pub opcode: u16,
    pub max_level: u8,
}

/// Logical command to wire code mapping for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMap {
    pub stop: Code,
    pub motors: &'static [MotorCode],
    /// Named presets; memory slots live in `memory`.
    pub presets: &'static [(Preset, Code)],
    /// Recall codes, slot 1 first.
    pub memory: &'static [Code],
    /// Store sequences, slot 1 first.
    pub memory_save: &'static [&'static [Step]],
    pub massage: MassageMap,
    pub lights: LightMap,
    pub fan: Option<FanMap>,
    /// Sent once per queried motor, in motor order.
    pub position_query: &'static [Code],
    pub capability_query: Option<Code>,
}

impl CommandMap {
    /// Table with only a stop code, used as a base for struct update syntax.
    pub const fn stop_only(stop: Code) -> Self {
        Self {
            stop,
            motors: &[],
            presets: &[],
            memory: &[],
            memory_save: &[],
            massage: MassageMap::None,
            lights: LightMap::NONE,
            fan: None,
            position_query: &[],
            capability_query: None,
        }
    }
}

/// Counter embedded in each outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRule {
    pub first: u8,
    /// Counter never takes the value 0; it wraps from 255 back to `first`.
    pub skip_zero: bool,
}

/// One position value inside a notification payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionField {
    pub motor: Motor,
    /// Only notifications from this characteristic carry the field.
    pub characteristic: Option<Uuid>,
    /// `(index, value)` the payload must carry for the field to apply.
    pub tag: Option<(usize, u8)>,
    pub offset: usize,
    pub width: WordWidth,
    pub endian: Endian,
    pub calibration: Calibration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionLayout {
    pub min_len: usize,
    /// Optional lead byte; when present all offsets shift by one.
    pub lead: Option<u8>,
    pub fields: &'static [PositionField],
}

/// Self-description the device sends back on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureReport {
    /// `[opcode, buttons, system type, vibration, memory slots]`, the low
    /// nibble of the system type is the motor count.
    SystemType { opcode: u8 },
    /// Feature bit flags at `offset`, tagged by a leading opcode.
    Flags { opcode: u8, offset: usize },
}

/// Capability flags derived from a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub motor_control: bool,
    pub stop_all: bool,
    pub memory_presets: bool,
    pub memory_slots: u8,
    pub memory_programming: bool,
    pub lights: bool,
    pub discrete_lights: bool,
    pub massage: bool,
    pub fan: bool,
    pub fan_max_level: u8,
    pub position_feedback: bool,
}

/// Static definition of one protocol variant.
#[derive(Debug)]
pub struct ProtocolDescriptor {
    pub id: ProtocolId,
    pub name: &'static str,
    pub service: Uuid,
    pub control: Uuid,
    pub aux: Option<Uuid>,
    pub motor_chars: &'static [Uuid],
    pub notify: &'static [Uuid],
    pub framing: Framing,
    pub checksum: Checksum,
    pub sequence: Option<SequenceRule>,
    pub commands: CommandMap,
    /// Packets written once per connection before the first command.
    pub init: &'static [&'static [u8]],
    /// Opcode of the PIN frame for PIN-gated variants.
    pub pin_opcode: Option<u16>,
    pub requires_pairing: bool,
    pub motor_repeat: Option<RepeatPolicy>,
    pub preset_repeat: Option<RepeatPolicy>,
    pub position: Option<PositionLayout>,
    pub features: Option<FeatureReport>,
}

impl ProtocolDescriptor {
    pub fn capabilities(&self) -> Capabilities {
        let map = &self.commands;
        Capabilities {
            motor_control: !map.motors.is_empty(),
            stop_all: true,
            memory_presets: !map.memory.is_empty(),
            memory_slots: map.memory.len() as u8,
            memory_programming: !map.memory_save.is_empty(),
            lights: map.lights != LightMap::NONE,
            discrete_lights: map.lights.on.is_some() && map.lights.off.is_some(),
            massage: map.massage != MassageMap::None,
            fan: map.fan.is_some(),
            fan_max_level: map.fan.map(|f| f.max_level).unwrap_or(0),
            position_feedback: self.position.is_some(),
        }
    }

    /// Resolve a packet target to a characteristic UUID.
    pub fn characteristic(&self, target: Target) -> Option<Uuid> {
        match target {
            Target::Control => Some(self.control),
            Target::Aux => self.aux,
            Target::Motor(i) => self.motor_chars.get(i).copied(),
        }
    }

    pub fn requires_pin(&self) -> bool {
        self.pin_opcode.is_some()
    }

    /// True when position fields are bound to dedicated characteristics.
    pub fn has_position_characteristics(&self) -> bool {
        self.position
            .map(|p| p.fields.iter().any(|f| f.characteristic.is_some()))
            .unwrap_or(false)
    }
}
