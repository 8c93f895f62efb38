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

//! The protocol registry.
//!
//! Every supported variant is a `static` [`ProtocolDescriptor`]. Families
//! that share a command vocabulary share a `const` [`CommandMap`] and differ
//! only in framing, checksum or transport.

use super::checksum::Checksum;
use super::descriptor::{
    Code, CommandMap, Endian, FanMap, FeatureReport, Framing, LightMap, MassageMap, MotorCode,
    PositionField, PositionLayout, ProtocolDescriptor, SequenceRule, SideRule, Step, Target,
    WordWidth,
};
use super::lookup::{Calibration, ERGO_FOOT, ERGO_HEAD};
use super::ProtocolId;
use crate::bluetooth::ble_constants::*;
use crate::commands::{MassageZone, Motor, Preset, RepeatPolicy};

use Code::{Op, Raw, Seq, Text, Word};

/// Look up the descriptor for a protocol id.
pub fn descriptor(id: ProtocolId) -> &'static ProtocolDescriptor {
    match id {
        ProtocolId::Rondure => &RONDURE,
        ProtocolId::Keeson => &KEESON,
        ProtocolId::Ergomotion => &ERGOMOTION,
        ProtocolId::Serta => &SERTA,
        ProtocolId::MaloufLegacy => &MALOUF_LEGACY,
        ProtocolId::MaloufNew => &MALOUF_NEW,
        ProtocolId::OkinHandle => &OKIN_HANDLE,
        ProtocolId::OkinUuid => &OKIN_UUID,
        ProtocolId::LeggettOkin => &LEGGETT_OKIN,
        ProtocolId::OkinCb24 => &OKIN_CB24,
        ProtocolId::Okin64 => &OKIN_64,
        ProtocolId::Okin7Byte => &OKIN_7BYTE,
        ProtocolId::OkinNordic => &OKIN_NORDIC,
        ProtocolId::SleepysBox15 => &SLEEPYS_BOX15,
        ProtocolId::SleepysBox24 => &SLEEPYS_BOX24,
        ProtocolId::RichmatNordic => &RICHMAT_NORDIC,
        ProtocolId::RichmatWilinke => &RICHMAT_WILINKE,
        ProtocolId::LeggettWilinke => &LEGGETT_WILINKE,
        ProtocolId::LeggettGen2 => &LEGGETT_GEN2,
        ProtocolId::Linak => &LINAK,
        ProtocolId::Vibradorm => &VIBRADORM,
        ProtocolId::ReverieNightstand => &REVERIE_NIGHTSTAND,
        ProtocolId::Jiecang => &JIECANG,
        ProtocolId::Jensen => &JENSEN,
        ProtocolId::Octo => &OCTO,
        ProtocolId::Remacro => &REMACRO,
        ProtocolId::Limoss => &LIMOSS,
    }
}

/// Every registered descriptor, in [`ProtocolId::ALL`] order.
pub fn all_descriptors() -> impl Iterator<Item = &'static ProtocolDescriptor> {
    ProtocolId::ALL.iter().map(|id| descriptor(*id))
}

const fn word(
    header: &'static [u8],
    width: WordWidth,
    endian: Endian,
    trailer: &'static [u8],
) -> Framing {
    Framing::Word {
        header,
        width,
        endian,
        trailer,
        side: SideRule::None,
    }
}

/// Base descriptor; variants override what differs.
const BASE: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Keeson,
    name: "",
    service: FFE5_SERVICE_UUID,
    control: FFE9_WRITE_UUID,
    aux: None,
    motor_chars: &[],
    notify: &[],
    framing: Framing::Text,
    checksum: Checksum::None,
    sequence: None,
    commands: CommandMap::stop_only(Word(0)),
    init: &[],
    pin_opcode: None,
    requires_pairing: false,
    motor_repeat: None,
    preset_repeat: None,
    position: None,
    features: None,
};

// ---------------------------------------------------------------------------
// KSBT-style 32-bit bit-flag words
// ---------------------------------------------------------------------------

const KSBT_MOTORS: &[MotorCode] = &[
    MotorCode::new(Motor::Head, Word(0x1), Word(0x2)),
    MotorCode::new(Motor::Feet, Word(0x4), Word(0x8)),
    MotorCode::new(Motor::Tilt, Word(0x10), Word(0x20)),
    MotorCode::new(Motor::Lumbar, Word(0x40), Word(0x80)),
];

const KSBT_MAP: CommandMap = CommandMap {
    motors: KSBT_MOTORS,
    presets: &[
        (Preset::Flat, Word(0x0800_0000)),
        (Preset::ZeroG, Word(0x1000)),
        (Preset::AntiSnore, Word(0x8000)),
    ],
    memory: &[Word(0x2000), Word(0x4000)],
    massage: MassageMap::Toggle {
        zones: &[
            (MassageZone::Head, Word(0x800)),
            (MassageZone::Foot, Word(0x400)),
            (MassageZone::Lumbar, Word(0x40_0000)),
        ],
        off: None,
    },
    lights: LightMap::toggle(Word(0x2_0000)),
    ..CommandMap::stop_only(Word(0))
};

pub static RONDURE: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Rondure,
    name: "Rondure",
    framing: Framing::Word {
        header: &[0xE5, 0xFE, 0x16],
        width: WordWidth::U32,
        endian: Endian::Little,
        trailer: &[],
        side: SideRule::Insert {
            header0: 0xE6,
            left: 0x01,
            right: 0x02,
        },
    },
    checksum: Checksum::NotSum,
    commands: KSBT_MAP,
    ..BASE
};

pub static KEESON: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Keeson,
    name: "Keeson KSBT",
    framing: word(&[0xE5, 0xFE, 0x16], WordWidth::U32, Endian::Little, &[]),
    checksum: Checksum::NotSum,
    commands: KSBT_MAP,
    ..BASE
};

const ERGO_POSITIONS: PositionLayout = PositionLayout {
    min_len: 16,
    lead: None,
    fields: &[
        PositionField {
            motor: Motor::Head,
            characteristic: None,
            tag: None,
            offset: 3,
            width: WordWidth::U16,
            endian: Endian::Little,
            calibration: Calibration::Table(&ERGO_HEAD),
        },
        PositionField {
            motor: Motor::Feet,
            characteristic: None,
            tag: None,
            offset: 5,
            width: WordWidth::U16,
            endian: Endian::Little,
            calibration: Calibration::Table(&ERGO_FOOT),
        },
    ],
};

pub static ERGOMOTION: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Ergomotion,
    name: "Ergomotion",
    notify: &[FFE4_NOTIFY_UUID],
    framing: word(&[0xE5, 0xFE, 0x16], WordWidth::U32, Endian::Little, &[]),
    checksum: Checksum::XorSum,
    commands: KSBT_MAP,
    position: Some(ERGO_POSITIONS),
    ..BASE
};

pub static SERTA: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Serta,
    name: "Serta Motion Perfect",
    framing: word(&[0xE5, 0xFE, 0x16], WordWidth::U32, Endian::Big, &[]),
    checksum: Checksum::NotSum,
    commands: KSBT_MAP,
    ..BASE
};

pub static MALOUF_LEGACY: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::MaloufLegacy,
    name: "Malouf (legacy)",
    framing: word(&[0xE6, 0xFE, 0x16], WordWidth::U32, Endian::Little, &[0x00]),
    checksum: Checksum::NotSum,
    commands: KSBT_MAP,
    ..BASE
};

pub static MALOUF_NEW: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::MaloufNew,
    name: "Malouf",
    service: OKIN_SERVICE_UUID,
    control: OKIN_WRITE_UUID,
    framing: word(&[0x05, 0x02], WordWidth::U32, Endian::Big, &[0x00, 0x00]),
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, Word(0x1), Word(0x2)),
            MotorCode::new(Motor::Feet, Word(0x4), Word(0x8)),
        ],
        presets: &[
            (Preset::Flat, Word(0x0800_0000)),
            (Preset::ZeroG, Word(0x1000)),
            (Preset::Lounge, Word(0x2000)),
            (Preset::Tv, Word(0x4000)),
            (Preset::AntiSnore, Word(0x8000)),
        ],
        memory: &[Word(0x1_0000), Word(0x4_0000)],
        ..CommandMap::stop_only(Word(0))
    },
    ..BASE
};

// ---------------------------------------------------------------------------
// Okin families
// ---------------------------------------------------------------------------

const OKIN_MAP: CommandMap = CommandMap {
    motors: &[
        MotorCode::new(Motor::Head, Word(0x1), Word(0x2)),
        MotorCode::new(Motor::Feet, Word(0x4), Word(0x8)),
    ],
    presets: &[
        (Preset::Flat, Word(0x0800_0000)),
        (Preset::ZeroG, Word(0x1000)),
        (Preset::AntiSnore, Word(0x8000)),
    ],
    memory: &[Word(0x2000), Word(0x4000), Word(0x1_0000)],
    massage: MassageMap::Toggle {
        zones: &[
            (MassageZone::Head, Word(0x800)),
            (MassageZone::Foot, Word(0x400)),
            (MassageZone::All, Word(0x100)),
        ],
        off: Some(Word(0x0200_0000)),
    },
    lights: LightMap::toggle(Word(0x2_0000)),
    ..CommandMap::stop_only(Word(0))
};

const OKIN_6BYTE: Framing = word(&[0x04, 0x02], WordWidth::U32, Endian::Big, &[]);

const OKIN_BASE: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::OkinHandle,
    name: "DewertOkin",
    service: OKIN_SERVICE_UUID,
    control: OKIN_WRITE_UUID,
    framing: OKIN_6BYTE,
    commands: OKIN_MAP,
    ..BASE
};

pub static OKIN_HANDLE: ProtocolDescriptor = OKIN_BASE;

pub static OKIN_UUID: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::OkinUuid,
    name: "Okimat",
    requires_pairing: true,
    ..OKIN_BASE
};

pub static LEGGETT_OKIN: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::LeggettOkin,
    name: "Leggett & Platt (Okin)",
    requires_pairing: true,
    ..OKIN_BASE
};

pub static OKIN_CB24: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::OkinCb24,
    name: "Okin CB24",
    framing: Framing::Word {
        header: &[0x05, 0x02],
        width: WordWidth::U32,
        endian: Endian::Big,
        trailer: &[],
        side: SideRule::Append {
            both: 0x00,
            left: 0xAA,
            right: 0xBB,
        },
    },
    ..OKIN_BASE
};

pub static OKIN_64: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Okin64,
    name: "Okin 64-bit",
    framing: word(&[0x08, 0x02], WordWidth::U64, Endian::Big, &[]),
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, Word(0x01_u64 << 32), Word(0x02_u64 << 32)),
            MotorCode::new(Motor::Feet, Word(0x04_u64 << 32), Word(0x08_u64 << 32)),
            MotorCode::new(Motor::Lumbar, Word(0x10_u64 << 32), Word(0x20_u64 << 32)),
        ],
        presets: &[
            (Preset::Flat, Word(0x08_u64 << 56)),
            (Preset::ZeroG, Word(0x10_u64 << 40)),
            (Preset::Lounge, Word(0x20_u64 << 40)),
            (Preset::Tv, Word(0x40_u64 << 40)),
            (Preset::AntiSnore, Word(0x80_u64 << 40)),
        ],
        memory: &[Word(0x01_u64 << 48), Word(0x04_u64 << 48)],
        lights: LightMap {
            on: Some(Word(0x40)),
            off: Some(Word(0x80)),
            toggle: Some(Word(0x02_u64 << 48)),
            target: Target::Control,
        },
        ..CommandMap::stop_only(Word(0))
    },
    ..OKIN_BASE
};

const OKIN_7BYTE_MAP: CommandMap = CommandMap {
    stop: Word(0x0F),
    motors: &[
        MotorCode::new(Motor::Head, Word(0x00), Word(0x01)),
        MotorCode::new(Motor::Feet, Word(0x02), Word(0x03)),
        MotorCode::new(Motor::Lumbar, Word(0x04), Word(0x07)),
    ],
    presets: &[
        (Preset::Flat, Word(0x10)),
        (Preset::Lounge, Word(0x11)),
        (Preset::ZeroG, Word(0x13)),
        (Preset::AntiSnore, Word(0x16)),
    ],
    massage: MassageMap::Toggle {
        zones: &[(MassageZone::All, Word(0x58))],
        off: Some(Word(0x5A)),
    },
    lights: LightMap::discrete(Word(0x73), Word(0x74)),
    ..CommandMap::stop_only(Word(0x0F))
};

const OKIN_7BYTE_FRAMING: Framing = word(
    &[0x5A, 0x01, 0x03, 0x10, 0x30],
    WordWidth::U8,
    Endian::Big,
    &[0xA5],
);

pub static OKIN_7BYTE: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Okin7Byte,
    name: "Nectar",
    service: OKIN_SERVICE_UUID,
    control: OKIN_WRITE_UUID,
    framing: OKIN_7BYTE_FRAMING,
    commands: OKIN_7BYTE_MAP,
    ..BASE
};

pub static OKIN_NORDIC: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::OkinNordic,
    name: "MattressFirm 900",
    service: NORDIC_UART_SERVICE_UUID,
    control: NORDIC_UART_RX_UUID,
    notify: &[NORDIC_UART_TX_UUID],
    framing: OKIN_7BYTE_FRAMING,
    commands: OKIN_7BYTE_MAP,
    init: &[
        &[0x5A, 0x0B, 0x00, 0xA5],
        &[0x5A, 0x01, 0x03, 0x10, 0x30, 0x0F, 0xA5],
    ],
    ..BASE
};

// ---------------------------------------------------------------------------
// Sleepy's
// ---------------------------------------------------------------------------

pub static SLEEPYS_BOX15: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::SleepysBox15,
    name: "Sleepy's BOX15",
    service: SLEEPYS_SERVICE_UUID,
    framing: word(&[0xE6, 0xFE, 0x2C], WordWidth::U32, Endian::Little, &[0x00]),
    checksum: Checksum::NotSum,
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, Word(0x02), Word(0x01)),
            MotorCode::new(Motor::Feet, Word(0x08), Word(0x04)),
            MotorCode::new(Motor::Lumbar, Word(0x20), Word(0x10)),
        ],
        // Flat lives in byte 6, zero-g in byte 4.
        presets: &[
            (Preset::Flat, Word(0x1000_0000)),
            (Preset::ZeroG, Word(0x2000)),
        ],
        ..CommandMap::stop_only(Word(0))
    },
    ..BASE
};

pub static SLEEPYS_BOX24: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::SleepysBox24,
    name: "Sleepy's BOX24",
    service: SLEEPYS_SERVICE_UUID,
    framing: word(
        &[0xA5, 0x5A, 0x00, 0x00, 0x00, 0x40],
        WordWidth::U8,
        Endian::Big,
        &[],
    ),
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, Word(0x02), Word(0x01)),
            MotorCode::new(Motor::Feet, Word(0x06), Word(0x05)),
        ],
        presets: &[(Preset::Flat, Word(0xCC)), (Preset::ZeroG, Word(0xC0))],
        ..CommandMap::stop_only(Word(0))
    },
    ..BASE
};

// ---------------------------------------------------------------------------
// Richmat and WiLinke
// ---------------------------------------------------------------------------

const RICHMAT_MAP: CommandMap = CommandMap {
    motors: &[
        MotorCode::new(Motor::Head, Word(0x24), Word(0x25)),
        MotorCode::new(Motor::Feet, Word(0x26), Word(0x27)),
    ],
    presets: &[
        (Preset::Flat, Word(0x31)),
        (Preset::ZeroG, Word(0x45)),
        (Preset::AntiSnore, Word(0x46)),
        (Preset::Tv, Word(0x58)),
        (Preset::Lounge, Word(0x59)),
    ],
    memory: &[Word(0x2E), Word(0x2F)],
    memory_save: &[&[Step::control(Word(0x2B))], &[Step::control(Word(0x2C))]],
    massage: MassageMap::Toggle {
        zones: &[
            (MassageZone::Head, Word(0x4C)),
            (MassageZone::Foot, Word(0x4E)),
            (MassageZone::All, Word(0x5D)),
        ],
        off: None,
    },
    lights: LightMap::toggle(Word(0x3C)),
    ..CommandMap::stop_only(Word(0x6E))
};

pub static RICHMAT_NORDIC: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::RichmatNordic,
    name: "Richmat (Nordic)",
    service: NORDIC_UART_SERVICE_UUID,
    control: NORDIC_UART_RX_UUID,
    framing: word(&[], WordWidth::U8, Endian::Big, &[]),
    commands: RICHMAT_MAP,
    ..BASE
};

const WILINKE_BASE: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::RichmatWilinke,
    name: "Richmat (WiLinke)",
    service: WILINKE_SERVICE_UUID,
    control: WILINKE_WRITE_UUID,
    framing: word(&[0x6E, 0x01, 0x00], WordWidth::U8, Endian::Big, &[]),
    checksum: Checksum::Sum,
    commands: RICHMAT_MAP,
    ..BASE
};

pub static RICHMAT_WILINKE: ProtocolDescriptor = WILINKE_BASE;

pub static LEGGETT_WILINKE: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::LeggettWilinke,
    name: "Leggett & Platt (MlRM)",
    ..WILINKE_BASE
};

pub static LEGGETT_GEN2: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::LeggettGen2,
    name: "Leggett & Platt Gen2",
    service: LEGGETT_GEN2_SERVICE_UUID,
    control: LEGGETT_GEN2_WRITE_UUID,
    framing: Framing::Text,
    commands: CommandMap {
        presets: &[(Preset::Flat, Text("MEM 0"))],
        memory: &[Text("MEM 1"), Text("MEM 2"), Text("MEM 3"), Text("MEM 4")],
        memory_save: &[
            &[Step::control(Text("SMEM 1"))],
            &[Step::control(Text("SMEM 2"))],
            &[Step::control(Text("SMEM 3"))],
            &[Step::control(Text("SMEM 4"))],
        ],
        ..CommandMap::stop_only(Text("STOP"))
    },
    ..BASE
};

// ---------------------------------------------------------------------------
// Linak, Vibradorm, Reverie
// ---------------------------------------------------------------------------

const fn linak_field(
    motor: Motor,
    characteristic: uuid::Uuid,
    max_raw: u32,
    max_angle: f32,
) -> PositionField {
    PositionField {
        motor,
        characteristic: Some(characteristic),
        tag: None,
        offset: 0,
        width: WordWidth::U16,
        endian: Endian::Little,
        calibration: Calibration::Linear { max_raw, max_angle },
    }
}

pub static LINAK: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Linak,
    name: "Linak",
    service: LINAK_CONTROL_SERVICE_UUID,
    control: LINAK_CONTROL_CHAR_UUID,
    notify: &[
        LINAK_POSITION_BACK_UUID,
        LINAK_POSITION_LEG_UUID,
        LINAK_POSITION_HEAD_UUID,
        LINAK_POSITION_FEET_UUID,
    ],
    framing: word(&[], WordWidth::U8, Endian::Big, &[0x00]),
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Back, Word(0x0B), Word(0x0A)),
            MotorCode::new(Motor::Legs, Word(0x09), Word(0x08)),
        ],
        memory: &[Word(0x0E), Word(0x0F), Word(0x0C), Word(0x44)],
        memory_save: &[
            &[Step::control(Word(0x38))],
            &[Step::control(Word(0x39))],
            &[Step::control(Word(0x3A))],
            &[Step::control(Word(0x3B))],
        ],
        lights: LightMap {
            on: Some(Word(0x92)),
            off: Some(Word(0x93)),
            toggle: Some(Word(0x94)),
            target: Target::Control,
        },
        ..CommandMap::stop_only(Word(0xFF))
    },
    position: Some(PositionLayout {
        min_len: 2,
        lead: None,
        fields: &[
            linak_field(Motor::Back, LINAK_POSITION_BACK_UUID, 820, 68.0),
            linak_field(Motor::Legs, LINAK_POSITION_LEG_UUID, 548, 45.0),
            linak_field(Motor::Head, LINAK_POSITION_HEAD_UUID, 820, 68.0),
            linak_field(Motor::Feet, LINAK_POSITION_FEET_UUID, 548, 45.0),
        ],
    }),
    ..BASE
};

/// Store sequence: two press/release pulses of STORE on the CBI
/// characteristic, then the slot's recall code.
macro_rules! vibradorm_store {
    ($slot:literal) => {
        &[
            Step::aux(Raw(&[0x00, 0x0D])),
            Step::aux(Raw(&[0x80, 0x0D])),
            Step::aux(Raw(&[0x00, 0x0D])),
            Step::aux(Raw(&[0x80, 0x0D])),
            Step::aux(Raw(&[0x00, $slot])),
        ]
    };
}

pub static VIBRADORM: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Vibradorm,
    name: "Vibradorm",
    service: VIBRADORM_SERVICE_UUID,
    control: VIBRADORM_MOTOR_UUID,
    aux: Some(VIBRADORM_CBI_UUID),
    notify: &[VIBRADORM_CBI_UUID],
    framing: word(&[], WordWidth::U8, Endian::Big, &[]),
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, Word(0x0B), Word(0x0A)),
            MotorCode::new(Motor::Legs, Word(0x09), Word(0x08)),
            MotorCode::new(Motor::Feet, Word(0x05), Word(0x04)),
            MotorCode::new(Motor::Neck, Word(0x03), Word(0x02)),
        ],
        presets: &[(Preset::Flat, Word(0x00))],
        memory: &[
            Word(0x0E),
            Word(0x0F),
            Word(0x0C),
            Word(0x1A),
            Word(0x1B),
            Word(0x1C),
        ],
        memory_save: &[
            vibradorm_store!(0x0E),
            vibradorm_store!(0x0F),
            vibradorm_store!(0x0C),
            vibradorm_store!(0x1A),
            vibradorm_store!(0x1B),
            vibradorm_store!(0x1C),
        ],
        ..CommandMap::stop_only(Word(0xFF))
    },
    preset_repeat: Some(RepeatPolicy::held(25, 50)),
    position: Some(PositionLayout {
        min_len: 6,
        lead: Some(0x20),
        fields: &[
            PositionField {
                motor: Motor::Back,
                characteristic: None,
                tag: Some((0, 0x3F)),
                offset: 2,
                width: WordWidth::U16,
                endian: Endian::Big,
                calibration: Calibration::Linear {
                    max_raw: 7000,
                    max_angle: 68.0,
                },
            },
            PositionField {
                motor: Motor::Legs,
                characteristic: None,
                tag: Some((0, 0x3F)),
                offset: 4,
                width: WordWidth::U16,
                endian: Endian::Big,
                calibration: Calibration::Linear {
                    max_raw: 14000,
                    max_angle: 45.0,
                },
            },
        ],
    }),
    ..BASE
};

pub static REVERIE_NIGHTSTAND: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::ReverieNightstand,
    name: "Reverie Nightstand",
    service: REVERIE_SERVICE_UUID,
    control: REVERIE_HEAD_UUID,
    aux: Some(REVERIE_LED_UUID),
    motor_chars: &[REVERIE_HEAD_UUID, REVERIE_FEET_UUID],
    framing: word(&[], WordWidth::U8, Endian::Big, &[]),
    commands: CommandMap {
        motors: &[
            MotorCode::on(Motor::Head, Word(0x01), Word(0x02), Target::Motor(0)),
            MotorCode::on(Motor::Feet, Word(0x01), Word(0x02), Target::Motor(1)),
        ],
        memory: &[Word(0x04), Word(0x05), Word(0x06), Word(0x07)],
        memory_save: &[
            &[Step::control(Word(0x54))],
            &[Step::control(Word(0x55))],
            &[Step::control(Word(0x56))],
            &[Step::control(Word(0x57))],
        ],
        lights: LightMap {
            on: Some(Word(0x64)),
            off: Some(Word(0x00)),
            toggle: None,
            target: Target::Aux,
        },
        ..CommandMap::stop_only(Word(0x00))
    },
    ..BASE
};

// ---------------------------------------------------------------------------
// Opcode families
// ---------------------------------------------------------------------------

pub static JIECANG: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Jiecang,
    name: "Jiecang",
    service: JIECANG_SERVICE_UUID,
    control: JIECANG_CHAR_UUID,
    framing: Framing::Delimited {
        lead: &[0xF1, 0xF1],
        tail: 0x7E,
    },
    checksum: Checksum::Sum,
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, Op(0x01, &[0x01]), Op(0x01, &[0x02])),
            MotorCode::new(Motor::Feet, Op(0x01, &[0x04]), Op(0x01, &[0x08])),
        ],
        presets: &[
            (Preset::Flat, Op(0x08, &[0x01])),
            (Preset::ZeroG, Op(0x08, &[0x02])),
        ],
        memory: &[Op(0x0B, &[0x01]), Op(0x0B, &[0x02])],
        memory_save: &[
            &[Step::control(Op(0x0C, &[0x01]))],
            &[Step::control(Op(0x0C, &[0x02]))],
        ],
        ..CommandMap::stop_only(Op(0x01, &[0x00]))
    },
    ..BASE
};

pub static JENSEN: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Jensen,
    name: "Jensen",
    service: JENSEN_SERVICE_UUID,
    control: JENSEN_CHAR_UUID,
    notify: &[JENSEN_CHAR_UUID],
    framing: Framing::Fixed { len: 6 },
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, Op(0x10, &[0x01]), Op(0x10, &[0x02])),
            MotorCode::new(Motor::Feet, Op(0x10, &[0x10]), Op(0x10, &[0x20])),
        ],
        presets: &[(Preset::Flat, Op(0x10, &[0x81]))],
        memory: &[Op(0x10, &[0x80])],
        memory_save: &[&[Step::control(Op(0x10, &[0x40]))]],
        massage: MassageMap::Switched {
            opcode: 0x12,
            zones: &[(MassageZone::Head, 0), (MassageZone::Foot, 1)],
            params: 2,
            level: 0x05,
        },
        lights: LightMap::discrete(
            Op(0x13, &[0x00, 0xFF, 0x00, 0x00, 0x50]),
            Op(0x13, &[0x00, 0x00, 0x00, 0x00, 0x50]),
        ),
        fan: Some(FanMap {
            opcode: 0x14,
            max_level: 3,
        }),
        capability_query: Some(Op(0x0A, &[])),
        ..CommandMap::stop_only(Op(0x10, &[0x00]))
    },
    motor_repeat: Some(RepeatPolicy::held(10, 100)),
    preset_repeat: Some(RepeatPolicy::held(100, 150)),
    features: Some(FeatureReport::Flags {
        opcode: 0x0A,
        offset: 2,
    }),
    ..BASE
};

pub static OCTO: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Octo,
    name: "Octo",
    service: OCTO_SERVICE_UUID,
    control: FFE1_CHAR_UUID,
    notify: &[FFE1_CHAR_UUID],
    framing: Framing::Enveloped { delimiter: 0x40 },
    checksum: Checksum::XorSum,
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, Op(0x0270, &[0x02]), Op(0x0271, &[0x02])),
            MotorCode::new(Motor::Legs, Op(0x0270, &[0x04]), Op(0x0271, &[0x04])),
        ],
        lights: LightMap::discrete(
            Op(0x2072, &[0x00, 0x01, 0x02, 0x00, 0x01, 0x01, 0x01, 0x01]),
            Op(0x2072, &[0x00, 0x01, 0x02, 0x00, 0x01, 0x01, 0x01, 0x00]),
        ),
        ..CommandMap::stop_only(Op(0x0273, &[]))
    },
    pin_opcode: Some(0x2043),
    ..BASE
};

const fn ctrl(cmd: u16) -> Code {
    Seq { pid: 0x01, cmd }
}

pub static REMACRO: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Remacro,
    name: "Remacro",
    service: NORDIC_UART_SERVICE_UUID,
    control: NORDIC_UART_RX_UUID,
    framing: Framing::Sequenced,
    sequence: Some(SequenceRule {
        first: 1,
        skip_zero: true,
    }),
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Head, ctrl(0x101), ctrl(0x102)),
            MotorCode::new(Motor::Feet, ctrl(0x105), ctrl(0x106)),
            MotorCode::new(Motor::Lumbar, ctrl(0x109), ctrl(0x10A)),
            MotorCode::new(Motor::Neck, ctrl(0x10D), ctrl(0x10E)),
        ],
        presets: &[
            (Preset::Flat, ctrl(0x301)),
            (Preset::ZeroG, ctrl(0x302)),
            (Preset::Tv, ctrl(0x303)),
            (Preset::AntiSnore, ctrl(0x304)),
        ],
        memory: &[ctrl(0x311), ctrl(0x313), ctrl(0x315), ctrl(0x317)],
        memory_save: &[
            &[Step::control(ctrl(0x310))],
            &[Step::control(ctrl(0x312))],
            &[Step::control(ctrl(0x314))],
            &[Step::control(ctrl(0x316))],
        ],
        massage: MassageMap::Toggle {
            zones: &[
                (MassageZone::Head, ctrl(0x121)),
                (MassageZone::Foot, ctrl(0x122)),
                (MassageZone::All, ctrl(0x120)),
            ],
            off: Some(ctrl(0x200)),
        },
        lights: LightMap::discrete(ctrl(0x502), ctrl(0x500)),
        ..CommandMap::stop_only(ctrl(0x000))
    },
    ..BASE
};

/// Limoss frame key.
const LIMOSS_KEY: [u32; 4] = [0x4C49_4D4F, 0x5353_5441, 0x5745_5454, 0x424C_4531];

const fn limoss_position(motor: Motor, query: u8, max_angle: f32) -> PositionField {
    PositionField {
        motor,
        characteristic: None,
        tag: Some((0, query)),
        offset: 1,
        width: WordWidth::U32,
        endian: Endian::Big,
        calibration: Calibration::Linear {
            max_raw: 16000,
            max_angle,
        },
    }
}

pub static LIMOSS: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Limoss,
    name: "Limoss / Stawett",
    service: FFE0_SERVICE_UUID,
    control: FFE1_CHAR_UUID,
    notify: &[FFE1_CHAR_UUID],
    framing: Framing::Encrypted {
        outer: 0xDD,
        inner: 0xAA,
        key: LIMOSS_KEY,
    },
    checksum: Checksum::Sum,
    sequence: Some(SequenceRule {
        first: 0,
        skip_zero: false,
    }),
    commands: CommandMap {
        motors: &[
            MotorCode::new(Motor::Back, Op(0x11, &[]), Op(0x12, &[])),
            MotorCode::new(Motor::Legs, Op(0x13, &[]), Op(0x14, &[])),
            MotorCode::new(Motor::Head, Op(0x15, &[]), Op(0x16, &[])),
            MotorCode::new(Motor::Feet, Op(0x17, &[]), Op(0x18, &[])),
        ],
        presets: &[(Preset::Flat, Op(0x30, &[]))],
        memory: &[Op(0x31, &[]), Op(0x32, &[]), Op(0x33, &[])],
        memory_save: &[
            &[Step::control(Op(0x41, &[]))],
            &[Step::control(Op(0x42, &[]))],
            &[Step::control(Op(0x43, &[]))],
        ],
        position_query: &[
            Op(0x21, &[]),
            Op(0x22, &[]),
            Op(0x23, &[]),
            Op(0x24, &[]),
        ],
        capability_query: Some(Op(0x02, &[])),
        ..CommandMap::stop_only(Op(0x10, &[]))
    },
    position: Some(PositionLayout {
        min_len: 5,
        lead: None,
        fields: &[
            limoss_position(Motor::Back, 0x21, 60.0),
            limoss_position(Motor::Legs, 0x22, 45.0),
            limoss_position(Motor::Head, 0x23, 30.0),
            limoss_position(Motor::Feet, 0x24, 30.0),
        ],
    }),
    features: Some(FeatureReport::SystemType { opcode: 0x02 }),
    ..BASE
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_ids_match_registry_keys() {
        for id in ProtocolId::ALL {
            assert_eq!(descriptor(id).id, id, "{} registered under wrong id", id);
            assert!(!descriptor(id).name.is_empty());
        }
    }

    #[test]
    fn test_motor_targets_resolve() {
        for desc in all_descriptors() {
            for motor in desc.commands.motors {
                assert!(
                    desc.characteristic(motor.target).is_some(),
                    "{} motor {:?} has no characteristic",
                    desc.id,
                    motor.motor
                );
            }
            assert!(desc.characteristic(desc.commands.lights.target).is_some());
        }
    }

    #[test]
    fn test_capabilities_reflect_tables() {
        let caps = descriptor(ProtocolId::Vibradorm).capabilities();
        assert!(caps.motor_control);
        assert_eq!(caps.memory_slots, 6);
        assert!(caps.memory_programming);
        assert!(caps.position_feedback);
        assert!(!caps.lights);

        let caps = descriptor(ProtocolId::LeggettGen2).capabilities();
        assert!(!caps.motor_control);
        assert_eq!(caps.memory_slots, 4);

        let caps = descriptor(ProtocolId::Jensen).capabilities();
        assert!(caps.fan);
        assert_eq!(caps.fan_max_level, 3);
        assert!(caps.discrete_lights);
    }

    #[test]
    fn test_pin_gated_and_paired_variants() {
        assert!(descriptor(ProtocolId::Octo).requires_pin());
        assert!(!descriptor(ProtocolId::Okin7Byte).requires_pin());
        assert!(descriptor(ProtocolId::OkinUuid).requires_pairing);
        assert!(!descriptor(ProtocolId::OkinHandle).requires_pairing);
    }
}
