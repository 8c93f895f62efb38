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

//! Protocol codec layer.
//!
//! A data-driven registry of [`ProtocolDescriptor`]s plus the [`Codec`] that
//! turns [`Command`](crate::commands::Command)s into packets and notification
//! payloads into typed readings.

mod checksum;
mod cipher;
mod codec;
mod descriptor;
mod lookup;
mod registry;

pub use checksum::{byte_sum, Checksum};
pub use cipher::BlockCipher;
pub use codec::{Codec, Decoded, DeviceFeatures, Packet, Payload, PositionReading};
pub use descriptor::{
    Capabilities, Code, CommandMap, Endian, FeatureReport, FanMap, Framing, LightMap, MassageMap,
    MotorCode, PositionField, PositionLayout, ProtocolDescriptor, SequenceRule, SideRule, Step,
    Target, WordWidth,
};
pub use lookup::{
    angle_for_pulse, normalize_pulse, Calibration, LookupTable, ERGO_FOOT, ERGO_HEAD,
    INVERSION_THRESHOLD,
};
pub use registry::{all_descriptors, descriptor};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BedError;

/// Identifier of one protocol variant in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolId {
    Rondure,
    Keeson,
    Ergomotion,
    Serta,
    MaloufLegacy,
    MaloufNew,
    OkinHandle,
    OkinUuid,
    LeggettOkin,
    OkinCb24,
    #[serde(rename = "okin-64")]
    Okin64,
    #[serde(rename = "okin-7byte")]
    Okin7Byte,
    OkinNordic,
    SleepysBox15,
    SleepysBox24,
    RichmatNordic,
    RichmatWilinke,
    LeggettWilinke,
    #[serde(rename = "leggett-gen2")]
    LeggettGen2,
    Linak,
    Vibradorm,
    ReverieNightstand,
    Jiecang,
    Jensen,
    Octo,
    Remacro,
    Limoss,
}

impl ProtocolId {
    pub const ALL: [ProtocolId; 27] = [
        ProtocolId::Rondure,
        ProtocolId::Keeson,
        ProtocolId::Ergomotion,
        ProtocolId::Serta,
        ProtocolId::MaloufLegacy,
        ProtocolId::MaloufNew,
        ProtocolId::OkinHandle,
        ProtocolId::OkinUuid,
        ProtocolId::LeggettOkin,
        ProtocolId::OkinCb24,
        ProtocolId::Okin64,
        ProtocolId::Okin7Byte,
        ProtocolId::OkinNordic,
        ProtocolId::SleepysBox15,
        ProtocolId::SleepysBox24,
        ProtocolId::RichmatNordic,
        ProtocolId::RichmatWilinke,
        ProtocolId::LeggettWilinke,
        ProtocolId::LeggettGen2,
        ProtocolId::Linak,
        ProtocolId::Vibradorm,
        ProtocolId::ReverieNightstand,
        ProtocolId::Jiecang,
        ProtocolId::Jensen,
        ProtocolId::Octo,
        ProtocolId::Remacro,
        ProtocolId::Limoss,
    ];

    /// Get string code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rondure => "rondure",
            Self::Keeson => "keeson",
            Self::Ergomotion => "ergomotion",
            Self::Serta => "serta",
            Self::MaloufLegacy => "malouf-legacy",
            Self::MaloufNew => "malouf-new",
            Self::OkinHandle => "okin-handle",
            Self::OkinUuid => "okin-uuid",
            Self::LeggettOkin => "leggett-okin",
            Self::OkinCb24 => "okin-cb24",
            Self::Okin64 => "okin-64",
            Self::Okin7Byte => "okin-7byte",
            Self::OkinNordic => "okin-nordic",
            Self::SleepysBox15 => "sleepys-box15",
            Self::SleepysBox24 => "sleepys-box24",
            Self::RichmatNordic => "richmat-nordic",
            Self::RichmatWilinke => "richmat-wilinke",
            Self::LeggettWilinke => "leggett-wilinke",
            Self::LeggettGen2 => "leggett-gen2",
            Self::Linak => "linak",
            Self::Vibradorm => "vibradorm",
            Self::ReverieNightstand => "reverie-nightstand",
            Self::Jiecang => "jiecang",
            Self::Jensen => "jensen",
            Self::Octo => "octo",
            Self::Remacro => "remacro",
            Self::Limoss => "limoss",
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolId {
    type Err = BedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        ProtocolId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| BedError::UnknownProtocol(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_id_parse() {
        assert_eq!("okin-cb24".parse::<ProtocolId>().unwrap(), ProtocolId::OkinCb24);
        assert_eq!("OKIN_NORDIC".parse::<ProtocolId>().unwrap(), ProtocolId::OkinNordic);
        assert!(matches!(
            "waterbed".parse::<ProtocolId>(),
            Err(BedError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn test_protocol_id_names_are_unique() {
        let mut names: Vec<&str> = ProtocolId::ALL.iter().map(|id| id.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ProtocolId::ALL.len());
    }

    #[test]
    fn test_serde_names_match_display() {
        for id in ProtocolId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id));
        }
    }
}
