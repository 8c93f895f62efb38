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

//! Events published by a bed coordinator.

use serde::Serialize;
use uuid::Uuid;

use crate::protocol::{DeviceFeatures, PositionReading};
use crate::state::LinkState;

/// Something a subscriber may want to react to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BedEvent {
    Positions { readings: Vec<PositionReading> },
    Features { features: DeviceFeatures },
    LinkStateChanged { state: LinkState },
    /// A notification could not be decoded; the session carries on.
    DecodeFailed { characteristic: Uuid, error: String },
}

impl BedEvent {
    pub fn positions(&self) -> Option<&[PositionReading]> {
        match self {
            BedEvent::Positions { readings } => Some(readings),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Motor;

    #[test]
    fn test_event_json_shape() {
        let event = BedEvent::Positions {
            readings: vec![PositionReading {
                motor: Motor::Head,
                raw: 1736,
                angle: 10.0,
            }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "positions");
        assert_eq!(json["readings"][0]["raw"], 1736);
        assert_eq!(event.positions().map(|r| r.len()), Some(1));

        let json = serde_json::to_value(BedEvent::LinkStateChanged {
            state: LinkState::Idle,
        })
        .unwrap();
        assert_eq!(json["state"], "idle");
    }
}
