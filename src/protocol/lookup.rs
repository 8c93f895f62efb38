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

//! Pulse-to-angle calibration.

/// Counters at or above this value have wrapped and are mirrored.
pub const INVERSION_THRESHOLD: u32 = 32768;

/// Ascending pulse thresholds, one per whole degree starting at 0.
#[derive(Debug, PartialEq)]
pub struct LookupTable {
    pub thresholds: &'static [u32],
}

impl LookupTable {
    /// Largest angle the table can report.
    pub fn max_angle(&self) -> f32 {
        self.thresholds.len().saturating_sub(1) as f32
    }
}

/// How a raw position value becomes an angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Calibration {
    /// Interpolated per-degree table.
    Table(&'static LookupTable),
    /// Linear scale from `0..=max_raw` onto `0..=max_angle`.
    Linear { max_raw: u32, max_angle: f32 },
}

impl Calibration {
    pub fn angle(&self, raw: u32) -> f32 {
        match self {
            Calibration::Table(table) => angle_for_pulse(table, raw),
            Calibration::Linear { max_raw, max_angle } => {
                if *max_raw == 0 {
                    return 0.0;
                }
                (raw.min(*max_raw) as f32 / *max_raw as f32) * max_angle
            }
        }
    }

    pub fn max_angle(&self) -> f32 {
        match self {
            Calibration::Table(table) => table.max_angle(),
            Calibration::Linear { max_angle, .. } => *max_angle,
        }
    }
}

/// Mirror counters that wrapped at the 16-bit midpoint.
pub fn normalize_pulse(pulse: u32) -> u32 {
    let pulse = pulse.min(u16::MAX as u32);
    if pulse >= INVERSION_THRESHOLD {
        u16::MAX as u32 - pulse
    } else {
        pulse
    }
}

/// Translate a raw pulse count into degrees.
///
/// Pulses are normalized first, then the bracketing thresholds are found and
/// the angle is linearly interpolated between them. Values below the first
/// threshold clamp to zero, values past the last clamp to the table maximum.
pub fn angle_for_pulse(table: &LookupTable, pulse: u32) -> f32 {
    let pulse = normalize_pulse(pulse);
    let thresholds = table.thresholds;

    let (first, last) = match (thresholds.first(), thresholds.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return 0.0,
    };
    if pulse <= first {
        return 0.0;
    }
    if pulse >= last {
        return table.max_angle();
    }

    // First index whose threshold exceeds the pulse; always >= 1 here.
    let upper = thresholds.partition_point(|t| *t <= pulse);
    let lower = upper - 1;
    let lo = thresholds[lower];
    let hi = thresholds[upper];
    let span = hi.saturating_sub(lo);
    if span == 0 {
        return lower as f32;
    }
    lower as f32 + (pulse - lo) as f32 / span as f32
}

/// Head section of the KSBT-derived bases that report pulse counters.
pub static ERGO_HEAD: LookupTable = LookupTable {
    thresholds: &[
        0, 98, 232, 385, 552, 730, 917, 1111, 1313, 1522,
        1736, 1955, 2180, 2410, 2643, 2881, 3124, 3369, 3619, 3872,
        4128, 4388, 4651, 4917, 5185, 5457, 5731, 6008, 6287, 6569,
        6853, 7140, 7429, 7720, 8014, 8310, 8607, 8907, 9209, 9513,
        9819, 10127, 10437, 10748, 11062, 11377, 11694, 12012, 12332, 12654,
        12978, 13303, 13630, 13959, 14289, 14620, 14953, 15288, 15624, 15961,
        16300,
    ],
};

/// Foot section of the same bases.
pub static ERGO_FOOT: LookupTable = LookupTable {
    thresholds: &[
        0, 219, 487, 776, 1080, 1396, 1721, 2055, 2396, 2744,
        3097, 3456, 3820, 4188, 4560, 4937, 5317, 5701, 6089, 6479,
        6873, 7270, 7669, 8071, 8476, 8884, 9293, 9706, 10120, 10537,
        10956, 11377, 11800,
    ],
};
