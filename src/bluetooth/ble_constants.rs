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

//! BLE service and characteristic UUIDs for the supported bed families.

use uuid::Uuid;

/// Expand a 16-bit SIG-assigned short UUID onto the Bluetooth base UUID.
pub const fn sig(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb | ((short as u128) << 96))
}

/// Okin service, shared by Okimat, Nectar and the Leggett Okin variant.
pub const OKIN_SERVICE_UUID: Uuid = Uuid::from_u128(0x62741523_52f9_8864_b1ab_3b3a8d65950b);
/// Okin write characteristic.
pub const OKIN_WRITE_UUID: Uuid = Uuid::from_u128(0x62741525_52f9_8864_b1ab_3b3a8d65950b);

/// Nordic UART service, shared by MattressFirm, Richmat and Keeson.
pub const NORDIC_UART_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Nordic UART RX (we write here).
pub const NORDIC_UART_RX_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
/// Nordic UART TX (notifications).
pub const NORDIC_UART_TX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Generic vendor service, shared by Keeson and Ergomotion.
pub const FFE5_SERVICE_UUID: Uuid = sig(0xffe5);
pub const FFE9_WRITE_UUID: Uuid = sig(0xffe9);
pub const FFE4_NOTIFY_UUID: Uuid = sig(0xffe4);

/// Generic vendor service, shared by Solace, MotoSleep and Octo.
pub const FFE0_SERVICE_UUID: Uuid = sig(0xffe0);
pub const FFE1_CHAR_UUID: Uuid = sig(0xffe1);

/// Octo-only service.
pub const OCTO_SERVICE_UUID: Uuid = sig(0xaa5c);

/// Linak control service and characteristic.
pub const LINAK_CONTROL_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x99fa0001_338a_1024_8a49_009c0215f78a);
pub const LINAK_CONTROL_CHAR_UUID: Uuid = Uuid::from_u128(0x99fa0002_338a_1024_8a49_009c0215f78a);

/// Linak position service and per-motor characteristics.
pub const LINAK_POSITION_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x99fa0020_338a_1024_8a49_009c0215f78a);
pub const LINAK_POSITION_FEET_UUID: Uuid = Uuid::from_u128(0x99fa0025_338a_1024_8a49_009c0215f78a);
pub const LINAK_POSITION_HEAD_UUID: Uuid = Uuid::from_u128(0x99fa0026_338a_1024_8a49_009c0215f78a);
pub const LINAK_POSITION_LEG_UUID: Uuid = Uuid::from_u128(0x99fa0027_338a_1024_8a49_009c0215f78a);
pub const LINAK_POSITION_BACK_UUID: Uuid = Uuid::from_u128(0x99fa0028_338a_1024_8a49_009c0215f78a);

/// Leggett & Platt Gen2 service and write characteristic.
pub const LEGGETT_GEN2_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x45e25100_3171_4cfc_ae89_1d83cf8d8071);
pub const LEGGETT_GEN2_WRITE_UUID: Uuid = Uuid::from_u128(0x45e25101_3171_4cfc_ae89_1d83cf8d8071);

/// Richmat WiLinke service, also used by the Leggett MlRM remotes.
pub const WILINKE_SERVICE_UUID: Uuid = Uuid::from_u128(0x8ebd4f76_da9d_4b5a_a96e_8ebfbeb622e7);
pub const WILINKE_WRITE_UUID: Uuid = Uuid::from_u128(0xd44bc439_abfd_45a2_b575_925416129600);

/// Richmat legacy service.
pub const RICHMAT_FEE9_SERVICE_UUID: Uuid = sig(0xfee9);

/// Reverie service.
pub const REVERIE_SERVICE_UUID: Uuid = Uuid::from_u128(0x1b1d9641_b942_4da8_89cc_98e6a58fbd93);
/// Reverie nightstand per-motor characteristics (head, feet).
pub const REVERIE_HEAD_UUID: Uuid = Uuid::from_u128(0x6af87926_dc79_412e_a3e0_5f85c2d55de2);
pub const REVERIE_FEET_UUID: Uuid = Uuid::from_u128(0x6af87927_dc79_412e_a3e0_5f85c2d55de2);
pub const REVERIE_LED_UUID: Uuid = Uuid::from_u128(0x6af87928_dc79_412e_a3e0_5f85c2d55de2);

/// Vibradorm motor service, single-byte motor characteristic and CBI
/// characteristic used for the store sequence and position notifications.
pub const VIBRADORM_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001525_9f03_0de5_96c5_b8f4f3081186);
pub const VIBRADORM_MOTOR_UUID: Uuid = Uuid::from_u128(0x00001526_9f03_0de5_96c5_b8f4f3081186);
pub const VIBRADORM_CBI_UUID: Uuid = Uuid::from_u128(0x00001527_9f03_0de5_96c5_b8f4f3081186);

/// Jiecang service and characteristic.
pub const JIECANG_SERVICE_UUID: Uuid = sig(0xfe60);
pub const JIECANG_CHAR_UUID: Uuid = sig(0xfe61);

/// Jensen service and characteristic.
pub const JENSEN_SERVICE_UUID: Uuid = sig(0x1000);
pub const JENSEN_CHAR_UUID: Uuid = sig(0x1001);

/// Sleepy's bases use the generic vendor service.
pub const SLEEPYS_SERVICE_UUID: Uuid = FFE5_SERVICE_UUID;

/// Connection timing constants.
pub mod config {
    use std::time::Duration;

    /// Conservative connection interval applied before normal traffic.
    pub const CONSERVATIVE_MIN_INTERVAL: Duration = Duration::from_micros(30_000);
    pub const CONSERVATIVE_MAX_INTERVAL: Duration = Duration::from_micros(50_000);

    /// Peripheral latency (connection events the peer may skip).
    pub const CONSERVATIVE_LATENCY: u16 = 4;

    /// Supervision timeout.
    pub const SUPERVISION_TIMEOUT: Duration = Duration::from_secs(6);

    /// Backoff multiplier between connection attempts.
    pub const BACKOFF_FACTOR: f64 = 1.5;
}
