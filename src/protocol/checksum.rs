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

//! Trailing checksum rules used by the framed protocol families.

use serde::{Deserialize, Serialize};

/// Closed set of checksum strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checksum {
    /// No trailing checksum byte.
    None,
    /// Bitwise NOT of the byte sum.
    NotSum,
    /// Byte sum XORed with 0xFF.
    XorSum,
    /// Plain modular byte sum.
    Sum,
}

impl Checksum {
    /// Compute the checksum over `data`. `Checksum::None` yields 0.
    pub fn compute(&self, data: &[u8]) -> u8 {
        let sum = byte_sum(data);
        match self {
            Checksum::None => 0,
            Checksum::NotSum => !sum,
            Checksum::XorSum => sum ^ 0xFF,
            Checksum::Sum => sum,
        }
    }

    /// Number of bytes this rule appends.
    pub fn len(&self) -> usize {
        match self {
            Checksum::None => 0,
            _ => 1,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Checksum::None)
    }

    /// Check a packet whose last byte is the checksum over everything before it.
    pub fn verify_trailing(&self, packet: &[u8]) -> bool {
        match (self, packet.split_last()) {
            (Checksum::None, _) => true,
            (_, Some((last, body))) => self.compute(body) == *last,
            (_, None) => false,
        }
    }
}

/// Wrapping sum of all bytes.
pub fn byte_sum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_sum_matches_reference() {
        let data = [0xE5, 0xFE, 0x16, 0x01, 0x00, 0x00, 0x00];
        let expected = (!(0xE5u32 + 0xFE + 0x16 + 0x01) & 0xFF) as u8;
        assert_eq!(Checksum::NotSum.compute(&data), expected);
        assert_eq!(expected, 0x05);
    }

    #[test]
    fn test_sleepys_reference_values() {
        // Head up, flat and zero-g frames for the E6 FE 2C header
        let head_up = [0xE6, 0xFE, 0x2C, 0x02, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(Checksum::NotSum.compute(&head_up), 0xED);
        let flat = [0xE6, 0xFE, 0x2C, 0x00, 0x00, 0x00, 0x10, 0x00];
        assert_eq!(Checksum::NotSum.compute(&flat), 0xDF);
        let zero_g = [0xE6, 0xFE, 0x2C, 0x00, 0x20, 0x00, 0x00, 0x00];
        assert_eq!(Checksum::NotSum.compute(&zero_g), 0xCF);
    }

    #[test]
    fn test_plain_sum_wraps() {
        assert_eq!(Checksum::Sum.compute(&[0x6E, 0x01, 0x00, 0x24]), 0x93);
        assert_eq!(Checksum::Sum.compute(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn test_verify_trailing() {
        let mut packet = vec![0x40, 0x02, 0x73, 0x00, 0x00];
        packet.push(Checksum::XorSum.compute(&packet));
        assert!(Checksum::XorSum.verify_trailing(&packet));
        packet[1] = 0x03;
        assert!(!Checksum::XorSum.verify_trailing(&packet));
        assert!(!Checksum::Sum.verify_trailing(&[]));
        assert!(Checksum::None.verify_trailing(&[]));
    }
}
