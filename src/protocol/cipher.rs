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

//! 64-bit block cipher used by the encrypted frame family.
//!
//! The inner plaintext is exactly one 8-byte block, so no chaining mode is
//! involved: each frame is encrypted independently with the family key.

const DELTA: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 32;

/// Tiny Encryption Algorithm keyed with four 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCipher {
    key: [u32; 4],
}

impl BlockCipher {
    pub const fn new(key: [u32; 4]) -> Self {
        Self { key }
    }

    /// Encrypt one 8-byte block (big-endian word order).
    pub fn encrypt(&self, block: [u8; 8]) -> [u8; 8] {
        let (mut v0, mut v1) = split(block);
        let [k0, k1, k2, k3] = self.key;
        let mut sum = 0u32;
        for _ in 0..ROUNDS {
            sum = sum.wrapping_add(DELTA);
            v0 = v0.wrapping_add(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            v1 = v1.wrapping_add(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
        }
        join(v0, v1)
    }

    /// Decrypt one 8-byte block.
    pub fn decrypt(&self, block: [u8; 8]) -> [u8; 8] {
        let (mut v0, mut v1) = split(block);
        let [k0, k1, k2, k3] = self.key;
        let mut sum = DELTA.wrapping_mul(ROUNDS);
        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
            v0 = v0.wrapping_sub(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            sum = sum.wrapping_sub(DELTA);
        }
        join(v0, v1)
    }
}

fn split(block: [u8; 8]) -> (u32, u32) {
    (
        u32::from_be_bytes([block[0], block[1], block[2], block[3]]),
        u32::from_be_bytes([block[4], block[5], block[6], block[7]]),
    )
}

fn join(v0: u32, v1: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&v0.to_be_bytes());
    out[4..].copy_from_slice(&v1.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_key_vector() {
        let cipher = BlockCipher::new([0; 4]);
        let encrypted = cipher.encrypt([0; 8]);
        assert_eq!(hex::encode(encrypted), "41ea3a0a94baa940");
    }

    #[test]
    fn test_decrypt_inverts_encrypt() {
        let cipher = BlockCipher::new([0x0123_4567, 0x89AB_CDEF, 0xFEDC_BA98, 0x7654_3210]);
        let plain = [0xAA, 0x12, 0x01, 0x02, 0x03, 0x04, 0x07, 0x3C];
        let encrypted = cipher.encrypt(plain);
        assert_ne!(encrypted, plain);
        assert_eq!(cipher.decrypt(encrypted), plain);
    }
}
