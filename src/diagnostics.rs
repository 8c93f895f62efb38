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

//! Raw byte capture for troubleshooting.
//!
//! A bounded ring buffer of every frame written to or received from a bed.
//! Recording never changes what goes over the link.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDirection {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedFrame {
    pub timestamp: DateTime<Utc>,
    pub direction: FrameDirection,
    pub characteristic: Uuid,
    #[serde(serialize_with = "as_hex")]
    pub bytes: Vec<u8>,
    /// Command the frame was recognized as, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn as_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// Bounded capture of recent frames.
#[derive(Debug)]
pub struct DiagnosticsCapture {
    frames: Mutex<VecDeque<CapturedFrame>>,
    capacity: usize,
    enabled: RwLock<bool>,
}

impl DiagnosticsCapture {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            enabled: RwLock::new(true),
        })
    }

    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.write() = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.read()
    }

    pub fn record(
        &self,
        direction: FrameDirection,
        characteristic: Uuid,
        bytes: &[u8],
        label: Option<String>,
    ) {
        if !self.is_enabled() {
            return;
        }
        let mut frames = self.frames.lock();
        if frames.len() == self.capacity {
            frames.pop_front();
        }
        frames.push_back(CapturedFrame {
            timestamp: Utc::now(),
            direction,
            characteristic,
            bytes: bytes.to_vec(),
            label,
        });
    }

    pub fn frames(&self) -> Vec<CapturedFrame> {
        self.frames.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    /// Export the buffer as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.frames())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let capture = DiagnosticsCapture::new(2);
        for i in 0..3u8 {
            capture.record(FrameDirection::Outbound, Uuid::nil(), &[i], None);
        }
        let frames = capture.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].bytes, vec![1]);
        assert_eq!(frames[1].bytes, vec![2]);
    }

    #[test]
    fn test_disabled_capture_records_nothing() {
        let capture = DiagnosticsCapture::new(8);
        capture.set_enabled(false);
        capture.record(FrameDirection::Inbound, Uuid::nil(), &[1], None);
        assert!(capture.is_empty());
    }

    #[test]
    fn test_json_export() {
        let capture = DiagnosticsCapture::new(8);
        capture.record(
            FrameDirection::Outbound,
            Uuid::nil(),
            &[0xE5, 0xFE],
            Some("stop".to_string()),
        );
        capture.record(FrameDirection::Inbound, Uuid::nil(), &[0x01], None);

        let json: serde_json::Value = serde_json::from_str(&capture.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["direction"], "outbound");
        assert_eq!(json[0]["bytes"], "e5fe");
        assert_eq!(json[0]["label"], "stop");
        assert!(json[1].get("label").is_none());
    }
}
