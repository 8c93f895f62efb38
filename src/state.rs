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

//! Per-device connection session state.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Link lifecycle as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Idle,
    Disconnecting,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "Disconnected",
            LinkState::Connecting => "Connecting...",
            LinkState::Connected => "Connected",
            LinkState::Idle => "Idle",
            LinkState::Disconnecting => "Disconnecting...",
        }
    }

    /// Connected or idle; a link object exists.
    pub fn is_up(&self) -> bool {
        matches!(self, LinkState::Connected | LinkState::Idle)
    }
}

/// State bound to one device address.
///
/// Only the coordinator writes to it; everyone else observes.
#[derive(Debug)]
pub struct ConnectionSession {
    address: String,
    state: watch::Sender<LinkState>,
    retries: RwLock<u32>,
    last_activity: RwLock<Instant>,
    intentional_disconnect: RwLock<bool>,
    /// Bumped whenever a link is replaced or torn down.
    generation: RwLock<u64>,
    rssi: RwLock<Option<i16>>,
}

impl ConnectionSession {
    pub fn new(address: impl Into<String>) -> Arc<Self> {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Arc::new(Self {
            address: address.into(),
            state,
            retries: RwLock::new(0),
            last_activity: RwLock::new(Instant::now()),
            intentional_disconnect: RwLock::new(false),
            generation: RwLock::new(0),
            rssi: RwLock::new(None),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn set_state(&self, next: LinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(
                "{}: {} -> {}",
                self.address,
                previous.as_str(),
                next.as_str()
            );
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Count a connection attempt, returning the attempt number.
    pub fn record_attempt(&self) -> u32 {
        let mut retries = self.retries.write();
        *retries += 1;
        *retries
    }

    pub fn reset_retries(&self) {
        *self.retries.write() = 0;
    }

    pub fn retries(&self) -> u32 {
        *self.retries.read()
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    pub fn set_intentional(&self, intentional: bool) {
        *self.intentional_disconnect.write() = intentional;
    }

    pub fn is_intentional(&self) -> bool {
        *self.intentional_disconnect.read()
    }

    pub fn bump_generation(&self) -> u64 {
        let mut generation = self.generation.write();
        *generation += 1;
        *generation
    }

    pub fn generation(&self) -> u64 {
        *self.generation.read()
    }

    pub fn set_rssi(&self, rssi: Option<i16>) {
        *self.rssi.write() = rssi;
    }

    pub fn rssi(&self) -> Option<i16> {
        *self.rssi.read()
    }
}
