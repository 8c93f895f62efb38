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

//! The narrow link contract the coordinator drives.
//!
//! A [`LinkService`] opens [`Link`]s by device address. Everything above this
//! layer is transport-agnostic; the BlueZ adapter and the in-memory mock both
//! implement these traits.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::ble_constants::config;
use crate::error::Result;

/// Capacity of the notification channel handed out by [`Link::subscribe`].
pub const NOTIFY_CHANNEL_CAPACITY: usize = 64;

/// Requested connection timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParams {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub latency: u16,
    pub supervision_timeout: Duration,
}

impl ConnectionParams {
    /// Wider interval and lower duty cycle, applied right after connecting.
    pub const fn conservative() -> Self {
        Self {
            min_interval: config::CONSERVATIVE_MIN_INTERVAL,
            max_interval: config::CONSERVATIVE_MAX_INTERVAL,
            latency: config::CONSERVATIVE_LATENCY,
            supervision_timeout: config::SUPERVISION_TIMEOUT,
        }
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self::conservative()
    }
}

/// An established connection to one device.
#[async_trait]
pub trait Link: Send + Sync {
    /// Write `data` to `characteristic`.
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Subscribe to notifications; the receiver closes when the link drops.
    async fn subscribe(&self, characteristic: Uuid) -> Result<async_channel::Receiver<Vec<u8>>>;

    async fn disconnect(&self) -> Result<()>;

    /// Resolves once the link is gone, for whatever reason.
    async fn closed(&self);

    /// Best effort; links that cannot renegotiate ignore the request.
    async fn set_connection_params(&self, _params: ConnectionParams) -> Result<()> {
        Ok(())
    }

    async fn rssi(&self) -> Option<i16> {
        None
    }
}

/// Opens links by device address.
#[async_trait]
pub trait LinkService: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Link>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservative_params() {
        let params = ConnectionParams::default();
        assert!(params.min_interval <= params.max_interval);
        assert_eq!(params.max_interval, Duration::from_millis(50));
        assert!(params.supervision_timeout > params.max_interval * (params.latency as u32 + 1));
    }
}
