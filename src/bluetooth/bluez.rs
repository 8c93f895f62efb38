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

//! BlueZ implementation of the link contract.

use async_trait::async_trait;
use bluer::{Adapter, Address, Device, DeviceEvent, DeviceProperty};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::link::{ConnectionParams, Link, LinkService, NOTIFY_CHANNEL_CAPACITY};
use crate::error::{BedError, Result};

fn link_err(err: impl std::fmt::Display) -> BedError {
    BedError::link(err.to_string())
}

/// Connects to beds through the default BlueZ adapter.
pub struct BluezLinkService {
    adapter: Adapter,
}

impl BluezLinkService {
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await.map_err(link_err)?;
        let adapter = session.default_adapter().await.map_err(link_err)?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await.map_err(link_err)? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await.map_err(link_err)?;
        }

        Ok(Self { adapter })
    }

    fn device(&self, address: &str) -> Result<Device> {
        let address: Address = address
            .parse()
            .map_err(|_| BedError::invalid(format!("bad Bluetooth address: {}", address)))?;
        self.adapter.device(address).map_err(link_err)
    }

    /// Advertised name and service UUIDs as last seen by BlueZ.
    pub async fn advertisement(&self, address: &str) -> Result<(Option<String>, Vec<Uuid>)> {
        let device = self.device(address)?;
        let name = device.name().await.map_err(link_err)?;
        let uuids = device
            .uuids()
            .await
            .map_err(link_err)?
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        Ok((name, uuids))
    }
}

#[async_trait]
impl LinkService for BluezLinkService {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Link>> {
        let device = self.device(address)?;
        if !device.is_connected().await.map_err(link_err)? {
            device.connect().await.map_err(link_err)?;
        }
        info!("Connected to {}", address);

        let mut characteristics = HashMap::new();
        for service in device.services().await.map_err(link_err)? {
            for characteristic in service.characteristics().await.map_err(link_err)? {
                let uuid = characteristic.uuid().await.map_err(link_err)?;
                characteristics.insert(uuid, characteristic);
            }
        }
        debug!("{} exposes {} characteristics", address, characteristics.len());

        let closed = CancellationToken::new();
        let events = device.events().await.map_err(link_err)?;
        let watch = closed.clone();
        let addr = address.to_string();
        tokio::spawn(async move {
            let mut events = Box::pin(events);
            loop {
                tokio::select! {
                    _ = watch.cancelled() => break,
                    event = events.next() => match event {
                        Some(DeviceEvent::PropertyChanged(DeviceProperty::Connected(false))) | None => {
                            info!("{} reported disconnected", addr);
                            watch.cancel();
                            break;
                        }
                        Some(_) => {}
                    },
                }
            }
        });

        Ok(Arc::new(BluezLink {
            device,
            characteristics,
            closed,
        }))
    }
}

struct BluezLink {
    device: Device,
    characteristics: HashMap<Uuid, bluer::gatt::remote::Characteristic>,
    closed: CancellationToken,
}

impl BluezLink {
    fn characteristic(&self, uuid: Uuid) -> Result<&bluer::gatt::remote::Characteristic> {
        self.characteristics
            .get(&uuid)
            .ok_or_else(|| BedError::link(format!("characteristic {} not found", uuid)))
    }
}

#[async_trait]
impl Link for BluezLink {
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.characteristic(characteristic)?
            .write(data)
            .await
            .map_err(link_err)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<async_channel::Receiver<Vec<u8>>> {
        let stream = self
            .characteristic(characteristic)?
            .notify()
            .await
            .map_err(link_err)?;
        let (tx, rx) = async_channel::bounded(NOTIFY_CHANNEL_CAPACITY);
        let closed = self.closed.clone();

        tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    value = stream.next() => match value {
                        Some(value) => {
                            if tx.send(value).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("Notification stream for {} ended", characteristic);
        });

        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        let result = self.device.disconnect().await.map_err(link_err);
        self.closed.cancel();
        result
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }

    async fn set_connection_params(&self, params: ConnectionParams) -> Result<()> {
        // Device1 has no call for LE parameters; the kernel negotiates them.
        debug!(
            "Requested interval {:?}-{:?}, latency {}",
            params.min_interval, params.max_interval, params.latency
        );
        Ok(())
    }

    async fn rssi(&self) -> Option<i16> {
        match self.device.rssi().await {
            Ok(rssi) => rssi,
            Err(e) => {
                warn!("RSSI unavailable: {}", e);
                None
            }
        }
    }
}
