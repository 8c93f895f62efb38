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

//! In-memory link service for tests and dry runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::link::{ConnectionParams, Link, LinkService, NOTIFY_CHANNEL_CAPACITY};
use crate::error::{BedError, Result};

type WriteHook = Arc<dyn Fn(Uuid, &[u8]) + Send + Sync>;
type DisconnectHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct MockState {
    writes: Vec<(Uuid, Vec<u8>)>,
    connect_attempts: u32,
    disconnects: u32,
    fail_connects: u32,
    stall_writes: bool,
    subscribers: HashMap<Uuid, Vec<async_channel::Sender<Vec<u8>>>>,
    on_write: Option<WriteHook>,
    on_disconnect: Option<DisconnectHook>,
    connection_params: Option<ConnectionParams>,
    /// Id and close token of the live link.
    current: Option<(u64, CancellationToken)>,
    next_id: u64,
}

/// Records every write and lets tests script connection behaviour.
#[derive(Clone, Default)]
pub struct MockLinkService {
    state: Arc<Mutex<MockState>>,
}

impl MockLinkService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` connection attempts.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().fail_connects = n;
    }

    /// Make writes hang until the caller gives up.
    pub fn stall_writes(&self, stall: bool) {
        self.state.lock().stall_writes = stall;
    }

    pub fn on_write(&self, hook: impl Fn(Uuid, &[u8]) + Send + Sync + 'static) {
        self.state.lock().on_write = Some(Arc::new(hook));
    }

    /// Runs inside [`Link::disconnect`], before the link is torn down.
    pub fn on_disconnect(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().on_disconnect = Some(Arc::new(hook));
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    pub fn written_bytes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .writes
            .iter()
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    pub fn disconnects(&self) -> u32 {
        self.state.lock().disconnects
    }

    pub fn connection_params(&self) -> Option<ConnectionParams> {
        self.state.lock().connection_params
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .map(|(_, token)| !token.is_cancelled())
            .unwrap_or(false)
    }

    /// Deliver a notification to every subscriber of `characteristic`.
    /// Returns false when nobody is listening.
    pub fn notify(&self, characteristic: Uuid, data: &[u8]) -> bool {
        let state = self.state.lock();
        let Some(senders) = state.subscribers.get(&characteristic) else {
            return false;
        };
        let mut delivered = false;
        for tx in senders {
            delivered |= tx.try_send(data.to_vec()).is_ok();
        }
        delivered
    }

    /// Simulate the peer going away without a disconnect request.
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        if let Some((_, token)) = state.current.take() {
            debug!("Mock link dropped");
            token.cancel();
        }
        state.subscribers.clear();
    }
}

#[async_trait]
impl LinkService for MockLinkService {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Link>> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(BedError::link(format!("{} did not answer", address)));
        }

        let closed = CancellationToken::new();
        let id = state.next_id;
        state.next_id += 1;
        state.current = Some((id, closed.clone()));
        debug!("Mock link {} to {} established", id, address);
        Ok(Arc::new(MockLink {
            id,
            state: self.state.clone(),
            closed,
        }))
    }
}

struct MockLink {
    id: u64,
    state: Arc<Mutex<MockState>>,
    closed: CancellationToken,
}

#[async_trait]
impl Link for MockLink {
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(BedError::link("link closed"));
        }
        let (stall, hook) = {
            let state = self.state.lock();
            (state.stall_writes, state.on_write.clone())
        };
        if stall {
            std::future::pending::<()>().await;
        }

        self.state.lock().writes.push((characteristic, data.to_vec()));
        if let Some(hook) = hook {
            hook(characteristic, data);
        }
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<async_channel::Receiver<Vec<u8>>> {
        let (tx, rx) = async_channel::bounded(NOTIFY_CHANNEL_CAPACITY);
        self.state
            .lock()
            .subscribers
            .entry(characteristic)
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        let hook = self.state.lock().on_disconnect.clone();
        if let Some(hook) = hook {
            hook();
        }

        let mut state = self.state.lock();
        state.disconnects += 1;
        state.subscribers.clear();
        if state
            .current
            .as_ref()
            .map(|(id, _)| *id == self.id)
            .unwrap_or(false)
        {
            state.current = None;
        }
        self.closed.cancel();
        Ok(())
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }

    async fn set_connection_params(&self, params: ConnectionParams) -> Result<()> {
        self.state.lock().connection_params = Some(params);
        Ok(())
    }

    async fn rssi(&self) -> Option<i16> {
        Some(-60)
    }
}
