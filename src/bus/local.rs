// Copyright 2025 RustFS Team
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

//! In-process [`MessageBus`]: edges and modules are channel endpoints.

use super::{Error, Message, MessageBus, PeerInfo, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A message handed to an endpoint, with the reply slot of a sync send.
#[derive(Debug)]
pub struct Delivery {
    pub message: Message,
    reply: Option<oneshot::Sender<Message>>,
}

impl Delivery {
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Answers a sync send. `false` when the sender stopped waiting.
    pub fn reply(self, content: serde_json::Value) -> bool {
        match self.reply {
            Some(tx) => tx.send(self.message.response(content)).is_ok(),
            None => false,
        }
    }
}

/// Session of one edge agent.
pub struct EdgePeer {
    info: PeerInfo,
    deliveries: mpsc::Receiver<Delivery>,
    inbound: mpsc::Sender<Message>,
}

impl EdgePeer {
    pub fn sn(&self) -> &str {
        &self.info.sn
    }

    pub async fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    /// Sends a message from the edge. The session identity is stamped on it.
    pub async fn report(&self, mut msg: Message) -> Result<()> {
        msg.header.node_id = self.info.sn.clone();
        msg.peer = Some(self.info.clone());
        self.inbound.send(msg).await.map_err(|_| Error::Closed {
            destination: "inbound".to_string(),
        })
    }

    /// Answers every sync delivery with `content` until the session closes,
    /// then yields everything received.
    pub fn respond_with(mut self, content: serde_json::Value) -> JoinHandle<Vec<Message>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(delivery) = self.deliveries.recv().await {
                seen.push(delivery.message.clone());
                if delivery.expects_reply() {
                    delivery.reply(content.clone());
                }
            }
            seen
        })
    }
}

struct Inner {
    capacity: usize,
    edges: RwLock<HashMap<String, mpsc::Sender<Delivery>>>,
    modules: RwLock<HashMap<String, mpsc::Sender<Delivery>>>,
    inbound: mpsc::Sender<Message>,
}

#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

impl LocalBus {
    /// Returns the bus and the receiver of every edge-originated message.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (inbound, inbound_rx) = mpsc::channel(capacity);
        let bus = Self {
            inner: Arc::new(Inner {
                capacity,
                edges: RwLock::new(HashMap::new()),
                modules: RwLock::new(HashMap::new()),
                inbound,
            }),
        };
        (bus, inbound_rx)
    }

    /// Opens a session for `sn`, replacing any previous one.
    pub async fn connect(&self, sn: &str, ip: &str) -> EdgePeer {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        if self
            .inner
            .edges
            .write()
            .await
            .insert(sn.to_string(), tx)
            .is_some()
        {
            debug!("edge {} reconnected, previous session dropped", sn);
        }
        EdgePeer {
            info: PeerInfo {
                sn: sn.to_string(),
                ip: ip.to_string(),
            },
            deliveries: rx,
            inbound: self.inner.inbound.clone(),
        }
    }

    pub async fn disconnect(&self, sn: &str) {
        self.inner.edges.write().await.remove(sn);
    }

    pub async fn register_module(&self, name: &str) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner.modules.write().await.insert(name.to_string(), tx);
        rx
    }

    /// Serial numbers with a live session.
    pub async fn peers(&self) -> Vec<String> {
        let edges = self.inner.edges.read().await;
        let mut peers: Vec<String> = edges
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(sn, _)| sn.clone())
            .collect();
        peers.sort();
        peers
    }

    async fn endpoint(&self, msg: &Message) -> Result<mpsc::Sender<Delivery>> {
        if msg.is_edge_bound() {
            let sn = &msg.header.node_id;
            self.inner
                .edges
                .read()
                .await
                .get(sn)
                .filter(|tx| !tx.is_closed())
                .cloned()
                .ok_or_else(|| Error::PeerNotConnected { sn: sn.clone() })
        } else {
            let name = &msg.router.destination;
            self.inner
                .modules
                .read()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| Error::ModuleNotRegistered { name: name.clone() })
        }
    }

    async fn deliver(&self, delivery: Delivery) -> Result<()> {
        let endpoint = self.endpoint(&delivery.message).await?;
        let destination = delivery.message.router.destination.clone();
        endpoint.send(delivery).await.map_err(|e| {
            let msg = e.0.message;
            if msg.is_edge_bound() {
                Error::PeerNotConnected {
                    sn: msg.header.node_id.clone(),
                }
            } else {
                Error::Closed { destination }
            }
        })
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn send(&self, msg: Message) -> Result<()> {
        self.deliver(Delivery {
            message: msg,
            reply: None,
        })
        .await
    }

    async fn send_sync(&self, mut msg: Message, timeout: Duration) -> Result<Message> {
        msg.header.sync = true;
        let destination = if msg.is_edge_bound() {
            msg.header.node_id.clone()
        } else {
            msg.router.destination.clone()
        };

        let (tx, rx) = oneshot::channel();
        self.deliver(Delivery {
            message: msg,
            reply: Some(tx),
        })
        .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                warn!("{} dropped a sync message without answering", destination);
                Err(Error::Closed { destination })
            }
            Err(_) => Err(Error::Timeout {
                destination,
                timeout,
            }),
        }
    }

    async fn is_connected(&self, sn: &str) -> bool {
        self.inner
            .edges
            .read()
            .await
            .get(sn)
            .is_some_and(|tx| !tx.is_closed())
    }
}
