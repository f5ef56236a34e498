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

//! Message envelope and the bus that carries it between modules and edges.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};
use zeroize::Zeroize;

pub mod local;

pub use local::{Delivery, EdgePeer, LocalBus};

/// Hub module that relays messages to edge agents.
pub const CLOUD_HUB_NAME: &str = "CloudHub";
pub const CERT_UPDATER_NAME: &str = "CertUpdater";
pub const EDGE_MANAGER_NAME: &str = "EdgeManager";
pub const NODE_MANAGER_NAME: &str = "NodeManager";
pub const APP_MANAGER_NAME: &str = "AppManager";
/// Upstream status reporter.
pub const CLOUD_REPORTER_NAME: &str = "CloudReporter";

pub const RES_EDGE_DOWNLOAD_INFO: &str = "/edge/download";
pub const RES_EDGE_UPGRADE_INFO: &str = "/edge/upgrade";
pub const RES_CONFIG: &str = "/config";
pub const RES_EDGE_CERT: &str = "/cert/edge";
pub const RES_DELETE_NODE: &str = "/edgemanager/delete/node";
pub const RES_NODE_CHANGED: &str = "/nodemanager/node/changed";
pub const RES_NODE_STATUS: &str = "/nodemanager/node/status";

/// Content of a successful edge acknowledgement.
pub const OK: &str = "OK";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("no response from {} within {:?}", destination, timeout))]
    Timeout {
        destination: String,
        timeout: Duration,
    },

    #[snafu(display("edge {} is not connected", sn))]
    PeerNotConnected { sn: String },

    #[snafu(display("module {} is not registered", name))]
    ModuleNotRegistered { name: String },

    #[snafu(display("channel to {} closed", destination))]
    Closed { destination: String },

    #[snafu(display("encode message content failed: {}", source))]
    Encode { source: serde_json::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[derive(Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Patch,
    Response,
    Query,
    Post,
    Get,
    Inner,
    Report,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub sync: bool,
    /// Serial number of the edge the message is addressed to or came from.
    #[serde(default)]
    pub node_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub group: String,
    pub resource: String,
    pub operation: Operation,
}

/// Authenticated identity of the edge a message came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub sn: String,
    pub ip: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub header: Header,
    pub router: Route,
    #[serde(default)]
    pub content: serde_json::Value,
    /// Stamped by the transport, never taken from the wire.
    #[serde(skip)]
    pub peer: Option<PeerInfo>,
    /// Content is wiped when the message is dropped.
    #[serde(skip)]
    pub secret: bool,
}

impl Drop for Message {
    fn drop(&mut self) {
        if self.secret {
            scrub_json(&mut self.content);
        }
    }
}

/// Overwrites every string and number of `value` in place.
pub fn scrub_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => s.zeroize(),
        serde_json::Value::Number(_) | serde_json::Value::Bool(_) => {
            *value = serde_json::Value::from(0u8);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(scrub_json),
        serde_json::Value::Object(map) => map.values_mut().for_each(scrub_json),
        serde_json::Value::Null => {}
    }
    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
}

impl Message {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        operation: Operation,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            header: Header {
                id: uuid::Uuid::new_v4().to_string(),
                parent_id: String::new(),
                timestamp: Utc::now().timestamp_millis(),
                sync: false,
                node_id: String::new(),
            },
            router: Route {
                source: source.into(),
                destination: destination.into(),
                group: String::new(),
                resource: resource.into(),
                operation,
            },
            content: serde_json::Value::Null,
            peer: None,
            secret: false,
        }
    }

    /// Message from this manager to the edge `sn` through the hub.
    pub fn to_edge(sn: &str, operation: Operation, resource: &str) -> Self {
        let mut msg = Self::new(EDGE_MANAGER_NAME, CLOUD_HUB_NAME, operation, resource);
        msg.header.node_id = sn.to_string();
        msg
    }

    pub fn with_content<T: Serialize + ?Sized>(mut self, content: &T) -> Result<Self> {
        self.content = serde_json::to_value(content).context(EncodeSnafu)?;
        Ok(self)
    }

    /// Marks the content as credentials, wiped on drop by whoever holds the
    /// message last. Clones keep the mark.
    pub fn with_secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.header.sync = sync;
        self
    }

    /// Reply addressed back to the sender, linked by parent id.
    pub fn response(&self, content: serde_json::Value) -> Self {
        let mut reply = Self::new(
            self.router.destination.clone(),
            self.router.source.clone(),
            Operation::Response,
            self.router.resource.clone(),
        );
        reply.header.parent_id = self.header.id.clone();
        reply.header.node_id = self.header.node_id.clone();
        reply.content = content;
        reply
    }

    pub fn content_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.content.clone())
    }

    pub fn is_edge_bound(&self) -> bool {
        self.router.destination == CLOUD_HUB_NAME
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fire and forget.
    async fn send(&self, msg: Message) -> Result<()>;

    /// Sends and waits for the reply, at most `timeout`.
    async fn send_sync(&self, msg: Message, timeout: Duration) -> Result<Message>;

    /// Whether the hub currently holds a session for edge `sn`.
    async fn is_connected(&self, sn: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: replies link to the request and swap direction
    #[test]
    fn test_response_links_parent() {
        let msg = Message::to_edge("SN1", Operation::Update, RES_EDGE_DOWNLOAD_INFO);
        let reply = msg.response(serde_json::json!(OK));
        assert_eq!(reply.header.parent_id, msg.header.id);
        assert_eq!(reply.router.source, CLOUD_HUB_NAME);
        assert_eq!(reply.router.destination, EDGE_MANAGER_NAME);
        assert_eq!(reply.router.operation, Operation::Response);
        assert_eq!(reply.header.node_id, "SN1");
    }

    // Test 2: peer identity never comes from the wire
    #[test]
    fn test_peer_not_deserialized() {
        let mut msg = Message::new("edge", EDGE_MANAGER_NAME, Operation::Report, "x");
        msg.peer = Some(PeerInfo {
            sn: "SN1".into(),
            ip: "10.0.0.1".into(),
        });
        let wire = serde_json::to_string(&msg).expect("encode");
        let back: Message = serde_json::from_str(&wire).expect("decode");
        assert_eq!(back.peer, None);
        assert_eq!(back.router.operation, Operation::Report);
    }

    // Test 3: scrubbing leaves the shape but no credential bytes
    #[test]
    fn test_scrub_json() {
        let mut content = serde_json::json!({
            "userName": "FileTransferAccount",
            "password": [72, 117, 97, 119],
            "nested": {"keep": null, "flag": true}
        });
        scrub_json(&mut content);
        assert_eq!(content["userName"], "");
        assert_eq!(content["password"], serde_json::json!([0, 0, 0, 0]));
        assert_eq!(content["nested"], serde_json::json!({"keep": null, "flag": 0}));

        let msg = Message::to_edge("SN1", Operation::Update, RES_EDGE_DOWNLOAD_INFO).with_secret();
        assert!(msg.clone().secret);
    }
}
