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

//! Cluster-orchestration substrate façade.
//!
//! Services talk to the cluster only through [`Substrate`]. The production
//! implementation is [`client::KubeSubstrate`]; tests use
//! [`memory::MemorySubstrate`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Node, Pod, Secret};
use kube::runtime::watcher;
use snafu::Snafu;
use std::collections::BTreeMap;

pub mod client;
pub mod informer;
pub mod memory;

pub use client::KubeSubstrate;
pub use informer::{EventHandler, Informer, InformerEvent};
pub use memory::MemorySubstrate;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} \"{}\" not found", kind, name))]
    NotFound { kind: &'static str, name: String },

    #[snafu(display("{} \"{}\" already exists", kind, name))]
    AlreadyExists { kind: &'static str, name: String },

    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("substrate unavailable during {}", operation))]
    Unavailable { operation: String },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Raw watch feed, the same shape the kube watcher produces.
pub type WatchStream<K> = BoxStream<'static, Result<watcher::Event<K>, watcher::Error>>;

#[async_trait]
pub trait Substrate: Send + Sync {
    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet>;
    async fn update_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet>;
    async fn get_daemon_set(&self, name: &str) -> Result<DaemonSet>;
    async fn delete_daemon_set(&self, name: &str) -> Result<()>;

    async fn get_node(&self, name: &str) -> Result<Node>;
    async fn delete_node(&self, name: &str) -> Result<()>;
    async fn add_node_labels(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<()>;
    async fn delete_node_labels(&self, name: &str, keys: &[String]) -> Result<()>;

    /// Creates the namespace; an existing one counts as success.
    async fn ensure_namespace(&self, name: &str) -> Result<()>;

    async fn get_secret(&self, name: &str) -> Result<Secret>;
    async fn create_secret(&self, secret: &Secret) -> Result<Secret>;
    async fn update_secret(&self, secret: &Secret) -> Result<Secret>;

    async fn list_pods(&self) -> Result<Vec<Pod>>;
    async fn delete_pod_by_force(&self, name: &str) -> Result<()>;

    fn watch_nodes(&self) -> WatchStream<Node>;
    fn watch_pods(&self) -> WatchStream<Pod>;
}

/// Label marking membership of a node in a node group.
pub fn group_label(group_id: u64) -> String {
    format!("{}{}", crate::NODE_GROUP_LABEL_PREFIX, group_id)
}

/// Parses a group label key back into its group id.
pub fn parse_group_label(key: &str) -> Option<u64> {
    key.strip_prefix(crate::NODE_GROUP_LABEL_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: group label keys
    #[test]
    fn test_group_label_round_trip() {
        assert_eq!(group_label(7), "MEF-Node7");
        assert_eq!(parse_group_label("MEF-Node7"), Some(7));
        assert_eq!(parse_group_label("MEF-Nodex"), None);
        assert_eq!(parse_group_label("serialNumber"), None);
    }
}
