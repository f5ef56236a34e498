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

//! Substrate view of nodes, as last delivered by the node informer.

use crate::types::node::NodeStatus;
use crate::types::resources::{self, Resources};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

pub const MASTER_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/master",
    "node-role.kubernetes.io/control-plane",
];

pub fn is_master(node: &Node) -> bool {
    MASTER_LABELS.iter().any(|l| node.labels().contains_key(*l))
}

pub fn serial_number(node: &Node) -> Option<&str> {
    node.labels()
        .get(crate::SERIAL_NUMBER_LABEL)
        .map(String::as_str)
}

/// All internal and external addresses, comma separated.
pub fn ip_address(node: &Node) -> String {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .map(|addresses| {
            addresses
                .iter()
                .filter(|a| a.type_ == "InternalIP" || a.type_ == "ExternalIP")
                .map(|a| a.address.as_str())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// Status from the Ready condition; no condition means offline.
pub fn eval_status(node: &Node) -> NodeStatus {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"));

    match ready.map(|c| c.status.as_str()) {
        Some("True") => NodeStatus::Ready,
        Some("False") => NodeStatus::NotReady,
        Some("Unknown") => NodeStatus::Unknown,
        _ => NodeStatus::Offline,
    }
}

/// Allocatable cpu, memory and NPU count; unparsable quantities count as zero.
pub fn allocatable(node: &Node, device_type: &str) -> Resources {
    let Some(alloc) = node.status.as_ref().and_then(|s| s.allocatable.as_ref()) else {
        return Resources::default();
    };

    let name = node.name_any();
    let cpu = alloc
        .get("cpu")
        .map(resources::cpu_cores)
        .transpose()
        .unwrap_or_else(|e| {
            warn!("node {} has a bad cpu quantity: {}", name, e);
            None
        });
    let memory = alloc
        .get("memory")
        .map(resources::memory_mib)
        .transpose()
        .unwrap_or_else(|e| {
            warn!("node {} has a bad memory quantity: {}", name, e);
            None
        });
    let npu = alloc
        .get(device_type)
        .map(resources::device_count)
        .transpose()
        .unwrap_or_else(|e| {
            warn!("node {} has a bad {} quantity: {}", name, device_type, e);
            None
        });

    Resources {
        cpu: cpu.unwrap_or_default(),
        memory: memory.unwrap_or_default(),
        npu: npu.unwrap_or_default(),
    }
}

/// Nodes keyed by name. Written by the node informer only.
#[derive(Default)]
pub struct NodeStatusCache {
    nodes: RwLock<HashMap<String, Node>>,
}

impl NodeStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Node>> {
        self.nodes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Node>> {
        self.nodes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn apply(&self, node: &Node) {
        self.write().insert(node.name_any(), node.clone());
    }

    pub fn remove(&self, name: &str) {
        self.write().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Node> {
        self.read().get(name).cloned()
    }

    /// Substrate status; unknown nodes are offline.
    pub fn substrate_status(&self, name: &str) -> NodeStatus {
        self.read()
            .get(name)
            .map(eval_status)
            .unwrap_or(NodeStatus::Offline)
    }

    pub fn allocatable(&self, name: &str, device_type: &str) -> Option<Resources> {
        self.read().get(name).map(|n| allocatable(n, device_type))
    }
}
