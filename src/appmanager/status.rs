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

//! Live pod and container status, written by the pod informer.

use crate::types::app::ContainerInfo;
use crate::types::node::NodeStatus;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const UNKNOWN: &str = "unknown";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub status: String,
    pub restart_count: i32,
}

/// waiting, running or terminated; unknown when the kubelet reported nothing.
pub fn container_status(status: Option<&ContainerStatus>) -> &'static str {
    let Some(state) = status.and_then(|s| s.state.as_ref()) else {
        return UNKNOWN;
    };
    if state.waiting.is_some() {
        "waiting"
    } else if state.running.is_some() {
        "running"
    } else if state.terminated.is_some() {
        "terminated"
    } else {
        UNKNOWN
    }
}

/// Pod phase in lower case, unknown when absent.
pub fn pod_phase(pod: &Pod) -> String {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(str::to_lowercase)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn container_key(pod_name: &str, container: &str) -> String {
    format!("{pod_name}-{container}")
}

#[derive(Default)]
struct Snapshot {
    pods: HashMap<String, String>,
    containers: HashMap<String, ContainerState>,
}

/// Single writer (the informer), many readers (instance listings).
#[derive(Default)]
pub struct AppStatusCache {
    inner: RwLock<Snapshot>,
}

impl AppStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn apply(&self, pod: &Pod) {
        let name = pod.name_any();
        let statuses = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.clone())
            .unwrap_or_default();

        let mut snapshot = self.write();
        snapshot.pods.insert(name.clone(), pod_phase(pod));
        for container in pod.spec.iter().flat_map(|s| s.containers.iter()) {
            let status = statuses.iter().find(|s| s.name == container.name);
            snapshot.containers.insert(
                container_key(&name, &container.name),
                ContainerState {
                    status: container_status(status).to_string(),
                    restart_count: status.map(|s| s.restart_count).unwrap_or_default(),
                },
            );
        }
    }

    pub fn forget(&self, pod: &Pod) {
        let name = pod.name_any();
        let mut snapshot = self.write();
        snapshot.pods.remove(&name);
        for container in pod.spec.iter().flat_map(|s| s.containers.iter()) {
            snapshot.containers.remove(&container_key(&name, &container.name));
        }
    }

    /// Pod status as shown to operators; unknown unless the node is ready.
    pub fn pod_status(&self, pod_name: &str, node_status: NodeStatus) -> String {
        if !node_status.is_ready() {
            return UNKNOWN.to_string();
        }
        self.read()
            .pods
            .get(pod_name)
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Fills status and restart count of stored container infos.
    pub fn container_infos(
        &self,
        pod_name: &str,
        stored: Vec<ContainerInfo>,
        node_status: NodeStatus,
    ) -> Vec<ContainerInfo> {
        let snapshot = self.read();
        stored
            .into_iter()
            .map(|mut info| {
                match snapshot.containers.get(&container_key(pod_name, &info.name)) {
                    Some(state) if node_status.is_ready() => {
                        info.status = state.status.clone();
                        info.restart_count = state.restart_count;
                    }
                    _ => info.status = UNKNOWN.to_string(),
                }
                info
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
