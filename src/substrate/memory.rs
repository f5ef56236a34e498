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

//! In-process substrate for tests and local runs.
//!
//! Keeps daemon-sets, nodes, secrets, pods and namespaces in maps, replays
//! node and pod changes to watchers, counts calls and can be told to fail a
//! given operation.

use super::{Error, Result, Substrate, WatchStream};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Node, Pod, Secret};
use kube::ResourceExt;
use kube::runtime::watcher::Event;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use strum::{Display, IntoStaticStr};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const EVENT_BUFFER: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum Operation {
    CreateDaemonSet,
    UpdateDaemonSet,
    GetDaemonSet,
    DeleteDaemonSet,
    GetNode,
    DeleteNode,
    AddNodeLabels,
    DeleteNodeLabels,
    EnsureNamespace,
    GetSecret,
    CreateSecret,
    UpdateSecret,
    ListPods,
    DeletePodByForce,
}

#[derive(Default)]
struct State {
    daemon_sets: BTreeMap<String, DaemonSet>,
    nodes: BTreeMap<String, Node>,
    secrets: BTreeMap<String, Secret>,
    pods: BTreeMap<String, Pod>,
    namespaces: BTreeSet<String>,
    calls: HashMap<Operation, usize>,
    failures: HashSet<Operation>,
}

pub struct MemorySubstrate {
    state: Mutex<State>,
    node_events: broadcast::Sender<Event<Node>>,
    pod_events: broadcast::Sender<Event<Pod>>,
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySubstrate {
    pub fn new() -> Self {
        let (node_events, _) = broadcast::channel(EVENT_BUFFER);
        let (pod_events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(State::default()),
            node_events,
            pod_events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every later call of `op` fail until [`Self::recover`].
    pub fn fail_on(&self, op: Operation) {
        self.lock().failures.insert(op);
    }

    pub fn recover(&self, op: Operation) {
        self.lock().failures.remove(&op);
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.lock()
            .calls
            .get(&op)
            .copied()
            .unwrap_or_default()
    }

    pub fn daemon_set_names(&self) -> Vec<String> {
        self.lock().daemon_sets.keys().cloned().collect()
    }

    pub fn daemon_set(&self, name: &str) -> Option<DaemonSet> {
        self.lock().daemon_sets.get(name).cloned()
    }

    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.lock().secrets.get(name).cloned()
    }

    pub fn node_labels(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.lock()
            .nodes
            .get(name)
            .map(|n| n.labels().clone())
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.lock().namespaces.contains(name)
    }

    /// Adds or replaces a node and notifies node watchers.
    pub fn apply_node(&self, node: Node) {
        self.lock().nodes.insert(node.name_any(), node.clone());
        let _ = self.node_events.send(Event::Apply(node));
    }

    pub fn remove_node(&self, name: &str) {
        let removed = self.lock().nodes.remove(name);
        if let Some(node) = removed {
            let _ = self.node_events.send(Event::Delete(node));
        }
    }

    pub fn apply_pod(&self, pod: Pod) {
        self.lock().pods.insert(pod.name_any(), pod.clone());
        let _ = self.pod_events.send(Event::Apply(pod));
    }

    pub fn remove_pod(&self, name: &str) {
        let removed = self.lock().pods.remove(name);
        if let Some(pod) = removed {
            let _ = self.pod_events.send(Event::Delete(pod));
        }
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.lock().pods.keys().cloned().collect()
    }

    /// Records the call and answers whether it should fail.
    fn enter(&self, op: Operation) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        *state.calls.entry(op).or_default() += 1;
        if state.failures.contains(&op) {
            return Err(Error::Unavailable {
                operation: op.to_string(),
            });
        }
        Ok(state)
    }

    fn replay<K>(receiver: broadcast::Receiver<Event<K>>, snapshot: Vec<K>) -> WatchStream<K>
    where
        K: Clone + Send + 'static,
    {
        let live = BroadcastStream::new(receiver)
            .filter_map(|event| futures::future::ready(event.ok()));

        let mut initial = Vec::with_capacity(snapshot.len() + 2);
        initial.push(Event::Init);
        initial.extend(snapshot.into_iter().map(Event::InitApply));
        initial.push(Event::InitDone);

        futures::stream::iter(initial).chain(live).map(Ok).boxed()
    }
}

fn not_found(kind: &'static str, name: &str) -> Error {
    Error::NotFound {
        kind,
        name: name.to_string(),
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        let mut state = self.enter(Operation::CreateDaemonSet)?;
        let name = daemon_set.name_any();
        if state.daemon_sets.contains_key(&name) {
            return Err(Error::AlreadyExists {
                kind: "daemonsets",
                name,
            });
        }
        state.daemon_sets.insert(name, daemon_set.clone());
        Ok(daemon_set.clone())
    }

    async fn update_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        let mut state = self.enter(Operation::UpdateDaemonSet)?;
        let name = daemon_set.name_any();
        match state.daemon_sets.get_mut(&name) {
            Some(current) => {
                *current = daemon_set.clone();
                Ok(daemon_set.clone())
            }
            None => Err(not_found("daemonsets", &name)),
        }
    }

    async fn get_daemon_set(&self, name: &str) -> Result<DaemonSet> {
        let state = self.enter(Operation::GetDaemonSet)?;
        state
            .daemon_sets
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("daemonsets", name))
    }

    async fn delete_daemon_set(&self, name: &str) -> Result<()> {
        let mut state = self.enter(Operation::DeleteDaemonSet)?;
        state
            .daemon_sets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("daemonsets", name))
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        let state = self.enter(Operation::GetNode)?;
        state
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("nodes", name))
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        let removed = {
            let mut state = self.enter(Operation::DeleteNode)?;
            state.nodes.remove(name)
        };
        match removed {
            Some(node) => {
                let _ = self.node_events.send(Event::Delete(node));
                Ok(())
            }
            None => Err(not_found("nodes", name)),
        }
    }

    async fn add_node_labels(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<()> {
        let updated = {
            let mut state = self.enter(Operation::AddNodeLabels)?;
            let node = state
                .nodes
                .get_mut(name)
                .ok_or_else(|| not_found("nodes", name))?;
            node.labels_mut().extend(labels.clone());
            node.clone()
        };
        let _ = self.node_events.send(Event::Apply(updated));
        Ok(())
    }

    async fn delete_node_labels(&self, name: &str, keys: &[String]) -> Result<()> {
        let updated = {
            let mut state = self.enter(Operation::DeleteNodeLabels)?;
            let node = state
                .nodes
                .get_mut(name)
                .ok_or_else(|| not_found("nodes", name))?;
            for key in keys {
                node.labels_mut().remove(key);
            }
            node.clone()
        };
        let _ = self.node_events.send(Event::Apply(updated));
        Ok(())
    }

    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        let mut state = self.enter(Operation::EnsureNamespace)?;
        state.namespaces.insert(name.to_string());
        Ok(())
    }

    async fn get_secret(&self, name: &str) -> Result<Secret> {
        let state = self.enter(Operation::GetSecret)?;
        state
            .secrets
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("secrets", name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret> {
        let mut state = self.enter(Operation::CreateSecret)?;
        let name = secret.name_any();
        if state.secrets.contains_key(&name) {
            return Err(Error::AlreadyExists {
                kind: "secrets",
                name,
            });
        }
        state.secrets.insert(name, secret.clone());
        Ok(secret.clone())
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret> {
        let mut state = self.enter(Operation::UpdateSecret)?;
        let name = secret.name_any();
        match state.secrets.get_mut(&name) {
            Some(current) => {
                *current = secret.clone();
                Ok(secret.clone())
            }
            None => Err(not_found("secrets", &name)),
        }
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let state = self.enter(Operation::ListPods)?;
        Ok(state.pods.values().cloned().collect())
    }

    async fn delete_pod_by_force(&self, name: &str) -> Result<()> {
        let removed = {
            let mut state = self.enter(Operation::DeletePodByForce)?;
            state.pods.remove(name)
        };
        match removed {
            Some(pod) => {
                let _ = self.pod_events.send(Event::Delete(pod));
                Ok(())
            }
            None => Err(not_found("pods", name)),
        }
    }

    fn watch_nodes(&self) -> WatchStream<Node> {
        // subscribe before the snapshot so no change falls in between
        let receiver = self.node_events.subscribe();
        let snapshot = self.lock().nodes.values().cloned().collect();
        Self::replay(receiver, snapshot)
    }

    fn watch_pods(&self) -> WatchStream<Pod> {
        let receiver = self.pod_events.subscribe();
        let snapshot = self.lock().pods.values().cloned().collect();
        Self::replay(receiver, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::edge_node;

    // Test 1: injected failures are reported and counted
    #[tokio::test]
    async fn test_failure_injection() {
        let substrate = MemorySubstrate::new();
        substrate.fail_on(Operation::CreateDaemonSet);
        let err = substrate
            .create_daemon_set(&DaemonSet::default())
            .await
            .expect_err("injected failure");
        assert!(matches!(err, Error::Unavailable { .. }));
        assert_eq!(substrate.call_count(Operation::CreateDaemonSet), 1);

        substrate.recover(Operation::CreateDaemonSet);
        assert!(substrate.create_daemon_set(&DaemonSet::default()).await.is_ok());
    }

    // Test 2: label mutation on absent nodes is a typed not-found
    #[tokio::test]
    async fn test_labels_on_missing_node() {
        let substrate = MemorySubstrate::new();
        let err = substrate
            .add_node_labels("ghost", &BTreeMap::new())
            .await
            .expect_err("no such node");
        assert!(err.is_not_found());

        substrate.apply_node(edge_node("edge-1", "SN1", "10.0.0.1"));
        let labels = BTreeMap::from([("MEF-Node1".to_string(), String::new())]);
        substrate.add_node_labels("edge-1", &labels).await.expect("add");
        assert!(
            substrate
                .node_labels("edge-1")
                .expect("node")
                .contains_key("MEF-Node1")
        );

        substrate
            .delete_node_labels("edge-1", &["MEF-Node1".to_string()])
            .await
            .expect("delete");
        assert!(
            !substrate
                .node_labels("edge-1")
                .expect("node")
                .contains_key("MEF-Node1")
        );
    }

    // Test 3: watchers first see the current objects
    #[tokio::test]
    async fn test_watch_replays_snapshot() {
        let substrate = MemorySubstrate::new();
        substrate.apply_node(edge_node("edge-1", "SN1", "10.0.0.1"));

        let mut stream = substrate.watch_nodes();
        assert!(matches!(stream.next().await, Some(Ok(Event::Init))));
        assert!(matches!(stream.next().await, Some(Ok(Event::InitApply(_)))));
        assert!(matches!(stream.next().await, Some(Ok(Event::InitDone))));

        substrate.remove_node("edge-1");
        assert!(matches!(stream.next().await, Some(Ok(Event::Delete(_)))));
    }
}
