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

//! Keeps node rows, group labels and the status cache in step with the
//! substrate's node objects.

use super::status::{eval_status, ip_address, is_master, serial_number};
use super::{NodeService, Result};
use crate::bus::{
    CERT_UPDATER_NAME, CLOUD_REPORTER_NAME, Message, NODE_MANAGER_NAME, Operation,
    RES_NODE_CHANGED, RES_NODE_STATUS,
};
use crate::persistence::{self, NewNode, nodes, relations};
use crate::substrate::{EventHandler, Informer, parse_group_label};
use crate::types::node::NodeStatus;
use crate::validation::primitives::RegexChecker;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimpleNodeInfo {
    pub sn: String,
    pub ip: String,
}

/// Body of a node-changed notice to the cert updater.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedNodeInfo {
    pub added_node_info: Vec<SimpleNodeInfo>,
    pub deleted_node_info: Vec<SimpleNodeInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub sn: String,
    pub status: NodeStatus,
}

/// Group labels a node carries.
fn group_labels(node: &Node) -> Vec<String> {
    node.labels()
        .keys()
        .filter(|k| parse_group_label(k).is_some())
        .cloned()
        .collect()
}

pub struct NodeEventHandler {
    service: Arc<NodeService>,
}

impl NodeEventHandler {
    pub fn new(service: Arc<NodeService>) -> Self {
        Self { service }
    }

    async fn report_changed(&self, node: &Node, added: bool) {
        let Some(sn) = serial_number(node) else {
            debug!("node {} has no serial number, skip change report", node.name_any());
            return;
        };
        let info = SimpleNodeInfo {
            sn: sn.to_string(),
            ip: ip_address(node),
        };
        let mut changed = ChangedNodeInfo::default();
        if added {
            changed.added_node_info.push(info);
        } else {
            changed.deleted_node_info.push(info);
        }

        let msg =
            Message::new(NODE_MANAGER_NAME, CERT_UPDATER_NAME, Operation::Post, RES_NODE_CHANGED)
            .with_content(&changed);
        let sent = match msg {
            Ok(msg) => self.service.bus.send(msg).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("report change of node {} failed: {}", sn, e);
        }
    }

    async fn report_status(&self, sn: &str, status: NodeStatus) {
        let report = StatusReport {
            sn: sn.to_string(),
            status,
        };
        let msg =
            Message::new(NODE_MANAGER_NAME, CLOUD_REPORTER_NAME, Operation::Update, RES_NODE_STATUS)
            .with_content(&report);
        let sent = match msg {
            Ok(msg) => self.service.bus.send(msg).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("report status of node {} failed: {}", sn, e);
        }
    }

    /// Registers the node as discovered; a known serial number only refreshes.
    async fn register(&self, node: &Node) -> Result<()> {
        let name = node.name_any();
        let Some(sn) = serial_number(node) else {
            warn!("node {} has no {} label, not registered", name, crate::SERIAL_NUMBER_LABEL);
            return Ok(());
        };
        if !RegexChecker::serial_number().is_match(sn) {
            warn!("node {} has an invalid serial number, not registered", name);
            return Ok(());
        }
        let id = self
            .service
            .create_node(&NewNode {
                node_name: name.clone(),
                unique_name: name.clone(),
                serial_number: sn.to_string(),
                ip: ip_address(node),
            })
            .await?;
        debug!("node {} registered with id {}", name, id);
        Ok(())
    }

    /// Strips group labels from a node that is not managed.
    async fn clean_labels(&self, node: &Node) -> Result<()> {
        let labels = group_labels(node);
        if labels.is_empty() {
            return Ok(());
        }
        let name = node.name_any();
        let managed = nodes::get_node_by_unique_name(&self.service.db, &name)
            .await?
            .is_some_and(|n| n.is_managed);
        if managed {
            return Ok(());
        }
        self.service.substrate.delete_node_labels(&name, &labels).await?;
        info!("removed group labels {:?} from unmanaged node {}", labels, name);
        Ok(())
    }

    /// Forgets a node the substrate deleted.
    async fn unregister(&self, node: &Node) -> Result<()> {
        let name = node.name_any();
        let Some(record) = nodes::get_node_by_unique_name(&self.service.db, &name).await? else {
            return Ok(());
        };
        let mut tx = persistence::begin(&self.service.db).await?;
        relations::delete_by_node(&mut *tx, record.id).await?;
        nodes::delete_node(&mut *tx, record.id).await?;
        persistence::commit(tx).await?;
        info!("node {} (sn={}) removed after substrate deletion", name, record.serial_number);

        self.service.notify_node_deleted(&record.serial_number).await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler<Node> for NodeEventHandler {
    async fn on_add(&self, node: &Node) {
        if is_master(node) {
            return;
        }
        self.service.status.apply(node);
        self.report_changed(node, true).await;

        if let Err(e) = self.register(node).await {
            error!("automatically adding node {} failed: {}", node.name_any(), e);
            return;
        }
        if let Err(e) = self.clean_labels(node).await {
            warn!("clean labels of node {} failed: {}", node.name_any(), e);
        }
    }

    async fn on_update(&self, old: &Node, new: &Node) {
        if is_master(new) {
            return;
        }
        self.service.status.apply(new);

        let name = new.name_any();
        let ip = ip_address(new);
        if ip != ip_address(old)
            && let Err(e) = self.register(new).await
        {
            warn!("refresh node {} failed: {}", name, e);
        }
        if let Err(e) = self.clean_labels(new).await {
            warn!("clean labels of node {} failed: {}", name, e);
        }

        let (before, after) = (eval_status(old), eval_status(new));
        if before == after {
            return;
        }
        let Some(sn) = serial_number(new) else {
            return;
        };
        match nodes::get_node_by_unique_name(&self.service.db, &name).await {
            Ok(Some(record)) if record.is_managed => {
                info!("node {} status changed from {} to {}", name, before, after);
                self.report_status(sn, after).await;
            }
            Ok(_) => {}
            Err(e) => warn!("look up node {} failed: {}", name, e),
        }
    }

    async fn on_delete(&self, node: &Node) {
        if is_master(node) {
            return;
        }
        self.service.status.remove(&node.name_any());
        self.report_changed(node, false).await;

        if let Err(e) = self.unregister(node).await {
            error!("remove node {} failed: {}", node.name_any(), e);
        }
    }
}

/// Prunes stale discovered rows, then starts the node informer.
///
/// Returns the informer task and a receiver that flips once the first
/// listing has been handled.
pub async fn start(
    service: Arc<NodeService>,
    shutdown: CancellationToken,
) -> Result<(JoinHandle<()>, watch::Receiver<bool>)> {
    service.prune_unmanaged_nodes().await?;

    let informer = Informer::<Node>::new("node");
    let synced = informer.synced();
    let stream = service.substrate.watch_nodes();
    let handler = Arc::new(NodeEventHandler::new(service));
    let task = tokio::spawn(informer.run(stream, handler, shutdown));
    Ok((task, synced))
}

#[cfg(test)]
mod tests {
    use super::super::testing::harness;
    use super::*;
    use crate::substrate::group_label;
    use crate::substrate::informer::wait_for_sync;
    use crate::tests::{edge_node, with_ready};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn labelled(mut node: Node, key: &str) -> Node {
        node.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), String::new());
        node
    }

    async fn next_report(rx: &mut tokio::sync::mpsc::Receiver<crate::bus::Delivery>) -> Message {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("report in time")
            .expect("channel open")
            .message
    }

    // Test 1: an added node is cached, registered and announced
    #[tokio::test]
    async fn test_add_registers_node() {
        let h = harness().await;
        let mut certs = h.bus.register_module(CERT_UPDATER_NAME).await;
        let handler = NodeEventHandler::new(h.service.clone());

        handler.on_add(&edge_node("edge-1", "SN1", "10.0.0.1")).await;

        assert!(h.service.status.get("edge-1").is_some());
        let row = nodes::get_node_by_sn(&h.db, "SN1")
            .await
            .expect("query")
            .expect("registered");
        assert!(!row.is_managed);
        assert_eq!(row.ip, "10.0.0.1");

        let msg = next_report(&mut certs).await;
        assert_eq!(msg.router.resource, RES_NODE_CHANGED);
        assert_eq!(
            msg.content,
            serde_json::json!({
                "addedNodeInfo": [{"sn": "SN1", "ip": "10.0.0.1"}],
                "deletedNodeInfo": []
            })
        );
    }

    // Test 2: masters and nodes without a valid serial number are not registered
    #[tokio::test]
    async fn test_add_skips_foreign_nodes() {
        let h = harness().await;
        let handler = NodeEventHandler::new(h.service.clone());

        let master = labelled(
            edge_node("master-1", "SN0", "10.0.0.100"),
            "node-role.kubernetes.io/control-plane",
        );
        handler.on_add(&master).await;
        assert!(h.service.status.get("master-1").is_none(), "masters are ignored");

        handler.on_add(&edge_node("edge-2", "bad sn!", "10.0.0.2")).await;
        assert_eq!(nodes::count_nodes(&h.db).await.expect("count"), 0);
    }

    // Test 3: stray group labels are stripped from unmanaged nodes only
    #[tokio::test]
    async fn test_labels_cleaned_for_unmanaged() {
        let h = harness().await;
        let handler = NodeEventHandler::new(h.service.clone());
        let stray = labelled(edge_node("edge-1", "SN1", "10.0.0.1"), &group_label(3));
        h.substrate.apply_node(stray.clone());

        handler.on_add(&stray).await;
        let labels = h.substrate.node_labels("edge-1").expect("node");
        assert!(!labels.contains_key(&group_label(3)));

        let row = nodes::get_node_by_sn(&h.db, "SN1").await.expect("query").expect("row");
        nodes::manage_node(&h.db, row.id, "edge-1", "").await.expect("manage");
        let kept = labelled(edge_node("edge-1", "SN1", "10.0.0.1"), &group_label(4));
        h.substrate.apply_node(kept.clone());
        handler.on_update(&stray, &kept).await;
        let labels = h.substrate.node_labels("edge-1").expect("node");
        assert!(labels.contains_key(&group_label(4)), "managed nodes keep their labels");
    }

    // Test 4: status changes of managed nodes are reported upstream
    #[tokio::test]
    async fn test_update_reports_status_change() {
        let h = harness().await;
        let mut reporter = h.bus.register_module(CLOUD_REPORTER_NAME).await;
        let handler = NodeEventHandler::new(h.service.clone());
        let ready = edge_node("edge-1", "SN1", "10.0.0.1");
        handler.on_add(&ready).await;
        let row = nodes::get_node_by_sn(&h.db, "SN1").await.expect("query").expect("row");
        nodes::manage_node(&h.db, row.id, "edge-1", "").await.expect("manage");

        let not_ready = with_ready(ready.clone(), "False");
        handler.on_update(&ready, &not_ready).await;

        let msg = next_report(&mut reporter).await;
        assert_eq!(msg.router.resource, RES_NODE_STATUS);
        assert_eq!(msg.content, serde_json::json!({"sn": "SN1", "status": "notReady"}));
    }

    // Test 5: deletion removes the row, its relations and the progress entry
    #[tokio::test]
    async fn test_delete_forgets_node() {
        let h = harness().await;
        let handler = NodeEventHandler::new(h.service.clone());
        let node = edge_node("edge-1", "SN1", "10.0.0.1");
        handler.on_add(&node).await;
        let row = nodes::get_node_by_sn(&h.db, "SN1").await.expect("query").expect("row");
        let g = crate::persistence::groups::insert_group(&h.db, "groupA", "")
            .await
            .expect("group");
        relations::insert_relation(&h.db, row.id, g).await.expect("relation");
        h.progress.reset("SN1");

        handler.on_delete(&node).await;

        assert!(nodes::get_node_by_sn(&h.db, "SN1").await.expect("query").is_none());
        assert!(!relations::exists(&h.db, row.id, g).await.expect("exists"));
        assert!(h.progress.get("SN1").is_none());
        assert!(h.service.status.get("edge-1").is_none());
    }

    // Test 6: startup prunes stale rows and syncs from the watch feed
    #[tokio::test]
    async fn test_start_prunes_and_syncs() {
        let h = harness().await;
        nodes::upsert_node(
            &h.db,
            &NewNode {
                node_name: "gone".into(),
                unique_name: "gone".into(),
                serial_number: "SNX".into(),
                ip: "10.0.0.9".into(),
            },
        )
        .await
        .expect("stale row");
        h.substrate.apply_node(edge_node("edge-1", "SN1", "10.0.0.1"));

        let shutdown = CancellationToken::new();
        let (task, synced) = start(h.service.clone(), shutdown.clone())
            .await
            .expect("start");
        assert!(wait_for_sync(synced).await);

        assert!(nodes::get_node_by_sn(&h.db, "SNX").await.expect("query").is_none());
        assert!(nodes::get_node_by_sn(&h.db, "SN1").await.expect("query").is_some());

        shutdown.cancel();
        task.await.expect("informer stops");
    }
}
