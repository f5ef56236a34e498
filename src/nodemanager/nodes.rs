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

use super::{
    DecodeSnafu, LimitSnafu, NodeService, ParamSnafu, RefusedSnafu, Result, check, group_request,
};
use crate::bus::PeerInfo;
use crate::persistence::nodes::Membership;
use crate::persistence::{self, NewNode, NodeRecord, nodes, not_found, relations};
use crate::types::BatchResp;
use crate::types::node::{
    AddUnManagedNodeReq, BatchDeleteNodeReq, ListNodesResp, ListReq, ModifyNodeReq,
    NodeDetailReq, NodeDetailResp, NodeIdentifier, NodeStatistics, NodeStatus, SoftwareInfo,
    SoftwareReport,
};
use crate::types::resources::Resources;
use crate::validation::edge::software_info_checker;
use crate::validation::node::{
    MAX_NODE, add_unmanaged_node_checker, batch_delete_node_checker, modify_node_checker,
    node_identifier,
};
use crate::validation::primitives::PaginationChecker;
use snafu::{OptionExt, ResultExt, ensure};
use strum::IntoEnumIterator;
use tracing::{info, warn};

/// Largest accepted software report.
const MAX_SOFTWARE_REPORT: usize = 1024;

pub(crate) fn decode_software(node: &NodeRecord) -> Result<Vec<SoftwareInfo>> {
    if node.software_info.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&node.software_info).context(DecodeSnafu {
        what: format!("software info of node {}", node.serial_number),
    })
}

impl NodeService {
    /// Registers a discovered node or refreshes a known one, keyed on its
    /// serial number. Only a new serial number counts against the node cap.
    pub async fn create_node(&self, node: &NewNode) -> Result<u64> {
        if nodes::get_node_by_sn(&self.db, &node.serial_number)
            .await?
            .is_none()
        {
            let count = nodes::count_nodes(&self.db).await?;
            ensure!(
                (count as usize) < MAX_NODE,
                LimitSnafu {
                    what: "node",
                    max: MAX_NODE
                }
            );
        }
        let id = nodes::upsert_node(&self.db, node).await?;
        Ok(id as u64)
    }

    /// Admits a discovered node under a name, then joins the requested groups.
    ///
    /// The node stays managed even when some groups refuse it; the refusals
    /// are reported per group id.
    pub async fn add_unmanaged_node(&self, req: &AddUnManagedNodeReq) -> Result<BatchResp> {
        check(&add_unmanaged_node_checker(), req)?;

        let id = req.node_id as i64;
        let node = nodes::get_node(&self.db, id).await?;
        ensure!(
            !node.is_managed,
            RefusedSnafu {
                message: format!("node {} is already managed", req.node_id)
            }
        );
        let rows = nodes::manage_node(&self.db, id, &req.node_name, &req.description).await?;
        ensure!(
            rows == 1,
            RefusedSnafu {
                message: format!("node {} changed while being added", req.node_id)
            }
        );
        info!("node {} (sn={}) is managed as {}", id, node.serial_number, req.node_name);

        let mut res = BatchResp::default();
        for group_id in &req.group_ids {
            match self.join_group(id, *group_id as i64).await {
                Ok(()) => res.succeed(*group_id),
                Err(e) => {
                    warn!("node {} can not join group {}: {}", id, group_id, e);
                    res.fail(group_id, e.to_string());
                }
            }
        }
        Ok(res)
    }

    pub async fn modify_node(&self, req: &ModifyNodeReq) -> Result<()> {
        check(&modify_node_checker(), req)?;

        let id = req.node_id as i64;
        let node = nodes::get_managed_node(&self.db, id).await?;
        let description = req.description.as_deref().unwrap_or(&node.description);
        let rows = nodes::modify_managed_node(&self.db, id, &req.node_name, description).await?;
        ensure!(rows == 1, ParamSnafu { reason: format!("node {} is not managed", id) });
        info!("node {} renamed from {} to {}", id, node.node_name, req.node_name);
        Ok(())
    }

    pub async fn list_nodes(&self, req: &ListReq, membership: Membership) -> Result<ListNodesResp> {
        check(&PaginationChecker::default(), req)?;

        let name = req.name_filter();
        let total = nodes::count_by_membership(&self.db, membership, name).await?;
        let rows =
            nodes::list_by_membership(&self.db, membership, name, req.offset(), req.limit())
                .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.view(row).await?);
        }
        Ok(ListNodesResp {
            nodes: views,
            total,
        })
    }

    pub async fn get_node_detail(&self, req: &NodeDetailReq) -> Result<NodeDetailResp> {
        let ident = node_identifier(req).map_err(|res| super::Error::Param { reason: res.reason })?;
        let node = match &ident {
            NodeIdentifier::Id(id) => nodes::get_node(&self.db, *id as i64).await?,
            NodeIdentifier::Sn(sn) => nodes::get_node_by_sn(&self.db, sn)
                .await?
                .ok_or_else(|| not_found("node", sn))?,
        };

        let software_info = decode_software(&node)?;
        let allocatable = self
            .status
            .allocatable(&node.unique_name, &self.config.device_type)
            .unwrap_or_else(|| {
                warn!("no substrate view of node {}, allocatable is zero", node.unique_name);
                Resources::default()
            });
        let mut requested = Resources::default();
        for group in relations::groups_of_node(&self.db, node.id).await? {
            requested = requested + group_request(&group)?;
        }

        Ok(NodeDetailResp {
            node: self.view(node).await?,
            software_info,
            allocatable,
            available: allocatable - requested,
        })
    }

    /// Node count per status; every status is present.
    pub async fn get_node_statistics(&self) -> Result<NodeStatistics> {
        let mut stats: NodeStatistics = NodeStatus::iter().map(|s| (s.to_string(), 0)).collect();
        for node in nodes::list_all(&self.db).await? {
            let status = self.node_status(&node.unique_name).await;
            *stats.entry(status.to_string()).or_default() += 1;
        }
        Ok(stats)
    }

    pub async fn batch_delete_node(&self, req: &BatchDeleteNodeReq) -> Result<BatchResp> {
        check(&batch_delete_node_checker(), req)?;

        let mut res = BatchResp::default();
        for id in &req.node_ids {
            match self.delete_managed_node(*id as i64).await {
                Ok(sn) => {
                    info!("node {} (sn={}) deleted", id, sn);
                    res.succeed(*id);
                }
                Err(e) => {
                    warn!("delete node {} failed: {}", id, e);
                    res.fail(id, format!("failed to delete, error: {e}"));
                }
            }
        }
        Ok(res)
    }

    /// Refused while any group of the node still has deployed apps.
    async fn delete_managed_node(&self, id: i64) -> Result<String> {
        let node = nodes::get_node(&self.db, id).await?;
        ensure!(
            node.is_managed,
            RefusedSnafu {
                message: "can't delete unmanaged node"
            }
        );

        let group_ids: Vec<u64> = relations::groups_of_node(&self.db, id)
            .await?
            .iter()
            .map(|g| g.id as u64)
            .collect();
        let counts = self.apps.app_counts_by_groups(&group_ids).await?;
        if let Some((group_id, _)) = counts.iter().find(|(_, count)| **count > 0) {
            return RefusedSnafu {
                message: format!("group({group_id}) has deployed app, can't remove"),
            }
            .fail();
        }

        let mut tx = persistence::begin(&self.db).await?;
        relations::delete_by_node(&mut *tx, id).await?;
        nodes::delete_node(&mut *tx, id).await?;
        self.delete_substrate_node(&node.unique_name).await?;
        persistence::commit(tx).await?;

        self.notify_node_deleted(&node.serial_number).await;
        Ok(node.serial_number)
    }

    pub async fn delete_unmanaged_node(&self, req: &BatchDeleteNodeReq) -> Result<BatchResp> {
        check(&batch_delete_node_checker(), req)?;

        let mut res = BatchResp::default();
        for id in &req.node_ids {
            match self.delete_discovered_node(*id as i64).await {
                Ok(sn) => {
                    info!("unmanaged node {} (sn={}) deleted", id, sn);
                    res.succeed(*id);
                }
                Err(e) => {
                    warn!("delete unmanaged node {} failed: {}", id, e);
                    res.fail(id, format!("failed to delete, error: {e}"));
                }
            }
        }
        Ok(res)
    }

    async fn delete_discovered_node(&self, id: i64) -> Result<String> {
        let node = nodes::get_node(&self.db, id).await?;
        ensure!(
            !node.is_managed,
            RefusedSnafu {
                message: "node is managed"
            }
        );

        let mut tx = persistence::begin(&self.db).await?;
        nodes::delete_node(&mut *tx, id).await?;
        self.delete_substrate_node(&node.unique_name).await?;
        persistence::commit(tx).await?;

        self.notify_node_deleted(&node.serial_number).await;
        Ok(node.serial_number)
    }

    /// Stores the software an edge reports about itself.
    ///
    /// The serial number comes from the authenticated session, never from
    /// the payload.
    pub async fn update_node_software_info(
        &self,
        raw: &str,
        peer: Option<&PeerInfo>,
    ) -> Result<()> {
        ensure!(
            raw.len() <= MAX_SOFTWARE_REPORT,
            ParamSnafu {
                reason: "software info size exceeded"
            }
        );
        let report: SoftwareReport = serde_json::from_str(raw)
            .map_err(|e| super::Error::Param {
                reason: format!("convert software report failed: {e}"),
            })?;
        check(&software_info_checker(), &report.software_info)?;
        let peer = peer.context(ParamSnafu {
            reason: "software report without peer info",
        })?;

        nodes::get_node_by_sn(&self.db, &peer.sn)
            .await?
            .ok_or_else(|| not_found("node", &peer.sn))?;
        let count = nodes::count_nodes(&self.db).await?;
        ensure!(
            (count as usize) <= MAX_NODE,
            LimitSnafu {
                what: "node",
                max: MAX_NODE
            }
        );

        let encoded = serde_json::to_string(&report.software_info).context(DecodeSnafu {
            what: "software info",
        })?;
        nodes::update_software_info(&self.db, &peer.sn, &encoded).await?;
        info!("software info of node {} updated", peer.sn);
        Ok(())
    }

    /// Drops nodes left discovered by a previous run; the informer re-adds live ones.
    pub async fn prune_unmanaged_nodes(&self) -> Result<u64> {
        let removed = nodes::delete_unmanaged_nodes(&self.db).await?;
        if removed > 0 {
            info!("removed {} unmanaged nodes from a previous run", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::harness;
    use super::*;
    use crate::substrate::memory::Operation as SubstrateOp;
    use crate::tests::edge_node;
    use crate::types::{IntoStatus, Status};

    fn discovered(name: &str, sn: &str) -> NewNode {
        NewNode {
            node_name: name.to_string(),
            unique_name: name.to_string(),
            serial_number: sn.to_string(),
            ip: "10.0.0.1".to_string(),
        }
    }

    fn admit(id: u64, name: &str) -> AddUnManagedNodeReq {
        AddUnManagedNodeReq {
            node_id: id,
            node_name: name.to_string(),
            description: String::new(),
            group_ids: Vec::new(),
        }
    }

    // Test 1: create is an upsert on the serial number
    #[tokio::test]
    async fn test_create_node_upsert() {
        let h = harness().await;
        let id = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("create");
        let again = h.service.create_node(&discovered("edge-1b", "SN1")).await.expect("upsert");
        assert_eq!(id, again, "same serial number, same row");
        assert_eq!(nodes::count_nodes(&h.db).await.expect("count"), 1);
    }

    // Test 2: admitting and renaming a node
    #[tokio::test]
    async fn test_admit_and_modify() {
        let h = harness().await;
        let id = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("create");

        let res = h.service.add_unmanaged_node(&admit(id, "edgeOne")).await.expect("admit");
        assert!(!res.has_failure());

        let err = h
            .service
            .add_unmanaged_node(&admit(id, "edgeOne"))
            .await
            .expect_err("already managed");
        assert!(err.to_string().contains("already managed"));

        h.service
            .modify_node(&ModifyNodeReq {
                node_id: id,
                node_name: "edgeTwo".into(),
                description: Some("lab".into()),
            })
            .await
            .expect("modify");
        h.service
            .modify_node(&ModifyNodeReq {
                node_id: id,
                node_name: "edgeThree".into(),
                description: None,
            })
            .await
            .expect("modify keeps description");
        let row = nodes::get_node(&h.db, id as i64).await.expect("row");
        assert_eq!(row.node_name, "edgeThree");
        assert_eq!(row.description, "lab", "omitted description is kept");
    }

    // Test 3: managed node names are unique
    #[tokio::test]
    async fn test_duplicate_managed_name() {
        let h = harness().await;
        let a = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("a");
        let b = h.service.create_node(&discovered("edge-2", "SN2")).await.expect("b");
        h.service.add_unmanaged_node(&admit(a, "edge")).await.expect("admit a");

        let err = h
            .service
            .add_unmanaged_node(&admit(b, "edge"))
            .await
            .expect_err("duplicate name");
        assert!(matches!(
            &err,
            super::super::Error::Persistence { source } if source.is_duplicate()
        ));
    }

    // Test 4: listing splits managed and discovered nodes
    #[tokio::test]
    async fn test_list_nodes() {
        let h = harness().await;
        let a = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("a");
        h.service.create_node(&discovered("edge-2", "SN2")).await.expect("b");
        h.service.add_unmanaged_node(&admit(a, "edgeA")).await.expect("admit");

        let managed = h
            .service
            .list_nodes(&ListReq::default(), Membership::Managed)
            .await
            .expect("managed");
        assert_eq!(managed.total, 1);
        assert_eq!(managed.nodes[0].node_name, "edgeA");
        assert_eq!(managed.nodes[0].status, NodeStatus::Offline);

        let unmanaged = h
            .service
            .list_nodes(&ListReq::default(), Membership::Unmanaged)
            .await
            .expect("unmanaged");
        assert_eq!(unmanaged.total, 1);

        let bad = ListReq {
            page_num: 0,
            ..ListReq::default()
        };
        assert!(h.service.list_nodes(&bad, Membership::All).await.is_err());
    }

    // Test 5: detail by id or serial number, with resources
    #[tokio::test]
    async fn test_node_detail() {
        let h = harness().await;
        let id = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("create");
        h.service.status.apply(&edge_node("edge-1", "SN1", "10.0.0.1"));

        let by_id = h
            .service
            .get_node_detail(&NodeDetailReq {
                id: Some(id),
                sn: None,
            })
            .await
            .expect("by id");
        assert_eq!(by_id.allocatable.cpu, 4.0);
        assert_eq!(by_id.available, by_id.allocatable, "no group requests yet");

        let by_sn = h
            .service
            .get_node_detail(&NodeDetailReq {
                id: None,
                sn: Some("SN1".into()),
            })
            .await
            .expect("by sn");
        assert_eq!(by_sn.node.id, id);

        let both = NodeDetailReq {
            id: Some(id),
            sn: Some("SN1".into()),
        };
        assert!(matches!(
            h.service.get_node_detail(&both).await,
            Err(super::super::Error::Param { .. })
        ));
    }

    // Test 6: statistics count every node once
    #[tokio::test]
    async fn test_node_statistics() {
        let h = harness().await;
        h.service.create_node(&discovered("edge-1", "SN1")).await.expect("a");
        h.service.create_node(&discovered("edge-2", "SN2")).await.expect("b");
        h.service.status.apply(&edge_node("edge-1", "SN1", "10.0.0.1"));
        let _peer = h.bus.connect("SN1", "10.0.0.1").await;

        let stats = h.service.get_node_statistics().await.expect("stats");
        assert_eq!(stats["ready"], 1);
        assert_eq!(stats["offline"], 1);
        assert_eq!(stats["abnormal"], 0);
    }

    // Test 7: deleting managed nodes notifies the edge and tolerates absent substrate nodes
    #[tokio::test]
    async fn test_batch_delete_node() {
        let h = harness().await;
        let a = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("a");
        let b = h.service.create_node(&discovered("edge-2", "SN2")).await.expect("b");
        h.service.add_unmanaged_node(&admit(a, "edgeA")).await.expect("admit");
        h.substrate.apply_node(edge_node("edge-1", "SN1", "10.0.0.1"));
        let peer = h.bus.connect("SN1", "10.0.0.1").await;
        let seen = peer.respond_with(serde_json::Value::Null);
        h.progress.reset("SN1");

        let res = h
            .service
            .batch_delete_node(&BatchDeleteNodeReq {
                node_ids: vec![a, b],
            })
            .await
            .expect("batch");
        assert_eq!(res.success_ids, vec![a]);
        assert!(res.failed_infos[&b.to_string()].contains("can't delete unmanaged node"));
        assert_eq!(nodes::count_nodes(&h.db).await.expect("count"), 1);
        assert!(h.substrate.node_labels("edge-1").is_none(), "substrate node removed");
        assert!(h.progress.get("SN1").is_none(), "progress entry swept");

        h.bus.disconnect("SN1").await;
        let seen = seen.await.expect("peer");
        assert_eq!(seen[0].router.resource, crate::bus::RES_DELETE_NODE);
    }

    // Test 8: a failing substrate rolls the database back
    #[tokio::test]
    async fn test_delete_rolls_back_on_substrate_error() {
        let h = harness().await;
        let a = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("a");
        h.service.add_unmanaged_node(&admit(a, "edgeA")).await.expect("admit");
        h.substrate.fail_on(SubstrateOp::DeleteNode);

        let res = h
            .service
            .batch_delete_node(&BatchDeleteNodeReq { node_ids: vec![a] })
            .await
            .expect("batch");
        assert!(res.has_failure());
        assert_eq!(nodes::count_nodes(&h.db).await.expect("count"), 1, "row restored");
    }

    // Test 9: groups with deployed apps pin their nodes
    #[tokio::test]
    async fn test_delete_refused_with_deployed_apps() {
        let h = harness().await;
        let a = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("a");
        h.service.add_unmanaged_node(&admit(a, "edgeA")).await.expect("admit");
        let g = persistence::groups::insert_group(&h.db, "groupA", "").await.expect("group");
        relations::insert_relation(&h.db, a as i64, g).await.expect("relation");
        h.apps.set(g as u64, 1);

        let res = h
            .service
            .batch_delete_node(&BatchDeleteNodeReq { node_ids: vec![a] })
            .await
            .expect("batch");
        assert!(res.failed_infos[&a.to_string()].contains("has deployed app"));
    }

    // Test 10: unmanaged deletion refuses managed nodes
    #[tokio::test]
    async fn test_delete_unmanaged_node() {
        let h = harness().await;
        let a = h.service.create_node(&discovered("edge-1", "SN1")).await.expect("a");
        let b = h.service.create_node(&discovered("edge-2", "SN2")).await.expect("b");
        h.service.add_unmanaged_node(&admit(a, "edgeA")).await.expect("admit");

        let res = h
            .service
            .delete_unmanaged_node(&BatchDeleteNodeReq {
                node_ids: vec![a, b],
            })
            .await
            .expect("batch");
        assert_eq!(res.success_ids, vec![b]);
        assert!(res.failed_infos[&a.to_string()].contains("node is managed"));
    }

    // Test 11: software reports are bounded and bound to the session
    #[tokio::test]
    async fn test_update_software_info() {
        let h = harness().await;
        h.service.create_node(&discovered("edge-1", "SN1")).await.expect("a");
        let peer = PeerInfo {
            sn: "SN1".into(),
            ip: "10.0.0.1".into(),
        };
        let raw = r#"{"softwareInfo":[{"name":"MEFEdge","version":"5.0.1","inactiveVersion":""}]}"#;

        h.service
            .update_node_software_info(raw, Some(&peer))
            .await
            .expect("update");
        let row = nodes::get_node_by_sn(&h.db, "SN1").await.expect("get").expect("row");
        assert!(row.software_info.contains("5.0.1"));

        assert!(h.service.update_node_software_info(raw, None).await.is_err());
        let oversized = format!("{{\"softwareInfo\":[],\"pad\":\"{}\"}}", "x".repeat(1100));
        let err = h
            .service
            .update_node_software_info(&oversized, Some(&peer))
            .await
            .expect_err("too large");
        assert!(err.to_string().contains("size exceeded"));
    }

    // Test 12: the node cap admits the 2048th node, refuses the 2049th and
    // still refreshes known serial numbers
    #[tokio::test]
    async fn test_node_cap() {
        let h = harness().await;
        let mut tx = persistence::begin(&h.db).await.expect("begin");
        for i in 0..MAX_NODE - 1 {
            nodes::upsert_node(&mut *tx, &discovered(&format!("edge-{i}"), &format!("SN{i}")))
                .await
                .expect("seed");
        }
        persistence::commit(tx).await.expect("commit");

        h.service
            .create_node(&discovered("edge-last", "SNLAST"))
            .await
            .expect("2048th node");
        let err = h
            .service
            .create_node(&discovered("edge-over", "SNOVER"))
            .await
            .expect_err("2049th node");
        assert!(matches!(err, super::super::Error::Limit { .. }));
        assert_eq!(err.status(Status::ErrorAddUnManagedNode), Status::ErrorCheckNodeMrgSize);

        h.service
            .create_node(&discovered("edge-0-renamed", "SN0"))
            .await
            .expect("known serial number at the cap");
        assert_eq!(nodes::count_nodes(&h.db).await.expect("count"), MAX_NODE as i64);
    }
}
