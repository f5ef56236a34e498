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

//! Node ↔ group membership with per-node admission.

use super::{LimitSnafu, NodeService, RefusedSnafu, Result, check, group_request};
use crate::persistence::{self, groups, nodes, relations};
use crate::substrate::group_label;
use crate::types::BatchResp;
use crate::types::node::{GroupNodesReq, RelationReq};
use crate::types::resources::Resources;
use crate::validation::node::{
    MAX_GROUP_PER_NODE, MAX_NODE_PER_GROUP, group_nodes_checker, relations_checker,
};
use snafu::{OptionExt, ensure};
use std::collections::BTreeMap;
use tracing::{info, warn};

impl NodeService {
    /// Adds one managed node to a group.
    ///
    /// The node must fit the group's cumulative request on top of what its
    /// other groups already request, and its pod count across all groups
    /// must stay within `maxPodNumberPerNode`. The relation row and the
    /// substrate label are written together.
    pub(crate) async fn join_group(&self, node_id: i64, group_id: i64) -> Result<()> {
        let node = nodes::get_managed_node(&self.db, node_id).await?;
        let group = groups::get_group(&self.db, group_id).await?;

        ensure!(
            !relations::exists(&self.db, node_id, group_id).await?,
            RefusedSnafu {
                message: format!("node {} is already in group {}", node.node_name, group.group_name)
            }
        );
        let node_groups = relations::groups_of_node(&self.db, node_id).await?;
        ensure!(
            node_groups.len() < MAX_GROUP_PER_NODE,
            LimitSnafu {
                what: "group of a node",
                max: MAX_GROUP_PER_NODE
            }
        );
        let members = relations::count_nodes_in_group(&self.db, group_id).await?;
        ensure!(
            (members as usize) < MAX_NODE_PER_GROUP,
            LimitSnafu {
                what: "node of a group",
                max: MAX_NODE_PER_GROUP
            }
        );

        let allocatable = self
            .status
            .allocatable(&node.unique_name, &self.config.device_type)
            .context(RefusedSnafu {
                message: format!("node {} is unknown to the substrate", node.node_name),
            })?;
        let mut requested = Resources::default();
        for g in &node_groups {
            requested = requested + group_request(g)?;
        }
        if let Some(res) = (allocatable - requested).shortage(&group_request(&group)?) {
            return RefusedSnafu {
                message: format!("node {} do not have enough {} resources", node.node_name, res),
            }
            .fail();
        }

        let mut ids: Vec<u64> = node_groups.iter().map(|g| g.id as u64).collect();
        ids.push(group_id as u64);
        let pods: i64 = self.apps.app_counts_by_groups(&ids).await?.values().sum();
        ensure!(
            pods <= self.config.max_pod_number_per_node,
            RefusedSnafu {
                message: format!(
                    "pod number {} is out of node {} max allowed number {}",
                    pods, node.node_name, self.config.max_pod_number_per_node
                )
            }
        );

        let labels = BTreeMap::from([(group_label(group_id as u64), String::new())]);
        let mut tx = persistence::begin(&self.db).await?;
        relations::insert_relation(&mut *tx, node_id, group_id).await?;
        self.substrate.add_node_labels(&node.unique_name, &labels).await?;
        persistence::commit(tx).await?;

        info!("node {} joined group {}", node.node_name, group.group_name);
        Ok(())
    }

    /// Removes one relation and its label. An absent substrate node is tolerated.
    pub(crate) async fn leave_group(&self, node_id: i64, group_id: i64) -> Result<()> {
        let node = nodes::get_node(&self.db, node_id).await?;

        let mut tx = persistence::begin(&self.db).await?;
        let removed = relations::delete_relation(&mut *tx, node_id, group_id).await?;
        ensure!(
            removed > 0,
            RefusedSnafu {
                message: format!("no such relation(node:{node_id}, group:{group_id})")
            }
        );
        self.delete_group_label(&node.unique_name, group_id).await?;
        persistence::commit(tx).await?;

        info!("node {} left group {}", node.node_name, group_id);
        Ok(())
    }

    pub async fn add_node_to_group(&self, req: &GroupNodesReq) -> Result<BatchResp> {
        check(&group_nodes_checker(), req)?;

        let group = groups::get_group(&self.db, req.group_id as i64).await?;
        let mut res = BatchResp::default();
        for id in &req.node_ids {
            match self.join_group(*id as i64, group.id).await {
                Ok(()) => res.succeed(*id),
                Err(e) => {
                    warn!("add node {} to group {} failed: {}", id, group.group_name, e);
                    res.fail(id, format!("add node to group error, check node failed: {e}"));
                }
            }
        }
        Ok(res)
    }

    pub async fn delete_node_from_group(&self, req: &GroupNodesReq) -> Result<BatchResp> {
        check(&group_nodes_checker(), req)?;

        let group = groups::get_group(&self.db, req.group_id as i64).await?;
        let mut res = BatchResp::default();
        for id in &req.node_ids {
            match self.leave_group(*id as i64, group.id).await {
                Ok(()) => res.succeed(*id),
                Err(e) => {
                    warn!("delete node {} from group {} failed: {}", id, group.group_name, e);
                    res.fail(id, format!("failed to delete, error: {e}"));
                }
            }
        }
        Ok(res)
    }

    /// Removes arbitrary (node, group) pairs; failures are keyed `<nodeID>:<groupID>`.
    pub async fn batch_delete_node_relation(&self, req: &Vec<RelationReq>) -> Result<BatchResp> {
        check(&relations_checker(), req)?;

        let mut res = BatchResp::default();
        for relation in req {
            let key = format!("{}:{}", relation.node_id, relation.group_id);
            let outcome = match groups::get_group(&self.db, relation.group_id as i64).await {
                Ok(group) => self.leave_group(relation.node_id as i64, group.id).await,
                Err(e) => Err(e.into()),
            };
            match outcome {
                Ok(()) => res.succeed(relation.node_id),
                Err(e) => {
                    warn!("delete relation {} failed: {}", key, e);
                    res.fail(key, format!("failed to delete node relation, error: {e}"));
                }
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Harness, harness, harness_with};
    use super::*;
    use crate::config::Config;
    use crate::persistence::NewNode;
    use crate::substrate::memory::Operation as SubstrateOp;
    use crate::tests::edge_node;

    /// A managed node known to the substrate and the status cache.
    async fn managed_node(h: &Harness, name: &str, sn: &str) -> i64 {
        let id = nodes::upsert_node(
            &h.db,
            &NewNode {
                node_name: name.into(),
                unique_name: name.into(),
                serial_number: sn.into(),
                ip: "10.0.0.1".into(),
            },
        )
        .await
        .expect("node");
        nodes::manage_node(&h.db, id, name, "").await.expect("manage");
        let node = edge_node(name, sn, "10.0.0.1");
        h.substrate.apply_node(node.clone());
        h.service.status.apply(&node);
        id
    }

    async fn group(h: &Harness, name: &str, request: &str) -> i64 {
        let id = groups::insert_group(&h.db, name, "").await.expect("group");
        groups::update_resources_request(&h.db, id, request)
            .await
            .expect("request");
        id
    }

    // Test 1: joining writes the relation and the label
    #[tokio::test]
    async fn test_join_and_leave() {
        let h = harness().await;
        let n = managed_node(&h, "edge-1", "SN1").await;
        let g = group(&h, "groupA", "{}").await;

        let res = h
            .service
            .add_node_to_group(&GroupNodesReq {
                group_id: g as u64,
                node_ids: vec![n as u64],
            })
            .await
            .expect("add");
        assert!(!res.has_failure(), "{:?}", res.failed_infos);
        assert!(relations::exists(&h.db, n, g).await.expect("exists"));
        let labels = h.substrate.node_labels("edge-1").expect("node");
        assert_eq!(labels.get(&group_label(g as u64)), Some(&String::new()));

        let err = h.service.join_group(n, g).await.expect_err("already joined");
        assert!(err.to_string().contains("already in group"));

        let res = h
            .service
            .delete_node_from_group(&GroupNodesReq {
                group_id: g as u64,
                node_ids: vec![n as u64],
            })
            .await
            .expect("delete");
        assert!(!res.has_failure());
        let labels = h.substrate.node_labels("edge-1").expect("node");
        assert!(!labels.contains_key(&group_label(g as u64)));

        let again = h.service.leave_group(n, g).await.expect_err("gone");
        assert!(again.to_string().contains("no such relation"));
    }

    // Test 2: admission compares the group's request to what is left on the node
    #[tokio::test]
    async fn test_resource_admission() {
        let h = harness().await;
        let n = managed_node(&h, "edge-1", "SN1").await;
        let big = group(&h, "groupA", r#"{"cpu":3.0,"memory":1024,"npu":0}"#).await;
        let other = group(&h, "groupB", r#"{"cpu":2.0,"memory":1024,"npu":0}"#).await;

        h.service.join_group(n, big).await.expect("fits 4 cores");
        let err = h.service.join_group(n, other).await.expect_err("1 core left");
        assert_eq!(err.to_string(), "node edge-1 do not have enough cpu resources");
        assert!(!relations::exists(&h.db, n, other).await.expect("exists"));
    }

    // Test 3: the pod cap counts apps of every group of the node
    #[tokio::test]
    async fn test_pod_cap() {
        let h = harness_with(Config {
            max_pod_number_per_node: 2,
            ..Config::default()
        })
        .await;
        let n = managed_node(&h, "edge-1", "SN1").await;
        let a = group(&h, "groupA", "{}").await;
        let b = group(&h, "groupB", "{}").await;
        h.apps.set(a as u64, 1);
        h.apps.set(b as u64, 2);

        h.service.join_group(n, a).await.expect("one pod");
        let err = h.service.join_group(n, b).await.expect_err("three pods");
        assert!(err.to_string().contains("max allowed number"));
    }

    // Test 4: unmanaged nodes never join, and a failed label write rolls back
    #[tokio::test]
    async fn test_join_guards() {
        let h = harness().await;
        let g = group(&h, "groupA", "{}").await;
        let discovered = nodes::upsert_node(
            &h.db,
            &NewNode {
                node_name: "edge-9".into(),
                unique_name: "edge-9".into(),
                serial_number: "SN9".into(),
                ip: "10.0.0.9".into(),
            },
        )
        .await
        .expect("node");
        assert!(h.service.join_group(discovered, g).await.is_err());

        let n = managed_node(&h, "edge-1", "SN1").await;
        h.substrate.fail_on(SubstrateOp::AddNodeLabels);
        assert!(h.service.join_group(n, g).await.is_err());
        assert!(!relations::exists(&h.db, n, g).await.expect("exists"), "rolled back");
    }

    // Test 5: batch relation removal keys failures by pair
    #[tokio::test]
    async fn test_batch_delete_relation() {
        let h = harness().await;
        let n = managed_node(&h, "edge-1", "SN1").await;
        let g = group(&h, "groupA", "{}").await;
        h.service.join_group(n, g).await.expect("join");

        let res = h
            .service
            .batch_delete_node_relation(&vec![
                RelationReq {
                    node_id: n as u64,
                    group_id: g as u64,
                },
                RelationReq {
                    node_id: n as u64,
                    group_id: 77,
                },
            ])
            .await
            .expect("batch");
        assert_eq!(res.success_ids, vec![n as u64]);
        assert!(res.failed_infos.contains_key(&format!("{n}:77")));
    }
}
