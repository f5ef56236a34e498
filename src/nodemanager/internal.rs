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

use super::nodes::decode_software;
use super::{DecodeSnafu, NodeService, RefusedSnafu, Result, group_request};
use crate::inner::{self, CheckResourceReq, NodeInner, NodeRef, UpdateResourceReq};
use crate::persistence::{groups, nodes, not_found, relations};
use crate::types::app::NodeGroupBrief;
use crate::types::node::{NodeStatus, SoftwareInfo};
use crate::types::resources::Resources;
use async_trait::async_trait;
use snafu::{OptionExt, ResultExt};
use tracing::debug;

impl NodeService {
    async fn check_group_resource(&self, req: &CheckResourceReq) -> Result<()> {
        let group = groups::get_group(&self.db, req.node_group_id as i64).await?;
        for node in relations::nodes_of_group(&self.db, group.id).await? {
            let allocatable = self
                .status
                .allocatable(&node.unique_name, &self.config.device_type)
                .context(RefusedSnafu {
                    message: format!(
                        "in group [{}], node {} is unknown to the substrate",
                        group.group_name, node.node_name
                    ),
                })?;
            let mut requested = Resources::default();
            for g in relations::groups_of_node(&self.db, node.id).await? {
                requested = requested + group_request(&g)?;
            }
            if let Some(res) = (allocatable - requested).shortage(&req.resources) {
                return RefusedSnafu {
                    message: format!(
                        "in group [{}], node {} do not have enough {} resources",
                        group.group_name, node.node_name, res
                    ),
                }
                .fail();
            }
        }
        Ok(())
    }

    async fn update_group_resource(&self, req: &UpdateResourceReq) -> Result<()> {
        let group = groups::get_group(&self.db, req.node_group_id as i64).await?;
        let current = group_request(&group)?;
        let next = if req.is_undeploy {
            current - req.resources
        } else {
            current + req.resources
        };
        let encoded = serde_json::to_string(&next).context(DecodeSnafu {
            what: "resources request",
        })?;
        groups::update_resources_request(&self.db, group.id, &encoded).await?;
        debug!("resources request of group {} is now {}", group.group_name, encoded);
        Ok(())
    }

    async fn group_briefs(&self, ids: &[u64]) -> Result<Vec<NodeGroupBrief>> {
        let wanted: Vec<i64> = ids.iter().map(|id| *id as i64).collect();
        let found = groups::get_groups_by_ids(&self.db, &wanted).await?;
        ids.iter()
            .map(|id| {
                found
                    .iter()
                    .find(|g| g.id == *id as i64)
                    .map(|g| NodeGroupBrief {
                        node_group_id: *id,
                        node_group_name: g.group_name.clone(),
                    })
                    .ok_or_else(|| not_found("node group", id).into())
            })
            .collect()
    }

    async fn node_ref(&self, unique_name: &str) -> Result<NodeRef> {
        let node = nodes::get_node_by_unique_name(&self.db, unique_name)
            .await?
            .ok_or_else(|| not_found("node", unique_name))?;
        Ok(NodeRef {
            node_id: node.id as u64,
            node_name: node.node_name,
            is_managed: node.is_managed,
        })
    }

    async fn software_of(&self, sn: &str) -> Result<Vec<SoftwareInfo>> {
        let node = nodes::get_node_by_sn(&self.db, sn)
            .await?
            .ok_or_else(|| not_found("node", sn))?;
        decode_software(&node)
    }
}

#[async_trait]
impl NodeInner for NodeService {
    async fn check_resource(&self, req: &CheckResourceReq) -> inner::Result<()> {
        Ok(self.check_group_resource(req).await?)
    }

    async fn update_resource(&self, req: &UpdateResourceReq) -> inner::Result<()> {
        Ok(self.update_group_resource(req).await?)
    }

    async fn node_groups(&self, ids: &[u64]) -> inner::Result<Vec<NodeGroupBrief>> {
        Ok(self.group_briefs(ids).await?)
    }

    async fn node_by_unique_name(&self, unique_name: &str) -> inner::Result<NodeRef> {
        Ok(self.node_ref(unique_name).await?)
    }

    async fn node_status(&self, unique_name: &str) -> NodeStatus {
        NodeService::node_status(self, unique_name).await
    }

    async fn node_software_info(&self, sn: &str) -> inner::Result<Vec<SoftwareInfo>> {
        Ok(self.software_of(sn).await?)
    }
}
