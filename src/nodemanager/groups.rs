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

use super::{LimitSnafu, NodeService, RefusedSnafu, Result, check, group_request};
use crate::persistence::{self, NodeGroupRecord, groups, not_found, relations};
use crate::types::BatchResp;
use crate::types::node::{
    BatchDeleteNodeGroupReq, CreateNodeGroupReq, GroupStatistics, IdReq, ListNodeGroupsResp,
    ListReq, ModifyNodeGroupReq, NodeGroupDetailResp, NodeGroupView,
};
use crate::validation::node::{
    MAX_NODE_GROUP, batch_delete_group_checker, create_group_checker, id_checker,
    modify_group_checker,
};
use crate::validation::primitives::PaginationChecker;
use snafu::ensure;
use tracing::{info, warn};

fn group_view(group: NodeGroupRecord, node_count: i64) -> NodeGroupView {
    NodeGroupView {
        group_id: group.id as u64,
        group_name: group.group_name,
        description: group.description,
        node_count,
        created_at: group.created_at,
        updated_at: group.updated_at,
    }
}

impl NodeService {
    pub async fn create_node_group(&self, req: &CreateNodeGroupReq) -> Result<u64> {
        check(&create_group_checker(), req)?;

        let count = groups::count_groups(&self.db).await?;
        ensure!(
            (count as usize) < MAX_NODE_GROUP,
            LimitSnafu {
                what: "node group",
                max: MAX_NODE_GROUP
            }
        );
        let id = groups::insert_group(&self.db, &req.node_group_name, &req.description).await?;
        info!("node group {} created with id {}", req.node_group_name, id);
        Ok(id as u64)
    }

    pub async fn list_node_groups(&self, req: &ListReq) -> Result<ListNodeGroupsResp> {
        check(&PaginationChecker::default(), req)?;

        let name = req.name_filter();
        let total = groups::count_groups_by_name(&self.db, name).await?;
        let rows = groups::list_groups(&self.db, name, req.offset(), req.limit()).await?;
        Ok(ListNodeGroupsResp {
            groups: rows
                .into_iter()
                .map(|row| group_view(row.group, row.node_count))
                .collect(),
            total,
        })
    }

    pub async fn get_node_group_detail(&self, req: &IdReq) -> Result<NodeGroupDetailResp> {
        check(&id_checker(), req)?;

        let group = groups::get_group(&self.db, req.id as i64).await?;
        let resources_request = group_request(&group)?;
        let members = relations::nodes_of_group(&self.db, group.id).await?;

        let mut nodes = Vec::with_capacity(members.len());
        for node in members {
            nodes.push(self.view(node).await?);
        }
        Ok(NodeGroupDetailResp {
            group: group_view(group, nodes.len() as i64),
            resources_request,
            nodes,
        })
    }

    pub async fn modify_node_group(&self, req: &ModifyNodeGroupReq) -> Result<()> {
        check(&modify_group_checker(), req)?;

        let id = req.group_id as i64;
        let group = groups::get_group(&self.db, id).await?;
        let description = req.description.as_deref().unwrap_or(&group.description);
        let rows = groups::modify_group(&self.db, id, &req.node_group_name, description).await?;
        if rows == 0 {
            return Err(not_found("node group", id).into());
        }
        info!(
            "node group {} renamed from {} to {}",
            id, group.group_name, req.node_group_name
        );
        Ok(())
    }

    pub async fn get_node_group_statistics(&self) -> Result<GroupStatistics> {
        Ok(GroupStatistics {
            total: groups::count_groups(&self.db).await?,
        })
    }

    pub async fn batch_delete_node_group(
        &self,
        req: &BatchDeleteNodeGroupReq,
    ) -> Result<BatchResp> {
        check(&batch_delete_group_checker(), req)?;

        let mut res = BatchResp::default();
        for id in &req.group_ids {
            match self.delete_single_group(*id).await {
                Ok(name) => {
                    info!("node group {} ({}) deleted", id, name);
                    res.succeed(*id);
                }
                Err(e) => {
                    warn!("delete node group {} failed: {}", id, e);
                    res.fail(id, format!("delete failed, {e}"));
                }
            }
        }
        Ok(res)
    }

    /// Removes member labels and relations, then the group, in one transaction.
    async fn delete_single_group(&self, id: u64) -> Result<String> {
        let group = groups::get_group(&self.db, id as i64).await?;
        let counts = self.apps.app_counts_by_groups(&[id]).await?;
        ensure!(
            counts.get(&id).copied().unwrap_or_default() == 0,
            RefusedSnafu {
                message: format!("group {id} has deployed app, can't remove")
            }
        );

        let members = relations::nodes_of_group(&self.db, group.id).await?;
        let mut tx = persistence::begin(&self.db).await?;
        for node in &members {
            relations::delete_relation(&mut *tx, node.id, group.id).await?;
            self.delete_group_label(&node.unique_name, group.id).await?;
        }
        if groups::delete_group(&mut *tx, group.id).await? != 1 {
            return Err(not_found("node group", id).into());
        }
        persistence::commit(tx).await?;
        Ok(group.group_name)
    }
}
