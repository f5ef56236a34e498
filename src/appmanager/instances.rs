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

use super::{AppService, Error, Result, check};
use crate::persistence::{AppInstanceRecord, instances};
use crate::types::app::{
    AppIdReq, AppInstanceResp, ContainerInfo, ListAppInstancesResp, NodeIdReq,
};
use crate::types::node::ListReq;
use crate::validation::PaginationChecker;
use crate::validation::app::{app_id_checker, node_id_checker};
use std::collections::HashMap;
use tracing::warn;

impl AppService {
    pub async fn list_app_instances(&self, req: &ListReq) -> Result<ListAppInstancesResp> {
        check(&PaginationChecker::default(), req)?;

        let rows =
            instances::list_page(&self.db, req.name_filter(), req.offset(), req.limit()).await?;
        let total = instances::count_by_name(&self.db, req.name_filter()).await?;
        Ok(ListAppInstancesResp {
            app_instances: self.instance_views(rows).await?,
            total: total as usize,
        })
    }

    pub async fn list_app_instances_by_id(&self, req: &AppIdReq) -> Result<ListAppInstancesResp> {
        check(&app_id_checker(), req)?;

        let rows = instances::list_by_app(&self.db, req.app_id as i64).await?;
        let app_instances = self.instance_views(rows).await?;
        Ok(ListAppInstancesResp {
            total: app_instances.len(),
            app_instances,
        })
    }

    pub async fn list_app_instances_by_node(
        &self,
        req: &NodeIdReq,
    ) -> Result<ListAppInstancesResp> {
        check(&node_id_checker(), req)?;

        let rows = instances::list_by_node(&self.db, req.node_id as i64).await?;
        let app_instances = self.instance_views(rows).await?;
        Ok(ListAppInstancesResp {
            total: app_instances.len(),
            app_instances,
        })
    }

    /// Rows whose node or group no longer resolves are left out; they are
    /// being torn down and the informer removes them shortly.
    async fn instance_views(&self, rows: Vec<AppInstanceRecord>) -> Result<Vec<AppInstanceResp>> {
        let mut group_names: HashMap<i64, Option<String>> = HashMap::new();
        let mut views = Vec::with_capacity(rows.len());

        for row in rows {
            let node = match self.nodes.node_by_unique_name(&row.node_unique_name).await {
                Ok(node) => node,
                Err(e) => {
                    warn!("skip instance {}: {}", row.pod_name, e);
                    continue;
                }
            };

            if !group_names.contains_key(&row.node_group_id) {
                let name = self
                    .nodes
                    .node_groups(&[row.node_group_id as u64])
                    .await
                    .ok()
                    .and_then(|groups| groups.into_iter().next())
                    .map(|g| g.node_group_name);
                group_names.insert(row.node_group_id, name);
            }
            let Some(Some(group_name)) = group_names.get(&row.node_group_id).cloned() else {
                warn!("skip instance {}: node group {} not found", row.pod_name, row.node_group_id);
                continue;
            };

            let stored: Vec<ContainerInfo> =
                serde_json::from_str(&row.container_info).map_err(|source| Error::Decode {
                    what: format!("container info of pod {}", row.pod_name),
                    source,
                })?;
            let node_status = self.nodes.node_status(&row.node_unique_name).await;

            views.push(AppInstanceResp {
                app_id: row.app_id as u64,
                app_name: row.app_name,
                node_id: node.node_id,
                node_name: row.node_name,
                node_status: node_status.to_string(),
                node_group_id: row.node_group_id as u64,
                node_group_name: group_name,
                pod_status: self.status.pod_status(&row.pod_name, node_status),
                container_infos: self.status.container_infos(&row.pod_name, stored, node_status),
                pod_name: row.pod_name,
                created_at: row.created_at,
            });
        }
        Ok(views)
    }
}
