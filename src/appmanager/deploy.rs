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

//! Placing an application on node groups and taking it off again.
//!
//! Each group is handled on its own: the database row and the substrate
//! daemon set change together, and the group's resource bookkeeping is
//! updated last. When that final step fails the first two are undone.

use super::{AppService, Result, check, daemon_set, decode_containers, refused};
use crate::inner::{CheckResourceReq, UpdateResourceReq};
use crate::persistence::{self, AppInfoRecord, apps, daemon_sets};
use crate::types::BatchResp;
use crate::types::app::{Container, DeployAppReq, NodeGroupBrief, total_limits};
use crate::validation::app::deploy_app_checker;
use tracing::{error, info, warn};

impl AppService {
    pub async fn deploy_app(&self, req: &DeployAppReq) -> Result<BatchResp> {
        check(&deploy_app_checker(), req)?;

        let app = apps::get_app(&self.db, req.app_id as i64).await?;
        let containers = decode_containers(&app)?;

        let mut res = BatchResp::default();
        for group_id in &req.node_group_ids {
            match self.deploy_to_group(&app, &containers, *group_id).await {
                Ok(()) => {
                    info!("app {} deployed on node group {}", app.app_name, group_id);
                    res.succeed(*group_id);
                }
                Err(e) => {
                    error!("deploy app {} on node group {} failed: {}", app.app_name, group_id, e);
                    res.fail(group_id, e.to_string());
                }
            }
        }
        Ok(res)
    }

    pub async fn undeploy_app(&self, req: &DeployAppReq) -> Result<BatchResp> {
        check(&deploy_app_checker(), req)?;

        let app = apps::get_app(&self.db, req.app_id as i64).await?;
        let containers = decode_containers(&app)?;

        let mut res = BatchResp::default();
        for group_id in &req.node_group_ids {
            match self.undeploy_from_group(&app, &containers, *group_id).await {
                Ok(()) => {
                    info!("app {} undeployed from node group {}", app.app_name, group_id);
                    res.succeed(*group_id);
                }
                Err(e) => {
                    error!(
                        "undeploy app {} from node group {} failed: {}",
                        app.app_name, group_id, e
                    );
                    res.fail(group_id, e.to_string());
                }
            }
        }
        Ok(res)
    }

    async fn group(&self, group_id: u64) -> Result<NodeGroupBrief> {
        self.nodes
            .node_groups(&[group_id])
            .await
            .ok()
            .and_then(|groups| groups.into_iter().next())
            .ok_or_else(|| refused("group id no exist"))
    }

    async fn deploy_precheck(&self, app: &AppInfoRecord, group_id: u64) -> Result<NodeGroupBrief> {
        let group = self.group(group_id).await?;
        if daemon_sets::get_daemon_set(&self.db, app.id, group_id as i64)
            .await?
            .is_some()
        {
            return Err(refused("app already exists"));
        }
        let deployed = daemon_sets::count_by_group(&self.db, group_id as i64).await?;
        if deployed >= self.config.max_ds_number_per_node_group {
            return Err(refused("node group out of max app limit"));
        }
        Ok(group)
    }

    async fn deploy_to_group(
        &self,
        app: &AppInfoRecord,
        containers: &[Container],
        group_id: u64,
    ) -> Result<()> {
        let group = self.deploy_precheck(app, group_id).await.map_err(|e| {
            refused(format!("check deploy app [{}] failed: {}", app.app_name, e))
        })?;

        let template = daemon_set::build(app, containers, group_id, &self.config);
        let name = daemon_set::daemon_set_name(&app.app_name, group_id);
        let resources = total_limits(containers);

        self.nodes
            .check_resource(&CheckResourceReq {
                node_group_id: group_id,
                resources,
            })
            .await
            .map_err(|e| {
                refused(format!("check app [{}] resources failed: {}", app.app_name, e))
            })?;

        let mut tx = persistence::begin(&self.db).await?;
        daemon_sets::insert_daemon_set(
            &mut *tx,
            &name,
            app.id,
            group_id as i64,
            &group.node_group_name,
        )
        .await?;
        self.substrate.create_daemon_set(&template).await?;
        if let Err(e) = persistence::commit(tx).await {
            if let Err(cleanup) = self.substrate.delete_daemon_set(&name).await {
                warn!("remove daemon set {} after failed commit: {}", name, cleanup);
            }
            return Err(e.into());
        }

        let update = UpdateResourceReq {
            node_group_id: group_id,
            resources,
            is_undeploy: false,
        };
        if let Err(e) = self.nodes.update_resource(&update).await {
            if let Err(cleanup) = self.substrate.delete_daemon_set(&name).await {
                warn!("remove daemon set {} after resource failure: {}", name, cleanup);
            }
            if let Err(cleanup) =
                daemon_sets::delete_daemon_set(&self.db, app.id, group_id as i64).await
            {
                warn!("remove daemon set row {} after resource failure: {}", name, cleanup);
            }
            return Err(refused(format!(
                "app [{}] daemonSet create failed, update allocated node resource error: {}",
                app.app_name, e
            )));
        }
        Ok(())
    }

    async fn undeploy_from_group(
        &self,
        app: &AppInfoRecord,
        containers: &[Container],
        group_id: u64,
    ) -> Result<()> {
        let group = self.group(group_id).await?;
        let Some(row) = daemon_sets::get_daemon_set(&self.db, app.id, group_id as i64).await? else {
            return Err(refused("not deployed"));
        };

        let existing = match self.substrate.get_daemon_set(&row.daemon_set_name).await {
            Ok(ds) => Some(ds),
            Err(e) if e.is_not_found() => {
                warn!("daemon set {} already absent from the cluster", row.daemon_set_name);
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut tx = persistence::begin(&self.db).await?;
        daemon_sets::delete_daemon_set(&mut *tx, app.id, group_id as i64).await?;
        if existing.is_some() {
            self.substrate.delete_daemon_set(&row.daemon_set_name).await?;
        }
        persistence::commit(tx).await?;

        let update = UpdateResourceReq {
            node_group_id: group_id,
            resources: total_limits(containers),
            is_undeploy: true,
        };
        if let Err(e) = self.nodes.update_resource(&update).await {
            if let Err(cleanup) = daemon_sets::insert_daemon_set(
                &self.db,
                &row.daemon_set_name,
                app.id,
                group_id as i64,
                &group.node_group_name,
            )
            .await
            {
                warn!("restore daemon set row {}: {}", row.daemon_set_name, cleanup);
            }
            if existing.is_some() {
                let template = daemon_set::build(app, containers, group_id, &self.config);
                if let Err(cleanup) = self.substrate.create_daemon_set(&template).await {
                    warn!("restore daemon set {}: {}", row.daemon_set_name, cleanup);
                }
            }
            return Err(refused(format!(
                "undeploy app failed, update allocated node resource error: {e}"
            )));
        }
        Ok(())
    }
}
