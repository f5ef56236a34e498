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
    AppLimitSnafu, AppService, EncodeSnafu, Error, MAX_APP, Result, check, daemon_set,
    decode_containers, refused,
};
use crate::persistence::{self, apps, daemon_sets};
use crate::types::BatchResp;
use crate::types::app::{
    AppIdReq, AppReturnInfo, CreateAppReq, DeleteAppReq, ListAppsResp, UpdateAppReq,
};
use crate::types::node::ListReq;
use crate::validation::PaginationChecker;
use crate::validation::app::{
    app_id_checker, create_app_checker, delete_app_checker, update_app_checker,
};
use snafu::{ResultExt, ensure};
use tracing::{info, warn};

impl AppService {
    pub async fn create_app(&self, req: &CreateAppReq) -> Result<u64> {
        check(&create_app_checker(&self.config.host_path), req)?;

        let total = apps::count_apps(&self.db).await?;
        ensure!(total < MAX_APP, AppLimitSnafu);

        let containers = serde_json::to_string(&req.containers).context(EncodeSnafu {
            what: "containers",
        })?;
        let id = apps::insert_app(&self.db, &req.app_name, &req.description, &containers)
            .await
            .map_err(|e| {
                if e.is_duplicate() {
                    Error::Duplicate {
                        name: req.app_name.clone(),
                    }
                } else {
                    e.into()
                }
            })?;

        info!("create app {} success, id {}", req.app_name, id);
        Ok(id as u64)
    }

    pub async fn query_app(&self, req: &AppIdReq) -> Result<AppReturnInfo> {
        check(&app_id_checker(), req)?;

        let app = apps::get_app(&self.db, req.app_id as i64).await?;
        self.view(app).await
    }

    pub async fn list_apps(&self, req: &ListReq) -> Result<ListAppsResp> {
        check(&PaginationChecker::default(), req)?;

        let rows = apps::list_apps(&self.db, req.name_filter(), req.offset(), req.limit()).await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.view(row).await?);
        }

        let total = apps::count_apps_by_name(&self.db, req.name_filter()).await?;
        let all = apps::count_apps(&self.db).await?;
        let deployed = daemon_sets::count_deployed_apps(&self.db).await?;
        Ok(ListAppsResp {
            apps: views,
            total,
            deployed,
            undeployed: all - deployed,
        })
    }

    /// Replaces image references only; every other container field is fixed
    /// at creation. Running workloads get the new template in the same
    /// transaction as the row.
    pub async fn update_app(&self, req: &UpdateAppReq) -> Result<()> {
        check(&update_app_checker(&self.config.host_path), req)?;

        let app = apps::get_app(&self.db, req.app_id as i64).await?;
        let mut containers = decode_containers(&app)?;
        ensure!(
            containers.len() == req.containers.len(),
            super::RefusedSnafu {
                message: "container count is not equal"
            }
        );
        for (stored, wanted) in containers.iter_mut().zip(&req.containers) {
            stored.image = wanted.image.clone();
            stored.image_version = wanted.image_version.clone();
        }
        let encoded = serde_json::to_string(&containers).context(EncodeSnafu {
            what: "containers",
        })?;
        let description = req.description.as_deref().unwrap_or(&app.description);

        let mut tx = persistence::begin(&self.db).await?;
        apps::update_app(&mut *tx, app.id, description, &encoded).await?;
        for ds in daemon_sets::list_by_app(&mut *tx, app.id).await? {
            let template =
                daemon_set::build(&app, &containers, ds.node_group_id as u64, &self.config);
            self.substrate.update_daemon_set(&template).await?;
            info!("daemon set {} updated", ds.daemon_set_name);
        }
        persistence::commit(tx).await?;

        info!("update app {} success", app.app_name);
        Ok(())
    }

    async fn delete_one(&self, id: u64) -> Result<String> {
        let app = match apps::get_app(&self.db, id as i64).await {
            Ok(app) => app,
            Err(e) if e.is_not_found() => {
                return Err(refused("delete app failed: id does not exist"));
            }
            Err(e) => return Err(e.into()),
        };
        let referenced = daemon_sets::count_by_app(&self.db, app.id).await?;
        ensure!(
            referenced == 0,
            super::RefusedSnafu {
                message: "app is referenced, can not be deleted"
            }
        );
        let removed = apps::delete_app(&self.db, app.id).await?;
        ensure!(
            removed == 1,
            super::RefusedSnafu {
                message: "delete app failed: id does not exist"
            }
        );
        Ok(app.app_name)
    }

    pub async fn delete_app(&self, req: &DeleteAppReq) -> Result<BatchResp> {
        check(&delete_app_checker(), req)?;

        let mut res = BatchResp::default();
        for id in &req.app_ids {
            match self.delete_one(*id).await {
                Ok(name) => {
                    info!("app {} deleted", name);
                    res.succeed(*id);
                }
                Err(e) => {
                    warn!("delete app {} failed: {}", id, e);
                    res.fail(id, e.to_string());
                }
            }
        }
        Ok(res)
    }
}
