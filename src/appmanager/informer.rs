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

//! Mirrors application pods into instance rows and the status cache.

use super::daemon_set::{self, APP_ID_LABEL, APP_NAME_LABEL};
use super::status::container_status;
use super::{AppService, EncodeSnafu, MAX_APP_INSTANCE, Result};
use crate::persistence::{NewAppInstance, instances};
use crate::substrate::informer::wait_for_sync;
use crate::substrate::{EventHandler, Informer, parse_group_label};
use crate::types::app::ContainerInfo;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use snafu::ResultExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Stored container view of a pod: spec order, current state.
fn container_infos(pod: &Pod) -> Vec<ContainerInfo> {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();
    pod.spec
        .iter()
        .flat_map(|s| s.containers.iter())
        .map(|c| {
            let status = statuses.iter().find(|s| s.name == c.name);
            ContainerInfo {
                name: c.name.clone(),
                image: c.image.clone().unwrap_or_default(),
                status: container_status(status).to_string(),
                restart_count: status.map(|s| s.restart_count).unwrap_or_default(),
            }
        })
        .collect()
}

fn group_id(pod: &Pod) -> Option<u64> {
    pod.spec
        .as_ref()?
        .node_selector
        .as_ref()?
        .keys()
        .find_map(|k| parse_group_label(k))
}

pub struct PodEventHandler {
    service: Arc<AppService>,
}

impl PodEventHandler {
    pub fn new(service: Arc<AppService>) -> Self {
        Self { service }
    }

    /// Instance row for a scheduled application pod; `None` for pods this
    /// manager does not own or that have no node yet.
    async fn instance(&self, pod: &Pod) -> Result<Option<NewAppInstance>> {
        let name = pod.name_any();
        let labels = pod.labels();
        let (Some(app_id), Some(app_name)) = (labels.get(APP_ID_LABEL), labels.get(APP_NAME_LABEL))
        else {
            debug!("pod {} carries no app labels", name);
            return Ok(None);
        };
        let Ok(app_id) = app_id.parse::<i64>() else {
            warn!("pod {} has an invalid app id {}", name, app_id);
            return Ok(None);
        };
        let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) else {
            debug!("pod {} is not scheduled yet", name);
            return Ok(None);
        };
        let node = match self.service.nodes.node_by_unique_name(&node_name).await {
            Ok(node) => node,
            Err(e) => {
                warn!("pod {} runs on unknown node {}: {}", name, node_name, e);
                return Ok(None);
            }
        };
        if !node.is_managed {
            debug!("pod {} runs on unmanaged node {}", name, node_name);
            return Ok(None);
        }
        let Some(group) = group_id(pod) else {
            warn!("pod {} has no node group selector", name);
            return Ok(None);
        };
        let container_info = serde_json::to_string(&container_infos(pod)).context(EncodeSnafu {
            what: "container info",
        })?;

        Ok(Some(NewAppInstance {
            pod_name: name,
            node_id: node.node_id as i64,
            node_name: node.node_name,
            node_unique_name: node_name,
            node_group_id: group as i64,
            app_id,
            app_name: app_name.clone(),
            container_info,
        }))
    }

    async fn insert(&self, row: &NewAppInstance) -> Result<()> {
        let db = &self.service.db;
        if instances::count_instances(db).await? >= MAX_APP_INSTANCE {
            warn!("app instance limit reached, pod {} not recorded", row.pod_name);
            return Ok(());
        }
        match instances::insert_instance(db, row).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => {
                instances::update_instance(db, row).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn record(&self, pod: &Pod) -> Result<()> {
        let Some(row) = self.instance(pod).await? else {
            return Ok(());
        };
        match instances::get_by_pod_name(&self.service.db, &row.pod_name).await? {
            Some(stored)
                if stored.container_info == row.container_info
                    && stored.node_id == row.node_id =>
            {
                Ok(())
            }
            Some(_) => {
                instances::update_instance(&self.service.db, &row).await?;
                Ok(())
            }
            None => self.insert(&row).await,
        }
    }
}

#[async_trait]
impl EventHandler<Pod> for PodEventHandler {
    async fn on_add(&self, pod: &Pod) {
        self.service.status.apply(pod);
        if let Err(e) = self.record(pod).await {
            error!("record app instance {} failed: {}", pod.name_any(), e);
        }
    }

    async fn on_update(&self, old: &Pod, new: &Pod) {
        self.service.status.forget(old);
        self.service.status.apply(new);
        if let Err(e) = self.record(new).await {
            error!("update app instance {} failed: {}", new.name_any(), e);
        }
    }

    async fn on_delete(&self, pod: &Pod) {
        self.service.status.forget(pod);
        match instances::delete_by_pod_name(&self.service.db, &pod.name_any()).await {
            Ok(n) if n > 0 => info!("app instance {} removed", pod.name_any()),
            Ok(_) => {}
            Err(e) => error!("remove app instance {} failed: {}", pod.name_any(), e),
        }
    }
}

impl AppService {
    /// Creates the pull secret, or refills one left without a payload.
    pub async fn ensure_pull_secret(&self) -> Result<()> {
        let wanted = daemon_set::image_pull_secret(&self.config);
        match self.substrate.get_secret(&self.config.image_pull_secret).await {
            Ok(current) if daemon_set::is_empty_secret(&current) => {
                self.substrate.update_secret(&wanted).await?;
                info!("image pull secret {} refilled", self.config.image_pull_secret);
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                self.substrate.create_secret(&wanted).await?;
                info!("image pull secret {} created", self.config.image_pull_secret);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Force-deletes pods stuck terminating, e.g. on unreachable nodes.
    pub async fn sweep_terminating_pods(&self) -> Result<usize> {
        let mut swept = 0;
        for pod in self.substrate.list_pods().await? {
            if pod.metadata.deletion_timestamp.is_none() {
                continue;
            }
            let name = pod.name_any();
            match self.substrate.delete_pod_by_force(&name).await {
                Ok(()) => {
                    info!("terminating pod {} force deleted", name);
                    swept += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!("force delete pod {} failed: {}", name, e),
            }
        }
        Ok(swept)
    }
}

async fn housekeeping(service: Arc<AppService>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(service.config.house_keeping_interval());
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = service.sweep_terminating_pods().await {
                    warn!("housekeeping failed: {}", e);
                }
            }
        }
    }
    debug!("app housekeeping stopped");
}

/// Brings the app manager up: namespace, fresh instance table, synced pod
/// informer, pull secret, then housekeeping.
pub async fn start(
    service: Arc<AppService>,
    shutdown: CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    service
        .substrate
        .ensure_namespace(&service.config.user_namespace)
        .await?;
    let stale = instances::truncate(&service.db).await?;
    debug!("{} stale app instances dropped", stale);

    let informer = Informer::<Pod>::new("pod");
    let synced = informer.synced();
    let stream = service.substrate.watch_pods();
    let handler = Arc::new(PodEventHandler::new(service.clone()));
    let pods = tokio::spawn(informer.run(stream, handler, shutdown.clone()));
    if !wait_for_sync(synced).await {
        warn!("pod informer stopped before its first listing");
    }

    service.ensure_pull_secret().await?;
    let keeper = tokio::spawn(housekeeping(service, shutdown));
    info!("app manager started");
    Ok(vec![pods, keeper])
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Harness, harness};
    use super::*;
    use crate::substrate::{Substrate, group_label};
    use crate::types::node::NodeStatus;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn app_pod(name: &str, node: &str, group: u64, phase: &str) -> Pod {
        let state = if phase == "Running" {
            json!({"running": {}})
        } else {
            json!({"waiting": {"reason": "ContainerCreating"}})
        };
        let mut pod: Pod = serde_json::from_value(json!({
            "metadata": {
                "name": name,
                "namespace": "mef-user",
                "labels": {"AppManager": "app", "AppName": "face-check", "AppId": "1"},
            },
            "spec": {
                "nodeName": node,
                "containers": [{"name": "face-check", "image": "face-check:v1.0"}],
            },
            "status": {
                "phase": phase,
                "containerStatuses": [{
                    "name": "face-check",
                    "image": "face-check:v1.0",
                    "imageID": "",
                    "ready": phase == "Running",
                    "restartCount": 0,
                    "state": state,
                }],
            },
        }))
        .expect("pod");
        if let Some(spec) = pod.spec.as_mut() {
            spec.node_selector = Some(BTreeMap::from([(group_label(group), String::new())]));
        }
        pod
    }

    async fn setup() -> (Harness, u64) {
        let h = harness().await;
        let group = h.group("groupA").await;
        h.nodes.add_node("edge-1", 3, NodeStatus::Ready);
        (h, group)
    }

    // Test 1: an application pod becomes an instance row
    #[tokio::test]
    async fn test_add_records_instance() {
        let (h, group) = setup().await;
        let handler = PodEventHandler::new(h.service.clone());

        handler.on_add(&app_pod("face-check-1-aaaaa", "edge-1", group, "Pending")).await;

        let row = instances::get_by_pod_name(&h.db, "face-check-1-aaaaa")
            .await
            .expect("query")
            .expect("recorded");
        assert_eq!(row.node_id, 3);
        assert_eq!(row.node_group_id, group as i64);
        assert_eq!(row.app_id, 1);
        let infos: Vec<ContainerInfo> = serde_json::from_str(&row.container_info).expect("json");
        assert_eq!(infos[0].status, "waiting");
        assert_eq!(
            h.service
                .status_cache()
                .pod_status("face-check-1-aaaaa", NodeStatus::Ready),
            "pending"
        );
    }

    // Test 2: foreign or unplaced pods are cached but not recorded
    #[tokio::test]
    async fn test_add_skips_foreign_pods() {
        let (h, group) = setup().await;
        let handler = PodEventHandler::new(h.service.clone());

        let mut foreign = app_pod("coredns-1", "edge-1", group, "Running");
        foreign.metadata.labels = None;
        handler.on_add(&foreign).await;
        handler.on_add(&app_pod("face-check-1-bbbbb", "edge-9", group, "Running")).await;

        assert_eq!(instances::count_instances(&h.db).await.expect("count"), 0);
        assert_eq!(h.service.status_cache().len(), 2);
    }

    // Test 3: updates rewrite changed rows and deletes remove them
    #[tokio::test]
    async fn test_update_and_delete() {
        let (h, group) = setup().await;
        let handler = PodEventHandler::new(h.service.clone());
        let pending = app_pod("face-check-1-aaaaa", "edge-1", group, "Pending");
        let running = app_pod("face-check-1-aaaaa", "edge-1", group, "Running");

        handler.on_add(&pending).await;
        handler.on_update(&pending, &running).await;
        let row = instances::get_by_pod_name(&h.db, "face-check-1-aaaaa")
            .await
            .expect("query")
            .expect("row");
        assert!(row.container_info.contains("running"));

        handler.on_delete(&running).await;
        assert!(
            instances::get_by_pod_name(&h.db, "face-check-1-aaaaa")
                .await
                .expect("query")
                .is_none()
        );
        assert!(h.service.status_cache().is_empty());
    }

    // Test 4: terminating pods are force deleted by housekeeping
    #[tokio::test]
    async fn test_sweep_terminating_pods() {
        let (h, group) = setup().await;
        let mut stuck = app_pod("face-check-1-aaaaa", "edge-1", group, "Running");
        stuck.metadata.deletion_timestamp =
            serde_json::from_value(json!("2026-01-01T00:00:00Z")).expect("time");
        h.substrate.apply_pod(stuck);
        h.substrate.apply_pod(app_pod("face-check-1-bbbbb", "edge-1", group, "Running"));

        let swept = h.service.sweep_terminating_pods().await.expect("sweep");
        assert_eq!(swept, 1);
        assert_eq!(h.substrate.pod_names(), vec!["face-check-1-bbbbb".to_string()]);
    }

    // Test 5: startup order leaves a synced cache and a pull secret
    #[tokio::test]
    async fn test_start() {
        let (h, group) = setup().await;
        instances::insert_instance(
            &h.db,
            &NewAppInstance {
                pod_name: "stale-pod".to_string(),
                container_info: "[]".to_string(),
                ..Default::default()
            },
        )
        .await
        .expect("stale row");
        h.substrate.apply_pod(app_pod("face-check-1-aaaaa", "edge-1", group, "Running"));

        let shutdown = CancellationToken::new();
        let tasks = start(h.service.clone(), shutdown.clone()).await.expect("start");

        assert!(h.substrate.has_namespace("mef-user"));
        assert!(h.substrate.secret("image-pull-secret").is_some());
        assert!(
            instances::get_by_pod_name(&h.db, "stale-pod")
                .await
                .expect("query")
                .is_none()
        );
        assert!(
            instances::get_by_pod_name(&h.db, "face-check-1-aaaaa")
                .await
                .expect("query")
                .is_some()
        );

        shutdown.cancel();
        for task in tasks {
            task.await.expect("task stops");
        }
    }

    // Test 6: an empty pull secret is refilled, a filled one is kept
    #[tokio::test]
    async fn test_ensure_pull_secret_refills() {
        let h = harness().await;
        let mut empty = daemon_set::image_pull_secret(&h.service.config);
        empty.data = None;
        h.substrate.create_secret(&empty).await.expect("seed");

        h.service.ensure_pull_secret().await.expect("ensure");
        let secret = h.substrate.secret("image-pull-secret").expect("secret");
        assert!(!daemon_set::is_empty_secret(&secret));

        h.service.ensure_pull_secret().await.expect("ensure again");
        assert_eq!(
            h.substrate.call_count(crate::substrate::memory::Operation::UpdateSecret),
            1
        );
    }

    // Test 7: pods on unmanaged nodes are not recorded
    #[tokio::test]
    async fn test_add_skips_unmanaged_nodes() {
        let (h, group) = setup().await;
        h.nodes.add_unmanaged_node("edge-2", 4);
        let handler = PodEventHandler::new(h.service.clone());

        handler.on_add(&app_pod("face-check-1-ccccc", "edge-2", group, "Running")).await;
        assert_eq!(instances::count_instances(&h.db).await.expect("count"), 0);

        handler.on_add(&app_pod("face-check-1-ddddd", "edge-1", group, "Running")).await;
        assert_eq!(instances::count_instances(&h.db).await.expect("count"), 1);
    }
}
