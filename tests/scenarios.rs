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

//! Whole-process scenarios driven through the router, over in-memory
//! substrate, bus and database.

use edge_manager::bus::{LocalBus, Message, OK};
use edge_manager::config::Config;
use edge_manager::context::Context;
use edge_manager::edgemsg::FileCertProvider;
use edge_manager::persistence::{self, NewNode, daemon_sets, nodes};
use edge_manager::router::{Resource, Router};
use edge_manager::substrate::MemorySubstrate;
use edge_manager::substrate::memory::Operation;
use edge_manager::types::{RespMsg, Status};
use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeCondition, NodeStatus};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const EDGE_SN: &str = "2102312NSF10K8000130";

struct World {
    context: Context,
    router: Arc<Router>,
    substrate: Arc<MemorySubstrate>,
    bus: LocalBus,
    _inbound: mpsc::Receiver<Message>,
    _certs: TempDir,
}

async fn world() -> World {
    let certs = tempfile::tempdir().expect("tempdir");
    let db = persistence::memory_db().await.expect("database");
    let substrate = Arc::new(MemorySubstrate::new());
    let (bus, inbound) = LocalBus::new(16);
    let context = Context::new(
        Config::default(),
        db,
        substrate.clone(),
        Arc::new(bus.clone()),
        Arc::new(FileCertProvider::new(certs.path())),
    );
    World {
        router: context.router.clone(),
        context,
        substrate,
        bus,
        _inbound: inbound,
        _certs: certs,
    }
}

impl World {
    async fn call(&self, resource: Resource, content: Value) -> RespMsg {
        self.router.dispatch(resource, content, None).await
    }

    async fn group(&self, name: &str) -> u64 {
        let resp = self
            .call(Resource::CreateNodeGroup, json!({"nodeGroupName": name}))
            .await;
        assert!(resp.is_success(), "create group {name}: {resp:?}");
        resp.data.as_u64().expect("group id")
    }

    async fn daemon_set_count(&self) -> usize {
        daemon_sets::list_all(&self.context.db)
            .await
            .expect("daemon sets")
            .len()
    }
}

fn face_check(image_version: &str) -> Value {
    json!({
        "name": "container1",
        "image": "euler_image",
        "imageVersion": image_version,
        "cpuRequest": 1.0,
        "memRequest": 1024,
        "ports": [{
            "name": "port1",
            "proto": "TCP",
            "containerPort": 1234,
            "hostIp": "127.0.0.1",
            "hostPort": 6666
        }],
        "hostPathVolumes": [{
            "name": "npu-smi",
            "hostPath": "/usr/local/sbin/npu-smi",
            "mountPath": "/usr/local/sbin/npu-smi"
        }]
    })
}

/// App `face-check` deployed on two fresh groups.
async fn deployed(w: &World) -> u64 {
    let g1 = w.group("group1").await;
    let g2 = w.group("group2").await;
    assert_eq!((g1, g2), (1, 2));

    let resp = w
        .call(
            Resource::CreateApp,
            json!({"appName": "face-check", "containers": [face_check("1.0")]}),
        )
        .await;
    assert!(resp.is_success(), "create app: {resp:?}");
    let app_id = resp.data.as_u64().expect("app id");

    let resp = w
        .call(
            Resource::DeployApp,
            json!({"appID": app_id, "nodeGroupIds": [g1, g2]}),
        )
        .await;
    assert_eq!(resp.status, Status::Success, "deploy: {resp:?}");
    app_id
}

fn edge_node(name: &str, sn: &str, ip: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                edge_manager::SERIAL_NUMBER_LABEL.to_string(),
                sn.to_string(),
            )])),
            ..Default::default()
        },
        spec: None,
        status: Some(NodeStatus {
            allocatable: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("4".to_string())),
                ("memory".to_string(), Quantity("8Gi".to_string())),
            ])),
            addresses: Some(vec![NodeAddress {
                type_: "InternalIP".to_string(),
                address: ip.to_string(),
            }]),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

// Test 1: create and deploy onto two groups
#[tokio::test]
async fn test_create_and_deploy() {
    let w = world().await;
    deployed(&w).await;

    assert_eq!(w.daemon_set_count().await, 2);
    assert_eq!(
        w.substrate.daemon_set_names(),
        vec!["face-check-1".to_string(), "face-check-2".to_string()]
    );
}

// Test 2: deploying again onto a group that already runs the app
#[tokio::test]
async fn test_deploy_duplicate() {
    let w = world().await;
    let app_id = deployed(&w).await;

    let resp = w
        .call(Resource::DeployApp, json!({"appID": app_id, "nodeGroupIds": [1]}))
        .await;
    assert_eq!(resp.status, Status::ErrorDeployApp);
    let reason = resp.data["failedInfos"]["1"].as_str().expect("failure of group 1");
    assert!(reason.contains("app already exists"), "{reason}");
    assert_eq!(w.daemon_set_count().await, 2);
    assert_eq!(w.substrate.daemon_set_names().len(), 2);
}

// Test 3: a new image version rolls every deployed daemon-set
#[tokio::test]
async fn test_update_image() {
    let w = world().await;
    let app_id = deployed(&w).await;

    let resp = w
        .call(
            Resource::UpdateApp,
            json!({"appID": app_id, "containers": [face_check("2.0")]}),
        )
        .await;
    assert_eq!(resp.status, Status::Success, "update: {resp:?}");

    let app = persistence::apps::get_app(&w.context.db, app_id as i64)
        .await
        .expect("app row");
    let containers: Value = serde_json::from_str(&app.containers).expect("containers");
    assert_eq!(containers[0]["imageVersion"], "2.0");
    assert_eq!(w.substrate.call_count(Operation::UpdateDaemonSet), 2);
}

// Test 4: a deployed app can not be deleted
#[tokio::test]
async fn test_delete_referenced_app() {
    let w = world().await;
    let app_id = deployed(&w).await;

    let resp = w.call(Resource::DeleteApp, json!({"appIDs": [app_id]})).await;
    assert_eq!(resp.status, Status::ErrorDeleteApp);
    let reason = resp.data["failedInfos"][app_id.to_string()]
        .as_str()
        .expect("failure of the app");
    assert!(reason.contains("app is referenced, can not be deleted"), "{reason}");
}

// Test 5: a download primes progress once the edge accepts it
#[tokio::test]
async fn test_progress_fan_out() {
    let w = world().await;
    let edge = w.bus.connect(EDGE_SN, "10.0.0.1").await;
    let _seen = edge.respond_with(json!(OK));

    let package = "GET https://127.0.0.1/Ascend-mindxedge-mefedge_5.0.RC1_linux-aarch64.tar.gz";
    let resp = w
        .call(
            Resource::DownloadSoftware,
            json!({
                "serialNumbers": [EDGE_SN],
                "softwareName": "MEFEdge",
                "softwareVersion": "5.0.RC1",
                "downloadInfo": {
                    "package": package,
                    "signFile": format!("{package}.cms"),
                    "crlFile": format!("{package}.crl"),
                    "userName": "FileTransferAccount",
                    "password": b"Huawei12#$".to_vec()
                }
            }),
        )
        .await;
    assert_eq!(resp.status, Status::Success, "download: {resp:?}");
    assert_eq!(resp.data["successIDs"], json!([EDGE_SN]));

    let resp = w
        .call(Resource::QueryProgress, json!({"serialNumber": EDGE_SN}))
        .await;
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.data["progress"], 0);

    let resp = w
        .call(Resource::QueryProgress, json!({"serialNumber": "21!invalid$"}))
        .await;
    assert_eq!(resp.status, Status::ErrorParamInvalid);
}

// Test 6: re-discovering a managed node keeps it managed
#[tokio::test]
async fn test_rediscovery_preserves_management() {
    let w = world().await;
    let id = nodes::upsert_node(
        &w.context.db,
        &NewNode {
            node_name: "edge-1".into(),
            unique_name: "edge-1".into(),
            serial_number: "SN1".into(),
            ip: "10.0.0.1".into(),
        },
    )
    .await
    .expect("node");
    nodes::manage_node(&w.context.db, id, "edge-1", "lab")
        .await
        .expect("manage");

    w.substrate.apply_node(edge_node("edge-1", "SN1", "10.0.0.2"));
    let shutdown = CancellationToken::new();
    let tasks = w.context.start(shutdown.clone()).await.expect("start");

    let mut node = None;
    for _ in 0..50 {
        let row = nodes::get_node_by_sn(&w.context.db, "SN1")
            .await
            .expect("lookup")
            .expect("row");
        if row.ip == "10.0.0.2" {
            node = Some(row);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let node = node.expect("new ip applied");
    assert_eq!(node.id, id);
    assert!(node.is_managed);
    assert_eq!(nodes::count_nodes(&w.context.db).await.expect("count"), 1);

    shutdown.cancel();
    for task in tasks {
        task.await.expect("task");
    }
}
