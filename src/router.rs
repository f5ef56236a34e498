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

//! Dispatch of administrative, edge and inner requests to their services.

use crate::appmanager::AppService;
use crate::bus::{Message, MessageBus, PeerInfo};
use crate::edgemsg::EdgeMsgService;
use crate::inner::{
    AppCountReq, AppInner, CheckResourceReq, NodeGroupInfosReq, NodeInner, NodeStatusResp,
    UniqueNameReq, UpdateResourceReq,
};
use crate::nodemanager::NodeService;
use crate::persistence::nodes::Membership;
use crate::types::edge::EdgeBatchResp;
use crate::types::node::RelationReq;
use crate::types::{BatchResp, IntoStatus, RespMsg, Status};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Prefix of every routed resource.
pub const RESOURCE_PREFIX: &str = "/edgemanager/v1/";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum Resource {
    #[strum(serialize = "app/create")]
    CreateApp,
    #[strum(serialize = "app/update")]
    UpdateApp,
    #[strum(serialize = "app/delete")]
    DeleteApp,
    #[strum(serialize = "app/deploy")]
    DeployApp,
    #[strum(serialize = "app/undeploy")]
    UndeployApp,
    #[strum(serialize = "app/list")]
    ListApps,
    #[strum(serialize = "app/listInstances")]
    ListAppInstances,
    #[strum(serialize = "app/listInstancesById")]
    ListAppInstancesById,
    #[strum(serialize = "app/listInstancesByNode")]
    ListAppInstancesByNode,
    #[strum(serialize = "app/get")]
    QueryApp,

    #[strum(serialize = "node/add")]
    AddUnManagedNode,
    #[strum(serialize = "node/modify")]
    ModifyNode,
    #[strum(serialize = "node/delete")]
    DeleteNode,
    #[strum(serialize = "node/deleteUnmanaged")]
    DeleteUnManagedNode,
    #[strum(serialize = "node/list")]
    ListNodes,
    #[strum(serialize = "node/listUnmanaged")]
    ListUnManagedNodes,
    #[strum(serialize = "node/listAll")]
    ListAllNodes,
    #[strum(serialize = "node/statistics")]
    NodeStatistics,
    #[strum(serialize = "node/detail")]
    NodeDetail,

    #[strum(serialize = "nodegroup/create")]
    CreateNodeGroup,
    #[strum(serialize = "nodegroup/modify")]
    ModifyNodeGroup,
    #[strum(serialize = "nodegroup/delete")]
    DeleteNodeGroup,
    #[strum(serialize = "nodegroup/list")]
    ListNodeGroups,
    #[strum(serialize = "nodegroup/detail")]
    NodeGroupDetail,
    #[strum(serialize = "nodegroup/statistics")]
    NodeGroupStatistics,

    #[strum(serialize = "node/addToGroup")]
    AddNodeToGroup,
    #[strum(serialize = "node/deleteFromGroup")]
    DeleteNodeFromGroup,
    #[strum(serialize = "node/deleteRelations")]
    DeleteRelations,

    #[strum(serialize = "edge/download")]
    DownloadSoftware,
    #[strum(serialize = "edge/upgrade")]
    UpgradeSoftware,
    #[strum(serialize = "edge/queryProgress")]
    QueryProgress,
    #[strum(serialize = "edge/queryVersion")]
    QueryVersion,
    #[strum(serialize = "edge/reportProgress")]
    ReportProgress,
    #[strum(serialize = "edge/reportSoftwareInfo")]
    ReportSoftwareInfo,
    #[strum(serialize = "edge/getCert")]
    GetCert,
    #[strum(serialize = "edge/getConfig")]
    GetConfig,

    #[strum(serialize = "inner/checkResource")]
    CheckResource,
    #[strum(serialize = "inner/updateResource")]
    UpdateResource,
    #[strum(serialize = "inner/nodeGroup")]
    InnerNodeGroup,
    #[strum(serialize = "inner/node")]
    InnerNode,
    #[strum(serialize = "inner/nodeStatus")]
    InnerNodeStatus,
    #[strum(serialize = "inner/nodeSoftwareInfo")]
    InnerNodeSoftwareInfo,
    #[strum(serialize = "inner/appInstanceByNodeGroup")]
    AppInstanceByNodeGroup,
}

impl Resource {
    /// Accepts either the bare fragment or the full `/edgemanager/v1/...` path.
    pub fn from_path(path: &str) -> Option<Self> {
        let fragment = path.strip_prefix(RESOURCE_PREFIX).unwrap_or(path);
        fragment.trim_start_matches('/').parse().ok()
    }

    /// Resources an edge session may call. Everything else is administrative
    /// or inner and never accepted from an edge.
    pub fn is_edge_report(self) -> bool {
        matches!(
            self,
            Resource::ReportProgress
                | Resource::ReportSoftwareInfo
                | Resource::GetCert
                | Resource::GetConfig
        )
    }

    pub fn is_inner(self) -> bool {
        let name: &'static str = self.into();
        name.starts_with("inner/")
    }
}

/// Decodes a request body. A string body is parsed as JSON text first.
fn decode<T: DeserializeOwned>(content: &serde_json::Value) -> Result<T, RespMsg> {
    match content {
        serde_json::Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            RespMsg::error(Status::ErrorParseBody, format!("parse request body failed: {e}"))
        }),
        other => T::deserialize(other).map_err(|e| {
            RespMsg::error(Status::ErrorParamConvert, format!("convert request failed: {e}"))
        }),
    }
}

macro_rules! decode_or_return {
    ($content:expr) => {
        match decode($content) {
            Ok(req) => req,
            Err(resp) => return resp,
        }
    };
}

fn batch<E: IntoStatus>(operation: &str, failure: Status, result: Result<BatchResp, E>) -> RespMsg {
    match result {
        Ok(batch) => {
            if batch.has_failure() {
                warn!("{} partly failed: {:?}", operation, batch.failed_infos);
            }
            batch.into_resp(failure)
        }
        Err(e) => RespMsg::from_result::<(), E>(operation, failure, Err(e)),
    }
}

fn edge_batch<E: IntoStatus>(
    operation: &str,
    failure: Status,
    result: Result<EdgeBatchResp, E>,
) -> RespMsg {
    match result {
        Ok(batch) if batch.has_failure() => {
            warn!("{} partly failed: {:?}", operation, batch.failed_infos);
            RespMsg::error_with(failure, "", &batch)
        }
        other => RespMsg::from_result(operation, failure, other),
    }
}

/// Raw text of an edge report; structured content is re-encoded.
fn raw_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

pub struct Router {
    apps: Arc<AppService>,
    nodes: Arc<NodeService>,
    edge: Arc<EdgeMsgService>,
    deployed: Arc<dyn AppInner>,
}

impl Router {
    pub fn new(
        apps: Arc<AppService>,
        nodes: Arc<NodeService>,
        edge: Arc<EdgeMsgService>,
        deployed: Arc<dyn AppInner>,
    ) -> Self {
        Self {
            apps,
            nodes,
            edge,
            deployed,
        }
    }

    pub async fn dispatch(
        &self,
        resource: Resource,
        mut content: serde_json::Value,
        peer: Option<&PeerInfo>,
    ) -> RespMsg {
        let content = &mut content;
        debug!("dispatch {}", resource);
        match resource {
            Resource::CreateApp => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "create app",
                    Status::ErrorCreateApp,
                    self.apps.create_app(&req).await,
                )
            }
            Resource::UpdateApp => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "update app",
                    Status::ErrorUpdateApp,
                    self.apps.update_app(&req).await,
                )
            }
            Resource::DeleteApp => {
                let req = decode_or_return!(content);
                batch("delete app", Status::ErrorDeleteApp, self.apps.delete_app(&req).await)
            }
            Resource::DeployApp => {
                let req = decode_or_return!(content);
                batch("deploy app", Status::ErrorDeployApp, self.apps.deploy_app(&req).await)
            }
            Resource::UndeployApp => {
                let req = decode_or_return!(content);
                batch("undeploy app", Status::ErrorUnDeployApp, self.apps.undeploy_app(&req).await)
            }
            Resource::ListApps => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "list apps",
                    Status::ErrorListApp,
                    self.apps.list_apps(&req).await,
                )
            }
            Resource::ListAppInstances => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "list app instances",
                    Status::ErrorListAppInstances,
                    self.apps.list_app_instances(&req).await,
                )
            }
            Resource::ListAppInstancesById => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "list app instances by id",
                    Status::ErrorListAppInstancesByID,
                    self.apps.list_app_instances_by_id(&req).await,
                )
            }
            Resource::ListAppInstancesByNode => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "list app instances by node",
                    Status::ErrorListAppInstancesByNode,
                    self.apps.list_app_instances_by_node(&req).await,
                )
            }
            Resource::QueryApp => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "query app",
                    Status::ErrorQueryApp,
                    self.apps.query_app(&req).await,
                )
            }

            Resource::AddUnManagedNode => {
                let req = decode_or_return!(content);
                batch(
                    "add unmanaged node",
                    Status::ErrorAddUnManagedNode,
                    self.nodes.add_unmanaged_node(&req).await,
                )
            }
            Resource::ModifyNode => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "modify node",
                    Status::ErrorModifyNode,
                    self.nodes.modify_node(&req).await,
                )
            }
            Resource::DeleteNode => {
                let req = decode_or_return!(content);
                batch(
                    "delete node",
                    Status::ErrorDeleteNode,
                    self.nodes.batch_delete_node(&req).await,
                )
            }
            Resource::DeleteUnManagedNode => {
                let req = decode_or_return!(content);
                batch(
                    "delete unmanaged node",
                    Status::ErrorDeleteNode,
                    self.nodes.delete_unmanaged_node(&req).await,
                )
            }
            Resource::ListNodes => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "list nodes",
                    Status::ErrorListNode,
                    self.nodes.list_nodes(&req, Membership::Managed).await,
                )
            }
            Resource::ListUnManagedNodes => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "list unmanaged nodes",
                    Status::ErrorListUnManagedNode,
                    self.nodes.list_nodes(&req, Membership::Unmanaged).await,
                )
            }
            Resource::ListAllNodes => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "list all nodes",
                    Status::ErrorListNode,
                    self.nodes.list_nodes(&req, Membership::All).await,
                )
            }
            Resource::NodeStatistics => RespMsg::from_result(
                "node statistics",
                Status::ErrorCountNodeByStatus,
                self.nodes.get_node_statistics().await,
            ),
            Resource::NodeDetail => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "node detail",
                    Status::ErrorGetNode,
                    self.nodes.get_node_detail(&req).await,
                )
            }

            Resource::CreateNodeGroup => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "create node group",
                    Status::ErrorCreateNodeGroup,
                    self.nodes.create_node_group(&req).await,
                )
            }
            Resource::ModifyNodeGroup => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "modify node group",
                    Status::ErrorModifyNodeGroup,
                    self.nodes.modify_node_group(&req).await,
                )
            }
            Resource::DeleteNodeGroup => {
                let req = decode_or_return!(content);
                batch(
                    "delete node group",
                    Status::ErrorDeleteNodeGroup,
                    self.nodes.batch_delete_node_group(&req).await,
                )
            }
            Resource::ListNodeGroups => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "list node groups",
                    Status::ErrorListNodeGroups,
                    self.nodes.list_node_groups(&req).await,
                )
            }
            Resource::NodeGroupDetail => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "node group detail",
                    Status::ErrorGetNodeGroup,
                    self.nodes.get_node_group_detail(&req).await,
                )
            }
            Resource::NodeGroupStatistics => RespMsg::from_result(
                "node group statistics",
                Status::ErrorCountNodeGroup,
                self.nodes.get_node_group_statistics().await,
            ),

            Resource::AddNodeToGroup => {
                let req = decode_or_return!(content);
                batch(
                    "add node to group",
                    Status::ErrorAddNodeToGroup,
                    self.nodes.add_node_to_group(&req).await,
                )
            }
            Resource::DeleteNodeFromGroup => {
                let req = decode_or_return!(content);
                batch(
                    "delete node from group",
                    Status::ErrorDeleteNodeFromGroup,
                    self.nodes.delete_node_from_group(&req).await,
                )
            }
            Resource::DeleteRelations => {
                let req: Vec<RelationReq> = decode_or_return!(content);
                batch(
                    "delete node relations",
                    Status::ErrorDeleteNodeFromGroup,
                    self.nodes.batch_delete_node_relation(&req).await,
                )
            }

            Resource::DownloadSoftware => {
                let decoded = decode(content);
                crate::bus::scrub_json(content);
                let req = match decoded {
                    Ok(req) => req,
                    Err(resp) => return resp,
                };
                edge_batch(
                    "download software",
                    Status::ErrorSendMsgToNode,
                    self.edge.download_software(req).await,
                )
            }
            Resource::UpgradeSoftware => {
                let req = decode_or_return!(content);
                edge_batch(
                    "upgrade software",
                    Status::ErrorSendMsgToNode,
                    self.edge.upgrade_software(&req).await,
                )
            }
            Resource::QueryProgress => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "query download progress",
                    Status::ErrorGetSoftwareDownloadProgress,
                    self.edge.query_progress(&req),
                )
            }
            Resource::QueryVersion => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "query software version",
                    Status::ErrorGetNodeSoftwareVersion,
                    self.edge.query_version(&req).await,
                )
            }
            Resource::ReportProgress => {
                let report = decode_or_return!(content);
                RespMsg::from_result(
                    "report download progress",
                    Status::ErrorUpdateSoftwareDownloadProgress,
                    self.edge.report_progress(peer, &report),
                )
            }
            Resource::ReportSoftwareInfo => RespMsg::from_result(
                "report software info",
                Status::ErrorModifyNode,
                self.nodes
                    .update_node_software_info(&raw_text(content), peer)
                    .await,
            ),
            Resource::GetCert => {
                let req = decode_or_return!(content);
                RespMsg::from_result(
                    "get cert",
                    Status::ErrorQueryCrt,
                    self.edge.get_cert(peer, &req).await,
                )
            }
            Resource::GetConfig => RespMsg::from_result(
                "get config",
                Status::ErrorGetConfigData,
                self.edge.get_config(peer).await,
            ),

            Resource::CheckResource => {
                let req: CheckResourceReq = decode_or_return!(content);
                RespMsg::from_result(
                    "check resource",
                    Status::ErrorDeployApp,
                    self.nodes.check_resource(&req).await,
                )
            }
            Resource::UpdateResource => {
                let req: UpdateResourceReq = decode_or_return!(content);
                RespMsg::from_result(
                    "update resource",
                    Status::ErrorModifyNodeGroup,
                    self.nodes.update_resource(&req).await,
                )
            }
            Resource::InnerNodeGroup => {
                let req: NodeGroupInfosReq = decode_or_return!(content);
                RespMsg::from_result(
                    "get node groups",
                    Status::ErrorGetNodeGroup,
                    self.nodes.node_groups(&req.node_group_ids).await,
                )
            }
            Resource::InnerNode => {
                let req: UniqueNameReq = decode_or_return!(content);
                RespMsg::from_result(
                    "get node",
                    Status::ErrorGetNode,
                    self.nodes.node_by_unique_name(&req.unique_name).await,
                )
            }
            Resource::InnerNodeStatus => {
                let req: UniqueNameReq = decode_or_return!(content);
                let node_status =
                    NodeInner::node_status(self.nodes.as_ref(), &req.unique_name).await;
                RespMsg::ok(&NodeStatusResp { node_status })
            }
            Resource::InnerNodeSoftwareInfo => {
                let req: crate::types::edge::SerialNumberReq = decode_or_return!(content);
                RespMsg::from_result(
                    "get node software info",
                    Status::ErrorGetNodeSoftwareVersion,
                    self.nodes.node_software_info(&req.serial_number).await,
                )
            }
            Resource::AppInstanceByNodeGroup => {
                let req: AppCountReq = decode_or_return!(content);
                RespMsg::from_result(
                    "count apps by node group",
                    Status::ErrorGetAppInstanceCountByNodeGroup,
                    self.deployed.app_counts_by_groups(&req.node_group_ids).await,
                )
            }
        }
    }

    /// Handles one message that arrived from an edge session.
    ///
    /// Only edge reports are accepted. A sync message is answered with the
    /// envelope; an async one only logs its outcome.
    pub async fn handle_edge_message(&self, bus: &dyn MessageBus, mut msg: Message) {
        let resp = match Resource::from_path(&msg.router.resource) {
            Some(resource) if resource.is_edge_report() => {
                let content = std::mem::take(&mut msg.content);
                self.dispatch(resource, content, msg.peer.as_ref()).await
            }
            _ => {
                warn!(
                    "edge {} sent unsupported resource {}",
                    msg.header.node_id, msg.router.resource
                );
                RespMsg::error(Status::ErrorParamInvalid, "unsupported resource")
            }
        };

        if !msg.header.sync {
            if !resp.is_success() {
                warn!("edge message {} failed: {}", msg.router.resource, resp.msg);
            }
            return;
        }
        let reply = msg.response(serde_json::to_value(&resp).unwrap_or_default());
        if let Err(e) = bus.send(reply).await {
            warn!("answer edge {} failed: {}", msg.header.node_id, e);
        }
    }
}

/// Feeds edge-originated messages to the router, one at a time, until
/// shutdown or until the transport closes.
pub async fn serve_edges(
    router: Arc<Router>,
    bus: Arc<dyn MessageBus>,
    mut inbound: mpsc::Receiver<Message>,
    shutdown: CancellationToken,
) {
    info!("edge message loop started");
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = inbound.recv() => match msg {
                Some(msg) => msg,
                None => {
                    error!("edge transport closed");
                    break;
                }
            },
        };
        router.handle_edge_message(bus.as_ref(), msg).await;
    }
    info!("edge message loop stopped");
}
