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

//! Calls between the app manager and the node manager.
//!
//! Each side depends on the other only through these traits, so both can be
//! built independently and replaced by fakes in tests. The same requests are
//! also routable as `inner/*` resources with JSON bodies.

use crate::types::app::NodeGroupBrief;
use crate::types::node::{NodeStatus, SoftwareInfo};
use crate::types::resources::Resources;
use crate::types::{IntoStatus, Status};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::collections::BTreeMap;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{}", reason))]
    Rejected { reason: String },

    #[snafu(display("{}", what))]
    NotFound { what: String },

    #[snafu(display("{}", message))]
    Internal { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoStatus for Error {
    fn status(&self, failure: Status) -> Status {
        failure
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResourceReq {
    #[serde(rename = "nodeGroupID")]
    pub node_group_id: u64,
    pub resources: Resources,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceReq {
    #[serde(rename = "nodeGroupID")]
    pub node_group_id: u64,
    pub resources: Resources,
    #[serde(default)]
    pub is_undeploy: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupInfosReq {
    #[serde(rename = "nodeGroupIDs")]
    pub node_group_ids: Vec<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueNameReq {
    pub unique_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    #[serde(rename = "nodeID")]
    pub node_id: u64,
    pub node_name: String,
    pub is_managed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusResp {
    pub node_status: NodeStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCountReq {
    #[serde(rename = "nodeGroupIDs")]
    pub node_group_ids: Vec<u64>,
}

/// Served by the node manager.
#[async_trait]
pub trait NodeInner: Send + Sync {
    /// Fails unless every node of the group can still host `resources`.
    async fn check_resource(&self, req: &CheckResourceReq) -> Result<()>;

    /// Adds (or, for undeploy, subtracts) `resources` to the group's request.
    async fn update_resource(&self, req: &UpdateResourceReq) -> Result<()>;

    /// Resolves every id; an unknown id fails the whole call.
    async fn node_groups(&self, ids: &[u64]) -> Result<Vec<NodeGroupBrief>>;

    async fn node_by_unique_name(&self, unique_name: &str) -> Result<NodeRef>;

    async fn node_status(&self, unique_name: &str) -> NodeStatus;

    async fn node_software_info(&self, sn: &str) -> Result<Vec<SoftwareInfo>>;
}

/// Served by the app manager.
#[async_trait]
pub trait AppInner: Send + Sync {
    /// Deployed app count per group; groups without apps map to zero.
    async fn app_counts_by_groups(&self, group_ids: &[u64]) -> Result<BTreeMap<u64, i64>>;
}
