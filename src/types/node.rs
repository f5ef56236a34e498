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

use super::resources::Resources;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Derived node status.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[derive(Serialize, Deserialize)]
pub enum NodeStatus {
    #[strum(serialize = "ready")]
    #[serde(rename = "ready")]
    Ready,
    #[strum(serialize = "notReady")]
    #[serde(rename = "notReady")]
    NotReady,
    #[strum(serialize = "unknown")]
    #[serde(rename = "unknown")]
    Unknown,
    #[strum(serialize = "offline")]
    #[serde(rename = "offline")]
    Offline,
    #[strum(serialize = "abnormal")]
    #[serde(rename = "abnormal")]
    Abnormal,
}

impl NodeStatus {
    pub fn is_ready(self) -> bool {
        self == NodeStatus::Ready
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub inactive_version: String,
}

/// Body of an edge's software report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareReport {
    pub software_info: Vec<SoftwareInfo>,
}

/// Page selection shared by every list endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReq {
    pub page_num: u64,
    pub page_size: u64,
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for ListReq {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: 10,
            name: None,
        }
    }
}

impl ListReq {
    pub fn offset(&self) -> i64 {
        (self.page_num.saturating_sub(1) * self.page_size) as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    pub fn name_filter(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUnManagedNodeReq {
    #[serde(rename = "nodeID")]
    pub node_id: u64,
    pub node_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "groupIDs")]
    pub group_ids: Vec<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyNodeReq {
    #[serde(rename = "nodeID")]
    pub node_id: u64,
    pub node_name: String,
    /// Omitted keeps the stored description; an empty string clears it.
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteNodeReq {
    #[serde(rename = "nodeIDs")]
    pub node_ids: Vec<u64>,
}

/// Lookup key of the node detail query: exactly one of `id` or `sn`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetailReq {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub sn: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeIdentifier {
    Id(u64),
    Sn(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupNodesReq {
    #[serde(rename = "groupID")]
    pub group_id: u64,
    #[serde(rename = "nodeIDs")]
    pub node_ids: Vec<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationReq {
    #[serde(rename = "nodeID")]
    pub node_id: u64,
    #[serde(rename = "groupID")]
    pub group_id: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeGroupReq {
    pub node_group_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyNodeGroupReq {
    #[serde(rename = "groupID")]
    pub group_id: u64,
    pub node_group_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteNodeGroupReq {
    #[serde(rename = "groupIDs")]
    pub group_ids: Vec<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdReq {
    pub id: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfoView {
    pub id: u64,
    pub node_name: String,
    pub unique_name: String,
    pub serial_number: String,
    pub ip: String,
    pub description: String,
    pub is_managed: bool,
    pub status: NodeStatus,
    pub node_group: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNodesResp {
    pub nodes: Vec<NodeInfoView>,
    pub total: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetailResp {
    #[serde(flatten)]
    pub node: NodeInfoView,
    pub software_info: Vec<SoftwareInfo>,
    pub allocatable: Resources,
    pub available: Resources,
}

/// Count of nodes per status name.
pub type NodeStatistics = BTreeMap<String, i64>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupView {
    #[serde(rename = "groupID")]
    pub group_id: u64,
    pub group_name: String,
    pub description: String,
    pub node_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNodeGroupsResp {
    pub groups: Vec<NodeGroupView>,
    pub total: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupDetailResp {
    #[serde(flatten)]
    pub group: NodeGroupView,
    pub resources_request: Resources,
    pub nodes: Vec<NodeInfoView>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatistics {
    pub total: i64,
}
