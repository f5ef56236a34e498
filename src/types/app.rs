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

/// One container of an application template.
///
/// Stored serialised inside the application row, in request order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub image_version: String,
    pub cpu_request: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
    /// MiB
    pub mem_request: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npu: Option<i64>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub ports: Vec<ContainerPort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub host_path_volumes: Vec<HostPathVolume>,
}

impl Container {
    /// Effective limits: requests, overridden by explicit limits.
    pub fn limits(&self) -> Resources {
        Resources {
            cpu: self.cpu_limit.unwrap_or(self.cpu_request),
            memory: self.mem_limit.unwrap_or(self.mem_request),
            npu: self.npu.unwrap_or_default(),
        }
    }

    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.image_version)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub name: String,
    pub proto: String,
    pub container_port: i32,
    pub host_ip: String,
    pub host_port: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPathVolume {
    pub name: String,
    pub host_path: String,
    pub mount_path: String,
}

/// Sum of container limits of an application.
pub fn total_limits(containers: &[Container]) -> Resources {
    containers
        .iter()
        .fold(Resources::default(), |acc, c| acc + c.limits())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppReq {
    pub app_name: String,
    #[serde(default)]
    pub description: String,
    pub containers: Vec<Container>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppReq {
    #[serde(rename = "appID")]
    pub app_id: u64,
    /// Omitted keeps the stored description; an empty string clears it.
    #[serde(default)]
    pub description: Option<String>,
    pub containers: Vec<Container>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdReq {
    #[serde(rename = "appID")]
    pub app_id: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAppReq {
    #[serde(rename = "appIDs")]
    pub app_ids: Vec<u64>,
}

/// Body of both deploy and undeploy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAppReq {
    #[serde(rename = "appID")]
    pub app_id: u64,
    pub node_group_ids: Vec<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdReq {
    #[serde(rename = "nodeID")]
    pub node_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupBrief {
    pub node_group_id: u64,
    pub node_group_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppReturnInfo {
    #[serde(rename = "appID")]
    pub app_id: u64,
    pub app_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub node_group_infos: Vec<NodeGroupBrief>,
    pub containers: Vec<Container>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAppsResp {
    pub apps: Vec<AppReturnInfo>,
    pub total: i64,
    pub deployed: i64,
    pub undeployed: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
    pub status: String,
    #[serde(default)]
    pub restart_count: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstanceResp {
    #[serde(rename = "appID")]
    pub app_id: u64,
    pub app_name: String,
    pub pod_name: String,
    #[serde(rename = "nodeID")]
    pub node_id: u64,
    pub node_name: String,
    pub node_status: String,
    pub node_group_id: u64,
    pub node_group_name: String,
    pub pod_status: String,
    pub container_infos: Vec<ContainerInfo>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAppInstancesResp {
    pub app_instances: Vec<AppInstanceResp>,
    pub total: usize,
}
