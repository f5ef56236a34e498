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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Edge software the control plane is allowed to push.
pub const MEF_EDGE_SOFTWARE: &str = "MEFEdge";

/// Every copy, clones included, is wiped when dropped.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub package: String,
    pub sign_file: String,
    pub crl_file: String,
    pub user_name: String,
    #[serde(default)]
    pub password: Vec<u8>,
}

// hand-written so the password never reaches a log line
impl std::fmt::Debug for DownloadInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadInfo")
            .field("package", &self.package)
            .field("sign_file", &self.sign_file)
            .field("crl_file", &self.crl_file)
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSoftwareReq {
    pub serial_numbers: Vec<String>,
    pub software_name: String,
    #[serde(default)]
    pub software_version: String,
    pub download_info: DownloadInfo,
}

/// What the edge receives for a download job: one node, same package.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDownloadContent {
    pub serial_number: String,
    pub software_name: String,
    pub software_version: String,
    pub download_info: DownloadInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeSoftwareReq {
    pub serial_numbers: Vec<String>,
    pub software_name: String,
    #[serde(default)]
    pub software_version: String,
}

/// Per-edge outcome of a software job, keyed by serial number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeBatchResp {
    #[serde(rename = "successIDs")]
    pub success_sns: Vec<String>,
    pub failed_infos: BTreeMap<String, String>,
}

impl EdgeBatchResp {
    pub fn succeed(&mut self, sn: &str) {
        self.success_sns.push(sn.to_string());
    }

    pub fn fail(&mut self, sn: &str, reason: impl Into<String>) {
        self.failed_infos.insert(sn.to_string(), reason.into());
    }

    pub fn has_failure(&self) -> bool {
        !self.failed_infos.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialNumberReq {
    pub serial_number: String,
}

/// Most recent progress of an edge software job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub progress: u8,
    #[serde(default)]
    pub res: String,
    #[serde(default)]
    pub msg: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertReq {
    pub cert_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertInfo {
    pub cert_name: String,
    pub cert: String,
    /// Hex SHA-256 of the first certificate.
    pub fingerprint: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInfo {
    pub image_address: String,
}
