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

use super::status::Status;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

/// Service errors that know which status they surface as.
pub trait IntoStatus: std::fmt::Display {
    /// `failure` is the generic status of the failing operation.
    fn status(&self, failure: Status) -> Status;
}

/// Response envelope returned by every routed operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RespMsg {
    pub status: Status,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RespMsg {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            msg: String::new(),
            data: serde_json::Value::Null,
        }
    }

    pub fn ok<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                status: Status::Success,
                msg: String::new(),
                data,
            },
            Err(e) => Self::error(
                Status::ErrorParamConvert,
                format!("encode response failed: {e}"),
            ),
        }
    }

    pub fn error(status: Status, msg: impl Into<String>) -> Self {
        Self {
            status,
            msg: msg.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Error status that still carries a payload, used by batch operations.
    pub fn error_with<T: Serialize>(status: Status, msg: impl Into<String>, data: &T) -> Self {
        Self {
            status,
            msg: msg.into(),
            data: serde_json::to_value(data).unwrap_or_default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Translates a service result, logging the failure with its operation.
    pub fn from_result<T, E>(operation: &str, failure: Status, result: Result<T, E>) -> Self
    where
        T: Serialize,
        E: IntoStatus,
    {
        match result {
            Ok(data) => Self::ok(&data),
            Err(e) => {
                error!("{} failed: {}", operation, e);
                Self::error(e.status(failure), e.to_string())
            }
        }
    }
}

/// Per-element outcome of a batch mutation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResp {
    #[serde(rename = "successIDs")]
    pub success_ids: Vec<u64>,
    pub failed_infos: BTreeMap<String, String>,
}

impl BatchResp {
    pub fn succeed(&mut self, id: u64) {
        self.success_ids.push(id);
    }

    pub fn fail(&mut self, key: impl ToString, reason: impl Into<String>) {
        self.failed_infos.insert(key.to_string(), reason.into());
    }

    pub fn has_failure(&self) -> bool {
        !self.failed_infos.is_empty()
    }

    pub fn total(&self) -> usize {
        self.success_ids.len() + self.failed_infos.len()
    }

    /// Builds the envelope: `Success` iff every element succeeded.
    pub fn into_resp(self, failure: Status) -> RespMsg {
        if self.has_failure() {
            RespMsg::error_with(failure, "", &self)
        } else {
            RespMsg::ok(&self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: batch outcome drives the envelope status
    #[test]
    fn test_batch_resp_status() {
        let mut batch = BatchResp::default();
        batch.succeed(1);
        assert_eq!(batch.clone().into_resp(Status::ErrorDeleteApp).status, Status::Success);

        batch.fail(2, "app is referenced, can not be deleted");
        assert_eq!(batch.total(), 2);
        let resp = batch.into_resp(Status::ErrorDeleteApp);
        assert_eq!(resp.status, Status::ErrorDeleteApp);
        assert_eq!(
            resp.data["failedInfos"]["2"], "app is referenced, can not be deleted",
            "failed reasons should be keyed by id"
        );
        assert_eq!(resp.data["successIDs"][0], 1);
    }
}
