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

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter, IntoEnumIterator};

/// Closed set of response statuses carried by every envelope.
///
/// The numeric values are the wire codes; `Success` is zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u32)]
pub enum Status {
    Success = 0,

    ErrorParseBody = 1001,
    ErrorParamInvalid = 1005,
    ErrorParamConvert = 1006,
    ErrorTypeAssert = 1007,
    ErrorNewMsg = 1008,

    ErrorCheckNodeMrgSize = 40011000,
    ErrorNodeMrgDuplicate = 40012000,
    ErrorCreateNodeGroup = 40012001,
    ErrorListNodeGroups = 40012002,
    ErrorGetNodeGroup = 40012003,
    ErrorModifyNodeGroup = 40012004,
    ErrorCountNodeGroup = 40012005,
    ErrorDeleteNodeGroup = 40012006,
    ErrorGetNode = 40012007,
    ErrorModifyNode = 40012008,
    ErrorCountNodeByStatus = 40012009,
    ErrorListNode = 40012010,
    ErrorListUnManagedNode = 40012011,
    ErrorAddNodeToGroup = 40012012,
    ErrorAddUnManagedNode = 40012013,
    ErrorDeleteNode = 40012014,
    ErrorDeleteNodeFromGroup = 40012015,
    ErrorSendMsgToNode = 40012016,
    ErrorGetConfigData = 40012017,
    ErrorGetNodeSoftwareVersion = 40012018,

    ErrorCheckAppMrgSize = 40021000,
    ErrorAppParamConvertDb = 40021001,
    ErrorUnmarshalContainer = 40021002,
    ErrorAppMrgDuplicate = 40022000,
    ErrorAppMrgRecodeNoFound = 40022001,
    ErrorCreateApp = 40022002,
    ErrorQueryApp = 40022003,
    ErrorListApp = 40022004,
    ErrorDeployApp = 40022005,
    ErrorUnDeployApp = 40022006,
    ErrorUpdateApp = 40022007,
    ErrorDeleteApp = 40022008,
    ErrorListAppInstancesByID = 40022009,
    ErrorListAppInstancesByNode = 40022010,
    ErrorListAppInstances = 40022011,
    ErrorGetAppInstanceCountByNodeGroup = 40022012,

    ErrorQueryCrt = 40042002,

    ErrorUpdateSoftwareDownloadProgress = 40062001,
    ErrorGetSoftwareDownloadProgress = 40062002,
}

impl Status {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Status::iter().find(|s| s.code() == code)
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.code())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u32::deserialize(deserializer)?;
        Status::from_code(code).ok_or_else(|| D::Error::custom(format!("unknown status {code}")))
    }
}
