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

//! Application templates, their per-group daemon workloads and the pods
//! those workloads run.

use crate::config::Config;
use crate::inner::{self, AppInner, NodeInner};
use crate::persistence::{self, AppInfoRecord, Db, daemon_sets};
use crate::substrate::{self, Substrate};
use crate::types::app::{AppReturnInfo, Container};
use crate::types::{IntoStatus, Status};
use crate::validation::{CheckResult, Checker};
use async_trait::async_trait;
use snafu::{Snafu, ensure};
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod apps;
pub mod daemon_set;
pub mod deploy;
pub mod informer;
pub mod instances;
pub mod status;

pub use informer::PodEventHandler;
pub use status::AppStatusCache;

pub const MAX_APP: i64 = 1000;
pub const MAX_APP_INSTANCE: i64 = 21000;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{}", reason))]
    Param { reason: String },

    #[snafu(display("{}", message))]
    Refused { message: String },

    #[snafu(display("app number is enough, can not be created"))]
    AppLimit,

    #[snafu(display("app name {} is duplicate", name))]
    Duplicate { name: String },

    #[snafu(display("encode {} failed: {}", what, source))]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("decode {} failed: {}", what, source))]
    Decode {
        what: String,
        source: serde_json::Error,
    },

    #[snafu(transparent)]
    Persistence { source: persistence::Error },

    #[snafu(transparent)]
    Substrate { source: substrate::Error },

    #[snafu(transparent)]
    Inner { source: inner::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoStatus for Error {
    fn status(&self, failure: Status) -> Status {
        match self {
            Error::Param { .. } => Status::ErrorParamInvalid,
            Error::AppLimit => Status::ErrorCheckAppMrgSize,
            Error::Duplicate { .. } => Status::ErrorAppMrgDuplicate,
            Error::Encode { .. } => Status::ErrorAppParamConvertDb,
            Error::Decode { .. } => Status::ErrorUnmarshalContainer,
            Error::Persistence { source } if source.is_not_found() => {
                Status::ErrorAppMrgRecodeNoFound
            }
            _ => failure,
        }
    }
}

pub(crate) fn check<T: ?Sized>(checker: &impl Checker<T>, value: &T) -> Result<()> {
    let CheckResult { result, reason } = checker.check(value);
    ensure!(result, ParamSnafu { reason });
    Ok(())
}

pub(crate) fn refused(message: impl Into<String>) -> Error {
    Error::Refused {
        message: message.into(),
    }
}

pub(crate) fn decode_containers(app: &AppInfoRecord) -> Result<Vec<Container>> {
    serde_json::from_str(&app.containers).map_err(|source| Error::Decode {
        what: format!("containers of app {}", app.app_name),
        source,
    })
}

pub struct AppService {
    db: Db,
    config: Arc<Config>,
    substrate: Arc<dyn Substrate>,
    nodes: Arc<dyn NodeInner>,
    status: Arc<AppStatusCache>,
}

impl AppService {
    pub fn new(
        db: Db,
        config: Arc<Config>,
        substrate: Arc<dyn Substrate>,
        nodes: Arc<dyn NodeInner>,
    ) -> Self {
        Self {
            db,
            config,
            substrate,
            nodes,
            status: Arc::new(AppStatusCache::new()),
        }
    }

    pub fn status_cache(&self) -> Arc<AppStatusCache> {
        self.status.clone()
    }

    /// External view of an app with the groups it is deployed on.
    pub(crate) async fn view(&self, app: AppInfoRecord) -> Result<AppReturnInfo> {
        let containers = decode_containers(&app)?;
        let ids: Vec<u64> = daemon_sets::list_by_app(&self.db, app.id)
            .await?
            .iter()
            .map(|ds| ds.node_group_id as u64)
            .collect();
        let node_group_infos = if ids.is_empty() {
            Vec::new()
        } else {
            self.nodes.node_groups(&ids).await?
        };
        Ok(AppReturnInfo {
            app_id: app.id as u64,
            app_name: app.app_name,
            description: app.description,
            created_at: app.created_at,
            modified_at: app.updated_at,
            node_group_infos,
            containers,
        })
    }
}

/// Deployed-app counts served to the node manager.
#[derive(Clone)]
pub struct DeployedApps {
    db: Db,
}

impl DeployedApps {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AppInner for DeployedApps {
    async fn app_counts_by_groups(&self, group_ids: &[u64]) -> inner::Result<BTreeMap<u64, i64>> {
        let ids: Vec<i64> = group_ids.iter().map(|id| *id as i64).collect();
        let counts = daemon_sets::counts_by_groups(&self.db, &ids)
            .await
            .map_err(|e| inner::Error::Internal {
                message: e.to_string(),
            })?;
        Ok(group_ids
            .iter()
            .map(|id| (*id, counts.get(&(*id as i64)).copied().unwrap_or_default()))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Wiring of an app service over in-memory fakes.

    use super::*;
    use crate::inner::{CheckResourceReq, NodeRef, UpdateResourceReq};
    use crate::persistence::{groups, memory_db};
    use crate::substrate::MemorySubstrate;
    use crate::types::app::NodeGroupBrief;
    use crate::types::node::{NodeStatus, SoftwareInfo};
    use std::sync::Mutex;

    /// Node manager answers scripted by the test.
    #[derive(Default)]
    pub struct FakeNodes {
        groups: Mutex<BTreeMap<u64, String>>,
        nodes: Mutex<BTreeMap<String, (NodeRef, NodeStatus)>>,
        rejection: Mutex<Option<String>>,
        update_failure: Mutex<Option<String>>,
        updates: Mutex<Vec<UpdateResourceReq>>,
        software: Mutex<BTreeMap<String, Vec<SoftwareInfo>>>,
    }

    fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    impl FakeNodes {
        pub fn add_group(&self, id: u64, name: &str) {
            locked(&self.groups).insert(id, name.to_string());
        }

        pub fn add_node(&self, unique_name: &str, id: u64, status: NodeStatus) {
            self.insert_node(unique_name, id, status, true);
        }

        pub fn add_unmanaged_node(&self, unique_name: &str, id: u64) {
            self.insert_node(unique_name, id, NodeStatus::Ready, false);
        }

        fn insert_node(&self, unique_name: &str, id: u64, status: NodeStatus, is_managed: bool) {
            locked(&self.nodes).insert(
                unique_name.to_string(),
                (
                    NodeRef {
                        node_id: id,
                        node_name: unique_name.to_string(),
                        is_managed,
                    },
                    status,
                ),
            );
        }

        pub fn reject_resources(&self, reason: Option<&str>) {
            *locked(&self.rejection) = reason.map(str::to_string);
        }

        pub fn fail_updates(&self, reason: Option<&str>) {
            *locked(&self.update_failure) = reason.map(str::to_string);
        }

        pub fn updates(&self) -> Vec<UpdateResourceReq> {
            locked(&self.updates).clone()
        }

        pub fn set_software(&self, sn: &str, infos: Vec<SoftwareInfo>) {
            locked(&self.software).insert(sn.to_string(), infos);
        }
    }

    #[async_trait]
    impl NodeInner for FakeNodes {
        async fn check_resource(&self, _req: &CheckResourceReq) -> inner::Result<()> {
            match locked(&self.rejection).clone() {
                Some(reason) => Err(inner::Error::Rejected { reason }),
                None => Ok(()),
            }
        }

        async fn update_resource(&self, req: &UpdateResourceReq) -> inner::Result<()> {
            if let Some(message) = locked(&self.update_failure).clone() {
                return Err(inner::Error::Internal { message });
            }
            locked(&self.updates).push(req.clone());
            Ok(())
        }

        async fn node_groups(&self, ids: &[u64]) -> inner::Result<Vec<NodeGroupBrief>> {
            let groups = locked(&self.groups);
            ids.iter()
                .map(|id| {
                    groups
                        .get(id)
                        .map(|name| NodeGroupBrief {
                            node_group_id: *id,
                            node_group_name: name.clone(),
                        })
                        .ok_or_else(|| inner::Error::NotFound {
                            what: format!("node group {id} not found"),
                        })
                })
                .collect()
        }

        async fn node_by_unique_name(&self, unique_name: &str) -> inner::Result<NodeRef> {
            locked(&self.nodes)
                .get(unique_name)
                .map(|(node, _)| node.clone())
                .ok_or_else(|| inner::Error::NotFound {
                    what: format!("node {unique_name} not found"),
                })
        }

        async fn node_status(&self, unique_name: &str) -> NodeStatus {
            locked(&self.nodes)
                .get(unique_name)
                .map(|(_, status)| *status)
                .unwrap_or(NodeStatus::Offline)
        }

        async fn node_software_info(&self, sn: &str) -> inner::Result<Vec<SoftwareInfo>> {
            locked(&self.software)
                .get(sn)
                .cloned()
                .ok_or_else(|| inner::Error::NotFound {
                    what: format!("node {sn} not found"),
                })
        }
    }

    pub struct Harness {
        pub service: Arc<AppService>,
        pub substrate: Arc<MemorySubstrate>,
        pub nodes: Arc<FakeNodes>,
        pub db: Db,
    }

    impl Harness {
        /// Node group row plus its fake node-manager entry.
        pub async fn group(&self, name: &str) -> u64 {
            let id = groups::insert_group(&self.db, name, "").await.expect("group") as u64;
            self.nodes.add_group(id, name);
            id
        }
    }

    pub async fn harness() -> Harness {
        harness_with(Config::default()).await
    }

    pub async fn harness_with(config: Config) -> Harness {
        let db = memory_db().await.expect("memory db");
        let substrate = Arc::new(MemorySubstrate::new());
        let nodes = Arc::new(FakeNodes::default());
        let service = Arc::new(AppService::new(
            db.clone(),
            Arc::new(config),
            substrate.clone(),
            nodes.clone(),
        ));
        Harness {
            service,
            substrate,
            nodes,
            db,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::harness;
    use super::*;
    use crate::persistence::apps;

    // Test 1: error kinds map onto their statuses
    #[test]
    fn test_error_status() {
        let dup = Error::Duplicate {
            name: "face-check".into(),
        };
        assert_eq!(dup.status(Status::ErrorCreateApp), Status::ErrorAppMrgDuplicate);
        assert_eq!(Error::AppLimit.status(Status::ErrorCreateApp), Status::ErrorCheckAppMrgSize);

        let missing = Error::Persistence {
            source: persistence::not_found("app", 9),
        };
        assert_eq!(missing.status(Status::ErrorQueryApp), Status::ErrorAppMrgRecodeNoFound);

        let refused = refused("app already exists");
        assert_eq!(refused.status(Status::ErrorDeployApp), Status::ErrorDeployApp);
    }

    // Test 2: deployed counts cover every requested group
    #[tokio::test]
    async fn test_deployed_app_counts() {
        let h = harness().await;
        let g1 = h.group("groupA").await;
        let g2 = h.group("groupB").await;
        let app = apps::insert_app(&h.db, "face-check", "", "[]").await.expect("app");
        daemon_sets::insert_daemon_set(&h.db, "face-check-1", app, g1 as i64, "groupA")
            .await
            .expect("ds");

        let counts = DeployedApps::new(h.db.clone())
            .app_counts_by_groups(&[g1, g2])
            .await
            .expect("counts");
        assert_eq!(counts, BTreeMap::from([(g1, 1), (g2, 0)]));
    }
}
