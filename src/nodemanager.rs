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

//! Node and node-group lifecycle.

use crate::bus::{self, Message, MessageBus, Operation, RES_DELETE_NODE};
use crate::config::Config;
use crate::edgemsg::ProgressCache;
use crate::inner::{self, AppInner};
use crate::persistence::{self, Db, NodeGroupRecord, NodeRecord, relations};
use crate::substrate::{self, Substrate};
use crate::types::node::{NodeInfoView, NodeStatus};
use crate::types::resources::Resources;
use crate::types::{IntoStatus, Status};
use crate::validation::{CheckResult, Checker};
use snafu::{Snafu, ensure};
use std::sync::Arc;
use tracing::warn;

pub mod groups;
pub mod informer;
pub mod internal;
pub mod membership;
pub mod nodes;
pub mod status;

pub use informer::NodeEventHandler;
pub use status::NodeStatusCache;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{}", reason))]
    Param { reason: String },

    #[snafu(display("{}", message))]
    Refused { message: String },

    #[snafu(display("{} count exceeds the limitation {}", what, max))]
    Limit { what: &'static str, max: usize },

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
    Bus { source: bus::Error },

    #[snafu(transparent)]
    Inner { source: inner::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoStatus for Error {
    fn status(&self, failure: Status) -> Status {
        match self {
            Error::Param { .. } => Status::ErrorParamInvalid,
            Error::Limit { .. } => Status::ErrorCheckNodeMrgSize,
            Error::Persistence { source } if source.is_duplicate() => Status::ErrorNodeMrgDuplicate,
            _ => failure,
        }
    }
}

impl From<Error> for inner::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Refused { message } => inner::Error::Rejected { reason: message },
            Error::Param { reason } => inner::Error::Rejected { reason },
            Error::Persistence { source } if source.is_not_found() => inner::Error::NotFound {
                what: source.to_string(),
            },
            other => inner::Error::Internal {
                message: other.to_string(),
            },
        }
    }
}

pub(crate) fn check<T: ?Sized>(checker: &impl Checker<T>, value: &T) -> Result<()> {
    let CheckResult { result, reason } = checker.check(value);
    ensure!(result, ParamSnafu { reason });
    Ok(())
}

/// Cumulative request of the apps deployed on a group.
pub(crate) fn group_request(group: &NodeGroupRecord) -> Result<Resources> {
    if group.resources_request.is_empty() {
        return Ok(Resources::default());
    }
    serde_json::from_str(&group.resources_request).map_err(|source| Error::Decode {
        what: format!("resources request of group {}", group.id),
        source,
    })
}

pub struct NodeService {
    db: Db,
    config: Arc<Config>,
    substrate: Arc<dyn Substrate>,
    bus: Arc<dyn MessageBus>,
    apps: Arc<dyn AppInner>,
    progress: Arc<ProgressCache>,
    status: Arc<NodeStatusCache>,
}

impl NodeService {
    pub fn new(
        db: Db,
        config: Arc<Config>,
        substrate: Arc<dyn Substrate>,
        bus: Arc<dyn MessageBus>,
        apps: Arc<dyn AppInner>,
        progress: Arc<ProgressCache>,
    ) -> Self {
        Self {
            db,
            config,
            substrate,
            bus,
            apps,
            progress,
            status: Arc::new(NodeStatusCache::new()),
        }
    }

    pub fn status_cache(&self) -> Arc<NodeStatusCache> {
        self.status.clone()
    }

    /// Status shown to operators.
    ///
    /// A node the substrate does not know is offline, a node without serial
    /// label is abnormal and a node whose edge has no hub session is offline.
    pub async fn node_status(&self, unique_name: &str) -> NodeStatus {
        let Some(node) = self.status.get(unique_name) else {
            return NodeStatus::Offline;
        };
        let Some(sn) = status::serial_number(&node) else {
            return NodeStatus::Abnormal;
        };
        if !self.bus.is_connected(sn).await {
            return NodeStatus::Offline;
        }
        status::eval_status(&node)
    }

    /// Group names of a node, comma separated.
    async fn group_names(&self, node_id: i64) -> Result<String> {
        let groups = relations::groups_of_node(&self.db, node_id).await?;
        Ok(groups
            .iter()
            .map(|g| g.group_name.as_str())
            .collect::<Vec<_>>()
            .join(","))
    }

    pub(crate) async fn view(&self, node: NodeRecord) -> Result<NodeInfoView> {
        let node_group = self.group_names(node.id).await?;
        let status = self.node_status(&node.unique_name).await;
        Ok(NodeInfoView {
            id: node.id as u64,
            node_name: node.node_name,
            unique_name: node.unique_name,
            serial_number: node.serial_number,
            ip: node.ip,
            description: node.description,
            is_managed: node.is_managed,
            status,
            node_group,
            created_at: node.created_at,
            updated_at: node.updated_at,
        })
    }

    /// Tells the edge it was removed. Best effort: the edge may be gone.
    async fn notify_node_deleted(&self, sn: &str) {
        let msg = match Message::to_edge(sn, Operation::Delete, RES_DELETE_NODE)
            .with_content(&format!("delete:{sn}"))
        {
            Ok(msg) => msg,
            Err(e) => {
                warn!("build delete message for node {} failed: {}", sn, e);
                return;
            }
        };
        if let Err(e) = self.bus.send(msg).await {
            warn!("send delete message to node {} failed: {}", sn, e);
        }
        self.progress.clear(sn);
    }

    /// Deletes the substrate node; an absent node is only worth a warning.
    async fn delete_substrate_node(&self, unique_name: &str) -> Result<()> {
        match self.substrate.delete_node(unique_name).await {
            Err(e) if e.is_not_found() => {
                warn!("substrate has no node {}, skip deleting it", unique_name);
                Ok(())
            }
            other => Ok(other?),
        }
    }

    /// Removes one group label; an absent node is only worth a warning.
    async fn delete_group_label(&self, unique_name: &str, group_id: i64) -> Result<()> {
        let label = substrate::group_label(group_id as u64);
        match self
            .substrate
            .delete_node_labels(unique_name, std::slice::from_ref(&label))
            .await
        {
            Err(e) if e.is_not_found() => {
                warn!("substrate has no node {}, skip removing {}", unique_name, label);
                Ok(())
            }
            other => Ok(other?),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Wiring of a node service over in-memory fakes.

    use super::*;
    use crate::bus::LocalBus;
    use crate::inner::AppInner;
    use crate::persistence::memory_db;
    use crate::substrate::MemorySubstrate;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    /// App counts set by the test.
    #[derive(Default)]
    pub struct FakeApps {
        counts: Mutex<HashMap<u64, i64>>,
    }

    impl FakeApps {
        pub fn set(&self, group_id: u64, count: i64) {
            if let Ok(mut counts) = self.counts.lock() {
                counts.insert(group_id, count);
            }
        }
    }

    #[async_trait]
    impl AppInner for FakeApps {
        async fn app_counts_by_groups(
            &self,
            group_ids: &[u64],
        ) -> inner::Result<BTreeMap<u64, i64>> {
            let counts = self.counts.lock().map_err(|e| inner::Error::Internal {
                message: e.to_string(),
            })?;
            Ok(group_ids
                .iter()
                .map(|id| (*id, counts.get(id).copied().unwrap_or_default()))
                .collect())
        }
    }

    pub struct Harness {
        pub service: Arc<NodeService>,
        pub substrate: Arc<MemorySubstrate>,
        pub bus: LocalBus,
        pub apps: Arc<FakeApps>,
        pub progress: Arc<ProgressCache>,
        pub db: Db,
    }

    pub async fn harness() -> Harness {
        harness_with(Config::default()).await
    }

    pub async fn harness_with(config: Config) -> Harness {
        let db = memory_db().await.expect("memory db");
        let substrate = Arc::new(MemorySubstrate::new());
        let (bus, _inbound) = LocalBus::new(64);
        let apps = Arc::new(FakeApps::default());
        let progress = Arc::new(ProgressCache::new());
        let service = Arc::new(NodeService::new(
            db.clone(),
            Arc::new(config),
            substrate.clone(),
            Arc::new(bus.clone()),
            apps.clone(),
            progress.clone(),
        ));
        Harness {
            service,
            substrate,
            bus,
            apps,
            progress,
            db,
        }
    }
}
