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

use crate::appmanager::{self, AppService, DeployedApps};
use crate::bus::MessageBus;
use crate::config::Config;
use crate::edgemsg::{CertCache, CertProvider, EdgeMsgService, ProgressCache};
use crate::inner::{AppInner, NodeInner};
use crate::nodemanager::{self, NodeService};
use crate::persistence::Db;
use crate::router::Router;
use crate::substrate::Substrate;
use crate::substrate::informer::wait_for_sync;
use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("start node manager failed: {}", source))]
    NodeManager { source: nodemanager::Error },

    #[snafu(display("start app manager failed: {}", source))]
    AppManager { source: appmanager::Error },
}

/// Every service of the process and the collaborators they share.
///
/// Built once at startup and passed explicitly; nothing here is global.
pub struct Context {
    pub config: Arc<Config>,
    pub db: Db,
    pub substrate: Arc<dyn Substrate>,
    pub bus: Arc<dyn MessageBus>,
    pub progress: Arc<ProgressCache>,
    pub nodes: Arc<NodeService>,
    pub apps: Arc<AppService>,
    pub edge: Arc<EdgeMsgService>,
    pub router: Arc<Router>,
}

impl Context {
    pub fn new(
        config: Config,
        db: Db,
        substrate: Arc<dyn Substrate>,
        bus: Arc<dyn MessageBus>,
        certs: Arc<dyn CertProvider>,
    ) -> Self {
        let config = Arc::new(config);
        let progress = Arc::new(ProgressCache::new());

        // the node manager only needs deployed-app counts, which are read
        // straight from storage; this keeps the two services acyclic
        let deployed: Arc<dyn AppInner> = Arc::new(DeployedApps::new(db.clone()));
        let nodes = Arc::new(NodeService::new(
            db.clone(),
            config.clone(),
            substrate.clone(),
            bus.clone(),
            deployed.clone(),
            progress.clone(),
        ));
        let node_inner: Arc<dyn NodeInner> = nodes.clone();
        let apps = Arc::new(AppService::new(
            db.clone(),
            config.clone(),
            substrate.clone(),
            node_inner.clone(),
        ));
        let edge = Arc::new(EdgeMsgService::new(
            config.clone(),
            bus.clone(),
            node_inner,
            progress.clone(),
            CertCache::new(certs),
        ));
        let router = Arc::new(Router::new(
            apps.clone(),
            nodes.clone(),
            edge.clone(),
            deployed,
        ));

        Self {
            config,
            db,
            substrate,
            bus,
            progress,
            nodes,
            apps,
            edge,
            router,
        }
    }

    /// Starts the informers: nodes first, so pods never reference a node
    /// the node manager has not seen, then the app manager.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>, Error> {
        let (node_task, synced) = nodemanager::informer::start(self.nodes.clone(), shutdown.clone())
            .await
            .context(NodeManagerSnafu)?;
        if !wait_for_sync(synced).await {
            warn!("node informer stopped before its first listing");
        }

        let mut tasks = appmanager::informer::start(self.apps.clone(), shutdown)
            .await
            .context(AppManagerSnafu)?;
        tasks.push(node_task);
        info!("edge manager services started");
        Ok(tasks)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! The whole process wired over in-memory fakes.

    use super::*;
    use crate::bus::{LocalBus, Message};
    use crate::edgemsg::FileCertProvider;
    use crate::persistence::memory_db;
    use crate::substrate::MemorySubstrate;
    use crate::tests::CA_PEM;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    pub struct Wiring {
        pub context: Context,
        pub router: Arc<Router>,
        pub progress: Arc<ProgressCache>,
        pub bus: LocalBus,
        pub substrate: Arc<MemorySubstrate>,
        pub inbound: mpsc::Receiver<Message>,
        _certs: TempDir,
    }

    /// Registry `registry.local:5000` and a `root` certificate are configured.
    pub async fn wiring() -> Wiring {
        let certs = tempfile::tempdir().expect("tempdir");
        std::fs::write(certs.path().join("root.crt"), CA_PEM).expect("write cert");
        let config = Config {
            image_registry: "registry.local:5000".to_string(),
            ..Config::default()
        };

        let db = memory_db().await.expect("database");
        let substrate = Arc::new(MemorySubstrate::new());
        let (bus, inbound) = LocalBus::new(16);
        let context = Context::new(
            config,
            db,
            substrate.clone(),
            Arc::new(bus.clone()),
            Arc::new(FileCertProvider::new(certs.path())),
        );
        Wiring {
            router: context.router.clone(),
            progress: context.progress.clone(),
            context,
            bus,
            substrate,
            inbound,
            _certs: certs,
        }
    }
}
