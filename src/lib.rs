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

use crate::bus::LocalBus;
use crate::config::Config;
use crate::context::Context;
use crate::edgemsg::FileCertProvider;
use crate::ingress::IngressState;
use crate::substrate::{KubeSubstrate, Substrate};
use kube::Client;
use shadow_rs::shadow;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod appmanager;
pub mod bus;
pub mod config;
pub mod context;
pub mod edgemsg;
pub mod ingress;
pub mod inner;
pub mod nodemanager;
pub mod persistence;
pub mod router;
pub mod substrate;
pub mod types;
pub mod validation;


shadow!(build);

/// Label key selecting the pods of managed apps; also the module name.
pub const APP_MANAGER_NAME: &str = bus::APP_MANAGER_NAME;
/// Node label carrying the edge serial number.
pub const SERIAL_NUMBER_LABEL: &str = "serialNumber";
/// Prefix of the node label marking group membership, followed by the group id.
pub const NODE_GROUP_LABEL_PREFIX: &str = "MEF-Node";

/// Environment variable holding the HMAC secret of admin tokens.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

const EDGE_QUEUE_CAPACITY: usize = 1024;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();
}

pub fn version() -> String {
    format!(
        "{} {} ({} {}, built {} with {})",
        env!("CARGO_PKG_NAME"),
        build::PKG_VERSION,
        build::BRANCH,
        build::SHORT_COMMIT,
        build::BUILD_TIME,
        build::RUST_VERSION
    )
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let jwt_secret =
        std::env::var(JWT_SECRET_ENV).map_err(|_| format!("{JWT_SECRET_ENV} is not set"))?;

    let db = persistence::init_db(&config.db_path).await?;
    let client = Client::try_default().await?;
    let substrate: Arc<dyn Substrate> =
        Arc::new(KubeSubstrate::new(client, config.user_namespace.clone()));
    let (bus, inbound) = LocalBus::new(EDGE_QUEUE_CAPACITY);
    let certs = Arc::new(FileCertProvider::new(&config.cert_dir));
    let port = config.port;
    let token_expire_time = config.token_expire_time;
    let context = Context::new(config, db, substrate, Arc::new(bus), certs);

    let shutdown = CancellationToken::new();
    let (ready_tx, ready_rx) = watch::channel(false);
    let state = IngressState::new(context.router.clone(), jwt_secret, token_expire_time, ready_rx);
    let ingress = tokio::spawn(ingress::serve(state, port, shutdown.clone()));

    let mut tasks = match context.start(shutdown.clone()).await {
        Ok(tasks) => tasks,
        Err(e) => {
            shutdown.cancel();
            return Err(e.into());
        }
    };
    tasks.push(tokio::spawn(router::serve_edges(
        context.router.clone(),
        context.bus.clone(),
        inbound,
        shutdown.clone(),
    )));
    ready_tx.send_replace(true);
    info!("{} ready", version());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            warn!("background task ended abnormally: {}", e);
        }
    }
    match ingress.await {
        Ok(Err(e)) => warn!("ingress stopped with error: {}", e),
        Err(e) => warn!("ingress task ended abnormally: {}", e),
        Ok(Ok(())) => {}
    }
    context.db.close().await;
    Ok(())
}
