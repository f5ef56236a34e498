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

//! HTTP front of the administrative resources.

use crate::router::{RESOURCE_PREFIX, Router as ResourceRouter};
use axum::routing::get;
use axum::{Router, middleware};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error;
pub mod handlers;

pub use auth::Claims;

const RESOURCE_ROUTE: &str = const_str::concat!(RESOURCE_PREFIX, "{*resource}");

#[derive(Clone)]
pub struct IngressState {
    pub router: Arc<ResourceRouter>,
    /// HMAC secret of the bearer tokens.
    pub jwt_secret: Arc<String>,
    /// Longest accepted token lifetime, minutes.
    pub token_expire_time: i64,
    /// Flips to true once the services have started.
    pub ready: watch::Receiver<bool>,
}

impl IngressState {
    pub fn new(
        router: Arc<ResourceRouter>,
        jwt_secret: String,
        token_expire_time: i64,
        ready: watch::Receiver<bool>,
    ) -> Self {
        Self {
            router,
            jwt_secret: Arc::new(jwt_secret),
            token_expire_time,
            ready,
        }
    }
}

pub fn app(state: IngressState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/readyz", get(handlers::ready_check))
        .route(
            RESOURCE_ROUTE,
            get(handlers::query).post(handlers::mutate),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, auth::auth_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Serves until `shutdown` fires.
pub async fn serve(
    state: IngressState,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("ingress listening on http://{}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
