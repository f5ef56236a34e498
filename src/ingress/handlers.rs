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

use super::IngressState;
use super::error::{Error, MethodNotAllowedSnafu, Result};
use crate::router::Resource;
use crate::types::app::{AppIdReq, NodeIdReq};
use crate::types::edge::SerialNumberReq;
use crate::types::node::{IdReq, ListReq, NodeDetailReq};
use crate::types::{RespMsg, Status};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ensure;

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn ready_check(State(state): State<IngressState>) -> impl IntoResponse {
    if *state.ready.borrow() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Starting")
    }
}

/// Administrative resources only; inner calls and edge reports are not
/// reachable over HTTP.
fn admin_resource(path: &str) -> Result<Resource> {
    Resource::from_path(path)
        .filter(|r| !r.is_inner() && !r.is_edge_report())
        .ok_or_else(|| Error::NotFound {
            resource: path.to_string(),
        })
}

fn is_query(resource: Resource) -> bool {
    matches!(
        resource,
        Resource::ListApps
            | Resource::ListAppInstances
            | Resource::ListAppInstancesById
            | Resource::ListAppInstancesByNode
            | Resource::QueryApp
            | Resource::ListNodes
            | Resource::ListUnManagedNodes
            | Resource::ListAllNodes
            | Resource::NodeStatistics
            | Resource::NodeDetail
            | Resource::ListNodeGroups
            | Resource::NodeGroupDetail
            | Resource::NodeGroupStatistics
            | Resource::QueryProgress
            | Resource::QueryVersion
    )
}

fn typed<T: DeserializeOwned + Serialize>(
    uri: &Uri,
) -> std::result::Result<serde_json::Value, RespMsg> {
    let Query(req) = Query::<T>::try_from_uri(uri)
        .map_err(|e| RespMsg::error(Status::ErrorParamConvert, e.body_text()))?;
    serde_json::to_value(req).map_err(|e| RespMsg::error(Status::ErrorParamConvert, e.to_string()))
}

/// Request content of a query, from its typed query string.
fn query_content(resource: Resource, uri: &Uri) -> std::result::Result<serde_json::Value, RespMsg> {
    match resource {
        Resource::ListApps
        | Resource::ListAppInstances
        | Resource::ListNodes
        | Resource::ListUnManagedNodes
        | Resource::ListAllNodes
        | Resource::ListNodeGroups => typed::<ListReq>(uri),
        Resource::QueryApp | Resource::ListAppInstancesById => typed::<AppIdReq>(uri),
        Resource::ListAppInstancesByNode => typed::<NodeIdReq>(uri),
        Resource::NodeDetail => typed::<NodeDetailReq>(uri),
        Resource::NodeGroupDetail => typed::<IdReq>(uri),
        Resource::QueryProgress | Resource::QueryVersion => typed::<SerialNumberReq>(uri),
        _ => Ok(serde_json::Value::Null),
    }
}

pub async fn query(
    State(state): State<IngressState>,
    Path(path): Path<String>,
    uri: Uri,
) -> Result<Json<RespMsg>> {
    let resource = admin_resource(&path)?;
    ensure!(is_query(resource), MethodNotAllowedSnafu { resource: path });

    let resp = match query_content(resource, &uri) {
        Ok(content) => state.router.dispatch(resource, content, None).await,
        Err(resp) => resp,
    };
    Ok(Json(resp))
}

pub async fn mutate(
    State(state): State<IngressState>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Json<RespMsg>> {
    let resource = admin_resource(&path)?;
    ensure!(!is_query(resource), MethodNotAllowedSnafu { resource: path });

    let content = if body.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(content) => content,
            Err(e) => {
                return Ok(Json(RespMsg::error(
                    Status::ErrorParseBody,
                    format!("parse request body failed: {e}"),
                )));
            }
        }
    };
    Ok(Json(state.router.dispatch(resource, content, None).await))
}
