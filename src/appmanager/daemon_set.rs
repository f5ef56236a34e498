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

//! Daemon workload template of one application on one node group.

use crate::config::Config;
use crate::persistence::AppInfoRecord;
use crate::substrate::group_label;
use crate::types::app::Container;
use crate::types::resources::{cpu_quantity, mib_quantity};
use k8s_openapi::api::apps::v1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::{BTreeMap, BTreeSet};

pub const APP_LABEL_VALUE: &str = "app";
pub const APP_NAME_LABEL: &str = "AppName";
pub const APP_ID_LABEL: &str = "AppId";
const MAX_UNAVAILABLE: &str = "100%";
const DOCKER_CONFIG_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";
const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";

pub fn daemon_set_name(app_name: &str, group_id: u64) -> String {
    format!("{app_name}-{group_id}")
}

/// Labels stamped on every pod of the app; also the workload selector.
pub fn app_labels(app_name: &str, app_id: i64) -> BTreeMap<String, String> {
    BTreeMap::from([
        (crate::APP_MANAGER_NAME.to_string(), APP_LABEL_VALUE.to_string()),
        (APP_NAME_LABEL.to_string(), app_name.to_string()),
        (APP_ID_LABEL.to_string(), app_id.to_string()),
    ])
}

/// Requests from the container spec; limits start from the requests and
/// are overridden by explicit cpu/memory limits.
pub fn resource_requirements(
    container: &Container,
    device_type: &str,
) -> corev1::ResourceRequirements {
    let mut requests = BTreeMap::from([
        ("cpu".to_string(), cpu_quantity(container.cpu_request)),
        ("memory".to_string(), mib_quantity(container.mem_request)),
    ]);
    if let Some(npu) = container.npu {
        requests.insert(device_type.to_string(), Quantity(npu.to_string()));
    }

    let mut limits = requests.clone();
    if let Some(cpu) = container.cpu_limit {
        limits.insert("cpu".to_string(), cpu_quantity(cpu));
    }
    if let Some(mem) = container.mem_limit {
        limits.insert("memory".to_string(), mib_quantity(mem));
    }

    corev1::ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

fn pod_container(container: &Container, device_type: &str) -> corev1::Container {
    let env = container
        .env
        .iter()
        .map(|e| corev1::EnvVar {
            name: e.name.clone(),
            value: Some(e.value.clone()),
            ..Default::default()
        })
        .collect();

    let ports = container
        .ports
        .iter()
        .map(|p| corev1::ContainerPort {
            name: Some(p.name.clone()),
            container_port: p.container_port,
            host_port: Some(p.host_port),
            host_ip: Some(p.host_ip.clone()),
            protocol: Some(p.proto.clone()),
        })
        .collect();

    let mounts = container
        .host_path_volumes
        .iter()
        .map(|v| corev1::VolumeMount {
            name: v.name.clone(),
            mount_path: v.mount_path.clone(),
            read_only: Some(true),
            ..Default::default()
        })
        .collect();

    corev1::Container {
        name: container.name.clone(),
        image: Some(container.image_ref()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: non_empty(container.command.clone()),
        args: non_empty(container.args.clone()),
        env: non_empty(env),
        ports: non_empty(ports),
        resources: Some(resource_requirements(container, device_type)),
        volume_mounts: non_empty(mounts),
        security_context: Some(corev1::SecurityContext {
            run_as_user: container.user_id,
            run_as_group: container.group_id,
            run_as_non_root: Some(true),
            read_only_root_filesystem: Some(true),
            allow_privilege_escalation: Some(false),
            capabilities: Some(corev1::Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Host-path volumes of all containers; a name shared by containers is one volume.
fn host_path_volumes(containers: &[Container]) -> Vec<corev1::Volume> {
    let mut seen = BTreeSet::new();
    containers
        .iter()
        .flat_map(|c| c.host_path_volumes.iter())
        .filter(|v| seen.insert(v.name.clone()))
        .map(|v| corev1::Volume {
            name: v.name.clone(),
            host_path: Some(corev1::HostPathVolumeSource {
                path: v.host_path.clone(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
}

pub fn build(
    app: &AppInfoRecord,
    containers: &[Container],
    group_id: u64,
    config: &Config,
) -> v1::DaemonSet {
    let labels = app_labels(&app.app_name, app.id);

    v1::DaemonSet {
        metadata: metav1::ObjectMeta {
            name: Some(daemon_set_name(&app.app_name, group_id)),
            namespace: Some(config.user_namespace.clone()),
            labels: Some(BTreeMap::from([(
                crate::APP_MANAGER_NAME.to_string(),
                APP_LABEL_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(v1::DaemonSetSpec {
            selector: metav1::LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            update_strategy: Some(v1::DaemonSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(v1::RollingUpdateDaemonSet {
                    max_unavailable: Some(IntOrString::String(MAX_UNAVAILABLE.to_string())),
                    ..Default::default()
                }),
            }),
            template: corev1::PodTemplateSpec {
                metadata: Some(metav1::ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(corev1::PodSpec {
                    automount_service_account_token: Some(false),
                    containers: containers
                        .iter()
                        .map(|c| pod_container(c, &config.device_type))
                        .collect(),
                    image_pull_secrets: Some(vec![corev1::LocalObjectReference {
                        name: config.image_pull_secret.clone(),
                    }]),
                    node_selector: Some(BTreeMap::from([(group_label(group_id), String::new())])),
                    volumes: non_empty(host_path_volumes(containers)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Image-pull secret with an empty registry auth set, or the configured registry.
pub fn image_pull_secret(config: &Config) -> corev1::Secret {
    let mut auths = serde_json::Map::new();
    if !config.image_registry.is_empty() {
        auths.insert(config.image_registry.clone(), serde_json::json!({}));
    }
    let payload = serde_json::json!({ "auths": auths }).to_string();

    corev1::Secret {
        metadata: metav1::ObjectMeta {
            name: Some(config.image_pull_secret.clone()),
            namespace: Some(config.user_namespace.clone()),
            ..Default::default()
        },
        type_: Some(DOCKER_CONFIG_SECRET_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_KEY.to_string(),
            k8s_openapi::ByteString(payload.into_bytes()),
        )])),
        ..Default::default()
    }
}

/// Whether a stored pull secret carries no usable payload.
pub fn is_empty_secret(secret: &corev1::Secret) -> bool {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(DOCKER_CONFIG_KEY))
        .is_none_or(|v| v.0.is_empty())
}
