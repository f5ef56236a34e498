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

use super::{Error, Result, Substrate, WatchStream};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

/// Maps the API status of a failed call onto the typed variants.
fn classify(kind: &'static str, name: &str) -> impl FnOnce(kube::Error) -> Error {
    let name = name.to_string();
    move |source| match &source {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound { kind, name },
        kube::Error::Api(ae) if ae.code == 409 => Error::AlreadyExists { kind, name },
        _ => Error::Kube { source },
    }
}

/// [`Substrate`] over a live cluster. Namespaced objects live in `namespace`.
#[derive(Clone)]
pub struct KubeSubstrate {
    client: kube::Client,
    namespace: String,
    pod_selector: String,
}

impl KubeSubstrate {
    pub fn new(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            pod_selector: crate::APP_MANAGER_NAME.to_string(),
        }
    }

    fn namespaced<T>(&self) -> Api<T>
    where
        T: Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn get<T>(&self, kind: &'static str, name: &str) -> Result<T>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        self.namespaced::<T>()
            .get(name)
            .await
            .map_err(classify(kind, name))
    }

    async fn create<T>(&self, kind: &'static str, resource: &T) -> Result<T>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        self.namespaced::<T>()
            .create(&PostParams::default(), resource)
            .await
            .map_err(classify(kind, &resource.name_any()))
    }

    async fn replace<T>(&self, kind: &'static str, resource: &T) -> Result<T>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let name = resource.name_any();
        self.namespaced::<T>()
            .replace(&name, &PostParams::default(), resource)
            .await
            .map_err(classify(kind, &name))
    }

    async fn delete<T>(&self, kind: &'static str, name: &str, params: &DeleteParams) -> Result<()>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        self.namespaced::<T>()
            .delete(name, params)
            .await
            .map_err(classify(kind, name))?;
        Ok(())
    }

    async fn patch_node_labels(&self, name: &str, labels: serde_json::Value) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "metadata": { "labels": labels } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(classify("nodes", name))?;
        Ok(())
    }
}

#[async_trait]
impl Substrate for KubeSubstrate {
    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        self.create("daemonsets", daemon_set).await
    }

    async fn update_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        // replace needs the live resourceVersion
        let current: DaemonSet = self.get("daemonsets", &daemon_set.name_any()).await?;
        let mut desired = daemon_set.clone();
        desired.metadata.resource_version = current.metadata.resource_version;
        self.replace("daemonsets", &desired).await
    }

    async fn get_daemon_set(&self, name: &str) -> Result<DaemonSet> {
        self.get("daemonsets", name).await
    }

    async fn delete_daemon_set(&self, name: &str) -> Result<()> {
        self.delete::<DaemonSet>("daemonsets", name, &DeleteParams::default())
            .await
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.get(name).await.map_err(classify("nodes", name))
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(classify("nodes", name))?;
        Ok(())
    }

    async fn add_node_labels(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<()> {
        self.patch_node_labels(name, serde_json::to_value(labels)?)
            .await
    }

    async fn delete_node_labels(&self, name: &str, keys: &[String]) -> Result<()> {
        // merge patch removes keys set to null
        let labels: serde_json::Map<String, serde_json::Value> = keys
            .iter()
            .map(|k| (k.clone(), serde_json::Value::Null))
            .collect();
        self.patch_node_labels(name, serde_json::Value::Object(labels))
            .await
    }

    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: metav1::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        match api
            .create(&PostParams::default(), &namespace)
            .await
            .map_err(classify("namespaces", name))
        {
            Ok(_) => {
                info!("namespace {} created", name);
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("namespace {} already exists", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_secret(&self, name: &str) -> Result<Secret> {
        self.get("secrets", name).await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret> {
        self.create("secrets", secret).await
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret> {
        self.replace("secrets", secret).await
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let pods = self
            .namespaced::<Pod>()
            .list(&ListParams::default().labels(&self.pod_selector))
            .await
            .map_err(classify("pods", ""))?;
        Ok(pods.items)
    }

    async fn delete_pod_by_force(&self, name: &str) -> Result<()> {
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        };
        self.delete::<Pod>("pods", name, &params).await
    }

    fn watch_nodes(&self) -> WatchStream<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed()
    }

    fn watch_pods(&self) -> WatchStream<Pod> {
        watcher(
            self.namespaced::<Pod>(),
            watcher::Config::default().labels(&self.pod_selector),
        )
        .default_backoff()
        .boxed()
    }
}
