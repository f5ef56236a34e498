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

//! Add/update/delete notifications on top of a raw watch feed.
//!
//! The watcher reports a re-list as `Init`, `InitApply*`, `InitDone`. The
//! informer keeps the last seen version of every object so it can hand
//! handlers the old object on update and synthesise deletes for objects that
//! vanished while the watch was down.

use super::WatchStream;
use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::watcher::Event;
use kube::{Resource, ResourceExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const WATCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq)]
pub enum InformerEvent<K> {
    Add(K),
    Update { old: K, new: K },
    Delete(K),
}

#[async_trait]
pub trait EventHandler<K>: Send + Sync {
    async fn on_add(&self, obj: &K);
    async fn on_update(&self, old: &K, new: &K);
    async fn on_delete(&self, obj: &K);
}

fn key<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}/{}", ns, obj.name_any()),
        None => obj.name_any(),
    }
}

pub struct Informer<K> {
    name: &'static str,
    store: HashMap<String, K>,
    relist: Option<HashMap<String, K>>,
    synced: watch::Sender<bool>,
}

impl<K> Informer<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            name,
            store: HashMap::new(),
            relist: None,
            synced,
        }
    }

    /// Flips to `true` once the first full listing has been delivered.
    pub fn synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }

    pub fn get(&self, key: &str) -> Option<&K> {
        self.store.get(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn upsert(&mut self, obj: K) -> InformerEvent<K> {
        match self.store.insert(key(&obj), obj.clone()) {
            Some(old) => InformerEvent::Update { old, new: obj },
            None => InformerEvent::Add(obj),
        }
    }

    /// Folds one watch event into the store and returns what handlers see.
    pub fn handle(&mut self, event: Event<K>) -> Vec<InformerEvent<K>> {
        match event {
            Event::Init => {
                self.relist = Some(HashMap::new());
                Vec::new()
            }
            Event::InitApply(obj) => {
                if let Some(relist) = self.relist.as_mut() {
                    relist.insert(key(&obj), obj.clone());
                }
                vec![self.upsert(obj)]
            }
            Event::InitDone => {
                let seen = self.relist.take().unwrap_or_default();
                let gone: Vec<String> = self
                    .store
                    .keys()
                    .filter(|k| !seen.contains_key(*k))
                    .cloned()
                    .collect();
                let deleted = gone
                    .iter()
                    .filter_map(|k| self.store.remove(k))
                    .map(InformerEvent::Delete)
                    .collect();
                self.synced.send_replace(true);
                deleted
            }
            Event::Apply(obj) => vec![self.upsert(obj)],
            Event::Delete(obj) => {
                let last = self.store.remove(&key(&obj)).unwrap_or(obj);
                vec![InformerEvent::Delete(last)]
            }
        }
    }

    /// Drives `stream` into `handler` until the stream ends or `shutdown` fires.
    ///
    /// Events of one informer are dispatched serially.
    pub async fn run<H>(
        mut self,
        mut stream: WatchStream<K>,
        handler: Arc<H>,
        shutdown: CancellationToken,
    ) where
        H: EventHandler<K> + ?Sized,
    {
        info!("{} informer started", self.name);
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = stream.next() => event,
            };

            match event {
                Some(Ok(event)) => {
                    for change in self.handle(event) {
                        match change {
                            InformerEvent::Add(obj) => handler.on_add(&obj).await,
                            InformerEvent::Update { old, new } => {
                                handler.on_update(&old, &new).await
                            }
                            InformerEvent::Delete(obj) => handler.on_delete(&obj).await,
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("{} watch error, will retry: {}", self.name, e);
                    tokio::time::sleep(WATCH_ERROR_BACKOFF).await;
                }
                None => {
                    debug!("{} watch stream ended", self.name);
                    break;
                }
            }
        }
        info!("{} informer stopped", self.name);
    }
}

/// Waits until `synced` reports the first full listing.
pub async fn wait_for_sync(mut synced: watch::Receiver<bool>) -> bool {
    synced.wait_for(|done| *done).await.is_ok()
}
