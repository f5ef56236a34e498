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

use crate::types::edge::ProgressInfo;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Latest reported progress of each edge's active software job.
///
/// Entries never expire on their own. A new job overwrites its entry and a
/// deleted node drops it. Writes are last-writer-wins and readers always see
/// a whole record.
#[derive(Default)]
pub struct ProgressCache {
    entries: RwLock<HashMap<String, ProgressInfo>>,
}

impl ProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ProgressInfo>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ProgressInfo>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, sn: &str, progress: ProgressInfo) {
        self.write().insert(sn.to_string(), progress);
    }

    /// Starts a new job for `sn` at zero progress.
    pub fn reset(&self, sn: &str) {
        self.set(sn, ProgressInfo::default());
    }

    pub fn get(&self, sn: &str) -> Option<ProgressInfo> {
        self.read().get(sn).cloned()
    }

    pub fn clear(&self, sn: &str) -> Option<ProgressInfo> {
        self.write().remove(sn)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: get returns the last set value until cleared
    #[test]
    fn test_last_writer_wins() {
        let cache = ProgressCache::new();
        cache.reset("SN1");
        assert_eq!(cache.get("SN1"), Some(ProgressInfo::default()));

        let half = ProgressInfo {
            progress: 50,
            res: "downloading".to_string(),
            msg: String::new(),
        };
        cache.set("SN1", half.clone());
        assert_eq!(cache.get("SN1"), Some(half.clone()));

        cache.reset("SN1");
        assert_eq!(cache.get("SN1").map(|p| p.progress), Some(0), "a new job restarts at zero");

        assert!(cache.clear("SN1").is_some());
        assert_eq!(cache.get("SN1"), None);
        assert!(cache.is_empty());
    }
}
