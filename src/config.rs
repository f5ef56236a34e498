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

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MAX_LIMIT_NUMBER: i64 = 20;
const MIN_LIMIT_NUMBER: i64 = 1;
const MAX_LIMIT_NUMBER: i64 = 128;
const MIN_PORT: u16 = 1025;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("read config file {} failed: {}", path.display(), source))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("parse config file {} failed: {}", path.display(), source))]
    Parse {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[snafu(display("encode config failed: {}", source))]
    Encode { source: serde_yaml_ng::Error },

    #[snafu(display("invalid config '{}': {}", key, message))]
    Invalid { key: String, message: String },
}

/// Startup configuration. Loaded once and carried by the context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    /// Per node-group cap on deployed applications.
    pub max_ds_number_per_node_group: i64,
    /// Per node cap on pods across all of its groups.
    pub max_pod_number_per_node: i64,
    /// Whitelist of container host mount sources.
    pub host_path: Vec<String>,
    /// Auth token lifetime, minutes.
    pub token_expire_time: i64,
    /// Ceiling of a synchronous bus call, seconds.
    pub response_timeout: u64,
    /// Resource name of the NPU device.
    pub device_type: String,

    pub db_path: String,
    pub port: u16,
    pub user_namespace: String,
    pub image_pull_secret: String,
    /// Image registry address handed to edges.
    pub image_registry: String,
    /// Directory holding `<name>.crt` root certificates served to edges.
    pub cert_dir: String,
    /// Seconds between terminating-pod sweeps.
    pub house_keeping_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_ds_number_per_node_group: DEFAULT_MAX_LIMIT_NUMBER,
            max_pod_number_per_node: DEFAULT_MAX_LIMIT_NUMBER,
            host_path: vec![
                "/usr/local/Ascend/driver/lib64".to_string(),
                "/usr/local/sbin/npu-smi".to_string(),
                "/var/log/mindx-edge".to_string(),
            ],
            token_expire_time: 30,
            response_timeout: 30,
            device_type: "huawei.com/Ascend310".to_string(),
            db_path: "/var/lib/edge-manager/edge-manager.db".to_string(),
            port: 8101,
            user_namespace: "mef-user".to_string(),
            image_pull_secret: "image-pull-secret".to_string(),
            image_registry: String::new(),
            cert_dir: "/etc/edge-manager/certs".to_string(),
            house_keeping_interval: 60,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        let config: Config = serde_yaml_ng::from_str(&raw).context(ParseSnafu { path })?;
        config.validate()
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml_ng::to_string(self).context(EncodeSnafu)
    }

    /// Normalises soft limits and rejects values that cannot work.
    pub fn validate(mut self) -> Result<Self, Error> {
        self.max_ds_number_per_node_group =
            clamp_limit("maxDsNumberPerNodeGroup", self.max_ds_number_per_node_group);
        self.max_pod_number_per_node =
            clamp_limit("maxPodNumberPerNode", self.max_pod_number_per_node);

        self.host_path.retain(|p| {
            let ok = p.starts_with('/') && !p.contains("..");
            if !ok {
                warn!("host path {} is not an absolute clean path, ignored", p);
            }
            ok
        });

        if !(1..=60).contains(&self.token_expire_time) {
            return InvalidSnafu {
                key: "tokenExpireTime",
                message: format!("{} is not in [1, 60]", self.token_expire_time),
            }
            .fail();
        }

        if self.response_timeout == 0 {
            return InvalidSnafu {
                key: "responseTimeout",
                message: "must be positive",
            }
            .fail();
        }

        if self.port < MIN_PORT {
            return InvalidSnafu {
                key: "port",
                message: format!("{} is not in [{}, 65535]", self.port, MIN_PORT),
            }
            .fail();
        }

        if self.user_namespace.is_empty() {
            return InvalidSnafu {
                key: "userNamespace",
                message: "must not be empty",
            }
            .fail();
        }

        Ok(self)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout)
    }

    pub fn house_keeping_interval(&self) -> Duration {
        Duration::from_secs(self.house_keeping_interval.max(1))
    }

    pub fn is_host_path_allowed(&self, path: &str) -> bool {
        self.host_path.iter().any(|p| p == path)
    }
}

fn clamp_limit(key: &str, value: i64) -> i64 {
    if (MIN_LIMIT_NUMBER..=MAX_LIMIT_NUMBER).contains(&value) {
        value
    } else {
        warn!(
            "{} {} is not in [{}, {}], use default {}",
            key, value, MIN_LIMIT_NUMBER, MAX_LIMIT_NUMBER, DEFAULT_MAX_LIMIT_NUMBER
        );
        DEFAULT_MAX_LIMIT_NUMBER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Test 1: defaults survive validation
    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default().validate().expect("default config is valid");
        assert_eq!(config.max_ds_number_per_node_group, DEFAULT_MAX_LIMIT_NUMBER);
        assert_eq!(config.user_namespace, "mef-user");
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
    }

    // Test 2: out of range caps fall back to the default
    #[test]
    fn test_limits_are_clamped() {
        let config = Config {
            max_ds_number_per_node_group: 0,
            max_pod_number_per_node: 500,
            ..Default::default()
        }
        .validate()
        .expect("caps are normalised, not rejected");
        assert_eq!(config.max_ds_number_per_node_group, DEFAULT_MAX_LIMIT_NUMBER);
        assert_eq!(config.max_pod_number_per_node, DEFAULT_MAX_LIMIT_NUMBER);
    }

    // Test 3: token lifetime outside 1..=60 is rejected
    #[test]
    fn test_token_expire_time_bounds() {
        let config = Config {
            token_expire_time: 61,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    // Test 4: YAML with camelCase keys loads, relative host paths are dropped
    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "maxDsNumberPerNodeGroup: 5\n\
             hostPath:\n  - /usr/local/sbin/npu-smi\n  - relative/path\n\
             deviceType: huawei.com/Ascend910"
        )
        .expect("write config");

        let config = Config::load(file.path()).expect("load config");
        assert_eq!(config.max_ds_number_per_node_group, 5);
        assert_eq!(config.host_path, vec!["/usr/local/sbin/npu-smi".to_string()]);
        assert_eq!(config.device_type, "huawei.com/Ascend910");
        assert!(config.is_host_path_allowed("/usr/local/sbin/npu-smi"));
    }

    // Test 5: unknown keys are refused
    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "notAKey: 1").expect("write config");
        assert!(matches!(Config::load(file.path()), Err(Error::Parse { .. })));
    }
}
