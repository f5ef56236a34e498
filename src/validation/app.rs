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

//! Request checkers of the application scheduler.

use super::{
    AndChecker, CheckResult, Checker, FloatChecker, FnChecker, IntChecker, Ipv4Checker,
    RegexChecker, StringChoiceChecker, UintChecker, UniqueListChecker, each, field, optional,
};
use crate::types::app::{
    AppIdReq, Container, ContainerPort, CreateAppReq, DeleteAppReq, DeployAppReq, EnvVar,
    HostPathVolume, NodeIdReq, UpdateAppReq,
};
use std::collections::HashSet;
use std::hash::Hash;

pub const APP_NAME_PATTERN: &str = r"^[a-z]([a-z0-9-]{0,30}[a-z0-9])?$";
pub const CONTAINER_NAME_PATTERN: &str = APP_NAME_PATTERN;
pub const IMAGE_PATTERN: &str = r"^[a-z0-9]([a-z0-9_./-]{0,30}[a-z0-9])?$";
pub const IMAGE_VERSION_PATTERN: &str = r"^[a-zA-Z0-9_.-]{1,32}$";
pub const DESCRIPTION_PATTERN: &str = r"^[\S ]{0,512}$";
const COMMAND_PATTERN: &str = r"^[a-zA-Z0-9 _./-]{0,31}[a-zA-Z0-9]$";
const ENV_NAME_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9._-]{0,30}[a-zA-Z0-9]$";
const ENV_VALUE_PATTERN: &str = r"^[a-zA-Z0-9 _./-]{0,512}$";
const MOUNT_PATH_PATTERN: &str = r"^/[a-zA-Z0-9_./-]{0,254}$";

pub const MAX_CONTAINERS: usize = 10;
const MAX_ARGS: usize = 16;
const MAX_ENVS: usize = 256;
const MAX_PORTS: usize = 16;
const MAX_VOLUMES: usize = 16;
const MAX_BATCH_IDS: usize = 1000;
const MAX_DEPLOY_GROUPS: usize = 1024;

const MIN_CPU: f64 = 0.01;
const MAX_CPU: f64 = 1000.0;
const MIN_MEMORY: i64 = 4;
const MAX_MEMORY: i64 = 1024000;
const MAX_NPU: i64 = 32;
const MIN_CONTAINER_PORT: i64 = 1;
const MIN_HOST_PORT: i64 = 1024;
const MAX_PORT: i64 = 65535;
const MIN_USER_ID: i64 = 1;
const MAX_USER_ID: i64 = 65535;

const PROTOCOLS: &[&str] = &["TCP", "UDP"];

fn unique<K: Eq + Hash>(what: &str, keys: impl Iterator<Item = K>) -> CheckResult {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return CheckResult::fail(format!("{what} is duplicated"));
        }
    }
    CheckResult::ok()
}

fn env_checker() -> AndChecker<EnvVar> {
    AndChecker::new()
        .with(field(
            "name",
            |e: &EnvVar| e.name.as_str(),
            RegexChecker::new(ENV_NAME_PATTERN),
        ))
        .with(field(
            "value",
            |e: &EnvVar| e.value.as_str(),
            RegexChecker::new(ENV_VALUE_PATTERN),
        ))
}

fn port_checker() -> AndChecker<ContainerPort> {
    AndChecker::new()
        .with(field(
            "name",
            |p: &ContainerPort| p.name.as_str(),
            RegexChecker::new(CONTAINER_NAME_PATTERN),
        ))
        .with(field(
            "proto",
            |p: &ContainerPort| p.proto.as_str(),
            StringChoiceChecker::new(PROTOCOLS),
        ))
        .with(field(
            "containerPort",
            |p: &ContainerPort| &p.container_port,
            IntChecker::new(MIN_CONTAINER_PORT, MAX_PORT),
        ))
        .with(field(
            "hostPort",
            |p: &ContainerPort| &p.host_port,
            IntChecker::new(MIN_HOST_PORT, MAX_PORT),
        ))
        .with(field(
            "hostIp",
            |p: &ContainerPort| p.host_ip.as_str(),
            Ipv4Checker,
        ))
}

fn volume_checker(whitelist: Vec<String>) -> AndChecker<HostPathVolume> {
    AndChecker::new()
        .with(field(
            "name",
            |v: &HostPathVolume| v.name.as_str(),
            RegexChecker::new(CONTAINER_NAME_PATTERN),
        ))
        .with(field(
            "mountPath",
            |v: &HostPathVolume| v.mount_path.as_str(),
            RegexChecker::new(MOUNT_PATH_PATTERN),
        ))
        .with(FnChecker(move |v: &HostPathVolume| {
            if whitelist.iter().any(|p| p == &v.host_path) {
                CheckResult::ok()
            } else {
                CheckResult::fail(format!("hostPath {} is not in whitelist", v.host_path))
            }
        }))
}

fn limits_not_below_requests(c: &Container) -> CheckResult {
    if c.cpu_limit.is_some_and(|limit| limit < c.cpu_request) {
        return CheckResult::fail("cpuLimit is less than cpuRequest");
    }
    if c.mem_limit.is_some_and(|limit| limit < c.mem_request) {
        return CheckResult::fail("memLimit is less than memRequest");
    }
    CheckResult::ok()
}

/// Checker of one container spec. `host_paths` is the mount whitelist.
pub fn container_checker(host_paths: &[String]) -> AndChecker<Container> {
    AndChecker::new()
        .with(field(
            "name",
            |c: &Container| c.name.as_str(),
            RegexChecker::new(CONTAINER_NAME_PATTERN),
        ))
        .with(field(
            "image",
            |c: &Container| c.image.as_str(),
            RegexChecker::new(IMAGE_PATTERN),
        ))
        .with(field(
            "imageVersion",
            |c: &Container| c.image_version.as_str(),
            RegexChecker::new(IMAGE_VERSION_PATTERN),
        ))
        .with(field(
            "cpuRequest",
            |c: &Container| &c.cpu_request,
            FloatChecker::new(MIN_CPU, MAX_CPU),
        ))
        .with(field(
            "cpuLimit",
            |c: &Container| &c.cpu_limit,
            optional(false, FloatChecker::new(MIN_CPU, MAX_CPU)),
        ))
        .with(field(
            "memRequest",
            |c: &Container| &c.mem_request,
            IntChecker::new(MIN_MEMORY, MAX_MEMORY),
        ))
        .with(field(
            "memLimit",
            |c: &Container| &c.mem_limit,
            optional::<i64, _>(false, IntChecker::new(MIN_MEMORY, MAX_MEMORY)),
        ))
        .with(field(
            "npu",
            |c: &Container| &c.npu,
            optional::<i64, _>(false, IntChecker::new(0, MAX_NPU)),
        ))
        .with(FnChecker(limits_not_below_requests))
        .with(field(
            "command",
            |c: &Container| &c.command,
            each::<String, _>(0, MAX_ARGS, RegexChecker::new(COMMAND_PATTERN)),
        ))
        .with(field(
            "args",
            |c: &Container| &c.args,
            each::<String, _>(0, MAX_ARGS, RegexChecker::new(COMMAND_PATTERN)),
        ))
        .with(field(
            "env",
            |c: &Container| &c.env,
            each(0, MAX_ENVS, env_checker()),
        ))
        .with(FnChecker(|c: &Container| {
            unique("env name", c.env.iter().map(|e| e.name.as_str()))
        }))
        .with(field(
            "ports",
            |c: &Container| &c.ports,
            each(0, MAX_PORTS, port_checker()),
        ))
        .with(field(
            "userId",
            |c: &Container| &c.user_id,
            optional::<i64, _>(false, IntChecker::new(MIN_USER_ID, MAX_USER_ID)),
        ))
        .with(field(
            "groupId",
            |c: &Container| &c.group_id,
            optional::<i64, _>(false, IntChecker::new(MIN_USER_ID, MAX_USER_ID)),
        ))
        .with(field(
            "hostPathVolumes",
            |c: &Container| &c.host_path_volumes,
            each(0, MAX_VOLUMES, volume_checker(host_paths.to_vec())),
        ))
        .with(FnChecker(|c: &Container| {
            let res = unique(
                "volume name",
                c.host_path_volumes.iter().map(|v| v.name.as_str()),
            );
            if !res.result {
                return res;
            }
            unique(
                "mount path",
                c.host_path_volumes.iter().map(|v| v.mount_path.as_str()),
            )
        }))
}

fn containers_checker(host_paths: &[String]) -> AndChecker<Vec<Container>> {
    AndChecker::new()
        .with(each(1, MAX_CONTAINERS, container_checker(host_paths)))
        .with(FnChecker(|cs: &Vec<Container>| {
            unique("container name", cs.iter().map(|c| c.name.as_str()))
        }))
}

pub fn create_app_checker(host_paths: &[String]) -> AndChecker<CreateAppReq> {
    AndChecker::new()
        .with(field(
            "appName",
            |r: &CreateAppReq| r.app_name.as_str(),
            RegexChecker::new(APP_NAME_PATTERN),
        ))
        .with(field(
            "description",
            |r: &CreateAppReq| r.description.as_str(),
            RegexChecker::new(DESCRIPTION_PATTERN),
        ))
        .with(field(
            "containers",
            |r: &CreateAppReq| &r.containers,
            containers_checker(host_paths),
        ))
}

pub fn update_app_checker(host_paths: &[String]) -> AndChecker<UpdateAppReq> {
    AndChecker::new()
        .with(field(
            "appID",
            |r: &UpdateAppReq| &r.app_id,
            UintChecker::id(),
        ))
        .with(field(
            "description",
            |r: &UpdateAppReq| &r.description,
            optional::<String, _>(false, RegexChecker::new(DESCRIPTION_PATTERN)),
        ))
        .with(field(
            "containers",
            |r: &UpdateAppReq| &r.containers,
            containers_checker(host_paths),
        ))
}

/// Shared by deploy and undeploy.
pub fn deploy_app_checker() -> AndChecker<DeployAppReq> {
    AndChecker::new()
        .with(field(
            "appID",
            |r: &DeployAppReq| &r.app_id,
            UintChecker::id(),
        ))
        .with(field(
            "nodeGroupIds",
            |r: &DeployAppReq| &r.node_group_ids,
            UniqueListChecker::new(1, MAX_DEPLOY_GROUPS, UintChecker::id()),
        ))
}

pub fn delete_app_checker() -> AndChecker<DeleteAppReq> {
    AndChecker::new().with(field(
        "appIDs",
        |r: &DeleteAppReq| &r.app_ids,
        UniqueListChecker::new(1, MAX_BATCH_IDS, UintChecker::id()),
    ))
}

pub fn app_id_checker() -> AndChecker<AppIdReq> {
    AndChecker::new().with(field(
        "appID",
        |r: &AppIdReq| &r.app_id,
        UintChecker::id(),
    ))
}

pub fn node_id_checker() -> AndChecker<NodeIdReq> {
    AndChecker::new().with(field(
        "nodeID",
        |r: &NodeIdReq| &r.node_id,
        UintChecker::id(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::face_check_container;

    fn whitelist() -> Vec<String> {
        vec!["/usr/local/sbin/npu-smi".to_string()]
    }

    fn create_req(containers: Vec<Container>) -> CreateAppReq {
        CreateAppReq {
            app_name: "face-check".into(),
            description: "face check app".into(),
            containers,
        }
    }

    // Test 1: the reference application passes
    #[test]
    fn test_valid_app_passes() {
        let res = create_app_checker(&whitelist()).check(&create_req(vec![face_check_container()]));
        assert!(res.result, "unexpected failure: {}", res.reason);
    }

    // Test 2: app name shape
    #[test]
    fn test_app_name_pattern() {
        let checker = create_app_checker(&whitelist());
        let long = "a".repeat(33);
        for bad in ["Face", "-face", "face-", "", long.as_str()] {
            let mut req = create_req(vec![face_check_container()]);
            req.app_name = bad.to_string();
            let res = checker.check(&req);
            assert!(!res.result, "{bad:?} should be rejected");
            assert!(res.reason.starts_with("appName"), "got {}", res.reason);
        }
    }

    // Test 3: groupId is checked on its own field
    #[test]
    fn test_group_id_checked_independently() {
        let checker = container_checker(&whitelist());
        let mut c = face_check_container();
        c.user_id = Some(1000);
        c.group_id = Some(0);
        let res = checker.check(&c);
        assert!(!res.result);
        assert!(res.reason.starts_with("groupId"), "got {}", res.reason);

        c.group_id = Some(1000);
        assert!(checker.check(&c).result);
    }

    // Test 4: limits must not undercut requests
    #[test]
    fn test_limits_not_below_requests() {
        let checker = container_checker(&whitelist());
        let mut c = face_check_container();
        c.cpu_limit = Some(0.5);
        assert!(!checker.check(&c).result);

        let mut c = face_check_container();
        c.mem_limit = Some(c.mem_request + 1);
        assert!(checker.check(&c).result);
    }

    // Test 5: host paths must be whitelisted
    #[test]
    fn test_host_path_whitelist() {
        let mut c = face_check_container();
        c.host_path_volumes[0].host_path = "/etc".into();
        let res = container_checker(&whitelist()).check(&c);
        assert!(!res.result);
        assert!(res.reason.contains("whitelist"), "got {}", res.reason);
    }

    // Test 6: container and env names are unique
    #[test]
    fn test_uniqueness_rules() {
        let checker = create_app_checker(&whitelist());
        let res = checker.check(&create_req(vec![face_check_container(), face_check_container()]));
        assert!(res.reason.contains("container name is duplicated"), "got {}", res.reason);

        let mut c = face_check_container();
        c.env = vec![
            EnvVar {
                name: "MODE".into(),
                value: "a".into(),
            },
            EnvVar {
                name: "MODE".into(),
                value: "b".into(),
            },
        ];
        assert!(!container_checker(&whitelist()).check(&c).result);
    }

    // Test 7: ports
    #[test]
    fn test_port_rules() {
        let checker = container_checker(&whitelist());
        let mut c = face_check_container();
        c.ports[0].proto = "SCTP".into();
        assert!(!checker.check(&c).result, "only TCP and UDP");

        let mut c = face_check_container();
        c.ports[0].host_port = 80;
        assert!(!checker.check(&c).result, "privileged host ports rejected");

        let mut c = face_check_container();
        c.ports[0].host_ip = "0.0.0.0".into();
        assert!(!checker.check(&c).result);
    }

    // Test 8: deploy targets are unique ids
    #[test]
    fn test_deploy_request() {
        let checker = deploy_app_checker();
        let ok = DeployAppReq {
            app_id: 1,
            node_group_ids: vec![1, 2],
        };
        assert!(checker.check(&ok).result);

        let dup = DeployAppReq {
            app_id: 1,
            node_group_ids: vec![1, 1],
        };
        assert!(!checker.check(&dup).result);

        let zero = DeployAppReq {
            app_id: 0,
            node_group_ids: vec![1],
        };
        assert!(!checker.check(&zero).result);
    }
}
