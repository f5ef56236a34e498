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

use super::app::DESCRIPTION_PATTERN;
use super::primitives::SERIAL_NUMBER_PATTERN;
use super::{
    AndChecker, CheckResult, Checker, FnChecker, RegexChecker, UintChecker, UniqueListChecker,
    each, field, optional,
};
use crate::types::node::{
    AddUnManagedNodeReq, BatchDeleteNodeGroupReq, BatchDeleteNodeReq, CreateNodeGroupReq,
    GroupNodesReq, IdReq, ModifyNodeGroupReq, ModifyNodeReq, NodeDetailReq, NodeIdentifier,
    RelationReq,
};

pub const NODE_NAME_PATTERN: &str = SERIAL_NUMBER_PATTERN;
pub const GROUP_NAME_PATTERN: &str = r"^[a-zA-Z]([_a-zA-Z0-9]{0,30}[a-zA-Z0-9])?$";

pub const MAX_NODE: usize = 2048;
pub const MAX_NODE_GROUP: usize = 1024;
pub const MAX_NODE_PER_GROUP: usize = 1024;
pub const MAX_GROUP_PER_NODE: usize = 10;
const MAX_RELATIONS: usize = MAX_NODE_PER_GROUP;

pub fn add_unmanaged_node_checker() -> AndChecker<AddUnManagedNodeReq> {
    AndChecker::new()
        .with(field(
            "nodeID",
            |r: &AddUnManagedNodeReq| &r.node_id,
            UintChecker::id(),
        ))
        .with(field(
            "nodeName",
            |r: &AddUnManagedNodeReq| r.node_name.as_str(),
            RegexChecker::new(NODE_NAME_PATTERN),
        ))
        .with(field(
            "description",
            |r: &AddUnManagedNodeReq| r.description.as_str(),
            RegexChecker::new(DESCRIPTION_PATTERN),
        ))
        .with(field(
            "groupIDs",
            |r: &AddUnManagedNodeReq| &r.group_ids,
            UniqueListChecker::new(0, MAX_GROUP_PER_NODE, UintChecker::id()),
        ))
}

pub fn modify_node_checker() -> AndChecker<ModifyNodeReq> {
    AndChecker::new()
        .with(field("nodeID", |r: &ModifyNodeReq| &r.node_id, UintChecker::id()))
        .with(field(
            "nodeName",
            |r: &ModifyNodeReq| r.node_name.as_str(),
            RegexChecker::new(NODE_NAME_PATTERN),
        ))
        .with(field(
            "description",
            |r: &ModifyNodeReq| &r.description,
            optional::<String, _>(false, RegexChecker::new(DESCRIPTION_PATTERN)),
        ))
}

pub fn batch_delete_node_checker() -> AndChecker<BatchDeleteNodeReq> {
    AndChecker::new().with(field(
        "nodeIDs",
        |r: &BatchDeleteNodeReq| &r.node_ids,
        UniqueListChecker::new(1, MAX_NODE, UintChecker::id()),
    ))
}

pub fn id_checker() -> AndChecker<IdReq> {
    AndChecker::new().with(field("id", |r: &IdReq| &r.id, UintChecker::id()))
}

pub fn create_group_checker() -> AndChecker<CreateNodeGroupReq> {
    AndChecker::new()
        .with(field(
            "nodeGroupName",
            |r: &CreateNodeGroupReq| r.node_group_name.as_str(),
            RegexChecker::new(GROUP_NAME_PATTERN),
        ))
        .with(field(
            "description",
            |r: &CreateNodeGroupReq| r.description.as_str(),
            RegexChecker::new(DESCRIPTION_PATTERN),
        ))
}

pub fn modify_group_checker() -> AndChecker<ModifyNodeGroupReq> {
    AndChecker::new()
        .with(field(
            "groupID",
            |r: &ModifyNodeGroupReq| &r.group_id,
            UintChecker::id(),
        ))
        .with(field(
            "nodeGroupName",
            |r: &ModifyNodeGroupReq| r.node_group_name.as_str(),
            RegexChecker::new(GROUP_NAME_PATTERN),
        ))
        .with(field(
            "description",
            |r: &ModifyNodeGroupReq| &r.description,
            optional::<String, _>(false, RegexChecker::new(DESCRIPTION_PATTERN)),
        ))
}

pub fn batch_delete_group_checker() -> AndChecker<BatchDeleteNodeGroupReq> {
    AndChecker::new().with(field(
        "groupIDs",
        |r: &BatchDeleteNodeGroupReq| &r.group_ids,
        UniqueListChecker::new(1, MAX_NODE_GROUP, UintChecker::id()),
    ))
}

pub fn group_nodes_checker() -> AndChecker<GroupNodesReq> {
    AndChecker::new()
        .with(field(
            "groupID",
            |r: &GroupNodesReq| &r.group_id,
            UintChecker::id(),
        ))
        .with(field(
            "nodeIDs",
            |r: &GroupNodesReq| &r.node_ids,
            UniqueListChecker::new(1, MAX_NODE_PER_GROUP, UintChecker::id()),
        ))
}

fn relation_checker() -> AndChecker<RelationReq> {
    AndChecker::new()
        .with(field("nodeID", |r: &RelationReq| &r.node_id, UintChecker::id()))
        .with(field("groupID", |r: &RelationReq| &r.group_id, UintChecker::id()))
}

pub fn relations_checker() -> AndChecker<Vec<RelationReq>> {
    AndChecker::new()
        .with(each(1, MAX_RELATIONS, relation_checker()))
        .with(FnChecker(|rs: &Vec<RelationReq>| {
            let mut seen = std::collections::HashSet::new();
            if rs.iter().all(|r| seen.insert((r.node_id, r.group_id))) {
                CheckResult::ok()
            } else {
                CheckResult::fail("relation is duplicated")
            }
        }))
}

/// Resolves a detail request into exactly one identifier.
pub fn node_identifier(req: &NodeDetailReq) -> Result<NodeIdentifier, CheckResult> {
    match (req.id, req.sn.as_deref()) {
        (Some(id), None) => {
            let res = UintChecker::id().check(&id);
            if res.result {
                Ok(NodeIdentifier::Id(id))
            } else {
                Err(CheckResult::fail(format!("id check failed: {}", res.reason)))
            }
        }
        (None, Some(sn)) => {
            if RegexChecker::serial_number().is_match(sn) {
                Ok(NodeIdentifier::Sn(sn.to_string()))
            } else {
                Err(CheckResult::fail("sn check failed: invalid serial number"))
            }
        }
        (Some(_), Some(_)) => Err(CheckResult::fail("only one of id and sn is allowed")),
        (None, None) => Err(CheckResult::fail("id or sn is required")),
    }
}
