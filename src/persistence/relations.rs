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

use super::{NodeGroupRecord, NodeRecord, Result};
use chrono::Utc;
use sqlx::{Executor, Sqlite};

pub async fn insert_relation<'e, E>(executor: E, node_id: i64, group_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO node_relations (node_id, group_id, created_at) VALUES (?1, ?2, ?3)",
    )
    .bind(node_id)
    .bind(group_id)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete_relation<'e, E>(executor: E, node_id: i64, group_id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("DELETE FROM node_relations WHERE node_id = ?1 AND group_id = ?2")
        .bind(node_id)
        .bind(group_id)
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}

pub async fn delete_by_node<'e, E>(executor: E, node_id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("DELETE FROM node_relations WHERE node_id = ?1")
        .bind(node_id)
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}

pub async fn exists<'e, E>(executor: E, node_id: i64, group_id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM node_relations WHERE node_id = ?1 AND group_id = ?2",
    )
    .bind(node_id)
    .bind(group_id)
    .fetch_one(executor)
    .await?;
    Ok(count > 0)
}

pub async fn groups_of_node<'e, E>(executor: E, node_id: i64) -> Result<Vec<NodeGroupRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, NodeGroupRecord>(
        r#"
        SELECT g.* FROM node_groups g
        JOIN node_relations r ON r.group_id = g.id
        WHERE r.node_id = ?1
        ORDER BY g.id
        "#,
    )
    .bind(node_id)
    .fetch_all(executor)
    .await?)
}

pub async fn nodes_of_group<'e, E>(executor: E, group_id: i64) -> Result<Vec<NodeRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, NodeRecord>(
        r#"
        SELECT n.* FROM node_infos n
        JOIN node_relations r ON r.node_id = n.id
        WHERE r.group_id = ?1
        ORDER BY n.id
        "#,
    )
    .bind(group_id)
    .fetch_all(executor)
    .await?)
}

pub async fn count_nodes_in_group<'e, E>(executor: E, group_id: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM node_relations WHERE group_id = ?1")
            .bind(group_id)
            .fetch_one(executor)
            .await?,
    )
}

pub async fn count_groups_of_node<'e, E>(executor: E, node_id: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM node_relations WHERE node_id = ?1")
            .bind(node_id)
            .fetch_one(executor)
            .await?,
    )
}
