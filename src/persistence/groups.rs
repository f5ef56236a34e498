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

use super::{Result, not_found};
use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite};

#[derive(Debug, Clone, FromRow)]
pub struct NodeGroupRecord {
    pub id: i64,
    pub group_name: String,
    pub description: String,
    /// JSON cumulative request of the apps deployed on the group.
    pub resources_request: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NodeGroupListRow {
    #[sqlx(flatten)]
    pub group: NodeGroupRecord,
    pub node_count: i64,
}

pub async fn insert_group<'e, E>(executor: E, group_name: &str, description: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO node_groups (group_name, description, resources_request, created_at, updated_at)
        VALUES (?1, ?2, '{}', ?3, ?3)
        "#,
    )
    .bind(group_name)
    .bind(description)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(done.last_insert_rowid())
}

pub async fn get_group<'e, E>(executor: E, id: i64) -> Result<NodeGroupRecord>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, NodeGroupRecord>("SELECT * FROM node_groups WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| not_found("node group", id))
}

pub async fn get_groups_by_ids<'e, E>(executor: E, ids: &[i64]) -> Result<Vec<NodeGroupRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM node_groups WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");

    Ok(builder
        .build_query_as::<NodeGroupRecord>()
        .fetch_all(executor)
        .await?)
}

pub async fn count_groups<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM node_groups")
        .fetch_one(executor)
        .await?)
}

pub async fn count_groups_by_name<'e, E>(executor: E, name: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM node_groups WHERE INSTR(group_name, ?1) > 0")
            .bind(name)
            .fetch_one(executor)
            .await?,
    )
}

pub async fn list_groups<'e, E>(
    executor: E,
    name: &str,
    offset: i64,
    limit: i64,
) -> Result<Vec<NodeGroupListRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, NodeGroupListRow>(
        r#"
        SELECT g.*,
               (SELECT COUNT(*) FROM node_relations r WHERE r.group_id = g.id) AS node_count
        FROM node_groups g
        WHERE INSTR(g.group_name, ?1) > 0
        ORDER BY g.id
        LIMIT ?2 OFFSET ?3
        "#,
    )
    .bind(name)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?)
}

pub async fn modify_group<'e, E>(
    executor: E,
    id: i64,
    group_name: &str,
    description: &str,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(
        r#"
        UPDATE node_groups
        SET group_name = ?2, description = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(group_name)
    .bind(description)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(done.rows_affected())
}

pub async fn update_resources_request<'e, E>(
    executor: E,
    id: i64,
    resources_request: &str,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(
        "UPDATE node_groups SET resources_request = ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(id)
    .bind(resources_request)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(done.rows_affected())
}

pub async fn delete_group<'e, E>(executor: E, id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("DELETE FROM node_groups WHERE id = ?1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}
