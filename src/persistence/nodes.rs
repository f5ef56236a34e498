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
use sqlx::{Executor, FromRow, Sqlite};

#[derive(Debug, Clone, FromRow)]
pub struct NodeRecord {
    pub id: i64,
    pub node_name: String,
    pub unique_name: String,
    pub serial_number: String,
    pub ip: String,
    pub description: String,
    pub is_managed: bool,
    /// JSON list of installed software.
    pub software_info: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the substrate knows about a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNode {
    pub node_name: String,
    pub unique_name: String,
    pub serial_number: String,
    pub ip: String,
}

/// Which side of the managed flag a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Managed,
    Unmanaged,
    All,
}

impl Membership {
    fn clause(self) -> &'static str {
        match self {
            Membership::Managed => "is_managed = 1",
            Membership::Unmanaged => "is_managed = 0 AND ip != ''",
            Membership::All => "1 = 1",
        }
    }
}

/// Inserts or refreshes a node keyed on its serial number.
///
/// A rediscovered node only refreshes substrate facts; a managed node keeps
/// its user-assigned name, description and managed flag.
pub async fn upsert_node<'e, E>(executor: E, node: &NewNode) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO node_infos (
            node_name,
            unique_name,
            serial_number,
            ip,
            description,
            is_managed,
            created_at,
            updated_at
        )
        VALUES (?1, ?2, ?3, ?4, '', 0, ?5, ?5)
        ON CONFLICT (serial_number) DO UPDATE SET
            node_name = CASE
                WHEN node_infos.is_managed = 1 THEN node_infos.node_name
                ELSE excluded.node_name
            END,
            unique_name = excluded.unique_name,
            ip = excluded.ip,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(&node.node_name)
    .bind(&node.unique_name)
    .bind(&node.serial_number)
    .bind(&node.ip)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

pub async fn get_node<'e, E>(executor: E, id: i64) -> Result<NodeRecord>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, NodeRecord>("SELECT * FROM node_infos WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| not_found("node", id))
}

pub async fn get_managed_node<'e, E>(executor: E, id: i64) -> Result<NodeRecord>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, NodeRecord>("SELECT * FROM node_infos WHERE id = ?1 AND is_managed = 1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| not_found("managed node", id))
}

pub async fn get_node_by_sn<'e, E>(executor: E, sn: &str) -> Result<Option<NodeRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, NodeRecord>("SELECT * FROM node_infos WHERE serial_number = ?1")
            .bind(sn)
            .fetch_optional(executor)
            .await?,
    )
}

pub async fn get_node_by_unique_name<'e, E>(
    executor: E,
    unique_name: &str,
) -> Result<Option<NodeRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, NodeRecord>("SELECT * FROM node_infos WHERE unique_name = ?1")
            .bind(unique_name)
            .fetch_optional(executor)
            .await?,
    )
}

pub async fn count_nodes<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM node_infos")
        .fetch_one(executor)
        .await?)
}

pub async fn count_by_membership<'e, E>(
    executor: E,
    membership: Membership,
    name: &str,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT COUNT(*) FROM node_infos WHERE {} AND INSTR(node_name, ?1) > 0",
        membership.clause()
    );
    Ok(sqlx::query_scalar(&sql)
        .bind(name)
        .fetch_one(executor)
        .await?)
}

pub async fn list_by_membership<'e, E>(
    executor: E,
    membership: Membership,
    name: &str,
    offset: i64,
    limit: i64,
) -> Result<Vec<NodeRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT * FROM node_infos WHERE {} AND INSTR(node_name, ?1) > 0 \
         ORDER BY id LIMIT ?2 OFFSET ?3",
        membership.clause()
    );
    Ok(sqlx::query_as::<_, NodeRecord>(&sql)
        .bind(name)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await?)
}

pub async fn list_all<'e, E>(executor: E) -> Result<Vec<NodeRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, NodeRecord>("SELECT * FROM node_infos ORDER BY id")
            .fetch_all(executor)
            .await?,
    )
}

/// discovered → managed. Zero rows when the node is absent or already managed.
pub async fn manage_node<'e, E>(
    executor: E,
    id: i64,
    node_name: &str,
    description: &str,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(
        r#"
        UPDATE node_infos
        SET node_name = ?2, description = ?3, is_managed = 1, updated_at = ?4
        WHERE id = ?1 AND is_managed = 0
        "#,
    )
    .bind(id)
    .bind(node_name)
    .bind(description)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(done.rows_affected())
}

pub async fn modify_managed_node<'e, E>(
    executor: E,
    id: i64,
    node_name: &str,
    description: &str,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(
        r#"
        UPDATE node_infos
        SET node_name = ?2, description = ?3, updated_at = ?4
        WHERE id = ?1 AND is_managed = 1
        "#,
    )
    .bind(id)
    .bind(node_name)
    .bind(description)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(done.rows_affected())
}

pub async fn update_software_info<'e, E>(executor: E, sn: &str, software_info: &str) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(
        "UPDATE node_infos SET software_info = ?2, updated_at = ?3 WHERE serial_number = ?1",
    )
    .bind(sn)
    .bind(software_info)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(done.rows_affected())
}

pub async fn delete_node<'e, E>(executor: E, id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("DELETE FROM node_infos WHERE id = ?1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}

pub async fn delete_unmanaged_nodes<'e, E>(executor: E) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("DELETE FROM node_infos WHERE is_managed = 0")
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}
