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

use super::Result;
use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite};
use std::collections::HashMap;

#[derive(Debug, Clone, FromRow)]
pub struct AppDaemonSetRecord {
    pub id: i64,
    pub daemon_set_name: String,
    pub app_id: i64,
    pub node_group_id: i64,
    pub node_group_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn insert_daemon_set<'e, E>(
    executor: E,
    daemon_set_name: &str,
    app_id: i64,
    node_group_id: i64,
    node_group_name: &str,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO app_daemon_sets (
            daemon_set_name,
            app_id,
            node_group_id,
            node_group_name,
            created_at,
            updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(daemon_set_name)
    .bind(app_id)
    .bind(node_group_id)
    .bind(node_group_name)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(done.last_insert_rowid())
}

pub async fn get_daemon_set<'e, E>(
    executor: E,
    app_id: i64,
    node_group_id: i64,
) -> Result<Option<AppDaemonSetRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, AppDaemonSetRecord>(
        "SELECT * FROM app_daemon_sets WHERE app_id = ?1 AND node_group_id = ?2",
    )
    .bind(app_id)
    .bind(node_group_id)
    .fetch_optional(executor)
    .await?)
}

pub async fn list_by_app<'e, E>(executor: E, app_id: i64) -> Result<Vec<AppDaemonSetRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, AppDaemonSetRecord>(
        "SELECT * FROM app_daemon_sets WHERE app_id = ?1 ORDER BY node_group_id",
    )
    .bind(app_id)
    .fetch_all(executor)
    .await?)
}

pub async fn list_all<'e, E>(executor: E) -> Result<Vec<AppDaemonSetRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, AppDaemonSetRecord>("SELECT * FROM app_daemon_sets ORDER BY id")
            .fetch_all(executor)
            .await?,
    )
}

pub async fn delete_daemon_set<'e, E>(executor: E, app_id: i64, node_group_id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done =
        sqlx::query("DELETE FROM app_daemon_sets WHERE app_id = ?1 AND node_group_id = ?2")
            .bind(app_id)
            .bind(node_group_id)
            .execute(executor)
            .await?;
    Ok(done.rows_affected())
}

pub async fn count_by_app<'e, E>(executor: E, app_id: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM app_daemon_sets WHERE app_id = ?1")
            .bind(app_id)
            .fetch_one(executor)
            .await?,
    )
}

pub async fn count_by_group<'e, E>(executor: E, node_group_id: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM app_daemon_sets WHERE node_group_id = ?1")
            .bind(node_group_id)
            .fetch_one(executor)
            .await?,
    )
}

/// Deployed-app count per group id; groups without apps map to zero.
pub async fn counts_by_groups<'e, E>(executor: E, group_ids: &[i64]) -> Result<HashMap<i64, i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut counts: HashMap<i64, i64> = group_ids.iter().map(|id| (*id, 0)).collect();
    if group_ids.is_empty() {
        return Ok(counts);
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT node_group_id, COUNT(*) FROM app_daemon_sets WHERE node_group_id IN (",
    );
    let mut separated = builder.separated(", ");
    for id in group_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") GROUP BY node_group_id");

    let rows: Vec<(i64, i64)> = builder.build_query_as().fetch_all(executor).await?;
    counts.extend(rows);
    Ok(counts)
}

/// Number of distinct applications deployed to at least one group.
pub async fn count_deployed_apps<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(DISTINCT app_id) FROM app_daemon_sets")
            .fetch_one(executor)
            .await?,
    )
}
