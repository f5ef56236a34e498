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
use sqlx::{Executor, FromRow, Sqlite};

#[derive(Debug, Clone, FromRow)]
pub struct AppInstanceRecord {
    pub id: i64,
    pub pod_name: String,
    pub node_id: i64,
    pub node_name: String,
    pub node_unique_name: String,
    pub node_group_id: i64,
    pub app_id: i64,
    pub app_name: String,
    pub container_info: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAppInstance {
    pub pod_name: String,
    pub node_id: i64,
    pub node_name: String,
    pub node_unique_name: String,
    pub node_group_id: i64,
    pub app_id: i64,
    pub app_name: String,
    pub container_info: String,
}

pub async fn insert_instance<'e, E>(executor: E, instance: &NewAppInstance) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO app_instances (
            pod_name,
            node_id,
            node_name,
            node_unique_name,
            node_group_id,
            app_id,
            app_name,
            container_info,
            created_at,
            updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        "#,
    )
    .bind(&instance.pod_name)
    .bind(instance.node_id)
    .bind(&instance.node_name)
    .bind(&instance.node_unique_name)
    .bind(instance.node_group_id)
    .bind(instance.app_id)
    .bind(&instance.app_name)
    .bind(&instance.container_info)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(done.last_insert_rowid())
}

pub async fn get_by_pod_name<'e, E>(
    executor: E,
    pod_name: &str,
) -> Result<Option<AppInstanceRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, AppInstanceRecord>("SELECT * FROM app_instances WHERE pod_name = ?1")
            .bind(pod_name)
            .fetch_optional(executor)
            .await?,
    )
}

/// Refreshes node placement and container status of a pod row.
pub async fn update_instance<'e, E>(executor: E, instance: &NewAppInstance) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(
        r#"
        UPDATE app_instances
        SET node_id = ?2,
            node_name = ?3,
            node_unique_name = ?4,
            container_info = ?5,
            updated_at = ?6
        WHERE pod_name = ?1
        "#,
    )
    .bind(&instance.pod_name)
    .bind(instance.node_id)
    .bind(&instance.node_name)
    .bind(&instance.node_unique_name)
    .bind(&instance.container_info)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(done.rows_affected())
}

pub async fn delete_by_pod_name<'e, E>(executor: E, pod_name: &str) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("DELETE FROM app_instances WHERE pod_name = ?1")
        .bind(pod_name)
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}

pub async fn truncate<'e, E>(executor: E) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("DELETE FROM app_instances")
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}

pub async fn count_instances<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM app_instances")
        .fetch_one(executor)
        .await?)
}

pub async fn list_all<'e, E>(executor: E) -> Result<Vec<AppInstanceRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, AppInstanceRecord>("SELECT * FROM app_instances ORDER BY id")
            .fetch_all(executor)
            .await?,
    )
}

/// One page of rows whose app name contains `name`.
pub async fn list_page<'e, E>(
    executor: E,
    name: &str,
    offset: i64,
    limit: i64,
) -> Result<Vec<AppInstanceRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, AppInstanceRecord>(
        r#"
        SELECT * FROM app_instances
        WHERE INSTR(app_name, ?1) > 0
        ORDER BY id
        LIMIT ?2 OFFSET ?3
        "#,
    )
    .bind(name)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?)
}

pub async fn count_by_name<'e, E>(executor: E, name: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM app_instances WHERE INSTR(app_name, ?1) > 0")
            .bind(name)
            .fetch_one(executor)
            .await?,
    )
}

pub async fn list_by_app<'e, E>(executor: E, app_id: i64) -> Result<Vec<AppInstanceRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, AppInstanceRecord>(
        "SELECT * FROM app_instances WHERE app_id = ?1 ORDER BY id",
    )
    .bind(app_id)
    .fetch_all(executor)
    .await?)
}

pub async fn list_by_node<'e, E>(executor: E, node_id: i64) -> Result<Vec<AppInstanceRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, AppInstanceRecord>(
        "SELECT * FROM app_instances WHERE node_id = ?1 ORDER BY id",
    )
    .bind(node_id)
    .fetch_all(executor)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory_db;

    fn sample(pod: &str) -> NewAppInstance {
        NewAppInstance {
            pod_name: pod.to_string(),
            node_id: 1,
            node_name: "edge-1".to_string(),
            node_unique_name: "edge-1".to_string(),
            node_group_id: 1,
            app_id: 7,
            app_name: "face-check".to_string(),
            container_info: "[]".to_string(),
        }
    }

    // Test 1: pod rows are keyed by pod name
    #[tokio::test]
    async fn test_instance_rows() {
        let db = memory_db().await.expect("memory db");
        insert_instance(&db, &sample("pod-a")).await.expect("insert");
        insert_instance(&db, &sample("pod-b")).await.expect("insert");
        assert!(
            insert_instance(&db, &sample("pod-a"))
                .await
                .expect_err("duplicate pod")
                .is_duplicate()
        );

        let mut moved = sample("pod-a");
        moved.node_id = 2;
        moved.node_name = "edge-2".to_string();
        assert_eq!(update_instance(&db, &moved).await.expect("update"), 1);

        let row = get_by_pod_name(&db, "pod-a")
            .await
            .expect("get")
            .expect("row exists");
        assert_eq!(row.node_id, 2);
        assert_eq!(list_by_node(&db, 1).await.expect("by node").len(), 1);
        assert_eq!(list_by_app(&db, 7).await.expect("by app").len(), 2);
        assert_eq!(count_by_name(&db, "face").await.expect("count"), 2);
        let page = list_page(&db, "face", 1, 10).await.expect("page");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].pod_name, "pod-b");

        assert_eq!(delete_by_pod_name(&db, "pod-b").await.expect("delete"), 1);
        assert_eq!(truncate(&db).await.expect("truncate"), 1);
        assert_eq!(count_instances(&db).await.expect("count"), 0);
    }
}
