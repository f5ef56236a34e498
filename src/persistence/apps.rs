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
pub struct AppInfoRecord {
    pub id: i64,
    pub app_name: String,
    pub description: String,
    /// JSON list of containers, decoded by the app service.
    pub containers: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn insert_app<'e, E>(
    executor: E,
    app_name: &str,
    description: &str,
    containers: &str,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO app_infos (app_name, description, containers, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        "#,
    )
    .bind(app_name)
    .bind(description)
    .bind(containers)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(done.last_insert_rowid())
}

pub async fn get_app<'e, E>(executor: E, id: i64) -> Result<AppInfoRecord>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, AppInfoRecord>("SELECT * FROM app_infos WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| not_found("app", id))
}

pub async fn count_apps<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM app_infos")
        .fetch_one(executor)
        .await?)
}

pub async fn count_apps_by_name<'e, E>(executor: E, name: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM app_infos WHERE INSTR(app_name, ?1) > 0")
            .bind(name)
            .fetch_one(executor)
            .await?,
    )
}

pub async fn list_apps<'e, E>(
    executor: E,
    name: &str,
    offset: i64,
    limit: i64,
) -> Result<Vec<AppInfoRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, AppInfoRecord>(
        r#"
        SELECT * FROM app_infos
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

pub async fn update_app<'e, E>(
    executor: E,
    id: i64,
    description: &str,
    containers: &str,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(
        r#"
        UPDATE app_infos
        SET description = ?2, containers = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(description)
    .bind(containers)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    if done.rows_affected() == 0 {
        return Err(not_found("app", id));
    }
    Ok(())
}

pub async fn delete_app<'e, E>(executor: E, id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("DELETE FROM app_infos WHERE id = ?1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory_db;

    // Test 1: insert, read back, update and delete an application row
    #[tokio::test]
    async fn test_app_row_lifecycle() {
        let db = memory_db().await.expect("memory db");
        let id = insert_app(&db, "face-check", "demo", "[]")
            .await
            .expect("insert");

        let row = get_app(&db, id).await.expect("get");
        assert_eq!(row.app_name, "face-check");
        assert_eq!(row.description, "demo");

        update_app(&db, id, "", "[{\"name\":\"c\"}]")
            .await
            .expect("update");
        let row = get_app(&db, id).await.expect("get after update");
        assert_eq!(row.description, "");
        assert!(row.containers.contains("\"c\""));

        assert_eq!(delete_app(&db, id).await.expect("delete"), 1);
        assert!(get_app(&db, id).await.expect_err("gone").is_not_found());
    }

    // Test 2: name filter is a substring match and paging is applied
    #[tokio::test]
    async fn test_list_apps_filter_and_page() {
        let db = memory_db().await.expect("memory db");
        for name in ["alpha", "beta", "alphabet"] {
            insert_app(&db, name, "", "[]").await.expect("insert");
        }

        assert_eq!(count_apps(&db).await.expect("count"), 3);
        assert_eq!(count_apps_by_name(&db, "alpha").await.expect("count"), 2);
        assert_eq!(count_apps_by_name(&db, "").await.expect("count"), 3);

        let page = list_apps(&db, "", 1, 1).await.expect("list");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].app_name, "beta");
    }
}
