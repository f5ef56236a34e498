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

//! Typed repositories over the relational store.
//!
//! Every function takes a generic executor so the same query runs against the
//! pool or inside a caller-owned transaction (`&mut *tx`).

use snafu::{ResultExt, Snafu};
use sqlx::migrate::Migrator;
use sqlx::{Sqlite, SqlitePool, Transaction};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub mod apps;
pub mod daemon_sets;
pub mod groups;
pub mod instances;
pub mod nodes;
pub mod relations;

pub use apps::AppInfoRecord;
pub use daemon_sets::AppDaemonSetRecord;
pub use groups::{NodeGroupListRow, NodeGroupRecord};
pub use instances::{AppInstanceRecord, NewAppInstance};
pub use nodes::{NewNode, NodeRecord};

pub type Db = SqlitePool;
pub type Tx = Transaction<'static, Sqlite>;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("record already exists: {}", message))]
    Duplicate { message: String },

    #[snafu(display("{} {} not found", kind, key))]
    NotFound { kind: &'static str, key: String },

    #[snafu(display("database error: {}", source))]
    Sqlx { source: sqlx::Error },

    #[snafu(display("database migration failed: {}", source))]
    Migrate { source: sqlx::migrate::MigrateError },
}

impl Error {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::Duplicate { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        match &source {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::Duplicate {
                message: db_err.message().to_string(),
            },
            _ => Error::Sqlx { source },
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Opens (creating if needed) the database file and applies migrations.
pub async fn init_db(path: impl AsRef<Path>) -> Result<Db> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Sqlx { source: e.into() })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    MIGRATOR.run(&pool).await.context(MigrateSnafu)?;
    info!("database ready at {}", path.display());
    Ok(pool)
}

/// Private in-memory database; one pinned connection so the schema survives.
pub async fn memory_db() -> Result<Db> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    MIGRATOR.run(&pool).await.context(MigrateSnafu)?;
    Ok(pool)
}

pub async fn begin(db: &Db) -> Result<Tx> {
    Ok(db.begin().await?)
}

pub async fn commit(tx: Tx) -> Result<()> {
    Ok(tx.commit().await?)
}

pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Error {
    Error::NotFound {
        kind,
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: unique index violations surface as a typed duplicate
    #[tokio::test]
    async fn test_unique_violation_is_typed() {
        let db = memory_db().await.expect("memory db");
        apps::insert_app(&db, "face-check", "", "[]")
            .await
            .expect("first insert");

        let err = apps::insert_app(&db, "face-check", "", "[]")
            .await
            .expect_err("second insert must fail");
        assert!(err.is_duplicate(), "expected duplicate, got {err}");
    }

    // Test 2: migrations create every table
    #[tokio::test]
    async fn test_migrations_create_tables() {
        let db = memory_db().await.expect("memory db");
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE '\\_%' ESCAPE '\\' AND name NOT LIKE 'sqlite%' ORDER BY name",
        )
        .fetch_all(&db)
        .await
        .expect("list tables");

        for table in [
            "app_daemon_sets",
            "app_infos",
            "app_instances",
            "node_groups",
            "node_infos",
            "node_relations",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
    }

    // Test 3: a file database is created on demand
    #[tokio::test]
    async fn test_init_db_creates_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("edge.db");
        let db = init_db(&path).await.expect("init db");
        assert!(path.exists(), "database file should exist");
        db.close().await;
    }
}
