//! End-to-end checks against a live database.
//!
//! Set `DATABASE_URL` (a `postgres://` URL, or `mysql://` with the `mysql`
//! feature) to run them; without it every test returns early.

use fluentsql::prelude::*;
use fluentsql::{QueryContext, QueryMonitor, QueryResult};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Records the SQL of every completed statement.
#[derive(Default)]
struct StatementLog(Mutex<Vec<String>>);

impl StatementLog {
    fn count(&self, sql: &str) -> usize {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| *s == sql)
            .count()
    }
}

impl QueryMonitor for StatementLog {
    fn on_query_complete(&self, ctx: &QueryContext, _duration: Duration, _result: &QueryResult) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ctx.sql.clone());
    }
}

fn config(test: &str) -> DbResult<Option<DbConfig>> {
    let _ = dotenvy::dotenv();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set; skipping {test}");
        return Ok(None);
    };
    Ok(Some(DbConfig::from_url(url)?.with_debug(true)))
}

fn manager(test: &str) -> DbResult<Option<ConnectionManager>> {
    config(test)?.map(ConnectionManager::new).transpose()
}

async fn scratch_table(manager: &ConnectionManager, prefix: &str) -> DbResult<String> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let table = format!("{prefix}_{}_{nanos}", std::process::id());
    let id = match manager.dialect() {
        Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
        Dialect::MySql => "BIGINT AUTO_INCREMENT PRIMARY KEY",
    };
    manager
        .execute(&format!(
            "CREATE TABLE {table} (id {id}, name VARCHAR(64) NOT NULL, age INT)"
        ))
        .await?;
    Ok(table)
}

async fn row_count(manager: &ConnectionManager, table: &str) -> DbResult<u64> {
    let mut conn = manager.acquire().await?;
    retrieve(table).count(&mut conn).await
}

async fn drop_table(manager: &ConnectionManager, table: &str) -> DbResult<()> {
    manager.execute(&format!("DROP TABLE {table}")).await?;
    Ok(())
}

#[tokio::test]
async fn insert_then_retrieve_by_id() -> DbResult<()> {
    let Some(manager) = manager("insert_then_retrieve_by_id")? else {
        return Ok(());
    };
    let table = scratch_table(&manager, "fluentsql_insert").await?;

    let id = manager
        .insert_last_id(&create(&table).set("name", "alice").set("age", 30))
        .await?;
    assert!(id > 0);

    let mut rs = manager.fetch(&retrieve(&table).eq("id", id)).await?;
    assert_eq!(rs.size(), 1);
    assert!(rs.next());
    let row = rs.current().ok_or_else(|| DbError::not_found("row"))?;
    assert_eq!(row.get_str("name")?, Some("alice"));
    assert_eq!(row.get_i64("age")?, Some(30));
    assert!(!rs.next());

    drop_table(&manager, &table).await
}

#[tokio::test]
async fn batch_update_rolls_back_on_failure() -> DbResult<()> {
    let Some(manager) = manager("batch_update_rolls_back_on_failure")? else {
        return Ok(());
    };
    let table = scratch_table(&manager, "fluentsql_batch").await?;

    let mut batch = manager.batch_update();
    batch
        .add_builder(&create(&table).set("name", "bob"))?
        .add_sql(format!("INSERT INTO {table} (name) VALUES (NULL)"));
    let err = batch.execute_with_result().await.unwrap_err();

    match &err {
        DbError::BatchFailed { index, counts, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(counts, &vec![1, -1]);
        }
        other => panic!("expected BatchFailed, got {other:?}"),
    }
    assert!(err.is_constraint_violation());
    assert_eq!(row_count(&manager, &table).await?, 0);

    drop_table(&manager, &table).await
}

#[tokio::test]
async fn transaction_commit_and_rollback() -> DbResult<()> {
    let Some(manager) = manager("transaction_commit_and_rollback")? else {
        return Ok(());
    };
    let table = scratch_table(&manager, "fluentsql_trx").await?;

    let mut tx = manager.begin().await?;
    tx.insert(&create(&table).set("name", "discarded")).await?;
    assert_eq!(tx.fetch(&retrieve(&table)).await?.size(), 1);
    tx.rollback().await?;
    assert_eq!(row_count(&manager, &table).await?, 0);

    let kept: u64 = fluentsql::transaction!(&manager, tx, {
        tx.run(&create(&table).set("name", "kept").set("age", 41)).await?;
        tx.run(&update(&table).set("age", 42).eq("name", "kept")).await
    })?;
    assert_eq!(kept, 1);

    let rs = manager.fetch(&retrieve(&table).eq("age", 42)).await?;
    assert_eq!(rs.size(), 1);

    drop_table(&manager, &table).await
}

#[tokio::test]
async fn bulk_insert_with_step_commit() -> DbResult<()> {
    let Some(config) = config("bulk_insert_with_step_commit")? else {
        return Ok(());
    };
    let log = Arc::new(StatementLog::default());
    let manager = ConnectionManager::builder(config)
        .monitor_arc(log.clone())
        .build()?;
    let table = scratch_table(&manager, "fluentsql_bulk").await?;
    let commits_before = log.count("COMMIT");

    let bulk = BulkInsert::new(&table, ["name", "age"])
        .rows((0..25).map(|i| vec![SqlValue::from(format!("user{i:02}")), SqlValue::from(i)]))
        .byte_budget(20)
        .step_commit(true);
    let report = manager.bulk_insert(&bulk).await?;
    assert_eq!(report.rows, 25);
    assert_eq!(report.affected, 25);
    assert_eq!(report.statements, 25);
    // After statements 10 and 20, then once at the end.
    assert_eq!(log.count("COMMIT") - commits_before, 3);
    assert_eq!(log.count("ROLLBACK"), 0);

    let rs = manager
        .fetch(&retrieve(&table).order_by_asc("id").paging(3, 10))
        .await?;
    assert_eq!(rs.size(), 5);
    assert_eq!(rs.first().map(|row| row.get_str("name")).transpose()?.flatten(), Some("user20"));

    drop_table(&manager, &table).await
}

#[tokio::test]
async fn statement_timeout_cancels_the_query() -> DbResult<()> {
    let Some(config) = config("statement_timeout_cancels_the_query")? else {
        return Ok(());
    };
    let manager = ConnectionManager::new(config.with_statement_timeout(Duration::from_millis(100)))?;
    let sleep = match manager.dialect() {
        Dialect::Postgres => "SELECT pg_sleep(5)",
        Dialect::MySql => "SELECT SLEEP(5)",
    };

    let err = manager.query(sleep).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    Ok(())
}
