//! Compile-only checks: repository code written against `Executor` runs on
//! both a pooled connection and a transaction.

#![allow(dead_code)]

use fluentsql::prelude::*;

async fn rename_user<E: Executor>(conn: &mut E, id: i64, name: &str) -> DbResult<u64> {
    update("users").set("name", name).eq("id", id).execute(conn).await
}

async fn active_users<E: Executor>(conn: &mut E) -> DbResult<RecordSet> {
    retrieve("users").eq("status", "active").paging(1, 50).fetch_paged(conn).await
}

async fn on_connection(manager: &ConnectionManager) -> DbResult<()> {
    let mut conn = manager.acquire().await?;
    rename_user(&mut conn, 1, "alice").await?;
    active_users(&mut conn).await?;
    Ok(())
}

async fn in_transaction(manager: &ConnectionManager) -> DbResult<()> {
    let mut tx = manager.begin().await?;
    rename_user(&mut tx, 1, "alice").await?;
    active_users(&mut tx).await?;
    tx.commit().await
}

fn spawned(manager: &ConnectionManager) -> tokio::task::JoinHandle<DbResult<u64>> {
    manager.spawn_run(delete("sessions").lt("expires_at", 0))
}
