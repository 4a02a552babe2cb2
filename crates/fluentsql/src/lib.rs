//! # fluentsql
//!
//! An embedded SQL access layer for MySQL and PostgreSQL.
//!
//! ## Features
//!
//! - **Fluent builders**: `retrieve` / `create` / `update` / `delete` accumulate
//!   conditions and values, then render literal SQL (`build`) or placeholder
//!   SQL plus ordered parameters (`build_prepared`)
//! - **Safe defaults**: UPDATE and DELETE without a WHERE clause never render
//! - **Materialized results**: every query drains into a [`RecordSet`] with a
//!   forward/backward cursor
//! - **Explicit pooling**: one [`ConnectionManager`] per data source, passed
//!   into the execution layer
//! - **Units of work**: pinned-connection [`DbTrx`], all-or-nothing
//!   [`DbTrxUpdate`] and byte-budgeted [`BulkInsert`]
//! - **Query monitoring**: every statement reported to a [`QueryMonitor`]
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use fluentsql::prelude::*;
//!
//! let manager = ConnectionManager::new(DbConfig::from_json_file("db.json")?)?;
//!
//! // INSERT
//! let id = manager
//!     .insert_last_id(&create("users").set("username", "alice").set("age", 30))
//!     .await?;
//!
//! // SELECT
//! let mut users = manager
//!     .fetch(&retrieve("users").ge("age", 18).order_by_desc("id").paging(1, 20))
//!     .await?;
//! while users.next() {
//!     if let Some(row) = users.current() {
//!         println!("{:?}", row.get_str("username")?);
//!     }
//! }
//!
//! // UPDATE
//! manager.run(&update("users").set("age", 31).eq("id", id)).await?;
//!
//! // DELETE
//! manager.run(&delete("users").eq("id", id)).await?;
//! ```

pub mod binder;
pub mod bulk;
pub mod client;
pub mod condition;
pub mod config;
pub mod dialect;
pub mod error;
pub mod monitor;
#[cfg(feature = "mysql")]
mod mysql;
pub mod pool;
mod postgres;
pub mod prelude;
pub mod qb;
pub mod record;
pub mod transaction;
pub mod value;

pub use binder::Binder;
pub use bulk::{BulkInsert, BulkReport};
pub use client::{Connection, Executor};
pub use condition::{Condition, Connective, Op};
pub use config::{DbConfig, Driver, NoDecryptor, PasswordDecryptor};
pub use dialect::{Dialect, escape_injection};
pub use error::{DbError, DbResult, StatementErrorKind};
pub use monitor::{
    CompositeMonitor, NoopMonitor, QueryContext, QueryMonitor, QueryResult, QueryStats,
    QueryType, StatsMonitor, TracingMonitor,
};
pub use pool::{ConnectionManager, ConnectionManagerBuilder};
pub use record::{ColumnKind, FromRecord, RecordRow, RecordSet};
pub use transaction::{DbTrx, DbTrxUpdate};
pub use value::SqlValue;

// Re-export qb module for easy access
pub use qb::{
    BuiltQuery, CreateQb, DeleteQb, Expr, ExprGroup, MutationQb, ParamList, RetrieveQb, SqlQb,
    UpdateQb, create, delete, retrieve, update,
};
