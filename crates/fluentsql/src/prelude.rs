//! Convenient imports for typical `fluentsql` usage.
//!
//! ```ignore
//! use fluentsql::prelude::*;
//! ```

pub use crate::{
    BulkInsert, Connection, ConnectionManager, DbConfig, DbError, DbResult, DbTrx, DbTrxUpdate,
    Dialect, Executor, MutationQb, RecordRow, RecordSet, SqlQb, SqlValue, create, delete,
    retrieve, update,
};
pub use crate::{Condition, Op};
