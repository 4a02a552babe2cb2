//! Fluent query builders.
//!
//! Four builders share one WHERE layer ([`ExprGroup`]) and one pair of render
//! modes:
//!
//! - `build()` inlines every value as a quoted/escaped literal;
//! - `build_prepared()` emits placeholders plus the [`ParamList`] they bind to,
//!   in exactly the order the placeholders appear.
//!
//! # Usage
//!
//! ```ignore
//! use fluentsql::qb;
//! use fluentsql::{Op, SqlQb, MutationQb};
//!
//! // SELECT
//! let page = qb::retrieve("users")
//!     .eq("status", "active")
//!     .where_op("created_at", Op::Ge, since)
//!     .order_by_desc("created_at")
//!     .paging(2, 20)
//!     .fetch_paged(&mut conn)
//!     .await?;
//!
//! // INSERT
//! let id = qb::create("users")
//!     .set("username", "alice")
//!     .set("email", "alice@example.com")
//!     .insert_last_id(&mut conn)
//!     .await?;
//!
//! // UPDATE
//! qb::update("users")
//!     .set("status", "inactive")
//!     .eq("id", id)
//!     .execute(&mut conn)
//!     .await?;
//!
//! // DELETE
//! qb::delete("users")
//!     .eq("id", id)
//!     .execute(&mut conn)
//!     .await?;
//! ```

mod create;
mod delete;
mod expr;
pub(crate) mod param;
mod retrieve;
mod traits;
mod update;

pub use create::CreateQb;
pub use delete::DeleteQb;
pub use expr::{Expr, ExprGroup};
pub use param::{ColumnValues, ParamList};
pub use retrieve::RetrieveQb;
pub use traits::{BuiltQuery, MutationQb, SqlQb};
pub use update::UpdateQb;

/// Create a SELECT query builder for the given table.
///
/// # Example
/// ```ignore
/// let qb = fluentsql::qb::retrieve("users u").left_join("orders o", "u.id = o.user_id");
/// ```
pub fn retrieve(table: &str) -> RetrieveQb {
    RetrieveQb::new(table)
}

/// Create an INSERT query builder for the given table.
pub fn create(table: &str) -> CreateQb {
    CreateQb::new(table)
}

/// Create an UPDATE query builder for the given table.
///
/// `build()` fails with `UnsafeStatementRejected` until a WHERE condition is added.
pub fn update(table: &str) -> UpdateQb {
    UpdateQb::new(table)
}

/// Create a DELETE query builder for the given table.
///
/// `build()` fails with `UnsafeStatementRejected` until a WHERE condition is added.
pub fn delete(table: &str) -> DeleteQb {
    DeleteQb::new(table)
}

#[cfg(test)]
mod tests;
