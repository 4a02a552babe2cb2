//! Statement monitoring.
//!
//! Every statement executed through a [`Connection`](crate::Connection)
//! is reported to the [`QueryMonitor`] configured on the
//! [`ConnectionManager`](crate::ConnectionManager): query type, SQL, elapsed
//! time and result size.
//!
//! # Example
//!
//! ```rust,ignore
//! use fluentsql::monitor::{CompositeMonitor, StatsMonitor, TracingMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let stats = Arc::new(StatsMonitor::new());
//! let monitor = CompositeMonitor::new()
//!     .add(TracingMonitor::new().slow_threshold(Duration::from_millis(500)))
//!     .add_arc(stats.clone());
//!
//! let manager = ConnectionManager::builder(config).monitor(monitor).build()?;
//! // ...
//! println!("{:?}", stats.stats());
//! ```

mod monitors;
mod types;


pub use monitors::{CompositeMonitor, NoopMonitor, QueryStats, StatsMonitor, TracingMonitor};
pub use types::{QueryContext, QueryMonitor, QueryResult, QueryType};

/// Longest prefix of `sql` of at most `max_bytes` bytes ending on a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
