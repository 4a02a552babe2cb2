//! Error types for fluentsql

use std::time::Duration;
use thiserror::Error;

/// Result type alias for fluentsql operations
pub type DbResult<T> = Result<T, DbError>;

/// Coarse classification of a driver-surfaced statement failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementErrorKind {
    /// The connection broke or could not be used.
    Connection,
    /// The server rejected the statement text.
    Syntax,
    /// A unique/foreign-key/check/not-null constraint was violated.
    ConstraintViolation,
    /// Anything else the driver reported.
    Other,
}

impl std::fmt::Display for StatementErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Syntax => "syntax",
            Self::ConstraintViolation => "constraint violation",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Error types for database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// Bad configuration, missing driver, or a pool that is not (or no longer) available
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement failed on the server or in the driver
    #[error("Statement error ({kind}): {message}")]
    Statement {
        kind: StatementErrorKind,
        message: String,
    },

    /// DELETE/UPDATE without a WHERE clause
    #[error("Unsafe statement rejected: {0}")]
    UnsafeStatementRejected(String),

    /// Operator/value pairing that cannot be rendered
    #[error("Invalid condition on column '{column}': {reason}")]
    InvalidCondition { column: String, reason: String },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Statement timeout error
    #[error("Statement timeout after {0:?}")]
    Timeout(Duration),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A statement inside a multi-statement unit of work failed; everything was rolled back.
    ///
    /// `counts` holds the affected-row count per submitted statement; entries from
    /// `index` onwards are `-1`.
    #[error("Statement #{index} failed, unit of work rolled back: {source} [sql: {sql}]")]
    BatchFailed {
        index: usize,
        sql: String,
        counts: Vec<i64>,
        #[source]
        source: Box<DbError>,
    },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid condition error
    pub fn invalid_condition(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCondition {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Create a statement error with an explicit classification
    pub fn statement(kind: StatementErrorKind, message: impl Into<String>) -> Self {
        Self::Statement {
            kind,
            message: message.into(),
        }
    }

    /// Classification of a statement error, if this is one.
    pub fn statement_kind(&self) -> Option<StatementErrorKind> {
        match self {
            Self::Statement { kind, .. } => Some(*kind),
            Self::Connection(_) => Some(StatementErrorKind::Connection),
            Self::BatchFailed { source, .. } => source.statement_kind(),
            _ => None,
        }
    }

    /// Check if this is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        self.statement_kind() == Some(StatementErrorKind::ConstraintViolation)
    }

    /// Check if this is an unsafe statement rejection
    pub fn is_unsafe_statement(&self) -> bool {
        matches!(self, Self::UnsafeStatementRejected(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Per-statement affected-row counts carried by a failed unit of work.
    pub fn batch_counts(&self) -> Option<&[i64]> {
        match self {
            Self::BatchFailed { counts, .. } => Some(counts),
            _ => None,
        }
    }

    /// Parse a tokio_postgres error into a classified DbError
    pub fn from_pg_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code();
            let message = match db_err.constraint() {
                Some(constraint) => format!("{}: {}", constraint, db_err.message()),
                None => db_err.message().to_string(),
            };
            return Self::statement(classify_sqlstate(code), format!("[{code}] {message}"));
        }
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        Self::statement(classify_message(&err.to_string()), err.to_string())
    }
}

/// Map a SQLSTATE code to a statement error category.
pub(crate) fn classify_sqlstate(code: &str) -> StatementErrorKind {
    match code.get(..2) {
        Some("08") | Some("57") => StatementErrorKind::Connection,
        Some("23") => StatementErrorKind::ConstraintViolation,
        Some("42") => StatementErrorKind::Syntax,
        _ => StatementErrorKind::Other,
    }
}

/// Fallback classification when the driver only hands us a message.
pub(crate) fn classify_message(message: &str) -> StatementErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("connection") || lower.contains("broken pipe") || lower.contains("closed") {
        StatementErrorKind::Connection
    } else if lower.contains("syntax") {
        StatementErrorKind::Syntax
    } else if lower.contains("duplicate")
        || lower.contains("constraint")
        || lower.contains("foreign key")
        || lower.contains("cannot be null")
    {
        StatementErrorKind::ConstraintViolation
    } else {
        StatementErrorKind::Other
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::from_pg_error(err)
    }
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Closed => {
                Self::Configuration("connection pool is closed".to_string())
            }
            deadpool_postgres::PoolError::Backend(e) => Self::from_pg_error(e),
            other => Self::Pool(other.to_string()),
        }
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for DbError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(server) => {
                let kind = classify_mysql_code(server.code, &server.state);
                Self::statement(kind, format!("[{}] {}", server.code, server.message))
            }
            mysql_async::Error::Io(e) => Self::Connection(e.to_string()),
            mysql_async::Error::Url(e) => Self::Configuration(e.to_string()),
            other => Self::statement(classify_message(&other.to_string()), other.to_string()),
        }
    }
}

/// Map a MySQL server error code (and SQLSTATE) to a statement error category.
#[cfg(feature = "mysql")]
pub(crate) fn classify_mysql_code(code: u16, state: &str) -> StatementErrorKind {
    match code {
        1062 | 1048 | 1451 | 1452 | 1216 | 1217 | 3819 => StatementErrorKind::ConstraintViolation,
        1064 | 1054 | 1146 | 1149 => StatementErrorKind::Syntax,
        2002 | 2003 | 2006 | 2013 | 1040 | 1053 => StatementErrorKind::Connection,
        _ => classify_sqlstate(state),
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("invalid JSON configuration: {err}"))
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
