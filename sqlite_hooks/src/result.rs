//! Errors, type aliases, and helper functions related to connection
//! handling and hook registration.

extern crate libsqlite3_sys as ffi;

use std::ffi::NulError;
use std::fmt;
use std::os::raw as libc;

/// The kind of hook a registration or a contained failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// The `sqlite3_trace_v2` hook.
    Trace,
    /// The `sqlite3_set_authorizer` hook.
    Authorizer,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Trace => f.write_str("trace"),
            HookKind::Authorizer => f.write_str("authorizer"),
        }
    }
}

/// Represents all the ways that a call into this crate can fail.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection could not be opened.
    #[error("unable to open database: {0}")]
    BadConnection(String),

    /// A string passed to SQLite contained an interior nul byte.
    #[error(transparent)]
    InvalidCString(#[from] NulError),

    /// SQLite reported an error while executing SQL.
    ///
    /// A statement blocked by an authorizer returning
    /// [`AuthorizerDecision::Deny`](crate::AuthorizerDecision::Deny)
    /// surfaces here with [`DatabaseErrorKind::NotAuthorized`].
    #[error("{1}")]
    DatabaseError(DatabaseErrorKind, String),

    /// SQLite rejected a hook registration.
    #[error("failed to register {hook} hook (code {code}): {message}")]
    Registration {
        /// The hook being registered or removed.
        hook: HookKind,
        /// The raw SQLite result code.
        code: i32,
        /// SQLite's description of the failure.
        message: String,
    },

    /// `sqlite3_close` failed.
    #[error("error closing SQLite connection: {0}")]
    Close(String),
}

/// A specialized result type for connection operations.
pub type QueryResult<T> = Result<T, Error>;

/// A specialized result type for establishing connections.
pub type ConnectionResult<T> = Result<T, Error>;

/// The kind of database error that occurred.
///
/// Derived from the primary SQLite result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DatabaseErrorKind {
    /// An authorizer denied the statement (`SQLITE_AUTH`).
    NotAuthorized,
    /// The database file is locked (`SQLITE_BUSY`).
    Busy,
    /// An attempt was made to write a read-only database (`SQLITE_READONLY`).
    ReadOnly,
    /// The library was used incorrectly (`SQLITE_MISUSE`).
    Misuse,
    /// Any other primary result code.
    Unknown(i32),
}

impl DatabaseErrorKind {
    pub(crate) fn from_code(code: libc::c_int) -> Self {
        match code & 0xff {
            ffi::SQLITE_AUTH => DatabaseErrorKind::NotAuthorized,
            ffi::SQLITE_BUSY => DatabaseErrorKind::Busy,
            ffi::SQLITE_READONLY => DatabaseErrorKind::ReadOnly,
            ffi::SQLITE_MISUSE => DatabaseErrorKind::Misuse,
            other => DatabaseErrorKind::Unknown(other),
        }
    }
}

/// A callback failure that was contained at the FFI boundary.
///
/// These never propagate to the caller of the statement that triggered the
/// hook. They are logged through `tracing` and recorded on the connection;
/// see [`SqliteConnection::hook_failures`](crate::SqliteConnection::hook_failures).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HookFailure {
    /// The callback panicked.
    CallbackPanic {
        /// The hook whose callback panicked.
        hook: HookKind,
        /// The panic payload, if it was a string.
        message: String,
    },
    /// The hook fired again while its callback was still running.
    Reentrant {
        /// The hook that was re-entered.
        hook: HookKind,
    },
}

impl HookFailure {
    /// The hook this failure belongs to.
    pub fn hook(&self) -> HookKind {
        match self {
            HookFailure::CallbackPanic { hook, .. } | HookFailure::Reentrant { hook } => *hook,
        }
    }
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookFailure::CallbackPanic { hook, message } => {
                write!(f, "{hook} callback panicked: {message}")
            }
            HookFailure::Reentrant { hook } => {
                write!(f, "{hook} callback was re-entered while running")
            }
        }
    }
}

pub(crate) fn error_message(err_code: libc::c_int) -> &'static str {
    ffi::code_to_str(err_code)
}
