//! Safe Rust hooks for SQLite's trace and authorizer callbacks.
//!
//! [`SqliteConnection`] wraps a native `sqlite3` handle and lets you attach
//! two kinds of callbacks to it:
//!
//! - a **trace** callback ([`SqliteConnection::on_trace`]) that receives the
//!   text of every statement SQLite runs, optionally with profiling data,
//! - an **authorizer** callback ([`SqliteConnection::on_authorize`]) that
//!   SQLite consults while compiling a statement, and whose
//!   [`AuthorizerDecision`] allows, ignores, or denies each action.
//!
//! Both callbacks run synchronously on the thread executing the statement.
//! A panic inside a callback never unwinds into SQLite: it is logged,
//! recorded on the connection (see [`SqliteConnection::hook_failures`]), and
//! replaced by a safe result.
//!
//! ```rust
//! use sqlite_hooks::{AuthorizerAction, AuthorizerDecision, SqliteConnection, TraceFlags};
//! use std::sync::{Arc, Mutex};
//!
//! # fn main() -> sqlite_hooks::QueryResult<()> {
//! let mut conn = SqliteConnection::establish(":memory:")?;
//!
//! let statements = Arc::new(Mutex::new(Vec::new()));
//! let sink = statements.clone();
//! conn.on_trace(TraceFlags::STMT, move |event| {
//!     if let sqlite_hooks::TraceEvent::Statement { sql, .. } = event {
//!         sink.lock().unwrap().push(sql.to_owned());
//!     }
//! });
//!
//! conn.on_authorize(|ctx| match ctx.action {
//!     AuthorizerAction::DropTable => AuthorizerDecision::Deny,
//!     _ => AuthorizerDecision::Allow,
//! })?;
//!
//! conn.exec("CREATE TABLE users (id INTEGER PRIMARY KEY)")?;
//! assert!(conn.exec("DROP TABLE users").is_err());
//! assert_eq!(
//!     statements.lock().unwrap()[0],
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY)"
//! );
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations)]

pub mod config;
pub mod connection;
pub mod result;

pub use crate::config::HookConfig;
pub use crate::connection::{
    AuthorizerAction, AuthorizerContext, AuthorizerDecision, SqliteConnection, TraceEvent,
    TraceFlags,
};
pub use crate::result::{
    ConnectionResult, DatabaseErrorKind, Error, HookFailure, HookKind, QueryResult,
};
