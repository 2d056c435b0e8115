//! The SQLite connection and the hook types it exposes.

mod authorizer;
mod raw;
mod registry;
mod trace;

pub use self::authorizer::{AuthorizerAction, AuthorizerContext, AuthorizerDecision};
pub use self::trace::{TraceEvent, TraceFlags};

use self::raw::RawConnection;
use crate::config::HookConfig;
use crate::result::*;

/// A connection to an SQLite database carrying trace and authorizer hooks.
///
/// Supported connection URLs are:
///
/// - File paths (`test.db`)
/// - [URIs](https://sqlite.org/uri.html) (`file://test.db`, or `sqlite://test.db`)
/// - Special identifiers (`:memory:`)
///
/// # Hooks and threads
///
/// Hooks run synchronously on the thread executing the statement that
/// triggers them; SQLite waits for the callback to return. A callback that
/// blocks therefore blocks this connection, and a callback must not try to
/// use the connection that invoked it.
///
/// The connection is `Send` but not `Sync`, and every registration takes
/// `&mut self`, so a hook can never be replaced or removed while a statement
/// on another thread is still calling it.
#[allow(missing_debug_implementations)]
pub struct SqliteConnection {
    raw_connection: RawConnection,
}

// SAFETY: the native handle is only reached through `&mut self` or
// `&self` on a non-`Sync` type, and every registered callback is `Send`.
// The reference counts inside the hook registry are never shared outside
// the thread currently driving the connection.
#[allow(unsafe_code)]
unsafe impl Send for SqliteConnection {}

impl SqliteConnection {
    /// Opens a connection with the default [`HookConfig`].
    pub fn establish(database_url: &str) -> ConnectionResult<Self> {
        Self::establish_with_config(database_url, HookConfig::default())
    }

    /// Opens a connection whose hooks use `config`.
    pub fn establish_with_config(database_url: &str, config: HookConfig) -> ConnectionResult<Self> {
        let raw_connection = RawConnection::establish(database_url, config)?;
        tracing::debug!(url = database_url, "established sqlite connection");
        Ok(Self { raw_connection })
    }

    /// Executes one or more `;`-separated SQL statements, discarding any
    /// rows they return.
    ///
    /// A statement an authorizer denied fails with
    /// [`DatabaseErrorKind::NotAuthorized`].
    pub fn exec(&mut self, sql: &str) -> QueryResult<()> {
        self.raw_connection.exec(sql)
    }

    /// Registers a trace callback for SQL execution monitoring.
    ///
    /// The callback receives events based on the provided [`TraceFlags`]
    /// mask:
    ///
    /// - `STMT`: statement start (receives SQL text)
    /// - `PROFILE`: statement complete (receives SQL text and elapsed time)
    /// - `ROW`: each row returned (no data, very frequent!)
    /// - `CLOSE`: connection close
    ///
    /// Only one trace callback can be active at a time per connection.
    /// Registering a new one replaces the previous; an empty mask removes it.
    /// Events are delivered one at a time, in the order SQLite emits them.
    ///
    /// A panic in the callback is caught before it reaches SQLite, the event
    /// is dropped, and the panic is recorded in
    /// [`hook_failures`](Self::hook_failures).
    ///
    /// See: [`sqlite3_trace_v2`](https://sqlite.org/c3ref/trace_v2.html)
    ///
    /// # Example
    ///
    /// ```rust
    /// use sqlite_hooks::{SqliteConnection, TraceEvent, TraceFlags};
    ///
    /// # fn main() -> sqlite_hooks::QueryResult<()> {
    /// let mut conn = SqliteConnection::establish(":memory:")?;
    /// conn.on_trace(TraceFlags::STMT | TraceFlags::PROFILE, |event| match event {
    ///     TraceEvent::Statement { sql, .. } => println!("Executing: {sql}"),
    ///     TraceEvent::Profile { sql, duration_ns } => println!("{sql} took {duration_ns} ns"),
    ///     _ => {}
    /// });
    /// conn.exec("SELECT 1")?;
    ///
    /// // Later: remove the trace callback
    /// conn.remove_trace();
    /// # Ok(())
    /// # }
    /// ```
    pub fn on_trace<F>(&mut self, mask: TraceFlags, hook: F)
    where
        F: FnMut(TraceEvent<'_>) + Send + 'static,
    {
        self.raw_connection.set_trace(mask, Box::new(hook));
    }

    /// Like [`on_trace`](Self::on_trace), but hands `user_data` to every
    /// invocation of `hook`.
    ///
    /// `user_data` is owned by the connection until the callback is replaced
    /// or removed, or the connection is closed.
    ///
    /// ```rust
    /// use sqlite_hooks::{SqliteConnection, TraceFlags};
    ///
    /// # fn main() -> sqlite_hooks::QueryResult<()> {
    /// let mut conn = SqliteConnection::establish(":memory:")?;
    /// conn.on_trace_with(TraceFlags::STMT, 0usize, |count, _event| *count += 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn on_trace_with<D, F>(&mut self, mask: TraceFlags, user_data: D, mut hook: F)
    where
        D: Send + 'static,
        F: FnMut(&mut D, TraceEvent<'_>) + Send + 'static,
    {
        let mut user_data = user_data;
        self.on_trace(mask, move |event| hook(&mut user_data, event));
    }

    /// Registers a callback for read-only statement execution (SELECT,
    /// read-only PRAGMA, etc.). Fires once per statement, not per row.
    ///
    /// Uses [`sqlite3_stmt_readonly`](https://sqlite.org/c3ref/stmt_readonly.html)
    /// rather than inspecting the SQL text.
    ///
    /// This replaces any existing trace callback. If you need both, use
    /// [`on_trace`](Self::on_trace) and check the `readonly` field of
    /// [`TraceEvent::Statement`].
    pub fn on_read<F>(&mut self, mut hook: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_trace(TraceFlags::STMT, move |event| {
            if let TraceEvent::Statement {
                sql,
                readonly: true,
            } = event
            {
                hook(sql);
            }
        });
    }

    /// Removes the trace callback.
    ///
    /// Does nothing if no trace callback is registered.
    pub fn remove_trace(&mut self) {
        self.raw_connection.remove_trace();
    }

    /// Registers an authorizer callback for SQL compilation access control.
    ///
    /// The callback is invoked while SQLite compiles a statement, once per
    /// action the statement performs, and its [`AuthorizerDecision`] allows,
    /// ignores, or denies that action. A denied action makes the statement
    /// fail with [`DatabaseErrorKind::NotAuthorized`].
    ///
    /// **Security Note**: The authorizer is only called during statement
    /// compilation, NOT during execution. Use it as defense-in-depth, not as
    /// a sole security mechanism.
    ///
    /// Only one authorizer can be active at a time per connection. If SQLite
    /// rejects the registration, an [`Error::Registration`] is returned and
    /// the previous authorizer stays active.
    ///
    /// A panic in the callback is caught before it reaches SQLite and
    /// replaced by [`HookConfig::authorizer_fallback`].
    ///
    /// See: [`sqlite3_set_authorizer`](https://sqlite.org/c3ref/set_authorizer.html)
    ///
    /// # Example
    ///
    /// ```rust
    /// use sqlite_hooks::{AuthorizerAction, AuthorizerDecision, SqliteConnection};
    ///
    /// # fn main() -> sqlite_hooks::QueryResult<()> {
    /// let mut conn = SqliteConnection::establish(":memory:")?;
    /// conn.on_authorize(|ctx| match ctx.action {
    ///     AuthorizerAction::Delete => AuthorizerDecision::Deny,
    ///     AuthorizerAction::DropTable | AuthorizerAction::DropIndex => AuthorizerDecision::Deny,
    ///     _ => AuthorizerDecision::Allow,
    /// })?;
    ///
    /// // Later: remove the authorizer
    /// conn.remove_authorizer()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn on_authorize<F>(&mut self, hook: F) -> QueryResult<()>
    where
        F: FnMut(AuthorizerContext<'_>) -> AuthorizerDecision + Send + 'static,
    {
        self.raw_connection.set_authorizer(Box::new(hook))
    }

    /// Like [`on_authorize`](Self::on_authorize), but hands `user_data` to
    /// every invocation of `hook`.
    pub fn on_authorize_with<D, F>(&mut self, user_data: D, mut hook: F) -> QueryResult<()>
    where
        D: Send + 'static,
        F: FnMut(&mut D, AuthorizerContext<'_>) -> AuthorizerDecision + Send + 'static,
    {
        let mut user_data = user_data;
        self.on_authorize(move |ctx| hook(&mut user_data, ctx))
    }

    /// Removes the authorizer callback.
    ///
    /// Does nothing if no authorizer is registered.
    pub fn remove_authorizer(&mut self) -> QueryResult<()> {
        self.raw_connection.remove_authorizer()
    }

    /// Callback failures contained at the FFI boundary since the last call
    /// to [`take_hook_failures`](Self::take_hook_failures).
    ///
    /// At most [`HookConfig::failure_log_capacity`] entries are kept.
    pub fn hook_failures(&self) -> Vec<HookFailure> {
        self.raw_connection.hook_failures()
    }

    /// Returns and clears the recorded callback failures.
    pub fn take_hook_failures(&mut self) -> Vec<HookFailure> {
        self.raw_connection.take_hook_failures()
    }

    /// Closes the connection, reporting a failure to close.
    ///
    /// Dropping the connection closes it too, logging any failure instead.
    pub fn close(mut self) -> QueryResult<()> {
        self.raw_connection.close()
    }
}
