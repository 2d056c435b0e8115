//! Types for the SQLite trace callback.
//!
//! See [`sqlite3_trace_v2`](https://sqlite.org/c3ref/trace_v2.html)
//! and the [trace event codes](https://sqlite.org/c3ref/c_trace.html).

use core::ops::BitOr;

/// Trace event mask (bitmask) for selecting which events to receive.
///
/// ```rust
/// # use sqlite_hooks::TraceFlags;
/// let mask = TraceFlags::STMT | TraceFlags::PROFILE;
/// assert!(mask.contains(TraceFlags::STMT));
/// assert!(!mask.contains(TraceFlags::ROW));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceFlags(u32);

impl TraceFlags {
    /// Statement start event.
    ///
    /// Fires when a prepared statement first begins executing.
    /// The callback receives the SQL text.
    pub const STMT: Self = Self(0x01);

    /// Statement profiling event.
    ///
    /// Fires when a prepared statement finishes executing.
    /// The callback receives the SQL text and elapsed time in nanoseconds.
    pub const PROFILE: Self = Self(0x02);

    /// Row event.
    ///
    /// **Performance Warning**: Fires for EVERY row returned by a query.
    /// Prefer `STMT` and `PROFILE` for most logging use cases.
    pub const ROW: Self = Self(0x04);

    /// Connection close event.
    ///
    /// Fires while the connection is being closed.
    pub const CLOSE: Self = Self(0x08);

    /// All events.
    ///
    /// Use with caution: includes `ROW` which is very frequent.
    pub const ALL: Self = Self(0x0F);

    /// Returns the raw bitmask value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Creates a new mask from raw bits.
    ///
    /// Bits outside of [`ALL`](Self::ALL) are discarded.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Returns true if this mask contains the given flag.
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns true if no event is selected.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Trace events delivered to the trace callback.
///
/// The callback receives one of these events based on the mask
/// registered with [`on_trace`](crate::SqliteConnection::on_trace).
/// Borrowed text is only valid for the duration of the callback; copy it
/// (`to_owned()`) to keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TraceEvent<'a> {
    /// A prepared statement is beginning to execute.
    ///
    /// Contains the unexpanded SQL text (with parameter placeholders).
    /// Statements run by triggers are reported as `-- TRIGGER name`.
    Statement {
        /// The SQL text of the statement.
        sql: &'a str,
        /// Whether the statement leaves the database unchanged
        /// ([`sqlite3_stmt_readonly`](https://sqlite.org/c3ref/stmt_readonly.html)).
        readonly: bool,
    },

    /// A prepared statement has finished executing.
    Profile {
        /// The SQL text of the statement.
        sql: &'a str,
        /// Time taken in nanoseconds.
        duration_ns: u64,
    },

    /// A row has been returned from a query.
    ///
    /// **Note**: This fires for every row and does not include row data.
    Row,

    /// The database connection is closing.
    Close,
}

impl<'a> TraceEvent<'a> {
    /// The SQL text carried by `Statement` and `Profile` events.
    pub fn sql(&self) -> Option<&'a str> {
        match *self {
            TraceEvent::Statement { sql, .. } | TraceEvent::Profile { sql, .. } => Some(sql),
            TraceEvent::Row | TraceEvent::Close => None,
        }
    }

    /// The flag that selects this kind of event.
    pub fn flag(&self) -> TraceFlags {
        match self {
            TraceEvent::Statement { .. } => TraceFlags::STMT,
            TraceEvent::Profile { .. } => TraceFlags::PROFILE,
            TraceEvent::Row => TraceFlags::ROW,
            TraceEvent::Close => TraceFlags::CLOSE,
        }
    }
}
