//! Types for the SQLite authorizer callback.
//!
//! See [`sqlite3_set_authorizer`](https://sqlite.org/c3ref/set_authorizer.html)
//! and the [action code constants](https://sqlite.org/c3ref/c_alter_table.html).

extern crate libsqlite3_sys as ffi;

use std::os::raw as libc;

/// Generates [`AuthorizerAction`] together with both directions of its
/// mapping to the native action codes.
macro_rules! authorizer_actions {
    ($($(#[$doc:meta])* $variant:ident => $code:ident,)*) => {
        /// Authorizer action codes.
        ///
        /// These correspond to the action codes passed to the authorizer
        /// callback by SQLite. The callback is invoked during SQL statement
        /// compilation, and again if a schema change forces recompilation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum AuthorizerAction {
            $($(#[$doc])* $variant,)*
            /// Unknown action code (for future compatibility)
            Unknown(i32),
        }

        impl AuthorizerAction {
            /// Converts a native action code to the enum variant.
            pub fn from_ffi(code: libc::c_int) -> Self {
                match code {
                    $(ffi::$code => Self::$variant,)*
                    other => Self::Unknown(other),
                }
            }

            /// The native action code for this action.
            pub fn to_ffi(self) -> libc::c_int {
                match self {
                    $(Self::$variant => ffi::$code,)*
                    Self::Unknown(code) => code,
                }
            }
        }
    };
}

authorizer_actions! {
    /// CREATE INDEX
    CreateIndex => SQLITE_CREATE_INDEX,
    /// CREATE TABLE
    CreateTable => SQLITE_CREATE_TABLE,
    /// CREATE TEMP INDEX
    CreateTempIndex => SQLITE_CREATE_TEMP_INDEX,
    /// CREATE TEMP TABLE
    CreateTempTable => SQLITE_CREATE_TEMP_TABLE,
    /// CREATE TEMP TRIGGER
    CreateTempTrigger => SQLITE_CREATE_TEMP_TRIGGER,
    /// CREATE TEMP VIEW
    CreateTempView => SQLITE_CREATE_TEMP_VIEW,
    /// CREATE TRIGGER
    CreateTrigger => SQLITE_CREATE_TRIGGER,
    /// CREATE VIEW
    CreateView => SQLITE_CREATE_VIEW,
    /// DELETE
    Delete => SQLITE_DELETE,
    /// DROP INDEX
    DropIndex => SQLITE_DROP_INDEX,
    /// DROP TABLE
    DropTable => SQLITE_DROP_TABLE,
    /// DROP TEMP INDEX
    DropTempIndex => SQLITE_DROP_TEMP_INDEX,
    /// DROP TEMP TABLE
    DropTempTable => SQLITE_DROP_TEMP_TABLE,
    /// DROP TEMP TRIGGER
    DropTempTrigger => SQLITE_DROP_TEMP_TRIGGER,
    /// DROP TEMP VIEW
    DropTempView => SQLITE_DROP_TEMP_VIEW,
    /// DROP TRIGGER
    DropTrigger => SQLITE_DROP_TRIGGER,
    /// DROP VIEW
    DropView => SQLITE_DROP_VIEW,
    /// INSERT
    Insert => SQLITE_INSERT,
    /// PRAGMA
    Pragma => SQLITE_PRAGMA,
    /// Read a column value
    Read => SQLITE_READ,
    /// SELECT statement
    Select => SQLITE_SELECT,
    /// BEGIN/COMMIT/ROLLBACK
    Transaction => SQLITE_TRANSACTION,
    /// UPDATE
    Update => SQLITE_UPDATE,
    /// ATTACH DATABASE
    Attach => SQLITE_ATTACH,
    /// DETACH DATABASE
    Detach => SQLITE_DETACH,
    /// ALTER TABLE
    AlterTable => SQLITE_ALTER_TABLE,
    /// REINDEX
    Reindex => SQLITE_REINDEX,
    /// ANALYZE
    Analyze => SQLITE_ANALYZE,
    /// CREATE VIRTUAL TABLE
    CreateVTable => SQLITE_CREATE_VTABLE,
    /// DROP VIRTUAL TABLE
    DropVTable => SQLITE_DROP_VTABLE,
    /// SQL function call
    Function => SQLITE_FUNCTION,
    /// SAVEPOINT
    Savepoint => SQLITE_SAVEPOINT,
    /// Recursive SELECT
    Recursive => SQLITE_RECURSIVE,
}

impl AuthorizerAction {
    /// Returns `true` if this action modifies the database schema.
    ///
    /// ```rust
    /// use sqlite_hooks::AuthorizerAction;
    ///
    /// assert!(AuthorizerAction::CreateTable.is_schema_modifying());
    /// assert!(AuthorizerAction::AlterTable.is_schema_modifying());
    /// assert!(!AuthorizerAction::Select.is_schema_modifying());
    /// assert!(!AuthorizerAction::Delete.is_schema_modifying());
    /// ```
    pub fn is_schema_modifying(&self) -> bool {
        matches!(
            self,
            Self::CreateIndex
                | Self::CreateTable
                | Self::CreateTempIndex
                | Self::CreateTempTable
                | Self::CreateTempTrigger
                | Self::CreateTempView
                | Self::CreateTrigger
                | Self::CreateView
                | Self::CreateVTable
                | Self::DropIndex
                | Self::DropTable
                | Self::DropTempIndex
                | Self::DropTempTable
                | Self::DropTempTrigger
                | Self::DropTempView
                | Self::DropTrigger
                | Self::DropView
                | Self::DropVTable
                | Self::AlterTable
        )
    }
}

/// Context information passed to the authorizer callback.
///
/// Native arguments SQLite leaves as null pointers arrive as `None`. The
/// meaning of the string arguments depends on the action:
///
/// | Action | arg1 | arg2 | db_name | accessor |
/// |--------|------|------|---------|----------|
/// | `CreateIndex` | Index name | Table name | db | - |
/// | `CreateTable` | Table name | - | db | - |
/// | `Delete` | Table name | - | db | - |
/// | `DropTable` | Table name | - | db | - |
/// | `Insert` | Table name | - | db | - |
/// | `Pragma` | Pragma name | Argument | db | - |
/// | `Read` | Table name | Column name | db | trigger/view |
/// | `Select` | - | - | - | - |
/// | `Transaction` | Operation | - | - | - |
/// | `Update` | Table name | Column name | db | - |
/// | `Attach` | Filename | - | - | - |
/// | `AlterTable` | Database name | Table name | - | - |
/// | `Function` | - | Function name | - | - |
/// | `Savepoint` | Operation | Name | - | - |
///
/// Where "db" means `"main"`, `"temp"`, or an `ATTACH` alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizerContext<'a> {
    /// The action being authorized.
    pub action: AuthorizerAction,
    /// First argument (meaning depends on action).
    pub arg1: Option<&'a str>,
    /// Second argument (meaning depends on action).
    pub arg2: Option<&'a str>,
    /// Database name (`"main"`, `"temp"`, or `ATTACH` alias).
    pub db_name: Option<&'a str>,
    /// Trigger or view name causing the access (if applicable).
    pub accessor: Option<&'a str>,
}

/// Authorizer callback decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizerDecision {
    /// Allow the operation to proceed (`SQLITE_OK`).
    Allow,
    /// Ignore the operation (`SQLITE_IGNORE`).
    ///
    /// For `Read` actions, returns `NULL` instead of the column value.
    /// For other actions, treats the operation as a no-op.
    Ignore,
    /// Deny the operation (`SQLITE_DENY`).
    ///
    /// Causes the entire SQL statement to fail with an authorization error.
    Deny,
}

impl AuthorizerDecision {
    /// Converts the decision to the native return code.
    pub fn to_ffi(self) -> libc::c_int {
        match self {
            Self::Allow => ffi::SQLITE_OK,
            Self::Ignore => ffi::SQLITE_IGNORE,
            Self::Deny => ffi::SQLITE_DENY,
        }
    }

    /// Converts a native return code back to a decision.
    ///
    /// Returns `None` for codes SQLite does not accept from an authorizer.
    pub fn from_ffi(code: libc::c_int) -> Option<Self> {
        match code {
            ffi::SQLITE_OK => Some(Self::Allow),
            ffi::SQLITE_IGNORE => Some(Self::Ignore),
            ffi::SQLITE_DENY => Some(Self::Deny),
            _ => None,
        }
    }
}
