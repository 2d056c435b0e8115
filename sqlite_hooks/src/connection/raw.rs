#![allow(unsafe_code)] // ffi calls
extern crate libsqlite3_sys as ffi;

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::os::raw as libc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::{self, NonNull};

use super::authorizer::{AuthorizerAction, AuthorizerContext, AuthorizerDecision};
use super::registry::{
    AuthorizerCallback, CallbackContext, HookRegistry, TraceCallback, TraceHook,
};
use super::trace::{TraceEvent, TraceFlags};
use crate::config::HookConfig;
use crate::result::*;

#[allow(missing_debug_implementations)]
pub(super) struct RawConnection {
    pub(super) internal_connection: NonNull<ffi::sqlite3>,
    /// Callbacks for both hooks. Boxed so that its address, which SQLite
    /// holds as the hooks' user data, stays fixed for the connection's
    /// lifetime. Dropped only after `sqlite3_close`.
    hooks: Box<HookRegistry>,
    closed: bool,
}

impl RawConnection {
    pub(super) fn establish(database_url: &str, config: HookConfig) -> ConnectionResult<Self> {
        let mut conn_pointer = ptr::null_mut();

        let database_url = if database_url.starts_with("sqlite://") {
            CString::new(database_url.replacen("sqlite://", "file:", 1))?
        } else {
            CString::new(database_url)?
        };
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_URI;
        let connection_status = unsafe {
            ffi::sqlite3_open_v2(database_url.as_ptr(), &mut conn_pointer, flags, ptr::null())
        };

        match (connection_status, NonNull::new(conn_pointer)) {
            (ffi::SQLITE_OK, Some(conn_pointer)) => Ok(RawConnection {
                internal_connection: conn_pointer,
                hooks: HookRegistry::new(config),
                closed: false,
            }),
            (err_code, handle) => {
                let message = match handle {
                    // SQLite hands out a handle even when opening fails; it
                    // carries the detailed message and must still be closed.
                    Some(handle) => unsafe {
                        let message = last_error_message(handle.as_ptr());
                        ffi::sqlite3_close(handle.as_ptr());
                        message
                    },
                    None => error_message(err_code).to_owned(),
                };
                Err(Error::BadConnection(message))
            }
        }
    }

    pub(super) fn exec(&self, query: &str) -> QueryResult<()> {
        let query = CString::new(query)?;
        let mut err_msg = ptr::null_mut();
        let result = unsafe {
            ffi::sqlite3_exec(
                self.internal_connection.as_ptr(),
                query.as_ptr(),
                None,
                ptr::null_mut(),
                &mut err_msg,
            )
        };

        if result == ffi::SQLITE_OK {
            return Ok(());
        }
        let message = if err_msg.is_null() {
            unsafe { last_error_message(self.internal_connection.as_ptr()) }
        } else {
            unsafe {
                let message = CStr::from_ptr(err_msg).to_string_lossy().into_owned();
                ffi::sqlite3_free(err_msg as *mut libc::c_void);
                message
            }
        };
        Err(Error::DatabaseError(
            DatabaseErrorKind::from_code(result),
            message,
        ))
    }

    /// Sets the trace callback. Only one can be active at a time; the
    /// previous callback (if any) is replaced.
    ///
    /// An empty mask removes the trace callback.
    pub(super) fn set_trace(&mut self, mask: TraceFlags, hook: Box<TraceCallback>) {
        if mask.is_empty() {
            self.remove_trace();
            return;
        }

        let hook = TraceHook {
            mask,
            context: CallbackContext::new(hook),
        };
        let result = unsafe {
            ffi::sqlite3_trace_v2(
                self.internal_connection.as_ptr(),
                mask.bits() as libc::c_uint,
                Some(trace_trampoline),
                self.hooks.token(),
            )
        };
        if result != ffi::SQLITE_OK {
            tracing::warn!(
                hook = %HookKind::Trace,
                code = result,
                "sqlite3_trace_v2 rejected the callback: {}",
                error_message(result)
            );
            return;
        }
        tracing::debug!(hook = %HookKind::Trace, mask = mask.bits(), "registered");
        // The old context (if any) is released here after SQLite has already
        // switched to the new callback.
        drop(self.hooks.replace_trace(Some(hook)));
    }

    /// Removes the trace callback. Does nothing if none is registered.
    pub(super) fn remove_trace(&mut self) {
        if !self.hooks.has_trace() {
            return;
        }
        unsafe {
            ffi::sqlite3_trace_v2(self.internal_connection.as_ptr(), 0, None, ptr::null_mut());
        }
        tracing::debug!(hook = %HookKind::Trace, "removed");
        drop(self.hooks.replace_trace(None));
    }

    /// Sets the authorizer. Only one can be active at a time.
    ///
    /// If SQLite rejects the registration the previous authorizer stays
    /// active.
    pub(super) fn set_authorizer(&mut self, hook: Box<AuthorizerCallback>) -> QueryResult<()> {
        let context = CallbackContext::new(hook);
        let result = unsafe {
            ffi::sqlite3_set_authorizer(
                self.internal_connection.as_ptr(),
                Some(authorizer_trampoline),
                self.hooks.token(),
            )
        };
        ensure_registered(result, HookKind::Authorizer)?;
        tracing::debug!(hook = %HookKind::Authorizer, "registered");
        drop(self.hooks.replace_authorizer(Some(context)));
        Ok(())
    }

    /// Removes the authorizer. Does nothing if none is registered.
    pub(super) fn remove_authorizer(&mut self) -> QueryResult<()> {
        if !self.hooks.has_authorizer() {
            return Ok(());
        }
        let result = unsafe {
            ffi::sqlite3_set_authorizer(self.internal_connection.as_ptr(), None, ptr::null_mut())
        };
        ensure_registered(result, HookKind::Authorizer)?;
        tracing::debug!(hook = %HookKind::Authorizer, "removed");
        drop(self.hooks.replace_authorizer(None));
        Ok(())
    }

    pub(super) fn hook_failures(&self) -> Vec<HookFailure> {
        self.hooks.failures()
    }

    pub(super) fn take_hook_failures(&self) -> Vec<HookFailure> {
        self.hooks.take_failures()
    }

    /// Closes the native connection. Subsequent calls are no-ops.
    ///
    /// Hooks stay registered during `sqlite3_close` so that a trace
    /// callback selecting [`TraceFlags::CLOSE`] observes the close.
    pub(super) fn close(&mut self) -> QueryResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let db = self.internal_connection.as_ptr();
        let close_result = unsafe { ffi::sqlite3_close(db) };
        if close_result == ffi::SQLITE_OK {
            return Ok(());
        }

        // The handle stays open, so detach both hooks before the registry
        // they point to is released.
        let message = unsafe {
            ffi::sqlite3_trace_v2(db, 0, None, ptr::null_mut());
            ffi::sqlite3_set_authorizer(db, None, ptr::null_mut());
            last_error_message(db)
        };
        drop(self.hooks.replace_trace(None));
        drop(self.hooks.replace_authorizer(None));
        Err(Error::Close(message))
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("{e}");
        }
    }
}

fn ensure_registered(result: libc::c_int, hook: HookKind) -> QueryResult<()> {
    if result == ffi::SQLITE_OK {
        Ok(())
    } else {
        Err(Error::Registration {
            hook,
            code: result,
            message: error_message(result).to_owned(),
        })
    }
}

unsafe fn last_error_message(db: *mut ffi::sqlite3) -> String {
    let message = ffi::sqlite3_errmsg(db);
    if message.is_null() {
        String::new()
    } else {
        CStr::from_ptr(message).to_string_lossy().into_owned()
    }
}

/// Reads a nullable native string argument.
///
/// Invalid UTF-8 is replaced rather than rejected.
unsafe fn text_arg<'a>(ptr: *const libc::c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy())
    }
}

/// C trampoline for `sqlite3_trace_v2`.
///
/// # Safety
///
/// `user_data` must be null or point to the `HookRegistry` of a live
/// `RawConnection`. `p` and `x` must follow the `sqlite3_trace_v2` contract
/// for `event_code`.
unsafe extern "C" fn trace_trampoline(
    event_code: libc::c_uint,
    user_data: *mut libc::c_void,
    p: *mut libc::c_void,
    x: *mut libc::c_void,
) -> libc::c_int {
    let Some(hooks) = (user_data as *const HookRegistry).as_ref() else {
        tracing::error!(
            hook = %HookKind::Trace,
            event_code,
            "trace callback invoked without a context; event dropped"
        );
        return 0;
    };

    let result = catch_unwind(AssertUnwindSafe(|| match TraceFlags::from_bits(event_code) {
        TraceFlags::STMT => {
            let sql = text_arg(x as *const libc::c_char).unwrap_or_default();
            let readonly =
                !p.is_null() && ffi::sqlite3_stmt_readonly(p as *mut ffi::sqlite3_stmt) != 0;
            hooks.dispatch_trace(TraceEvent::Statement {
                sql: &sql,
                readonly,
            });
        }
        TraceFlags::PROFILE => {
            let sql = if p.is_null() {
                Cow::Borrowed("")
            } else {
                text_arg(ffi::sqlite3_sql(p as *mut ffi::sqlite3_stmt)).unwrap_or_default()
            };
            let duration_ns = if x.is_null() {
                0
            } else {
                u64::try_from(*(x as *const i64)).unwrap_or(0)
            };
            hooks.dispatch_trace(TraceEvent::Profile {
                sql: &sql,
                duration_ns,
            });
        }
        TraceFlags::ROW => hooks.dispatch_trace(TraceEvent::Row),
        TraceFlags::CLOSE => hooks.dispatch_trace(TraceEvent::Close),
        _ => tracing::debug!(event_code, "ignoring unknown trace event"),
    }));

    if result.is_err() {
        hooks.record(HookFailure::CallbackPanic {
            hook: HookKind::Trace,
            message: "panic while decoding trace event".to_owned(),
        });
    }
    0
}

/// C trampoline for `sqlite3_set_authorizer`.
///
/// A null `user_data` means the registration and the registry went out of
/// sync. That is logged and the action is allowed, matching what SQLite
/// does without an authorizer.
///
/// # Safety
///
/// `user_data` must be null or point to the `HookRegistry` of a live
/// `RawConnection`. The string arguments must be null or valid
/// nul-terminated strings.
unsafe extern "C" fn authorizer_trampoline(
    user_data: *mut libc::c_void,
    action: libc::c_int,
    arg1: *const libc::c_char,
    arg2: *const libc::c_char,
    db_name: *const libc::c_char,
    accessor: *const libc::c_char,
) -> libc::c_int {
    let Some(hooks) = (user_data as *const HookRegistry).as_ref() else {
        tracing::error!(
            hook = %HookKind::Authorizer,
            action,
            "authorizer invoked without a context; allowing"
        );
        return AuthorizerDecision::Allow.to_ffi();
    };

    let result = catch_unwind(AssertUnwindSafe(|| {
        let arg1 = text_arg(arg1);
        let arg2 = text_arg(arg2);
        let db_name = text_arg(db_name);
        let accessor = text_arg(accessor);
        hooks.dispatch_authorizer(AuthorizerContext {
            action: AuthorizerAction::from_ffi(action),
            arg1: arg1.as_deref(),
            arg2: arg2.as_deref(),
            db_name: db_name.as_deref(),
            accessor: accessor.as_deref(),
        })
    }));

    match result {
        Ok(decision) => decision.to_ffi(),
        Err(_) => {
            hooks.record(HookFailure::CallbackPanic {
                hook: HookKind::Authorizer,
                message: "panic while decoding authorizer arguments".to_owned(),
            });
            hooks.config().authorizer_fallback.to_ffi()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn test_connection() -> RawConnection {
        RawConnection::establish(":memory:", HookConfig::default())
            .expect("failed to establish :memory: connection")
    }

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn authorizer_without_context_allows() {
        let table = c("t");
        let result = unsafe {
            authorizer_trampoline(
                ptr::null_mut(),
                ffi::SQLITE_DELETE,
                table.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
            )
        };
        assert_eq!(result, ffi::SQLITE_OK);
    }

    #[test]
    fn trace_without_context_is_ignored() {
        let sql = c("SELECT 1");
        let result = unsafe {
            trace_trampoline(
                TraceFlags::STMT.bits(),
                ptr::null_mut(),
                ptr::null_mut(),
                sql.as_ptr() as *mut libc::c_void,
            )
        };
        assert_eq!(result, 0);
    }

    #[test]
    fn authorizer_trampoline_converts_arguments() {
        let mut conn = test_connection();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        conn.set_authorizer(Box::new(move |ctx: AuthorizerContext<'_>| {
            sink.lock().unwrap().push((
                ctx.action,
                ctx.arg1.map(str::to_owned),
                ctx.arg2.map(str::to_owned),
                ctx.db_name.map(str::to_owned),
                ctx.accessor.map(str::to_owned),
            ));
            AuthorizerDecision::Ignore
        }))
        .unwrap();

        let (table, column, db) = (c("users"), c("naïve_名前"), c("main"));
        let result = unsafe {
            authorizer_trampoline(
                conn.hooks.token(),
                ffi::SQLITE_READ,
                table.as_ptr(),
                column.as_ptr(),
                db.as_ptr(),
                ptr::null(),
            )
        };

        assert_eq!(result, ffi::SQLITE_IGNORE);
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0],
            (
                AuthorizerAction::Read,
                Some("users".to_owned()),
                Some("naïve_名前".to_owned()),
                Some("main".to_owned()),
                None,
            )
        );
    }

    #[test]
    fn authorizer_trampoline_contains_panics() {
        let mut conn = test_connection();
        conn.set_authorizer(Box::new(|_: AuthorizerContext<'_>| -> AuthorizerDecision {
            panic!("boom")
        }))
        .unwrap();

        let result = unsafe {
            authorizer_trampoline(
                conn.hooks.token(),
                ffi::SQLITE_SELECT,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
            )
        };

        assert_eq!(result, ffi::SQLITE_OK);
        assert_eq!(
            conn.hook_failures(),
            vec![HookFailure::CallbackPanic {
                hook: HookKind::Authorizer,
                message: "boom".into(),
            }]
        );
    }

    #[test]
    fn trace_trampoline_replaces_invalid_utf8() {
        let mut conn = test_connection();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        conn.set_trace(
            TraceFlags::STMT,
            Box::new(move |event: TraceEvent<'_>| {
                if let Some(sql) = event.sql() {
                    sink.lock().unwrap().push(sql.to_owned());
                }
            }),
        );

        let sql = CString::new(vec![b'S', 0xFF, b'Q']).unwrap();
        unsafe {
            trace_trampoline(
                TraceFlags::STMT.bits(),
                conn.hooks.token(),
                ptr::null_mut(),
                sql.as_ptr() as *mut libc::c_void,
            );
        }

        assert_eq!(*seen.lock().unwrap(), vec!["S\u{FFFD}Q".to_owned()]);
    }

    #[test]
    fn trace_trampoline_reads_profile_duration() {
        let mut conn = test_connection();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        conn.set_trace(
            TraceFlags::PROFILE,
            Box::new(move |event: TraceEvent<'_>| {
                if let TraceEvent::Profile { sql, duration_ns } = event {
                    sink.lock().unwrap().push((sql.to_owned(), duration_ns));
                }
            }),
        );

        let mut elapsed: i64 = 1_500;
        unsafe {
            trace_trampoline(
                TraceFlags::PROFILE.bits(),
                conn.hooks.token(),
                ptr::null_mut(),
                &mut elapsed as *mut i64 as *mut libc::c_void,
            );
        }

        assert_eq!(*seen.lock().unwrap(), vec![(String::new(), 1_500)]);
    }

    #[test]
    fn removed_authorizer_leaves_connection_unrestricted() {
        let mut conn = test_connection();
        conn.set_authorizer(Box::new(|_: AuthorizerContext<'_>| AuthorizerDecision::Deny))
            .unwrap();
        assert!(conn.exec("CREATE TABLE t (id INTEGER)").is_err());

        conn.remove_authorizer().unwrap();
        conn.exec("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(!conn.hooks.has_authorizer());
    }

    #[test]
    fn empty_mask_removes_trace() {
        let mut conn = test_connection();
        conn.set_trace(TraceFlags::STMT, Box::new(|_: TraceEvent<'_>| {}));
        assert!(conn.hooks.has_trace());

        conn.set_trace(TraceFlags::default(), Box::new(|_: TraceEvent<'_>| {}));
        assert!(!conn.hooks.has_trace());
    }

    #[test]
    fn registration_result_codes() {
        assert!(ensure_registered(ffi::SQLITE_OK, HookKind::Authorizer).is_ok());
        match ensure_registered(ffi::SQLITE_MISUSE, HookKind::Authorizer) {
            Err(Error::Registration { hook, code, .. }) => {
                assert_eq!(hook, HookKind::Authorizer);
                assert_eq!(code, ffi::SQLITE_MISUSE);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn close_is_idempotent() {
        let mut conn = test_connection();
        conn.close().unwrap();
        conn.close().unwrap();
    }
}
