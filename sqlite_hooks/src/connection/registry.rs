//! Per-connection storage for registered hook callbacks.
//!
//! A [`HookRegistry`] is boxed once per connection and its address is the
//! only value SQLite ever sees for either hook. Trampolines turn that token
//! back into a `&HookRegistry` and look up the current callback by hook
//! kind, so the native side never holds a pointer to a callback directly.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::raw as libc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use super::authorizer::{AuthorizerContext, AuthorizerDecision};
use super::trace::{TraceEvent, TraceFlags};
use crate::config::HookConfig;
use crate::result::{HookFailure, HookKind};

pub(super) type TraceCallback = dyn FnMut(TraceEvent<'_>) + Send;
pub(super) type AuthorizerCallback =
    dyn FnMut(AuthorizerContext<'_>) -> AuthorizerDecision + Send;

/// A registered callback.
///
/// Held behind an `Rc`: the registry owns one reference, and every
/// invocation in flight owns another, so replacing or removing a hook from
/// inside a running callback never frees the closure that is executing.
pub(super) struct CallbackContext<F: ?Sized> {
    callback: RefCell<Box<F>>,
}

impl<F: ?Sized> CallbackContext<F> {
    pub(super) fn new(callback: Box<F>) -> Rc<Self> {
        Rc::new(Self {
            callback: RefCell::new(callback),
        })
    }
}

/// The trace callback together with the event mask it was registered for.
pub(super) struct TraceHook {
    pub(super) mask: TraceFlags,
    pub(super) context: Rc<CallbackContext<TraceCallback>>,
}

pub(super) struct HookRegistry {
    config: HookConfig,
    trace: RefCell<Option<TraceHook>>,
    authorizer: RefCell<Option<Rc<CallbackContext<AuthorizerCallback>>>>,
    failures: RefCell<VecDeque<HookFailure>>,
}

impl HookRegistry {
    pub(super) fn new(config: HookConfig) -> Box<Self> {
        Box::new(Self {
            config,
            trace: RefCell::new(None),
            authorizer: RefCell::new(None),
            failures: RefCell::new(VecDeque::new()),
        })
    }

    /// The opaque value passed to SQLite as the hooks' user data pointer.
    pub(super) fn token(&self) -> *mut libc::c_void {
        self as *const Self as *mut libc::c_void
    }

    pub(super) fn config(&self) -> &HookConfig {
        &self.config
    }

    /// Installs a trace hook, returning the one it replaces.
    ///
    /// Callers drop the returned value only after SQLite has been pointed at
    /// the new hook.
    pub(super) fn replace_trace(&self, hook: Option<TraceHook>) -> Option<TraceHook> {
        self.trace.replace(hook)
    }

    pub(super) fn has_trace(&self) -> bool {
        self.trace.borrow().is_some()
    }

    /// Installs an authorizer, returning the one it replaces.
    pub(super) fn replace_authorizer(
        &self,
        context: Option<Rc<CallbackContext<AuthorizerCallback>>>,
    ) -> Option<Rc<CallbackContext<AuthorizerCallback>>> {
        self.authorizer.replace(context)
    }

    pub(super) fn has_authorizer(&self) -> bool {
        self.authorizer.borrow().is_some()
    }

    /// Runs the current trace callback for `event`.
    ///
    /// Events outside the registered mask, and events arriving after the
    /// hook was removed, are dropped.
    pub(super) fn dispatch_trace(&self, event: TraceEvent<'_>) {
        let context = match &*self.trace.borrow() {
            Some(hook) if hook.mask.contains(event.flag()) => hook.context.clone(),
            _ => return,
        };

        let Ok(mut callback) = context.callback.try_borrow_mut() else {
            self.record(HookFailure::Reentrant {
                hook: HookKind::Trace,
            });
            return;
        };

        let callback: &mut TraceCallback = &mut **callback;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
            self.record(HookFailure::CallbackPanic {
                hook: HookKind::Trace,
                message: panic_message(payload.as_ref()),
            });
        }
    }

    /// Runs the current authorizer for `ctx` and returns its decision.
    ///
    /// Without a registered authorizer every action is allowed. A panicking
    /// or re-entered callback yields [`HookConfig::authorizer_fallback`].
    pub(super) fn dispatch_authorizer(&self, ctx: AuthorizerContext<'_>) -> AuthorizerDecision {
        let Some(context) = self.authorizer.borrow().clone() else {
            return AuthorizerDecision::Allow;
        };

        let Ok(mut callback) = context.callback.try_borrow_mut() else {
            self.record(HookFailure::Reentrant {
                hook: HookKind::Authorizer,
            });
            return self.config.authorizer_fallback;
        };

        let callback: &mut AuthorizerCallback = &mut **callback;
        match catch_unwind(AssertUnwindSafe(|| callback(ctx))) {
            Ok(decision) => decision,
            Err(payload) => {
                self.record(HookFailure::CallbackPanic {
                    hook: HookKind::Authorizer,
                    message: panic_message(payload.as_ref()),
                });
                self.config.authorizer_fallback
            }
        }
    }

    pub(super) fn record(&self, failure: HookFailure) {
        tracing::error!(hook = %failure.hook(), "{failure}");

        let capacity = self.config.failure_log_capacity;
        if capacity == 0 {
            return;
        }
        let mut failures = self.failures.borrow_mut();
        while failures.len() >= capacity {
            failures.pop_front();
        }
        failures.push_back(failure);
    }

    pub(super) fn failures(&self) -> Vec<HookFailure> {
        self.failures.borrow().iter().cloned().collect()
    }

    pub(super) fn take_failures(&self) -> Vec<HookFailure> {
        self.failures.borrow_mut().drain(..).collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
