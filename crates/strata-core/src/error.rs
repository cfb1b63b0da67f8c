use std::any::Any;

use thiserror::Error;

/// Configuration and validation failures. Everything else the store reports
/// (unknown types, duplicate getters, ...) goes to the log instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("[strata] {key} should be {expected} but got {found}{}", in_module(.path))]
    InvalidModule {
        path: String,
        key: String,
        expected: &'static str,
        found: String,
    },
    #[error("[strata] cannot register the root module by using register_module.")]
    RootModule,
    #[error("[strata] module '{0}' is already registered.")]
    AlreadyRegistered(String),
    #[error("[strata] cannot register module '{0}': its parent is not registered.")]
    ParentNotFound(String),
    #[error("[strata] expects string as the type, but found {0}.")]
    InvalidType(String),
}

fn in_module(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" in module \"{path}\"")
    }
}

/// Best-effort message out of a caught panic payload.
pub(crate) fn panic_message(err: &(dyn Any + Send)) -> String {
    if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

/// Runs a subscriber callback, logging instead of propagating a panic.
pub(crate) fn isolate(phase: &str, f: impl FnOnce()) {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    if let Err(err) = catch_unwind(AssertUnwindSafe(f)) {
        log::warn!("[strata] error in {phase} subscribers: ");
        log::error!("{}", panic_message(err.as_ref()));
    }
}
