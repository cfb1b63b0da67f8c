//! # Store, modules, and namespaces
//!
//! A strata [`Store`] holds one JSON state tree, split into modules. Each
//! module contributes a slice of state plus three kinds of handlers:
//!
//! - mutations: synchronous, the only sanctioned way to write state;
//! - actions: asynchronous, free to commit and dispatch;
//! - getters: memoized values derived from state and other getters.
//!
//! ```rust
//! use serde_json::json;
//! use strata_core::*;
//!
//! let store = Store::new(StoreOptions::new(
//!     RawModule::new()
//!         .state(json!({ "count": 0 }))
//!         .mutation("increment", |state, _| {
//!             state["count"] = json!(state["count"].as_i64().unwrap_or(0) + 1);
//!         })
//!         .action_sync("increment", |ctx, _| {
//!             ctx.commit("increment", json!(null));
//!             Ok(json!(null))
//!         })
//!         .getter("double", |state, _, _, _| json!(state["count"].as_i64().unwrap_or(0) * 2)),
//! ))
//! .unwrap();
//!
//! futures::executor::block_on(store.dispatch("increment", json!(null))).unwrap();
//! assert_eq!(store.state()["count"], json!(1));
//! assert_eq!(store.getters().get("double"), Some(json!(2)));
//! ```
//!
//! ## Namespaces
//!
//! A module marked `namespaced(true)` registers its handlers under
//! `key/`. Its own handlers still use local names through their context;
//! `CommitOptions { root: true, .. }` reaches the root instead.
//!
//! ```rust
//! use serde_json::json;
//! use strata_core::*;
//!
//! let account = RawModule::new()
//!     .namespaced(true)
//!     .state(json!({ "name": "" }))
//!     .mutation("rename", |state, name| state["name"] = name.clone());
//!
//! let store = Store::new(StoreOptions::new(RawModule::new().module("account", account))).unwrap();
//! store.commit("account/rename", json!("ada"));
//! assert_eq!(store.state()["account"]["name"], json!("ada"));
//! ```
//!
//! ## Strict mode
//!
//! With `StoreOptions::strict`, writing the tree anywhere but inside a
//! mutation panics. Intended for development builds.

pub mod collection;
pub mod context;
pub mod error;
pub mod helpers;
mod install;
pub mod locals;
pub mod module;
pub mod prelude;
pub mod store;
pub mod subscribe;
mod tests;

pub use collection::*;
pub use context::*;
pub use error::StoreError;
pub use helpers::*;
pub use locals::*;
pub use module::*;
pub use store::*;
pub use subscribe::*;

pub use strata_reactive::{Dispose, Observable, ObservableExt, Reactive, Runtime, WatchOptions};
