//! # Reactive capability
//!
//! Strata's store never detects changes on its own. It asks a [`Reactive`]
//! implementation for two things:
//!
//! - an [`Observable`] tree (`observe`) that holds the raw state, notifies
//!   watchers on every write, and lives as long as the store does;
//! - a [`ComputedScope`] (`computed_scope`) of memoized derivations over that
//!   tree, rebuilt whenever the store's getters change.
//!
//! [`Runtime`] is the default implementation. It is deliberately coarse: every
//! write bumps one version stamp, and a computed is stale whenever the stamp
//! moved since it was last evaluated.
//!
//! ```rust
//! use std::rc::Rc;
//! use serde_json::json;
//! use strata_reactive::*;
//!
//! let runtime = Runtime::default();
//! let tree = runtime.observe(json!({ "count": 1 }));
//!
//! let scope = runtime.computed_scope(tree.clone());
//! let source = tree.clone();
//! scope.define("double", Rc::new(move || {
//!     source.with(|s| json!(s["count"].as_i64().unwrap_or(0) * 2))
//! }));
//!
//! assert_eq!(scope.get("double"), Some(json!(2)));
//! tree.update(|s| s["count"] = json!(5));
//! assert_eq!(scope.get("double"), Some(json!(10)));
//! ```
//!
//! ## Watchers
//!
//! `Observable::watch` re-evaluates a source closure after writes and calls
//! back with `(new, old)` when it changed. `WatchOptions::SYNC` watchers run
//! inside the write; the rest wait for `flush`. `WatchOptions::DEEP` fires on
//! every write, which is what the store's strict mode relies on.

pub mod computed;
pub mod effects;
pub mod observable;

pub use computed::*;
pub use effects::*;
pub use observable::*;

use std::rc::Rc;

use serde_json::Value;

/// The capability a store is built over.
pub trait Reactive {
    /// Wraps a raw state tree.
    fn observe(&self, state: Value) -> Rc<dyn Observable>;
    /// A fresh scope of memoized derivations over `source`.
    fn computed_scope(&self, source: Rc<dyn Observable>) -> Rc<dyn ComputedScope>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Runtime;

impl Reactive for Runtime {
    fn observe(&self, state: Value) -> Rc<dyn Observable> {
        Rc::new(Tree::new(state))
    }

    fn computed_scope(&self, source: Rc<dyn Observable>) -> Rc<dyn ComputedScope> {
        Rc::new(ComputedSet::new(source))
    }
}
