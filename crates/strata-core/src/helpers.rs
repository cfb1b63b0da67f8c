//! # Mapping helpers
//!
//! Helpers project parts of a store onto names chosen by the caller. Each
//! mapped entry is a closure that resolves against the store when called,
//! so it always sees current state and current handlers.
//!
//! ```rust
//! use serde_json::json;
//! use strata_core::*;
//!
//! let cart = RawModule::new()
//!     .namespaced(true)
//!     .state(json!({ "items": [] }))
//!     .mutation("add", |state, item| {
//!         if let Some(items) = state["items"].as_array_mut() {
//!             items.push(item.clone());
//!         }
//!     })
//!     .getter("count", |state, _, _, _| json!(state["items"].as_array().map_or(0, Vec::len)));
//!
//! let store = Store::new(StoreOptions::new(RawModule::new().module("cart", cart))).unwrap();
//! let helpers = namespaced_helpers(&store, "cart");
//!
//! let mutations = helpers.map_mutations(names(["add"]));
//! let getters = helpers.map_getters([("item_count", "count")]);
//!
//! mutations["add"](json!("apple"));
//! assert_eq!(getters["item_count"](), json!(1));
//! ```

use std::collections::HashMap;
use std::rc::Rc;

use futures::FutureExt;
use futures::future;
use serde_json::Value;

use crate::context::{LocalContext, LocalGetters};
use crate::module::ActionFuture;
use crate::store::{Store, WeakStore};

pub type Mapped = Rc<dyn Fn() -> Value>;
pub type MappedCommit = Rc<dyn Fn(Value)>;
pub type MappedDispatch = Rc<dyn Fn(Value) -> ActionFuture>;

/// How a mapped state entry is read.
#[derive(Clone)]
pub enum StateMapper {
    /// A field of the (module-local) state.
    Key(String),
    /// Derived from the (module-local) state and getters.
    Fn(Rc<dyn Fn(&Value, &LocalGetters) -> Value>),
}

impl StateMapper {
    pub fn func(f: impl Fn(&Value, &LocalGetters) -> Value + 'static) -> Self {
        StateMapper::Fn(Rc::new(f))
    }
}

impl From<&str> for StateMapper {
    fn from(key: &str) -> Self {
        StateMapper::Key(key.to_string())
    }
}

impl From<String> for StateMapper {
    fn from(key: String) -> Self {
        StateMapper::Key(key)
    }
}

/// What a mapped mutation commits.
#[derive(Clone)]
pub enum MutationMapper {
    Type(String),
    /// Receives the (module-local) context to commit through.
    Fn(Rc<dyn Fn(&LocalContext, Value)>),
}

impl MutationMapper {
    pub fn func(f: impl Fn(&LocalContext, Value) + 'static) -> Self {
        MutationMapper::Fn(Rc::new(f))
    }
}

impl From<&str> for MutationMapper {
    fn from(ty: &str) -> Self {
        MutationMapper::Type(ty.to_string())
    }
}

impl From<String> for MutationMapper {
    fn from(ty: String) -> Self {
        MutationMapper::Type(ty)
    }
}

/// What a mapped action dispatches.
#[derive(Clone)]
pub enum ActionMapper {
    Type(String),
    /// Receives the (module-local) context to dispatch through.
    Fn(Rc<dyn Fn(&LocalContext, Value) -> ActionFuture>),
}

impl ActionMapper {
    pub fn func(f: impl Fn(&LocalContext, Value) -> ActionFuture + 'static) -> Self {
        ActionMapper::Fn(Rc::new(f))
    }
}

impl From<&str> for ActionMapper {
    fn from(ty: &str) -> Self {
        ActionMapper::Type(ty.to_string())
    }
}

impl From<String> for ActionMapper {
    fn from(ty: String) -> Self {
        ActionMapper::Type(ty)
    }
}

/// `["a", "b"]` → `[("a", "a"), ("b", "b")]`: map names onto themselves.
pub fn names<I, S>(keys: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter()
        .map(|key| {
            let key = key.into();
            (key.clone(), key)
        })
        .collect()
}

/// Helpers bound to a store, optionally scoped to one namespace.
#[derive(Clone)]
pub struct Helpers {
    store: WeakStore,
    namespace: Option<Rc<str>>,
}

impl Helpers {
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.downgrade(),
            namespace: None,
        }
    }

    /// Scoped to `namespace`; a missing trailing `/` is added.
    pub fn namespaced(store: &Store, namespace: &str) -> Self {
        let namespace = if namespace.ends_with('/') {
            namespace.to_string()
        } else {
            format!("{namespace}/")
        };
        Self {
            store: store.downgrade(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn map_state<K, M>(
        &self,
        entries: impl IntoIterator<Item = (K, M)>,
    ) -> HashMap<String, Mapped>
    where
        K: Into<String>,
        M: Into<StateMapper>,
    {
        entries
            .into_iter()
            .map(|(key, mapper)| {
                let mapper = mapper.into();
                let scope = self.clone();
                let mapped: Mapped = Rc::new(move || {
                    let Some(ctx) = scope.context("map_state") else {
                        return Value::Null;
                    };
                    match &mapper {
                        StateMapper::Key(field) => {
                            ctx.with_state(|s| s.get(field).cloned().unwrap_or(Value::Null))
                        }
                        StateMapper::Fn(f) => {
                            let getters = ctx.getters();
                            ctx.with_state(|s| f(s, &getters))
                        }
                    }
                });
                (key.into(), mapped)
            })
            .collect()
    }

    /// Getters are named by their local type; the namespace is prepended.
    pub fn map_getters<K, T>(
        &self,
        entries: impl IntoIterator<Item = (K, T)>,
    ) -> HashMap<String, Mapped>
    where
        K: Into<String>,
        T: Into<String>,
    {
        entries
            .into_iter()
            .map(|(key, ty)| {
                let ty = format!("{}{}", self.namespace().unwrap_or_default(), ty.into());
                let scope = self.clone();
                let mapped: Mapped = Rc::new(move || {
                    if scope.namespace.is_some() && scope.context("map_getters").is_none() {
                        return Value::Null;
                    }
                    scope
                        .store
                        .upgrade()
                        .and_then(|store| store.getters().get(&ty))
                        .unwrap_or(Value::Null)
                });
                (key.into(), mapped)
            })
            .collect()
    }

    pub fn map_mutations<K, M>(
        &self,
        entries: impl IntoIterator<Item = (K, M)>,
    ) -> HashMap<String, MappedCommit>
    where
        K: Into<String>,
        M: Into<MutationMapper>,
    {
        entries
            .into_iter()
            .map(|(key, mapper)| {
                let mapper = mapper.into();
                let scope = self.clone();
                let mapped: MappedCommit = Rc::new(move |payload: Value| {
                    let Some(ctx) = scope.context("map_mutations") else {
                        return;
                    };
                    match &mapper {
                        MutationMapper::Type(ty) => ctx.commit(ty, payload),
                        MutationMapper::Fn(f) => f(&ctx, payload),
                    }
                });
                (key.into(), mapped)
            })
            .collect()
    }

    pub fn map_actions<K, M>(
        &self,
        entries: impl IntoIterator<Item = (K, M)>,
    ) -> HashMap<String, MappedDispatch>
    where
        K: Into<String>,
        M: Into<ActionMapper>,
    {
        entries
            .into_iter()
            .map(|(key, mapper)| {
                let mapper = mapper.into();
                let scope = self.clone();
                let mapped: MappedDispatch = Rc::new(move |payload: Value| {
                    let Some(ctx) = scope.context("map_actions") else {
                        return future::ready(Ok(Value::Null)).boxed_local();
                    };
                    match &mapper {
                        ActionMapper::Type(ty) => ctx.dispatch(ty, payload),
                        ActionMapper::Fn(f) => f(&ctx, payload),
                    }
                });
                (key.into(), mapped)
            })
            .collect()
    }

    /// Resolved on every call so modules registered later are found.
    fn context(&self, helper: &str) -> Option<LocalContext> {
        let store = self.store.upgrade()?;
        match &self.namespace {
            None => Some(store.root_context()),
            Some(namespace) => store.module_by_namespace(helper, namespace),
        }
    }
}

/// Helpers scoped to `namespace`.
pub fn namespaced_helpers(store: &Store, namespace: &str) -> Helpers {
    Helpers::namespaced(store, namespace)
}
