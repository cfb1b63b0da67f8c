//! Module-scoped views of the store: what a module's handlers see.

use std::rc::Rc;

use futures::FutureExt;
use futures::future;
use serde::Serialize;
use serde_json::Value;

use crate::StoreError;
use crate::module::ActionFuture;
use crate::store::{Getters, Store, WeakStore};

/// The first argument of `commit`/`dispatch`: a bare type, or an
/// object-style descriptor whose `type` field names the handler and which
/// is itself the payload.
#[derive(Clone, Debug, PartialEq)]
pub enum CallType {
    Plain(String),
    Object { ty: String, object: Value },
}

impl From<&str> for CallType {
    fn from(ty: &str) -> Self {
        CallType::Plain(ty.to_string())
    }
}

impl From<String> for CallType {
    fn from(ty: String) -> Self {
        CallType::Plain(ty)
    }
}

impl From<&String> for CallType {
    fn from(ty: &String) -> Self {
        CallType::Plain(ty.clone())
    }
}

impl TryFrom<Value> for CallType {
    type Error = StoreError;

    fn try_from(object: Value) -> Result<Self, StoreError> {
        match object.get("type") {
            Some(Value::String(ty)) => Ok(CallType::Object {
                ty: ty.clone(),
                object,
            }),
            Some(other) => Err(StoreError::InvalidType(json_kind(other).into())),
            None => Err(StoreError::InvalidType(json_kind(&object).into())),
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// From a namespaced context: commit the bare type at the root.
    pub root: bool,
    /// No longer supported; only produces a warning.
    pub silent: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// From a namespaced context: dispatch the bare type at the root.
    pub root: bool,
}

/// What mutation subscribers receive.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MutationRecord {
    #[serde(rename = "type")]
    pub ty: String,
    pub payload: Value,
}

/// What action subscribers receive.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub ty: String,
    pub payload: Value,
}

pub(crate) struct Unified<O> {
    pub ty: String,
    pub payload: Value,
    pub options: O,
}

pub(crate) fn unify_object_style<O>(call: CallType, payload: Value, options: O) -> Unified<O> {
    match call {
        CallType::Plain(ty) => Unified {
            ty,
            payload,
            options,
        },
        CallType::Object { ty, object } => Unified {
            ty,
            payload: object,
            options,
        },
    }
}

pub(crate) static NULL: Value = Value::Null;

pub(crate) fn nested<'a>(state: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(state, |s, key| s.get(key.as_str()))
}

pub(crate) fn nested_mut<'a>(state: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    path.iter().try_fold(state, |s, key| s.get_mut(key.as_str()))
}

/// A module's view of the store.
///
/// With an empty namespace `commit`/`dispatch` are the store's own. Inside a
/// namespace, types are prefixed unless the `root` option is set. State and
/// getters are resolved on every access, never captured.
#[derive(Clone)]
pub struct LocalContext {
    store: WeakStore,
    namespace: Rc<str>,
    path: Rc<[String]>,
}

impl LocalContext {
    pub(crate) fn new(store: WeakStore, namespace: &str, path: &[String]) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            path: path.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub(crate) fn store(&self) -> Option<Store> {
        self.store.upgrade()
    }

    /// Snapshot of this module's slice of the current state.
    pub fn state(&self) -> Value {
        self.with_state(Value::clone)
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        match self.store() {
            Some(store) => store.with_state(|root| f(nested(root, &self.path).unwrap_or(&NULL))),
            None => f(&Value::Null),
        }
    }

    pub fn getters(&self) -> LocalGetters {
        LocalGetters {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
        }
    }

    pub fn commit(&self, ty: impl Into<CallType>, payload: Value) {
        self.commit_with(ty, payload, CommitOptions::default())
    }

    pub fn commit_with(&self, ty: impl Into<CallType>, payload: Value, options: CommitOptions) {
        let Some(store) = self.store() else {
            log::warn!("[strata] commit on a dropped store");
            return;
        };
        if self.namespace.is_empty() {
            return store.commit_with(ty, payload, options);
        }

        let Unified {
            ty: local,
            payload,
            options,
        } = unify_object_style(ty.into(), payload, options);
        let ty = if options.root {
            local
        } else {
            let global = format!("{}{local}", self.namespace);
            if !store.has_mutation(&global) {
                log::error!("[strata] unknown local mutation type: {local}, global type: {global}");
                return;
            }
            global
        };
        store.commit_with(ty, payload, options)
    }

    pub fn dispatch(&self, ty: impl Into<CallType>, payload: Value) -> ActionFuture {
        self.dispatch_with(ty, payload, DispatchOptions::default())
    }

    pub fn dispatch_with(
        &self,
        ty: impl Into<CallType>,
        payload: Value,
        options: DispatchOptions,
    ) -> ActionFuture {
        let Some(store) = self.store() else {
            log::warn!("[strata] dispatch on a dropped store");
            return future::ready(Ok(Value::Null)).boxed_local();
        };
        if self.namespace.is_empty() {
            return store.dispatch(ty, payload);
        }

        let Unified {
            ty: local,
            payload,
            options,
        } = unify_object_style(ty.into(), payload, options);
        let ty = if options.root {
            local
        } else {
            let global = format!("{}{local}", self.namespace);
            if !store.has_action(&global) {
                log::error!("[strata] unknown local action type: {local}, global type: {global}");
                return future::ready(Ok(Value::Null)).boxed_local();
            }
            global
        };
        store.dispatch(ty, payload)
    }
}

/// Getters of one namespace, addressed by their local names.
#[derive(Clone)]
pub struct LocalGetters {
    store: WeakStore,
    namespace: Rc<str>,
}

impl LocalGetters {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let store = self.store.upgrade()?;
        if self.namespace.is_empty() {
            return store.getters().get(key);
        }
        let projection = store.local_getter_types(&self.namespace);
        match projection.iter().find(|(local, _)| local == key) {
            Some((_, global)) => store.getters().get(global),
            None => {
                log::error!("[strata] unknown getter: {}{key}", self.namespace);
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().iter().any(|k| k == key)
    }

    /// Local names in registration order.
    pub fn keys(&self) -> Vec<String> {
        let Some(store) = self.store.upgrade() else {
            return Vec::new();
        };
        if self.namespace.is_empty() {
            return store.getters().keys();
        }
        store
            .local_getter_types(&self.namespace)
            .iter()
            .map(|(local, _)| local.clone())
            .collect()
    }
}

/// The first argument of every action handler.
#[derive(Clone)]
pub struct ActionContext {
    local: LocalContext,
    store: Store,
}

impl ActionContext {
    pub(crate) fn new(local: LocalContext, store: Store) -> Self {
        Self { local, store }
    }

    pub fn commit(&self, ty: impl Into<CallType>, payload: Value) {
        self.local.commit(ty, payload)
    }

    pub fn commit_with(&self, ty: impl Into<CallType>, payload: Value, options: CommitOptions) {
        self.local.commit_with(ty, payload, options)
    }

    pub fn dispatch(&self, ty: impl Into<CallType>, payload: Value) -> ActionFuture {
        self.local.dispatch(ty, payload)
    }

    pub fn dispatch_with(
        &self,
        ty: impl Into<CallType>,
        payload: Value,
        options: DispatchOptions,
    ) -> ActionFuture {
        self.local.dispatch_with(ty, payload, options)
    }

    pub fn state(&self) -> Value {
        self.local.state()
    }

    pub fn getters(&self) -> LocalGetters {
        self.local.getters()
    }

    pub fn root_state(&self) -> Value {
        self.store.state()
    }

    pub fn root_getters(&self) -> Getters {
        self.store.getters()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}
