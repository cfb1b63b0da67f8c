//! Wiring the module tree into the store's flat registries and rebuilding
//! the computed scope behind `store.getters()`.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use futures::FutureExt;
use futures::future;
use serde_json::{Map, Value};
use strata_reactive::{ObservableExt, WatchOptions};

use crate::context::{ActionContext, LocalContext, NULL, nested, nested_mut};
use crate::module::{ActionFuture, ActionHandler, GetterHandler, ModuleId, MutationHandler};
use crate::store::Store;

pub(crate) type WrappedMutation = Rc<dyn Fn(&Value)>;
pub(crate) type WrappedAction = Rc<dyn Fn(Value) -> ActionFuture>;
pub(crate) type WrappedGetter = Rc<dyn Fn(&Store) -> Value>;

/// Fully-qualified type → bound handlers.
#[derive(Default)]
pub(crate) struct Registry {
    pub mutations: HashMap<String, Vec<WrappedMutation>>,
    pub actions: HashMap<String, Vec<WrappedAction>>,
    /// Registration order is the enumeration order of `store.getters()`.
    pub getters: Vec<(String, WrappedGetter)>,
    getter_types: HashSet<String>,
}

impl Registry {
    fn add_getter(&mut self, ty: String, getter: WrappedGetter) -> bool {
        if !self.getter_types.insert(ty.clone()) {
            return false;
        }
        self.getters.push((ty, getter));
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Install {
    /// First installation: graft module state into the tree unless asked to
    /// keep what is already there.
    Fresh { preserve_state: bool },
    /// Re-wiring after hot update / unregister; the tree already holds state.
    Reset,
}

pub(crate) fn install_module(store: &Store, path: &mut Vec<String>, id: ModuleId, mode: Install) {
    let inner = &store.inner;
    let (namespace, namespaced, mutations, actions, getters, children) = {
        let modules = inner.modules.borrow();
        let Some(module) = modules.module(id) else {
            return;
        };
        (
            modules.get_namespace(path),
            module.namespaced(),
            module.raw.mutations.clone(),
            module.raw.actions.clone(),
            module.raw.getters.clone(),
            module.children.clone(),
        )
    };

    if namespaced {
        let mut map = inner.namespace_map.borrow_mut();
        if map.contains_key(&namespace) {
            log::error!(
                "[strata] duplicate namespace {namespace} for the namespaced module {}",
                path.join("/")
            );
        }
        map.insert(namespace.clone(), id);
    }

    if let (Some((key, parent_path)), Install::Fresh { preserve_state: false }) =
        (path.split_last(), mode)
    {
        let state = inner
            .modules
            .borrow()
            .module(id)
            .map(|m| m.state.clone())
            .unwrap_or(Value::Null);
        store.with_commit(|| {
            inner
                .tree
                .update(|root| graft(root, parent_path, key, state, path))
        });
    }

    let local = LocalContext::new(store.downgrade(), &namespace, path);
    if let Some(module) = inner.modules.borrow_mut().module_mut(id) {
        module.context = Some(local.clone());
    }

    for (key, handler) in mutations {
        register_mutation(store, format!("{namespace}{key}"), handler, &local);
    }
    for (key, action) in actions {
        let ty = if action.root {
            key
        } else {
            format!("{namespace}{key}")
        };
        register_action(store, ty, action.handler, &local);
    }
    for (key, getter) in getters {
        register_getter(store, format!("{namespace}{key}"), getter, &local);
    }

    for (key, child) in children {
        path.push(key);
        install_module(store, path, child, mode);
        path.pop();
    }
}

fn graft(root: &mut Value, parent_path: &[String], key: &str, state: Value, path: &[String]) {
    let Some(parent) = nested_mut(root, parent_path) else {
        log::error!("[strata] no parent state for module \"{}\"", path.join("."));
        return;
    };
    if parent.is_null() {
        *parent = Value::Object(Map::new());
    }
    let Value::Object(parent) = parent else {
        log::error!(
            "[strata] cannot add state for module \"{}\": parent state is not an object",
            path.join(".")
        );
        return;
    };
    if parent.contains_key(key) {
        log::warn!(
            "[strata] state field \"{key}\" was overridden by a module with the same name at \"{}\"",
            path.join(".")
        );
    }
    parent.insert(key.to_string(), state);
}

fn register_mutation(store: &Store, ty: String, handler: MutationHandler, local: &LocalContext) {
    let local = local.clone();
    let wrapped: WrappedMutation = Rc::new(move |payload: &Value| {
        let Some(store) = local.store() else {
            return;
        };
        store.inner.tree.update(|root| match nested_mut(root, local.path()) {
            Some(state) => handler(state, payload),
            None => log::error!(
                "[strata] no state found for module \"{}\"",
                local.path().join(".")
            ),
        });
    });
    store
        .inner
        .registry
        .borrow_mut()
        .mutations
        .entry(ty)
        .or_default()
        .push(wrapped);
}

fn register_action(store: &Store, ty: String, handler: ActionHandler, local: &LocalContext) {
    let local = local.clone();
    let wrapped: WrappedAction = Rc::new(move |payload: Value| {
        let Some(store) = local.store() else {
            return future::ready(Ok(Value::Null)).boxed_local();
        };
        handler(ActionContext::new(local.clone(), store), payload)
    });
    store
        .inner
        .registry
        .borrow_mut()
        .actions
        .entry(ty)
        .or_default()
        .push(wrapped);
}

fn register_getter(store: &Store, ty: String, getter: GetterHandler, local: &LocalContext) {
    let local = local.clone();
    let wrapped: WrappedGetter = Rc::new(move |store: &Store| {
        let local_getters = local.getters();
        let root_getters = store.getters();
        store.with_state(|root| {
            let local_state = nested(root, local.path()).unwrap_or(&NULL);
            getter(local_state, &local_getters, root, &root_getters)
        })
    });
    let added = store.inner.registry.borrow_mut().add_getter(ty.clone(), wrapped);
    if !added {
        log::error!("[strata] duplicate getter key: {ty}");
    }
}

/// Drops every registration and rebuilds them from the module tree.
pub(crate) fn reset_store(store: &Store, hot: bool) {
    let inner = &store.inner;
    *inner.registry.borrow_mut() = Registry::default();
    inner.namespace_map.borrow_mut().clear();

    let root = inner.modules.borrow().root();
    install_module(store, &mut Vec::new(), root, Install::Reset);
    reset_store_vm(store, hot);
}

/// Rebuilds the computed scope from the getter registry. The previous scope
/// is disposed only once the new one is in place.
pub(crate) fn reset_store_vm(store: &Store, hot: bool) {
    let inner = &store.inner;
    let scope = inner.reactive.computed_scope(inner.tree.clone());
    inner.local_getters_cache.borrow_mut().clear();

    let getters = inner.registry.borrow().getters.clone();
    for (key, wrapped) in getters {
        let weak = store.downgrade();
        scope.define(
            &key,
            Rc::new(move || {
                weak.upgrade()
                    .map(|store| wrapped(&store))
                    .unwrap_or(Value::Null)
            }),
        );
    }

    let old = inner.vm.replace(Some(scope));

    if inner.strict {
        enable_strict_mode(store);
    }

    if let Some(old) = old {
        if hot {
            // Force everything watching the store to re-evaluate against the
            // new handlers.
            store.with_commit(|| {
                old.detach();
                inner.tree.touch();
            });
        }
        old.dispose();
    }
}

fn enable_strict_mode(store: &Store) {
    let inner = &store.inner;
    if inner.strict_watcher.borrow().is_some() {
        return;
    }
    let weak = store.downgrade();
    // A deep watcher fires on every write, so the source needs no value.
    let unwatch = inner.tree.watch(
        Rc::new(|| Value::Null),
        Box::new(move |_, _| {
            if let Some(store) = weak.upgrade() {
                assert!(
                    store.is_committing(),
                    "[strata] do not mutate store state outside mutation handlers."
                );
            }
        }),
        WatchOptions::DEEP | WatchOptions::SYNC,
    );
    *inner.strict_watcher.borrow_mut() = Some(unwatch);
}
