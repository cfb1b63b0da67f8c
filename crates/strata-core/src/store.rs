use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use futures::future;
use futures::{FutureExt, TryFutureExt};
use serde_json::Value;
use smallvec::SmallVec;
use strata_reactive::{
    ComputedScope, Dispose, Observable, ObservableExt, Reactive, Runtime, WatchOptions,
    WatchSource,
};

use crate::collection::ModuleCollection;
use crate::context::{
    ActionRecord, CallType, CommitOptions, LocalContext, MutationRecord, Unified,
    unify_object_style,
};
use crate::error::{StoreError, isolate};
use crate::install::{self, Install, Registry, WrappedAction, WrappedMutation};
use crate::module::{ActionFuture, ModuleId, RawModule};
use crate::subscribe::{ActionSubscriber, MutationSubscriber, SubscribeOptions, Subscribers};

pub type Plugin = Box<dyn FnOnce(&Store)>;

pub struct StoreOptions {
    pub root: RawModule,
    /// Panic whenever state is written outside a mutation handler.
    pub strict: bool,
    /// Run in order once the store is fully built.
    pub plugins: Vec<Plugin>,
    pub reactive: Rc<dyn Reactive>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            root: RawModule::default(),
            strict: false,
            plugins: Vec::new(),
            reactive: Rc::new(Runtime),
        }
    }
}

impl StoreOptions {
    pub fn new(root: RawModule) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn plugin(mut self, plugin: impl FnOnce(&Store) + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn reactive(mut self, reactive: Rc<dyn Reactive>) -> Self {
        self.reactive = reactive;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModuleOptions {
    /// Keep whatever the tree already holds at the module's key instead of
    /// grafting the module's own initial state.
    pub preserve_state: bool,
}

/// Anything that names a module by its key path.
///
/// A single string is a one-key path; it is never split on `/`.
pub trait ModulePath {
    fn into_path(self) -> Vec<String>;
}

impl ModulePath for &str {
    fn into_path(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl ModulePath for String {
    fn into_path(self) -> Vec<String> {
        vec![self]
    }
}

impl ModulePath for &[&str] {
    fn into_path(self) -> Vec<String> {
        self.iter().map(|k| k.to_string()).collect()
    }
}

impl<const N: usize> ModulePath for [&str; N] {
    fn into_path(self) -> Vec<String> {
        self.iter().map(|k| k.to_string()).collect()
    }
}

impl ModulePath for &[String] {
    fn into_path(self) -> Vec<String> {
        self.to_vec()
    }
}

impl ModulePath for Vec<String> {
    fn into_path(self) -> Vec<String> {
        self
    }
}

impl ModulePath for Vec<&str> {
    fn into_path(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

pub(crate) struct StoreInner {
    pub committing: Cell<bool>,
    pub strict: bool,
    pub reactive: Rc<dyn Reactive>,
    pub tree: Rc<dyn Observable>,
    pub modules: RefCell<ModuleCollection>,
    pub registry: RefCell<Registry>,
    pub namespace_map: RefCell<HashMap<String, ModuleId>>,
    pub subscribers: Subscribers<dyn Fn(&MutationRecord, &Value)>,
    pub action_subscribers: Subscribers<ActionSubscriber>,
    pub vm: RefCell<Option<Rc<dyn ComputedScope>>>,
    pub local_getters_cache: RefCell<HashMap<String, Rc<Vec<(String, String)>>>>,
    pub strict_watcher: RefCell<Option<Dispose>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(unwatch) = self.strict_watcher.get_mut().take() {
            unwatch.run();
        }
        if let Some(vm) = self.vm.get_mut().take() {
            vm.dispose();
        }
    }
}

/// The store. Cloning is cheap and yields another handle to the same store.
///
/// ```rust
/// use serde_json::json;
/// use strata_core::{RawModule, Store, StoreOptions};
///
/// let store = Store::new(StoreOptions::new(
///     RawModule::new()
///         .state(json!({ "count": 0 }))
///         .mutation("increment", |state, by| {
///             let next = state["count"].as_i64().unwrap_or(0) + by.as_i64().unwrap_or(1);
///             state["count"] = json!(next);
///         }),
/// ))
/// .unwrap();
///
/// store.commit("increment", json!(2));
/// assert_eq!(store.state()["count"], json!(2));
/// ```
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Rc<StoreInner>,
}

/// A non-owning handle; contexts and wrapped handlers hold these so the
/// store is not kept alive by its own registries.
#[derive(Clone, Default)]
pub struct WeakStore(Weak<StoreInner>);

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.0.upgrade().map(|inner| Store { inner })
    }
}

impl Store {
    pub fn new(options: StoreOptions) -> Result<Self, StoreError> {
        let StoreOptions {
            root,
            strict,
            plugins,
            reactive,
        } = options;

        let modules = ModuleCollection::new(root)?;
        let root_id = modules.root();
        let root_state = modules
            .module(root_id)
            .map(|m| m.state.clone())
            .unwrap_or(Value::Null);
        let tree = reactive.observe(root_state);

        let store = Store {
            inner: Rc::new(StoreInner {
                committing: Cell::new(false),
                strict,
                reactive,
                tree,
                modules: RefCell::new(modules),
                registry: RefCell::new(Registry::default()),
                namespace_map: RefCell::new(HashMap::new()),
                subscribers: Subscribers::new(),
                action_subscribers: Subscribers::new(),
                vm: RefCell::new(None),
                local_getters_cache: RefCell::new(HashMap::new()),
                strict_watcher: RefCell::new(None),
            }),
        };

        install::install_module(
            &store,
            &mut Vec::new(),
            root_id,
            Install::Fresh {
                preserve_state: false,
            },
        );
        install::reset_store_vm(&store, false);
        store.flush_if_idle();

        log::debug!(
            "[strata] store created with {} module(s), strict: {strict}",
            store.inner.modules.borrow().len()
        );

        for plugin in plugins {
            plugin(&store);
        }
        Ok(store)
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_strict(&self) -> bool {
        self.inner.strict
    }

    /// Whether a mutation (or another sanctioned write) is in progress.
    pub fn is_committing(&self) -> bool {
        self.inner.committing.get()
    }

    /// Snapshot of the whole state tree.
    pub fn state(&self) -> Value {
        self.inner.tree.snapshot()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        self.inner.tree.with(f)
    }

    /// The live state tree. Writing through it outside a mutation is what
    /// strict mode reports.
    pub fn state_handle(&self) -> Rc<dyn Observable> {
        self.inner.tree.clone()
    }

    pub fn getters(&self) -> Getters {
        Getters {
            store: self.downgrade(),
        }
    }

    /// Runs every mutation handler registered for `ty`, then the
    /// subscribers.
    ///
    /// Handlers hold the state tree exclusively, so committing from inside
    /// a mutation handler panics with "state tree is already borrowed".
    /// Commits from actions, subscribers and watchers are fine.
    pub fn commit(&self, ty: impl Into<CallType>, payload: Value) {
        self.commit_with(ty, payload, CommitOptions::default())
    }

    pub fn commit_with(&self, ty: impl Into<CallType>, payload: Value, options: CommitOptions) {
        let Unified {
            ty,
            payload,
            options,
        } = unify_object_style(ty.into(), payload, options);

        let handlers: Option<SmallVec<[WrappedMutation; 2]>> = self
            .inner
            .registry
            .borrow()
            .mutations
            .get(&ty)
            .map(|list| list.iter().cloned().collect());
        let Some(handlers) = handlers else {
            log::error!("[strata] unknown mutation type: {ty}");
            return;
        };

        self.with_commit(|| {
            for handler in &handlers {
                handler(&payload);
            }
        });

        let mutation = MutationRecord { ty, payload };
        for subscriber in self.inner.subscribers.snapshot() {
            let state = self.state();
            isolate("mutation", || subscriber(&mutation, &state));
        }

        if options.silent {
            log::warn!(
                "[strata] mutation type: {}. Silent option has been removed. \
                 Use the filter functionality in the devtools",
                mutation.ty
            );
        }
        self.flush_if_idle();
    }

    /// Runs every action registered for `ty`.
    ///
    /// Nothing runs until the returned future is first polled: "before"
    /// subscribers fire then, right ahead of the handlers, and "after"/"error"
    /// subscribers run once it settles. A future dropped unpolled runs
    /// nothing. Several handlers are joined and resolve to an array of their
    /// results.
    pub fn dispatch(&self, ty: impl Into<CallType>, payload: Value) -> ActionFuture {
        let Unified { ty, payload, .. } = unify_object_style(ty.into(), payload, ());

        let handlers: Option<SmallVec<[WrappedAction; 2]>> = self
            .inner
            .registry
            .borrow()
            .actions
            .get(&ty)
            .map(|list| list.iter().cloned().collect());
        let Some(handlers) = handlers else {
            log::error!("[strata] unknown action type: {ty}");
            return future::ready(Ok(Value::Null)).boxed_local();
        };

        let action = ActionRecord { ty, payload };
        let store = self.downgrade();
        async move {
            let Some(started) = store.upgrade() else {
                return Ok(Value::Null);
            };
            for subscriber in started.inner.action_subscribers.snapshot() {
                if let Some(before) = &subscriber.before {
                    let state = started.state();
                    isolate("before action", || before(&action, &state));
                }
            }
            drop(started);

            let outcome = match handlers.as_slice() {
                [handler] => handler(action.payload.clone()).await,
                _ => {
                    let pending: Vec<ActionFuture> = handlers
                        .iter()
                        .map(|handler| handler(action.payload.clone()))
                        .collect();
                    future::try_join_all(pending).map_ok(Value::Array).await
                }
            };

            let Some(store) = store.upgrade() else {
                return outcome;
            };
            let subscribers = store.inner.action_subscribers.snapshot();
            match &outcome {
                Ok(_) => {
                    for subscriber in subscribers {
                        if let Some(after) = &subscriber.after {
                            let state = store.state();
                            isolate("after action", || after(&action, &state));
                        }
                    }
                }
                Err(err) => {
                    for subscriber in subscribers {
                        if let Some(error) = &subscriber.error {
                            let state = store.state();
                            isolate("error action", || error(&action, &state, err));
                        }
                    }
                }
            }
            outcome
        }
        .boxed_local()
    }

    /// Called after every mutation with the mutation and the state after it.
    pub fn subscribe(
        &self,
        f: impl Fn(&MutationRecord, &Value) + 'static,
        options: SubscribeOptions,
    ) -> Dispose {
        self.subscribe_rc(Rc::new(f), options)
    }

    /// Like [`Store::subscribe`], keyed by the given allocation: subscribing
    /// the same `Rc` again keeps one entry.
    pub fn subscribe_rc(&self, f: MutationSubscriber, options: SubscribeOptions) -> Dispose {
        self.inner.subscribers.add(f, options)
    }

    pub fn subscribe_action(
        &self,
        subscriber: impl Into<ActionSubscriber>,
        options: SubscribeOptions,
    ) -> Dispose {
        self.subscribe_action_rc(Rc::new(subscriber.into()), options)
    }

    pub fn subscribe_action_rc(
        &self,
        subscriber: Rc<ActionSubscriber>,
        options: SubscribeOptions,
    ) -> Dispose {
        self.inner.action_subscribers.add(subscriber, options)
    }

    /// Watches a value derived from `(state, getters)`.
    pub fn watch(
        &self,
        getter: impl Fn(&Value, &Getters) -> Value + 'static,
        callback: impl FnMut(&Value, &Value) + 'static,
        options: WatchOptions,
    ) -> Dispose {
        let store = self.downgrade();
        let source: WatchSource = Rc::new(move || match store.upgrade() {
            Some(store) => {
                let getters = store.getters();
                store.with_state(|state| getter(state, &getters))
            }
            None => Value::Null,
        });
        self.inner.tree.watch(source, Box::new(callback), options)
    }

    pub fn replace_state(&self, state: Value) {
        self.with_commit(|| {
            self.inner.tree.replace(state);
        });
        self.flush_if_idle();
    }

    pub fn register_module(
        &self,
        path: impl ModulePath,
        raw: RawModule,
        options: ModuleOptions,
    ) -> Result<(), StoreError> {
        let path = path.into_path();
        if path.is_empty() {
            return Err(StoreError::RootModule);
        }
        if self.inner.modules.borrow().is_registered(&path) {
            return Err(StoreError::AlreadyRegistered(path.join("/")));
        }

        let id = self.inner.modules.borrow_mut().register(&path, raw, true)?;
        install::install_module(
            self,
            &mut path.clone(),
            id,
            Install::Fresh {
                preserve_state: options.preserve_state,
            },
        );
        install::reset_store_vm(self, false);
        self.flush_if_idle();
        log::debug!("[strata] registered module {}", path.join("/"));
        Ok(())
    }

    pub fn unregister_module(&self, path: impl ModulePath) {
        let path = path.into_path();
        let removed = self.inner.modules.borrow_mut().unregister(&path);
        if removed && let Some((key, parent_path)) = path.split_last() {
            self.with_commit(|| {
                self.inner.tree.update(|root| {
                    let parent = crate::context::nested_mut(root, parent_path);
                    if let Some(Value::Object(parent)) = parent {
                        parent.remove(key);
                    }
                })
            });
        }
        install::reset_store(self, false);
        self.flush_if_idle();
    }

    pub fn has_module(&self, path: impl ModulePath) -> bool {
        self.inner.modules.borrow().is_registered(&path.into_path())
    }

    /// Swaps handlers on every existing module. State is kept and new
    /// modules are not added.
    pub fn hot_update(&self, raw: RawModule) -> Result<(), StoreError> {
        self.inner.modules.borrow_mut().update(&raw)?;
        install::reset_store(self, true);
        self.flush_if_idle();
        Ok(())
    }

    pub fn root_context(&self) -> LocalContext {
        let modules = self.inner.modules.borrow();
        modules
            .module(modules.root())
            .and_then(|m| m.context.clone())
            .unwrap_or_else(|| LocalContext::new(self.downgrade(), "", &[]))
    }

    /// The context of the namespaced module registered under `namespace`
    /// (with its trailing `/`). `helper` only names the caller in the log.
    pub fn module_by_namespace(&self, helper: &str, namespace: &str) -> Option<LocalContext> {
        let id = self.inner.namespace_map.borrow().get(namespace).copied();
        let context = id.and_then(|id| {
            self.inner
                .modules
                .borrow()
                .module(id)
                .and_then(|m| m.context.clone())
        });
        if context.is_none() {
            log::error!("[strata] module namespace not found in {helper}(): {namespace}");
        }
        context
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.inner.namespace_map.borrow().contains_key(namespace)
    }

    pub fn has_mutation(&self, ty: &str) -> bool {
        self.inner.registry.borrow().mutations.contains_key(ty)
    }

    pub fn has_action(&self, ty: &str) -> bool {
        self.inner.registry.borrow().actions.contains_key(ty)
    }

    /// `(local, global)` getter names under `namespace`, cached until the
    /// getters are rebuilt.
    pub(crate) fn local_getter_types(&self, namespace: &str) -> Rc<Vec<(String, String)>> {
        if let Some(cached) = self.inner.local_getters_cache.borrow().get(namespace) {
            return cached.clone();
        }
        let projection: Rc<Vec<(String, String)>> = Rc::new(
            self.getters()
                .keys()
                .into_iter()
                .filter_map(|ty| {
                    let local = ty.strip_prefix(namespace)?.to_string();
                    Some((local, ty))
                })
                .collect(),
        );
        self.inner
            .local_getters_cache
            .borrow_mut()
            .insert(namespace.to_string(), projection.clone());
        projection
    }

    /// Runs `f` with the committing gate open. The previous gate value is
    /// restored even if `f` panics.
    pub(crate) fn with_commit<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore<'a> {
            gate: &'a Cell<bool>,
            prev: bool,
        }
        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.gate.set(self.prev);
            }
        }

        let gate = &self.inner.committing;
        let _restore = Restore {
            gate,
            prev: gate.replace(true),
        };
        f()
    }

    fn flush_if_idle(&self) {
        if !self.inner.committing.get() {
            self.inner.tree.flush();
        }
    }
}

/// Root getters by fully-qualified type.
#[derive(Clone)]
pub struct Getters {
    store: WeakStore,
}

impl Getters {
    fn scope(&self) -> Option<Rc<dyn ComputedScope>> {
        let store = self.store.upgrade()?;
        store.inner.vm.borrow().clone()
    }

    /// Current value of a getter; unknown types log an error.
    pub fn get(&self, ty: &str) -> Option<Value> {
        let scope = self.scope()?;
        if !scope.contains(ty) {
            log::error!("[strata] unknown getter: {ty}");
            return None;
        }
        scope.get(ty)
    }

    pub fn contains(&self, ty: &str) -> bool {
        self.scope().is_some_and(|scope| scope.contains(ty))
    }

    /// Types in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.scope().map(|scope| scope.keys()).unwrap_or_default()
    }

    /// Evaluates every getter.
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        let Some(scope) = self.scope() else {
            return serde_json::Map::new();
        };
        scope
            .keys()
            .into_iter()
            .filter_map(|ty| scope.get(&ty).map(|v| (ty, v)))
            .collect()
    }
}
