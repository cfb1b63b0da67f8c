//! Module definitions and the nodes of the module tree.

use std::future::Future;
use std::rc::Rc;

use bitflags::bitflags;
use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use serde_json::{Map, Value};
use slotmap::new_key_type;

use crate::context::{ActionContext, LocalContext, LocalGetters};
use crate::store::Getters;

new_key_type! {
    /// Arena key of a registered module.
    pub struct ModuleId;
}

/// What every action resolves to.
pub type ActionFuture = LocalBoxFuture<'static, anyhow::Result<Value>>;

pub type MutationHandler = Rc<dyn Fn(&mut Value, &Value)>;
pub type ActionHandler = Rc<dyn Fn(ActionContext, Value) -> ActionFuture>;
pub type GetterHandler = Rc<dyn Fn(&Value, &LocalGetters, &Value, &Getters) -> Value>;

/// An action as declared on a module.
#[derive(Clone)]
pub struct ActionDef {
    /// Register under the bare key even inside a namespaced module.
    pub root: bool,
    pub handler: ActionHandler,
}

bitflags! {
    /// Handler maps a definition declares. A hot update replaces exactly the
    /// declared maps, so declaring one with no entries clears it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct HandlerKinds: u8 {
        const MUTATIONS = 1 << 0;
        const ACTIONS = 1 << 1;
        const GETTERS = 1 << 2;
    }
}

#[derive(Clone)]
pub enum StateDef {
    Value(Value),
    Factory(Rc<dyn Fn() -> Value>),
}

impl StateDef {
    fn materialize(&self) -> Value {
        let v = match self {
            StateDef::Value(v) => v.clone(),
            StateDef::Factory(f) => f(),
        };
        if v.is_null() {
            Value::Object(Map::new())
        } else {
            v
        }
    }
}

/// A module definition: a slice of state plus its handlers and children.
///
/// Entries keep their declaration order; registering the same key twice on
/// one definition replaces the earlier entry in place.
///
/// ```rust
/// use serde_json::json;
/// use strata_core::RawModule;
///
/// let counter = RawModule::new()
///     .state(json!({ "count": 0 }))
///     .mutation("increment", |state, _| {
///         state["count"] = json!(state["count"].as_i64().unwrap_or(0) + 1);
///     })
///     .action_sync("increment_later", |ctx, _| {
///         ctx.commit("increment", json!(null));
///         Ok(json!(null))
///     })
///     .getter("is_positive", |state, _, _, _| json!(state["count"].as_i64() > Some(0)));
/// ```
#[derive(Clone, Default)]
pub struct RawModule {
    pub(crate) state: Option<StateDef>,
    pub(crate) namespaced: bool,
    pub(crate) mutations: Vec<(String, MutationHandler)>,
    pub(crate) actions: Vec<(String, ActionDef)>,
    pub(crate) getters: Vec<(String, GetterHandler)>,
    pub(crate) modules: Vec<(String, RawModule)>,
    pub(crate) declared: HandlerKinds,
}

fn upsert<T>(entries: &mut Vec<(String, T)>, key: String, value: T) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

impl RawModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(StateDef::Value(state));
        self
    }

    /// State produced by a factory, so each registration gets a fresh value.
    pub fn state_fn(mut self, f: impl Fn() -> Value + 'static) -> Self {
        self.state = Some(StateDef::Factory(Rc::new(f)));
        self
    }

    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    /// Mutations run with the tree borrowed exclusively: committing from
    /// inside a handler panics with "state tree is already borrowed".
    /// Commit from an action or subscriber instead.
    pub fn mutation(
        mut self,
        key: impl Into<String>,
        f: impl Fn(&mut Value, &Value) + 'static,
    ) -> Self {
        let handler: MutationHandler = Rc::new(f);
        upsert(&mut self.mutations, key.into(), handler);
        self.declared |= HandlerKinds::MUTATIONS;
        self
    }

    pub fn action<F, Fut>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + 'static,
    {
        self.action_def(
            key,
            ActionDef {
                root: false,
                handler: Rc::new(move |ctx: ActionContext, payload: Value| {
                    f(ctx, payload).boxed_local()
                }),
            },
        )
    }

    /// An action whose result is ready immediately; it is still settled
    /// through a future like every other action.
    pub fn action_sync(
        self,
        key: impl Into<String>,
        f: impl Fn(ActionContext, Value) -> anyhow::Result<Value> + 'static,
    ) -> Self {
        self.action_def(
            key,
            ActionDef {
                root: false,
                handler: Rc::new(move |ctx: ActionContext, payload: Value| {
                    future::ready(f(ctx, payload)).boxed_local()
                }),
            },
        )
    }

    /// An action registered under its bare key, even inside a namespaced
    /// module.
    pub fn root_action<F, Fut>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + 'static,
    {
        self.action_def(
            key,
            ActionDef {
                root: true,
                handler: Rc::new(move |ctx: ActionContext, payload: Value| {
                    f(ctx, payload).boxed_local()
                }),
            },
        )
    }

    pub fn action_def(mut self, key: impl Into<String>, def: ActionDef) -> Self {
        upsert(&mut self.actions, key.into(), def);
        self.declared |= HandlerKinds::ACTIONS;
        self
    }

    /// Marks handler maps as declared without adding entries to them.
    pub fn declare(mut self, kinds: HandlerKinds) -> Self {
        self.declared |= kinds;
        self
    }

    pub fn getter(
        mut self,
        key: impl Into<String>,
        f: impl Fn(&Value, &LocalGetters, &Value, &Getters) -> Value + 'static,
    ) -> Self {
        let handler: GetterHandler = Rc::new(f);
        upsert(&mut self.getters, key.into(), handler);
        self.declared |= HandlerKinds::GETTERS;
        self
    }

    pub fn module(mut self, key: impl Into<String>, module: RawModule) -> Self {
        upsert(&mut self.modules, key.into(), module);
        self
    }

    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }
}

/// A registered node of the module tree.
pub struct Module {
    pub(crate) raw: RawModule,
    /// State materialized once at registration; grafted into the tree at
    /// install time.
    pub(crate) state: Value,
    pub(crate) children: Vec<(String, ModuleId)>,
    pub(crate) runtime: bool,
    pub(crate) context: Option<LocalContext>,
}

impl Module {
    pub(crate) fn new(raw: RawModule, runtime: bool) -> Self {
        let state = raw
            .state
            .as_ref()
            .map(StateDef::materialize)
            .unwrap_or_else(|| Value::Object(Map::new()));
        Self {
            raw,
            state,
            children: Vec::new(),
            runtime,
            context: None,
        }
    }

    pub fn namespaced(&self) -> bool {
        self.raw.namespaced
    }

    pub fn runtime(&self) -> bool {
        self.runtime
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn context(&self) -> Option<&LocalContext> {
        self.context.as_ref()
    }

    pub fn child(&self, key: &str) -> Option<ModuleId> {
        self.children
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, id)| *id)
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.child(key).is_some()
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, ModuleId)> {
        self.children.iter().map(|(k, id)| (k.as_str(), *id))
    }

    /// Hot-reload: take over the declared handler maps and the namespaced
    /// flag; state stays.
    pub(crate) fn update(&mut self, raw: &RawModule) {
        self.raw.namespaced = raw.namespaced;
        if raw.declared.contains(HandlerKinds::ACTIONS) {
            self.raw.actions = raw.actions.clone();
        }
        if raw.declared.contains(HandlerKinds::MUTATIONS) {
            self.raw.mutations = raw.mutations.clone();
        }
        if raw.declared.contains(HandlerKinds::GETTERS) {
            self.raw.getters = raw.getters.clone();
        }
    }
}
