//! # Devtools bridge
//!
//! `devtools_plugin` connects a store to anything implementing
//! [`DevtoolHook`]: an inspector window, a test harness, a socket. The hook
//! receives an event for store creation, every mutation, every dispatched
//! action, and every failed action. It can send one command back,
//! `strata:travel-to-state`, which replaces the store's state.
//!
//! ```rust
//! use std::rc::Rc;
//! use serde_json::json;
//! use strata_core::*;
//! use strata_devtools::*;
//!
//! let hub = Rc::new(EventHub::new());
//! let store = Store::new(
//!     StoreOptions::new(RawModule::new().state(json!({ "n": 0 })))
//!         .plugin(devtools_plugin(hub.clone())),
//! )
//! .unwrap();
//!
//! hub.send(TRAVEL_TO_STATE, &json!({ "n": 5 }));
//! assert_eq!(store.state()["n"], json!(5));
//! assert_eq!(hub.events()[0].name(), "strata:init");
//! ```
//!
//! [`logger`] holds the other plugin, which logs mutations and actions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;
use strata_core::{ActionRecord, ActionSubscriber, MutationRecord, Store, SubscribeOptions};

pub mod logger;

pub use logger::*;

/// Command a hook sends to move the store to another state.
pub const TRAVEL_TO_STATE: &str = "strata:travel-to-state";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum DevtoolEvent {
    #[serde(rename = "strata:init")]
    Init { state: Value },
    #[serde(rename = "strata:mutation")]
    Mutation {
        mutation: MutationRecord,
        state: Value,
    },
    #[serde(rename = "strata:action")]
    Action {
        action: ActionRecord,
        state: Value,
    },
    #[serde(rename = "strata:error")]
    Error {
        action: ActionRecord,
        message: String,
    },
}

impl DevtoolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DevtoolEvent::Init { .. } => "strata:init",
            DevtoolEvent::Mutation { .. } => "strata:mutation",
            DevtoolEvent::Action { .. } => "strata:action",
            DevtoolEvent::Error { .. } => "strata:error",
        }
    }
}

pub type CommandHandler = Box<dyn Fn(&Value)>;

pub trait DevtoolHook {
    fn emit(&self, event: DevtoolEvent);
    /// Registers a handler for a command sent by the tool.
    fn on(&self, command: &str, handler: CommandHandler);
}

/// In-process hook: records emitted events and routes commands to the
/// handlers registered with `on`.
#[derive(Default)]
pub struct EventHub {
    events: RefCell<Vec<DevtoolEvent>>,
    handlers: RefCell<HashMap<String, Vec<Rc<dyn Fn(&Value)>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DevtoolEvent> {
        self.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<DevtoolEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Delivers a command; returns how many handlers received it.
    pub fn send(&self, command: &str, payload: &Value) -> usize {
        let handlers: Vec<Rc<dyn Fn(&Value)>> = self
            .handlers
            .borrow()
            .get(command)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            log::debug!("[strata] no devtools handler for {command}");
        }
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }
}

impl DevtoolHook for EventHub {
    fn emit(&self, event: DevtoolEvent) {
        if log::log_enabled!(log::Level::Trace) {
            match serde_json::to_string(&event) {
                Ok(json) => log::trace!("[strata] devtools: {json}"),
                Err(err) => log::warn!("[strata] devtools event not serializable: {err}"),
            }
        }
        self.events.borrow_mut().push(event);
    }

    fn on(&self, command: &str, handler: CommandHandler) {
        self.handlers
            .borrow_mut()
            .entry(command.to_string())
            .or_default()
            .push(Rc::from(handler));
    }
}

/// Wires a store to `hook`. Pass the result to `StoreOptions::plugin`.
///
/// Devtools subscribers are prepended so the tool sees a mutation before any
/// subscriber registered earlier.
pub fn devtools_plugin(hook: Rc<dyn DevtoolHook>) -> impl FnOnce(&Store) {
    move |store: &Store| {
        hook.emit(DevtoolEvent::Init {
            state: store.state(),
        });

        let target = store.downgrade();
        hook.on(
            TRAVEL_TO_STATE,
            Box::new(move |state: &Value| {
                if let Some(store) = target.upgrade() {
                    store.replace_state(state.clone());
                }
            }),
        );

        let mutations = hook.clone();
        store.subscribe(
            move |mutation, state| {
                mutations.emit(DevtoolEvent::Mutation {
                    mutation: mutation.clone(),
                    state: state.clone(),
                })
            },
            SubscribeOptions::prepend(),
        );

        let (actions, errors) = (hook.clone(), hook);
        store.subscribe_action(
            ActionSubscriber::new()
                .before(move |action, state| {
                    actions.emit(DevtoolEvent::Action {
                        action: action.clone(),
                        state: state.clone(),
                    })
                })
                .error(move |action, _, err| {
                    errors.emit(DevtoolEvent::Error {
                        action: action.clone(),
                        message: format!("{err:#}"),
                    })
                }),
            SubscribeOptions::prepend(),
        );
    }
}
