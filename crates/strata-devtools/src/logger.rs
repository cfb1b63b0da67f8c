//! Logs every mutation with the state before and after it, and every
//! dispatched action.
//!
//! ```rust
//! use serde_json::json;
//! use strata_core::*;
//! use strata_devtools::{LoggerOptions, create_logger};
//!
//! let store = Store::new(
//!     StoreOptions::new(
//!         RawModule::new()
//!             .state(json!({ "n": 0 }))
//!             .mutation("set", |state, n| state["n"] = n.clone()),
//!     )
//!     .plugin(create_logger(LoggerOptions::default().collapsed(false))),
//! )
//! .unwrap();
//! store.commit("set", json!(1));
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Local};
use serde_json::Value;
use strata_core::{ActionRecord, MutationRecord, Store, SubscribeOptions};

/// Where log groups go. The default writes through the `log` facade.
pub trait LogSink {
    fn group(&self, title: &str, collapsed: bool);
    fn log(&self, label: &str, value: &Value);
    fn group_end(&self);
}

/// Writes to the `log` facade under the `strata::logger` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn group(&self, title: &str, collapsed: bool) {
        let marker = if collapsed { '+' } else { '-' };
        log::info!(target: "strata::logger", "{marker} {title}");
    }

    fn log(&self, label: &str, value: &Value) {
        log::info!(target: "strata::logger", "  {label}: {value}");
    }

    fn group_end(&self) {}
}

pub type MutationFilter = Rc<dyn Fn(&MutationRecord, &Value, &Value) -> bool>;
pub type ActionFilter = Rc<dyn Fn(&ActionRecord, &Value) -> bool>;
pub type StateTransformer = Rc<dyn Fn(&Value) -> Value>;
pub type MutationTransformer = Rc<dyn Fn(&MutationRecord) -> Value>;
pub type ActionTransformer = Rc<dyn Fn(&ActionRecord) -> Value>;

#[derive(Clone)]
pub struct LoggerOptions {
    pub collapsed: bool,
    /// `(mutation, state_before, state_after)`; false skips the entry.
    pub filter: MutationFilter,
    /// Applied to both state snapshots before logging.
    pub transformer: StateTransformer,
    pub mutation_transformer: MutationTransformer,
    pub action_filter: ActionFilter,
    pub action_transformer: ActionTransformer,
    pub log_mutations: bool,
    pub log_actions: bool,
    pub sink: Rc<dyn LogSink>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            collapsed: true,
            filter: Rc::new(|_: &MutationRecord, _: &Value, _: &Value| true),
            transformer: Rc::new(Value::clone),
            mutation_transformer: Rc::new(record_value::<MutationRecord>),
            action_filter: Rc::new(|_: &ActionRecord, _: &Value| true),
            action_transformer: Rc::new(record_value::<ActionRecord>),
            log_mutations: true,
            log_actions: true,
            sink: Rc::new(FacadeSink),
        }
    }
}

fn record_value<T: serde::Serialize>(record: &T) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

impl LoggerOptions {
    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }

    pub fn filter(
        mut self,
        f: impl Fn(&MutationRecord, &Value, &Value) -> bool + 'static,
    ) -> Self {
        self.filter = Rc::new(f);
        self
    }

    pub fn transformer(mut self, f: impl Fn(&Value) -> Value + 'static) -> Self {
        self.transformer = Rc::new(f);
        self
    }

    pub fn mutation_transformer(
        mut self,
        f: impl Fn(&MutationRecord) -> Value + 'static,
    ) -> Self {
        self.mutation_transformer = Rc::new(f);
        self
    }

    pub fn action_filter(
        mut self,
        f: impl Fn(&ActionRecord, &Value) -> bool + 'static,
    ) -> Self {
        self.action_filter = Rc::new(f);
        self
    }

    pub fn action_transformer(mut self, f: impl Fn(&ActionRecord) -> Value + 'static) -> Self {
        self.action_transformer = Rc::new(f);
        self
    }

    pub fn log_mutations(mut self, on: bool) -> Self {
        self.log_mutations = on;
        self
    }

    pub fn log_actions(mut self, on: bool) -> Self {
        self.log_actions = on;
        self
    }

    pub fn sink(mut self, sink: Rc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// A plugin that logs through `options.sink`.
pub fn create_logger(options: LoggerOptions) -> impl FnOnce(&Store) {
    move |store: &Store| {
        if options.log_mutations {
            let prev_state = RefCell::new(store.state());
            let opts = options.clone();
            store.subscribe(
                move |mutation, state| {
                    // JSON trees cannot be cyclic, so a clone is a deep copy.
                    let next_state = state.clone();
                    let prev = prev_state.replace(next_state.clone());

                    if (opts.filter)(mutation, &prev, &next_state) {
                        let now = formatted_time(Local::now());
                        let title = format!("mutation {} @ {now}", mutation.ty);
                        opts.sink.group(&title, opts.collapsed);
                        opts.sink.log("prev state", &(opts.transformer)(&prev));
                        opts.sink.log("mutation", &(opts.mutation_transformer)(mutation));
                        opts.sink.log("next state", &(opts.transformer)(&next_state));
                        opts.sink.group_end();
                    }
                },
                SubscribeOptions::default(),
            );
        }

        if options.log_actions {
            let opts = options;
            store.subscribe_action(
                move |action: &ActionRecord, state: &Value| {
                    if (opts.action_filter)(action, state) {
                        let now = formatted_time(Local::now());
                        let title = format!("action {} @ {now}", action.ty);
                        opts.sink.group(&title, opts.collapsed);
                        opts.sink.log("action", &(opts.action_transformer)(action));
                        opts.sink.group_end();
                    }
                },
                SubscribeOptions::default(),
            );
        }
    }
}

/// `HH:MM:SS.mmm` in local time.
pub fn formatted_time(at: DateTime<Local>) -> String {
    at.format("%H:%M:%S%.3f").to_string()
}
