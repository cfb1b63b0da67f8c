use std::rc::Rc;

use futures::executor::block_on;
use serde_json::{Value, json};
use strata_core::prelude::*;
use strata_devtools::{EventHub, LoggerOptions, TRAVEL_TO_STATE, create_logger, devtools_plugin};

fn count(state: &Value) -> i64 {
    state["count"].as_i64().unwrap_or(0)
}

fn counter() -> RawModule {
    RawModule::new()
        .namespaced(true)
        .state(json!({ "count": 0 }))
        .mutation("increment", |state, by| {
            state["count"] = json!(count(state) + by.as_i64().unwrap_or(1));
        })
        .mutation("decrement", |state, _| {
            state["count"] = json!(count(state) - 1);
        })
        .action("increment_async", |ctx: ActionContext, by| async move {
            ctx.commit("increment", by);
            ctx.commit_with(
                "history/push",
                json!(format!("counter is now {}", count(&ctx.state()))),
                CommitOptions {
                    root: true,
                    ..Default::default()
                },
            );
            anyhow::Ok(json!(count(&ctx.state())))
        })
        .getter("parity", |state, _, _, _| {
            json!(if count(state) % 2 == 0 { "even" } else { "odd" })
        })
}

fn history() -> RawModule {
    RawModule::new()
        .namespaced(true)
        .state(json!({ "entries": [] }))
        .mutation("push", |state, entry| {
            if let Some(entries) = state["entries"].as_array_mut() {
                entries.push(entry.clone());
            }
        })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let hub = Rc::new(EventHub::new());
    let store = Store::new(
        StoreOptions::new(
            RawModule::new()
                .module("counter", counter())
                .module("history", history()),
        )
        .strict(true)
        .plugin(create_logger(LoggerOptions::default()))
        .plugin(devtools_plugin(hub.clone())),
    )?;

    let unwatch = store.watch(
        |_, getters| getters.get("counter/parity").unwrap_or(Value::Null),
        |next, prev| log::info!("parity {prev} -> {next}"),
        WatchOptions::empty(),
    );

    let helpers = namespaced_helpers(&store, "counter");
    let mutations = helpers.map_mutations(names(["increment", "decrement"]));
    let state = helpers.map_state(names(["count"]));

    mutations["increment"](json!(2));
    mutations["decrement"](Value::Null);
    let now = block_on(store.dispatch("counter/increment_async", json!(5)))?;
    println!("count after dispatch: {now}");
    println!("count via helper: {}", state["count"]());

    let snapshot = store.state();
    mutations["increment"](json!(100));
    hub.send(TRAVEL_TO_STATE, &snapshot);
    println!("after travel: {}", store.state()["counter"]["count"]);

    store.register_module(
        "extra",
        RawModule::new().state(json!({ "note": "registered at runtime" })),
        ModuleOptions::default(),
    )?;
    println!("state: {}", store.state());
    store.unregister_module("extra");

    unwatch.run();
    println!("devtools saw {} events", hub.events().len());
    Ok(())
}
