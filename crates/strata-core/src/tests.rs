#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::task::{Context, Poll};

    use futures::FutureExt;
    use futures::channel::oneshot;
    use futures::executor::block_on;
    use futures::task::noop_waker_ref;
    use serde_json::{Value, json};

    use crate::*;

    fn int(v: &Value) -> i64 {
        v.as_i64().unwrap_or(0)
    }

    fn counter() -> RawModule {
        RawModule::new()
            .state(json!({ "count": 0 }))
            .mutation("increment", |state, by| {
                let by = by.as_i64().unwrap_or(1);
                state["count"] = json!(int(&state["count"]) + by);
            })
            .action("async_increment", |ctx: ActionContext, _| async move {
                ctx.commit("increment", Value::Null);
                anyhow::Ok(Value::Null)
            })
            .getter("double", |state, _, _, _| json!(int(&state["count"]) * 2))
    }

    fn store_of(root: RawModule) -> Store {
        Store::new(StoreOptions::new(root)).unwrap()
    }

    fn path(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_namespace_is_namespaced_ancestors() {
        let root = RawModule::new().module(
            "a",
            RawModule::new().namespaced(true).module(
                "b",
                RawModule::new().module("c", RawModule::new().namespaced(true)),
            ),
        );
        let modules = ModuleCollection::new(root).unwrap();

        assert_eq!(modules.get_namespace(&[]), "");
        assert_eq!(modules.get_namespace(&path(&["a"])), "a/");
        assert_eq!(modules.get_namespace(&path(&["a", "b"])), "a/");
        assert_eq!(modules.get_namespace(&path(&["a", "b", "c"])), "a/c/");
        assert!(modules.get(&path(&["a", "b", "c"])).is_some());
        assert!(modules.get(&path(&["a", "x"])).is_none());
    }

    #[test]
    fn test_counter_scenario() {
        let store = store_of(counter());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        store.subscribe(
            move |m, _| s.borrow_mut().push(m.ty.clone()),
            SubscribeOptions::default(),
        );

        let result = block_on(store.dispatch("async_increment", Value::Null));
        assert!(result.is_ok());
        assert_eq!(store.state()["count"], json!(1));
        assert_eq!(*seen.borrow(), vec!["increment".to_string()]);
        assert_eq!(store.getters().get("double"), Some(json!(2)));
    }

    #[test]
    fn test_commit_runs_every_handler_before_subscribers() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let module = |name: &'static str, order: Rc<RefCell<Vec<&'static str>>>| {
            RawModule::new().mutation("x", move |_, _| order.borrow_mut().push(name))
        };
        let store = store_of(
            RawModule::new()
                .module("first", module("first", order.clone()))
                .module("second", module("second", order.clone())),
        );

        let o = order.clone();
        store.subscribe(
            move |m, _| {
                assert_eq!(m.ty, "x");
                o.borrow_mut().push("subscriber");
            },
            SubscribeOptions::default(),
        );

        store.commit("x", json!(1));
        assert_eq!(*order.borrow(), vec!["first", "second", "subscriber"]);
    }

    #[test]
    fn test_subscriber_sees_state_after_mutation() {
        let store = store_of(counter());
        let seen = Rc::new(Cell::new(0));

        let s = seen.clone();
        store.subscribe(
            move |m, state| {
                assert_eq!(m.payload, json!(5));
                s.set(int(&state["count"]));
            },
            SubscribeOptions::default(),
        );

        store.commit("increment", json!(5));
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn test_dispatch_waits_for_every_handler() {
        let (tx_a, rx_a) = oneshot::channel::<Value>();
        let (tx_b, rx_b) = oneshot::channel::<Value>();

        let waiting = |rx: oneshot::Receiver<Value>| {
            let rx = RefCell::new(Some(rx));
            RawModule::new().action("load", move |_, _| {
                let rx = rx.borrow_mut().take();
                async move {
                    match rx {
                        Some(rx) => anyhow::Ok(rx.await?),
                        None => anyhow::Ok(Value::Null),
                    }
                }
            })
        };
        let store = store_of(
            RawModule::new()
                .module("a", waiting(rx_a))
                .module("b", waiting(rx_b)),
        );

        let mut cx = Context::from_waker(noop_waker_ref());
        let mut pending = store.dispatch("load", Value::Null);
        assert!(pending.poll_unpin(&mut cx).is_pending());

        tx_a.send(json!(1)).unwrap();
        assert!(pending.poll_unpin(&mut cx).is_pending());

        tx_b.send(json!(2)).unwrap();
        match pending.poll_unpin(&mut cx) {
            Poll::Ready(Ok(value)) => assert_eq!(value, json!([1, 2])),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_error_reaches_error_subscribers_only() {
        let store = store_of(
            RawModule::new()
                .module("ok", RawModule::new().action_sync("run", |_, _| Ok(json!("fine"))))
                .module(
                    "bad",
                    RawModule::new().action_sync("run", |_, _| Err(anyhow::anyhow!("boom"))),
                ),
        );

        let events = Rc::new(RefCell::new(Vec::new()));
        let (before, after, error) = (events.clone(), events.clone(), events.clone());
        store.subscribe_action(
            ActionSubscriber::new()
                .before(move |a, _| before.borrow_mut().push(format!("before {}", a.ty)))
                .after(move |a, _| after.borrow_mut().push(format!("after {}", a.ty)))
                .error(move |a, _, err| error.borrow_mut().push(format!("error {} {err}", a.ty))),
            SubscribeOptions::default(),
        );

        let err = block_on(store.dispatch("run", Value::Null)).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(
            *events.borrow(),
            vec!["before run".to_string(), "error run boom".to_string()]
        );
    }

    #[test]
    fn test_dispatch_runs_nothing_until_polled() {
        let store = store_of(counter());
        let before = Rc::new(Cell::new(0));

        let b = before.clone();
        store.subscribe_action(
            move |_: &ActionRecord, _: &Value| b.set(b.get() + 1),
            SubscribeOptions::default(),
        );

        drop(store.dispatch("async_increment", Value::Null));
        assert_eq!(before.get(), 0);
        assert_eq!(store.state()["count"], json!(0));

        let pending = store.dispatch("async_increment", Value::Null);
        assert_eq!(before.get(), 0);
        block_on(pending).unwrap();
        assert_eq!(before.get(), 1);
        assert_eq!(store.state()["count"], json!(1));
    }

    #[test]
    fn test_action_subscribers_before_and_after() {
        let store = store_of(counter());
        let events = Rc::new(RefCell::new(Vec::new()));

        let e = events.clone();
        store.subscribe_action(
            move |a: &ActionRecord, state: &Value| {
                e.borrow_mut().push(format!("{} at {}", a.ty, state["count"]))
            },
            SubscribeOptions::default(),
        );
        let e = events.clone();
        store.subscribe_action(
            ActionSubscriber::new().after(move |a, state| {
                e.borrow_mut()
                    .push(format!("{} done at {}", a.ty, state["count"]))
            }),
            SubscribeOptions::default(),
        );

        block_on(store.dispatch("async_increment", Value::Null)).unwrap();
        assert_eq!(
            *events.borrow(),
            vec![
                "async_increment at 0".to_string(),
                "async_increment done at 1".to_string()
            ]
        );
    }

    #[test]
    fn test_unsubscribe_during_notification_keeps_snapshot() {
        let store = store_of(counter());
        let calls = Rc::new(RefCell::new(Vec::new()));
        let second: Rc<RefCell<Option<Dispose>>> = Rc::new(RefCell::new(None));

        let (c, s) = (calls.clone(), second.clone());
        store.subscribe(
            move |_, _| {
                c.borrow_mut().push("first");
                if let Some(unsubscribe) = s.borrow_mut().take() {
                    unsubscribe.run();
                }
            },
            SubscribeOptions::default(),
        );
        let c = calls.clone();
        let unsubscribe = store.subscribe(
            move |_, _| c.borrow_mut().push("second"),
            SubscribeOptions::default(),
        );
        *second.borrow_mut() = Some(unsubscribe);

        store.commit("increment", Value::Null);
        store.commit("increment", Value::Null);
        assert_eq!(*calls.borrow(), vec!["first", "second", "first"]);
    }

    #[test]
    fn test_prepend_and_duplicate_subscriptions() {
        let store = store_of(counter());
        let calls = Rc::new(RefCell::new(Vec::new()));

        let c = calls.clone();
        let shared: MutationSubscriber =
            Rc::new(move |_: &MutationRecord, _: &Value| c.borrow_mut().push("shared"));
        store.subscribe_rc(shared.clone(), SubscribeOptions::default());
        store.subscribe_rc(shared, SubscribeOptions::default());

        let c = calls.clone();
        store.subscribe(move |_, _| c.borrow_mut().push("front"), SubscribeOptions::prepend());

        store.commit("increment", Value::Null);
        assert_eq!(*calls.borrow(), vec!["front", "shared"]);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let store = store_of(counter());
        let reached = Rc::new(Cell::new(false));

        store.subscribe(|_, _| panic!("subscriber failure"), SubscribeOptions::default());
        let r = reached.clone();
        store.subscribe(move |_, _| r.set(true), SubscribeOptions::default());

        store.commit("increment", Value::Null);
        assert!(reached.get());
        assert_eq!(store.state()["count"], json!(1));
    }

    #[test]
    #[should_panic(expected = "do not mutate store state outside mutation handlers")]
    fn test_strict_mode_rejects_outside_writes() {
        let store = Store::new(StoreOptions::new(counter()).strict(true)).unwrap();
        store.state_handle().update(|s| s["count"] = json!(10));
    }

    #[test]
    fn test_strict_mode_allows_sanctioned_writes() {
        let store = Store::new(StoreOptions::new(counter()).strict(true)).unwrap();
        store.commit("increment", Value::Null);
        store.replace_state(json!({ "count": 7 }));
        store
            .register_module(
                "extra",
                RawModule::new().state(json!({ "on": true })),
                ModuleOptions::default(),
            )
            .unwrap();
        store.unregister_module("extra");
        assert_eq!(store.state(), json!({ "count": 7 }));
        assert!(!store.is_committing());
    }

    #[test]
    #[should_panic(expected = "state tree is already borrowed")]
    fn test_commit_inside_mutation_handler_panics() {
        let slot: Rc<RefCell<WeakStore>> = Rc::default();
        let s = slot.clone();
        let store = store_of(counter().mutation("nested", move |_, _| {
            if let Some(store) = s.borrow().upgrade() {
                store.commit("increment", Value::Null);
            }
        }));
        *slot.borrow_mut() = store.downgrade();
        store.commit("nested", Value::Null);
    }

    #[test]
    fn test_committing_gate_restored_after_panicking_mutation() {
        let store = store_of(
            RawModule::new().mutation("explode", |_, _| panic!("mutation failure")),
        );
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.commit("explode", Value::Null)
        }));
        assert!(outcome.is_err());
        assert!(!store.is_committing());
    }

    #[test]
    fn test_register_and_unregister_nested_module() {
        let store = store_of(RawModule::new());
        store
            .register_module("a", RawModule::new().namespaced(true), ModuleOptions::default())
            .unwrap();
        store
            .register_module(
                ["a", "b"],
                RawModule::new()
                    .namespaced(true)
                    .state(json!({ "n": 0 }))
                    .mutation("m", |state, _| state["n"] = json!(int(&state["n"]) + 1)),
                ModuleOptions::default(),
            )
            .unwrap();

        assert!(store.has_module(["a", "b"]));
        assert!(store.has_namespace("a/b/"));
        store.commit("a/b/m", Value::Null);
        assert_eq!(store.state()["a"]["b"]["n"], json!(1));

        store.unregister_module(["a", "b"]);
        assert!(!store.has_module(["a", "b"]));
        assert!(!store.has_namespace("a/b/"));
        assert!(store.state()["a"].get("b").is_none());

        store.commit("a/b/m", Value::Null);
        assert!(!store.has_mutation("a/b/m"));
    }

    #[test]
    fn test_register_module_errors() {
        let store = store_of(counter().module("fixed", RawModule::new()));

        assert_eq!(
            store.register_module(Vec::<String>::new(), RawModule::new(), ModuleOptions::default()),
            Err(StoreError::RootModule)
        );
        assert_eq!(
            store.register_module("fixed", RawModule::new(), ModuleOptions::default()),
            Err(StoreError::AlreadyRegistered("fixed".into()))
        );
        assert!(matches!(
            store.register_module(["missing", "child"], RawModule::new(), ModuleOptions::default()),
            Err(StoreError::ParentNotFound(_))
        ));
    }

    #[test]
    fn test_static_module_refuses_unregistration() {
        let store = store_of(RawModule::new().module("fixed", counter()));
        store.unregister_module("fixed");
        assert!(store.has_module("fixed"));
        assert_eq!(store.state()["fixed"]["count"], json!(0));

        // unknown paths only warn
        store.unregister_module(["nope", "deeper"]);
    }

    #[test]
    fn test_preserve_state_keeps_existing_field() {
        let store = store_of(RawModule::new().state(json!({ "restored": { "count": 41 } })));
        store
            .register_module("restored", counter(), ModuleOptions { preserve_state: true })
            .unwrap();

        store.commit("increment", Value::Null);
        assert_eq!(store.state()["restored"]["count"], json!(42));
    }

    #[test]
    fn test_state_factory_runs_once_per_registration() {
        let produced = Rc::new(Cell::new(0));
        let p = produced.clone();
        let reusable = RawModule::new().state_fn(move || {
            p.set(p.get() + 1);
            json!({ "items": [] })
        });

        let store = store_of(RawModule::new().module("one", reusable.clone()));
        store
            .register_module("two", reusable, ModuleOptions::default())
            .unwrap();

        assert_eq!(produced.get(), 2);
        assert_eq!(store.state()["one"], json!({ "items": [] }));
        assert_eq!(store.state()["two"], json!({ "items": [] }));
    }

    #[test]
    fn test_hot_update_swaps_handlers_and_keeps_state() {
        let store = store_of(RawModule::new().module("c", counter()));
        store.commit("increment", Value::Null);
        assert_eq!(store.getters().get("double"), Some(json!(2)));

        store
            .hot_update(
                RawModule::new().module(
                    "c",
                    RawModule::new()
                        .mutation("increment", |state, _| {
                            state["count"] = json!(int(&state["count"]) + 10)
                        })
                        .getter("double", |state, _, _, _| json!(int(&state["count"]) * 100)),
                ),
            )
            .unwrap();

        assert_eq!(store.state()["c"]["count"], json!(1));
        assert_eq!(store.getters().get("double"), Some(json!(100)));
        store.commit("increment", Value::Null);
        assert_eq!(store.state()["c"]["count"], json!(11));
        // actions were not redeclared, so they survive
        assert!(store.has_action("async_increment"));
    }

    #[test]
    fn test_hot_update_cannot_add_modules() {
        let store = store_of(RawModule::new().module("c", counter()));
        store
            .hot_update(RawModule::new().module("new", counter()))
            .unwrap();
        assert!(!store.has_module("new"));
        assert!(store.state().get("new").is_none());
    }

    #[test]
    fn test_hot_update_reruns_getter_watchers() {
        let store = store_of(counter());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        store.watch(
            |_, getters| getters.get("double").unwrap_or(Value::Null),
            move |next, _| s.borrow_mut().push(next.clone()),
            WatchOptions::empty(),
        );

        store
            .hot_update(
                RawModule::new()
                    .getter("double", |state, _, _, _| json!(int(&state["count"]) * 2 + 1)),
            )
            .unwrap();
        assert_eq!(*seen.borrow(), vec![json!(1)]);
    }

    #[test]
    fn test_hot_update_clears_declared_empty_maps() {
        let store = store_of(RawModule::new().module("c", counter()));
        assert!(store.has_action("async_increment"));

        store
            .hot_update(RawModule::new().module(
                "c",
                RawModule::new().declare(HandlerKinds::ACTIONS | HandlerKinds::GETTERS),
            ))
            .unwrap();

        assert!(!store.has_action("async_increment"));
        assert_eq!(store.getters().get("double"), None);
        // mutations were not declared, so they survive
        store.commit("increment", Value::Null);
        assert_eq!(store.state()["c"]["count"], json!(1));
    }

    #[test]
    fn test_namespaced_local_context() {
        let cart = RawModule::new()
            .namespaced(true)
            .state(json!({ "items": [] }))
            .mutation("add", |state, item| {
                if let Some(items) = state["items"].as_array_mut() {
                    items.push(item.clone());
                }
            })
            .getter("count", |state, _, _, _| {
                json!(state["items"].as_array().map_or(0, Vec::len))
            })
            .getter("summary", |_, local, root_state, root| {
                json!(format!(
                    "{} items, total {}",
                    local.get("count").unwrap_or(Value::Null),
                    root.get("total").unwrap_or(root_state["total"].clone())
                ))
            })
            .action("checkout", |ctx: ActionContext, item| async move {
                ctx.commit("add", item);
                ctx.commit_with(
                    "log",
                    json!("checkout"),
                    CommitOptions {
                        root: true,
                        ..Default::default()
                    },
                );
                anyhow::Ok(ctx.getters().get("count").unwrap_or(Value::Null))
            });

        let store = store_of(
            RawModule::new()
                .state(json!({ "log": [] }))
                .mutation("log", |state, entry| {
                    if let Some(log) = state["log"].as_array_mut() {
                        log.push(entry.clone());
                    }
                })
                .getter("total", |state, _, _, _| {
                    json!(state["log"].as_array().map_or(0, Vec::len))
                })
                .module("cart", cart),
        );

        assert!(store.has_mutation("cart/add"));
        assert!(!store.has_mutation("add"));

        let count = block_on(store.dispatch("cart/checkout", json!("pear"))).unwrap();
        assert_eq!(count, json!(1));
        assert_eq!(store.state()["cart"]["items"], json!(["pear"]));
        assert_eq!(store.state()["log"], json!(["checkout"]));
        assert_eq!(
            store.getters().get("cart/summary"),
            Some(json!("1 items, total 1"))
        );

        let ctx = store.module_by_namespace("test", "cart/").unwrap();
        assert_eq!(ctx.path(), &["cart".to_string()]);
        assert_eq!(ctx.getters().keys(), vec!["count".to_string(), "summary".to_string()]);

        // unknown local types are no-ops
        ctx.commit("nope", Value::Null);
        assert_eq!(store.state()["cart"]["items"], json!(["pear"]));
    }

    #[test]
    fn test_namespace_collision_keeps_both_and_last_wins() {
        let leaf = || {
            RawModule::new()
                .namespaced(true)
                .state(json!({ "v": 0 }))
                .mutation("m", |state, payload| state["v"] = payload.clone())
        };
        let store = Store::new(StoreOptions::new(
            RawModule::new()
                .module("a", leaf())
                .module("x", RawModule::new().module("a", leaf())),
        ))
        .expect("colliding namespaces are not fatal");

        store.commit("a/m", json!(9));
        assert_eq!(
            store.state(),
            json!({ "a": { "v": 9 }, "x": { "a": { "v": 9 } } })
        );

        let ctx = store.module_by_namespace("t", "a/").unwrap();
        assert_eq!(ctx.path(), path(&["x", "a"]).as_slice());
    }

    #[test]
    fn test_root_action_in_namespaced_module() {
        let store = store_of(
            RawModule::new().module(
                "ns",
                counter()
                    .namespaced(true)
                    .root_action("global_bump", |ctx: ActionContext, _| async move {
                        ctx.commit("increment", json!(3));
                        anyhow::Ok(Value::Null)
                    }),
            ),
        );

        assert!(store.has_action("global_bump"));
        assert!(store.has_action("ns/async_increment"));
        block_on(store.dispatch("global_bump", Value::Null)).unwrap();
        assert_eq!(store.state()["ns"]["count"], json!(3));
    }

    #[test]
    fn test_object_style_calls() {
        let store = store_of(
            RawModule::new()
                .state(json!({ "last": null }))
                .mutation("set", |state, payload| state["last"] = payload["value"].clone()),
        );

        let call = CallType::try_from(json!({ "type": "set", "value": 9 })).unwrap();
        store.commit(call, json!("ignored"));
        assert_eq!(store.state()["last"], json!(9));

        assert_eq!(
            CallType::try_from(json!({ "type": 1 })),
            Err(StoreError::InvalidType("number".into()))
        );
        assert!(CallType::try_from(json!("set")).is_err());
    }

    #[test]
    fn test_unknown_types_are_no_ops() {
        let store = store_of(counter());
        store.commit("missing", Value::Null);
        assert_eq!(store.state()["count"], json!(0));
        assert_eq!(block_on(store.dispatch("missing", Value::Null)).unwrap(), Value::Null);
        assert_eq!(store.getters().get("missing"), None);
    }

    #[test]
    fn test_duplicate_getter_keeps_first() {
        let store = store_of(
            RawModule::new()
                .module("a", RawModule::new().getter("same", |_, _, _, _| json!("a")))
                .module("b", RawModule::new().getter("same", |_, _, _, _| json!("b"))),
        );
        assert_eq!(store.getters().get("same"), Some(json!("a")));
        assert_eq!(store.getters().keys(), vec!["same".to_string()]);
    }

    #[test]
    fn test_invalid_module_definitions() {
        let nested_in_scalar = RawModule::new()
            .state(json!(3))
            .module("child", RawModule::new());
        assert!(matches!(
            Store::new(StoreOptions::new(RawModule::new().module("bad", nested_in_scalar))),
            Err(StoreError::InvalidModule { .. })
        ));

        let slash = RawModule::new().module("a/b", RawModule::new());
        assert!(matches!(
            Store::new(StoreOptions::new(slash)),
            Err(StoreError::InvalidModule { .. })
        ));

        let empty_key = RawModule::new().mutation("", |_, _| {});
        let err = Store::new(StoreOptions::new(empty_key)).err().unwrap();
        assert!(err.to_string().starts_with("[strata] mutations."));
    }

    #[test]
    fn test_watch_getter_flushes_after_commit() {
        let store = store_of(counter());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        let unwatch = store.watch(
            |state, _| state["count"].clone(),
            move |next, prev| s.borrow_mut().push((next.clone(), prev.clone())),
            WatchOptions::empty(),
        );

        store.commit("increment", Value::Null);
        assert_eq!(*seen.borrow(), vec![(json!(1), json!(0))]);

        unwatch.run();
        store.commit("increment", Value::Null);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_replace_state() {
        let store = store_of(counter());
        store.replace_state(json!({ "count": 20 }));
        assert_eq!(store.state()["count"], json!(20));
        assert_eq!(store.getters().get("double"), Some(json!(40)));
    }

    #[test]
    fn test_plugins_run_after_construction() {
        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        let store = Store::new(StoreOptions::new(counter()).plugin(move |store| {
            *s.borrow_mut() = Some(store.getters().get("double"));
            store.commit("increment", Value::Null);
        }))
        .unwrap();

        assert_eq!(*seen.borrow(), Some(Some(json!(0))));
        assert_eq!(store.state()["count"], json!(1));
    }

    #[test]
    fn test_helpers_resolve_namespaced_entries() {
        let store = store_of(RawModule::new().module("c", counter().namespaced(true)));
        let helpers = namespaced_helpers(&store, "c");

        let state = helpers.map_state([
            ("count", StateMapper::from("count")),
            (
                "triple",
                StateMapper::func(|state, getters| {
                    json!(int(&state["count"]) + int(&getters.get("double").unwrap_or_default()))
                }),
            ),
        ]);
        let getters = helpers.map_getters(names(["double"]));
        let mutations = helpers.map_mutations([
            ("inc", MutationMapper::from("increment")),
            (
                "inc_twice",
                MutationMapper::func(|ctx, payload| {
                    ctx.commit("increment", payload.clone());
                    ctx.commit("increment", payload);
                }),
            ),
        ]);
        let actions = helpers.map_actions(names(["async_increment"]));

        mutations["inc"](json!(1));
        mutations["inc_twice"](json!(2));
        block_on(actions["async_increment"](Value::Null)).unwrap();

        assert_eq!(state["count"](), json!(6));
        assert_eq!(state["triple"](), json!(18));
        assert_eq!(getters["double"](), json!(12));
    }

    #[test]
    fn test_helpers_with_unknown_namespace_resolve_to_null() {
        let store = store_of(counter());
        let helpers = namespaced_helpers(&store, "ghost/");
        assert_eq!(helpers.namespace(), Some("ghost/"));

        let state = helpers.map_state(names(["count"]));
        assert_eq!(state["count"](), Value::Null);
        let mutations = helpers.map_mutations(names(["increment"]));
        mutations["increment"](Value::Null);
        assert_eq!(store.state()["count"], json!(0));
    }

    #[test]
    fn test_root_helpers() {
        let store = store_of(counter());
        let helpers = Helpers::new(&store);
        helpers.map_mutations(names(["increment"]))["increment"](json!(4));
        assert_eq!(helpers.map_state(names(["count"]))["count"](), json!(4));
        assert_eq!(helpers.map_getters(names(["double"]))["double"](), json!(8));
    }

    #[test]
    fn test_provide_store_nests_and_unwinds() {
        let outer = store_of(counter());
        let inner = store_of(RawModule::new());

        assert!(use_store().is_none());
        provide_store(outer.clone(), || {
            assert!(use_store().unwrap().ptr_eq(&outer));
            provide_store(inner.clone(), || {
                assert!(use_store().unwrap().ptr_eq(&inner));
            });
            assert!(use_store().unwrap().ptr_eq(&outer));

            let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                provide_store(inner.clone(), || panic!("inside"))
            }));
            assert!(unwound.is_err());
            assert!(use_store().unwrap().ptr_eq(&outer));
        });
        assert!(use_store().is_none());
    }

    #[test]
    fn test_store_is_freed_when_last_handle_drops() {
        let store = store_of(counter());
        let weak = store.downgrade();
        let ctx = store.root_context();
        drop(store);

        assert!(weak.upgrade().is_none());
        assert_eq!(ctx.state(), Value::Null);
        assert!(block_on(ctx.dispatch("async_increment", Value::Null)).is_ok());
    }
}
