use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::Observable;

pub type ComputeFn = Rc<dyn Fn() -> Value>;

/// A set of named, memoized derivations over one observable tree.
pub trait ComputedScope {
    /// Defines (or redefines) `key`. Nothing is evaluated until the first read.
    fn define(&self, key: &str, compute: ComputeFn);
    fn get(&self, key: &str) -> Option<Value>;
    fn contains(&self, key: &str) -> bool;
    /// Keys in definition order.
    fn keys(&self) -> Vec<String>;
    /// Cuts the scope loose from its tree: caches are dropped and every
    /// later read yields `None`.
    fn detach(&self);
    fn dispose(&self);
}

struct Memo {
    compute: ComputeFn,
    // (tree version the value was computed at, value)
    cached: RefCell<Option<(u64, Value)>>,
    evaluating: Cell<bool>,
}

impl Memo {
    fn new(compute: ComputeFn) -> Self {
        Self {
            compute,
            cached: RefCell::new(None),
            evaluating: Cell::new(false),
        }
    }
}

/// The default [`ComputedScope`]: a dirty check against the tree's version.
pub struct ComputedSet {
    source: Rc<dyn Observable>,
    order: RefCell<Vec<String>>,
    memos: RefCell<HashMap<String, Rc<Memo>>>,
    detached: Cell<bool>,
}

impl ComputedSet {
    pub fn new(source: Rc<dyn Observable>) -> Self {
        Self {
            source,
            order: RefCell::new(Vec::new()),
            memos: RefCell::new(HashMap::new()),
            detached: Cell::new(false),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached.get()
    }
}

impl ComputedScope for ComputedSet {
    fn define(&self, key: &str, compute: ComputeFn) {
        let prev = self
            .memos
            .borrow_mut()
            .insert(key.to_string(), Rc::new(Memo::new(compute)));
        if prev.is_none() {
            self.order.borrow_mut().push(key.to_string());
        }
    }

    fn get(&self, key: &str) -> Option<Value> {
        if self.detached.get() {
            return None;
        }
        let memo = self.memos.borrow().get(key).cloned()?;
        let version = self.source.version();

        if let Some((at, value)) = memo.cached.borrow().as_ref()
            && *at == version
        {
            return Some(value.clone());
        }

        if memo.evaluating.get() {
            log::error!("[strata] computed '{key}' depends on itself");
            return None;
        }
        struct Evaluating<'a>(&'a Cell<bool>);
        impl Drop for Evaluating<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }
        memo.evaluating.set(true);
        let _evaluating = Evaluating(&memo.evaluating);

        let value = (memo.compute)();
        *memo.cached.borrow_mut() = Some((version, value.clone()));
        Some(value)
    }

    fn contains(&self, key: &str) -> bool {
        !self.detached.get() && self.memos.borrow().contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        if self.detached.get() {
            return Vec::new();
        }
        self.order.borrow().clone()
    }

    fn detach(&self) {
        self.detached.set(true);
        for memo in self.memos.borrow().values() {
            memo.cached.borrow_mut().take();
        }
    }

    fn dispose(&self) {
        self.detach();
        self.memos.borrow_mut().clear();
        self.order.borrow_mut().clear();
    }
}
